//! Per-peer registry of one-shot waiters for inbound protocol messages.
//!
//! A waiter is registered for a `(peer, tag)` pair with an optional payload
//! filter. The reader task of a peer link calls [`WaiterRegistry::dispatch`]
//! for every inbound message; matching waiters are removed and resolved in
//! registration order. Dropping a [`PendingState`] deregisters it, so a wait
//! that times out or is cancelled leaves nothing behind.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::{MessageTag, PeerId, ProtocolMessage};
use crate::error::{EscrowError, Result};

/// Payload predicate applied after the tag matched
pub type MessageFilter = Box<dyn Fn(&ProtocolMessage) -> bool + Send + Sync>;

enum WaitOutcome {
    Matched(ProtocolMessage),
    Disconnected,
}

struct Waiter {
    id: u64,
    tag: MessageTag,
    filter: Option<MessageFilter>,
    tx: oneshot::Sender<WaitOutcome>,
}

impl Waiter {
    fn matches(&self, message: &ProtocolMessage) -> bool {
        self.tag == message.tag && self.filter.as_ref().map_or(true, |f| f(message))
    }
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    waiters: DashMap<PeerId, Vec<Waiter>>,
}

/// Shared waiter table, cloned into every peer link
#[derive(Clone, Default)]
pub struct WaiterRegistry {
    inner: Arc<Inner>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter and return the handle that resolves when it fires
    pub fn register(
        &self,
        peer: PeerId,
        tag: MessageTag,
        filter: Option<MessageFilter>,
    ) -> PendingState {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.inner.waiters.entry(peer).or_default().push(Waiter {
            id,
            tag: tag.clone(),
            filter,
            tx,
        });

        PendingState {
            peer,
            tag,
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Resolve and remove every waiter of `peer` that matches `message`.
    /// Returns how many waiters fired.
    pub fn dispatch(&self, peer: PeerId, message: &ProtocolMessage) -> usize {
        let fired: Vec<Waiter> = match self.inner.waiters.get_mut(&peer) {
            Some(mut list) => {
                let mut fired = Vec::new();
                let mut i = 0;
                while i < list.len() {
                    if list[i].matches(message) {
                        fired.push(list.remove(i));
                    } else {
                        i += 1;
                    }
                }
                fired
            }
            None => return 0,
        };

        let count = fired.len();
        for waiter in fired {
            // Receiver may already be gone if the wait was cancelled
            let _ = waiter.tx.send(WaitOutcome::Matched(message.clone()));
        }
        count
    }

    /// Fail every pending waiter of `peer` with `Disconnected`
    pub fn fail_peer(&self, peer: PeerId) {
        if let Some((_, list)) = self.inner.waiters.remove(&peer) {
            if !list.is_empty() {
                debug!(%peer, waiters = list.len(), "Failing pending waiters");
            }
            for waiter in list {
                let _ = waiter.tx.send(WaitOutcome::Disconnected);
            }
        }
    }

    /// Fail every pending waiter of every peer
    pub fn fail_all(&self) {
        for peer in PeerId::ALL {
            self.fail_peer(peer);
        }
    }

    /// Number of registered waiters for `peer`
    pub fn pending(&self, peer: PeerId) -> usize {
        self.inner.waiters.get(&peer).map_or(0, |list| list.len())
    }

    fn remove(&self, peer: PeerId, id: u64) {
        if let Some(mut list) = self.inner.waiters.get_mut(&peer) {
            list.retain(|w| w.id != id);
        }
    }
}

/// A registered waiter; deregisters itself when dropped
pub struct PendingState {
    peer: PeerId,
    tag: MessageTag,
    id: u64,
    rx: oneshot::Receiver<WaitOutcome>,
    registry: WaiterRegistry,
}

impl PendingState {
    /// Wait up to `budget` for the matching message
    pub async fn wait(mut self, budget: Duration) -> Result<ProtocolMessage> {
        match timeout(budget, &mut self.rx).await {
            Ok(Ok(WaitOutcome::Matched(message))) => Ok(message),
            Ok(Ok(WaitOutcome::Disconnected)) | Ok(Err(_)) => {
                Err(EscrowError::Disconnected { peer: self.peer })
            }
            Err(_) => Err(EscrowError::Timeout {
                peer: self.peer,
                tag: self.tag.clone(),
            }),
        }
    }
}

impl Drop for PendingState {
    fn drop(&mut self) {
        self.registry.remove(self.peer, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(tag: &str) -> ProtocolMessage {
        ProtocolMessage::new(MessageTag::parse(tag), json!({ "tag": tag }))
    }

    #[tokio::test]
    async fn test_dispatch_resolves_matching_waiter() {
        let registry = WaiterRegistry::new();
        let pending = registry.register(PeerId::Alice, MessageTag::HeadIsOpen, None);

        assert_eq!(registry.dispatch(PeerId::Alice, &message("Greetings")), 0);
        assert_eq!(registry.dispatch(PeerId::Bob, &message("HeadIsOpen")), 0);
        assert_eq!(registry.dispatch(PeerId::Alice, &message("HeadIsOpen")), 1);

        let received = pending.wait(Duration::from_millis(100)).await.unwrap();
        assert_eq!(received.tag, MessageTag::HeadIsOpen);
        assert_eq!(registry.pending(PeerId::Alice), 0);
    }

    #[tokio::test]
    async fn test_each_waiter_consumes_one_match() {
        let registry = WaiterRegistry::new();
        let first = registry.register(PeerId::Bob, MessageTag::TxValid, None);
        let second = registry.register(PeerId::Bob, MessageTag::TxValid, None);

        // one message fires every waiter registered for it
        assert_eq!(registry.dispatch(PeerId::Bob, &message("TxValid")), 2);
        assert_eq!(registry.dispatch(PeerId::Bob, &message("TxValid")), 0);

        assert!(first.wait(Duration::from_millis(50)).await.is_ok());
        assert!(second.wait(Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn test_filter_rejects_other_payloads() {
        let registry = WaiterRegistry::new();
        let filter: MessageFilter = Box::new(|m| m.payload["party"] == "alice");
        let pending = registry.register(PeerId::Alice, MessageTag::Committed, Some(filter));

        let bob_commit = ProtocolMessage::new(
            MessageTag::Committed,
            json!({ "tag": "Committed", "party": "bob" }),
        );
        assert_eq!(registry.dispatch(PeerId::Alice, &bob_commit), 0);

        let alice_commit = ProtocolMessage::new(
            MessageTag::Committed,
            json!({ "tag": "Committed", "party": "alice" }),
        );
        assert_eq!(registry.dispatch(PeerId::Alice, &alice_commit), 1);
        assert!(pending.wait(Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_deregisters_waiter() {
        let registry = WaiterRegistry::new();
        let pending = registry.register(PeerId::Alice, MessageTag::HeadIsClosed, None);
        assert_eq!(registry.pending(PeerId::Alice), 1);

        let err = pending.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(registry.pending(PeerId::Alice), 0);
    }

    #[tokio::test]
    async fn test_fail_all_reports_disconnected() {
        let registry = WaiterRegistry::new();
        let pending = registry.register(PeerId::Bob, MessageTag::HeadIsOpen, None);

        registry.fail_all();

        let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, EscrowError::Disconnected { peer: PeerId::Bob }));
    }
}
