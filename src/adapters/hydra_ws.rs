//! WebSocket links to the two hydra-node peers.
//!
//! Each peer has at most one live link. A link is a writer task fed through an
//! unbounded channel plus a reader task that parses inbound frames, records
//! the last seen tag and resolves matching waiters.

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::hydra_http::PeerEndpoints;
use super::waiters::{MessageFilter, PendingState, WaiterRegistry};
use crate::domain::{ClientCommand, MessageTag, PeerId, ProtocolMessage};
use crate::error::{EscrowError, Result};

struct PeerLink {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

impl PeerLink {
    fn is_live(&self) -> bool {
        !self.outbound.is_closed() && !self.reader.is_finished()
    }

    fn shutdown(self) {
        let _ = self.outbound.send(Message::Close(None));
        self.reader.abort();
    }
}

#[derive(Default)]
struct PeerSlot {
    last_tag: Option<MessageTag>,
    link: Option<PeerLink>,
}

/// Connection manager for both peers
#[derive(Clone)]
pub struct PeerHub {
    endpoints: PeerEndpoints,
    connect_timeout: Duration,
    slots: Arc<DashMap<PeerId, PeerSlot>>,
    waiters: WaiterRegistry,
    generation: Arc<AtomicU64>,
}

impl PeerHub {
    pub fn new(endpoints: PeerEndpoints, connect_timeout: Duration) -> Self {
        Self {
            endpoints,
            connect_timeout,
            slots: Arc::new(DashMap::new()),
            waiters: WaiterRegistry::new(),
            generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Open a fresh link to `peer`, replacing any existing one
    pub async fn connect(&self, peer: PeerId) -> Result<()> {
        let url = self.endpoints.ws_url(peer)?;
        info!(%peer, %url, "Connecting to hydra node");

        let (ws_stream, _) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| EscrowError::ConnectTimeout { peer })??;

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if let Err(e) = write.send(frame).await {
                    warn!(%peer, error = %e, "WebSocket write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let hub = self.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => hub.ingest(peer, &text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => hub.ingest(peer, &text),
                        Err(_) => warn!(%peer, "Dropping non-UTF8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        info!(%peer, ?frame, "Hydra node closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%peer, error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            hub.detach(peer, generation);
        });

        let previous = self
            .slots
            .entry(peer)
            .or_default()
            .link
            .replace(PeerLink {
                generation,
                outbound,
                reader,
            });
        if let Some(old) = previous {
            debug!(%peer, generation = old.generation, "Replacing existing link");
            old.shutdown();
        }

        info!(%peer, generation, "Connected to hydra node");
        Ok(())
    }

    /// Connect only if there is no live link
    pub async fn ensure_connected(&self, peer: PeerId) -> Result<()> {
        if self.is_connected(peer) {
            return Ok(());
        }
        self.connect(peer).await
    }

    /// Connect both peers concurrently, reusing live links
    pub async fn ensure_all_connected(&self) -> Result<()> {
        tokio::try_join!(
            self.ensure_connected(PeerId::Alice),
            self.ensure_connected(PeerId::Bob)
        )?;
        Ok(())
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.slots
            .get(&peer)
            .and_then(|slot| slot.link.as_ref().map(PeerLink::is_live))
            .unwrap_or(false)
    }

    pub fn all_connected(&self) -> bool {
        PeerId::ALL.iter().all(|peer| self.is_connected(*peer))
    }

    /// Send a command over the live link of `peer`
    pub fn send(&self, peer: PeerId, command: &ClientCommand) -> Result<()> {
        let body = serde_json::to_string(command)?;
        let slot = self
            .slots
            .get(&peer)
            .ok_or(EscrowError::NotConnected { peer })?;
        let link = slot
            .link
            .as_ref()
            .filter(|link| link.is_live())
            .ok_or(EscrowError::NotConnected { peer })?;

        link.outbound
            .send(Message::Text(body))
            .map_err(|_| EscrowError::NotConnected { peer })?;

        info!(%peer, command = command.name(), "Sent command");
        Ok(())
    }

    /// Re-ensure the link, then send
    pub async fn send_connected(&self, peer: PeerId, command: &ClientCommand) -> Result<()> {
        self.ensure_connected(peer).await?;
        self.send(peer, command)
    }

    /// Close every link and fail every pending wait
    pub fn disconnect_all(&self) {
        for peer in PeerId::ALL {
            let link = self.slots.get_mut(&peer).and_then(|mut slot| slot.link.take());
            if let Some(link) = link {
                info!(%peer, "Disconnecting from hydra node");
                link.shutdown();
            }
        }
        self.waiters.fail_all();
    }

    /// Last tag received from `peer`; `None` until the first message
    pub fn last_tag(&self, peer: PeerId) -> Option<MessageTag> {
        self.slots.get(&peer).and_then(|slot| slot.last_tag.clone())
    }

    /// Wait until `peer` reports `tag`, resolving at once if that is the last tag seen
    pub async fn wait_for_state(
        &self,
        peer: PeerId,
        tag: MessageTag,
        budget: Duration,
    ) -> Result<ProtocolMessage> {
        // register before reading the cache so a message landing in between is not lost
        let pending = self.waiters.register(peer, tag.clone(), None);
        if self.last_tag(peer).as_ref() == Some(&tag) {
            debug!(%peer, %tag, "State already reached");
            return Ok(ProtocolMessage::new(tag.clone(), json!({ "tag": tag.as_str() })));
        }

        debug!(%peer, %tag, timeout_ms = budget.as_millis() as u64, "Waiting for state");
        pending.wait(budget).await
    }

    /// Both peers report `tag`, awaited concurrently
    pub async fn wait_for_both(&self, tag: MessageTag, budget: Duration) -> Result<()> {
        tokio::try_join!(
            self.wait_for_state(PeerId::Alice, tag.clone(), budget),
            self.wait_for_state(PeerId::Bob, tag.clone(), budget)
        )?;
        Ok(())
    }

    /// Register a waiter for the next matching message, ignoring the cached tag
    pub fn arm(&self, peer: PeerId, tag: MessageTag, filter: Option<MessageFilter>) -> PendingState {
        self.waiters.register(peer, tag, filter)
    }

    /// Waiters still registered for `peer`
    pub fn pending_waiters(&self, peer: PeerId) -> usize {
        self.waiters.pending(peer)
    }

    /// Process one inbound text frame from `peer`
    pub(crate) fn ingest(&self, peer: PeerId, text: &str) {
        let message = match ProtocolMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                let preview: String = text.chars().take(200).collect();
                warn!(%peer, error = %e, frame = %preview, "Dropping unparseable message");
                return;
            }
        };

        self.slots.entry(peer).or_default().last_tag = Some(message.tag.clone());
        let fired = self.waiters.dispatch(peer, &message);

        if message.tag.is_failure() {
            warn!(%peer, tag = %message.tag, payload = %message.payload, "Hydra node reported failure");
        } else {
            info!(%peer, tag = %message.tag, waiters = fired, "Received message");
        }
    }

    fn detach(&self, peer: PeerId, generation: u64) {
        if let Some(mut slot) = self.slots.get_mut(&peer) {
            if slot.link.as_ref().map(|l| l.generation) == Some(generation) {
                slot.link = None;
                info!(%peer, generation, "Link detached");
            }
        }
    }
}
