use serde::{Serialize, Serializer};
use std::fmt;

/// Projected head state as reported to API clients.
///
/// Built from a node's `/head` status tag. Both the client-message vocabulary
/// (`HeadIsOpen`, `HeadIsClosed`, ...) and the node status vocabulary
/// (`Open`, `Closed`, `FanoutPossible`, `Final`) are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeadState {
    Idle,
    HeadIsInitializing,
    Initial,
    Committed,
    Open,
    /// Close was sent by us but the node still reports the head open
    Closing,
    HeadIsClosed,
    ReadyToFanout,
    HeadIsFinalized,
    Failed,
    Other(String),
}

impl HeadState {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "" | "Idle" => HeadState::Idle,
            "HeadIsInitializing" => HeadState::HeadIsInitializing,
            "Initial" | "Initializing" => HeadState::Initial,
            "Committed" => HeadState::Committed,
            "Open" | "HeadIsOpen" => HeadState::Open,
            "Closing" => HeadState::Closing,
            "Closed" | "HeadIsClosed" => HeadState::HeadIsClosed,
            "FanoutPossible" | "ReadyToFanout" => HeadState::ReadyToFanout,
            "Final" | "HeadIsFinalized" => HeadState::HeadIsFinalized,
            "Failed" => HeadState::Failed,
            other => HeadState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HeadState::Idle => "Idle",
            HeadState::HeadIsInitializing => "HeadIsInitializing",
            HeadState::Initial => "Initial",
            HeadState::Committed => "Committed",
            HeadState::Open => "Open",
            HeadState::Closing => "Closing",
            HeadState::HeadIsClosed => "HeadIsClosed",
            HeadState::ReadyToFanout => "ReadyToFanout",
            HeadState::HeadIsFinalized => "HeadIsFinalized",
            HeadState::Failed => "Failed",
            HeadState::Other(tag) => tag,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, HeadState::Open)
    }

    /// Init has been accepted and commits are being collected
    pub fn is_initializing(&self) -> bool {
        matches!(
            self,
            HeadState::HeadIsInitializing | HeadState::Initial | HeadState::Committed
        )
    }

    /// Apply the local close-in-progress overlay.
    ///
    /// While our Close is in flight the node may still report the head open;
    /// that is shown as `Closing`. Every other state passes through.
    pub fn with_closing_overlay(self, closing_initiated: bool) -> Self {
        if closing_initiated && self.is_open() {
            HeadState::Closing
        } else {
            self
        }
    }
}

impl Default for HeadState {
    fn default() -> Self {
        HeadState::Idle
    }
}

impl fmt::Display for HeadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HeadState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_vocabulary_is_normalized() {
        assert_eq!(HeadState::from_tag("Open"), HeadState::Open);
        assert_eq!(HeadState::from_tag("HeadIsOpen"), HeadState::Open);
        assert_eq!(HeadState::from_tag("Closed"), HeadState::HeadIsClosed);
        assert_eq!(HeadState::from_tag("FanoutPossible"), HeadState::ReadyToFanout);
        assert_eq!(HeadState::from_tag("Final"), HeadState::HeadIsFinalized);
        assert_eq!(HeadState::from_tag(""), HeadState::Idle);
        assert_eq!(
            HeadState::from_tag("Weird"),
            HeadState::Other("Weird".to_string())
        );
    }

    #[test]
    fn test_closing_overlay() {
        assert_eq!(HeadState::Open.with_closing_overlay(true), HeadState::Closing);
        assert_eq!(HeadState::Open.with_closing_overlay(false), HeadState::Open);
        assert_eq!(
            HeadState::HeadIsClosed.with_closing_overlay(true),
            HeadState::HeadIsClosed
        );
        assert_eq!(
            HeadState::ReadyToFanout.with_closing_overlay(true),
            HeadState::ReadyToFanout
        );
    }

    #[test]
    fn test_initializing_states() {
        assert!(HeadState::HeadIsInitializing.is_initializing());
        assert!(HeadState::Initial.is_initializing());
        assert!(!HeadState::Open.is_initializing());
        assert!(!HeadState::Idle.is_initializing());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        assert_eq!(
            serde_json::to_string(&HeadState::HeadIsFinalized).unwrap(),
            "\"HeadIsFinalized\""
        );
    }
}
