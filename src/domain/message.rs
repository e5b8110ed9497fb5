//! Hydra node WebSocket protocol messages.
//!
//! Inbound messages carry a `tag` plus arbitrary extra fields. The tag is
//! parsed into a closed [`MessageTag`] set with an `Unknown` catch-all, and
//! the full JSON object is kept as an opaque payload.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use super::ledger::UtxoSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageTag {
    Greetings,
    HeadIsInitializing,
    Committed,
    HeadIsOpen,
    TxValid,
    TxInvalid,
    SnapshotConfirmed,
    HeadIsClosed,
    ReadyToFanout,
    HeadIsFinalized,
    HeadIsAborted,
    CommandFailed,
    PostTxOnChainFailed,
    Unknown(String),
}

impl MessageTag {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "Greetings" => MessageTag::Greetings,
            "HeadIsInitializing" => MessageTag::HeadIsInitializing,
            "Committed" => MessageTag::Committed,
            "HeadIsOpen" | "Open" => MessageTag::HeadIsOpen,
            "TxValid" => MessageTag::TxValid,
            "TxInvalid" => MessageTag::TxInvalid,
            "SnapshotConfirmed" => MessageTag::SnapshotConfirmed,
            "HeadIsClosed" => MessageTag::HeadIsClosed,
            "ReadyToFanout" => MessageTag::ReadyToFanout,
            "HeadIsFinalized" => MessageTag::HeadIsFinalized,
            "HeadIsAborted" => MessageTag::HeadIsAborted,
            "CommandFailed" => MessageTag::CommandFailed,
            "PostTxOnChainFailed" => MessageTag::PostTxOnChainFailed,
            other => MessageTag::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageTag::Greetings => "Greetings",
            MessageTag::HeadIsInitializing => "HeadIsInitializing",
            MessageTag::Committed => "Committed",
            MessageTag::HeadIsOpen => "HeadIsOpen",
            MessageTag::TxValid => "TxValid",
            MessageTag::TxInvalid => "TxInvalid",
            MessageTag::SnapshotConfirmed => "SnapshotConfirmed",
            MessageTag::HeadIsClosed => "HeadIsClosed",
            MessageTag::ReadyToFanout => "ReadyToFanout",
            MessageTag::HeadIsFinalized => "HeadIsFinalized",
            MessageTag::HeadIsAborted => "HeadIsAborted",
            MessageTag::CommandFailed => "CommandFailed",
            MessageTag::PostTxOnChainFailed => "PostTxOnChainFailed",
            MessageTag::Unknown(tag) => tag,
        }
    }

    /// Tags that report a failure of something we asked the node to do
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            MessageTag::TxInvalid | MessageTag::CommandFailed | MessageTag::PostTxOnChainFailed
        )
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(MessageTag::parse(&raw))
    }
}

/// A message received from a peer's node
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    pub tag: MessageTag,
    pub payload: Value,
}

impl ProtocolMessage {
    pub fn new(tag: MessageTag, payload: Value) -> Self {
        Self { tag, payload }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// UTXO set carried by `Committed` / `SnapshotConfirmed`-style messages
    pub fn utxo(&self) -> Option<UtxoSet> {
        self.payload
            .get("utxo")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether a `Committed` message includes an output owned by `address`.
    ///
    /// Messages without a readable `utxo` field are treated as a match.
    pub fn commits_address(&self, address: &str) -> bool {
        match self.utxo() {
            Some(utxo) => utxo.entries().any(|(_, entry)| entry.address == address),
            None => true,
        }
    }
}

impl<'de> Deserialize<'de> for ProtocolMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let payload = Value::deserialize(deserializer)?;
        let tag = payload
            .get("tag")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::custom("message has no string `tag` field"))?;
        Ok(ProtocolMessage {
            tag: MessageTag::parse(tag),
            payload,
        })
    }
}

/// Commands sent to a node over its WebSocket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag")]
pub enum ClientCommand {
    Init,
    Close,
    Fanout,
    Abort,
    NewTx { transaction: Value },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Init => "Init",
            ClientCommand::Close => "Close",
            ClientCommand::Fanout => "Fanout",
            ClientCommand::Abort => "Abort",
            ClientCommand::NewTx { .. } => "NewTx",
        }
    }
}
