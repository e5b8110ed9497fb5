use thiserror::Error;

use crate::domain::{MessageTag, PeerId};

/// Main error type for the escrow orchestrator
#[derive(Error, Debug)]
pub enum EscrowError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid node address: {0}")]
    InvalidEndpoint(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Peer channel errors
    #[error("No open connection to {peer}")]
    NotConnected { peer: PeerId },

    #[error("Connection to {peer} closed while waiting")]
    Disconnected { peer: PeerId },

    #[error("Timed out connecting to {peer}")]
    ConnectTimeout { peer: PeerId },

    #[error("Timeout waiting for {peer} to reach state {tag}")]
    Timeout { peer: PeerId, tag: MessageTag },

    // Head lifecycle errors
    #[error("HeadIsClosed not achieved after {attempts} close attempts")]
    CloseNotAchieved { attempts: u32 },

    #[error("No UTXOs found for {peer}, cannot commit")]
    NoFunds { peer: PeerId },

    #[error("Alice has no L2 UTXOs available; the head was likely never opened with funds")]
    NoL2Funds,

    #[error("Insufficient funds: requested {requested} lovelace, available {available} lovelace")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("Hydra head is not open (current state: {state})")]
    HeadNotOpen { state: String },

    #[error("Hydra head is open; L1 operations are not allowed")]
    HeadIsOpen,

    #[error("Another L2 payment is already in progress")]
    PaymentInProgress,

    // External collaborator errors
    #[error("Hydra node {peer} request {path} failed: {detail}")]
    Node {
        peer: PeerId,
        path: String,
        detail: String,
    },

    #[error("External tool failed: {command}: {detail}")]
    Tool { command: String, detail: String },

    // Request errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    pub fn tool(command: impl Into<String>, detail: impl Into<String>) -> Self {
        EscrowError::Tool {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Whether this failure came from a `wait_for_state` budget elapsing
    pub fn is_timeout(&self) -> bool {
        matches!(self, EscrowError::Timeout { .. })
    }
}

/// Result type alias for EscrowError
pub type Result<T> = std::result::Result<T, EscrowError>;
