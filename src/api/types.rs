use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Balance, HeadState};
use crate::head::TaskRecord;

// ============================================================================
// Request Types
// ============================================================================

/// Requests that carry an API key in the body
pub trait KeyedRequest {
    fn api_key(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Lovelace; kept raw so state guards run before the amount is checked
    #[serde(default)]
    pub amount: Option<Value>,
}

/// Body of `/withdrawal` and `/refund`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub to: Option<String>,
}

impl KeyedRequest for ApiKeyRequest {
    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl KeyedRequest for PaymentRequest {
    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl KeyedRequest for TransferRequest {
    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResponse {
    pub message: String,
    pub state: HeadState,
    pub api_key: String,
    pub api_key_expiration: DateTime<Utc>,
    pub escrow_l1_address: String,
    pub balance: Balance,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub message: String,
    pub state: HeadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Shared shape of `/status`, `/balance` and `/balancel2`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowStatusResponse {
    pub message: String,
    pub state: HeadState,
    pub api_key_expiration: DateTime<Utc>,
    pub escrow_l1_address: String,
    pub balance: Balance,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_tasks: Option<Vec<TaskRecord>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub message: String,
    pub state: String,
    pub balance: Balance,
}

/// `/close` and `/abort`
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub message: String,
    pub state: String,
    pub timestamp: DateTime<Utc>,
}

/// `/withdrawal` and `/refund`
#[derive(Debug, Clone, Serialize)]
pub struct TransferResponse {
    pub message: String,
    pub balance: Balance,
}
