pub mod funds;
pub mod head;
pub mod system;

pub use funds::*;
pub use head::*;
pub use system::*;

use axum::{extract::rejection::JsonRejection, Json};
use serde_json::Value;

use crate::api::{error::ApiError, session::Session, state::AppState, types::KeyedRequest};

/// Unwrap the JSON body, turning a malformed one into `VALIDATION_ERROR`
pub(crate) fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(inner)| inner).map_err(ApiError::from)
}

/// Resolve the API key carried in the body to a live session
pub(crate) fn authorize(state: &AppState, req: &impl KeyedRequest) -> Result<Session, ApiError> {
    let key = req
        .api_key()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(ApiError::missing_api_key)?;
    state
        .sessions
        .validate(key)
        .map_err(|_| ApiError::invalid_api_key())
}

/// Positive whole lovelace amount
pub(crate) fn require_amount(amount: Option<&Value>) -> Result<u64, ApiError> {
    match amount {
        None => Err(ApiError::validation("amount is required")),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Err(ApiError::validation("amount must be greater than zero")),
            Some(lovelace) => Ok(lovelace),
            None => Err(ApiError::validation(format!(
                "amount must be a positive whole number of lovelace, got {}",
                n
            ))),
        },
        Some(other) => Err(ApiError::validation(format!(
            "amount must be a number, got {}",
            other
        ))),
    }
}
