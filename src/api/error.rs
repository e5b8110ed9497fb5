use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::EscrowError;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub details: String,
}

/// Error response of the HTTP surface: `{error, code, details}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(
        status: StatusCode,
        code: Option<&'static str>,
        error: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                code,
                details: details.into(),
            },
        }
    }

    pub fn missing_api_key() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some("MISSING_API_KEY"),
            "API Key is required",
            "API Key must be included in the request body",
        )
    }

    pub fn invalid_api_key() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            Some("INVALID_API_KEY"),
            "Invalid or expired API Key",
            "The provided API Key is either invalid, expired, or not found. Please obtain a new API Key from /setup endpoint.",
        )
    }

    pub fn validation(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some("VALIDATION_ERROR"),
            "Invalid request body",
            details,
        )
    }

    pub fn head_not_open(action: &str, state: &str) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            Some("HEAD_NOT_OPEN"),
            format!("{} not allowed in current Hydra state", action),
            format!(
                "Cannot perform {} when Hydra Head state is: {}. It is only allowed when Open.",
                action.to_lowercase(),
                state
            ),
        )
    }

    pub fn head_is_open(action: &str) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            Some("HEAD_IS_OPEN"),
            format!("{} not allowed during active Hydra session", action),
            format!(
                "Cannot perform L1 {} while Hydra Head is open. Please close the Hydra Head first using /close endpoint.",
                action.to_lowercase()
            ),
        )
    }

    pub fn payment_in_progress() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            Some("PAYMENT_IN_PROGRESS"),
            "Another payment is being processed",
            "Wait for the running L2 payment to finish and retry.",
        )
    }

    pub fn internal(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("INTERNAL_ERROR"),
            error,
            details,
        )
    }

    /// 500 without a machine-readable code
    pub fn setup_failed(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Failed to setup ESCROW",
            details,
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<EscrowError> for ApiError {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::Auth(_) => ApiError::invalid_api_key(),
            EscrowError::Validation(details) => ApiError::validation(details),
            EscrowError::HeadNotOpen { state } => ApiError::head_not_open("Operation", &state),
            EscrowError::HeadIsOpen => ApiError::head_is_open("Operation"),
            EscrowError::PaymentInProgress => ApiError::payment_in_progress(),
            other => ApiError::internal("Internal server error", other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
