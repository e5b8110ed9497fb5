use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{error, info};

use super::{authorize, parse_body};
use crate::api::{error::ApiError, state::AppState, types::*};
use crate::domain::{Balance, PeerId};

/// GET /
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Cardano Hydra Escrow API Server".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// POST /setup -- issue an API key bound to alice's escrow address
pub async fn setup(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SetupResponse>), ApiError> {
    info!("Setting up escrow session");

    let escrow_l1_address = state.tool.address(PeerId::Alice).await.map_err(|e| {
        error!(error = %e, "Setup failed: cannot read escrow address");
        ApiError::setup_failed(e.to_string())
    })?;
    let balance = state.balances.l1_balance(PeerId::Alice).await;
    let session = state.sessions.create(&escrow_l1_address);
    let head_state = state.tracker.refresh().await;

    info!(address = %escrow_l1_address, lovelace = balance.lovelace, "Escrow session created");
    Ok((
        StatusCode::CREATED,
        Json(SetupResponse {
            message: "ESCROW setup started".to_string(),
            state: head_state,
            api_key: session.api_key,
            api_key_expiration: session.expires_at,
            escrow_l1_address,
            balance,
            timestamp: Utc::now(),
        }),
    ))
}

/// POST /status -- head state plus alice's L2 balance while open
pub async fn status(
    State(state): State<AppState>,
    body: Result<Json<ApiKeyRequest>, JsonRejection>,
) -> Result<Json<EscrowStatusResponse>, ApiError> {
    let req = parse_body(body)?;
    let session = authorize(&state, &req)?;

    let head_state = state.tracker.refresh().await;
    let balance = if head_state.is_open() {
        state.balances.l2_balance(PeerId::Alice).await
    } else {
        Balance::zero()
    };

    Ok(Json(EscrowStatusResponse {
        message: "ESCROW status retrieved successfully".to_string(),
        state: head_state,
        api_key_expiration: session.expires_at,
        escrow_l1_address: session.escrow_l1_address,
        balance,
        timestamp: Utc::now(),
        background_tasks: Some(state.tasks.snapshots()),
    }))
}

/// POST /balance -- bob's L1 balance
pub async fn balance(
    State(state): State<AppState>,
    body: Result<Json<ApiKeyRequest>, JsonRejection>,
) -> Result<Json<EscrowStatusResponse>, ApiError> {
    let req = parse_body(body)?;
    let session = authorize(&state, &req)?;

    let balance = state.balances.l1_balance(PeerId::Bob).await;
    let address = state.balances.address_or_empty(PeerId::Bob).await;
    let head_state = state.tracker.refresh().await;

    Ok(Json(EscrowStatusResponse {
        message: "Bob L1 ESCROW balance retrieved successfully".to_string(),
        state: head_state,
        api_key_expiration: session.expires_at,
        escrow_l1_address: address,
        balance,
        timestamp: Utc::now(),
        background_tasks: None,
    }))
}

/// POST /balancel2 -- bob's L2 balance, zero unless the head is open
pub async fn balance_l2(
    State(state): State<AppState>,
    body: Result<Json<ApiKeyRequest>, JsonRejection>,
) -> Result<Json<EscrowStatusResponse>, ApiError> {
    let req = parse_body(body)?;
    let session = authorize(&state, &req)?;

    let head_state = state.tracker.refresh().await;
    let balance = if head_state.is_open() {
        state.balances.l2_balance(PeerId::Bob).await
    } else {
        Balance::zero()
    };
    let address = state.balances.address_or_empty(PeerId::Bob).await;

    Ok(Json(EscrowStatusResponse {
        message: "Bob L2 ESCROW balance retrieved successfully".to_string(),
        state: head_state,
        api_key_expiration: session.expires_at,
        escrow_l1_address: address,
        balance,
        timestamp: Utc::now(),
        background_tasks: None,
    }))
}
