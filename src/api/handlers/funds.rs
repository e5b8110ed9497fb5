use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info, warn};

use super::{authorize, parse_body, require_amount};
use crate::api::{error::ApiError, state::AppState, types::*};
use crate::domain::PeerId;
use crate::error::EscrowError;

/// POST /payment -- alice pays bob inside the head
pub async fn payment(
    State(state): State<AppState>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let req = parse_body(body)?;
    authorize(&state, &req)?;

    let current = state.tracker.refresh().await;
    if !current.is_open() {
        return Err(ApiError::head_not_open("Payment", current.as_str()));
    }
    let amount = require_amount(req.amount.as_ref())?;

    match state.payments.execute(amount).await {
        Ok(balance) => Ok((
            StatusCode::CREATED,
            Json(PaymentResponse {
                message: "L2 payment completed".to_string(),
                state: "confirmed".to_string(),
                balance,
            }),
        )),
        Err(e @ (EscrowError::PaymentInProgress | EscrowError::HeadNotOpen { .. })) => {
            Err(e.into())
        }
        Err(e) => {
            error!(amount, error = %e, "L2 payment failed");
            let balance = state.balances.l2_balance(PeerId::Alice).await;
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PaymentResponse {
                    message: "L2 payment failed".to_string(),
                    state: "failed".to_string(),
                    balance,
                }),
            ))
        }
    }
}

/// POST /withdrawal -- L1 transfer out of bob's wallet
pub async fn withdrawal(
    State(state): State<AppState>,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    l1_transfer(state, body, PeerId::Bob, "Withdrawal").await
}

/// POST /refund -- L1 transfer out of alice's escrow wallet
pub async fn refund(
    State(state): State<AppState>,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    l1_transfer(state, body, PeerId::Alice, "Refund").await
}

async fn l1_transfer(
    state: AppState,
    body: Result<Json<TransferRequest>, JsonRejection>,
    from: PeerId,
    action: &str,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    let req = parse_body(body)?;
    authorize(&state, &req)?;

    state.tracker.refresh().await;

    // Live status, the cache may lag behind the node
    match state.tracker.live_status(PeerId::Alice).await {
        Ok(head) if head.is_open() => return Err(ApiError::head_is_open(action)),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not check head status, proceeding"),
    }

    let amount = require_amount(req.amount.as_ref())?;
    let to = req
        .to
        .as_deref()
        .map(str::trim)
        .filter(|to| !to.is_empty())
        .ok_or_else(|| ApiError::validation("to is required"))?
        .to_string();

    let verb = action.to_lowercase();
    match state.transfers.send(from, &to, amount).await {
        Ok(balance) => {
            info!(%from, amount, %to, "L1 {} completed", verb);
            Ok((
                StatusCode::OK,
                Json(TransferResponse {
                    message: format!("L1 {} completed", verb),
                    balance,
                }),
            ))
        }
        Err(e) => {
            error!(%from, amount, error = %e, "L1 {} failed", verb);
            let balance = state.balances.l1_balance(from).await;
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TransferResponse {
                    message: format!("L1 {} failed", verb),
                    balance,
                }),
            ))
        }
    }
}
