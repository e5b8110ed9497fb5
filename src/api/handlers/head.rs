use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{authorize, parse_body};
use crate::api::{error::ApiError, state::AppState, types::*};
use crate::domain::{ClientCommand, HeadState, MessageTag, PeerId};
use crate::head::TaskKind;

/// POST /start -- send Init to both peers and open the head in the background
pub async fn start(
    State(state): State<AppState>,
    body: Result<Json<ApiKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let req = parse_body(body)?;
    authorize(&state, &req)?;

    let escrow_id = format!("escrow_{}", Uuid::new_v4().simple());

    // Held until the opening task is registered; a concurrent start joins the running one
    let Ok(_slot) = state.start_slot.try_lock() else {
        info!(%escrow_id, "Start already in progress, not sending Init");
        return Ok(start_response(
            StatusCode::CREATED,
            CONTINUING,
            state.tracker.current().await,
            Some(escrow_id),
        ));
    };

    let current = state.tracker.refresh().await;
    info!(%escrow_id, state = %current, "Start requested");

    if current.is_initializing() || state.tasks.is_running(TaskKind::Start) {
        info!(%escrow_id, "Head already initializing, not sending Init");
        return Ok(start_response(
            StatusCode::CREATED,
            CONTINUING,
            current,
            Some(escrow_id),
        ));
    }

    if current.is_open() {
        return Ok(start_response(
            StatusCode::CREATED,
            "ESCROW transaction started - Hydra head already open",
            current,
            Some(escrow_id),
        ));
    }

    if let Err(e) = state.lifecycle.initiate().await {
        error!(%escrow_id, error = %e, "Hydra initialization failed");
        let head_state = state.tracker.refresh().await;
        return Ok(start_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ESCROW transaction start failed - Hydra initialization failed",
            head_state,
            None,
        ));
    }

    let head_state = match state
        .hub
        .wait_for_state(
            PeerId::Alice,
            MessageTag::HeadIsInitializing,
            state.config.timeouts.init_ack(),
        )
        .await
    {
        Ok(_) => {
            state.tracker.observe(HeadState::HeadIsInitializing).await;
            HeadState::HeadIsInitializing
        }
        Err(e) => {
            warn!(%escrow_id, error = %e, "Init not yet acknowledged by alice");
            state.tracker.refresh().await
        }
    };

    let lifecycle = state.lifecycle.clone();
    state.tasks.spawn(TaskKind::Start, escrow_id.clone(), async move {
        lifecycle.complete_opening().await
    });

    info!(%escrow_id, state = %head_state, "Hydra initialization started");
    Ok(start_response(
        StatusCode::CREATED,
        "ESCROW transaction started - Hydra initialization started",
        head_state,
        Some(escrow_id),
    ))
}

const CONTINUING: &str =
    "ESCROW transaction started - Hydra initialization in progress (continuing existing process)";

fn start_response(
    status: StatusCode,
    message: &str,
    state: HeadState,
    escrow_id: Option<String>,
) -> (StatusCode, Json<StartResponse>) {
    (
        status,
        Json(StartResponse {
            message: message.to_string(),
            state,
            escrow_id,
            timestamp: Utc::now(),
        }),
    )
}

/// POST /close -- send Close and drive fan-out in the background
pub async fn close(
    State(state): State<AppState>,
    body: Result<Json<ApiKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let req = parse_body(body)?;
    authorize(&state, &req)?;

    let current = state.tracker.refresh().await;
    if !current.is_open() {
        return Err(ApiError::head_not_open("Close", current.as_str()));
    }

    if let Err(e) = state.close.initiate().await {
        error!(error = %e, "Close initiation failed");
        state.tracker.set_closing(false);
        return Ok(command_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ESCROW transaction close process failed",
            "failed",
        ));
    }

    state.tracker.begin_close().await;

    let close = state.close.clone();
    let tracker = state.tracker.clone();
    state.tasks.spawn(TaskKind::Close, "close head", async move {
        let outcome = close.finalize().await;
        tracker.set_closing(false);
        outcome
    });

    Ok(command_response(
        StatusCode::OK,
        "ESCROW transaction close process started",
        "Closing",
    ))
}

/// POST /abort -- send Abort through alice
pub async fn abort(
    State(state): State<AppState>,
    body: Result<Json<ApiKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let req = parse_body(body)?;
    authorize(&state, &req)?;

    let outcome = state
        .hub
        .send_connected(PeerId::Alice, &ClientCommand::Abort)
        .await;
    state.tracker.refresh().await;

    match outcome {
        Ok(()) => Ok(command_response(
            StatusCode::OK,
            "ESCROW transaction abort process completed",
            "aborted",
        )),
        Err(e) => {
            error!(error = %e, "Abort failed");
            Ok(command_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ESCROW transaction abort process failed",
                "failed",
            ))
        }
    }
}

fn command_response(
    status: StatusCode,
    message: &str,
    state: &str,
) -> (StatusCode, Json<CommandResponse>) {
    (
        status,
        Json(CommandResponse {
            message: message.to_string(),
            state: state.to_string(),
            timestamp: Utc::now(),
        }),
    )
}
