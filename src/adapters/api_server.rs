use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::error::Result;

/// Serve the escrow API until `shutdown` resolves, then drop both peer links
pub async fn start_api_server<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = &state.config.server;
    let listener = TcpListener::bind((server.host.as_str(), server.port)).await?;
    info!("🚀 API server listening on http://{}", listener.local_addr()?);

    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped, disconnecting from hydra nodes");
    state.shutdown();
    Ok(())
}
