pub mod api_server;
pub mod cardano_cli;
pub mod hydra_http;
pub mod hydra_ws;
pub mod waiters;

pub use api_server::{serve, start_api_server};
#[cfg(test)]
pub use cardano_cli::MockLedgerTool;
pub use cardano_cli::{CardanoCli, LedgerTool, ScratchDir};
pub use hydra_http::{HydraNodeClient, PeerEndpoints};
pub use hydra_ws::PeerHub;
pub use waiters::{MessageFilter, PendingState, WaiterRegistry};
