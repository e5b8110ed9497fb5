pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod head;

pub use adapters::{CardanoCli, HydraNodeClient, LedgerTool, PeerEndpoints, PeerHub};
pub use api::{create_router, AppState};
pub use config::AppConfig;
pub use domain::{HeadState, MessageTag, PeerId, ProtocolMessage};
pub use error::{EscrowError, Result};
