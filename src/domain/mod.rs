pub mod ledger;
pub mod message;
pub mod peer;
pub mod state;

pub use ledger::*;
pub use message::*;
pub use peer::*;
pub use state::*;
