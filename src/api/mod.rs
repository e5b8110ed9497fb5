pub mod error;
pub mod handlers;
pub mod routes;
pub mod session;
pub mod state;
pub mod types;

pub use error::ApiError;
pub use routes::create_router;
pub use session::{Clock, ManualClock, Session, SessionStore, SystemClock};
pub use state::AppState;
