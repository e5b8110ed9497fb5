//! Head lifecycle pipelines and the state they share.

pub mod balance;
pub mod close;
pub mod commit;
pub mod lifecycle;
pub mod payment;
pub mod tasks;
pub mod tracker;
pub mod transfer;

pub use balance::BalanceReader;
pub use close::ClosePipeline;
pub use commit::CommitPipeline;
pub use lifecycle::HeadLifecycle;
pub use payment::{wait_for_transaction_processing, ConfirmationWatch, PaymentPipeline};
pub use tasks::{BackgroundTasks, TaskKind, TaskRecord, TaskStatus};
pub use tracker::HeadStateTracker;
pub use transfer::L1Transfer;
