//! Multi-level feedback-queue scheduling for chunked transfers.
//!
//! Three priority levels, lower number = higher priority: level 1 is
//! first-come-first-served, level 2 round-robin, level 3 shortest
//! remaining time first. Waiting records age upward so nothing starves;
//! long-running records are demoted downward.

pub mod engine;
pub mod queues;
pub mod record;
pub mod stats;

// Re-export common types
pub use self::engine::TransferScheduler;
pub use self::record::{Level, TransferHandle, TransferId, TransferOutcome};
pub use self::stats::CompletedTransfer;
