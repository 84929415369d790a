//! Persistent queue database (SQLite via sqlx).
//!
//! Stores jobs in user-visible order together with their progress, retry
//! state and clip bounds. [`QueueStore`] is the ordered in-memory view the
//! orchestrator mutates.

pub mod db;
pub mod types;

mod jobs;
mod store;

pub use db::{unix_millis, QueueDb};
pub use store::{AddOutcome, QueueStore};
pub use types::*;

#[cfg(test)]
mod tests;
