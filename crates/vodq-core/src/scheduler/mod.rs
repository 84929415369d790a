//! Job scheduler policy.
//!
//! Exactly one job runs at a time. This module decides which one and how
//! hard the external downloader is driven; the orchestrator owns the timer
//! and the actual start.

mod choose;
mod tuning;

pub use choose::choose_next;
pub use tuning::Tuning;
