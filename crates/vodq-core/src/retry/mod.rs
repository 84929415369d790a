//! Retry and backoff policy.
//!
//! Failed downloader runs are classified into an [`ErrorClass`]; the policy
//! turns class and attempt number into a decision, and [`RetryManager`]
//! applies that decision to the job record.

mod classify;
mod manager;
mod policy;

pub use classify::{classify_exit, Failure};
pub use manager::{RetryManager, RetryOutcome};
pub use policy::{ErrorClass, RetryDecision, RetryPolicy};
