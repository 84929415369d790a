pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod metadata_cache;
pub mod metrics;
pub mod naming;
pub mod orchestrator;
pub mod queue_db;
pub mod retry;
pub mod runner;
pub mod scheduler;
