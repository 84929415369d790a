//! CLI command handlers, one file per command.

mod add;
mod clear_completed;
mod control;
mod generate;
mod metrics;
mod remove;
mod reorder;
mod run;
mod status;

pub use add::{run_add, AddArgs};
pub use clear_completed::run_clear_completed;
pub use control::{run_retry_failed, run_start, run_stop};
pub use generate::{print_completions, print_man_page};
pub use metrics::run_metrics;
pub use remove::run_remove;
pub use reorder::run_reorder;
pub use run::run_session;
pub use status::{print_jobs, run_status};
