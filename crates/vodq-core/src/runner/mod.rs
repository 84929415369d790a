//! Job runner: owns the single external download process.
//!
//! build arguments → spawn → read stdout/stderr line by line → progress
//! samples → exit classification → output validation.

mod integrity;
mod invoke;
mod process;
mod progress;

pub use integrity::validate_output;
pub use invoke::{build_args, DownloadRequest};
pub use process::{run_download, RunOutcome, StopKind};
pub use progress::{merge, parse_line, parse_size, speed_bytes_per_sec, ProgressSample};
