//! Post-download validation of the produced file.

use std::path::Path;

use crate::retry::{ErrorClass, Failure};

/// Allowed relative difference between the announced and the actual size.
const SIZE_TOLERANCE: f64 = 0.02;

/// Check the finished output. `expected_bytes` is the exact total the tool
/// announced, when there was one. Returns the file size on success.
pub async fn validate_output(path: &Path, expected_bytes: Option<u64>) -> Result<u64, Failure> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| {
        Failure::new(
            ErrorClass::Integrity,
            format!("output file missing after download: {} ({})", path.display(), e),
        )
    })?;
    if !meta.is_file() {
        return Err(Failure::new(
            ErrorClass::Integrity,
            format!("output is not a regular file: {}", path.display()),
        ));
    }
    let actual = meta.len();
    if actual == 0 {
        return Err(Failure::new(
            ErrorClass::Integrity,
            format!("output file is empty: {}", path.display()),
        ));
    }
    if let Some(expected) = expected_bytes.filter(|e| *e > 0) {
        let diff = (actual as f64 - expected as f64).abs() / expected as f64;
        if diff > SIZE_TOLERANCE {
            return Err(Failure::new(
                ErrorClass::Integrity,
                format!(
                    "size mismatch for {}: expected {} bytes, found {}",
                    path.display(),
                    expected,
                    actual
                ),
            ));
        }
    }
    Ok(actual)
}
