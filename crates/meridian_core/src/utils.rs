//! # Utility Functions
//!
//! Small helpers shared across the crate.

/// Returns the current Unix timestamp in milliseconds.
///
/// A clock set before the Unix epoch yields 0 rather than panicking.
pub fn current_timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
