//! Fallback boundary for view values.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

/// Produces a value with `attempt`, substituting `fallback()` if it returns
/// an error or panics.
///
/// `scope` names the view in the warning that is logged.
pub fn guard<T>(
    scope: &str,
    attempt: impl FnOnce() -> anyhow::Result<T>,
    fallback: impl FnOnce() -> T,
) -> T {
    match catch_unwind(AssertUnwindSafe(attempt)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(scope, "falling back: {e:#}");
            fallback()
        }
        Err(_) => {
            warn!(scope, "falling back after panic");
            fallback()
        }
    }
}
