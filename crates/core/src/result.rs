//! Result type definition and logging combinators.

use crate::error::Error;

/// The standard Result type for targetsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for results whose failure should be logged, not propagated.
///
/// Used on paths that must keep running after a failed call, such as the
/// polling backends.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error at `warn` if present.
    fn into_option_logged(self, context: &str) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "{context}");
                None
            }
        }
    }
}
