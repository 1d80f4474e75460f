//! Latency error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while configuring latency windows.
///
/// These are configuration errors: they must be handled before serving starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LatencyError {
    /// Lower bound is greater than the upper bound.
    #[error("minimum latency {min:?} cannot be greater than maximum latency {max:?}")]
    InvalidWindow {
        /// Lower bound.
        min: Duration,
        /// Upper bound.
        max: Duration,
    },

    /// The window span does not fit in 64 bits of nanoseconds.
    #[error("latency window {min:?}..{max:?} is too wide")]
    WindowTooWide {
        /// Lower bound.
        min: Duration,
        /// Upper bound.
        max: Duration,
    },
}
