//! Latency windows.

use std::time::Duration;

use crate::error::LatencyError;

/// A validated `[min, max]` latency window.
///
/// `min <= max` always holds; the span fits in a `u64` of nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyWindow {
    min: Duration,
    max: Duration,
}

impl LatencyWindow {
    /// A window that never delays.
    pub const ZERO: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Creates a window, rejecting `min > max`.
    pub fn new(min: Duration, max: Duration) -> Result<Self, LatencyError> {
        if min > max {
            return Err(LatencyError::InvalidWindow { min, max });
        }
        if u64::try_from((max - min).as_nanos()).is_err() {
            return Err(LatencyError::WindowTooWide { min, max });
        }
        Ok(Self { min, max })
    }

    /// Creates a window that always yields `latency`.
    pub fn fixed(latency: Duration) -> Self {
        Self {
            min: latency,
            max: latency,
        }
    }

    /// Lower bound.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Returns true if every sample equals `min`.
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    /// Span of the window in nanoseconds.
    pub(crate) fn span_nanos(&self) -> u64 {
        // Bounded by the check in `new`.
        (self.max - self.min).as_nanos() as u64
    }
}
