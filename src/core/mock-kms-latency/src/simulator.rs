//! Latency sampling.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LatencyError;
use crate::random::{RandomSource, ThreadRngSource};
use crate::window::LatencyWindow;

/// Payload sent by health checks. Requests carrying it are never delayed.
pub const LIVENESS_PROBE: &[u8] = b"ping";

/// Returns true if `payload` is the liveness-probe sentinel.
pub fn is_liveness_probe(payload: &[u8]) -> bool {
    payload == LIVENESS_PROBE
}

/// Draws simulated latencies from a [`RandomSource`].
///
/// Cloning is cheap and clones share the same source.
#[derive(Clone)]
pub struct LatencySimulator {
    source: Arc<dyn RandomSource>,
}

impl LatencySimulator {
    /// Creates a simulator drawing from `source`.
    pub fn new(source: impl RandomSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Samples a latency in `[window.min, window.max)`.
    ///
    /// A fixed window returns its bound without consuming entropy.
    pub fn sample(&self, window: &LatencyWindow) -> Duration {
        if window.is_fixed() {
            return window.min();
        }
        let offset = self.source.next_below(window.span_nanos());
        window.min() + Duration::from_nanos(offset)
    }

    /// Samples a latency from raw bounds.
    ///
    /// # Errors
    ///
    /// Returns [`LatencyError::InvalidWindow`] if `min > max`. Bounds are
    /// never swapped or clamped.
    pub fn try_sample(&self, min: Duration, max: Duration) -> Result<Duration, LatencyError> {
        let window = LatencyWindow::new(min, max)?;
        Ok(self.sample(&window))
    }
}

impl Default for LatencySimulator {
    fn default() -> Self {
        Self::new(ThreadRngSource)
    }
}

impl fmt::Debug for LatencySimulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencySimulator").finish_non_exhaustive()
    }
}
