//! # Mock KMS Latency
//!
//! Artificial latency for the mock KMS plugin.
//!
//! Every encrypt/decrypt call draws one delay, uniformly distributed in a
//! configured `[min, max)` window, to simulate the response time of a real
//! KMS backend. This crate provides:
//! - Validated latency windows
//! - Pluggable random sources (OS-seeded or deterministic)
//! - The liveness-probe check used to skip delays on health checks

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod random;
pub mod simulator;
pub mod window;

pub use error::LatencyError;
pub use random::{RandomSource, SeededSource, ThreadRngSource};
pub use simulator::{is_liveness_probe, LatencySimulator, LIVENESS_PROBE};
pub use window::LatencyWindow;
