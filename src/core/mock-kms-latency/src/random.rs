//! Random sources for latency sampling.
//!
//! The default source uses the thread-local generator, seeded from the
//! operating system. Tests can inject a [`SeededSource`] to get reproducible
//! delays.

use std::sync::Mutex;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// A source of uniformly distributed integers.
pub trait RandomSource: Send + Sync {
    /// Returns a value uniformly distributed in `[0, bound)`.
    ///
    /// `bound` is never zero.
    fn next_below(&self, bound: u64) -> u64;
}

/// OS-seeded, non-deterministic source backed by `rand::thread_rng`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn next_below(&self, bound: u64) -> u64 {
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Deterministic source seeded with a fixed value.
#[derive(Debug)]
pub struct SeededSource {
    rng: Mutex<StdRng>,
}

impl SeededSource {
    /// Creates a source that produces the same sequence for the same seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededSource {
    fn next_below(&self, bound: u64) -> u64 {
        // A poisoned generator is still a valid generator.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0..bound)
    }
}
