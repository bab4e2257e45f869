//! Wall-clock and randomness sources
//!
//! Both are injected so that assignment and timing can be replayed
//! deterministically in tests.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    /// Current wall time in milliseconds
    fn now_ms(&self) -> u64;
}

/// Real wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Source of uniform random bits for condition assignment
pub trait RandomSource: Send + Sync {
    /// One fair coin flip
    fn next_bit(&self) -> bool;
}

/// Thread-local CSPRNG seeded from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn next_bit(&self) -> bool {
        rand::rng().random::<bool>()
    }
}

/// Reproducible pseudo-random bits from a fixed seed
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Seeded generator
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_bit(&self) -> bool {
        self.rng.lock().random::<bool>()
    }
}
