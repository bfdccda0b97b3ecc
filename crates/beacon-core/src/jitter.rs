//! Seedable randomness for backoff and scheduling jitter.
//!
//! A single `Jitter` is created at startup and cloned into every component
//! that needs random delays. Tests seed it so backoff is reproducible.

use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone)]
pub struct Jitter {
    rng: Arc<Mutex<StdRng>>,
}

impl Jitter {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Uniform duration in `[range.start, range.end)` at millisecond
    /// resolution. An empty range yields `range.start`.
    pub fn between(&self, range: Range<Duration>) -> Duration {
        let lo = range.start.as_millis() as u64;
        let hi = range.end.as_millis() as u64;
        if hi <= lo {
            return range.start;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        Duration::from_millis(rng.gen_range(lo..hi))
    }

}

impl std::fmt::Debug for Jitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jitter").finish_non_exhaustive()
    }
}
