use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random failure injector for the full-list fetcher.
///
/// Each draw is independent; failure never touches the store. The rng is
/// seedable so tests get a deterministic failure sequence instead of an
/// unseeded random draw.
#[derive(Clone)]
pub struct FailureInjector {
    rate: f64,
    rng: Arc<Mutex<StdRng>>,
}

impl FailureInjector {
    /// Create an injector failing at the given rate (0.0..=1.0).
    /// With `seed: None` the rng is seeded from entropy.
    pub fn new(rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rate: rate.clamp(0.0, 1.0),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// An injector that never fails.
    pub fn never() -> Self {
        Self::new(0.0, None)
    }

    /// An injector that always fails.
    pub fn always() -> Self {
        Self::new(1.0, None)
    }

    /// Draw once: should the current call fail?
    pub fn should_fail(&self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        if self.rate >= 1.0 {
            return true;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen::<f64>() < self.rate
    }
}

// ============================================================================
// Tests
// ============================================================================
