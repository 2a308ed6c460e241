//! Tier admission policy.
//!
//! Most freshly materialized pages start in the cold tier; a small
//! random fraction is admitted straight to hot. Keeping the hot tier
//! for pages with demonstrated reuse prevents scan traffic from washing
//! out the hot set. Each admission rolls independently against a
//! cache-scoped RNG.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Which tier a freshly materialized page enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The small, reuse-reserved tier.
    Hot,
    /// The default admission destination.
    Cold,
}

/// Probability-driven admission decisions.
pub struct AdmissionEngine {
    rng: Mutex<StdRng>,
}

impl AdmissionEngine {
    /// Creates an engine seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates an engine with a fixed seed, for deterministic tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Decides the initial tier for a new page.
    pub fn decide(&self, admit_hot_probability: f64) -> Placement {
        if self.roll(admit_hot_probability) {
            Placement::Hot
        } else {
            Placement::Cold
        }
    }

    /// Rolls once against `probability`, returning true with that
    /// probability. Zero never fires and one always does.
    pub fn roll(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.rng.lock().gen::<f64>() < probability
    }
}

impl Default for AdmissionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdmissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionEngine").finish_non_exhaustive()
    }
}
