//! Process-wide simulation context
//!
//! The embedder creates one [`SimContext`] and passes it to every model it
//! builds. Models hold a reference to, but not the lifetime of, the
//! context; nothing here is a hidden process-wide singleton.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Shared simulation context: time scaling and reset seeding
///
/// This kernel declares zero simulated delay, so the time unit and
/// precision are carried only for introspection.
#[derive(Debug, Clone)]
pub struct SimContext {
    time_unit: i8,
    time_precision: i8,
    seed: u64,
}

impl SimContext {
    pub fn new() -> Self {
        Self {
            time_unit: -12,
            time_precision: -12,
            seed: 0,
        }
    }

    /// Context with a specific seed for randomized signal reset
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::new()
        }
    }

    pub fn set_time_unit(&mut self, unit: i8) {
        self.time_unit = unit;
    }

    pub fn set_time_precision(&mut self, precision: i8) {
        self.time_precision = precision;
    }

    pub fn time_unit(&self) -> i8 {
        self.time_unit
    }

    pub fn time_precision(&self) -> i8 {
        self.time_precision
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Deterministic RNG for reset-value fill
    pub(crate) fn reset_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new()
    }
}
