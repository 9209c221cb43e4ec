//! Uniform random template selection.

use std::sync::{Mutex, PoisonError};

use promo_core::types::Template;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks templates uniformly from the active pool.
///
/// The generator is seeded once per process; tests pass a fixed seed.
pub struct TemplatePicker {
    rng: Mutex<StdRng>,
}

impl TemplatePicker {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// `None` only for an empty pool.
    pub fn pick<'a>(&self, pool: &'a [Template]) -> Option<&'a Template> {
        if pool.is_empty() {
            return None;
        }
        let idx = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..pool.len());
        pool.get(idx)
    }
}

impl Default for TemplatePicker {
    fn default() -> Self {
        Self::from_entropy()
    }
}
