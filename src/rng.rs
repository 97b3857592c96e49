use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Arc;

/// Shared randomness handle for vote and replication simulation.
///
/// The generator is injected at construction so callers control the source:
/// production code seeds from entropy, tests pass a seeded [`StdRng`] or a
/// step generator for fully deterministic draws. Cloning shares the
/// underlying generator.
#[derive(Clone)]
pub struct SwarmRng {
    inner: Arc<Mutex<Box<dyn RngCore + Send>>>,
}

impl SwarmRng {
    pub fn new(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(rng))),
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Bernoulli draw: true with the given probability.
    pub fn chance(&self, probability: f64) -> bool {
        self.inner.lock().gen::<f64>() < probability
    }

    /// Uniform draw in `[lo, hi)`.
    pub fn uniform(&self, lo: f64, hi: f64) -> f64 {
        self.inner.lock().gen_range(lo..hi)
    }

    /// Uniform integer draw in `[lo, hi]`.
    pub fn int_between(&self, lo: u32, hi: u32) -> u32 {
        self.inner.lock().gen_range(lo..=hi)
    }
}

impl std::fmt::Debug for SwarmRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SwarmRng")
    }
}
