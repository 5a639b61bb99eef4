//! Injectable randomness for record and option picks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Shared, seedable random source.
///
/// Clones share one generator, so a seeded run makes the same picks in the
/// same order regardless of which component asks.
#[derive(Clone)]
pub struct Randomness {
    rng: Arc<Mutex<StdRng>>,
    seed: Option<u64>,
}

impl Randomness {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            seed: Some(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
            seed: None,
        }
    }

    /// Seeded when `seed` is set, otherwise from OS entropy.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map(Self::seeded).unwrap_or_else(Self::from_entropy)
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Uniform index in `0..len`, `None` for an empty range.
    pub fn index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        Some(rng.gen_range(0..len))
    }

    /// `len` random uppercase ASCII letters.
    pub fn letters(&self, len: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..len).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect()
    }
}

impl Default for Randomness {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl fmt::Debug for Randomness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Randomness").field("seed", &self.seed).finish()
    }
}
