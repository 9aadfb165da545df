//! The simulation's single deterministic random stream.
//!
//! Every random decision in the kernel draws from one seeded
//! [`ChaCha8Rng`], advanced only from entity updates in fixed iteration
//! order. The stream is saved with the world so a restored simulation
//! continues exactly where it left off.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Seeded random stream shared by the whole simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomStream {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomStream {
    /// Create a stream from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Seed this stream was created with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform value in `0..bound`. Returns 0 when `bound` is 0.
    pub fn below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        self.rng.gen_range(0..bound)
    }

    /// Uniform value in `low..=high`.
    pub fn between(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// Position in the stream, for state hashing.
    #[must_use]
    pub fn word_pos(&self) -> u128 {
        self.rng.get_word_pos()
    }
}

impl Default for RandomStream {
    fn default() -> Self {
        Self::new(0)
    }
}
