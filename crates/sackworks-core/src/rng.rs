//! Deterministic PRNG for simulation use (color draws, shuffles, jitter).
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, and a fixed seed
//! reproduces a whole run.

use crate::fixed::Fixed64;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform Fixed64 in `[0, 1)`.
    pub fn next_unit(&mut self) -> Fixed64 {
        // Upper 32 bits become the fractional part of a Q32.32 value.
        let upper = self.next_u64() >> 32;
        Fixed64::from_bits(upper as i64)
    }

    /// Uniform f32 in `[-1, 1)`. Only for visual jitter.
    pub fn next_signed_f32(&mut self) -> f32 {
        let upper = (self.next_u64() >> 40) as f32;
        upper / (1u64 << 23) as f32 - 1.0
    }

    /// Uniform integer in `[0, bound)`. Returns 0 when `bound` is 0.
    pub fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        // Rejection sampling removes modulo bias.
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let r = self.next_u64();
            if r < zone {
                return r % bound;
            }
        }
    }

    /// Returns `true` with the given probability (Fixed64 in [0, 1]).
    pub fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::ONE {
            return true;
        }
        self.next_unit() < probability
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }

    /// Get the internal state (for hashing).
    pub fn state(&self) -> u64 {
        self.state
    }
}
