//! Clock configuration, simulation state, and the state hash.
//!
//! Every strategy runs the same step; they only differ in how many steps an
//! [`advance`](crate::engine::Simulation::advance) call runs.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fixed::Ticks;

// ---------------------------------------------------------------------------
// Simulation strategy
// ---------------------------------------------------------------------------

/// How the simulation advances time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStrategy {
    /// One step per `step()` call. Deterministic by construction.
    #[default]
    Tick,

    /// Real-time mode. `advance(elapsed)` accumulates elapsed ticks and runs
    /// as many fixed steps as fit, carrying the remainder forward.
    Delta {
        /// Elapsed ticks consumed per step.
        fixed_timestep: Ticks,
    },
}

fn default_step_ticks() -> Ticks {
    16
}

/// Clock section of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Simulated ticks per step.
    #[serde(default = "default_step_ticks")]
    pub step_ticks: Ticks,
    #[serde(default)]
    pub strategy: SimulationStrategy,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            step_ticks: default_step_ticks(),
            strategy: SimulationStrategy::Tick,
        }
    }
}

impl ClockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_ticks == 0 {
            return Err(ConfigError::InvalidClock("step_ticks must be positive".into()));
        }
        if let SimulationStrategy::Delta { fixed_timestep: 0 } = self.strategy {
            return Err(ConfigError::InvalidClock("fixed_timestep must be positive".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimState {
    /// Steps run so far.
    pub steps: u64,
    /// Authoritative simulation time.
    pub now: Ticks,
    /// Elapsed time not yet consumed by a step, in delta mode.
    pub accumulator: Ticks,
    pub paused: bool,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of a `Simulation::advance()` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceResult {
    pub steps_run: u64,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// FNV-1a (64-bit) hash of simulation state for desync detection. Not
/// cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    /// Floats are hashed by bit pattern.
    pub fn write_f32(&mut self, v: f32) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_starts_at_zero() {
        let state = SimState::new();
        assert_eq!(state.steps, 0);
        assert_eq!(state.now, 0);
        assert!(!state.paused);
    }

    #[test]
    fn clock_validation() {
        assert!(ClockConfig::default().validate().is_ok());
        let zero = ClockConfig {
            step_ticks: 0,
            ..ClockConfig::default()
        };
        assert!(zero.validate().is_err());
        let delta = ClockConfig {
            step_ticks: 16,
            strategy: SimulationStrategy::Delta { fixed_timestep: 0 },
        };
        assert!(delta.validate().is_err());
    }

    #[test]
    fn clock_deserializes_with_defaults() {
        let c: ClockConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c, ClockConfig::default());
        let c: ClockConfig =
            serde_json::from_str(r#"{"strategy": {"delta": {"fixed_timestep": 16}}}"#).unwrap();
        assert_eq!(c.strategy, SimulationStrategy::Delta { fixed_timestep: 16 });
    }

    fn ball_hash(id: u64, x: f32) -> u64 {
        let mut h = StateHash::default();
        h.write_u64(id);
        h.write_f32(x);
        h.finish()
    }

    /// Two balls that swapped places, or a ball nudged by a signed zero,
    /// must not hash the same.
    #[test]
    fn hash_tells_ball_states_apart() {
        let a = ball_hash(1, 0.5) ^ ball_hash(2, 1.5).rotate_left(1);
        let b = ball_hash(2, 0.5) ^ ball_hash(1, 1.5).rotate_left(1);
        assert_ne!(a, b);
        assert_ne!(ball_hash(1, 0.0), ball_hash(1, -0.0));
        assert_eq!(ball_hash(3, 2.0), ball_hash(3, 2.0));
    }
}
