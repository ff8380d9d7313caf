//! Consistency checks and determinism validation.
//!
//! [`check_invariants`] inspects a running simulation for states that should
//! be impossible. [`validate_determinism`] runs a level twice and compares
//! state hashes step by step.

use crate::engine::Simulation;
use crate::error::ConfigError;
use crate::id::{BallId, ComponentId};
use crate::level::LevelDescriptor;
use crate::tracker::GroupKey;

/// Tolerance for probabilities that should sum to one.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("{ball} is owned by missing component {component:?}")]
    Orphaned { ball: BallId, component: ComponentId },

    #[error("{0} is consumed but still in the arena")]
    ConsumedInArena(BallId),

    #[error("{0} has a trajectory that does not end on its last waypoint")]
    BadTrajectory(BallId),

    #[error("{0} is in the arena but unknown to the tracker")]
    Untracked(BallId),

    #[error("group {group:?} posterior sums to {total}")]
    GroupMass { group: GroupKey, total: f64 },

    #[error("world posterior sums to {0}")]
    WorldMass(f64),

    #[error("live posterior differs from journal replay by {0}")]
    ReplayDivergence(f64),

    #[error("replay failed: {0}")]
    Replay(String),
}

/// Check every structural and probabilistic invariant of a simulation.
pub fn check_invariants(sim: &Simulation) -> Result<(), InvariantViolation> {
    for ball in sim.balls().iter() {
        if sim.graph().node(ball.component).is_none() {
            return Err(InvariantViolation::Orphaned {
                ball: ball.id,
                component: ball.component,
            });
        }
        if ball.state == crate::ball::BallState::Consumed {
            return Err(InvariantViolation::ConsumedInArena(ball.id));
        }
        if let Some(t) = &ball.trajectory {
            let last = t.waypoints().last().copied().unwrap_or_default();
            if t.duration() == 0 || t.point_at(1.0).distance(last) > 1e-4 {
                return Err(InvariantViolation::BadTrajectory(ball.id));
            }
        }
        if !sim.tracker().is_tracked(ball.id) {
            return Err(InvariantViolation::Untracked(ball.id));
        }
    }

    let tracker = sim.tracker();
    for group in tracker.groups() {
        let total = tracker
            .group_posterior(group)
            .map_or(0.0, |p| p.total());
        if (total - 1.0).abs() > PROBABILITY_EPSILON {
            return Err(InvariantViolation::GroupMass { group, total });
        }
    }

    let worlds: f64 = tracker.world_posterior().iter().sum();
    if (worlds - 1.0).abs() > PROBABILITY_EPSILON {
        return Err(InvariantViolation::WorldMass(worlds));
    }

    let divergence = tracker
        .replay_divergence()
        .map_err(|e| InvariantViolation::Replay(e.to_string()))?;
    if divergence > PROBABILITY_EPSILON {
        return Err(InvariantViolation::ReplayDivergence(divergence));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Quick compare
// ---------------------------------------------------------------------------

/// Per-subsystem match results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemDiff {
    pub sim_state_matches: bool,
    pub balls_match: bool,
    pub tracker_matches: bool,
}

impl SubsystemDiff {
    pub fn is_identical(&self) -> bool {
        self.sim_state_matches && self.balls_match && self.tracker_matches
    }
}

/// Subsystem-level comparison using hashes.
pub fn quick_compare(a: &Simulation, b: &Simulation) -> SubsystemDiff {
    let ha = a.subsystem_hashes();
    let hb = b.subsystem_hashes();
    SubsystemDiff {
        sim_state_matches: ha.sim_state == hb.sim_state,
        balls_match: ha.balls == hb.balls,
        tracker_matches: ha.tracker == hb.tracker,
    }
}

// ---------------------------------------------------------------------------
// Determinism validation
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DeterminismResult {
    pub is_deterministic: bool,
    /// Step at which the runs first diverged.
    pub divergence_step: Option<u64>,
    /// (step, hash_run1, hash_run2) for each step.
    pub hash_log: Vec<(u64, u64, u64)>,
}

/// Build a level twice and step both copies in lockstep.
///
/// A run that faults counts as divergent at the faulting step unless both
/// copies fault identically.
pub fn validate_determinism(
    level: &LevelDescriptor,
    steps: u64,
) -> Result<DeterminismResult, ConfigError> {
    let mut a = Simulation::from_level(level)?;
    let mut b = Simulation::from_level(level)?;

    let mut hash_log = Vec::new();
    let mut divergence_step = None;

    for step in 1..=steps {
        let ra = a.step();
        let rb = b.step();
        let hash_a = a.state_hash();
        let hash_b = b.state_hash();
        hash_log.push((step, hash_a, hash_b));

        if divergence_step.is_none() && (hash_a != hash_b || ra != rb) {
            divergence_step = Some(step);
        }
        if ra.is_err() || rb.is_err() {
            break;
        }
    }

    Ok(DeterminismResult {
        is_deterministic: divergence_step.is_none(),
        divergence_step,
        hash_log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{line_level, shuffler_level};

    #[test]
    fn fresh_simulation_is_consistent() {
        let sim = Simulation::from_level(&shuffler_level(6)).unwrap();
        assert_eq!(check_invariants(&sim), Ok(()));
    }

    #[test]
    fn invariants_hold_throughout_a_run() {
        let mut sim = Simulation::from_level(&shuffler_level(6)).unwrap();
        for _ in 0..600 {
            sim.step().unwrap();
            check_invariants(&sim).unwrap();
        }
    }

    #[test]
    fn identical_runs_compare_equal() {
        let level = line_level(2, false);
        let mut a = Simulation::from_level(&level).unwrap();
        let mut b = Simulation::from_level(&level).unwrap();
        a.run_until(1_000).unwrap();
        b.run_until(1_000).unwrap();
        assert!(quick_compare(&a, &b).is_identical());
        b.step().unwrap();
        let diff = quick_compare(&a, &b);
        assert!(!diff.sim_state_matches);
    }

    #[test]
    fn shuffler_level_is_deterministic() {
        let result = validate_determinism(&shuffler_level(8), 500).unwrap();
        assert!(result.is_deterministic);
        assert_eq!(result.hash_log.len(), 500);
        assert!(result.divergence_step.is_none());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut level = shuffler_level(8);
        let a = Simulation::from_level(&level).unwrap();
        level.seed += 1;
        let b = Simulation::from_level(&level).unwrap();
        assert!(!quick_compare(&a, &b).sim_state_matches);
    }
}
