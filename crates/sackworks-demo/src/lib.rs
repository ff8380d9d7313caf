//! Headless level runner.
//!
//! Runs a level to completion twice from the same descriptor, checks that
//! both runs end in the same state, and collects what a player would see at
//! the end: the collection point contents and the tracker's posterior.

use sackworks_core::engine::Simulation;
use sackworks_core::error::{ConfigError, SimError};
use sackworks_core::fixed::Ticks;
use sackworks_core::id::SourceId;
use sackworks_core::level::LevelDescriptor;
use sackworks_core::registry::ComponentKind;
use sackworks_core::tracker::{BucketedSnapshot, PosteriorSnapshot};
use sackworks_core::validation::{InvariantViolation, check_invariants};

/// Default tick budget for one run.
pub const DEFAULT_TICK_LIMIT: Ticks = 120_000;

/// Posterior percentages are shown in whole points.
pub const DISPLAY_GRANULARITY: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("level '{level}' failed to build: {source}")]
    Build {
        level: String,
        #[source]
        source: ConfigError,
    },

    #[error("level '{level}' faulted: {source}")]
    Fault {
        level: String,
        #[source]
        source: SimError,
    },

    #[error("level '{level}' did not drain within {limit} ticks")]
    NotDrained { level: String, limit: Ticks },

    #[error("level '{level}' broke an invariant: {source}")]
    Invariant {
        level: String,
        #[source]
        source: InvariantViolation,
    },

    #[error("level '{level}' is not deterministic: {first:#018x} != {second:#018x}")]
    Nondeterministic {
        level: String,
        first: u64,
        second: u64,
    },
}

/// Contents of one collection point after the run.
#[derive(Debug, Clone, PartialEq)]
pub struct BinReport {
    pub name: String,
    /// Color names in arrival order; `None` for balls collected unseen.
    pub results: Vec<Option<String>>,
}

/// Outcome of running a level to completion.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub level: String,
    pub ticks: Ticks,
    pub steps: u64,
    pub state_hash: u64,
    pub bins: Vec<BinReport>,
    pub posterior: PosteriorSnapshot,
    pub bucketed: BucketedSnapshot,
    /// Label of the world actually drawn for this run, per source.
    pub truth: Vec<(String, String)>,
}

/// Run one simulation of `level` until every sack is empty and every ball
/// has left the floor.
pub fn run_once(level: &LevelDescriptor, limit: Ticks) -> Result<RunReport, DemoError> {
    let mut sim = Simulation::from_level(level).map_err(|source| DemoError::Build {
        level: level.name.clone(),
        source,
    })?;

    let mut steps = 0;
    while !sim.is_drained() {
        if sim.now() >= limit {
            return Err(DemoError::NotDrained {
                level: level.name.clone(),
                limit,
            });
        }
        let result = sim.step().map_err(|source| DemoError::Fault {
            level: level.name.clone(),
            source,
        })?;
        steps += result.steps_run;
    }
    check_invariants(&sim).map_err(|source| DemoError::Invariant {
        level: level.name.clone(),
        source,
    })?;

    Ok(report(&sim, steps))
}

/// Run `level` twice and require identical final state hashes.
pub fn run_checked(level: &LevelDescriptor, limit: Ticks) -> Result<RunReport, DemoError> {
    let first = run_once(level, limit)?;
    let second = run_once(level, limit)?;
    if first.state_hash != second.state_hash {
        return Err(DemoError::Nondeterministic {
            level: level.name.clone(),
            first: first.state_hash,
            second: second.state_hash,
        });
    }
    log::debug!(
        "'{}' reproduced hash {:#018x}",
        level.name,
        first.state_hash
    );
    Ok(first)
}

fn report(sim: &Simulation, steps: u64) -> RunReport {
    let registry = sim.registry();
    let bins = sim
        .component_snapshots()
        .into_iter()
        .filter(|c| c.kind == ComponentKind::CollectionPoint)
        .map(|c| BinReport {
            name: c.name,
            results: c
                .results
                .iter()
                .map(|r| r.and_then(|color| registry.color_name(color).map(str::to_string)))
                .collect(),
        })
        .collect();

    let space = sim.tracker().space();
    let world = space.world(sim.truth_world());
    let truth = world
        .assignment
        .iter()
        .enumerate()
        .map(|(i, &alt)| {
            let source = SourceId(i as u32);
            let label = space
                .alternatives(source)
                .get(alt)
                .map(|a| a.label.clone())
                .unwrap_or_default();
            (space.source_name(source).to_string(), label)
        })
        .collect();

    RunReport {
        level: sim.name().to_string(),
        ticks: sim.now(),
        steps,
        state_hash: sim.state_hash(),
        bins,
        posterior: sim.posterior(),
        bucketed: sim.bucketed_posterior(DISPLAY_GRANULARITY),
        truth,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sackworks_core::test_utils::*;

    #[test]
    fn line_level_report() {
        let report = run_checked(&line_level(3, false), DEFAULT_TICK_LIMIT).unwrap();
        assert_eq!(report.level, "line");
        assert_eq!(report.bins.len(), 1);
        assert_eq!(report.bins[0].results.len(), 3);
        assert!(report.bins[0].results.iter().all(Option::is_some));
        assert_eq!(report.truth.len(), 1);
        assert_eq!(report.bucketed.worlds.iter().sum::<u32>(), 100);
    }

    #[test]
    fn shuffler_report_names_both_sacks() {
        let report = run_once(&shuffler_level(4), DEFAULT_TICK_LIMIT).unwrap();
        let sources: Vec<&str> = report.truth.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(sources, ["a", "b"]);
        let total: f64 = report.posterior.worlds.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tiny_limit_is_not_drained() {
        let err = run_once(&line_level(3, false), 16).unwrap_err();
        assert!(matches!(err, DemoError::NotDrained { .. }));
    }
}
