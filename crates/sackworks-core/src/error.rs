//! Configuration and runtime errors.
//!
//! Configuration errors are raised while a level is turned into a
//! simulation, before the first tick. Runtime errors are lifecycle
//! violations: once one is returned the simulation refuses to step again.

use crate::geometry::{Direction, GridPosition};
use crate::hypothesis::HypothesisError;
use crate::id::BallId;
use crate::registry::RegistryError;
use crate::tracker::TrackerError;
use crate::trajectory::TrajectoryError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Hypothesis(#[from] HypothesisError),

    #[error("component '{0}' is declared twice")]
    DuplicateComponent(String),

    #[error("component '{component}' at {position:?} lies outside the grid")]
    OutOfGrid {
        component: String,
        position: GridPosition,
    },

    #[error("component '{component}' overlaps another component at {position:?}")]
    Occupied {
        component: String,
        position: GridPosition,
    },

    #[error("component '{component}' refers to unknown color '{color}'")]
    UnknownColor { component: String, color: String },

    #[error("hypothesis refers to '{0}', which is not a sack")]
    UnknownSource(String),

    #[error("output '{side}' of component '{component}' is not connected to anything that accepts it")]
    UnresolvedPort { component: String, side: Direction },

    #[error("component '{component}': {reason}")]
    InvalidParameter { component: String, reason: String },

    #[error("invalid clock configuration: {0}")]
    InvalidClock(String),
}

impl ConfigError {
    pub(crate) fn parameter(component: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            component: component.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{ball} entered component '{component}' from unexpected side {side}")]
    UnexpectedEntry {
        component: String,
        ball: BallId,
        side: Direction,
    },

    #[error("{0} is not in the arena")]
    MissingBall(BallId),

    #[error("no component named '{0}'")]
    UnknownComponent(String),

    #[error("simulation halted after an earlier fault: {0}")]
    Faulted(String),
}
