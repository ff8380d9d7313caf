//! Pass-through belts: conveyors, turns and mergers.
//!
//! All three carry a ball from its entry edge to the output edge along a
//! straight line or a quarter arc, then hand it on. They differ only in which
//! sides they accept.

use serde::{Deserialize, Serialize};

use crate::ball::BallState;
use crate::error::{ConfigError, SimError};
use crate::fixed::Fixed64;
use crate::geometry::{Direction, arc_waypoints};
use crate::id::BallId;
use crate::registry::ComponentKind;
use crate::trajectory::Easing;

use super::{BuildContext, MachineContext, StateMachine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConveyorConfig {
    pub direction: Direction,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    pub from: Direction,
    pub direction: Direction,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergerConfig {
    pub direction: Direction,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Shared traversal: reveal, then ride from `entry` to `direction`.
fn carry(
    ctx: &mut MachineContext<'_>,
    ball: BallId,
    entry: Direction,
    direction: Direction,
    speed: Fixed64,
) -> Result<(), SimError> {
    ctx.observe(ball)?;
    let waypoints = arc_waypoints(ctx.position, entry, direction);
    ctx.start_path(ball, waypoints, speed, Easing::Linear, BallState::Traveling)
}

// ---------------------------------------------------------------------------
// Conveyor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Conveyor {
    direction: Direction,
    speed: Fixed64,
}

impl Conveyor {
    pub fn new(config: &ConveyorConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            direction: config.direction,
            speed: ctx.speed(ComponentKind::Conveyor, config.speed)?,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl StateMachine for Conveyor {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        carry(ctx, ball, entry, self.direction, self.speed)
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        ctx.depart(ball, self.direction);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Turn {
    from: Direction,
    direction: Direction,
    speed: Fixed64,
}

impl Turn {
    pub fn new(config: &TurnConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        if config.from == config.direction {
            return Err(ConfigError::parameter(
                ctx.name,
                format!("input and output are both {}", config.from),
            ));
        }
        Ok(Self {
            from: config.from,
            direction: config.direction,
            speed: ctx.speed(ComponentKind::Turn, config.speed)?,
        })
    }

    pub fn from(&self) -> Direction {
        self.from
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl StateMachine for Turn {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        carry(ctx, ball, entry, self.direction, self.speed)
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        ctx.depart(ball, self.direction);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Merger {
    direction: Direction,
    speed: Fixed64,
}

impl Merger {
    pub fn new(config: &MergerConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            direction: config.direction,
            speed: ctx.speed(ComponentKind::Merger, config.speed)?,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl StateMachine for Merger {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        carry(ctx, ball, entry, self.direction, self.speed)
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        ctx.depart(ball, self.direction);
        Ok(())
    }
}
