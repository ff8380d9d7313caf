//! Sacks: the only place balls come from.

use serde::{Deserialize, Serialize};

use crate::ball::BallState;
use crate::error::{ConfigError, SimError};
use crate::fixed::{Fixed64, Ticks};
use crate::geometry::Direction;
use crate::id::{BallId, SourceId};
use crate::registry::ComponentKind;
use crate::trajectory::Easing;

use super::{BuildContext, MachineContext, StateMachine, reject};

/// When a sack releases its balls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSchedule {
    /// Total number of balls released.
    pub count: u32,
    /// Ticks between consecutive releases.
    pub interval: Ticks,
    /// Tick of the first release.
    pub start: Ticks,
}

impl Default for SpawnSchedule {
    fn default() -> Self {
        Self {
            count: 8,
            interval: 600,
            start: 0,
        }
    }
}

impl SpawnSchedule {
    /// Tick at which ball number `index` is due. Saturates, so a release
    /// beyond the end of time never happens.
    pub fn due(&self, index: u32) -> Ticks {
        self.interval
            .saturating_mul(index as Ticks)
            .saturating_add(self.start)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SackConfig {
    pub direction: Direction,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub interval: Option<Ticks>,
    #[serde(default)]
    pub start: Option<Ticks>,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Sack {
    direction: Direction,
    source: SourceId,
    schedule: SpawnSchedule,
    released: u32,
    speed: Fixed64,
}

impl Sack {
    pub fn new(config: &SackConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let source = ctx
            .source
            .ok_or_else(|| ConfigError::UnknownSource(ctx.name.to_string()))?;
        let schedule = SpawnSchedule {
            count: config.count.unwrap_or(ctx.schedule.count),
            interval: config.interval.unwrap_or(ctx.schedule.interval),
            start: config.start.unwrap_or(ctx.schedule.start),
        };
        if schedule.count > 1 && schedule.interval == 0 {
            return Err(ConfigError::parameter(ctx.name, "spawn interval must be positive"));
        }
        Ok(Self {
            direction: config.direction,
            source,
            schedule,
            released: 0,
            speed: ctx.speed(ComponentKind::Sack, config.speed)?,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn schedule(&self) -> SpawnSchedule {
        self.schedule
    }

    pub fn released(&self) -> u32 {
        self.released
    }

    pub fn is_exhausted(&self) -> bool {
        self.released >= self.schedule.count
    }
}

impl StateMachine for Sack {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        Err(reject(ctx, ball, entry))
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        ctx.depart(ball, self.direction);
        Ok(())
    }

    fn check_and_output(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        while !self.is_exhausted() && ctx.now >= self.schedule.due(self.released) {
            let ball = ctx.spawn(self.source);
            ctx.observe(ball)?;
            let exit = ctx.edge(self.direction);
            ctx.path_to(ball, exit, self.speed, Easing::EaseOut, BallState::Exiting)?;
            self.released += 1;
        }
        Ok(())
    }
}
