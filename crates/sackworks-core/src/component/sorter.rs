//! Routing kinds with more than one output: filters and splitters.

use serde::{Deserialize, Serialize};

use crate::ball::BallState;
use crate::error::{ConfigError, SimError};
use crate::fixed::Fixed64;
use crate::geometry::{Direction, arc_waypoints};
use crate::id::{BallId, ColorId};
use crate::registry::ComponentKind;
use crate::trajectory::Easing;

use super::{BuildContext, MachineContext, StateMachine, depart_planned};

fn route(
    ctx: &mut MachineContext<'_>,
    ball: BallId,
    entry: Direction,
    exit: Direction,
    speed: Fixed64,
) -> Result<(), SimError> {
    ctx.ball_mut(ball)?.exit = Some(exit);
    let waypoints = arc_waypoints(ctx.position, entry, exit);
    ctx.start_path(ball, waypoints, speed, Easing::Linear, BallState::Traveling)
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Palette name of the color sent to `match_side`.
    pub color: String,
    pub match_side: Direction,
    pub other_side: Direction,
    /// Entry side; defaults to the back of `match_side`.
    #[serde(default)]
    pub from: Option<Direction>,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Sends balls of one color one way and everything else the other way.
/// Always reveals: its routing depends on the color.
#[derive(Debug, Clone)]
pub struct Filter {
    color: ColorId,
    match_side: Direction,
    other_side: Direction,
    from: Direction,
    speed: Fixed64,
}

impl Filter {
    pub fn new(config: &FilterConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let color = ctx
            .registry
            .color_id(&config.color)
            .ok_or_else(|| ConfigError::UnknownColor {
                component: ctx.name.to_string(),
                color: config.color.clone(),
            })?;
        if config.match_side == config.other_side {
            return Err(ConfigError::parameter(ctx.name, "both outputs use the same side"));
        }
        let from = config.from.unwrap_or(config.match_side.opposite());
        if from == config.match_side || from == config.other_side {
            return Err(ConfigError::parameter(
                ctx.name,
                format!("input side {from} is also an output"),
            ));
        }
        Ok(Self {
            color,
            match_side: config.match_side,
            other_side: config.other_side,
            from,
            speed: ctx.speed(ComponentKind::Filter, config.speed)?,
        })
    }

    pub fn from(&self) -> Direction {
        self.from
    }

    pub fn outputs(&self) -> Vec<Direction> {
        vec![self.match_side, self.other_side]
    }
}

impl StateMachine for Filter {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        ctx.observe(ball)?;
        let exit = if ctx.ball(ball)?.color == self.color {
            self.match_side
        } else {
            self.other_side
        };
        route(ctx, ball, entry, exit, self.speed)
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        depart_planned(ctx, ball)
    }
}

// ---------------------------------------------------------------------------
// Splitter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitterConfig {
    pub outputs: Vec<Direction>,
    /// Entry side; defaults to the back of the first output.
    #[serde(default)]
    pub from: Option<Direction>,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Deals balls to its outputs in round-robin order.
#[derive(Debug, Clone)]
pub struct Splitter {
    outputs: Vec<Direction>,
    from: Direction,
    next: usize,
    speed: Fixed64,
}

impl Splitter {
    pub fn new(config: &SplitterConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let [first, rest @ ..] = config.outputs.as_slice() else {
            return Err(ConfigError::parameter(ctx.name, "a splitter needs outputs"));
        };
        if rest.is_empty() {
            return Err(ConfigError::parameter(ctx.name, "a splitter needs at least two outputs"));
        }
        for (i, side) in config.outputs.iter().enumerate() {
            if config.outputs[..i].contains(side) {
                return Err(ConfigError::parameter(ctx.name, format!("output {side} listed twice")));
            }
        }
        let from = config.from.unwrap_or(first.opposite());
        if config.outputs.contains(&from) {
            return Err(ConfigError::parameter(
                ctx.name,
                format!("input side {from} is also an output"),
            ));
        }
        Ok(Self {
            outputs: config.outputs.clone(),
            from,
            next: 0,
            speed: ctx.speed(ComponentKind::Splitter, config.speed)?,
        })
    }

    pub fn from(&self) -> Direction {
        self.from
    }

    pub fn outputs(&self) -> &[Direction] {
        &self.outputs
    }
}

impl StateMachine for Splitter {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        ctx.observe(ball)?;
        let exit = self.outputs[self.next];
        self.next = (self.next + 1) % self.outputs.len();
        route(ctx, ball, entry, exit, self.speed)
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        depart_planned(ctx, ball)
    }
}
