//! Robotic arms: pick a ball up, hold it, place it on the output side.
//!
//! One ball at a time. Balls that arrive while the arm is busy wait in the
//! cell, jittering, and are served first come first served.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::ball::BallState;
use crate::error::{ConfigError, SimError};
use crate::fixed::{Fixed64, Ticks};
use crate::geometry::Direction;
use crate::id::BallId;
use crate::registry::ComponentKind;
use crate::trajectory::Easing;

use super::{BuildContext, MachineContext, StateMachine};

fn default_hold_ticks() -> Ticks {
    200
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmConfig {
    pub from: Direction,
    pub direction: Direction,
    #[serde(default = "default_hold_ticks")]
    pub hold_ticks: Ticks,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grip {
    Idle,
    Picking(BallId),
    Holding { ball: BallId, until: Ticks },
    Placing(BallId),
}

#[derive(Debug, Clone)]
pub struct Arm {
    from: Direction,
    direction: Direction,
    hold_ticks: Ticks,
    speed: Fixed64,
    grip: Grip,
    waiting: VecDeque<BallId>,
}

impl Arm {
    pub fn new(config: &ArmConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        if config.from == config.direction {
            return Err(ConfigError::parameter(
                ctx.name,
                format!("input and output are both {}", config.from),
            ));
        }
        Ok(Self {
            from: config.from,
            direction: config.direction,
            hold_ticks: config.hold_ticks,
            speed: ctx.speed(ComponentKind::Arm, config.speed)?,
            grip: Grip::Idle,
            waiting: VecDeque::new(),
        })
    }

    pub fn from(&self) -> Direction {
        self.from
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_busy(&self) -> bool {
        self.grip != Grip::Idle
    }

    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    fn pick(&mut self, ctx: &mut MachineContext<'_>, ball: BallId) -> Result<(), SimError> {
        let center = ctx.center();
        ctx.path_to(ball, center, self.speed, Easing::EaseOut, BallState::Picking)?;
        self.grip = Grip::Picking(ball);
        Ok(())
    }

    fn pick_next(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        if self.grip == Grip::Idle
            && let Some(next) = self.waiting.pop_front()
        {
            self.pick(ctx, next)?;
        }
        Ok(())
    }
}

impl StateMachine for Arm {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        _entry: Direction,
    ) -> Result<(), SimError> {
        ctx.observe(ball)?;
        if self.is_busy() {
            ctx.buffer(ball, BallState::Buffered)?;
            self.waiting.push_back(ball);
            return Ok(());
        }
        self.pick(ctx, ball)
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        match self.grip {
            Grip::Picking(b) if b == ball => {
                ctx.ball_mut(ball)?.state = BallState::Holding;
                self.grip = Grip::Holding {
                    ball,
                    until: ctx.now.saturating_add(self.hold_ticks),
                };
                Ok(())
            }
            Grip::Placing(b) if b == ball => {
                ctx.depart(ball, self.direction);
                self.grip = Grip::Idle;
                self.pick_next(ctx)
            }
            _ => Err(SimError::UnexpectedEntry {
                component: ctx.name.to_string(),
                ball,
                side: self.from,
            }),
        }
    }

    fn check_and_output(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        if let Grip::Holding { ball, until } = self.grip
            && ctx.now >= until
        {
            let to = ctx.edge(self.direction);
            ctx.path_to(ball, to, self.speed, Easing::EaseInOut, BallState::Placing)?;
            self.grip = Grip::Placing(ball);
        }
        self.pick_next(ctx)
    }
}
