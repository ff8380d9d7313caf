//! Shufflers: collect a batch, permute it, and release it by pattern.
//!
//! A cycle starts once at least `min_buffer_size` balls are held and every
//! output queue has drained. Every held ball, retained ones included, takes
//! part in the permutation. The first balls of the permuted batch fill the
//! output queues in pattern order; the rest stay behind for the next cycle.
//!
//! A shuffler that sits on balls for `idle_timeout` ticks without any arrival
//! fades them out over `decay_ticks` and then force-collects them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::ball::BallState;
use crate::error::{ConfigError, SimError};
use crate::event::SimEvent;
use crate::fixed::{Fixed64, Ticks};
use crate::geometry::Direction;
use crate::id::BallId;
use crate::registry::ComponentKind;
use crate::trajectory::Easing;

use super::{BuildContext, MachineContext, StateMachine, depart_planned};

fn default_output_interval() -> Ticks {
    240
}

fn default_idle_timeout() -> Ticks {
    3000
}

fn default_decay_ticks() -> Ticks {
    600
}

/// Number of balls released through one side per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEntry {
    pub side: Direction,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShufflerConfig {
    pub min_buffer_size: u32,
    pub outputs: Vec<PatternEntry>,
    #[serde(default)]
    pub retain: u32,
    #[serde(default = "default_output_interval")]
    pub output_interval: Ticks,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: Ticks,
    #[serde(default = "default_decay_ticks")]
    pub decay_ticks: Ticks,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone)]
struct OutputQueue {
    side: Direction,
    count: u32,
    pending: VecDeque<BallId>,
    next_release: Ticks,
}

#[derive(Debug, Clone)]
pub struct Shuffler {
    min_buffer_size: u32,
    queues: Vec<OutputQueue>,
    output_interval: Ticks,
    idle_timeout: Ticks,
    decay_ticks: Ticks,
    speed: Fixed64,
    /// Held balls not yet assigned to an output, in arrival order.
    held: Vec<BallId>,
    last_activity: Ticks,
    decay_started: Option<Ticks>,
    cycles: u32,
}

impl Shuffler {
    pub fn new(config: &ShufflerConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        if config.outputs.is_empty() {
            return Err(ConfigError::parameter(ctx.name, "output pattern is empty"));
        }
        let mut queues: Vec<OutputQueue> = Vec::with_capacity(config.outputs.len());
        for entry in &config.outputs {
            if entry.count == 0 {
                return Err(ConfigError::parameter(
                    ctx.name,
                    format!("output {} releases no balls", entry.side),
                ));
            }
            if queues.iter().any(|q| q.side == entry.side) {
                return Err(ConfigError::parameter(
                    ctx.name,
                    format!("output {} listed twice", entry.side),
                ));
            }
            queues.push(OutputQueue {
                side: entry.side,
                count: entry.count,
                pending: VecDeque::new(),
                next_release: 0,
            });
        }
        let released: u32 = config.outputs.iter().map(|e| e.count).sum();
        if released + config.retain != config.min_buffer_size {
            return Err(ConfigError::parameter(
                ctx.name,
                format!(
                    "pattern releases {released} and retains {}, but min_buffer_size is {}",
                    config.retain, config.min_buffer_size
                ),
            ));
        }
        if config.decay_ticks == 0 {
            return Err(ConfigError::parameter(ctx.name, "decay_ticks must be positive"));
        }
        Ok(Self {
            min_buffer_size: config.min_buffer_size,
            queues,
            output_interval: config.output_interval,
            idle_timeout: config.idle_timeout,
            decay_ticks: config.decay_ticks,
            speed: ctx.speed(ComponentKind::Shuffler, config.speed)?,
            held: Vec::new(),
            last_activity: 0,
            decay_started: None,
            cycles: 0,
        })
    }

    pub fn outputs(&self) -> Vec<Direction> {
        self.queues.iter().map(|q| q.side).collect()
    }

    /// Balls waiting for the next cycle.
    pub fn held(&self) -> &[BallId] {
        &self.held
    }

    /// Balls assigned to an output but not yet released.
    pub fn queued(&self) -> usize {
        self.queues.iter().map(|q| q.pending.len()).sum()
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn is_decaying(&self) -> bool {
        self.decay_started.is_some()
    }

    fn drained(&self) -> bool {
        self.queues.iter().all(|q| q.pending.is_empty())
    }

    fn cycle(&mut self, ctx: &mut MachineContext<'_>) {
        let mut batch = std::mem::take(&mut self.held);
        ctx.shuffle_together(&batch);
        ctx.rng().shuffle(&mut batch);
        let mut rest = batch.into_iter();
        for q in &mut self.queues {
            q.pending.extend(rest.by_ref().take(q.count as usize));
        }
        self.held = rest.collect();
        self.cycles += 1;
        self.last_activity = ctx.now;

        let shuffled = self.queued() as u32 + self.held.len() as u32;
        log::debug!(
            "shuffler at ({}, {}) cycle {}: {shuffled} balls, {} retained",
            ctx.position.x,
            ctx.position.y,
            self.cycles,
            self.held.len()
        );
        ctx.emit(SimEvent::ShufflerCycle {
            component: ctx.component,
            shuffled,
            retained: self.held.len() as u32,
            tick: ctx.now,
        });
    }

    fn release_due(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        for q in &mut self.queues {
            if ctx.now < q.next_release {
                continue;
            }
            let Some(ball) = q.pending.pop_front() else {
                continue;
            };
            ctx.ball_mut(ball)?.exit = Some(q.side);
            let to = ctx.edge(q.side);
            ctx.path_to(ball, to, self.speed, Easing::EaseIn, BallState::Exiting)?;
            q.next_release = ctx.now.saturating_add(self.output_interval);
            self.last_activity = ctx.now;
        }
        Ok(())
    }

    fn cancel_decay(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        if self.decay_started.take().is_none() {
            return Ok(());
        }
        for &ball in &self.held {
            let b = ctx.ball_mut(ball)?;
            b.state = BallState::Buffered;
            b.visual.opacity = 1.0;
        }
        Ok(())
    }

    fn update_decay(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        let Some(started) = self.decay_started else {
            let idle = ctx.now.saturating_sub(self.last_activity) >= self.idle_timeout;
            if idle && !self.held.is_empty() && self.drained() {
                log::debug!(
                    "shuffler at ({}, {}) idle, fading {} balls",
                    ctx.position.x,
                    ctx.position.y,
                    self.held.len()
                );
                self.decay_started = Some(ctx.now);
                for &ball in &self.held {
                    ctx.ball_mut(ball)?.state = BallState::Decaying;
                }
            }
            return Ok(());
        };
        let elapsed = ctx.now.saturating_sub(started);
        if elapsed >= self.decay_ticks {
            for ball in std::mem::take(&mut self.held) {
                ctx.force_collect(ball)?;
            }
            self.decay_started = None;
            self.last_activity = ctx.now;
            return Ok(());
        }
        let opacity = 1.0 - elapsed as f32 / self.decay_ticks as f32;
        for &ball in &self.held {
            ctx.ball_mut(ball)?.visual.opacity = opacity;
        }
        Ok(())
    }
}

impl StateMachine for Shuffler {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        self.last_activity = ctx.now;
        self.cancel_decay(ctx)?;
        ctx.observe(ball)?;
        let waypoints = vec![ctx.edge(entry), ctx.center()];
        ctx.start_path(ball, waypoints, self.speed, Easing::EaseOut, BallState::Entering)
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        match ctx.ball(ball)?.state {
            BallState::Entering => {
                ctx.buffer(ball, BallState::Buffered)?;
                self.held.push(ball);
                if self.decay_started.is_some() {
                    ctx.ball_mut(ball)?.state = BallState::Decaying;
                }
                Ok(())
            }
            _ => depart_planned(ctx, ball),
        }
    }

    fn check_and_output(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        if self.decay_started.is_none()
            && self.drained()
            && self.held.len() >= self.min_buffer_size as usize
        {
            self.cycle(ctx);
        }
        self.release_due(ctx)?;
        self.update_decay(ctx)
    }
}
