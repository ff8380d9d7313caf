//! Duplicators: hold a ball briefly, then release it together with an exact
//! copy.

use serde::{Deserialize, Serialize};

use crate::ball::BallState;
use crate::error::{ConfigError, SimError};
use crate::fixed::{Fixed64, Ticks};
use crate::geometry::Direction;
use crate::id::BallId;
use crate::registry::ComponentKind;
use crate::trajectory::Easing;

use super::{BuildContext, MachineContext, StateMachine, depart_planned};

fn default_hold_ticks() -> Ticks {
    300
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatorConfig {
    pub from: Direction,
    pub original_side: Direction,
    pub copy_side: Direction,
    #[serde(default = "default_hold_ticks")]
    pub hold_ticks: Ticks,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Duplicator {
    from: Direction,
    original_side: Direction,
    copy_side: Direction,
    hold_ticks: Ticks,
    speed: Fixed64,
    /// Buffered balls and the tick each one is released at, in arrival order.
    held: Vec<(BallId, Ticks)>,
}

impl Duplicator {
    pub fn new(config: &DuplicatorConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        if config.original_side == config.copy_side {
            return Err(ConfigError::parameter(ctx.name, "original and copy share a side"));
        }
        if config.from == config.original_side || config.from == config.copy_side {
            return Err(ConfigError::parameter(
                ctx.name,
                format!("input side {} is also an output", config.from),
            ));
        }
        Ok(Self {
            from: config.from,
            original_side: config.original_side,
            copy_side: config.copy_side,
            hold_ticks: config.hold_ticks,
            speed: ctx.speed(ComponentKind::Duplicator, config.speed)?,
            held: Vec::new(),
        })
    }

    pub fn from(&self) -> Direction {
        self.from
    }

    pub fn outputs(&self) -> Vec<Direction> {
        vec![self.original_side, self.copy_side]
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }

    fn release(
        &self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        side: Direction,
    ) -> Result<(), SimError> {
        ctx.ball_mut(ball)?.exit = Some(side);
        let to = ctx.edge(side);
        ctx.path_to(ball, to, self.speed, Easing::EaseIn, BallState::Exiting)
    }
}

impl StateMachine for Duplicator {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
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
                self.held.push((ball, ctx.now.saturating_add(self.hold_ticks)));
                Ok(())
            }
            _ => depart_planned(ctx, ball),
        }
    }

    fn check_and_output(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        let now = ctx.now;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.held)
            .into_iter()
            .partition(|(_, release)| *release <= now);
        self.held = waiting;
        for (ball, _) in due {
            let copy = ctx.duplicate(ball)?;
            self.release(ctx, ball, self.original_side)?;
            self.release(ctx, copy, self.copy_side)?;
            log::debug!("duplicated {ball} into {copy}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::harness::Harness;
    use super::*;
    use crate::tracker::TrackerEvent;

    fn duplicator(h: &Harness) -> Duplicator {
        Duplicator::new(
            &DuplicatorConfig {
                from: Direction::West,
                original_side: Direction::East,
                copy_side: Direction::South,
                hold_ticks: 100,
                speed: None,
            },
            &h.build_ctx(ComponentKind::Duplicator),
        )
        .unwrap()
    }

    #[test]
    fn holds_then_releases_original_and_copy() {
        let mut h = Harness::new();
        let mut d = duplicator(&h);
        let ball = h.ball(1);
        let mut ctx = h.ctx(ComponentKind::Duplicator);
        d.on_arrival(&mut ctx, ball, Direction::West).unwrap();

        h.run(&mut d, ComponentKind::Duplicator, 300);
        assert_eq!(d.held(), 1);
        assert_eq!(h.balls.get(ball).unwrap().state, BallState::Buffered);
        assert!(h.balls.get(ball).unwrap().body.is_some());

        h.run(&mut d, ComponentKind::Duplicator, 2000);
        assert_eq!(d.held(), 0);
        assert_eq!(h.balls.len(), 2);
        let mut departed = h.departed();
        departed.sort();
        assert_eq!(departed[0], (ball, Direction::East));
        assert_eq!(departed[1].1, Direction::South);
    }

    #[test]
    fn copy_is_exact() {
        let mut h = Harness::new();
        let mut d = duplicator(&h);
        let ball = h.ball(1);
        let mut ctx = h.ctx(ComponentKind::Duplicator);
        d.on_arrival(&mut ctx, ball, Direction::West).unwrap();
        h.run(&mut d, ComponentKind::Duplicator, 1000);

        let copy = h.balls.iter().map(|b| b.id).find(|&id| id != ball).unwrap();
        let (o, c) = (h.balls.get(ball).unwrap(), h.balls.get(copy).unwrap());
        assert_eq!(o.color, c.color);
        assert_eq!(o.revealed, c.revealed);
        assert_eq!(o.provenance, c.provenance);
        assert!(h.tracker_events.contains(&TrackerEvent::Duplicated {
            parent: ball,
            child: copy
        }));
    }

    #[test]
    fn outputs_must_differ() {
        let h = Harness::new();
        let err = Duplicator::new(
            &DuplicatorConfig {
                from: Direction::West,
                original_side: Direction::East,
                copy_side: Direction::East,
                hold_ticks: 100,
                speed: None,
            },
            &h.build_ctx(ComponentKind::Duplicator),
        );
        assert!(err.is_err());
    }
}
