//! Sinks: black pits swallow balls unseen, collection points record them.

use glam::Vec2;

use crate::ball::BallState;
use crate::error::{ConfigError, SimError};
use crate::fixed::Fixed64;
use crate::geometry::Direction;
use crate::id::{BallId, ColorId};
use crate::registry::ComponentKind;
use crate::trajectory::Easing;

use super::{BuildContext, MachineContext, StateMachine};

/// Slots per row of a collection point's results grid.
pub const RESULTS_GRID_SIDE: usize = 4;

// ---------------------------------------------------------------------------
// Black pit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BlackPit {
    speed: Fixed64,
    falling: Vec<BallId>,
    swallowed: u32,
}

impl BlackPit {
    pub fn new(ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            speed: ctx.speed(ComponentKind::BlackPit, None)?,
            falling: Vec::new(),
            swallowed: 0,
        })
    }

    pub fn swallowed(&self) -> u32 {
        self.swallowed
    }

}

impl StateMachine for BlackPit {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        let waypoints = vec![ctx.edge(entry), ctx.center()];
        ctx.start_path(ball, waypoints, self.speed, Easing::EaseIn, BallState::Arriving)?;
        self.falling.push(ball);
        Ok(())
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        self.falling.retain(|b| *b != ball);
        ctx.collect(ball)?;
        self.swallowed += 1;
        Ok(())
    }

    fn check_and_output(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        let now = ctx.now;
        for &ball in &self.falling {
            let b = ctx.ball_mut(ball)?;
            let progress = b.trajectory.as_ref().map_or(1.0, |t| t.fraction_at(now));
            b.visual.scale = 1.0 - progress;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collection point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CollectionPoint {
    speed: Fixed64,
    /// One entry per collected ball in arrival order; `None` when the ball
    /// arrived unrevealed.
    results: Vec<Option<ColorId>>,
}

impl CollectionPoint {
    pub fn new(ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            speed: ctx.speed(ComponentKind::CollectionPoint, None)?,
            results: Vec::new(),
        })
    }

    pub fn results(&self) -> &[Option<ColorId>] {
        &self.results
    }

    /// Cell-local offset of results slot `index`, wrapping after a full grid.
    pub fn slot_offset(index: usize) -> Vec2 {
        let side = RESULTS_GRID_SIDE;
        let i = index % (side * side);
        let cell = 1.0 / side as f32;
        Vec2::new(
            ((i % side) as f32 + 0.5) * cell,
            ((i / side) as f32 + 0.5) * cell,
        )
    }
}

impl StateMachine for CollectionPoint {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        ctx.observe(ball)?;
        let slot = self.results.len();
        self.results.push(ctx.ball(ball)?.visible_color());

        let origin = Vec2::new(ctx.position.x as f32, ctx.position.y as f32);
        let waypoints = vec![ctx.edge(entry), origin + Self::slot_offset(slot)];
        ctx.start_path(ball, waypoints, self.speed, Easing::EaseOut, BallState::Arriving)
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        ctx.collect(ball)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::harness::Harness;
    use super::*;
    use crate::tracker::TrackerEvent;

    #[test]
    fn black_pit_swallows_without_revealing() {
        let mut h = Harness::new();
        let mut pit = BlackPit::new(&h.build_ctx(ComponentKind::BlackPit)).unwrap();
        let ball = h.ball(0);
        let mut ctx = h.ctx(ComponentKind::BlackPit);
        pit.on_arrival(&mut ctx, ball, Direction::North).unwrap();

        h.run(&mut pit, ComponentKind::BlackPit, 200);
        let scale = h.balls.get(ball).unwrap().visual.scale;
        assert!(scale < 1.0 && scale > 0.0);

        h.run(&mut pit, ComponentKind::BlackPit, 1000);
        assert!(h.balls.is_empty());
        assert_eq!(pit.swallowed(), 1);
        assert_eq!(h.tracker_events, vec![TrackerEvent::Collected { ball }]);
    }

    #[test]
    fn collection_point_records_arrivals() {
        let mut h = Harness::new();
        let mut cp = CollectionPoint::new(&h.build_ctx(ComponentKind::CollectionPoint)).unwrap();
        let seen = h.ball(1);
        let mut ctx = h.ctx(ComponentKind::CollectionPoint);
        cp.on_arrival(&mut ctx, seen, Direction::West).unwrap();

        h.plex_glass = true;
        let hidden = h.ball(0);
        let mut ctx = h.ctx(ComponentKind::CollectionPoint);
        cp.on_arrival(&mut ctx, hidden, Direction::West).unwrap();

        assert_eq!(cp.results(), &[Some(ColorId(1)), None]);
        h.run(&mut cp, ComponentKind::CollectionPoint, 1000);
        assert!(h.balls.is_empty());
    }

    #[test]
    fn slots_fill_row_by_row_and_wrap() {
        assert_eq!(CollectionPoint::slot_offset(0), Vec2::new(0.125, 0.125));
        assert_eq!(CollectionPoint::slot_offset(1), Vec2::new(0.375, 0.125));
        assert_eq!(CollectionPoint::slot_offset(4), Vec2::new(0.125, 0.375));
        assert_eq!(CollectionPoint::slot_offset(16), CollectionPoint::slot_offset(0));
    }
}
