//! Balls and the arena that owns them.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::fixed::Ticks;
use crate::geometry::Direction;
use crate::id::{BallId, ColorId, ComponentId, DrawId, SourceId};
use crate::trajectory::{BounceBody, Trajectory};

/// Named per-component ball states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallState {
    Traveling,
    Entering,
    Buffered,
    Exiting,
    Arriving,
    Consumed,
    Picking,
    Holding,
    Placing,
    Decaying,
}

impl BallState {
    fn tag(self) -> u32 {
        self as u32
    }
}

/// Render-only attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visual {
    pub opacity: f32,
    pub scale: f32,
    pub rotation: f32,
}

impl Default for Visual {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

/// Ball radius in cell units, used to turn distance into rotation.
pub const BALL_RADIUS: f32 = 0.12;

#[derive(Debug, Clone)]
pub struct Ball {
    pub id: BallId,
    /// Ground-truth color. Only exposed to snapshots once revealed.
    pub color: ColorId,
    /// The sack this ball's draw came from.
    pub source: SourceId,
    /// Tracker draw this ball belongs to, once registered.
    pub provenance: Option<DrawId>,
    pub component: ComponentId,
    pub state: BallState,
    pub trajectory: Option<Trajectory>,
    /// Jitter integrator while sitting in a buffer.
    pub body: Option<BounceBody>,
    pub position: Vec2,
    pub visual: Visual,
    pub revealed: bool,
    /// Side the ball entered its current component through.
    pub entry: Option<Direction>,
    /// Side the owning component intends to release it through.
    pub exit: Option<Direction>,
    /// Rotation accumulated before the active trajectory started.
    rotation_base: f32,
}

impl Ball {
    pub fn new(
        id: BallId,
        color: ColorId,
        source: SourceId,
        provenance: Option<DrawId>,
        component: ComponentId,
        position: Vec2,
    ) -> Self {
        Self {
            id,
            color,
            source,
            provenance,
            component,
            state: BallState::Exiting,
            trajectory: None,
            body: None,
            position,
            visual: Visual::default(),
            revealed: false,
            entry: None,
            exit: None,
            rotation_base: 0.0,
        }
    }

    /// Color as visible to a player.
    pub fn visible_color(&self) -> Option<ColorId> {
        self.revealed.then_some(self.color)
    }

    /// Replace the active trajectory. Any jitter body is dropped.
    pub fn set_trajectory(&mut self, trajectory: Trajectory, state: BallState) {
        self.rotation_base = self.visual.rotation;
        self.position = trajectory.waypoints()[0];
        self.trajectory = Some(trajectory);
        self.body = None;
        self.state = state;
    }

    /// Finish the active trajectory, snapping to its final waypoint.
    pub fn finish_trajectory(&mut self) -> Option<Trajectory> {
        let trajectory = self.trajectory.take()?;
        self.position = trajectory.point_at(1.0);
        self.visual.rotation = self.rotation_base + trajectory.length() / BALL_RADIUS;
        self.rotation_base = self.visual.rotation;
        Some(trajectory)
    }

    /// Refresh position and rotation from the active trajectory.
    pub fn sync_to(&mut self, now: Ticks) {
        if let Some(trajectory) = &self.trajectory {
            self.position = trajectory.position_at(now);
            self.visual.rotation = self.rotation_base + trajectory.distance_at(now) / BALL_RADIUS;
        } else if let Some(body) = &self.body {
            self.position = body.position;
        }
    }

    pub(crate) fn state_tag(&self) -> u32 {
        self.state.tag()
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// Owns every live ball, keyed by creation order.
#[derive(Debug, Default, Clone)]
pub struct BallArena {
    balls: BTreeMap<BallId, Ball>,
    next_id: u64,
}

impl BallArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next ball id.
    pub fn allocate_id(&mut self) -> BallId {
        let id = BallId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, ball: Ball) {
        self.balls.insert(ball.id, ball);
    }

    pub fn remove(&mut self, id: BallId) -> Option<Ball> {
        self.balls.remove(&id)
    }

    pub fn get(&self, id: BallId) -> Option<&Ball> {
        self.balls.get(&id)
    }

    pub fn get_mut(&mut self, id: BallId) -> Option<&mut Ball> {
        self.balls.get_mut(&id)
    }

    pub fn contains(&self, id: BallId) -> bool {
        self.balls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.balls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balls.is_empty()
    }

    /// Balls in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Ball> {
        self.balls.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Ball> {
        self.balls.values_mut()
    }

    /// Ids of balls whose trajectory has completed by `now`, in creation order.
    pub fn completed_by(&self, now: Ticks) -> Vec<BallId> {
        self.balls
            .values()
            .filter(|b| b.trajectory.as_ref().is_some_and(|t| t.is_complete(now)))
            .map(|b| b.id)
            .collect()
    }

    /// Ids of balls owned by `component`, in creation order.
    pub fn owned_by(&self, component: ComponentId) -> Vec<BallId> {
        self.balls
            .values()
            .filter(|b| b.component == component)
            .map(|b| b.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Fixed64;
    use crate::trajectory::Easing;
    use slotmap::KeyData;

    fn component() -> ComponentId {
        ComponentId::from(KeyData::from_ffi(1))
    }

    fn ball(arena: &mut BallArena) -> Ball {
        let id = arena.allocate_id();
        Ball::new(id, ColorId(0), SourceId(0), None, component(), Vec2::ZERO)
    }

    #[test]
    fn ids_are_monotone() {
        let mut arena = BallArena::new();
        let a = arena.allocate_id();
        let b = arena.allocate_id();
        assert!(a < b);
    }

    #[test]
    fn hidden_color_until_revealed() {
        let mut arena = BallArena::new();
        let mut b = ball(&mut arena);
        assert_eq!(b.visible_color(), None);
        b.revealed = true;
        assert_eq!(b.visible_color(), Some(ColorId(0)));
    }

    #[test]
    fn completed_in_creation_order() {
        let mut arena = BallArena::new();
        let mut first = ball(&mut arena);
        let mut second = ball(&mut arena);
        let long = Trajectory::straight(Vec2::ZERO, Vec2::X, Fixed64::ONE, Easing::Linear, 0)
            .unwrap();
        let short =
            Trajectory::straight(Vec2::ZERO, Vec2::X * 0.1, Fixed64::ONE, Easing::Linear, 0)
                .unwrap();
        let end = long.end();
        first.set_trajectory(long, BallState::Traveling);
        second.set_trajectory(short, BallState::Traveling);
        let (a, b) = (first.id, second.id);
        arena.insert(second);
        arena.insert(first);
        assert_eq!(arena.completed_by(end), vec![a, b]);
        assert_eq!(arena.completed_by(1), Vec::<BallId>::new());
    }

    #[test]
    fn finishing_snaps_to_end_and_rolls() {
        let mut arena = BallArena::new();
        let mut b = ball(&mut arena);
        let t = Trajectory::straight(Vec2::ZERO, Vec2::X, Fixed64::ONE, Easing::EaseIn, 0).unwrap();
        b.set_trajectory(t, BallState::Traveling);
        assert!(b.finish_trajectory().is_some());
        assert_eq!(b.position, Vec2::X);
        assert!(b.visual.rotation > 0.0);
        assert!(b.trajectory.is_none());
    }
}
