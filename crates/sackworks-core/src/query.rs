//! Read-only snapshots for rendering and UI.
//!
//! Every type here is an owned copy. A ball's ground-truth color never
//! appears in a snapshot until the ball has been revealed.

use glam::Vec2;

use crate::ball::{Ball, BallState};
use crate::geometry::GridPosition;
use crate::id::{BallId, ColorId, ComponentId};
use crate::registry::ComponentKind;

// ---------------------------------------------------------------------------
// Ball snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BallSnapshot {
    pub id: BallId,
    pub component: ComponentId,
    pub state: BallState,
    pub position: Vec2,
    pub opacity: f32,
    pub scale: f32,
    pub rotation: f32,
    /// Revealed color, or `None` while the ball is still hidden.
    pub color: Option<ColorId>,
}

impl From<&Ball> for BallSnapshot {
    fn from(ball: &Ball) -> Self {
        Self {
            id: ball.id,
            component: ball.component,
            state: ball.state,
            position: ball.position,
            opacity: ball.visual.opacity,
            scale: ball.visual.scale,
            rotation: ball.visual.rotation,
            color: ball.visible_color(),
        }
    }
}

// ---------------------------------------------------------------------------
// Component snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSnapshot {
    pub id: ComponentId,
    pub name: String,
    pub kind: ComponentKind,
    pub position: GridPosition,
    pub plex_glass: bool,
    /// Balls currently owned by the component.
    pub balls: Vec<BallId>,
    /// Collection-point results in arrival order; empty for other kinds.
    pub results: Vec<Option<ColorId>>,
}
