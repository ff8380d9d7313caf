//! Grid coordinates, sides, and cell-local geometry.
//!
//! The floor is a grid of unit cells. Cell `(x, y)` spans
//! `[x, x + 1) x [y, y + 1)` in world units; `y` grows southwards.

use glam::Vec2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GridPosition
// ---------------------------------------------------------------------------

/// A cell on the factory grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighboring cell in `dir`.
    pub fn step(self, dir: Direction) -> GridPosition {
        let (dx, dy) = dir.offset();
        GridPosition::new(self.x + dx, self.y + dy)
    }

    /// World-space center of the cell.
    pub fn center(self) -> Vec2 {
        Vec2::new(self.x as f32 + 0.5, self.y as f32 + 0.5)
    }

    /// World-space midpoint of the cell edge on side `dir`.
    pub fn edge(self, dir: Direction) -> Vec2 {
        self.center() + dir.unit() * 0.5
    }
}

/// Dimensions of the level grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn contains(&self, pos: GridPosition) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// A side of a cell. Entry and exit sides are always named from the point of
/// view of the cell that owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All four directions in clockwise order starting from north.
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Grid offset for one step in this direction.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    pub fn unit(self) -> Vec2 {
        let (dx, dy) = self.offset();
        Vec2::new(dx as f32, dy as f32)
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        };
        f.write_str(name)
    }
}

/// Waypoints for a quarter turn from the `from` edge to the `to` edge,
/// approximating an arc around the shared cell corner.
pub fn arc_waypoints(cell: GridPosition, from: Direction, to: Direction) -> Vec<Vec2> {
    let start = cell.edge(from);
    let end = cell.edge(to);
    if from == to.opposite() {
        return vec![start, end];
    }
    let corner = cell.center() + (from.unit() + to.unit()) * 0.5;
    let a = start - corner;
    let b = end - corner;
    let mut points = Vec::with_capacity(6);
    for i in 0..=5 {
        let t = i as f32 / 5.0 * std::f32::consts::FRAC_PI_2;
        points.push(corner + a * t.cos() + b * t.sin());
    }
    points[0] = start;
    points[5] = end;
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_involution() {
        for dir in Direction::all() {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_ne!(dir.opposite(), dir);
        }
    }

    #[test]
    fn step_and_back() {
        let p = GridPosition::new(3, -7);
        for dir in Direction::all() {
            assert_eq!(p.step(dir).step(dir.opposite()), p);
        }
    }

    #[test]
    fn edges_lie_half_a_cell_from_center() {
        let p = GridPosition::new(2, 2);
        for dir in Direction::all() {
            assert!((p.edge(dir).distance(p.center()) - 0.5).abs() < 1e-6);
        }
        assert_eq!(p.edge(Direction::East), Vec2::new(3.0, 2.5));
    }

    #[test]
    fn shared_edge_between_neighbors() {
        let p = GridPosition::new(0, 0);
        let q = p.step(Direction::East);
        assert_eq!(p.edge(Direction::East), q.edge(Direction::West));
    }

    #[test]
    fn grid_size_bounds() {
        let size = GridSize { width: 4, height: 2 };
        assert!(size.contains(GridPosition::new(3, 1)));
        assert!(!size.contains(GridPosition::new(4, 0)));
        assert!(!size.contains(GridPosition::new(0, -1)));
    }

    #[test]
    fn arc_endpoints_are_exact() {
        let cell = GridPosition::new(1, 1);
        let pts = arc_waypoints(cell, Direction::West, Direction::South);
        assert_eq!(pts.first().copied(), Some(cell.edge(Direction::West)));
        assert_eq!(pts.last().copied(), Some(cell.edge(Direction::South)));
        // Every arc point stays within the cell.
        for p in &pts {
            assert!(p.x >= 1.0 - 1e-5 && p.x <= 2.0 + 1e-5);
            assert!(p.y >= 1.0 - 1e-5 && p.y <= 2.0 + 1e-5);
        }
    }

    #[test]
    fn straight_through_is_two_points() {
        let cell = GridPosition::new(0, 0);
        let pts = arc_waypoints(cell, Direction::West, Direction::East);
        assert_eq!(pts.len(), 2);
    }
}
