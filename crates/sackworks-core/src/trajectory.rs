//! Time-parameterized ball paths.
//!
//! A [`Trajectory`] is a piecewise-linear path through two or more waypoints,
//! traversed over a duration derived from its length and a speed multiplier.
//! Easing warps time, never the path: progress stays monotone and the final
//! waypoint is hit exactly.
//!
//! [`BounceBody`] is the lightweight jitter integrator used for balls sitting
//! in a buffer.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Ticks, f64_to_fixed64, travel_ticks};

// ---------------------------------------------------------------------------
// Easing
// ---------------------------------------------------------------------------

/// Monotone time warp applied to a trajectory's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    /// Apply the easing curve to a fraction in `[0, 1]`.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    let u = -2.0 * t + 2.0;
                    1.0 - u * u / 2.0
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrajectoryError {
    #[error("a trajectory needs at least two waypoints, got {0}")]
    TooFewWaypoints(usize),
    #[error("speed multiplier must be positive")]
    NonPositiveSpeed,
}

/// An active path. Owned by exactly one ball.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    waypoints: Vec<Vec2>,
    /// Cumulative arc length at each waypoint; `cumulative[0] == 0`.
    cumulative: Vec<f32>,
    easing: Easing,
    start: Ticks,
    duration: Ticks,
}

impl Trajectory {
    pub fn new(
        waypoints: Vec<Vec2>,
        speed: Fixed64,
        easing: Easing,
        start: Ticks,
    ) -> Result<Self, TrajectoryError> {
        if waypoints.len() < 2 {
            return Err(TrajectoryError::TooFewWaypoints(waypoints.len()));
        }
        let mut cumulative = Vec::with_capacity(waypoints.len());
        let mut total = 0.0f32;
        cumulative.push(0.0);
        for pair in waypoints.windows(2) {
            total += pair[0].distance(pair[1]);
            cumulative.push(total);
        }
        let duration = travel_ticks(f64_to_fixed64(total as f64), speed)
            .ok_or(TrajectoryError::NonPositiveSpeed)?;
        Ok(Self {
            waypoints,
            cumulative,
            easing,
            start,
            duration,
        })
    }

    /// A two-point path.
    pub fn straight(
        from: Vec2,
        to: Vec2,
        speed: Fixed64,
        easing: Easing,
        start: Ticks,
    ) -> Result<Self, TrajectoryError> {
        Self::new(vec![from, to], speed, easing, start)
    }

    pub fn start(&self) -> Ticks {
        self.start
    }

    pub fn duration(&self) -> Ticks {
        self.duration
    }

    pub fn end(&self) -> Ticks {
        self.start.saturating_add(self.duration)
    }

    pub fn length(&self) -> f32 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    pub fn is_complete(&self, now: Ticks) -> bool {
        now >= self.end()
    }

    /// Raw (uneased) progress fraction at `now`, clamped to `[0, 1]`.
    pub fn fraction_at(&self, now: Ticks) -> f32 {
        if now <= self.start {
            return 0.0;
        }
        if now >= self.end() {
            return 1.0;
        }
        (now - self.start) as f32 / self.duration as f32
    }

    /// Position after the easing warp at raw fraction `f`.
    pub fn point_at(&self, f: f32) -> Vec2 {
        if f >= 1.0 {
            return self.waypoints[self.waypoints.len() - 1];
        }
        if f <= 0.0 {
            return self.waypoints[0];
        }
        let total = self.length();
        if total <= 0.0 {
            return self.waypoints[0];
        }
        let target = self.easing.apply(f) * total;
        // First segment whose end reaches the target distance.
        let seg = self
            .cumulative
            .partition_point(|&d| d < target)
            .clamp(1, self.waypoints.len() - 1);
        let seg_start = self.cumulative[seg - 1];
        let seg_len = self.cumulative[seg] - seg_start;
        let local = if seg_len > 0.0 {
            (target - seg_start) / seg_len
        } else {
            1.0
        };
        self.waypoints[seg - 1].lerp(self.waypoints[seg], local)
    }

    pub fn position_at(&self, now: Ticks) -> Vec2 {
        self.point_at(self.fraction_at(now))
    }

    /// Distance travelled along the path at `now`, used for ball rotation.
    pub fn distance_at(&self, now: Ticks) -> f32 {
        self.easing.apply(self.fraction_at(now)) * self.length()
    }
}

// ---------------------------------------------------------------------------
// Jitter body
// ---------------------------------------------------------------------------

/// Kinematic body bouncing inside an axis-aligned box. Visual only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceBody {
    pub position: Vec2,
    pub velocity: Vec2,
    pub center: Vec2,
    pub half_extent: f32,
}

impl BounceBody {
    pub fn new(position: Vec2, velocity: Vec2, center: Vec2, half_extent: f32) -> Self {
        Self {
            position,
            velocity,
            center,
            half_extent,
        }
    }

    /// Integrate by `dt` seconds, reflecting off the box walls.
    pub fn integrate(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        let min = self.center - Vec2::splat(self.half_extent);
        let max = self.center + Vec2::splat(self.half_extent);
        if self.position.x < min.x {
            self.position.x = 2.0 * min.x - self.position.x;
            self.velocity.x = self.velocity.x.abs();
        } else if self.position.x > max.x {
            self.position.x = 2.0 * max.x - self.position.x;
            self.velocity.x = -self.velocity.x.abs();
        }
        if self.position.y < min.y {
            self.position.y = 2.0 * min.y - self.position.y;
            self.velocity.y = self.velocity.y.abs();
        } else if self.position.y > max.y {
            self.position.y = 2.0 * max.y - self.position.y;
            self.velocity.y = -self.velocity.y.abs();
        }
        // A single reflection may overshoot when dt is large.
        self.position = self.position.clamp(min, max);
    }
}
