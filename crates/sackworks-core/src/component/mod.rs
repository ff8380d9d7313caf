//! Per-kind component state machines.
//!
//! Every component kind is a variant of [`Machine`] and implements
//! [`StateMachine`]. Machines never reach into the simulation directly: each
//! call receives a [`MachineContext`] exposing the ball arena, the RNG, the
//! departure outbox and the tracker-event outbox. The simulation drains both
//! outboxes right after the call returns.

mod arm;
mod belt;
mod duplicator;
mod sack;
mod shuffler;
mod sink;
mod sorter;

pub use arm::{Arm, ArmConfig};
pub use belt::{Conveyor, ConveyorConfig, Merger, MergerConfig, Turn, TurnConfig};
pub use duplicator::{Duplicator, DuplicatorConfig};
pub use sack::{Sack, SackConfig, SpawnSchedule};
pub use shuffler::{PatternEntry, Shuffler, ShufflerConfig};
pub use sink::{BlackPit, CollectionPoint};
pub use sorter::{Filter, FilterConfig, Splitter, SplitterConfig};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::ball::{Ball, BallArena, BallState};
use crate::error::{ConfigError, SimError};
use crate::event::{EventBus, SimEvent};
use crate::fixed::{Fixed64, Ticks, f64_to_fixed64};
use crate::geometry::{Direction, GridPosition};
use crate::hypothesis::HypothesisSpace;
use crate::id::{BallId, ComponentId, SourceId, WorldId};
use crate::registry::{ComponentKind, ComponentSpec, InputRule, ObservationPolicy, Registry};
use crate::rng::SimRng;
use crate::tracker::TrackerEvent;
use crate::trajectory::{BounceBody, Easing, Trajectory};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-kind parameters as written in a level file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentConfig {
    Sack(SackConfig),
    Conveyor(ConveyorConfig),
    Turn(TurnConfig),
    Merger(MergerConfig),
    Filter(FilterConfig),
    Splitter(SplitterConfig),
    Duplicator(DuplicatorConfig),
    Shuffler(ShufflerConfig),
    BlackPit,
    CollectionPoint,
    Arm(ArmConfig),
}

impl ComponentConfig {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentConfig::Sack(_) => ComponentKind::Sack,
            ComponentConfig::Conveyor(_) => ComponentKind::Conveyor,
            ComponentConfig::Turn(_) => ComponentKind::Turn,
            ComponentConfig::Merger(_) => ComponentKind::Merger,
            ComponentConfig::Filter(_) => ComponentKind::Filter,
            ComponentConfig::Splitter(_) => ComponentKind::Splitter,
            ComponentConfig::Duplicator(_) => ComponentKind::Duplicator,
            ComponentConfig::Shuffler(_) => ComponentKind::Shuffler,
            ComponentConfig::BlackPit => ComponentKind::BlackPit,
            ComponentConfig::CollectionPoint => ComponentKind::CollectionPoint,
            ComponentConfig::Arm(_) => ComponentKind::Arm,
        }
    }
}

/// Slowest accepted speed multiplier. Keeps travel times inside `Fixed64`.
pub const MIN_SPEED: f64 = 0.01;

/// Fastest accepted speed multiplier.
pub const MAX_SPEED: f64 = 1000.0;

/// What a machine needs to know while it is being built.
pub struct BuildContext<'a> {
    pub name: &'a str,
    pub registry: &'a Registry,
    /// Hypothesis index of this component when it is a sack.
    pub source: Option<SourceId>,
    pub schedule: SpawnSchedule,
}

impl BuildContext<'_> {
    /// Resolve an optional speed override against the kind's default.
    pub(crate) fn speed(&self, kind: ComponentKind, speed: Option<f64>) -> Result<Fixed64, ConfigError> {
        let value = speed.unwrap_or(self.registry.spec(kind).default_speed);
        if !(MIN_SPEED..=MAX_SPEED).contains(&value) {
            return Err(ConfigError::parameter(
                self.name,
                format!("speed must lie in [{MIN_SPEED}, {MAX_SPEED}], got {value}"),
            ));
        }
        Ok(f64_to_fixed64(value))
    }
}

// ---------------------------------------------------------------------------
// Machine contract
// ---------------------------------------------------------------------------

/// Shared contract of every component kind.
pub trait StateMachine {
    /// A ball was handed over through `entry`. The machine must give it a
    /// trajectory or buffer it.
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError>;

    /// The ball's active trajectory finished. Called once per trajectory.
    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError>;

    /// Polled every step. Buffering kinds release balls here.
    fn check_and_output(&mut self, _ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        Ok(())
    }
}

/// A ball leaving its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub ball: BallId,
    pub from: ComponentId,
    pub side: Direction,
}

/// Ground truth a sack samples from.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub space: HypothesisSpace,
    pub world: WorldId,
}

/// Capabilities handed to a machine for the duration of one call.
pub struct MachineContext<'a> {
    pub component: ComponentId,
    pub name: &'a str,
    pub position: GridPosition,
    pub plex_glass: bool,
    pub now: Ticks,
    pub(crate) spec: &'a ComponentSpec,
    pub(crate) balls: &'a mut BallArena,
    pub(crate) rng: &'a mut SimRng,
    pub(crate) truth: &'a GroundTruth,
    pub(crate) departures: &'a mut Vec<Departure>,
    pub(crate) tracker_events: &'a mut Vec<TrackerEvent>,
    pub(crate) events: &'a mut EventBus,
}

impl MachineContext<'_> {
    pub fn ball(&self, id: BallId) -> Result<&Ball, SimError> {
        self.balls.get(id).ok_or(SimError::MissingBall(id))
    }

    pub fn ball_mut(&mut self, id: BallId) -> Result<&mut Ball, SimError> {
        self.balls.get_mut(id).ok_or(SimError::MissingBall(id))
    }

    pub fn center(&self) -> Vec2 {
        self.position.center()
    }

    pub fn edge(&self, side: Direction) -> Vec2 {
        self.position.edge(side)
    }

    pub fn rng(&mut self) -> &mut SimRng {
        self.rng
    }

    /// Start a new trajectory for `ball` beginning now.
    pub fn start_path(
        &mut self,
        ball: BallId,
        waypoints: Vec<Vec2>,
        speed: Fixed64,
        easing: Easing,
        state: BallState,
    ) -> Result<(), SimError> {
        let trajectory = Trajectory::new(waypoints, speed, easing, self.now)?;
        self.ball_mut(ball)?.set_trajectory(trajectory, state);
        Ok(())
    }

    /// Start a trajectory from wherever the ball is now to `to`.
    pub fn path_to(
        &mut self,
        ball: BallId,
        to: Vec2,
        speed: Fixed64,
        easing: Easing,
        state: BallState,
    ) -> Result<(), SimError> {
        let from = self.ball(ball)?.position;
        self.start_path(ball, vec![from, to], speed, easing, state)
    }

    /// Park a ball in a buffer with a jitter body around the cell center.
    pub fn buffer(&mut self, ball: BallId, state: BallState) -> Result<(), SimError> {
        let center = self.center();
        let velocity = Vec2::new(self.rng.next_signed_f32(), self.rng.next_signed_f32()) * 0.4;
        let b = self.ball_mut(ball)?;
        b.body = Some(BounceBody::new(b.position, velocity, center, 0.22));
        b.state = state;
        Ok(())
    }

    /// Reveal the ball's color if this component's observation policy allows.
    pub fn observe(&mut self, ball: BallId) -> Result<(), SimError> {
        let visible = match self.spec.observation {
            ObservationPolicy::Never => false,
            ObservationPolicy::Always => true,
            ObservationPolicy::UnlessPlexGlass => !self.plex_glass,
        };
        if !visible {
            return Ok(());
        }
        let now = self.now;
        let component = self.component;
        let b = self.ball_mut(ball)?;
        if b.revealed {
            return Ok(());
        }
        b.revealed = true;
        let color = b.color;
        self.tracker_events.push(TrackerEvent::Observation {
            ball,
            color,
            at: now,
        });
        self.events.emit(SimEvent::BallObserved {
            ball,
            color,
            component,
            tick: now,
        });
        Ok(())
    }

    /// Hand the ball to whatever is connected on `side`.
    pub fn depart(&mut self, ball: BallId, side: Direction) {
        self.departures.push(Departure {
            ball,
            from: self.component,
            side,
        });
    }

    /// Mark a ball consumed. The simulation drops it from the arena once the
    /// tracker has processed the collection.
    fn consume(&mut self, ball: BallId) -> Result<(), SimError> {
        let b = self.ball_mut(ball)?;
        b.state = BallState::Consumed;
        b.trajectory = None;
        b.body = None;
        self.tracker_events.push(TrackerEvent::Collected { ball });
        Ok(())
    }

    /// Remove the ball from the factory.
    pub fn collect(&mut self, ball: BallId) -> Result<(), SimError> {
        self.consume(ball)?;
        self.events.emit(SimEvent::BallCollected {
            ball,
            component: self.component,
            tick: self.now,
        });
        Ok(())
    }

    /// Remove a ball that was held too long. Logged, never silent.
    pub fn force_collect(&mut self, ball: BallId) -> Result<(), SimError> {
        log::warn!(
            "{ball} force-collected by '{}' at ({}, {}) on tick {}",
            self.name,
            self.position.x,
            self.position.y,
            self.now
        );
        self.consume(ball)?;
        self.events.emit(SimEvent::BallForceCollected {
            ball,
            component: self.component,
            tick: self.now,
        });
        Ok(())
    }

    /// Create a ball at the cell center with a color drawn from `source`'s
    /// ground-truth distribution.
    pub fn spawn(&mut self, source: SourceId) -> BallId {
        let color = self
            .truth
            .space
            .distribution(self.truth.world, source)
            .sample(self.rng);
        let id = self.balls.allocate_id();
        self.balls.insert(Ball::new(
            id,
            color,
            source,
            None,
            self.component,
            self.center(),
        ));
        self.tracker_events.push(TrackerEvent::Created { ball: id, source });
        self.events.emit(SimEvent::BallSpawned {
            ball: id,
            component: self.component,
            tick: self.now,
        });
        id
    }

    /// Create an exact copy of `parent` in this component.
    pub fn duplicate(&mut self, parent: BallId) -> Result<BallId, SimError> {
        let id = self.balls.allocate_id();
        let original = self.ball(parent)?;
        let mut copy = Ball::new(
            id,
            original.color,
            original.source,
            original.provenance,
            self.component,
            original.position,
        );
        copy.revealed = original.revealed;
        copy.visual = original.visual;
        copy.state = original.state;
        self.balls.insert(copy);
        self.tracker_events.push(TrackerEvent::Duplicated { parent, child: id });
        self.events.emit(SimEvent::BallDuplicated {
            original: parent,
            copy: id,
            component: self.component,
            tick: self.now,
        });
        Ok(id)
    }

    /// Make a set of balls mutually indistinguishable.
    pub fn shuffle_together(&mut self, balls: &[BallId]) {
        if let Some((&first, rest)) = balls.split_first() {
            for &other in rest {
                self.tracker_events.push(TrackerEvent::Shuffle { a: first, b: other });
            }
        }
    }

    pub fn emit(&mut self, event: SimEvent) {
        self.events.emit(event);
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// One placed component's behavior and private state.
#[derive(Debug, Clone)]
pub enum Machine {
    Sack(Sack),
    Conveyor(Conveyor),
    Turn(Turn),
    Merger(Merger),
    Filter(Filter),
    Splitter(Splitter),
    Duplicator(Duplicator),
    Shuffler(Shuffler),
    BlackPit(BlackPit),
    CollectionPoint(CollectionPoint),
    Arm(Arm),
}

impl Machine {
    /// Validate a configuration and build the machine for it.
    pub fn build(config: &ComponentConfig, ctx: &BuildContext<'_>) -> Result<Machine, ConfigError> {
        Ok(match config {
            ComponentConfig::Sack(c) => Machine::Sack(Sack::new(c, ctx)?),
            ComponentConfig::Conveyor(c) => Machine::Conveyor(Conveyor::new(c, ctx)?),
            ComponentConfig::Turn(c) => Machine::Turn(Turn::new(c, ctx)?),
            ComponentConfig::Merger(c) => Machine::Merger(Merger::new(c, ctx)?),
            ComponentConfig::Filter(c) => Machine::Filter(Filter::new(c, ctx)?),
            ComponentConfig::Splitter(c) => Machine::Splitter(Splitter::new(c, ctx)?),
            ComponentConfig::Duplicator(c) => Machine::Duplicator(Duplicator::new(c, ctx)?),
            ComponentConfig::Shuffler(c) => Machine::Shuffler(Shuffler::new(c, ctx)?),
            ComponentConfig::BlackPit => Machine::BlackPit(BlackPit::new(ctx)?),
            ComponentConfig::CollectionPoint => {
                Machine::CollectionPoint(CollectionPoint::new(ctx)?)
            }
            ComponentConfig::Arm(c) => Machine::Arm(Arm::new(c, ctx)?),
        })
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Machine::Sack(_) => ComponentKind::Sack,
            Machine::Conveyor(_) => ComponentKind::Conveyor,
            Machine::Turn(_) => ComponentKind::Turn,
            Machine::Merger(_) => ComponentKind::Merger,
            Machine::Filter(_) => ComponentKind::Filter,
            Machine::Splitter(_) => ComponentKind::Splitter,
            Machine::Duplicator(_) => ComponentKind::Duplicator,
            Machine::Shuffler(_) => ComponentKind::Shuffler,
            Machine::BlackPit(_) => ComponentKind::BlackPit,
            Machine::CollectionPoint(_) => ComponentKind::CollectionPoint,
            Machine::Arm(_) => ComponentKind::Arm,
        }
    }

    /// Sides balls leave through. Each must resolve to a neighbor.
    pub fn output_sides(&self) -> Vec<Direction> {
        match self {
            Machine::Sack(m) => vec![m.direction()],
            Machine::Conveyor(m) => vec![m.direction()],
            Machine::Turn(m) => vec![m.direction()],
            Machine::Merger(m) => vec![m.direction()],
            Machine::Filter(m) => m.outputs(),
            Machine::Splitter(m) => m.outputs().to_vec(),
            Machine::Duplicator(m) => m.outputs(),
            Machine::Shuffler(m) => m.outputs(),
            Machine::BlackPit(_) | Machine::CollectionPoint(_) => Vec::new(),
            Machine::Arm(m) => vec![m.direction()],
        }
    }

    /// The configured entry side for kinds whose input rule is `Configured`.
    fn configured_input(&self) -> Option<Direction> {
        match self {
            Machine::Turn(m) => Some(m.from()),
            Machine::Filter(m) => Some(m.from()),
            Machine::Splitter(m) => Some(m.from()),
            Machine::Duplicator(m) => Some(m.from()),
            Machine::Arm(m) => Some(m.from()),
            _ => None,
        }
    }

    /// Whether a ball may enter through `side`.
    pub fn accepts(&self, spec: &ComponentSpec, side: Direction) -> bool {
        match spec.inputs {
            InputRule::None => false,
            InputRule::Any => true,
            InputRule::Back => self
                .output_sides()
                .first()
                .is_some_and(|out| out.opposite() == side),
            InputRule::Configured => self.configured_input() == Some(side),
            InputRule::AllButOutputs => !self.output_sides().contains(&side),
        }
    }

    pub fn as_shuffler(&self) -> Option<&Shuffler> {
        match self {
            Machine::Shuffler(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_collection_point(&self) -> Option<&CollectionPoint> {
        match self {
            Machine::CollectionPoint(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sack(&self) -> Option<&Sack> {
        match self {
            Machine::Sack(m) => Some(m),
            _ => None,
        }
    }
}

impl StateMachine for Machine {
    fn on_arrival(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
        entry: Direction,
    ) -> Result<(), SimError> {
        match self {
            Machine::Sack(m) => m.on_arrival(ctx, ball, entry),
            Machine::Conveyor(m) => m.on_arrival(ctx, ball, entry),
            Machine::Turn(m) => m.on_arrival(ctx, ball, entry),
            Machine::Merger(m) => m.on_arrival(ctx, ball, entry),
            Machine::Filter(m) => m.on_arrival(ctx, ball, entry),
            Machine::Splitter(m) => m.on_arrival(ctx, ball, entry),
            Machine::Duplicator(m) => m.on_arrival(ctx, ball, entry),
            Machine::Shuffler(m) => m.on_arrival(ctx, ball, entry),
            Machine::BlackPit(m) => m.on_arrival(ctx, ball, entry),
            Machine::CollectionPoint(m) => m.on_arrival(ctx, ball, entry),
            Machine::Arm(m) => m.on_arrival(ctx, ball, entry),
        }
    }

    fn on_trajectory_complete(
        &mut self,
        ctx: &mut MachineContext<'_>,
        ball: BallId,
    ) -> Result<(), SimError> {
        match self {
            Machine::Sack(m) => m.on_trajectory_complete(ctx, ball),
            Machine::Conveyor(m) => m.on_trajectory_complete(ctx, ball),
            Machine::Turn(m) => m.on_trajectory_complete(ctx, ball),
            Machine::Merger(m) => m.on_trajectory_complete(ctx, ball),
            Machine::Filter(m) => m.on_trajectory_complete(ctx, ball),
            Machine::Splitter(m) => m.on_trajectory_complete(ctx, ball),
            Machine::Duplicator(m) => m.on_trajectory_complete(ctx, ball),
            Machine::Shuffler(m) => m.on_trajectory_complete(ctx, ball),
            Machine::BlackPit(m) => m.on_trajectory_complete(ctx, ball),
            Machine::CollectionPoint(m) => m.on_trajectory_complete(ctx, ball),
            Machine::Arm(m) => m.on_trajectory_complete(ctx, ball),
        }
    }

    fn check_and_output(&mut self, ctx: &mut MachineContext<'_>) -> Result<(), SimError> {
        match self {
            Machine::Sack(m) => m.check_and_output(ctx),
            Machine::Duplicator(m) => m.check_and_output(ctx),
            Machine::Shuffler(m) => m.check_and_output(ctx),
            Machine::BlackPit(m) => m.check_and_output(ctx),
            Machine::Arm(m) => m.check_and_output(ctx),
            Machine::Conveyor(_)
            | Machine::Turn(_)
            | Machine::Merger(_)
            | Machine::Filter(_)
            | Machine::Splitter(_)
            | Machine::CollectionPoint(_) => Ok(()),
        }
    }
}

/// Depart through the side recorded on the ball when it entered.
pub(crate) fn depart_planned(ctx: &mut MachineContext<'_>, ball: BallId) -> Result<(), SimError> {
    let side = ctx
        .ball(ball)?
        .exit
        .ok_or(SimError::MissingBall(ball))?;
    ctx.depart(ball, side);
    Ok(())
}

/// Reject a ball on a kind that never receives any.
pub(crate) fn reject(ctx: &MachineContext<'_>, ball: BallId, entry: Direction) -> SimError {
    SimError::UnexpectedEntry {
        component: ctx.name.to_string(),
        ball,
        side: entry,
    }
}
