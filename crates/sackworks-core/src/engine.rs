//! The simulation: owns the arena, the routing graph, every component
//! machine and the provenance tracker, and runs the step pipeline.
//!
//! # Step pipeline
//!
//! Each step:
//! 1. **Clock**: advance time by `step_ticks`.
//! 2. **Trajectories**: finish every trajectory that is due, in ball creation
//!    order, and let the owning machine react.
//! 3. **Poll**: call `check_and_output` on every component in placement
//!    order.
//! 4. **Visuals**: integrate jitter bodies and sync ball positions.
//! 5. **Events**: deliver buffered simulation events to listeners.
//! 6. **Bookkeeping**: bump the step counter and compute the state hash.
//!
//! Departures are routed and tracker events applied right after the machine
//! call that produced them, so the tracker always sees events in causal
//! order. Any error faults the simulation: it refuses to step again.

use slotmap::{Key, SecondaryMap};

use crate::ball::BallArena;
use crate::component::{
    BuildContext, Departure, GroundTruth, Machine, MachineContext, StateMachine,
};
use crate::error::{ConfigError, SimError};
use crate::event::{EventBus, EventFilter, EventKind, Listener, ListenerPriority, SimEvent};
use crate::fixed::{TICKS_PER_SECOND, Ticks};
use crate::graph::{ComponentNode, Connection, Port, RoutingGraph};
use crate::id::{BallId, ComponentId, WorldId};
use crate::level::LevelDescriptor;
use crate::query::{BallSnapshot, ComponentSnapshot};
use crate::registry::Registry;
use crate::rng::SimRng;
use crate::sim::{AdvanceResult, ClockConfig, SimState, SimulationStrategy, StateHash};
use crate::tracker::{BucketedSnapshot, PosteriorSnapshot, ProvenanceTracker, TrackerEvent};

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Per-subsystem hashes, for pinpointing where two runs diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemHashes {
    pub sim_state: u64,
    pub balls: u64,
    pub tracker: u64,
}

#[derive(Debug)]
pub struct Simulation {
    name: String,
    registry: Registry,
    graph: RoutingGraph,
    machines: SecondaryMap<ComponentId, Machine>,
    balls: BallArena,
    tracker: ProvenanceTracker,
    truth: GroundTruth,
    rng: SimRng,
    events: EventBus,
    clock: ClockConfig,
    state: SimState,
    fault: Option<SimError>,
    last_state_hash: u64,

    // Outboxes shared with machine contexts; empty between machine calls.
    departures: Vec<Departure>,
    tracker_events: Vec<TrackerEvent>,
}

impl Simulation {
    /// Validate a level and build a simulation ready for its first step.
    ///
    /// Every configuration error is reported here, before any tick.
    pub fn from_level(level: &LevelDescriptor) -> Result<Self, ConfigError> {
        level.clock.validate()?;
        let registry = level.registry()?;

        let mut graph = RoutingGraph::new(level.grid);
        let mut placed = Vec::with_capacity(level.components.len());
        for c in &level.components {
            let id = graph.place(ComponentNode {
                name: c.id.clone(),
                kind: c.kind.kind(),
                position: c.position,
                plex_glass: c.plex_glass,
            })?;
            placed.push((id, c));
        }

        let (space, sources) = level.hypothesis_space(&registry)?;

        let mut machines = SecondaryMap::new();
        for (id, c) in placed {
            let ctx = BuildContext {
                name: &c.id,
                registry: &registry,
                source: sources.get(&c.id).copied(),
                schedule: level.spawn,
            };
            machines.insert(id, Machine::build(&c.kind, &ctx)?);
        }

        graph.resolve(
            |id| machines.get(id).map(Machine::output_sides).unwrap_or_default(),
            |id, side| {
                machines
                    .get(id)
                    .is_some_and(|m| m.accepts(registry.spec(m.kind()), side))
            },
        )?;

        let mut rng = SimRng::new(level.seed);
        let world = space.sample_world(&mut rng);
        log::info!(
            "level '{}': {} components, {} sacks, {} worlds",
            level.name,
            graph.len(),
            space.source_count(),
            space.world_count()
        );
        let tracker = ProvenanceTracker::new(space.clone());

        let mut sim = Self {
            name: level.name.clone(),
            registry,
            graph,
            machines,
            balls: BallArena::new(),
            tracker,
            truth: GroundTruth { space, world },
            rng,
            events: EventBus::default(),
            clock: level.clock,
            state: SimState::new(),
            fault: None,
            last_state_hash: 0,
            departures: Vec::new(),
            tracker_events: Vec::new(),
        };
        sim.last_state_hash = sim.compute_state_hash();
        Ok(sim)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance according to the clock strategy.
    ///
    /// - **Tick**: `elapsed` is ignored; exactly one step runs.
    /// - **Delta**: `elapsed` is accumulated; as many steps run as fit.
    pub fn advance(&mut self, elapsed: Ticks) -> Result<AdvanceResult, SimError> {
        self.check_fault()?;
        let mut result = AdvanceResult::default();
        if self.state.paused {
            return Ok(result);
        }
        match self.clock.strategy {
            SimulationStrategy::Tick => {
                self.step_internal()?;
                result.steps_run += 1;
            }
            SimulationStrategy::Delta { fixed_timestep } => {
                self.state.accumulator += elapsed;
                let step_size = fixed_timestep.max(1);
                while self.state.accumulator >= step_size {
                    self.state.accumulator -= step_size;
                    self.step_internal()?;
                    result.steps_run += 1;
                }
            }
        }
        Ok(result)
    }

    /// Run exactly one step, whatever the strategy.
    pub fn step(&mut self) -> Result<AdvanceResult, SimError> {
        self.check_fault()?;
        if self.state.paused {
            return Ok(AdvanceResult::default());
        }
        self.step_internal()?;
        Ok(AdvanceResult { steps_run: 1 })
    }

    /// Step until simulation time reaches `until`. Returns the steps run.
    pub fn run_until(&mut self, until: Ticks) -> Result<u64, SimError> {
        let mut steps = 0;
        while self.state.now < until && !self.state.paused {
            self.step()?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Pause. While paused, `advance()` and `step()` are no-ops.
    pub fn pause(&mut self) {
        self.state.paused = true;
    }

    pub fn resume(&mut self) {
        self.state.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn now(&self) -> Ticks {
        self.state.now
    }

    pub fn sim_state(&self) -> &SimState {
        &self.state
    }

    pub fn clock(&self) -> ClockConfig {
        self.clock
    }

    /// The error that halted the simulation, if any.
    pub fn fault(&self) -> Option<&SimError> {
        self.fault.as_ref()
    }

    fn check_fault(&self) -> Result<(), SimError> {
        match &self.fault {
            Some(err) => Err(SimError::Faulted(err.to_string())),
            None => Ok(()),
        }
    }

    fn step_internal(&mut self) -> Result<(), SimError> {
        self.run_phases().inspect_err(|err| {
            log::error!("simulation '{}' faulted at tick {}: {err}", self.name, self.state.now);
            self.fault = Some(err.clone());
        })
    }

    fn run_phases(&mut self) -> Result<(), SimError> {
        // Phase 1: clock.
        let now = self.state.now + self.clock.step_ticks;
        self.state.now = now;

        // Phase 2: trajectory completions, in creation order.
        for ball in self.balls.completed_by(now) {
            let Some(b) = self.balls.get_mut(ball) else {
                continue;
            };
            if !b.trajectory.as_ref().is_some_and(|t| t.is_complete(now)) {
                continue;
            }
            b.finish_trajectory();
            let component = b.component;
            self.with_machine(component, |m, ctx| m.on_trajectory_complete(ctx, ball))?;
        }

        // Phase 3: poll every component.
        for id in self.graph.order().to_vec() {
            self.with_machine(id, |m, ctx| m.check_and_output(ctx))?;
        }

        // Phase 4: visuals.
        let dt = self.clock.step_ticks as f32 / TICKS_PER_SECOND as f32;
        for b in self.balls.iter_mut() {
            if let Some(body) = &mut b.body {
                body.integrate(dt);
            }
            b.sync_to(now);
        }

        // Phase 5: events.
        self.events.deliver();

        // Phase 6: bookkeeping.
        self.state.steps += 1;
        self.last_state_hash = self.compute_state_hash();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Machine dispatch
    // -----------------------------------------------------------------------

    /// Run one machine call, then apply its tracker events and route its
    /// departures.
    fn with_machine<F>(&mut self, id: ComponentId, call: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut Machine, &mut MachineContext<'_>) -> Result<(), SimError>,
    {
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| SimError::UnknownComponent(format!("{id:?}")))?;
        let machine = self
            .machines
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownComponent(node.name.clone()))?;
        let mut ctx = MachineContext {
            component: id,
            name: &node.name,
            position: node.position,
            plex_glass: node.plex_glass,
            now: self.state.now,
            spec: self.registry.spec(machine.kind()),
            balls: &mut self.balls,
            rng: &mut self.rng,
            truth: &self.truth,
            departures: &mut self.departures,
            tracker_events: &mut self.tracker_events,
            events: &mut self.events,
        };
        let result = call(machine, &mut ctx);
        self.apply_tracker_events()?;
        result?;
        self.route_departures()
    }

    fn apply_tracker_events(&mut self) -> Result<(), SimError> {
        for event in std::mem::take(&mut self.tracker_events) {
            match event {
                TrackerEvent::Created { ball, source } => {
                    let draw = self.tracker.register_draw(ball, source)?;
                    if let Some(b) = self.balls.get_mut(ball) {
                        b.provenance = Some(draw);
                    }
                }
                TrackerEvent::Duplicated { parent, child } => {
                    let draw = self.tracker.on_duplicated(parent, child)?;
                    if let Some(b) = self.balls.get_mut(child) {
                        b.provenance = Some(draw);
                    }
                }
                TrackerEvent::Collected { ball } => {
                    self.tracker.on_collected(ball)?;
                    self.balls.remove(ball);
                }
                other => self.tracker.apply(&other)?,
            }
        }
        Ok(())
    }

    fn route_departures(&mut self) -> Result<(), SimError> {
        for departure in std::mem::take(&mut self.departures) {
            match self.graph.route(departure.from, departure.side) {
                Some(Port::Connected(connection)) => {
                    self.hand_over(departure.ball, connection)?;
                }
                Some(Port::Dangling) | None => self.drop_ball(departure)?,
            }
        }
        Ok(())
    }

    fn hand_over(&mut self, ball: BallId, connection: Connection) -> Result<(), SimError> {
        let accepted = self
            .machines
            .get(connection.to)
            .is_some_and(|m| m.accepts(self.registry.spec(m.kind()), connection.entry));
        if !accepted {
            let component = self
                .graph
                .node(connection.to)
                .map_or_else(String::new, |n| n.name.clone());
            return Err(SimError::UnexpectedEntry {
                component,
                ball,
                side: connection.entry,
            });
        }
        let b = self.balls.get_mut(ball).ok_or(SimError::MissingBall(ball))?;
        b.component = connection.to;
        b.entry = Some(connection.entry);
        b.exit = None;
        self.with_machine(connection.to, |m, ctx| {
            m.on_arrival(ctx, ball, connection.entry)
        })
    }

    /// A ball left through a port with nothing behind it.
    fn drop_ball(&mut self, departure: Departure) -> Result<(), SimError> {
        let name = self
            .graph
            .node(departure.from)
            .map_or("?", |n| n.name.as_str());
        log::warn!(
            "{} left '{name}' through dangling port {} and was collected",
            departure.ball,
            departure.side
        );
        self.tracker.on_collected(departure.ball)?;
        self.balls.remove(departure.ball);
        self.events.emit(SimEvent::BallDropped {
            ball: departure.ball,
            component: departure.from,
            side: departure.side,
            tick: self.state.now,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Remove a component at runtime. Its balls are collected explicitly and
    /// neighbors feeding into it are left with dangling ports.
    pub fn remove_component(&mut self, name: &str) -> Result<(), SimError> {
        self.check_fault()?;
        let id = self
            .graph
            .id_of(name)
            .ok_or_else(|| SimError::UnknownComponent(name.to_string()))?;
        let owned = self.balls.owned_by(id);
        if !owned.is_empty() {
            log::warn!("removing '{name}' collects {} balls", owned.len());
        }
        for ball in owned {
            self.tracker.on_collected(ball)?;
            self.balls.remove(ball);
            self.events.emit(SimEvent::BallCollected {
                ball,
                component: id,
                tick: self.state.now,
            });
        }
        self.machines.remove(id);
        self.graph.remove(id);
        log::info!("removed component '{name}'");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Suppress an event kind. Suppressed events are never buffered.
    pub fn suppress_event(&mut self, kind: EventKind) {
        self.events.suppress(kind);
    }

    pub fn on_event(&mut self, kind: EventKind, listener: Listener) {
        self.events.on(kind, listener);
    }

    pub fn on_event_filtered(
        &mut self,
        kind: EventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) {
        self.events.on_filtered(kind, priority, filter, listener);
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    pub fn tracker(&self) -> &ProvenanceTracker {
        &self.tracker
    }

    pub fn balls(&self) -> &BallArena {
        &self.balls
    }

    /// The hidden ground-truth world. Never shown to a player.
    pub fn truth_world(&self) -> WorldId {
        self.truth.world
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.graph.id_of(name)
    }

    pub fn machine(&self, name: &str) -> Option<&Machine> {
        self.machines.get(self.graph.id_of(name)?)
    }

    pub fn ball_snapshot(&self, ball: BallId) -> Option<BallSnapshot> {
        self.balls.get(ball).map(BallSnapshot::from)
    }

    /// Every live ball, in creation order.
    pub fn ball_snapshots(&self) -> Vec<BallSnapshot> {
        self.balls.iter().map(BallSnapshot::from).collect()
    }

    pub fn component_snapshot(&self, id: ComponentId) -> Option<ComponentSnapshot> {
        let node = self.graph.node(id)?;
        let machine = self.machines.get(id)?;
        Some(ComponentSnapshot {
            id,
            name: node.name.clone(),
            kind: node.kind,
            position: node.position,
            plex_glass: node.plex_glass,
            balls: self.balls.owned_by(id),
            results: machine
                .as_collection_point()
                .map(|cp| cp.results().to_vec())
                .unwrap_or_default(),
        })
    }

    /// Every component, in placement order.
    pub fn component_snapshots(&self) -> Vec<ComponentSnapshot> {
        self.graph
            .order()
            .iter()
            .filter_map(|&id| self.component_snapshot(id))
            .collect()
    }

    pub fn posterior(&self) -> PosteriorSnapshot {
        self.tracker.snapshot()
    }

    pub fn bucketed_posterior(&self, granularity: u32) -> BucketedSnapshot {
        self.tracker.snapshot().bucketed(granularity)
    }

    /// Largest per-world gap between the live posterior and one recomputed
    /// from the tracker journal.
    pub fn verify_against_replay(&self) -> Result<f64, SimError> {
        Ok(self.tracker.replay_divergence()?)
    }

    /// Whether every sack has released its balls and no ball is left.
    pub fn is_drained(&self) -> bool {
        self.balls.is_empty()
            && self
                .machines
                .values()
                .filter_map(Machine::as_sack)
                .all(|s| s.is_exhausted())
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Hash computed at the end of the most recent step.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    pub fn subsystem_hashes(&self) -> SubsystemHashes {
        let mut sim = StateHash::new();
        sim.write_u64(self.state.steps);
        sim.write_u64(self.state.now);
        sim.write_u64(self.rng.state());

        let mut balls = StateHash::new();
        for b in self.balls.iter() {
            balls.write_u64(b.id.0);
            balls.write_u32(b.color.0);
            balls.write_u64(b.component.data().as_ffi());
            balls.write_u32(b.state_tag());
            balls.write_f32(b.position.x);
            balls.write_f32(b.position.y);
            balls.write_f32(b.visual.opacity);
            balls.write_f32(b.visual.scale);
            balls.write(&[b.revealed as u8]);
        }

        let mut tracker = StateHash::new();
        tracker.write_u64(self.tracker.journal().len() as u64);
        for p in self.tracker.world_posterior() {
            tracker.write_f64(p);
        }

        SubsystemHashes {
            sim_state: sim.finish(),
            balls: balls.finish(),
            tracker: tracker.finish(),
        }
    }

    fn compute_state_hash(&self) -> u64 {
        let parts = self.subsystem_hashes();
        let mut h = StateHash::new();
        h.write_u64(parts.sim_state);
        h.write_u64(parts.balls);
        h.write_u64(parts.tracker);
        h.finish()
    }
}
