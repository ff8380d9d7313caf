//! Sackworks Core -- a ball-factory simulation with exact provenance
//! inference.
//!
//! Colored balls are drawn from hidden-distribution sacks and carried through
//! a grid of components (conveyors, filters, duplicators, shufflers, sinks).
//! A [`tracker::ProvenanceTracker`] follows every ball and maintains the exact
//! Bayesian posterior over which hypothesis world generated the sacks, even
//! after shufflers have mixed balls from different sources.
//!
//! # Step Pipeline
//!
//! Each call to [`engine::Simulation::step`] advances time by one step:
//!
//! 1. **Clock** -- Advance simulation time by `step_ticks`.
//! 2. **Trajectories** -- Finish due trajectories; owning machines react and
//!    hand balls to their neighbors.
//! 3. **Poll** -- Every component gets a chance to spawn, release or decay.
//! 4. **Visuals** -- Integrate buffer jitter and sync ball positions.
//! 5. **Events** -- Deliver buffered events to listeners.
//! 6. **Bookkeeping** -- Increment the step counter and compute the state hash.
//!
//! # Key Types
//!
//! - [`engine::Simulation`] -- Owns everything and runs the pipeline.
//! - [`level::LevelDescriptor`] -- Serde-facing description of a factory.
//! - [`component::Machine`] -- The per-kind state machines.
//! - [`graph::RoutingGraph`] -- Spatial port resolution between cells.
//! - [`hypothesis::HypothesisSpace`] -- Enumerated candidate worlds.
//! - [`tracker::ProvenanceTracker`] -- Exact posterior over worlds.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic timing.
//! - [`event::EventBus`] -- Subscription-based event bus with buffered delivery.

pub mod ball;
pub mod component;
pub mod engine;
pub mod error;
pub mod event;
pub mod fixed;
pub mod geometry;
pub mod graph;
pub mod hypothesis;
pub mod id;
pub mod level;
pub mod query;
pub mod registry;
pub mod rng;
pub mod sim;
pub mod tracker;
pub mod trajectory;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
