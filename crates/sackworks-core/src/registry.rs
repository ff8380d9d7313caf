//! Component type specifications and the color palette.
//!
//! Built once through [`RegistryBuilder`] and frozen. The simulation looks
//! up how a component kind accepts balls, whether it buffers, and whether it
//! reveals colors here rather than hard-coding it per call site.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ball::BallState;
use crate::id::ColorId;

// ---------------------------------------------------------------------------
// Component kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Sack,
    Conveyor,
    Turn,
    Merger,
    Filter,
    Splitter,
    Duplicator,
    Shuffler,
    BlackPit,
    CollectionPoint,
    Arm,
}

impl ComponentKind {
    pub fn all() -> [ComponentKind; 11] {
        [
            ComponentKind::Sack,
            ComponentKind::Conveyor,
            ComponentKind::Turn,
            ComponentKind::Merger,
            ComponentKind::Filter,
            ComponentKind::Splitter,
            ComponentKind::Duplicator,
            ComponentKind::Shuffler,
            ComponentKind::BlackPit,
            ComponentKind::CollectionPoint,
            ComponentKind::Arm,
        ]
    }
}

/// Which sides a component accepts balls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRule {
    /// Never receives balls.
    None,
    /// Only from the side opposite its output direction.
    Back,
    /// Only from a configured side.
    Configured,
    /// From every side that is not one of its outputs.
    AllButOutputs,
    /// From every side.
    Any,
}

/// When a component reveals the color of a ball it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationPolicy {
    /// Reveals unless the instance is plex glass.
    UnlessPlexGlass,
    /// Reveals even behind plex glass.
    Always,
    Never,
}

/// Static description of a component kind.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    pub kind: ComponentKind,
    pub name: &'static str,
    pub inputs: InputRule,
    pub buffering: bool,
    pub observation: ObservationPolicy,
    /// Ball states this kind may put a ball in.
    pub states: &'static [BallState],
    /// Default speed multiplier for trajectories inside this kind.
    pub default_speed: f64,
}

impl ComponentSpec {
    /// Built-in specification for every component kind.
    pub fn standard(kind: ComponentKind) -> ComponentSpec {
        use BallState::*;
        let (name, inputs, buffering, observation, states, default_speed): (
            &'static str,
            InputRule,
            bool,
            ObservationPolicy,
            &'static [BallState],
            f64,
        ) = match kind {
            ComponentKind::Sack => (
                "sack",
                InputRule::None,
                true,
                ObservationPolicy::UnlessPlexGlass,
                &[Exiting],
                1.0,
            ),
            ComponentKind::Conveyor => (
                "conveyor",
                InputRule::Back,
                false,
                ObservationPolicy::UnlessPlexGlass,
                &[Traveling],
                1.0,
            ),
            ComponentKind::Turn => (
                "turn",
                InputRule::Configured,
                false,
                ObservationPolicy::UnlessPlexGlass,
                &[Traveling],
                1.0,
            ),
            ComponentKind::Merger => (
                "merger",
                InputRule::AllButOutputs,
                false,
                ObservationPolicy::UnlessPlexGlass,
                &[Traveling],
                1.0,
            ),
            ComponentKind::Filter => (
                "filter",
                InputRule::Configured,
                false,
                ObservationPolicy::Always,
                &[Traveling],
                1.0,
            ),
            ComponentKind::Splitter => (
                "splitter",
                InputRule::Configured,
                false,
                ObservationPolicy::UnlessPlexGlass,
                &[Traveling],
                1.0,
            ),
            ComponentKind::Duplicator => (
                "duplicator",
                InputRule::Configured,
                true,
                ObservationPolicy::UnlessPlexGlass,
                &[Entering, Buffered, Exiting],
                1.0,
            ),
            ComponentKind::Shuffler => (
                "shuffler",
                InputRule::AllButOutputs,
                true,
                ObservationPolicy::UnlessPlexGlass,
                &[Entering, Buffered, Exiting, Decaying],
                1.0,
            ),
            ComponentKind::BlackPit => (
                "black_pit",
                InputRule::Any,
                false,
                ObservationPolicy::Never,
                &[Arriving],
                0.8,
            ),
            ComponentKind::CollectionPoint => (
                "collection_point",
                InputRule::Any,
                false,
                ObservationPolicy::UnlessPlexGlass,
                &[Arriving],
                1.0,
            ),
            ComponentKind::Arm => (
                "arm",
                InputRule::Configured,
                true,
                ObservationPolicy::UnlessPlexGlass,
                &[Buffered, Picking, Holding, Placing],
                1.5,
            ),
        };
        ComponentSpec {
            kind,
            name,
            inputs,
            buffering,
            observation,
            states,
            default_speed,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable [`Registry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    colors: Vec<String>,
    color_name_to_id: HashMap<String, ColorId>,
    specs: Vec<ComponentSpec>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            colors: Vec::new(),
            color_name_to_id: HashMap::new(),
            specs: Vec::new(),
        }
    }

    /// Builder preloaded with every built-in component spec.
    pub fn standard() -> Self {
        let mut b = Self::new();
        for kind in ComponentKind::all() {
            b.register_component(ComponentSpec::standard(kind));
        }
        b
    }

    /// Register a color. Re-registering a name returns its existing id.
    pub fn register_color(&mut self, name: &str) -> ColorId {
        if let Some(&id) = self.color_name_to_id.get(name) {
            return id;
        }
        let id = ColorId(self.colors.len() as u32);
        self.colors.push(name.to_string());
        self.color_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Register or replace the spec for a component kind.
    pub fn register_component(&mut self, spec: ComponentSpec) {
        if let Some(existing) = self.specs.iter_mut().find(|s| s.kind == spec.kind) {
            *existing = spec;
        } else {
            self.specs.push(spec);
        }
    }

    pub fn color_id(&self, name: &str) -> Option<ColorId> {
        self.color_name_to_id.get(name).copied()
    }

    pub fn build(mut self) -> Result<Registry, RegistryError> {
        if self.colors.is_empty() {
            return Err(RegistryError::EmptyPalette);
        }
        for kind in ComponentKind::all() {
            if !self.specs.iter().any(|s| s.kind == kind) {
                return Err(RegistryError::MissingSpec(kind));
            }
        }
        self.specs.sort_by_key(|s| s.kind);
        Ok(Registry {
            colors: self.colors,
            color_name_to_id: self.color_name_to_id,
            specs: self.specs,
        })
    }
}

/// Immutable registry. Frozen after build().
#[derive(Debug, Clone)]
pub struct Registry {
    colors: Vec<String>,
    color_name_to_id: HashMap<String, ColorId>,
    /// Sorted by kind; one entry per kind.
    specs: Vec<ComponentSpec>,
}

impl Registry {
    pub fn spec(&self, kind: ComponentKind) -> &ComponentSpec {
        // `build` guarantees exactly one spec per kind in kind order.
        &self.specs[kind as usize]
    }

    pub fn color_id(&self, name: &str) -> Option<ColorId> {
        self.color_name_to_id.get(name).copied()
    }

    pub fn color_name(&self, id: ColorId) -> Option<&str> {
        self.colors.get(id.0 as usize).map(String::as_str)
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    pub fn colors(&self) -> impl Iterator<Item = ColorId> + '_ {
        (0..self.colors.len() as u32).map(ColorId)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("palette has no colors")]
    EmptyPalette,
    #[error("no spec registered for component kind {0:?}")]
    MissingSpec(ComponentKind),
}
