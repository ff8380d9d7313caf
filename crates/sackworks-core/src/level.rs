//! Level descriptors: the parsed, serde-facing description of a factory.
//!
//! The core never reads files; the data crate deserializes these types from
//! RON, JSON or TOML and hands them to
//! [`Simulation::from_level`](crate::engine::Simulation::from_level).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::component::{ComponentConfig, SpawnSchedule};
use crate::error::ConfigError;
use crate::geometry::{GridPosition, GridSize};
use crate::hypothesis::{Alternative, Distribution, HypothesisSpace, HypothesisSpaceBuilder};
use crate::id::SourceId;
use crate::registry::{Registry, RegistryBuilder};
use crate::sim::ClockConfig;

fn default_prior() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDescriptor {
    pub name: String,
    pub grid: GridSize,
    /// Palette color names; a color's id is its index.
    pub colors: Vec<String>,
    pub components: Vec<ComponentDescriptor>,
    #[serde(default)]
    pub hypotheses: HypothesisDescriptor,
    #[serde(default)]
    pub spawn: SpawnSchedule,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub clock: ClockConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub id: String,
    pub position: GridPosition,
    #[serde(default)]
    pub plex_glass: bool,
    pub kind: ComponentConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HypothesisDescriptor {
    #[serde(default)]
    pub sources: Vec<SourceHypotheses>,
    #[serde(default)]
    pub coupled: Vec<CoupledHypotheses>,
}

/// Independent alternatives for one sack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHypotheses {
    /// Component id of the sack.
    pub source: String,
    pub alternatives: Vec<AlternativeDescriptor>,
}

/// Shared templates injectively assigned to several sacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupledHypotheses {
    pub sources: Vec<String>,
    pub templates: Vec<AlternativeDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeDescriptor {
    pub label: String,
    /// Unnormalized weight per palette color name.
    pub weights: BTreeMap<String, f64>,
    #[serde(default = "default_prior")]
    pub prior: f64,
}

impl LevelDescriptor {
    /// Freeze the palette and the built-in component specs.
    pub fn registry(&self) -> Result<Registry, ConfigError> {
        let mut builder = RegistryBuilder::standard();
        for color in &self.colors {
            builder.register_color(color);
        }
        Ok(builder.build()?)
    }

    /// Sack ids in declaration order. A sack's [`SourceId`] is its index.
    pub fn sacks(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|c| matches!(c.kind, ComponentConfig::Sack(_)))
            .map(|c| c.id.as_str())
            .collect()
    }

    /// Build the hypothesis space over this level's sacks.
    pub fn hypothesis_space(
        &self,
        registry: &Registry,
    ) -> Result<(HypothesisSpace, HashMap<String, SourceId>), ConfigError> {
        let mut builder = HypothesisSpaceBuilder::new();
        let mut sources = HashMap::new();
        for sack in self.sacks() {
            sources.insert(sack.to_string(), builder.add_source(sack));
        }
        let lookup = |name: &str| {
            sources
                .get(name)
                .copied()
                .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))
        };

        for entry in &self.hypotheses.sources {
            let source = lookup(&entry.source)?;
            let alternatives = entry
                .alternatives
                .iter()
                .map(|a| alternative(a, &entry.source, registry))
                .collect::<Result<Vec<_>, _>>()?;
            builder.independent(source, alternatives);
        }
        for group in &self.hypotheses.coupled {
            let members = group
                .sources
                .iter()
                .map(|s| lookup(s))
                .collect::<Result<Vec<_>, _>>()?;
            let owner = group.sources.join("+");
            let templates = group
                .templates
                .iter()
                .map(|a| alternative(a, &owner, registry))
                .collect::<Result<Vec<_>, _>>()?;
            builder.coupled(members, templates);
        }
        let space = builder.build()?;
        Ok((space, sources))
    }
}

fn alternative(
    descriptor: &AlternativeDescriptor,
    owner: &str,
    registry: &Registry,
) -> Result<Alternative, ConfigError> {
    let weights = descriptor
        .weights
        .iter()
        .map(|(color, &weight)| {
            registry
                .color_id(color)
                .map(|id| (id, weight))
                .ok_or_else(|| ConfigError::UnknownColor {
                    component: owner.to_string(),
                    color: color.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Alternative {
        label: descriptor.label.clone(),
        distribution: Distribution::new(&descriptor.label, &weights, registry.color_count())?,
        prior_weight: descriptor.prior,
    })
}
