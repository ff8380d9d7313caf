//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::collections::BTreeMap;

use crate::component::*;
use crate::geometry::{Direction, GridPosition, GridSize};
use crate::hypothesis::{Alternative, Distribution, HypothesisSpace, HypothesisSpaceBuilder};
use crate::id::{ColorId, SourceId};
use crate::level::*;
use crate::sim::ClockConfig;

// ===========================================================================
// Palette
// ===========================================================================

pub const RED: ColorId = ColorId(0);
pub const BLUE: ColorId = ColorId(1);

pub fn red() -> ColorId {
    RED
}
pub fn blue() -> ColorId {
    BLUE
}

// ===========================================================================
// Hypothesis helpers
// ===========================================================================

/// A red/blue alternative with the given weights.
pub fn alternative(label: &str, red: f64, blue: f64) -> Alternative {
    Alternative {
        label: label.into(),
        distribution: Distribution::new(label, &[(RED, red), (BLUE, blue)], 2)
            .expect("valid red/blue weights"),
        prior_weight: 1.0,
    }
}

/// `sources` independent sacks, each "mostly red" (9:1) or "mostly blue"
/// (1:9) with even priors.
pub fn two_alt_space(sources: usize) -> (HypothesisSpace, Vec<SourceId>) {
    let mut builder = HypothesisSpaceBuilder::new();
    let ids: Vec<SourceId> = (0..sources)
        .map(|i| builder.add_source(&format!("sack{i}")))
        .collect();
    for &id in &ids {
        builder.independent(
            id,
            vec![
                alternative("mostly_red", 9.0, 1.0),
                alternative("mostly_blue", 1.0, 9.0),
            ],
        );
    }
    (builder.build().expect("valid space"), ids)
}

/// The same two alternatives as a level descriptor entry.
pub fn two_alt(label_red: &str, label_blue: &str) -> Vec<AlternativeDescriptor> {
    vec![
        alt_descriptor(label_red, &[("red", 9.0), ("blue", 1.0)]),
        alt_descriptor(label_blue, &[("red", 1.0), ("blue", 9.0)]),
    ]
}

pub fn alt_descriptor(label: &str, weights: &[(&str, f64)]) -> AlternativeDescriptor {
    AlternativeDescriptor {
        label: label.into(),
        weights: weights
            .iter()
            .map(|&(c, w)| (c.to_string(), w))
            .collect::<BTreeMap<_, _>>(),
        prior: 1.0,
    }
}

// ===========================================================================
// Level builder
// ===========================================================================

/// Fluent construction of [`LevelDescriptor`]s.
pub struct LevelBuilder {
    level: LevelDescriptor,
}

impl LevelBuilder {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            level: LevelDescriptor {
                name: name.into(),
                grid: GridSize { width, height },
                colors: vec!["red".into(), "blue".into()],
                components: Vec::new(),
                hypotheses: HypothesisDescriptor::default(),
                spawn: SpawnSchedule::default(),
                seed: 7,
                clock: ClockConfig::default(),
            },
        }
    }

    pub fn colors(mut self, colors: &[&str]) -> Self {
        self.level.colors = colors.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.level.seed = seed;
        self
    }

    pub fn spawn(mut self, count: u32, interval: u64) -> Self {
        self.level.spawn = SpawnSchedule {
            count,
            interval,
            start: 0,
        };
        self
    }

    pub fn clock(mut self, clock: ClockConfig) -> Self {
        self.level.clock = clock;
        self
    }

    pub fn place(mut self, id: &str, x: i32, y: i32, kind: ComponentConfig) -> Self {
        self.level.components.push(ComponentDescriptor {
            id: id.into(),
            position: GridPosition::new(x, y),
            plex_glass: false,
            kind,
        });
        self
    }

    /// Put plex glass over an already placed component.
    pub fn plex_glass(mut self, id: &str) -> Self {
        if let Some(c) = self.level.components.iter_mut().find(|c| c.id == id) {
            c.plex_glass = true;
        }
        self
    }

    pub fn sack(self, id: &str, x: i32, y: i32, direction: Direction, count: u32) -> Self {
        self.place(
            id,
            x,
            y,
            ComponentConfig::Sack(SackConfig {
                direction,
                count: Some(count),
                interval: None,
                start: None,
                speed: None,
            }),
        )
    }

    pub fn conveyor(self, id: &str, x: i32, y: i32, direction: Direction) -> Self {
        self.place(
            id,
            x,
            y,
            ComponentConfig::Conveyor(ConveyorConfig {
                direction,
                speed: None,
            }),
        )
    }

    pub fn turn(self, id: &str, x: i32, y: i32, from: Direction, direction: Direction) -> Self {
        self.place(
            id,
            x,
            y,
            ComponentConfig::Turn(TurnConfig {
                from,
                direction,
                speed: None,
            }),
        )
    }

    pub fn merger(self, id: &str, x: i32, y: i32, direction: Direction) -> Self {
        self.place(
            id,
            x,
            y,
            ComponentConfig::Merger(MergerConfig {
                direction,
                speed: None,
            }),
        )
    }

    pub fn filter(
        self,
        id: &str,
        x: i32,
        y: i32,
        color: &str,
        match_side: Direction,
        other_side: Direction,
    ) -> Self {
        self.place(
            id,
            x,
            y,
            ComponentConfig::Filter(FilterConfig {
                color: color.into(),
                match_side,
                other_side,
                from: None,
                speed: None,
            }),
        )
    }

    pub fn duplicator(
        self,
        id: &str,
        x: i32,
        y: i32,
        from: Direction,
        original_side: Direction,
        copy_side: Direction,
    ) -> Self {
        self.place(
            id,
            x,
            y,
            ComponentConfig::Duplicator(DuplicatorConfig {
                from,
                original_side,
                copy_side,
                hold_ticks: 300,
                speed: None,
            }),
        )
    }

    pub fn shuffler(self, id: &str, x: i32, y: i32, config: ShufflerConfig) -> Self {
        self.place(id, x, y, ComponentConfig::Shuffler(config))
    }

    pub fn collection_point(self, id: &str, x: i32, y: i32) -> Self {
        self.place(id, x, y, ComponentConfig::CollectionPoint)
    }

    pub fn black_pit(self, id: &str, x: i32, y: i32) -> Self {
        self.place(id, x, y, ComponentConfig::BlackPit)
    }

    /// Independent alternatives for one sack, as (label, [(color, weight)]).
    pub fn hypothesis(mut self, source: &str, alternatives: &[(&str, &[(&str, f64)])]) -> Self {
        self.level.hypotheses.sources.push(SourceHypotheses {
            source: source.into(),
            alternatives: alternatives
                .iter()
                .map(|&(label, weights)| alt_descriptor(label, weights))
                .collect(),
        });
        self
    }

    pub fn alternatives(mut self, source: &str, alternatives: Vec<AlternativeDescriptor>) -> Self {
        self.level.hypotheses.sources.push(SourceHypotheses {
            source: source.into(),
            alternatives,
        });
        self
    }

    pub fn coupled(mut self, sources: &[&str], templates: Vec<AlternativeDescriptor>) -> Self {
        self.level.hypotheses.coupled.push(CoupledHypotheses {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            templates,
        });
        self
    }

    pub fn build(self) -> LevelDescriptor {
        self.level
    }
}

// ===========================================================================
// Canned levels
// ===========================================================================

/// `sack -> belt0 -> belt1 -> bin` along one row, all heading east. With
/// `plex`, the sack and both belts hide colors, so the first observation
/// happens at the collection point.
pub fn line_level(count: u32, plex: bool) -> LevelDescriptor {
    let mut builder = LevelBuilder::new("line", 4, 1)
        .sack("sack", 0, 0, Direction::East, count)
        .conveyor("belt0", 1, 0, Direction::East)
        .conveyor("belt1", 2, 0, Direction::East)
        .collection_point("bin", 3, 0)
        .alternatives("sack", two_alt("mostly_red", "mostly_blue"));
    if plex {
        builder = builder
            .plex_glass("sack")
            .plex_glass("belt0")
            .plex_glass("belt1");
    }
    builder.build()
}

/// Two sacks under plex glass feeding a shuffler that releases pairs east
/// into a collection point.
///
/// ```text
///            a (2,0)
///              |
/// b (0,1) -> belt (1,1) -> mixer (2,1) -> out (3,1) -> bin (4,1)
/// ```
pub fn shuffler_level(count_per_sack: u32) -> LevelDescriptor {
    LevelBuilder::new("mixer", 5, 2)
        .sack("a", 2, 0, Direction::South, count_per_sack)
        .sack("b", 0, 1, Direction::East, count_per_sack)
        .conveyor("belt", 1, 1, Direction::East)
        .shuffler(
            "mixer",
            2,
            1,
            ShufflerConfig {
                min_buffer_size: 2,
                outputs: vec![PatternEntry {
                    side: Direction::East,
                    count: 2,
                }],
                retain: 0,
                output_interval: 240,
                idle_timeout: 3000,
                decay_ticks: 600,
                speed: None,
            },
        )
        .conveyor("out", 3, 1, Direction::East)
        .collection_point("bin", 4, 1)
        .plex_glass("a")
        .plex_glass("b")
        .plex_glass("belt")
        .plex_glass("mixer")
        .plex_glass("out")
        .alternatives("a", two_alt("a_red", "a_blue"))
        .alternatives("b", two_alt("b_red", "b_blue"))
        .build()
}
