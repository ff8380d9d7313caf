//! Competing hypotheses about what each sack produces.
//!
//! Every sack has a finite list of alternative color distributions. Sacks in
//! a coupled group instead share a list of templates, and each world assigns
//! distinct templates to the group's sacks. The cartesian product over all
//! factors is enumerated into [`World`]s; exactly one of them is the hidden
//! ground truth of a run.

use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::id::{ColorId, SourceId, WorldId};
use crate::rng::SimRng;

/// Refuse to enumerate hypothesis spaces larger than this.
pub const MAX_WORLDS: usize = 4096;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HypothesisError {
    #[error("source '{0}' has no alternatives")]
    NoAlternatives(String),
    #[error("source '{0}' is not covered by any hypothesis")]
    Unassigned(String),
    #[error("source '{0}' is covered by more than one hypothesis")]
    AssignedTwice(String),
    #[error("coupled group has {templates} templates for {sources} sources")]
    TooFewTemplates { sources: usize, templates: usize },
    #[error("distribution '{0}' has no positive weight")]
    EmptyDistribution(String),
    #[error("distribution '{label}' has invalid weight {weight}")]
    InvalidWeight { label: String, weight: f64 },
    #[error("alternative '{0}' has a non-positive prior weight")]
    NonPositivePrior(String),
    #[error("hypothesis space has {0} worlds, more than {max}", max = MAX_WORLDS)]
    TooManyWorlds(usize),
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// A normalized categorical distribution over palette colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    probabilities: Vec<f64>,
    /// Cumulative thresholds for deterministic sampling.
    cumulative: Vec<Fixed64>,
}

impl Distribution {
    /// Normalize raw `(color, weight)` pairs over a palette of `palette_size`.
    pub fn new(
        label: &str,
        weights: &[(ColorId, f64)],
        palette_size: usize,
    ) -> Result<Self, HypothesisError> {
        let mut probabilities = vec![0.0; palette_size];
        for &(color, weight) in weights {
            if !weight.is_finite() || weight < 0.0 || color.0 as usize >= palette_size {
                return Err(HypothesisError::InvalidWeight {
                    label: label.to_string(),
                    weight,
                });
            }
            probabilities[color.0 as usize] += weight;
        }
        let total: f64 = probabilities.iter().sum();
        if total <= 0.0 {
            return Err(HypothesisError::EmptyDistribution(label.to_string()));
        }
        for p in &mut probabilities {
            *p /= total;
        }
        let cumulative = cumulative_thresholds(&probabilities);
        Ok(Self {
            probabilities,
            cumulative,
        })
    }

    pub fn probability(&self, color: ColorId) -> f64 {
        self.probabilities.get(color.0 as usize).copied().unwrap_or(0.0)
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn sample(&self, rng: &mut SimRng) -> ColorId {
        ColorId(sample_index(&self.cumulative, rng) as u32)
    }
}

fn cumulative_thresholds(weights: &[f64]) -> Vec<Fixed64> {
    let mut acc = 0.0;
    weights
        .iter()
        .map(|w| {
            acc += w;
            f64_to_fixed64(acc)
        })
        .collect()
}

/// Draw an index from cumulative thresholds. Indices with zero weight are
/// never returned.
fn sample_index(cumulative: &[Fixed64], rng: &mut SimRng) -> usize {
    let u = rng.next_unit();
    let mut previous = Fixed64::ZERO;
    let mut last_positive = 0;
    for (i, &c) in cumulative.iter().enumerate() {
        if c > previous {
            last_positive = i;
            if u < c {
                return i;
            }
        }
        previous = c;
    }
    last_positive
}

// ---------------------------------------------------------------------------
// Space
// ---------------------------------------------------------------------------

/// One named candidate distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub label: String,
    pub distribution: Distribution,
    pub prior_weight: f64,
}

#[derive(Debug, Clone)]
enum Factor {
    Independent(SourceId),
    Coupled(Vec<SourceId>),
}

/// One joint hypothesis: an alternative index for every source.
#[derive(Debug, Clone, PartialEq)]
pub struct World {
    pub assignment: Vec<usize>,
    pub prior: f64,
}

#[derive(Debug, Clone)]
pub struct HypothesisSpace {
    source_names: Vec<String>,
    /// Per source, the alternatives (or shared templates) it may take.
    alternatives: Vec<Vec<Alternative>>,
    worlds: Vec<World>,
}

impl HypothesisSpace {
    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    pub fn source_count(&self) -> usize {
        self.source_names.len()
    }

    /// Number of colors every distribution ranges over.
    pub fn palette_size(&self) -> usize {
        self.alternatives
            .first()
            .and_then(|alts| alts.first())
            .map(|alt| alt.distribution.probabilities().len())
            .unwrap_or(0)
    }

    pub fn world(&self, id: WorldId) -> &World {
        &self.worlds[id.0 as usize]
    }

    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    pub fn source_name(&self, source: SourceId) -> &str {
        &self.source_names[source.0 as usize]
    }

    pub fn alternatives(&self, source: SourceId) -> &[Alternative] {
        &self.alternatives[source.0 as usize]
    }

    /// The distribution `source` follows in `world`.
    pub fn distribution(&self, world: WorldId, source: SourceId) -> &Distribution {
        let alt = self.worlds[world.0 as usize].assignment[source.0 as usize];
        &self.alternatives[source.0 as usize][alt].distribution
    }

    /// P(color | world, source).
    pub fn likelihood(&self, world: WorldId, source: SourceId, color: ColorId) -> f64 {
        self.distribution(world, source).probability(color)
    }

    /// Sample the hidden world from the prior.
    pub fn sample_world(&self, rng: &mut SimRng) -> WorldId {
        let priors: Vec<f64> = self.worlds.iter().map(|w| w.prior).collect();
        WorldId(sample_index(&cumulative_thresholds(&priors), rng) as u32)
    }
}

/// Incrementally describes a [`HypothesisSpace`].
#[derive(Debug, Default)]
pub struct HypothesisSpaceBuilder {
    source_names: Vec<String>,
    alternatives: Vec<Option<Vec<Alternative>>>,
    factors: Vec<Factor>,
    errors: Vec<HypothesisError>,
}

impl HypothesisSpaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, name: &str) -> SourceId {
        let id = SourceId(self.source_names.len() as u32);
        self.source_names.push(name.to_string());
        self.alternatives.push(None);
        id
    }

    fn claim(&mut self, source: SourceId, alternatives: Vec<Alternative>) {
        let slot = &mut self.alternatives[source.0 as usize];
        if slot.is_some() {
            self.errors.push(HypothesisError::AssignedTwice(
                self.source_names[source.0 as usize].clone(),
            ));
        } else {
            *slot = Some(alternatives);
        }
    }

    /// Give one source its own list of alternatives.
    pub fn independent(&mut self, source: SourceId, alternatives: Vec<Alternative>) {
        if alternatives.is_empty() {
            self.errors.push(HypothesisError::NoAlternatives(
                self.source_names[source.0 as usize].clone(),
            ));
            return;
        }
        self.claim(source, alternatives);
        self.factors.push(Factor::Independent(source));
    }

    /// Assign distinct templates from a shared list to several sources.
    pub fn coupled(&mut self, sources: Vec<SourceId>, templates: Vec<Alternative>) {
        if templates.len() < sources.len() || templates.is_empty() {
            self.errors.push(HypothesisError::TooFewTemplates {
                sources: sources.len(),
                templates: templates.len(),
            });
            return;
        }
        for &s in &sources {
            self.claim(s, templates.clone());
        }
        self.factors.push(Factor::Coupled(sources));
    }

    pub fn build(self) -> Result<HypothesisSpace, HypothesisError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        let mut alternatives = Vec::with_capacity(self.alternatives.len());
        for (i, alts) in self.alternatives.into_iter().enumerate() {
            let alts = alts.ok_or_else(|| HypothesisError::Unassigned(self.source_names[i].clone()))?;
            for alt in &alts {
                if !(alt.prior_weight.is_finite() && alt.prior_weight > 0.0) {
                    return Err(HypothesisError::NonPositivePrior(alt.label.clone()));
                }
            }
            alternatives.push(alts);
        }

        let source_count = self.source_names.len();
        let mut worlds = vec![World {
            assignment: vec![0; source_count],
            prior: 1.0,
        }];
        for factor in &self.factors {
            let options = factor_options(factor, &alternatives);
            if worlds.len().saturating_mul(options.len()) > MAX_WORLDS {
                return Err(HypothesisError::TooManyWorlds(
                    worlds.len().saturating_mul(options.len()),
                ));
            }
            let mut next = Vec::with_capacity(worlds.len() * options.len());
            for world in &worlds {
                for (picks, weight) in &options {
                    let mut assignment = world.assignment.clone();
                    for &(source, alt) in picks {
                        assignment[source.0 as usize] = alt;
                    }
                    next.push(World {
                        assignment,
                        prior: world.prior * weight,
                    });
                }
            }
            worlds = next;
        }

        let total: f64 = worlds.iter().map(|w| w.prior).sum();
        for w in &mut worlds {
            w.prior /= total;
        }
        Ok(HypothesisSpace {
            source_names: self.source_names,
            alternatives,
            worlds,
        })
    }
}

/// Every way a factor can be realized, with its prior weight.
fn factor_options(
    factor: &Factor,
    alternatives: &[Vec<Alternative>],
) -> Vec<(Vec<(SourceId, usize)>, f64)> {
    match factor {
        Factor::Independent(source) => alternatives[source.0 as usize]
            .iter()
            .enumerate()
            .map(|(i, alt)| (vec![(*source, i)], alt.prior_weight))
            .collect(),
        Factor::Coupled(sources) => {
            let templates = &alternatives[sources[0].0 as usize];
            let mut out = Vec::new();
            let mut picked = Vec::with_capacity(sources.len());
            let mut used = vec![false; templates.len()];
            injective_assignments(sources, templates, &mut picked, &mut used, &mut out);
            out
        }
    }
}

fn injective_assignments(
    sources: &[SourceId],
    templates: &[Alternative],
    picked: &mut Vec<(SourceId, usize)>,
    used: &mut [bool],
    out: &mut Vec<(Vec<(SourceId, usize)>, f64)>,
) {
    if picked.len() == sources.len() {
        let weight = picked
            .iter()
            .map(|&(_, t)| templates[t].prior_weight)
            .product();
        out.push((picked.clone(), weight));
        return;
    }
    let source = sources[picked.len()];
    for t in 0..templates.len() {
        if used[t] {
            continue;
        }
        used[t] = true;
        picked.push((source, t));
        injective_assignments(sources, templates, picked, used, out);
        picked.pop();
        used[t] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: ColorId = ColorId(0);
    const BLUE: ColorId = ColorId(1);

    fn alt(label: &str, red: f64, blue: f64) -> Alternative {
        Alternative {
            label: label.to_string(),
            distribution: Distribution::new(label, &[(RED, red), (BLUE, blue)], 2).unwrap(),
            prior_weight: 1.0,
        }
    }

    #[test]
    fn distribution_normalizes() {
        let d = Distribution::new("d", &[(RED, 3.0), (BLUE, 1.0)], 2).unwrap();
        assert!((d.probability(RED) - 0.75).abs() < 1e-12);
        assert_eq!(d.probability(ColorId(9)), 0.0);
    }

    #[test]
    fn distribution_rejects_empty_and_negative() {
        assert_eq!(
            Distribution::new("z", &[(RED, 0.0)], 2).unwrap_err(),
            HypothesisError::EmptyDistribution("z".into())
        );
        assert!(matches!(
            Distribution::new("n", &[(RED, -1.0)], 2),
            Err(HypothesisError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn sampling_never_returns_zero_weight_color() {
        let d = Distribution::new("red", &[(RED, 1.0), (BLUE, 0.0)], 2).unwrap();
        let mut rng = SimRng::new(1);
        for _ in 0..500 {
            assert_eq!(d.sample(&mut rng), RED);
        }
    }

    #[test]
    fn sampling_tracks_weights() {
        let d = Distribution::new("d", &[(RED, 0.9), (BLUE, 0.1)], 2).unwrap();
        let mut rng = SimRng::new(77);
        let reds = (0..10_000).filter(|_| d.sample(&mut rng) == RED).count();
        assert!((8700..=9300).contains(&reds), "got {reds}");
    }

    #[test]
    fn independent_sources_form_cartesian_product() {
        let mut b = HypothesisSpaceBuilder::new();
        let a = b.add_source("a");
        let c = b.add_source("b");
        b.independent(a, vec![alt("x", 1.0, 0.0), alt("y", 0.0, 1.0)]);
        b.independent(c, vec![alt("p", 1.0, 1.0), alt("q", 1.0, 3.0), alt("r", 2.0, 1.0)]);
        let space = b.build().unwrap();
        assert_eq!(space.world_count(), 6);
        let total: f64 = space.worlds().iter().map(|w| w.prior).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coupled_sources_take_distinct_templates() {
        let mut b = HypothesisSpaceBuilder::new();
        let a = b.add_source("a");
        let c = b.add_source("b");
        b.coupled(vec![a, c], vec![alt("x", 1.0, 0.0), alt("y", 0.0, 1.0)]);
        let space = b.build().unwrap();
        assert_eq!(space.world_count(), 2);
        for w in space.worlds() {
            assert_ne!(w.assignment[0], w.assignment[1]);
        }
    }

    #[test]
    fn coupled_with_spare_templates() {
        let mut b = HypothesisSpaceBuilder::new();
        let a = b.add_source("a");
        let c = b.add_source("b");
        b.coupled(
            vec![a, c],
            vec![alt("x", 1.0, 0.0), alt("y", 0.0, 1.0), alt("z", 1.0, 1.0)],
        );
        assert_eq!(b.build().unwrap().world_count(), 6);
    }

    #[test]
    fn prior_weights_shape_world_prior() {
        let mut b = HypothesisSpaceBuilder::new();
        let a = b.add_source("a");
        let mut heavy = alt("heavy", 1.0, 0.0);
        heavy.prior_weight = 3.0;
        b.independent(a, vec![heavy, alt("light", 0.0, 1.0)]);
        let space = b.build().unwrap();
        assert!((space.world(WorldId(0)).prior - 0.75).abs() < 1e-12);
    }

    #[test]
    fn unassigned_source_rejected() {
        let mut b = HypothesisSpaceBuilder::new();
        b.add_source("lonely");
        assert_eq!(
            b.build().unwrap_err(),
            HypothesisError::Unassigned("lonely".into())
        );
    }

    #[test]
    fn double_assignment_rejected() {
        let mut b = HypothesisSpaceBuilder::new();
        let a = b.add_source("a");
        b.independent(a, vec![alt("x", 1.0, 0.0)]);
        b.independent(a, vec![alt("y", 1.0, 0.0)]);
        assert_eq!(
            b.build().unwrap_err(),
            HypothesisError::AssignedTwice("a".into())
        );
    }

    #[test]
    fn too_few_templates_rejected() {
        let mut b = HypothesisSpaceBuilder::new();
        let a = b.add_source("a");
        let c = b.add_source("b");
        b.coupled(vec![a, c], vec![alt("x", 1.0, 0.0)]);
        assert!(matches!(
            b.build(),
            Err(HypothesisError::TooFewTemplates { .. })
        ));
    }

    #[test]
    fn world_limit_enforced() {
        let mut b = HypothesisSpaceBuilder::new();
        for i in 0..13 {
            let s = b.add_source(&format!("s{i}"));
            b.independent(s, vec![alt("x", 1.0, 0.0), alt("y", 0.0, 1.0)]);
        }
        assert!(matches!(b.build(), Err(HypothesisError::TooManyWorlds(_))));
    }

    #[test]
    fn likelihood_lookup() {
        let mut b = HypothesisSpaceBuilder::new();
        let a = b.add_source("a");
        b.independent(a, vec![alt("mostly_red", 0.9, 0.1), alt("mostly_blue", 0.1, 0.9)]);
        let space = b.build().unwrap();
        assert!((space.likelihood(WorldId(0), a, RED) - 0.9).abs() < 1e-12);
        assert!((space.likelihood(WorldId(1), a, RED) - 0.1).abs() < 1e-12);
    }
}
