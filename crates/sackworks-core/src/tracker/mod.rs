//! Exact Bayesian provenance tracking.
//!
//! The tracker maintains a posterior over the enumerated worlds of a
//! [`HypothesisSpace`] while balls are observed, shuffled, duplicated and
//! collected. Its bookkeeping unit is the *group*: a set of draws whose
//! unrevealed members are indistinguishable. Each group keeps a joint weight
//! table over (world, multiset of unrevealed sources); the world posterior is
//! the prior times the product of every group's per-world mass.
//!
//! Groups live in a union-find forest keyed by draw. Merging concatenates
//! factor tables and only fuses them when an observation or collection needs
//! the joint. A per-world log evidence is updated incrementally, so the
//! posterior query never touches the groups.

mod posterior;
mod table;

use std::collections::BTreeMap;

pub use posterior::{
    BallBelief, BucketedSnapshot, GroupEntry, GroupPosterior, PosteriorSnapshot, SourcePosterior,
    bucketize,
};
pub use table::{SlotCounts, WeightTable};

use crate::fixed::Ticks;
use crate::hypothesis::HypothesisSpace;
use crate::id::{BallId, ColorId, DrawId, SourceId, WorldId};

// ---------------------------------------------------------------------------
// Events and errors
// ---------------------------------------------------------------------------

/// Knowledge-changing events emitted by the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Created { ball: BallId, source: SourceId },
    Duplicated { parent: BallId, child: BallId },
    Observation { ball: BallId, color: ColorId, at: Ticks },
    Shuffle { a: BallId, b: BallId },
    Collected { ball: BallId },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    #[error("{0} is not known to the tracker")]
    UnknownBall(BallId),
    #[error("{0} was already collected")]
    Collected(BallId),
    #[error("{0} is already registered")]
    AlreadyRegistered(BallId),
    #[error("source {0:?} is outside the hypothesis space")]
    UnknownSource(SourceId),
    #[error("{ball} was revealed as {expected:?} but observed as {observed:?}")]
    ColorMismatch {
        ball: BallId,
        expected: ColorId,
        observed: ColorId,
    },
    #[error("observing {color:?} on {ball} is impossible under every hypothesis")]
    ImpossibleObservation { ball: BallId, color: ColorId },
}

/// One entry of the append-only observation log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationRecord {
    pub ball: BallId,
    pub color: ColorId,
    pub at: Ticks,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Draw {
    source: SourceId,
    revealed: Option<ColorId>,
    /// Live balls carrying this draw.
    live: u32,
}

#[derive(Debug, Clone)]
struct Group {
    /// Unfused factors, kept sorted by origin.
    factors: Vec<WeightTable>,
    /// ln Z_g(w) currently folded into the global evidence.
    log_mass: Vec<f64>,
    live_balls: u32,
}

#[derive(Debug, Clone, Copy)]
struct BallEntry {
    draw: DrawId,
    collected: bool,
}

/// Handle for a provenance group, valid until the next merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey(pub DrawId);

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProvenanceTracker {
    space: HypothesisSpace,
    log_prior: Vec<f64>,
    log_evidence: Vec<f64>,
    draws: Vec<Draw>,
    parent: Vec<u32>,
    size: Vec<u32>,
    groups: BTreeMap<DrawId, Group>,
    balls: BTreeMap<BallId, BallEntry>,
    observations: Vec<ObservationRecord>,
    journal: Vec<TrackerEvent>,
}

impl ProvenanceTracker {
    pub fn new(space: HypothesisSpace) -> Self {
        let log_prior = space.worlds().iter().map(|w| w.prior.ln()).collect();
        let worlds = space.world_count();
        Self {
            space,
            log_prior,
            log_evidence: vec![0.0; worlds],
            draws: Vec::new(),
            parent: Vec::new(),
            size: Vec::new(),
            groups: BTreeMap::new(),
            balls: BTreeMap::new(),
            observations: Vec::new(),
            journal: Vec::new(),
        }
    }

    pub fn space(&self) -> &HypothesisSpace {
        &self.space
    }

    /// Apply any tracker event.
    pub fn apply(&mut self, event: &TrackerEvent) -> Result<(), TrackerError> {
        match *event {
            TrackerEvent::Created { ball, source } => self.register_draw(ball, source).map(|_| ()),
            TrackerEvent::Duplicated { parent, child } => {
                self.on_duplicated(parent, child).map(|_| ())
            }
            TrackerEvent::Observation { ball, color, at } => self.on_observation(ball, color, at),
            TrackerEvent::Shuffle { a, b } => self.on_shuffle(a, b),
            TrackerEvent::Collected { ball } => self.on_collected(ball),
        }
    }

    /// A sack produced `ball`. Starts a singleton group tied to `source`.
    pub fn register_draw(&mut self, ball: BallId, source: SourceId) -> Result<DrawId, TrackerError> {
        if self.balls.contains_key(&ball) {
            return Err(TrackerError::AlreadyRegistered(ball));
        }
        if source.0 as usize >= self.space.source_count() {
            return Err(TrackerError::UnknownSource(source));
        }
        let draw = DrawId(self.draws.len() as u32);
        self.draws.push(Draw {
            source,
            revealed: None,
            live: 1,
        });
        self.parent.push(draw.0);
        self.size.push(1);
        let worlds = self.space.world_count();
        self.groups.insert(
            draw,
            Group {
                factors: vec![WeightTable::singleton(
                    draw,
                    source,
                    self.space.source_count(),
                    worlds,
                )],
                log_mass: vec![0.0; worlds],
                live_balls: 1,
            },
        );
        self.balls.insert(
            ball,
            BallEntry {
                draw,
                collected: false,
            },
        );
        self.journal.push(TrackerEvent::Created { ball, source });
        Ok(draw)
    }

    /// `child` is an exact copy of `parent` and shares its draw.
    pub fn on_duplicated(&mut self, parent: BallId, child: BallId) -> Result<DrawId, TrackerError> {
        let draw = self.live_entry(parent)?.draw;
        if self.balls.contains_key(&child) {
            return Err(TrackerError::AlreadyRegistered(child));
        }
        self.balls.insert(
            child,
            BallEntry {
                draw,
                collected: false,
            },
        );
        self.draws[draw.0 as usize].live += 1;
        let root = self.find(draw);
        if let Some(group) = self.groups.get_mut(&root) {
            group.live_balls += 1;
        }
        self.journal.push(TrackerEvent::Duplicated { parent, child });
        Ok(draw)
    }

    /// `ball` was seen to be `color`.
    pub fn on_observation(&mut self, ball: BallId, color: ColorId, at: Ticks) -> Result<(), TrackerError> {
        let draw = self.live_entry(ball)?.draw;
        if let Some(expected) = self.draws[draw.0 as usize].revealed {
            if expected != color {
                return Err(TrackerError::ColorMismatch {
                    ball,
                    expected,
                    observed: color,
                });
            }
            self.observations.push(ObservationRecord { ball, color, at });
            self.journal.push(TrackerEvent::Observation { ball, color, at });
            return Ok(());
        }

        let root = self.find(draw);
        let fused = self.fused(root).ok_or(TrackerError::UnknownBall(ball))?;
        let space = &self.space;
        let mut revealed = fused.remove_one(|w, s| space.likelihood(w, s, color));
        let survives = revealed
            .world_mass()
            .iter()
            .zip(&self.log_evidence)
            .any(|(&m, &e)| m > 0.0 && e.is_finite());
        if !survives {
            return Err(TrackerError::ImpossibleObservation { ball, color });
        }
        revealed.rescale();
        self.replace_factors(root, revealed);

        self.draws[draw.0 as usize].revealed = Some(color);
        self.observations.push(ObservationRecord { ball, color, at });
        self.journal.push(TrackerEvent::Observation { ball, color, at });
        log::debug!("tracker: {ball} observed as {color:?}");
        Ok(())
    }

    /// `a` and `b` became indistinguishable. Merges their groups.
    pub fn on_shuffle(&mut self, a: BallId, b: BallId) -> Result<(), TrackerError> {
        let da = self.live_entry(a)?.draw;
        let db = self.live_entry(b)?.draw;
        let ra = self.find(da);
        let rb = self.find(db);
        self.journal.push(TrackerEvent::Shuffle { a, b });
        if ra == rb {
            return Ok(());
        }
        // Union by size; ties go to the smaller root so argument order never
        // changes the result.
        let (keep, absorb) = {
            let (sa, sb) = (self.size[ra.0 as usize], self.size[rb.0 as usize]);
            if sa > sb || (sa == sb && ra < rb) {
                (ra, rb)
            } else {
                (rb, ra)
            }
        };
        let absorbed = self.groups.remove(&absorb);
        self.parent[absorb.0 as usize] = keep.0;
        self.size[keep.0 as usize] += self.size[absorb.0 as usize];
        if let (Some(absorbed), Some(group)) = (absorbed, self.groups.get_mut(&keep)) {
            group.factors.extend(absorbed.factors);
            group.factors.sort_by_key(|t| t.origin());
            for (m, n) in group.log_mass.iter_mut().zip(&absorbed.log_mass) {
                *m += n;
            }
            group.live_balls += absorbed.live_balls;
        }
        Ok(())
    }

    /// `ball` left the factory. Any later event naming it fails.
    pub fn on_collected(&mut self, ball: BallId) -> Result<(), TrackerError> {
        let draw = self.live_entry(ball)?.draw;
        if let Some(entry) = self.balls.get_mut(&ball) {
            entry.collected = true;
        }
        let root = self.find(draw);
        let record = &mut self.draws[draw.0 as usize];
        record.live -= 1;
        let vanished_unrevealed = record.live == 0 && record.revealed.is_none();

        if vanished_unrevealed {
            if let Some(fused) = self.fused(root) {
                let mut marginal = fused.remove_one(|_, _| 1.0);
                marginal.rescale();
                self.replace_factors(root, marginal);
            }
        }
        let drop_group = match self.groups.get_mut(&root) {
            Some(group) => {
                group.live_balls -= 1;
                group.live_balls == 0
            }
            None => false,
        };
        if drop_group {
            // Evidence stays folded into the global log evidence.
            self.groups.remove(&root);
        }
        self.journal.push(TrackerEvent::Collected { ball });
        Ok(())
    }

    // -- union-find ---------------------------------------------------------

    fn find(&mut self, draw: DrawId) -> DrawId {
        let mut root = draw.0;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut node = draw.0;
        while self.parent[node as usize] != root {
            let next = self.parent[node as usize];
            self.parent[node as usize] = root;
            node = next;
        }
        DrawId(root)
    }

    fn find_readonly(&self, draw: DrawId) -> DrawId {
        let mut root = draw.0;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        DrawId(root)
    }

    fn live_entry(&self, ball: BallId) -> Result<BallEntry, TrackerError> {
        match self.balls.get(&ball) {
            None => Err(TrackerError::UnknownBall(ball)),
            Some(entry) if entry.collected => Err(TrackerError::Collected(ball)),
            Some(entry) => Ok(*entry),
        }
    }

    // -- table maintenance --------------------------------------------------

    /// The group's joint table, fusing factors in origin order.
    fn fused(&self, root: DrawId) -> Option<WeightTable> {
        let mut factors = self.groups.get(&root)?.factors.iter();
        let first = factors.next()?.clone();
        Some(factors.fold(first, |acc, t| acc.product(t)))
    }

    /// Install a freshly computed joint table and fold the change in mass
    /// into the global evidence.
    fn replace_factors(&mut self, root: DrawId, table: WeightTable) {
        let Some(group) = self.groups.get_mut(&root) else {
            return;
        };
        let new_log = table.log_mass();
        for ((global, old), new) in self
            .log_evidence
            .iter_mut()
            .zip(&group.log_mass)
            .zip(&new_log)
        {
            if !global.is_finite() {
                continue;
            }
            if new.is_finite() {
                *global += new - old;
            } else {
                *global = f64::NEG_INFINITY;
            }
        }
        group.log_mass = new_log;
        group.factors = vec![table];
    }

    // -- queries ------------------------------------------------------------

    /// Posterior probability of every world.
    pub fn world_posterior(&self) -> Vec<f64> {
        let logs: Vec<f64> = self
            .log_prior
            .iter()
            .zip(&self.log_evidence)
            .map(|(p, e)| p + e)
            .collect();
        normalize_logs(&logs)
    }

    /// Posterior probability of a single world.
    pub fn world_probability(&self, world: WorldId) -> f64 {
        self.world_posterior()
            .get(world.0 as usize)
            .copied()
            .unwrap_or(0.0)
    }

    /// Marginal posterior over each source's alternatives.
    pub fn source_marginals(&self) -> Vec<SourcePosterior> {
        let posterior = self.world_posterior();
        (0..self.space.source_count() as u32)
            .map(SourceId)
            .map(|source| {
                let alts = self.space.alternatives(source);
                let mut probs = vec![0.0; alts.len()];
                for (world, p) in self.space.worlds().iter().zip(&posterior) {
                    probs[world.assignment[source.0 as usize]] += p;
                }
                SourcePosterior {
                    source,
                    name: self.space.source_name(source).to_string(),
                    alternatives: alts
                        .iter()
                        .map(|a| a.label.clone())
                        .zip(probs)
                        .collect(),
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> PosteriorSnapshot {
        PosteriorSnapshot {
            worlds: self.world_posterior(),
            sources: self.source_marginals(),
        }
    }

    /// The group a live ball belongs to.
    pub fn group_of(&self, ball: BallId) -> Result<GroupKey, TrackerError> {
        let draw = self.live_entry(ball)?.draw;
        Ok(GroupKey(self.find_readonly(draw)))
    }

    /// The draw a live ball carries and the sack that produced it.
    pub fn draw_of(&self, ball: BallId) -> Result<(DrawId, SourceId), TrackerError> {
        let draw = self.live_entry(ball)?.draw;
        Ok((draw, self.draws[draw.0 as usize].source))
    }

    pub fn same_group(&self, a: BallId, b: BallId) -> Result<bool, TrackerError> {
        Ok(self.group_of(a)? == self.group_of(b)?)
    }

    /// Live groups.
    pub fn groups(&self) -> impl Iterator<Item = GroupKey> + '_ {
        self.groups.keys().copied().map(GroupKey)
    }

    /// Joint posterior over (world, unrevealed multiset) for one group,
    /// conditioned on everything else the tracker knows. Sums to 1.
    pub fn group_posterior(&self, key: GroupKey) -> Option<GroupPosterior> {
        let group = self.groups.get(&key.0)?;
        let table = self.fused(key.0)?;
        // Evidence from every other group, per world.
        let outside: Vec<f64> = self
            .log_prior
            .iter()
            .zip(&self.log_evidence)
            .zip(&group.log_mass)
            .map(|((p, e), g)| if e.is_finite() { p + e - g } else { f64::NEG_INFINITY })
            .collect();
        let max = outside.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return None;
        }
        let mut entries = Vec::new();
        let mut total = 0.0;
        for (key, weights) in table.entries() {
            for (w, weight) in weights.iter().enumerate() {
                let scale = (outside[w] - max).exp();
                let p = weight * scale;
                if p > 0.0 {
                    total += p;
                    entries.push(GroupEntry {
                        world: WorldId(w as u32),
                        unrevealed: key.clone(),
                        probability: p,
                    });
                }
            }
        }
        if total <= 0.0 {
            return None;
        }
        for e in &mut entries {
            e.probability /= total;
        }
        Some(GroupPosterior { entries })
    }

    /// What is known about a single live ball.
    pub fn ball_belief(&self, ball: BallId) -> Result<BallBelief, TrackerError> {
        let draw = self.live_entry(ball)?.draw;
        if let Some(color) = self.draws[draw.0 as usize].revealed {
            return Ok(BallBelief::Revealed { color });
        }
        let key = GroupKey(self.find_readonly(draw));
        let palette = self.space.palette_size();
        let mut color = vec![0.0; palette];
        let mut origin = vec![0.0; self.space.source_count()];
        if let Some(joint) = self.group_posterior(key) {
            for entry in &joint.entries {
                let total: u32 = entry.unrevealed.iter().sum();
                if total == 0 {
                    continue;
                }
                for (s, &ks) in entry.unrevealed.iter().enumerate() {
                    if ks == 0 {
                        continue;
                    }
                    let share = entry.probability * ks as f64 / total as f64;
                    origin[s] += share;
                    let dist = self.space.distribution(entry.world, SourceId(s as u32));
                    for (c, p) in color.iter_mut().zip(dist.probabilities()) {
                        *c += share * p;
                    }
                }
            }
        }
        Ok(BallBelief::Hidden { color, origin })
    }

    pub fn observations(&self) -> &[ObservationRecord] {
        &self.observations
    }

    /// Every accepted event, in order.
    pub fn journal(&self) -> &[TrackerEvent] {
        &self.journal
    }

    pub fn is_collected(&self, ball: BallId) -> bool {
        self.balls.get(&ball).is_some_and(|e| e.collected)
    }

    pub fn is_tracked(&self, ball: BallId) -> bool {
        self.balls.get(&ball).is_some_and(|e| !e.collected)
    }

    /// Rebuild a tracker from scratch by replaying a journal.
    pub fn replay(space: HypothesisSpace, journal: &[TrackerEvent]) -> Result<Self, TrackerError> {
        let mut tracker = Self::new(space);
        for event in journal {
            tracker.apply(event)?;
        }
        Ok(tracker)
    }

    /// Largest per-world difference between the live posterior and one
    /// recomputed from the journal.
    pub fn replay_divergence(&self) -> Result<f64, TrackerError> {
        let fresh = Self::replay(self.space.clone(), &self.journal)?;
        Ok(self
            .world_posterior()
            .iter()
            .zip(fresh.world_posterior())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }
}

/// Softmax of log weights; all-`-inf` input yields all zeros.
fn normalize_logs(logs: &[f64]) -> Vec<f64> {
    let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![0.0; logs.len()];
    }
    let weights: Vec<f64> = logs.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::{Alternative, Distribution, HypothesisSpaceBuilder};

    const RED: ColorId = ColorId(0);
    const BLUE: ColorId = ColorId(1);

    fn alt(label: &str, red: f64, blue: f64) -> Alternative {
        Alternative {
            label: label.into(),
            distribution: Distribution::new(label, &[(RED, red), (BLUE, blue)], 2).unwrap(),
            prior_weight: 1.0,
        }
    }

    fn one_source() -> ProvenanceTracker {
        let mut b = HypothesisSpaceBuilder::new();
        let s = b.add_source("sack");
        b.independent(s, vec![alt("reddish", 0.9, 0.1), alt("bluish", 0.1, 0.9)]);
        ProvenanceTracker::new(b.build().unwrap())
    }

    fn two_sources() -> ProvenanceTracker {
        let mut b = HypothesisSpaceBuilder::new();
        let a = b.add_source("a");
        let c = b.add_source("b");
        b.independent(a, vec![alt("a_red", 0.8, 0.2), alt("a_blue", 0.3, 0.7)]);
        b.independent(c, vec![alt("b_red", 0.6, 0.4), alt("b_blue", 0.1, 0.9)]);
        ProvenanceTracker::new(b.build().unwrap())
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn prior_before_any_event() {
        let t = one_source();
        assert_eq!(t.world_posterior(), vec![0.5, 0.5]);
    }

    #[test]
    fn direct_observation_updates_posterior() {
        let mut t = one_source();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.on_observation(BallId(0), RED, 5).unwrap();
        assert!(close(t.world_probability(WorldId(0)), 0.9));
        assert_eq!(t.observations().len(), 1);
    }

    #[test]
    fn repeated_observation_is_noop() {
        let mut t = one_source();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.on_observation(BallId(0), RED, 1).unwrap();
        t.on_observation(BallId(0), RED, 2).unwrap();
        assert!(close(t.world_probability(WorldId(0)), 0.9));
    }

    #[test]
    fn conflicting_reobservation_fails() {
        let mut t = one_source();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.on_observation(BallId(0), RED, 1).unwrap();
        assert!(matches!(
            t.on_observation(BallId(0), BLUE, 2),
            Err(TrackerError::ColorMismatch { .. })
        ));
    }

    #[test]
    fn shuffled_pair_uses_outer_product() {
        let mut t = two_sources();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.register_draw(BallId(1), SourceId(1)).unwrap();
        t.on_shuffle(BallId(0), BallId(1)).unwrap();
        t.on_observation(BallId(0), RED, 1).unwrap();
        t.on_observation(BallId(1), BLUE, 2).unwrap();

        let space = t.space().clone();
        let expected: Vec<f64> = (0..4)
            .map(|w| {
                let w = WorldId(w);
                let pa = space.distribution(w, SourceId(0));
                let pb = space.distribution(w, SourceId(1));
                0.25 * 0.5
                    * (pa.probability(RED) * pb.probability(BLUE)
                        + pb.probability(RED) * pa.probability(BLUE))
            })
            .collect();
        let total: f64 = expected.iter().sum();
        for (got, want) in t.world_posterior().iter().zip(&expected) {
            assert!(close(*got, want / total));
        }
    }

    #[test]
    fn shuffle_argument_order_is_irrelevant() {
        let mut x = two_sources();
        let mut y = two_sources();
        for t in [&mut x, &mut y] {
            t.register_draw(BallId(0), SourceId(0)).unwrap();
            t.register_draw(BallId(1), SourceId(1)).unwrap();
            t.register_draw(BallId(2), SourceId(1)).unwrap();
            t.on_observation(BallId(2), RED, 0).unwrap();
        }
        x.on_shuffle(BallId(0), BallId(1)).unwrap();
        y.on_shuffle(BallId(1), BallId(0)).unwrap();
        let gx = x.group_posterior(x.group_of(BallId(0)).unwrap()).unwrap();
        let gy = y.group_posterior(y.group_of(BallId(0)).unwrap()).unwrap();
        assert_eq!(gx, gy);
    }

    #[test]
    fn duplicate_copy_observation_matches_original() {
        let mut via_copy = one_source();
        via_copy.register_draw(BallId(0), SourceId(0)).unwrap();
        via_copy.on_duplicated(BallId(0), BallId(1)).unwrap();
        via_copy.on_observation(BallId(1), BLUE, 3).unwrap();

        let mut direct = one_source();
        direct.register_draw(BallId(0), SourceId(0)).unwrap();
        direct.on_observation(BallId(0), BLUE, 3).unwrap();

        assert_eq!(via_copy.world_posterior(), direct.world_posterior());
        // The original is now known too.
        assert_eq!(
            via_copy.ball_belief(BallId(0)).unwrap(),
            BallBelief::Revealed { color: BLUE }
        );
    }

    #[test]
    fn observing_both_copies_counts_once() {
        let mut t = one_source();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.on_duplicated(BallId(0), BallId(1)).unwrap();
        t.on_observation(BallId(0), RED, 1).unwrap();
        t.on_observation(BallId(1), RED, 2).unwrap();
        assert!(close(t.world_probability(WorldId(0)), 0.9));
    }

    #[test]
    fn collected_ball_rejects_everything() {
        let mut t = one_source();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.register_draw(BallId(1), SourceId(0)).unwrap();
        t.on_collected(BallId(0)).unwrap();
        let gone = BallId(0);
        assert_eq!(t.on_collected(gone), Err(TrackerError::Collected(gone)));
        assert_eq!(
            t.on_observation(gone, RED, 0),
            Err(TrackerError::Collected(gone))
        );
        assert_eq!(t.on_shuffle(gone, BallId(1)), Err(TrackerError::Collected(gone)));
        assert!(t.on_duplicated(gone, BallId(9)).is_err());
        assert!(t.ball_belief(gone).is_err());
    }

    #[test]
    fn unknown_ball_rejected() {
        let mut t = one_source();
        assert_eq!(
            t.on_observation(BallId(4), RED, 0),
            Err(TrackerError::UnknownBall(BallId(4)))
        );
    }

    #[test]
    fn double_registration_rejected() {
        let mut t = one_source();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        assert_eq!(
            t.register_draw(BallId(0), SourceId(0)),
            Err(TrackerError::AlreadyRegistered(BallId(0)))
        );
        assert_eq!(
            t.register_draw(BallId(1), SourceId(5)),
            Err(TrackerError::UnknownSource(SourceId(5)))
        );
    }

    #[test]
    fn collecting_unobserved_ball_keeps_posterior() {
        let mut t = two_sources();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.register_draw(BallId(1), SourceId(1)).unwrap();
        t.register_draw(BallId(2), SourceId(1)).unwrap();
        t.on_observation(BallId(2), BLUE, 0).unwrap();
        t.on_shuffle(BallId(0), BallId(1)).unwrap();
        let before = t.world_posterior();
        t.on_collected(BallId(0)).unwrap();
        for (a, b) in before.iter().zip(t.world_posterior()) {
            assert!(close(*a, b));
        }
    }

    #[test]
    fn collecting_whole_group_drops_it_but_keeps_evidence() {
        let mut t = one_source();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.on_observation(BallId(0), RED, 0).unwrap();
        t.on_collected(BallId(0)).unwrap();
        assert_eq!(t.groups().count(), 0);
        assert!(close(t.world_probability(WorldId(0)), 0.9));
    }

    #[test]
    fn impossible_observation_leaves_state_untouched() {
        let mut b = HypothesisSpaceBuilder::new();
        let s = b.add_source("pure");
        b.independent(s, vec![alt("red_only", 1.0, 0.0)]);
        let mut t = ProvenanceTracker::new(b.build().unwrap());
        t.register_draw(BallId(0), s).unwrap();
        assert_eq!(
            t.on_observation(BallId(0), BLUE, 0),
            Err(TrackerError::ImpossibleObservation {
                ball: BallId(0),
                color: BLUE
            })
        );
        assert_eq!(t.world_posterior(), vec![1.0]);
        t.on_observation(BallId(0), RED, 1).unwrap();
    }

    #[test]
    fn group_posterior_sums_to_one() {
        let mut t = two_sources();
        for i in 0..4 {
            t.register_draw(BallId(i), SourceId((i % 2) as u32)).unwrap();
        }
        for i in 1..4 {
            t.on_shuffle(BallId(0), BallId(i)).unwrap();
        }
        t.on_observation(BallId(2), RED, 0).unwrap();
        let g = t.group_posterior(t.group_of(BallId(0)).unwrap()).unwrap();
        assert!(close(g.total(), 1.0));
        assert!(g.entries.iter().all(|e| e.unrevealed.iter().sum::<u32>() == 3));
    }

    #[test]
    fn hidden_belief_tracks_origin() {
        let mut t = two_sources();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.register_draw(BallId(1), SourceId(1)).unwrap();
        match t.ball_belief(BallId(0)).unwrap() {
            BallBelief::Hidden { origin, .. } => assert_eq!(origin, vec![1.0, 0.0]),
            other => panic!("unexpected {other:?}"),
        }
        t.on_shuffle(BallId(0), BallId(1)).unwrap();
        match t.ball_belief(BallId(0)).unwrap() {
            BallBelief::Hidden { origin, color } => {
                assert!(close(origin[0], 0.5));
                assert!(close(color.iter().sum::<f64>(), 1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn marginals_follow_world_posterior() {
        let mut t = two_sources();
        t.register_draw(BallId(0), SourceId(0)).unwrap();
        t.on_observation(BallId(0), RED, 0).unwrap();
        let m = t.source_marginals();
        assert_eq!(m.len(), 2);
        let a_red = m[0].alternatives[0].1;
        assert!(close(a_red, 0.8 / 1.1));
        assert!(close(m[1].alternatives[0].1, 0.5));
    }

    #[test]
    fn replay_reproduces_posterior() {
        let mut t = two_sources();
        for i in 0..5 {
            t.register_draw(BallId(i), SourceId((i % 2) as u32)).unwrap();
        }
        t.on_shuffle(BallId(0), BallId(1)).unwrap();
        t.on_shuffle(BallId(2), BallId(1)).unwrap();
        t.on_duplicated(BallId(3), BallId(5)).unwrap();
        t.on_observation(BallId(1), BLUE, 1).unwrap();
        t.on_collected(BallId(0)).unwrap();
        t.on_observation(BallId(5), RED, 2).unwrap();
        assert!(t.replay_divergence().unwrap() < 1e-12);
    }
}
