//! Property-based tests for the Sackworks core.
//!
//! Uses proptest to generate random paths, tracker event sequences and
//! level seeds, then verify structural and probabilistic invariants hold.

use glam::Vec2;
use proptest::prelude::*;
use sackworks_core::engine::Simulation;
use sackworks_core::fixed::Fixed64;
use sackworks_core::hypothesis::HypothesisSpace;
use sackworks_core::id::{BallId, ColorId, SourceId, WorldId};
use sackworks_core::tracker::ProvenanceTracker;
use sackworks_core::trajectory::{Easing, Trajectory};
use sackworks_core::test_utils::*;
use sackworks_core::validation::check_invariants;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_point() -> impl Strategy<Value = Vec2> {
    (-20.0f32..20.0, -20.0f32..20.0).prop_map(|(x, y)| Vec2::new(x, y))
}

fn arb_easing() -> impl Strategy<Value = Easing> {
    prop_oneof![
        Just(Easing::Linear),
        Just(Easing::EaseIn),
        Just(Easing::EaseOut),
        Just(Easing::EaseInOut),
    ]
}

/// Tracker operations over a fixed pool of balls. Indices are taken modulo
/// the pool size.
#[derive(Debug, Clone)]
enum Op {
    Shuffle(usize, usize),
    Observe(usize, bool),
    Collect(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..16usize, 0..16usize).prop_map(|(a, b)| Op::Shuffle(a, b)),
        3 => (0..16usize, any::<bool>()).prop_map(|(a, red)| Op::Observe(a, red)),
        1 => (0..16usize).prop_map(Op::Collect),
    ]
}

const SOURCES: usize = 3;

/// Register `balls` draws round robin over the sources.
fn tracker_with(balls: usize) -> ProvenanceTracker {
    let (space, sources) = two_alt_space(SOURCES);
    let mut tracker = ProvenanceTracker::new(space);
    for i in 0..balls {
        tracker
            .register_draw(BallId(i as u64), sources[i % SOURCES])
            .unwrap();
    }
    tracker
}

/// Apply an op, skipping ones that name collected balls or contradict an
/// earlier reveal.
fn apply(tracker: &mut ProvenanceTracker, op: &Op, balls: usize, tick: u64) {
    match *op {
        Op::Shuffle(a, b) => {
            let (a, b) = (BallId((a % balls) as u64), BallId((b % balls) as u64));
            if tracker.is_tracked(a) && tracker.is_tracked(b) {
                tracker.on_shuffle(a, b).unwrap();
            }
        }
        Op::Observe(a, red) => {
            let a = BallId((a % balls) as u64);
            let color = if red { RED } else { BLUE };
            if tracker.is_tracked(a) {
                // A conflicting re-observation is rejected without changing
                // anything; every other observation must succeed.
                let _ = tracker.on_observation(a, color, tick);
            }
        }
        Op::Collect(a) => {
            let a = BallId((a % balls) as u64);
            if tracker.is_tracked(a) {
                tracker.on_collected(a).unwrap();
            }
        }
    }
}

fn assert_consistent(tracker: &ProvenanceTracker) {
    let worlds: f64 = tracker.world_posterior().iter().sum();
    assert!((worlds - 1.0).abs() < 1e-9, "worlds sum to {worlds}");
    for group in tracker.groups() {
        let total = tracker.group_posterior(group).unwrap().total();
        assert!((total - 1.0).abs() < 1e-9, "group {group:?} sums to {total}");
    }
}

/// Every ordering of `0..n`.
fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for rest in permutations(n - 1) {
        for slot in 0..n {
            let mut p = rest.clone();
            p.insert(slot, n - 1);
            out.push(p);
        }
    }
    out
}

/// World posterior after `draws` are put through one uniformly random
/// permutation and position `i` then shows `colors[i]`, by direct
/// enumeration of all n! orderings.
fn n_way_posterior(space: &HypothesisSpace, draws: &[SourceId], colors: &[ColorId]) -> Vec<f64> {
    let orderings = permutations(draws.len());
    let mut weights: Vec<f64> = (0..space.world_count())
        .map(|w| {
            let world = WorldId(w as u32);
            let likelihood: f64 = orderings
                .iter()
                .map(|p| {
                    p.iter()
                        .zip(colors)
                        .map(|(&d, &c)| space.likelihood(world, draws[d], c))
                        .product::<f64>()
                })
                .sum::<f64>()
                / orderings.len() as f64;
            space.world(world).prior * likelihood
        })
        .collect();
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }
    weights
}

/// Source assignment, colors and merge order for `n` balls.
fn arb_n_way() -> impl Strategy<Value = (Vec<usize>, Vec<bool>, Vec<usize>)> {
    (2usize..=4).prop_flat_map(|n| {
        (
            proptest::collection::vec(0..SOURCES, n),
            proptest::collection::vec(any::<bool>(), n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn trajectory_ends_on_last_waypoint(
        points in proptest::collection::vec(arb_point(), 2..8),
        speed in 0.05f64..4.0,
        easing in arb_easing(),
        start in 0u64..100_000,
    ) {
        let t = Trajectory::new(points.clone(), Fixed64::from_num(speed), easing, start).unwrap();
        prop_assert!(t.duration() > 0);
        prop_assert_eq!(t.point_at(1.0), *points.last().unwrap());
        prop_assert_eq!(t.position_at(t.end()), *points.last().unwrap());
        prop_assert_eq!(t.position_at(start), points[0]);
    }

    #[test]
    fn trajectory_progress_is_monotone(
        points in proptest::collection::vec(arb_point(), 2..6),
        easing in arb_easing(),
    ) {
        let t = Trajectory::new(points, Fixed64::ONE, easing, 0).unwrap();
        let mut last = 0.0f32;
        for now in (0..=t.end()).step_by(7) {
            let d = t.distance_at(now);
            prop_assert!(d + 1e-4 >= last);
            last = d;
        }
    }

    #[test]
    fn posteriors_stay_normalized(
        balls in 2usize..10,
        ops in proptest::collection::vec(arb_op(), 0..40),
    ) {
        let mut tracker = tracker_with(balls);
        for (tick, op) in ops.iter().enumerate() {
            apply(&mut tracker, op, balls, tick as u64);
            assert_consistent(&tracker);
        }
        prop_assert!(tracker.replay_divergence().unwrap() < 1e-9);
    }

    #[test]
    fn shuffle_is_symmetric(
        balls in 2usize..8,
        ops in proptest::collection::vec(arb_op(), 0..20),
        a in 0usize..8,
        b in 0usize..8,
    ) {
        let mut left = tracker_with(balls);
        for (tick, op) in ops.iter().enumerate() {
            apply(&mut left, op, balls, tick as u64);
        }
        let mut right = left.clone();
        let (a, b) = (BallId((a % balls) as u64), BallId((b % balls) as u64));
        prop_assume!(left.is_tracked(a) && left.is_tracked(b));
        left.on_shuffle(a, b).unwrap();
        right.on_shuffle(b, a).unwrap();
        prop_assert_eq!(left.world_posterior(), right.world_posterior());
        let key = left.group_of(a).unwrap();
        prop_assert_eq!(left.group_posterior(key), right.group_posterior(right.group_of(a).unwrap()));
    }

    #[test]
    fn collected_balls_reject_every_event(
        balls in 2usize..6,
        victim in 0usize..6,
    ) {
        let mut tracker = tracker_with(balls);
        let victim = BallId((victim % balls) as u64);
        let other = BallId(((victim.0 as usize + 1) % balls) as u64);
        tracker.on_collected(victim).unwrap();
        prop_assert!(tracker.on_observation(victim, ColorId(0), 1).is_err());
        prop_assert!(tracker.on_shuffle(victim, other).is_err());
        prop_assert!(tracker.on_shuffle(other, victim).is_err());
        prop_assert!(tracker.on_collected(victim).is_err());
        prop_assert!(tracker.on_duplicated(victim, BallId(99)).is_err());
    }

    #[test]
    fn simulation_invariants_hold(seed in any::<u64>(), count in 1u32..6) {
        let mut level = shuffler_level(count);
        level.seed = seed;
        let mut sim = Simulation::from_level(&level).unwrap();
        for _ in 0..400 {
            sim.step().unwrap();
            check_invariants(&sim).unwrap();
        }
    }

    /// A chain of pairwise merges covering every ball is the same as one
    /// uniform n-way permutation of the whole set.
    #[test]
    fn chained_merges_equal_n_way_shuffle((assign, reds, order) in arb_n_way()) {
        let (space, sources) = two_alt_space(SOURCES);
        let draws: Vec<SourceId> = assign.iter().map(|&i| sources[i]).collect();
        let colors: Vec<ColorId> = reds.iter().map(|&r| if r { RED } else { BLUE }).collect();

        let mut tracker = ProvenanceTracker::new(space.clone());
        for (i, &source) in draws.iter().enumerate() {
            tracker.register_draw(BallId(i as u64), source).unwrap();
        }
        for pair in order.windows(2) {
            tracker
                .on_shuffle(BallId(pair[0] as u64), BallId(pair[1] as u64))
                .unwrap();
        }
        for (i, &color) in colors.iter().enumerate() {
            tracker.on_observation(BallId(i as u64), color, i as u64).unwrap();
        }

        let expected = n_way_posterior(&space, &draws, &colors);
        for (live, exact) in tracker.world_posterior().iter().zip(&expected) {
            prop_assert!((live - exact).abs() < 1e-12, "{live} vs {exact}");
        }
    }
}
