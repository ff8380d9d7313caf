//! Joint weight tables over (world, unrevealed-source multiset).
//!
//! A table maps a count vector `K` (how many of the group's unrevealed
//! draws come from each source) to an unnormalized weight per world. All
//! keys of one table have the same total `|K|`.

use std::collections::BTreeMap;

use crate::id::{DrawId, SourceId, WorldId};

/// Count of unrevealed draws per source, indexed by [`SourceId`].
pub type SlotCounts = Vec<u32>;

#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    /// Smallest draw folded into this table. Fixes the fusion order.
    origin: DrawId,
    worlds: usize,
    entries: BTreeMap<SlotCounts, Vec<f64>>,
}

impl WeightTable {
    /// One unrevealed draw from a known source, weight 1 in every world.
    pub fn singleton(origin: DrawId, source: SourceId, sources: usize, worlds: usize) -> Self {
        let mut key = vec![0; sources];
        key[source.0 as usize] = 1;
        let mut entries = BTreeMap::new();
        entries.insert(key, vec![1.0; worlds]);
        Self {
            origin,
            worlds,
            entries,
        }
    }

    pub fn origin(&self) -> DrawId {
        self.origin
    }

    pub fn entries(&self) -> impl Iterator<Item = (&SlotCounts, &Vec<f64>)> {
        self.entries.iter()
    }

    /// Number of unrevealed draws this table describes.
    pub fn unrevealed(&self) -> u32 {
        self.entries
            .keys()
            .next()
            .map(|k| k.iter().sum())
            .unwrap_or(0)
    }

    /// Z(w): total weight per world.
    pub fn world_mass(&self) -> Vec<f64> {
        let mut mass = vec![0.0; self.worlds];
        for weights in self.entries.values() {
            for (m, w) in mass.iter_mut().zip(weights) {
                *m += w;
            }
        }
        mass
    }

    /// Outer product per world, pooling keys by multiset union.
    pub fn product(&self, other: &WeightTable) -> WeightTable {
        let mut entries: BTreeMap<SlotCounts, Vec<f64>> = BTreeMap::new();
        for (ka, va) in &self.entries {
            for (kb, vb) in &other.entries {
                let key: SlotCounts = ka.iter().zip(kb).map(|(a, b)| a + b).collect();
                let slot = entries
                    .entry(key)
                    .or_insert_with(|| vec![0.0; self.worlds]);
                for ((s, a), b) in slot.iter_mut().zip(va).zip(vb) {
                    *s += a * b;
                }
            }
        }
        WeightTable {
            origin: self.origin.min(other.origin),
            worlds: self.worlds,
            entries,
        }
    }

    /// Remove one uniformly chosen unrevealed draw, weighting each candidate
    /// source `s` by `likelihood(w, s)`.
    ///
    /// `f'(w, K - s) += f(w, K) * k_s / |K| * likelihood(w, s)`
    pub fn remove_one<F>(&self, likelihood: F) -> WeightTable
    where
        F: Fn(WorldId, SourceId) -> f64,
    {
        let mut entries: BTreeMap<SlotCounts, Vec<f64>> = BTreeMap::new();
        for (key, weights) in &self.entries {
            let total: u32 = key.iter().sum();
            if total == 0 {
                continue;
            }
            for (s, &ks) in key.iter().enumerate() {
                if ks == 0 {
                    continue;
                }
                let source = SourceId(s as u32);
                let share = ks as f64 / total as f64;
                let mut reduced = key.clone();
                reduced[s] -= 1;
                let slot = entries
                    .entry(reduced)
                    .or_insert_with(|| vec![0.0; self.worlds]);
                for (w, (out, weight)) in slot.iter_mut().zip(weights).enumerate() {
                    *out += weight * share * likelihood(WorldId(w as u32), source);
                }
            }
        }
        entries.retain(|_, weights| weights.iter().any(|&w| w > 0.0));
        WeightTable {
            origin: self.origin,
            worlds: self.worlds,
            entries,
        }
    }

    /// Divide every weight by the largest world mass. Returns false when the
    /// table carries no mass at all.
    pub fn rescale(&mut self) -> bool {
        let max = self.world_mass().into_iter().fold(0.0f64, f64::max);
        if max <= 0.0 {
            return false;
        }
        for weights in self.entries.values_mut() {
            for w in weights.iter_mut() {
                *w /= max;
            }
        }
        true
    }

    /// ln Z(w), `-inf` where the world is ruled out.
    pub fn log_mass(&self) -> Vec<f64> {
        self.world_mass()
            .into_iter()
            .map(|m| if m > 0.0 { m.ln() } else { f64::NEG_INFINITY })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: SourceId = SourceId(0);
    const B: SourceId = SourceId(1);

    fn single(draw: u32, source: SourceId) -> WeightTable {
        WeightTable::singleton(DrawId(draw), source, 2, 2)
    }

    #[test]
    fn singleton_has_one_unrevealed() {
        let t = single(0, A);
        assert_eq!(t.unrevealed(), 1);
        assert_eq!(t.world_mass(), vec![1.0, 1.0]);
    }

    #[test]
    fn product_pools_by_multiset() {
        let t = single(0, A).product(&single(1, B)).product(&single(2, A));
        assert_eq!(t.unrevealed(), 3);
        let keys: Vec<_> = t.entries().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![vec![2, 1]]);
        assert_eq!(t.origin(), DrawId(0));
    }

    #[test]
    fn product_commutes() {
        let x = single(0, A).remove_one(|w, _| if w.0 == 0 { 0.5 } else { 0.25 });
        let y = single(1, B);
        let xy = x.product(&y);
        let yx = y.product(&x);
        assert_eq!(xy.entries, yx.entries);
        assert_eq!(xy.origin(), yx.origin());
    }

    #[test]
    fn remove_one_splits_by_share() {
        let t = single(0, A).product(&single(1, B));
        let revealed = t.remove_one(|_, s| if s == A { 0.9 } else { 0.1 });
        assert_eq!(revealed.unrevealed(), 1);
        // K={A,B}: removing A (the A draw was seen) leaves {B}.
        let left_b = revealed.entries.get(&vec![0, 1]).unwrap();
        let left_a = revealed.entries.get(&vec![1, 0]).unwrap();
        assert!((left_b[0] - 0.45).abs() < 1e-12);
        assert!((left_a[0] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn marginalizing_preserves_mass() {
        let t = single(0, A).product(&single(1, B)).product(&single(2, B));
        let m = t.remove_one(|_, _| 1.0);
        assert_eq!(m.world_mass(), t.world_mass());
    }

    #[test]
    fn zero_rows_are_pruned() {
        let t = single(0, A).product(&single(1, B));
        let only_a = t.remove_one(|_, s| if s == A { 1.0 } else { 0.0 });
        assert_eq!(only_a.entries.len(), 1);
    }

    #[test]
    fn rescale_and_log_mass() {
        let mut t = single(0, A).remove_one(|w, _| if w.0 == 0 { 0.2 } else { 0.0 });
        assert!(t.rescale());
        assert_eq!(t.world_mass(), vec![1.0, 0.0]);
        let lm = t.log_mass();
        assert_eq!(lm[0], 0.0);
        assert_eq!(lm[1], f64::NEG_INFINITY);
    }

    #[test]
    fn rescale_of_dead_table_fails() {
        let mut t = single(0, A).remove_one(|_, _| 0.0);
        assert!(!t.rescale());
    }
}
