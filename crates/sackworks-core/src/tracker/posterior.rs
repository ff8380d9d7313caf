//! Read-side views of the tracker state.

use crate::id::{ColorId, SourceId, WorldId};

use super::table::SlotCounts;

/// Marginal posterior over one source's alternative labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePosterior {
    pub source: SourceId,
    pub name: String,
    pub alternatives: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    pub world: WorldId,
    pub unrevealed: SlotCounts,
    pub probability: f64,
}

/// Joint posterior over (world, unrevealed multiset) for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPosterior {
    pub entries: Vec<GroupEntry>,
}

impl GroupPosterior {
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.probability).sum()
    }
}

/// What is known about one ball.
#[derive(Debug, Clone, PartialEq)]
pub enum BallBelief {
    Revealed {
        color: ColorId,
    },
    /// Predictive color distribution (indexed by [`ColorId`]) and origin
    /// distribution (indexed by [`SourceId`]).
    Hidden {
        color: Vec<f64>,
        origin: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorSnapshot {
    pub worlds: Vec<f64>,
    pub sources: Vec<SourcePosterior>,
}

/// A snapshot rounded to whole buckets, e.g. percentages for a betting UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketedSnapshot {
    pub granularity: u32,
    pub worlds: Vec<u32>,
    pub sources: Vec<Vec<u32>>,
}

impl PosteriorSnapshot {
    pub fn bucketed(&self, granularity: u32) -> BucketedSnapshot {
        BucketedSnapshot {
            granularity,
            worlds: bucketize(&self.worlds, granularity),
            sources: self
                .sources
                .iter()
                .map(|s| {
                    let probs: Vec<f64> = s.alternatives.iter().map(|(_, p)| *p).collect();
                    bucketize(&probs, granularity)
                })
                .collect(),
        }
    }

    /// Index of the most probable world.
    pub fn map_world(&self) -> Option<WorldId> {
        self.worlds
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| WorldId(i as u32))
    }
}

/// Round probabilities to integer buckets summing to `granularity`, using
/// largest remainders. Ties go to the lower index.
pub fn bucketize(probabilities: &[f64], granularity: u32) -> Vec<u32> {
    let total: f64 = probabilities.iter().sum();
    if probabilities.is_empty() || total <= 0.0 || granularity == 0 {
        return vec![0; probabilities.len()];
    }
    let scaled: Vec<f64> = probabilities
        .iter()
        .map(|p| p / total * granularity as f64)
        .collect();
    let mut buckets: Vec<u32> = scaled.iter().map(|s| s.floor() as u32).collect();
    let assigned: u32 = buckets.iter().sum();
    let mut order: Vec<usize> = (0..scaled.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = scaled[a] - scaled[a].floor();
        let rb = scaled[b] - scaled[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for &i in order.iter().take(granularity.saturating_sub(assigned) as usize) {
        buckets[i] += 1;
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_sum_to_granularity() {
        let b = bucketize(&[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0], 100);
        assert_eq!(b.iter().sum::<u32>(), 100);
        assert_eq!(b, vec![34, 33, 33]);
    }

    #[test]
    fn coarse_buckets() {
        assert_eq!(bucketize(&[0.9, 0.1], 20), vec![18, 2]);
        assert_eq!(bucketize(&[0.52, 0.48], 4), vec![2, 2]);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(bucketize(&[], 10), Vec::<u32>::new());
        assert_eq!(bucketize(&[0.0, 0.0], 10), vec![0, 0]);
        assert_eq!(bucketize(&[0.5, 0.5], 0), vec![0, 0]);
    }

    #[test]
    fn snapshot_bucketing_and_map() {
        let snap = PosteriorSnapshot {
            worlds: vec![0.25, 0.75],
            sources: vec![SourcePosterior {
                source: SourceId(0),
                name: "sack".into(),
                alternatives: vec![("a".into(), 0.25), ("b".into(), 0.75)],
            }],
        };
        let b = snap.bucketed(10);
        assert_eq!(b.worlds.iter().sum::<u32>(), 10);
        assert_eq!(b.sources[0].iter().sum::<u32>(), 10);
        assert_eq!(snap.map_world(), Some(WorldId(1)));
    }
}
