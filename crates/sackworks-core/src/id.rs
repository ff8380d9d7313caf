use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a placed component instance on the factory floor.
    pub struct ComponentId;
}

/// Identifies a ball. Allocated from a monotonically increasing counter, so
/// ordering by id is ordering by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BallId(pub u64);

/// Identifies a color in the registry palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColorId(pub u32);

/// Index of a sack in the hypothesis space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u32);

/// Index of an enumerated joint hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldId(pub u32);

/// Tracker-side provenance tag: one physical production event. Duplicated
/// balls share their parent's draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DrawId(pub u32);

impl std::fmt::Display for BallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ball#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ball_ids_order_by_creation() {
        let mut ids = vec![BallId(3), BallId(1), BallId(2)];
        ids.sort();
        assert_eq!(ids, vec![BallId(1), BallId(2), BallId(3)]);
    }

    #[test]
    fn ball_id_display() {
        assert_eq!(BallId(7).to_string(), "ball#7");
    }
}
