//! Node scoring
//!
//! A scorer ranks discovery respondents; the highest score wins. A best score
//! of zero or below only schedules when the plan allows over-provisioning.

use types::NodeAnnouncement;

pub trait NodeScorer: Send + Sync + 'static {
    fn score(&self, node: &NodeAnnouncement) -> i64;
}

/// Default scorer: remaining capacity
#[derive(Debug, Clone, Copy, Default)]
pub struct AvailableCapacity;

impl NodeScorer for AvailableCapacity {
    fn score(&self, node: &NodeAnnouncement) -> i64 {
        node.available_capacity
    }
}

/// Highest-scoring node, ties resolved in favour of the earliest respondent
pub fn select_best<'a>(
    candidates: &'a [NodeAnnouncement],
    scorer: &dyn NodeScorer,
) -> Option<(&'a NodeAnnouncement, i64)> {
    let mut best: Option<(&NodeAnnouncement, i64)> = None;
    for candidate in candidates {
        let score = scorer.score(candidate);
        match best {
            Some((_, top)) if top >= score => {}
            _ => best = Some((candidate, score)),
        }
    }
    best
}
