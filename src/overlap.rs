//! Overlap suppression between scored formations.

use std::cmp::Ordering;

use tracing::trace;

use crate::ScoredPattern;

/// Intersection over union of two inclusive index ranges
pub fn index_iou(a: (usize, usize), b: (usize, usize)) -> f64 {
    let (a0, a1) = (a.0.min(a.1), a.0.max(a.1));
    let (b0, b1) = (b.0.min(b.1), b.0.max(b.1));
    let lo = a0.max(b0);
    let hi = a1.min(b1);
    if hi < lo {
        return 0.0;
    }
    let intersection = (hi - lo + 1) as f64;
    let union = ((a1 - a0 + 1) + (b1 - b0 + 1)) as f64 - intersection;
    intersection / union
}

fn span(p: &ScoredPattern) -> (usize, usize) {
    (p.start_index(), p.end_index())
}

/// Ranking used to pick winners: confidence desc, then start, label and end ascending
fn rank(a: &ScoredPattern, b: &ScoredPattern) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.start_index().cmp(&b.start_index()))
        .then_with(|| a.label().cmp(b.label()))
        .then_with(|| a.end_index().cmp(&b.end_index()))
}

/// Keeps the best formation of every overlapping cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapResolver {
    threshold: f64,
}

impl OverlapResolver {
    /// `threshold` is the largest IoU allowed between two kept formations
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Greedy selection by rank; output sorted by (start, end, label)
    pub fn resolve(&self, mut patterns: Vec<ScoredPattern>) -> Vec<ScoredPattern> {
        patterns.sort_by(rank);

        let mut kept: Vec<ScoredPattern> = Vec::with_capacity(patterns.len());
        for p in patterns {
            let clashes = kept
                .iter()
                .any(|k| index_iou(span(k), span(&p)) > self.threshold);
            if clashes {
                trace!(label = p.label(), start = p.start_index(), "suppressed by overlap");
            } else {
                kept.push(p);
            }
        }

        kept.sort_by(|a, b| {
            a.start_index()
                .cmp(&b.start_index())
                .then_with(|| a.end_index().cmp(&b.end_index()))
                .then_with(|| a.label().cmp(b.label()))
        });
        kept
    }
}
