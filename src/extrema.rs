//! Local peak/trough extraction.
//!
//! A bar is a candidate peak when its close dominates `order` bars on each side. Candidates
//! then have to stand out from their neighbouring opposite-type candidates by more than
//! `prominence_factor` volatility units, and the survivors are forced to alternate.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{PatternError, Result};

/// Peak or trough
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremumKind {
    Peak,
    Trough,
}

impl ExtremumKind {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            ExtremumKind::Peak => ExtremumKind::Trough,
            ExtremumKind::Trough => ExtremumKind::Peak,
        }
    }
}

/// A local extreme of the close series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    pub index: usize,
    pub price: f64,
    pub kind: ExtremumKind,
}

impl Extremum {
    pub fn new(index: usize, price: f64, kind: ExtremumKind) -> Self {
        Self { index, price, kind }
    }

    #[inline]
    pub fn is_peak(&self) -> bool {
        self.kind == ExtremumKind::Peak
    }

    #[inline]
    pub fn is_trough(&self) -> bool {
        self.kind == ExtremumKind::Trough
    }

    /// True when `self` lies further out than `other` in `self`'s own direction.
    #[inline]
    pub fn more_extreme_than(&self, other: &Extremum) -> bool {
        match self.kind {
            ExtremumKind::Peak => self.price > other.price,
            ExtremumKind::Trough => self.price < other.price,
        }
    }

    #[inline]
    pub fn point(&self) -> (usize, f64) {
        (self.index, self.price)
    }
}

/// Extracts prominence-filtered, alternating extrema from a close series.
#[derive(Debug, Clone, Copy)]
pub struct ExtremaExtractor {
    order: usize,
    prominence_factor: f64,
}

impl ExtremaExtractor {
    pub fn new(order: usize, prominence_factor: f64) -> Result<Self> {
        if order == 0 {
            return Err(PatternError::OutOfRange {
                field: "peak_order",
                value: 0.0,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        if !prominence_factor.is_finite() || prominence_factor <= 0.0 {
            return Err(PatternError::OutOfRange {
                field: "prominence_factor",
                value: prominence_factor,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        Ok(Self {
            order,
            prominence_factor,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// `volatility` is indexed like `closes`; missing entries count as zero volatility.
    pub fn extract(&self, closes: &[f64], volatility: &[f64]) -> Vec<Extremum> {
        let candidates = local_candidates(closes, self.order);

        let survivors: Vec<Extremum> = candidates
            .iter()
            .enumerate()
            .filter(|(pos, e)| {
                let threshold =
                    self.prominence_factor * volatility.get(e.index).copied().unwrap_or(0.0);
                let prominence = prominence(&candidates, *pos, closes);
                let keep = prominence > threshold;
                if !keep {
                    trace!(index = e.index, prominence, threshold, "extremum below prominence");
                }
                keep
            })
            .map(|(_, e)| *e)
            .collect();

        enforce_alternation(survivors)
    }
}

/// Bars whose close dominates the symmetric window of `order` bars. Flat windows yield nothing.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
fn local_candidates(closes: &[f64], order: usize) -> Vec<Extremum> {
    let n = closes.len();
    if order == 0 || n < 2 * order + 1 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for i in order..n - order {
        let c = closes[i];
        if !c.is_finite() {
            continue;
        }
        let window = &closes[i - order..=i + order];
        let (mut ge_all, mut le_all, mut gt_any, mut lt_any) = (true, true, false, false);
        for &x in window {
            // NaN neighbours fail both comparisons and disqualify the bar
            if !(c >= x) {
                ge_all = false;
            }
            if !(c <= x) {
                le_all = false;
            }
            if c > x {
                gt_any = true;
            }
            if c < x {
                lt_any = true;
            }
        }
        if ge_all && gt_any {
            out.push(Extremum::new(i, c, ExtremumKind::Peak));
        } else if le_all && lt_any {
            out.push(Extremum::new(i, c, ExtremumKind::Trough));
        }
    }
    out
}

/// Height of a candidate beyond the nearer-level of its two opposite-type neighbours.
///
/// A side without an opposite candidate falls back to the most extreme close between the
/// candidate and that edge of the series.
fn prominence(candidates: &[Extremum], pos: usize, closes: &[f64]) -> f64 {
    let e = candidates[pos];
    let opposite = e.kind.opposite();

    let left = candidates[..pos]
        .iter()
        .rev()
        .find(|c| c.kind == opposite)
        .map(|c| c.price)
        .unwrap_or_else(|| edge_extreme(&closes[..e.index], opposite));
    let right = candidates[pos + 1..]
        .iter()
        .find(|c| c.kind == opposite)
        .map(|c| c.price)
        .unwrap_or_else(|| edge_extreme(&closes[e.index + 1..], opposite));

    let value = match e.kind {
        ExtremumKind::Peak => e.price - left.max(right),
        ExtremumKind::Trough => left.min(right) - e.price,
    };
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Lowest (for troughs) or highest (for peaks) finite close of a slice.
fn edge_extreme(slice: &[f64], kind: ExtremumKind) -> f64 {
    let finite = slice.iter().copied().filter(|x| x.is_finite());
    match kind {
        ExtremumKind::Trough => finite.fold(f64::INFINITY, f64::min),
        ExtremumKind::Peak => finite.fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Collapse runs of same-kind extrema to their most extreme member (earliest on ties).
pub fn enforce_alternation(points: Vec<Extremum>) -> Vec<Extremum> {
    let mut out: Vec<Extremum> = Vec::with_capacity(points.len());
    for p in points {
        match out.last_mut() {
            Some(last) if last.kind == p.kind => {
                if p.more_extreme_than(last) {
                    *last = p;
                }
            }
            _ => out.push(p),
        }
    }
    out
}
