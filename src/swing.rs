//! Percentage zigzag over extracted extrema.

use crate::{
    extrema::{Extremum, ExtremumKind},
    PatternError, Result,
};

/// Keeps only swings that move at least `deviation` (fraction of price) from the last
/// committed swing point.
#[derive(Debug, Clone, Copy)]
pub struct SwingFilter {
    deviation: f64,
}

impl SwingFilter {
    pub fn new(deviation: f64) -> Result<Self> {
        if !deviation.is_finite() || deviation <= 0.0 || deviation > 1.0 {
            return Err(PatternError::OutOfRange {
                field: "swing_deviation",
                value: deviation,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self { deviation })
    }

    pub fn deviation(&self) -> f64 {
        self.deviation
    }

    /// Output is a subset of `extrema`, strictly alternating.
    pub fn filter(&self, extrema: &[Extremum]) -> Vec<Extremum> {
        let mut iter = extrema.iter().copied();
        let Some(mut pending) = iter.next() else {
            return Vec::new();
        };
        let mut committed: Vec<Extremum> = Vec::new();

        for e in iter {
            if e.kind == pending.kind {
                if e.more_extreme_than(&pending) {
                    pending = e;
                }
            } else if self.reverses(&pending, &e) {
                committed.push(pending);
                pending = e;
            }
        }

        match committed.last() {
            Some(last) if !self.reverses(last, &pending) => {}
            _ => committed.push(pending),
        }
        committed
    }

    /// `to` moved away from `from` in `to`'s direction by at least the deviation.
    fn reverses(&self, from: &Extremum, to: &Extremum) -> bool {
        let required = self.deviation * from.price.abs();
        match to.kind {
            ExtremumKind::Peak => to.price - from.price >= required,
            ExtremumKind::Trough => from.price - to.price >= required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(index: usize, price: f64) -> Extremum {
        Extremum::new(index, price, ExtremumKind::Peak)
    }

    fn trough(index: usize, price: f64) -> Extremum {
        Extremum::new(index, price, ExtremumKind::Trough)
    }

    #[test]
    fn test_minor_swings_removed() {
        let input = vec![
            peak(10, 100.0),
            trough(15, 99.0), // 1% pullback, ignored
            peak(20, 104.0),  // extends the pending peak
            trough(30, 95.0),
            peak(40, 96.0), // 1% bounce, ignored
            trough(50, 90.0),
            peak(60, 99.0),
        ];
        let out = SwingFilter::new(0.03).unwrap().filter(&input);
        let idx: Vec<usize> = out.iter().map(|e| e.index).collect();
        assert_eq!(idx, vec![20, 50, 60]);
    }

    #[test]
    fn test_trailing_pending_needs_deviation() {
        let input = vec![peak(10, 100.0), trough(20, 90.0), peak(30, 91.0)];
        let out = SwingFilter::new(0.05).unwrap().filter(&input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].index, 20);
    }

    #[test]
    fn test_empty_input() {
        assert!(SwingFilter::new(0.03).unwrap().filter(&[]).is_empty());
    }

    #[test]
    fn test_invalid_deviation() {
        assert!(SwingFilter::new(0.0).is_err());
        assert!(SwingFilter::new(1.5).is_err());
        assert!(SwingFilter::new(f64::NAN).is_err());
        assert_eq!(SwingFilter::new(1.0).unwrap().deviation(), 1.0);
    }
}
