//! Geometry shared across matcher modules
//!
//! All "same level" and "flat" decisions are made against [`MatchContext::tolerance`], i.e.
//! `proximity_factor` times the mean volatility over the window under test.

use crate::{
    extrema::{Extremum, ExtremumKind},
    trendline::{fit_extrema, Trendline},
    KeyLevels, MatchContext, Signal,
};

// ============================================================
// THRESHOLDS
// ============================================================

/// Touches may sit this many tolerances away from their fitted boundary
pub const TOUCH_TOLERANCE_FACTOR: f64 = 2.0;
/// Bars inspected before a neutral formation to pick its projection direction
pub const PRIOR_MOVE_BARS: usize = 10;
/// Extrema counts tried by the two-boundary matchers
pub const BOUNDARY_WINDOWS: [usize; 2] = [5, 6];
/// Relative slack absorbing float noise on exact fits
const RESIDUAL_EPS: f64 = 1e-9;

// ============================================================
// POLARITY
// ============================================================

/// Orientation of a reversal formation: tops break down, bottoms break up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Top,
    Bottom,
}

impl Polarity {
    pub const BOTH: [Polarity; 2] = [Polarity::Top, Polarity::Bottom];

    /// Kind of extremum forming the formation's outer points
    #[inline]
    pub fn extreme_kind(self) -> ExtremumKind {
        match self {
            Polarity::Top => ExtremumKind::Peak,
            Polarity::Bottom => ExtremumKind::Trough,
        }
    }

    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Top => 1.0,
            Polarity::Bottom => -1.0,
        }
    }

    /// `a` lies further out than `b` (higher for tops, lower for bottoms)
    #[inline]
    pub fn beyond(self, a: f64, b: f64) -> bool {
        self.sign() * (a - b) > 0.0
    }

    /// `close` has crossed `level` in the breakout direction
    #[inline]
    pub fn breaks(self, close: f64, level: f64) -> bool {
        self.sign() * (level - close) > 0.0
    }

    /// Measured-move target from `level`
    #[inline]
    pub fn project(self, level: f64, height: f64) -> f64 {
        level - self.sign() * height
    }

    #[inline]
    pub fn signal(self) -> Signal {
        match self {
            Polarity::Top => Signal::Bearish,
            Polarity::Bottom => Signal::Bullish,
        }
    }

    /// Outermost of `prices` in this polarity's direction
    pub fn outermost(self, prices: impl IntoIterator<Item = f64>) -> f64 {
        match self {
            Polarity::Top => prices.into_iter().fold(f64::NEG_INFINITY, f64::max),
            Polarity::Bottom => prices.into_iter().fold(f64::INFINITY, f64::min),
        }
    }
}

// ============================================================
// WINDOWS & BREAKOUTS
// ============================================================

/// Consecutive extrema windows of `size` starting with `first`
pub fn windows_from(
    extrema: &[Extremum],
    size: usize,
    first: ExtremumKind,
) -> impl Iterator<Item = &[Extremum]> {
    extrema
        .windows(size.max(1))
        .filter(move |w| w[0].kind == first)
}

/// All windows of 5 and 6 consecutive extrema, any starting kind
pub fn boundary_windows(extrema: &[Extremum]) -> impl Iterator<Item = &[Extremum]> {
    BOUNDARY_WINDOWS
        .into_iter()
        .flat_map(move |size| extrema.windows(size))
}

/// First bar after `after` (within `horizon` bars) for which `broken` holds
pub fn find_breakout(
    closes: &[f64],
    after: usize,
    horizon: usize,
    mut broken: impl FnMut(usize, f64) -> bool,
) -> Option<usize> {
    let last = after.saturating_add(horizon).min(closes.len().checked_sub(1)?);
    (after + 1..=last).find(|&i| broken(i, closes[i]))
}

/// Direction of the move leading into `start`, used to orient neutral formations
pub fn prior_signal(closes: &[f64], start: usize) -> Signal {
    let from = start.saturating_sub(PRIOR_MOVE_BARS);
    match (closes.get(from), closes.get(start)) {
        (Some(a), Some(b)) if b < a => Signal::Bearish,
        _ => Signal::Bullish,
    }
}

// ============================================================
// SYMMETRY MEASURES
// ============================================================

/// 1.0 when both legs take the same number of bars
pub fn time_symmetry(left: usize, right: usize) -> f64 {
    let total = left + right;
    if total == 0 {
        return 1.0;
    }
    1.0 - left.abs_diff(right) as f64 / total as f64
}

/// 1.0 when `a == b`, falling linearly to 0.0 at a difference of `scale`
pub fn level_symmetry(a: f64, b: f64, scale: f64) -> f64 {
    if scale <= 0.0 || !scale.is_finite() {
        return if a == b { 1.0 } else { 0.0 };
    }
    (1.0 - (a - b).abs() / scale).clamp(0.0, 1.0)
}

/// 1.0 for evenly spaced extrema, lower as the gaps vary
pub fn spacing_regularity(window: &[Extremum]) -> f64 {
    let gaps: Vec<f64> = window
        .windows(2)
        .map(|p| p[1].index.saturating_sub(p[0].index) as f64)
        .collect();
    if gaps.len() < 2 {
        return 1.0;
    }
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let var = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    (1.0 - var.sqrt() / mean).clamp(0.0, 1.0)
}

// ============================================================
// BOUNDARY PAIRS
// ============================================================

/// Upper line through the peaks and lower line through the troughs of a window.
#[derive(Debug, Clone, Copy)]
pub struct Boundaries {
    pub upper: Trendline,
    pub lower: Trendline,
    pub start: usize,
    pub end: usize,
    pub tolerance: f64,
    /// Largest distance of a touch from its boundary
    pub max_residual: f64,
    mean_residual: f64,
}

impl Boundaries {
    /// Needs two peaks and two troughs, every touch near its line, and a positive width
    /// at both ends of the window.
    pub fn fit(ctx: &MatchContext<'_>, window: &[Extremum]) -> Option<Self> {
        let (first, last) = (window.first()?, window.last()?);
        let (start, end) = (first.index, last.index);
        if end <= start {
            return None;
        }

        let peaks: Vec<&Extremum> = window.iter().filter(|e| e.is_peak()).collect();
        let troughs: Vec<&Extremum> = window.iter().filter(|e| e.is_trough()).collect();
        if peaks.len() < 2 || troughs.len() < 2 {
            return None;
        }

        let upper = fit_extrema(peaks.iter().copied());
        let lower = fit_extrema(troughs.iter().copied());

        let residuals: Vec<f64> = peaks
            .iter()
            .map(|e| upper.residual(e.index, e.price).abs())
            .chain(troughs.iter().map(|e| lower.residual(e.index, e.price).abs()))
            .collect();
        let max_residual = residuals.iter().copied().fold(0.0, f64::max);
        let mean_residual = residuals.iter().sum::<f64>() / residuals.len() as f64;

        let tolerance = ctx.tolerance(start, end);
        let slack = RESIDUAL_EPS * first.price.abs().max(1.0);
        if !max_residual.is_finite() || max_residual > TOUCH_TOLERANCE_FACTOR * tolerance + slack {
            return None;
        }

        let b = Self {
            upper,
            lower,
            start,
            end,
            tolerance,
            max_residual,
            mean_residual,
        };
        (b.width_start() > 0.0 && b.width_end() > 0.0).then_some(b)
    }

    #[inline]
    pub fn span(&self) -> f64 {
        (self.end - self.start) as f64
    }

    /// Price change of the upper line across the window
    #[inline]
    pub fn upper_drift(&self) -> f64 {
        self.upper.slope * self.span()
    }

    #[inline]
    pub fn lower_drift(&self) -> f64 {
        self.lower.slope * self.span()
    }

    #[inline]
    pub fn width_at(&self, index: usize) -> f64 {
        self.upper.value_at(index) - self.lower.value_at(index)
    }

    #[inline]
    pub fn width_start(&self) -> f64 {
        self.width_at(self.start)
    }

    #[inline]
    pub fn width_end(&self) -> f64 {
        self.width_at(self.end)
    }

    pub fn mean_width(&self) -> f64 {
        (self.width_start() + self.width_end()) / 2.0
    }

    #[inline]
    pub fn is_flat(&self, drift: f64) -> bool {
        drift.abs() <= self.tolerance
    }

    #[inline]
    pub fn is_rising(&self, drift: f64) -> bool {
        drift > self.tolerance
    }

    #[inline]
    pub fn is_falling(&self, drift: f64) -> bool {
        drift < -self.tolerance
    }

    pub fn converging(&self) -> bool {
        self.width_start() - self.width_end() > self.tolerance
    }

    pub fn diverging(&self) -> bool {
        self.width_end() - self.width_start() > self.tolerance
    }

    pub fn parallel(&self) -> bool {
        (self.upper_drift() - self.lower_drift()).abs() <= self.tolerance
    }

    /// Every touch lies within one tolerance of its line
    pub fn is_tight(&self) -> bool {
        self.max_residual <= self.tolerance.max(RESIDUAL_EPS * self.upper.intercept.abs())
    }

    pub fn r_squared(&self) -> f64 {
        (self.upper.r_squared + self.lower.r_squared) / 2.0
    }

    /// 1.0 when the touches sit exactly on their lines
    pub fn touch_precision(&self) -> f64 {
        let touch = TOUCH_TOLERANCE_FACTOR * self.tolerance;
        if touch <= 0.0 {
            return 1.0;
        }
        (1.0 - self.mean_residual / touch).clamp(0.0, 1.0)
    }

    pub fn trendlines(&self) -> Vec<Trendline> {
        vec![self.upper, self.lower]
    }

    /// Breakout levels for a move in `direction` with a measured move of `height`.
    /// Neutral projects like bullish.
    pub fn project(&self, direction: Signal, height: f64) -> KeyLevels {
        let resistance = self.upper.value_at(self.end);
        let support = self.lower.value_at(self.end);
        let levels = match direction {
            Signal::Bearish => KeyLevels::new(support, support - height, resistance),
            Signal::Bullish | Signal::Neutral => {
                KeyLevels::new(resistance, resistance + height, support)
            }
        };
        levels.with_resistance(resistance).with_support(support)
    }

    /// First close beyond the boundary on the `direction` side after the window
    pub fn breakout(&self, closes: &[f64], direction: Signal) -> Option<usize> {
        let horizon = self.end - self.start;
        match direction {
            Signal::Bearish => find_breakout(closes, self.end, horizon, |i, c| {
                c < self.lower.value_at(i)
            }),
            Signal::Bullish | Signal::Neutral => find_breakout(closes, self.end, horizon, |i, c| {
                c > self.upper.value_at(i)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity_mirrors() {
        assert!(Polarity::Top.beyond(11.0, 10.0));
        assert!(Polarity::Bottom.beyond(9.0, 10.0));
        assert!(Polarity::Top.breaks(9.0, 10.0));
        assert!(Polarity::Bottom.breaks(11.0, 10.0));
        assert_eq!(Polarity::Top.project(100.0, 10.0), 90.0);
        assert_eq!(Polarity::Bottom.project(100.0, 10.0), 110.0);
        assert_eq!(Polarity::Top.outermost([1.0, 3.0, 2.0]), 3.0);
        assert_eq!(Polarity::Bottom.outermost([1.0, 3.0, 2.0]), 1.0);
    }

    #[test]
    fn test_find_breakout_respects_horizon() {
        let closes = [10.0, 10.0, 10.0, 9.0, 8.0];
        assert_eq!(find_breakout(&closes, 1, 3, |_, c| c < 9.5), Some(3));
        assert_eq!(find_breakout(&closes, 1, 1, |_, c| c < 9.5), None);
        assert_eq!(find_breakout(&closes, 4, 10, |_, _| true), None);
        assert_eq!(find_breakout(&[], 0, 10, |_, _| true), None);
    }

    #[test]
    fn test_symmetry_measures() {
        assert_eq!(time_symmetry(10, 10), 1.0);
        assert_eq!(time_symmetry(0, 10), 0.0);
        assert_eq!(level_symmetry(5.0, 5.0, 2.0), 1.0);
        assert_eq!(level_symmetry(5.0, 6.0, 2.0), 0.5);

        let even = [
            Extremum::new(0, 1.0, ExtremumKind::Peak),
            Extremum::new(10, 0.0, ExtremumKind::Trough),
            Extremum::new(20, 1.0, ExtremumKind::Peak),
        ];
        assert_eq!(spacing_regularity(&even), 1.0);
    }

    #[test]
    fn test_prior_signal() {
        let up: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let down: Vec<f64> = (0..30).map(|i| -(i as f64)).collect();
        assert_eq!(prior_signal(&up, 20), Signal::Bullish);
        assert_eq!(prior_signal(&down, 20), Signal::Bearish);
        assert_eq!(prior_signal(&down, 0), Signal::Bullish);
    }
}
