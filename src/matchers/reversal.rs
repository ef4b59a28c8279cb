//! Reversal formations
//!
//! Head & Shoulders (and inverse), Double Top/Bottom, Triple Top/Bottom, Rounding Top/Bottom.
//! Every matcher runs once per [`Polarity`]: tops break down, bottoms break up.

use std::collections::HashMap;

use tracing::trace;

use super::helpers::{
    find_breakout, level_symmetry, spacing_regularity, time_symmetry, windows_from, Polarity,
};
use crate::{
    config::{check_params, get_ratio, ParamMeta, ParameterizedMatcher},
    extrema::Extremum,
    trendline::{fit_extrema, fit_quadratic},
    KeyLevels, MatchContext, PatternCandidate, PatternMatcher, PatternType, Ratio, Result,
};

impl_with_defaults!(
    HeadAndShouldersMatcher,
    DoubleTopBottomMatcher,
    TripleTopBottomMatcher,
    RoundingMatcher,
);

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

/// Head & Shoulders (P,T,P,T,P) and its inverse (T,P,T,P,T)
#[derive(Debug, Clone)]
pub struct HeadAndShouldersMatcher {
    pub base_confidence: Ratio,
}

impl Default for HeadAndShouldersMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.80),
        }
    }
}

impl PatternMatcher for HeadAndShouldersMatcher {
    fn name(&self) -> &'static str {
        "head_and_shoulders"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[
            PatternType::HeadAndShoulders,
            PatternType::InverseHeadAndShoulders,
        ]
    }

    fn min_extrema(&self) -> usize {
        5
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        let mut out = Vec::new();
        for polarity in Polarity::BOTH {
            for window in windows_from(ctx.extrema, 5, polarity.extreme_kind()) {
                out.extend(self.match_window(ctx, window, polarity));
            }
        }
        out
    }
}

impl HeadAndShouldersMatcher {
    fn match_window(
        &self,
        ctx: &MatchContext<'_>,
        window: &[Extremum],
        p: Polarity,
    ) -> Option<PatternCandidate> {
        let [ls, t1, head, t2, rs] = window else {
            return None;
        };
        let tol = ctx.tolerance(ls.index, rs.index);

        // Head stands out from the more extreme shoulder
        let shoulder = p.outermost([ls.price, rs.price]);
        if p.sign() * (head.price - shoulder) <= tol {
            trace!(head = head.index, "head not beyond shoulders");
            return None;
        }
        if (ls.price - rs.price).abs() > tol {
            trace!(head = head.index, "shoulders uneven");
            return None;
        }

        let neckline = fit_extrema([t1, t2]);
        if neckline.r_squared < ctx.min_r_squared {
            return None;
        }
        if !p.beyond(ls.price, neckline.value_at(ls.index))
            || !p.beyond(rs.price, neckline.value_at(rs.index))
        {
            return None;
        }

        let height = p.sign() * (head.price - neckline.value_at(head.index));
        let entry = neckline.value_at(rs.index);
        let levels = KeyLevels::new(entry, p.project(entry, height), head.price).with_neckline(entry);

        let breakout = find_breakout(ctx.closes(), rs.index, rs.index - ls.index, |i, c| {
            p.breaks(c, neckline.value_at(i))
        });
        let symmetry = 0.5 * time_symmetry(head.index - ls.index, rs.index - head.index)
            + 0.5 * level_symmetry(ls.price, rs.price, tol);

        let pattern_type = match p {
            Polarity::Top => PatternType::HeadAndShoulders,
            Polarity::Bottom => PatternType::InverseHeadAndShoulders,
        };
        Some(
            PatternCandidate::new(pattern_type, p.signal(), ls.index, rs.index, levels)
                .with_trendlines(vec![neckline])
                .with_base_confidence(self.base_confidence)
                .with_symmetry(symmetry)
                .with_breakout(breakout),
        )
    }
}

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[ParamMeta::ratio(
    "base_confidence",
    0.80,
    "Confidence before quality adjustment",
)];

impl ParameterizedMatcher for HeadAndShouldersMatcher {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            base_confidence: get_ratio(params, "base_confidence", 0.80)?,
        })
    }
}

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

/// Double Top (P,T,P) and Double Bottom (T,P,T).
///
/// Only confirmed formations are reported: a close must cross the middle extreme after the
/// second top before price runs past the tops by more than the level tolerance.
#[derive(Debug, Clone)]
pub struct DoubleTopBottomMatcher {
    pub base_confidence: Ratio,
    /// Depth of the middle extreme as a fraction of the level
    pub min_retracement: f64,
}

impl Default for DoubleTopBottomMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.75),
            min_retracement: 0.03,
        }
    }
}

impl PatternMatcher for DoubleTopBottomMatcher {
    fn name(&self) -> &'static str {
        "double_top_bottom"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[PatternType::DoubleTop, PatternType::DoubleBottom]
    }

    fn min_extrema(&self) -> usize {
        3
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        let mut out = Vec::new();
        for polarity in Polarity::BOTH {
            for window in windows_from(ctx.extrema, 3, polarity.extreme_kind()) {
                out.extend(self.match_window(ctx, window, polarity));
            }
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        check_params(
            DOUBLE_TOP_BOTTOM_PARAMS,
            &[("min_retracement", self.min_retracement)],
        )
    }
}

impl DoubleTopBottomMatcher {
    fn match_window(
        &self,
        ctx: &MatchContext<'_>,
        window: &[Extremum],
        p: Polarity,
    ) -> Option<PatternCandidate> {
        let [first, middle, second] = window else {
            return None;
        };
        let tol = ctx.tolerance(first.index, second.index);
        if (first.price - second.price).abs() > tol {
            return None;
        }

        let level = p.outermost([first.price, second.price]);
        let depth = (p.sign() * (first.price - middle.price)).min(p.sign() * (second.price - middle.price));
        if depth <= 0.0 || depth < self.min_retracement * level.abs() {
            trace!(first = first.index, depth, "retracement too shallow");
            return None;
        }

        // Confirmation: first decisive close after the second extreme
        let closes = ctx.closes();
        let invalidation = level + p.sign() * tol;
        let hit = find_breakout(closes, second.index, second.index - first.index, |_, c| {
            p.beyond(c, invalidation) || p.breaks(c, middle.price)
        })?;
        if !p.breaks(closes[hit], middle.price) {
            trace!(first = first.index, invalidated_at = hit, "double formation invalidated");
            return None;
        }

        let height = p.sign() * (level - middle.price);
        let entry = middle.price;
        let levels = KeyLevels::new(entry, p.project(entry, height), level).with_neckline(entry);

        let symmetry = 0.5 * time_symmetry(middle.index - first.index, second.index - middle.index)
            + 0.5 * level_symmetry(first.price, second.price, tol);

        let pattern_type = match p {
            Polarity::Top => PatternType::DoubleTop,
            Polarity::Bottom => PatternType::DoubleBottom,
        };
        Some(
            PatternCandidate::new(pattern_type, p.signal(), first.index, second.index, levels)
                .with_trendlines(vec![fit_extrema([first, second])])
                .with_base_confidence(self.base_confidence)
                .with_symmetry(symmetry)
                .with_breakout(Some(hit)),
        )
    }
}

static DOUBLE_TOP_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("base_confidence", 0.75, "Confidence before quality adjustment"),
    ParamMeta::ratio(
        "min_retracement",
        0.03,
        "Minimum depth of the middle extreme as a fraction of price",
    ),
];

impl ParameterizedMatcher for DoubleTopBottomMatcher {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_TOP_BOTTOM_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            base_confidence: get_ratio(params, "base_confidence", 0.75)?,
            min_retracement: get_ratio(params, "min_retracement", 0.03)?.get(),
        })
    }
}

// ============================================================
// TRIPLE TOP / BOTTOM
// ============================================================

/// Triple Top (P,T,P,T,P) and Triple Bottom (T,P,T,P,T)
#[derive(Debug, Clone)]
pub struct TripleTopBottomMatcher {
    pub base_confidence: Ratio,
    /// Shorter gap between tops over the longer one
    pub min_spacing_ratio: f64,
}

impl Default for TripleTopBottomMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.80),
            min_spacing_ratio: 0.5,
        }
    }
}

impl PatternMatcher for TripleTopBottomMatcher {
    fn name(&self) -> &'static str {
        "triple_top_bottom"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[PatternType::TripleTop, PatternType::TripleBottom]
    }

    fn min_extrema(&self) -> usize {
        5
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        let mut out = Vec::new();
        for polarity in Polarity::BOTH {
            for window in windows_from(ctx.extrema, 5, polarity.extreme_kind()) {
                out.extend(self.match_window(ctx, window, polarity));
            }
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        check_params(
            TRIPLE_TOP_BOTTOM_PARAMS,
            &[("min_spacing_ratio", self.min_spacing_ratio)],
        )
    }
}

impl TripleTopBottomMatcher {
    fn match_window(
        &self,
        ctx: &MatchContext<'_>,
        window: &[Extremum],
        p: Polarity,
    ) -> Option<PatternCandidate> {
        let [a, t1, b, t2, c] = window else {
            return None;
        };
        let tol = ctx.tolerance(a.index, c.index);

        let tops = [a.price, b.price, c.price];
        let hi = tops.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lo = tops.iter().copied().fold(f64::INFINITY, f64::min);
        if hi - lo > tol {
            return None;
        }

        let (left, right) = (b.index - a.index, c.index - b.index);
        let spacing = left.min(right) as f64 / left.max(right) as f64;
        if spacing < self.min_spacing_ratio {
            trace!(first = a.index, spacing, "uneven spacing");
            return None;
        }

        let level = p.outermost(tops);
        // Neck is the deeper of the two pullbacks
        let neck = match p {
            Polarity::Top => t1.price.min(t2.price),
            Polarity::Bottom => t1.price.max(t2.price),
        };
        let height = p.sign() * (level - neck);
        if height <= tol {
            return None;
        }

        let levels = KeyLevels::new(neck, p.project(neck, height), level).with_neckline(neck);
        let breakout = find_breakout(ctx.closes(), c.index, c.index - a.index, |_, x| {
            p.breaks(x, neck)
        });
        let symmetry = 0.5 * spacing_regularity(window) + 0.5 * level_symmetry(hi, lo, tol);

        let pattern_type = match p {
            Polarity::Top => PatternType::TripleTop,
            Polarity::Bottom => PatternType::TripleBottom,
        };
        Some(
            PatternCandidate::new(pattern_type, p.signal(), a.index, c.index, levels)
                .with_trendlines(vec![fit_extrema([a, b, c]), fit_extrema([t1, t2])])
                .with_base_confidence(self.base_confidence)
                .with_symmetry(symmetry)
                .with_breakout(breakout),
        )
    }
}

static TRIPLE_TOP_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("base_confidence", 0.80, "Confidence before quality adjustment"),
    ParamMeta::ratio(
        "min_spacing_ratio",
        0.5,
        "Shorter over longer gap between consecutive tops",
    ),
];

impl ParameterizedMatcher for TripleTopBottomMatcher {
    fn param_meta() -> &'static [ParamMeta] {
        TRIPLE_TOP_BOTTOM_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            base_confidence: get_ratio(params, "base_confidence", 0.80)?,
            min_spacing_ratio: get_ratio(params, "min_spacing_ratio", 0.5)?.get(),
        })
    }
}

// ============================================================
// ROUNDING TOP / BOTTOM
// ============================================================

/// Rounding Bottom (saucer) and Rounding Top (dome).
///
/// A parabola is fitted through the arc-side extrema of a 7 or 9 extrema window. Excluded
/// from engine output by default, see
/// [`DetectionConfig::exclude_pattern_types`](crate::config::DetectionConfig).
#[derive(Debug, Clone)]
pub struct RoundingMatcher {
    pub base_confidence: Ratio,
    pub min_curvature_r2: f64,
}

impl Default for RoundingMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.65),
            min_curvature_r2: 0.8,
        }
    }
}

const ROUNDING_WINDOWS: [usize; 2] = [7, 9];

impl PatternMatcher for RoundingMatcher {
    fn name(&self) -> &'static str {
        "rounding"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[PatternType::RoundingTop, PatternType::RoundingBottom]
    }

    fn min_extrema(&self) -> usize {
        7
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        let mut out = Vec::new();
        for polarity in Polarity::BOTH {
            for size in ROUNDING_WINDOWS {
                for window in windows_from(ctx.extrema, size, polarity.extreme_kind()) {
                    out.extend(self.match_window(ctx, window, polarity));
                }
            }
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        check_params(ROUNDING_PARAMS, &[("min_curvature_r2", self.min_curvature_r2)])
    }
}

impl RoundingMatcher {
    fn match_window(
        &self,
        ctx: &MatchContext<'_>,
        window: &[Extremum],
        p: Polarity,
    ) -> Option<PatternCandidate> {
        let (first, last) = (window.first()?, window.last()?);
        let (start, end) = (first.index, last.index);
        let arc_kind = p.extreme_kind();

        let arc: Vec<(usize, f64)> = window
            .iter()
            .filter(|e| e.kind == arc_kind)
            .map(Extremum::point)
            .collect();
        let fit = fit_quadratic(&arc)?;
        if fit.r_squared < self.min_curvature_r2 {
            return None;
        }
        // Dome for tops, bowl for bottoms
        if p.sign() * fit.a >= 0.0 {
            return None;
        }

        let vertex = fit.vertex_index()?;
        let span = (end - start) as f64;
        let (lo, hi) = (start as f64 + span / 4.0, end as f64 - span / 4.0);
        if vertex < lo || vertex > hi {
            trace!(start, vertex, "vertex outside middle half");
            return None;
        }

        let extreme = p.outermost(arc.iter().map(|(_, y)| *y));
        // Rim sits on the side opposite the arc: lowest trough for tops, highest peak for bottoms
        let rim = match p {
            Polarity::Top => window
                .iter()
                .filter(|e| e.kind != arc_kind)
                .map(|e| e.price)
                .fold(f64::INFINITY, f64::min),
            Polarity::Bottom => window
                .iter()
                .filter(|e| e.kind != arc_kind)
                .map(|e| e.price)
                .fold(f64::NEG_INFINITY, f64::max),
        };
        let tol = ctx.tolerance(start, end);
        let depth = p.sign() * (extreme - rim);
        if !depth.is_finite() || depth <= tol {
            return None;
        }

        let levels = KeyLevels::new(rim, p.project(rim, depth), extreme);
        let breakout = find_breakout(ctx.closes(), end, end - start, |_, c| p.breaks(c, rim));
        let centre = (start + end) as f64 / 2.0;
        let symmetry = 1.0 - (vertex - centre).abs() / (span / 2.0);

        let pattern_type = match p {
            Polarity::Top => PatternType::RoundingTop,
            Polarity::Bottom => PatternType::RoundingBottom,
        };
        Some(
            PatternCandidate::new(pattern_type, p.signal(), start, end, levels)
                .with_r_squared(fit.r_squared)
                .with_base_confidence(self.base_confidence)
                .with_symmetry(symmetry)
                .with_breakout(breakout),
        )
    }
}

static ROUNDING_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("base_confidence", 0.65, "Confidence before quality adjustment"),
    ParamMeta::ratio(
        "min_curvature_r2",
        0.8,
        "Minimum r-squared of the parabola through the arc",
    ),
];

impl ParameterizedMatcher for RoundingMatcher {
    fn param_meta() -> &'static [ParamMeta] {
        ROUNDING_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            base_confidence: get_ratio(params, "base_confidence", 0.65)?,
            min_curvature_r2: get_ratio(params, "min_curvature_r2", 0.8)?.get(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{matchers::testing::Fixture, Signal};

    const HEAD_AND_SHOULDERS: &[(usize, f64)] = &[
        (0, 80.0),
        (40, 110.0),
        (60, 100.0),
        (90, 121.0),
        (120, 100.0),
        (150, 110.0),
        (199, 88.0),
    ];

    fn mirrored(vertices: &[(usize, f64)], axis: f64) -> Vec<(usize, f64)> {
        vertices.iter().map(|&(i, p)| (i, axis - p)).collect()
    }

    #[test]
    fn test_head_and_shoulders() {
        let fx = Fixture::new(HEAD_AND_SHOULDERS);
        let found = HeadAndShouldersMatcher::default().detect(&fx.context());
        assert_eq!(found.len(), 1);

        let c = &found[0];
        assert_eq!(c.pattern_type, PatternType::HeadAndShoulders);
        assert_eq!(c.signal, Signal::Bearish);
        assert_eq!((c.start_index, c.end_index), (40, 150));
        assert!((c.key_levels.entry - 100.0).abs() < 1e-9);
        assert!((c.key_levels.target - 79.0).abs() < 1e-9);
        assert_eq!(c.key_levels.stop, 121.0);
        assert_eq!(c.r_squared, 1.0);
        assert!(c.breakout_index.is_some_and(|i| i > 150));
    }

    #[test]
    fn test_inverse_head_and_shoulders() {
        let fx = Fixture::new(&mirrored(HEAD_AND_SHOULDERS, 220.0));
        let found = HeadAndShouldersMatcher::default().detect(&fx.context());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern_type, PatternType::InverseHeadAndShoulders);
        assert_eq!(found[0].signal, Signal::Bullish);
        assert!((found[0].key_levels.entry - 120.0).abs() < 1e-9);
        assert!((found[0].key_levels.target - 141.0).abs() < 1e-9);
    }

    #[test]
    fn test_uneven_shoulders_rejected() {
        let fx = Fixture::new(&[
            (0, 80.0),
            (40, 104.0),
            (60, 100.0),
            (90, 121.0),
            (120, 100.0),
            (150, 112.0),
            (199, 88.0),
        ]);
        assert!(HeadAndShouldersMatcher::default().detect(&fx.context()).is_empty());
    }

    #[test]
    fn test_double_top_needs_confirmation() {
        let confirmed = Fixture::new(&[(0, 90.0), (20, 110.0), (35, 100.0), (50, 110.0), (70, 95.0)]);
        let found = DoubleTopBottomMatcher::default().detect(&confirmed.context());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern_type, PatternType::DoubleTop);
        assert_eq!(found[0].key_levels.entry, 100.0);
        assert_eq!(found[0].key_levels.target, 90.0);
        assert_eq!(found[0].key_levels.stop, 110.0);
        assert!(found[0].breakout_index.is_some_and(|i| i > 50 && i <= 80));

        // Price stalls above the trough: unconfirmed
        let pending = Fixture::new(&[(0, 90.0), (20, 110.0), (35, 100.0), (50, 110.0), (70, 103.0)]);
        assert!(DoubleTopBottomMatcher::default().detect(&pending.context()).is_empty());
    }

    #[test]
    fn test_double_bottom() {
        let fx = Fixture::new(&[(0, 110.0), (20, 90.0), (35, 100.0), (50, 90.0), (70, 105.0)]);
        let found = DoubleTopBottomMatcher::default().detect(&fx.context());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern_type, PatternType::DoubleBottom);
        assert_eq!(found[0].signal, Signal::Bullish);
        assert_eq!(found[0].key_levels.target, 110.0);
    }

    #[test]
    fn test_triple_top_and_bottom() {
        let fx = Fixture::new(&[
            (0, 90.0),
            (20, 110.0),
            (30, 100.0),
            (40, 110.0),
            (50, 100.0),
            (60, 110.0),
            (70, 100.0),
            (80, 104.0),
        ]);
        let found = TripleTopBottomMatcher::default().detect(&fx.context());
        let types: Vec<PatternType> = found.iter().map(|c| c.pattern_type).collect();
        assert!(types.contains(&PatternType::TripleTop));
        assert!(types.contains(&PatternType::TripleBottom));

        let top = found
            .iter()
            .find(|c| c.pattern_type == PatternType::TripleTop)
            .unwrap();
        assert_eq!((top.start_index, top.end_index), (20, 60));
        assert_eq!(top.key_levels.entry, 100.0);
        assert_eq!(top.key_levels.target, 90.0);
        assert_eq!(top.symmetry_score, 1.0);
    }

    #[test]
    fn test_rounding_bottom() {
        let fx = Fixture::new(&[
            (0, 112.0),
            (10, 104.0),
            (20, 108.5),
            (30, 98.0),
            (40, 104.5),
            (50, 96.0),
            (60, 104.5),
            (70, 98.0),
            (80, 108.5),
            (90, 104.0),
            (100, 115.0),
        ]);
        let found = RoundingMatcher::default().detect(&fx.context());
        assert!(!found.is_empty());
        assert!(found.iter().all(|c| c.pattern_type == PatternType::RoundingBottom));

        let widest = found.iter().max_by_key(|c| c.span()).unwrap();
        assert_eq!((widest.start_index, widest.end_index), (10, 90));
        assert_eq!(widest.key_levels.entry, 108.5);
        assert_eq!(widest.key_levels.stop, 96.0);
        assert!((widest.symmetry_score - 1.0).abs() < 1e-6);
        assert_eq!(widest.breakout_index, Some(95));
    }

    #[test]
    fn test_monotonic_series_has_no_reversals() {
        let fx = Fixture::new(&[(0, 100.0), (199, 300.0)]);
        let ctx = fx.context();
        assert!(HeadAndShouldersMatcher::default().detect(&ctx).is_empty());
        assert!(DoubleTopBottomMatcher::default().detect(&ctx).is_empty());
        assert!(TripleTopBottomMatcher::default().detect(&ctx).is_empty());
        assert!(RoundingMatcher::default().detect(&ctx).is_empty());
    }

    #[test]
    fn test_with_params() {
        let mut params = HashMap::new();
        params.insert("min_retracement", 0.1);
        let m = DoubleTopBottomMatcher::with_params(&params).unwrap();
        assert_eq!(m.min_retracement, 0.1);
        assert_eq!(m.base_confidence.get(), 0.75);

        params.insert("base_confidence", 1.5);
        assert!(DoubleTopBottomMatcher::with_params(&params).is_err());
    }

    #[test]
    fn test_validate_config() {
        assert!(DoubleTopBottomMatcher::default().validate_config().is_ok());
        let bad = TripleTopBottomMatcher {
            min_spacing_ratio: -0.5,
            ..Default::default()
        };
        assert!(bad.validate_config().is_err());
    }
}
