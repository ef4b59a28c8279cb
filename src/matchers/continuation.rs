//! Continuation formations
//!
//! Triangles, Flags and Pennants, Wedges, Channels and Rectangles. All of them are two
//! boundary lines fitted through the peaks and troughs of a short extrema window; they differ
//! in how those boundaries slope and whether they converge.

use std::collections::HashMap;

use tracing::trace;

use super::helpers::{boundary_windows, prior_signal, spacing_regularity, Boundaries};
use crate::{
    config::{check_params, get_factor, get_period, get_ratio, ParamMeta, ParameterizedMatcher},
    extrema::Extremum,
    trendline::fit_closes,
    MatchContext, PatternCandidate, PatternMatcher, PatternType, Ratio, Result, Signal,
};

impl_with_defaults!(
    TriangleMatcher,
    FlagPennantMatcher,
    WedgeMatcher,
    ChannelMatcher,
    RectangleMatcher,
);

/// Neutral formations project in the direction of the move into them
fn breakout_direction(ctx: &MatchContext<'_>, signal: Signal, start: usize) -> Signal {
    match signal {
        Signal::Neutral => prior_signal(ctx.closes(), start),
        directional => directional,
    }
}

/// Candidate bounded by `b`, with levels projected by `height` in the breakout direction
fn bounded_candidate(
    ctx: &MatchContext<'_>,
    b: &Boundaries,
    window: &[Extremum],
    pattern_type: PatternType,
    signal: Signal,
    height: f64,
    base_confidence: Ratio,
) -> PatternCandidate {
    let direction = breakout_direction(ctx, signal, b.start);
    let levels = b.project(direction, height);
    let symmetry = 0.5 * spacing_regularity(window) + 0.5 * b.touch_precision();

    PatternCandidate::new(pattern_type, signal, b.start, b.end, levels)
        .with_trendlines(b.trendlines())
        .with_base_confidence(base_confidence)
        .with_symmetry(symmetry)
        .with_breakout(b.breakout(ctx.closes(), direction))
}

// ============================================================
// TRIANGLES
// ============================================================

/// Ascending, Descending and Symmetrical triangles
#[derive(Debug, Clone)]
pub struct TriangleMatcher {
    pub base_confidence: Ratio,
}

impl Default for TriangleMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.70),
        }
    }
}

impl PatternMatcher for TriangleMatcher {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[
            PatternType::AscendingTriangle,
            PatternType::DescendingTriangle,
            PatternType::SymmetricalTriangle,
        ]
    }

    fn min_extrema(&self) -> usize {
        5
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        boundary_windows(ctx.extrema)
            .filter_map(|window| self.match_window(ctx, window))
            .collect()
    }
}

impl TriangleMatcher {
    fn match_window(&self, ctx: &MatchContext<'_>, window: &[Extremum]) -> Option<PatternCandidate> {
        let b = Boundaries::fit(ctx, window)?;
        if !b.converging() {
            return None;
        }

        let (upper, lower) = (b.upper_drift(), b.lower_drift());
        let pattern_type = if b.is_flat(upper) && b.is_rising(lower) {
            PatternType::AscendingTriangle
        } else if b.is_flat(lower) && b.is_falling(upper) {
            PatternType::DescendingTriangle
        } else if b.is_falling(upper) && b.is_rising(lower) {
            PatternType::SymmetricalTriangle
        } else {
            return None;
        };

        Some(bounded_candidate(
            ctx,
            &b,
            window,
            pattern_type,
            pattern_type.typical_signal(),
            b.width_start(),
            self.base_confidence,
        ))
    }
}

// ============================================================
// FLAGS & PENNANTS
// ============================================================

/// Bull/Bear Flag and Pennant: a sharp pole followed by a short consolidation.
///
/// The consolidation starts at the extremum that ends the pole and spans the next three or
/// four extrema. Flags have roughly parallel boundaries; pennants converge.
#[derive(Debug, Clone)]
pub struct FlagPennantMatcher {
    pub base_confidence: Ratio,
    /// Longest pole in bars
    pub max_pole_bars: usize,
    /// Longest consolidation in bars
    pub max_flag_bars: usize,
    /// Pole height in volatility units
    pub min_pole_atr: f64,
    /// Deepest pullback as a fraction of the pole
    pub max_retracement: f64,
    pub min_parallelism: f64,
    pub min_convergence: f64,
}

impl Default for FlagPennantMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.70),
            max_pole_bars: 15,
            max_flag_bars: 25,
            min_pole_atr: 3.0,
            max_retracement: 0.5,
            min_parallelism: 0.7,
            min_convergence: 0.3,
        }
    }
}

impl PatternMatcher for FlagPennantMatcher {
    fn name(&self) -> &'static str {
        "flag_pennant"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[
            PatternType::BullFlag,
            PatternType::BearFlag,
            PatternType::BullPennant,
            PatternType::BearPennant,
        ]
    }

    fn min_extrema(&self) -> usize {
        4
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        let mut out = Vec::new();
        for pos in 0..ctx.extrema.len() {
            for count in [4, 5] {
                if let Some(window) = ctx.extrema.get(pos..pos + count) {
                    out.extend(self.match_window(ctx, window));
                }
            }
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        check_params(
            FLAG_PENNANT_PARAMS,
            &[
                ("max_pole_bars", self.max_pole_bars as f64),
                ("max_flag_bars", self.max_flag_bars as f64),
                ("min_pole_atr", self.min_pole_atr),
                ("max_retracement", self.max_retracement),
                ("min_parallelism", self.min_parallelism),
                ("min_convergence", self.min_convergence),
            ],
        )
    }
}

impl FlagPennantMatcher {
    fn match_window(&self, ctx: &MatchContext<'_>, window: &[Extremum]) -> Option<PatternCandidate> {
        let (pole_end, last) = (window.first()?, window.last()?);
        if last.index - pole_end.index > self.max_flag_bars {
            return None;
        }

        // A peak ends a rising pole, a trough a falling one
        let bullish = pole_end.is_peak();
        let closes = ctx.closes();
        let from = pole_end.index.saturating_sub(self.max_pole_bars);
        let pole = closes.get(from..pole_end.index)?;
        let (offset, pole_base) = if bullish {
            pole.iter()
                .copied()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(&b.1))?
        } else {
            pole.iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))?
        };
        let pole_start = from + offset;
        let pole_height = (pole_end.price - pole_base).abs();
        let vol = ctx.volatility.get(pole_end.index).copied().unwrap_or(0.0);
        if pole_height <= 0.0 || pole_height < self.min_pole_atr * vol {
            return None;
        }

        let pullback = if bullish {
            pole_end.price - window.iter().map(|e| e.price).fold(f64::INFINITY, f64::min)
        } else {
            window.iter().map(|e| e.price).fold(f64::NEG_INFINITY, f64::max) - pole_end.price
        };
        if pullback / pole_height > self.max_retracement {
            trace!(pole_end = pole_end.index, "consolidation retraces too far");
            return None;
        }

        let b = Boundaries::fit(ctx, window)?;
        // Consolidation must not keep running with the pole
        let drift = (b.upper_drift() + b.lower_drift()) / 2.0;
        if (bullish && b.is_rising(drift)) || (!bullish && b.is_falling(drift)) {
            return None;
        }

        let width_start = b.width_start();
        let parallelism = 1.0 - (b.upper_drift() - b.lower_drift()).abs() / width_start;
        let convergence = 1.0 - b.width_end() / width_start;

        let (pattern_type, symmetry) = if convergence >= self.min_convergence {
            let kind = if bullish {
                PatternType::BullPennant
            } else {
                PatternType::BearPennant
            };
            (kind, 0.5 * spacing_regularity(window) + 0.5 * b.touch_precision())
        } else if parallelism >= self.min_parallelism {
            let kind = if bullish {
                PatternType::BullFlag
            } else {
                PatternType::BearFlag
            };
            (kind, parallelism)
        } else {
            return None;
        };

        let signal = if bullish {
            Signal::Bullish
        } else {
            Signal::Bearish
        };
        let levels = b.project(signal, pole_height);
        let pole_line = fit_closes(closes, pole_start, pole_end.index);

        Some(
            PatternCandidate::new(pattern_type, signal, pole_start, b.end, levels)
                .with_trendlines(vec![pole_line, b.upper, b.lower])
                .with_base_confidence(self.base_confidence)
                .with_symmetry(symmetry)
                .with_breakout(b.breakout(closes, signal)),
        )
    }
}

static FLAG_PENNANT_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("base_confidence", 0.70, "Confidence before quality adjustment"),
    ParamMeta::period("max_pole_bars", 15.0, "Longest pole in bars"),
    ParamMeta::period("max_flag_bars", 25.0, "Longest consolidation in bars"),
    ParamMeta::positive_factor("min_pole_atr", 3.0, "Minimum pole height in volatility units"),
    ParamMeta::ratio(
        "max_retracement",
        0.5,
        "Deepest consolidation pullback as a fraction of the pole",
    ),
    ParamMeta::ratio("min_parallelism", 0.7, "Flag boundaries slope alike"),
    ParamMeta::ratio("min_convergence", 0.3, "Pennant width shrinks by at least this fraction"),
];

impl ParameterizedMatcher for FlagPennantMatcher {
    fn param_meta() -> &'static [ParamMeta] {
        FLAG_PENNANT_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            base_confidence: get_ratio(params, "base_confidence", 0.70)?,
            max_pole_bars: get_period(params, "max_pole_bars", 15)?.get(),
            max_flag_bars: get_period(params, "max_flag_bars", 25)?.get(),
            min_pole_atr: get_factor(params, "min_pole_atr", 3.0)?,
            max_retracement: get_ratio(params, "max_retracement", 0.5)?.get(),
            min_parallelism: get_ratio(params, "min_parallelism", 0.7)?.get(),
            min_convergence: get_ratio(params, "min_convergence", 0.3)?.get(),
        })
    }
}

// ============================================================
// WEDGES
// ============================================================

/// Rising Wedge (bearish) and Falling Wedge (bullish): both boundaries slope the same way
/// and converge.
#[derive(Debug, Clone)]
pub struct WedgeMatcher {
    pub base_confidence: Ratio,
}

impl Default for WedgeMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.70),
        }
    }
}

impl PatternMatcher for WedgeMatcher {
    fn name(&self) -> &'static str {
        "wedge"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[PatternType::RisingWedge, PatternType::FallingWedge]
    }

    fn min_extrema(&self) -> usize {
        5
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        boundary_windows(ctx.extrema)
            .filter_map(|window| {
                let b = Boundaries::fit(ctx, window)?;
                if !b.converging() {
                    return None;
                }
                let (upper, lower) = (b.upper_drift(), b.lower_drift());
                let pattern_type = if b.is_rising(upper) && b.is_rising(lower) {
                    PatternType::RisingWedge
                } else if b.is_falling(upper) && b.is_falling(lower) {
                    PatternType::FallingWedge
                } else {
                    return None;
                };
                Some(bounded_candidate(
                    ctx,
                    &b,
                    window,
                    pattern_type,
                    pattern_type.typical_signal(),
                    b.width_start(),
                    self.base_confidence,
                ))
            })
            .collect()
    }
}

// ============================================================
// CHANNELS
// ============================================================

/// Ascending, Descending and Horizontal channels: parallel boundaries.
///
/// Horizontal channels whose touches also qualify as a rectangle are left to
/// [`RectangleMatcher`].
#[derive(Debug, Clone)]
pub struct ChannelMatcher {
    pub base_confidence: Ratio,
}

impl Default for ChannelMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.65),
        }
    }
}

impl PatternMatcher for ChannelMatcher {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[
            PatternType::AscendingChannel,
            PatternType::DescendingChannel,
            PatternType::HorizontalChannel,
        ]
    }

    fn min_extrema(&self) -> usize {
        5
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        boundary_windows(ctx.extrema)
            .filter_map(|window| {
                let b = Boundaries::fit(ctx, window)?;
                if !b.parallel() {
                    return None;
                }
                let drift = (b.upper_drift() + b.lower_drift()) / 2.0;
                let pattern_type = if b.is_rising(drift) {
                    PatternType::AscendingChannel
                } else if b.is_falling(drift) {
                    PatternType::DescendingChannel
                } else if is_rectangle(&b) {
                    return None;
                } else {
                    PatternType::HorizontalChannel
                };
                Some(bounded_candidate(
                    ctx,
                    &b,
                    window,
                    pattern_type,
                    pattern_type.typical_signal(),
                    b.mean_width(),
                    self.base_confidence,
                ))
            })
            .collect()
    }
}

// ============================================================
// RECTANGLES
// ============================================================

fn is_rectangle(b: &Boundaries) -> bool {
    b.is_flat(b.upper_drift()) && b.is_flat(b.lower_drift()) && b.is_tight()
}

/// Rectangle: flat support and resistance with every touch within the level tolerance
#[derive(Debug, Clone)]
pub struct RectangleMatcher {
    pub base_confidence: Ratio,
}

impl Default for RectangleMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.70),
        }
    }
}

impl PatternMatcher for RectangleMatcher {
    fn name(&self) -> &'static str {
        "rectangle"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[PatternType::Rectangle]
    }

    fn min_extrema(&self) -> usize {
        5
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        boundary_windows(ctx.extrema)
            .filter_map(|window| {
                let b = Boundaries::fit(ctx, window)?;
                is_rectangle(&b).then(|| {
                    bounded_candidate(
                        ctx,
                        &b,
                        window,
                        PatternType::Rectangle,
                        Signal::Neutral,
                        b.mean_width(),
                        self.base_confidence,
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::testing::Fixture;

    fn mirrored(vertices: &[(usize, f64)], axis: f64) -> Vec<(usize, f64)> {
        vertices.iter().map(|&(i, p)| (i, axis - p)).collect()
    }

    fn types(found: &[PatternCandidate]) -> Vec<PatternType> {
        found.iter().map(|c| c.pattern_type).collect()
    }

    const ASCENDING_TRIANGLE: &[(usize, f64)] = &[
        (0, 90.0),
        (20, 110.0),
        (30, 100.0),
        (40, 110.0),
        (50, 104.0),
        (60, 110.0),
        (70, 107.0),
        (85, 118.0),
    ];

    const RISING_WEDGE: &[(usize, f64)] = &[
        (0, 100.0),
        (20, 120.0),
        (30, 100.0),
        (40, 130.0),
        (50, 115.0),
        (60, 140.0),
        (70, 130.0),
        (80, 135.0),
    ];

    const BULL_FLAG: &[(usize, f64)] = &[
        (0, 104.0),
        (20, 100.0),
        (30, 130.0),
        (36, 123.0),
        (42, 128.0),
        (48, 121.0),
        (60, 135.0),
    ];

    #[test]
    fn test_ascending_triangle() {
        let fx = Fixture::new(ASCENDING_TRIANGLE);
        let found = TriangleMatcher::default().detect(&fx.context());
        assert!(!found.is_empty());
        assert!(types(&found).iter().all(|t| *t == PatternType::AscendingTriangle));

        let first = found
            .iter()
            .find(|c| (c.start_index, c.end_index) == (20, 60))
            .unwrap();
        assert_eq!(first.signal, Signal::Bullish);
        assert!((first.key_levels.entry - 110.0).abs() < 1e-9);
        assert!((first.key_levels.target - 122.0).abs() < 1e-9);
        assert!((first.key_levels.stop - 106.0).abs() < 1e-9);
        assert_eq!(first.breakout_index, Some(75));
        assert_eq!(first.trendlines.len(), 2);
    }

    #[test]
    fn test_descending_triangle() {
        let fx = Fixture::new(&mirrored(ASCENDING_TRIANGLE, 220.0));
        let found = TriangleMatcher::default().detect(&fx.context());
        assert!(!found.is_empty());
        assert!(types(&found).iter().all(|t| *t == PatternType::DescendingTriangle));
        assert!(found.iter().all(|c| c.signal == Signal::Bearish));
    }

    #[test]
    fn test_symmetrical_triangle_projects_prior_move() {
        let fx = Fixture::new(&[
            (0, 90.0),
            (20, 115.0),
            (30, 100.0),
            (40, 112.0),
            (50, 103.0),
            (60, 109.0),
            (70, 105.0),
            (80, 108.0),
        ]);
        let found = TriangleMatcher::default().detect(&fx.context());
        let c = found
            .iter()
            .find(|c| (c.start_index, c.end_index) == (20, 60))
            .unwrap();
        assert_eq!(c.pattern_type, PatternType::SymmetricalTriangle);
        assert_eq!(c.signal, Signal::Neutral);
        // prior move is up, so the breakout level is the upper line
        assert!((c.key_levels.entry - 109.0).abs() < 1e-9);
        assert!(c.key_levels.target > c.key_levels.entry);
        assert!(c.key_levels.stop < c.key_levels.entry);
    }

    #[test]
    fn test_wedges() {
        let fx = Fixture::new(RISING_WEDGE);
        let found = WedgeMatcher::default().detect(&fx.context());
        assert!(!found.is_empty());
        assert!(types(&found).iter().all(|t| *t == PatternType::RisingWedge));
        assert!(found.iter().all(|c| c.signal == Signal::Bearish));

        let fx = Fixture::new(&mirrored(RISING_WEDGE, 240.0));
        let found = WedgeMatcher::default().detect(&fx.context());
        assert!(!found.is_empty());
        assert!(types(&found).iter().all(|t| *t == PatternType::FallingWedge));

        // a wedge is not a triangle
        let fx = Fixture::new(RISING_WEDGE);
        assert!(TriangleMatcher::default().detect(&fx.context()).is_empty());
    }

    #[test]
    fn test_ascending_channel() {
        let fx = Fixture::new(&[
            (0, 100.0),
            (20, 120.0),
            (30, 105.0),
            (40, 130.0),
            (50, 115.0),
            (60, 140.0),
            (70, 125.0),
            (80, 130.0),
        ]);
        let found = ChannelMatcher::default().detect(&fx.context());
        assert!(!found.is_empty());
        assert!(types(&found).iter().all(|t| *t == PatternType::AscendingChannel));
        assert!(WedgeMatcher::default().detect(&fx.context()).is_empty());
    }

    #[test]
    fn test_rectangle_takes_precedence_over_horizontal_channel() {
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
        let rects = RectangleMatcher::default().detect(&fx.context());
        assert!(!rects.is_empty());
        let r = &rects[0];
        assert_eq!(r.pattern_type, PatternType::Rectangle);
        assert_eq!(r.signal, Signal::Neutral);
        assert_eq!(r.key_levels.resistance, Some(110.0));
        assert_eq!(r.key_levels.support, Some(100.0));
        assert!(ChannelMatcher::default().detect(&fx.context()).is_empty());
    }

    #[test]
    fn test_bull_flag() {
        let fx = Fixture::new(BULL_FLAG);
        let found = FlagPennantMatcher::default().detect(&fx.context());
        assert_eq!(found.len(), 1);

        let c = &found[0];
        assert_eq!(c.pattern_type, PatternType::BullFlag);
        assert_eq!((c.start_index, c.end_index), (20, 48));
        assert!((c.key_levels.entry - 127.0).abs() < 1e-9);
        assert!((c.key_levels.target - 157.0).abs() < 1e-9);
        assert!((c.key_levels.stop - 121.0).abs() < 1e-9);
        assert_eq!(c.trendlines.len(), 3);
        assert_eq!(c.breakout_index, Some(53));
    }

    #[test]
    fn test_bull_pennant() {
        let fx = Fixture::new(&[
            (0, 104.0),
            (20, 100.0),
            (30, 130.0),
            (36, 120.0),
            (42, 127.0),
            (48, 123.0),
            (60, 135.0),
        ]);
        let found = FlagPennantMatcher::default().detect(&fx.context());
        assert_eq!(types(&found), vec![PatternType::BullPennant]);
    }

    #[test]
    fn test_bear_flag() {
        let fx = Fixture::new(&mirrored(BULL_FLAG, 240.0));
        let found = FlagPennantMatcher::default().detect(&fx.context());
        assert_eq!(types(&found), vec![PatternType::BearFlag]);
        assert_eq!(found[0].signal, Signal::Bearish);
    }

    #[test]
    fn test_flag_params() {
        assert!(FlagPennantMatcher::default().validate_config().is_ok());

        let mut params = HashMap::new();
        params.insert("max_pole_bars", 0.0);
        assert!(FlagPennantMatcher::with_params(&params).is_err());

        let bad = FlagPennantMatcher {
            min_pole_atr: 0.0,
            ..Default::default()
        };
        assert!(bad.validate_config().is_err());
    }
}
