//! Broadening formations
//!
//! Megaphones (widening boundaries) and Diamonds (a megaphone that narrows back into a
//! triangle).

use super::helpers::{boundary_windows, prior_signal, spacing_regularity, time_symmetry, Boundaries};
use crate::{
    extrema::Extremum, MatchContext, PatternCandidate, PatternMatcher, PatternType, Ratio, Signal,
};

impl_with_defaults!(BroadeningMatcher, DiamondMatcher);

/// Broadening formation: rising resistance and falling support
#[derive(Debug, Clone)]
pub struct BroadeningMatcher {
    pub base_confidence: Ratio,
}

impl Default for BroadeningMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.60),
        }
    }
}

impl PatternMatcher for BroadeningMatcher {
    fn name(&self) -> &'static str {
        "broadening"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[PatternType::BroadeningFormation]
    }

    fn min_extrema(&self) -> usize {
        5
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        boundary_windows(ctx.extrema)
            .filter_map(|window| {
                let b = Boundaries::fit(ctx, window)?;
                let widening =
                    b.diverging() && b.is_rising(b.upper_drift()) && b.is_falling(b.lower_drift());
                if !widening {
                    return None;
                }

                let direction = prior_signal(ctx.closes(), b.start);
                let levels = b.project(direction, b.width_end());
                let symmetry = 0.5 * spacing_regularity(window) + 0.5 * b.touch_precision();
                Some(
                    PatternCandidate::new(
                        PatternType::BroadeningFormation,
                        Signal::Neutral,
                        b.start,
                        b.end,
                        levels,
                    )
                    .with_trendlines(b.trendlines())
                    .with_base_confidence(self.base_confidence)
                    .with_symmetry(symmetry)
                    .with_breakout(b.breakout(ctx.closes(), direction)),
                )
            })
            .collect()
    }
}

/// Diamond Top/Bottom over seven extrema.
///
/// The first four extrema must widen and the last four (sharing the middle point) must narrow.
/// The move into the formation decides the kind: after a rally it is a top.
#[derive(Debug, Clone)]
pub struct DiamondMatcher {
    pub base_confidence: Ratio,
}

impl Default for DiamondMatcher {
    fn default() -> Self {
        Self {
            base_confidence: Ratio::new_const(0.60),
        }
    }
}

impl PatternMatcher for DiamondMatcher {
    fn name(&self) -> &'static str {
        "diamond"
    }

    fn pattern_types(&self) -> &'static [PatternType] {
        &[PatternType::DiamondTop, PatternType::DiamondBottom]
    }

    fn min_extrema(&self) -> usize {
        7
    }

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
        ctx.extrema
            .windows(7)
            .filter_map(|window| self.match_window(ctx, window))
            .collect()
    }
}

impl DiamondMatcher {
    fn match_window(&self, ctx: &MatchContext<'_>, window: &[Extremum]) -> Option<PatternCandidate> {
        let left = Boundaries::fit(ctx, &window[..4])?;
        let right = Boundaries::fit(ctx, &window[3..])?;
        if !left.diverging() || !right.converging() {
            return None;
        }

        let (pattern_type, signal) = match prior_signal(ctx.closes(), left.start) {
            Signal::Bearish => (PatternType::DiamondBottom, Signal::Bullish),
            _ => (PatternType::DiamondTop, Signal::Bearish),
        };

        let levels = right.project(signal, left.width_end());
        let symmetry = 0.5 * time_symmetry(left.end - left.start, right.end - right.start)
            + 0.5 * spacing_regularity(window);
        let trendlines = vec![left.upper, left.lower, right.upper, right.lower];

        Some(
            PatternCandidate::new(pattern_type, signal, left.start, right.end, levels)
                .with_trendlines(trendlines)
                .with_base_confidence(self.base_confidence)
                .with_symmetry(symmetry)
                .with_breakout(right.breakout(ctx.closes(), signal)),
        )
    }
}
