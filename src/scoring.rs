//! Candidate quality scoring
//!
//! Quality blends five components in [0, 1]: trendline fit, symmetry, level completeness,
//! breakout volume and prior-trend alignment. The fit and trend weights depend on the
//! formation (see [`PatternType::fit_weight`]); the other three are fixed.
//!
//! ```text
//! quality    = w_fit*fit + 0.20*symmetry + 0.15*completeness + 0.20*volume + (0.45 - w_fit)*trend
//! confidence = clamp(base_confidence * (0.5 + 0.5*quality), 0, 0.99)
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    mean_r_squared, PatternCandidate, PatternFamily, ScoredPattern, Series, Signal, Trend,
};

const SYMMETRY_WEIGHT: f64 = 0.20;
const COMPLETENESS_WEIGHT: f64 = 0.15;
const VOLUME_WEIGHT: f64 = 0.20;
/// Shared by fit and trend
const FIT_TREND_WEIGHT: f64 = 0.45;
/// Upper bound on any confidence, single or multi-timeframe
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Scores candidates against the series they were found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScorer {
    /// Bars before the formation used to classify the prior trend
    pub trend_period: usize,
    /// Bars before the breakout averaged for the volume baseline
    pub volume_period: usize,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self {
            trend_period: 14,
            volume_period: 20,
        }
    }
}

impl QualityScorer {
    pub fn score(&self, series: &Series, mut candidate: PatternCandidate) -> ScoredPattern {
        let pattern_type = candidate.pattern_type;
        let fit = unit(mean_r_squared(&candidate.trendlines).unwrap_or(candidate.r_squared));
        let completeness = completeness(&candidate);
        let volume = self.volume_score(series, &candidate);
        let prior_trend = self.prior_trend(&series.closes, candidate.start_index);
        let trend = trend_alignment(pattern_type.family(), candidate.signal, prior_trend);

        let w_fit = pattern_type.fit_weight();
        let quality = unit(
            w_fit * fit
                + SYMMETRY_WEIGHT * unit(candidate.symmetry_score)
                + COMPLETENESS_WEIGHT * completeness
                + VOLUME_WEIGHT * volume
                + (FIT_TREND_WEIGHT - w_fit) * trend,
        );
        let confidence = clamp_confidence(candidate.base_confidence * (0.5 + 0.5 * quality));

        candidate.volume_score = volume;
        ScoredPattern {
            start_time: series.timestamp(candidate.start_index),
            end_time: series.timestamp(candidate.end_index),
            candidate,
            quality_score: quality,
            confidence,
            prior_trend,
        }
    }

    /// Trend over the `trend_period` bars ending at `start`
    pub fn prior_trend(&self, closes: &[f64], start: usize) -> Trend {
        let from = start.saturating_sub(self.trend_period);
        match (closes.get(from), closes.get(start)) {
            (Some(&a), Some(&b)) if from < start && a != 0.0 => {
                let change = (b - a) / a;
                if change.is_finite() {
                    Trend::from_change(change)
                } else {
                    Trend::Sideways
                }
            }
            _ => Trend::Sideways,
        }
    }

    /// Breakout-bar volume against its trailing average; twice the average scores 1.0.
    ///
    /// Unconfirmed formations are measured at their last bar.
    pub fn volume_score(&self, series: &Series, candidate: &PatternCandidate) -> f64 {
        let at = candidate.breakout_index.unwrap_or(candidate.end_index);
        let from = at.saturating_sub(self.volume_period);
        let (Some(&volume), Some(history)) = (series.volumes.get(at), series.volumes.get(from..at))
        else {
            return 0.5;
        };
        if history.is_empty() {
            return 0.5;
        }
        let mean = history.iter().sum::<f64>() / history.len() as f64;
        if mean <= 0.0 || !mean.is_finite() || !volume.is_finite() {
            return 0.5;
        }
        (volume / mean / 2.0).clamp(0.0, 1.0)
    }
}

/// 1.0 for usable levels, 0.5 when target and stop do not straddle entry
fn completeness(candidate: &PatternCandidate) -> f64 {
    let levels = &candidate.key_levels;
    if !levels.is_finite() {
        0.0
    } else if levels.is_consistent() {
        1.0
    } else {
        0.5
    }
}

/// Reversals want the prior trend against their signal, continuations want it along.
pub fn trend_alignment(family: PatternFamily, signal: Signal, prior: Trend) -> f64 {
    let wants_up = match (family, signal) {
        (PatternFamily::Bilateral, _) | (_, Signal::Neutral) => return 0.5,
        (PatternFamily::Reversal, s) => s.is_bearish(),
        (PatternFamily::Continuation, s) => s.is_bullish(),
    };
    let strength = match prior {
        Trend::StrongUp => 2,
        Trend::WeakUp => 1,
        Trend::Sideways => 0,
        Trend::WeakDown => -1,
        Trend::StrongDown => -2,
    };
    let aligned = if wants_up { strength } else { -strength };
    0.5 + 0.25 * f64::from(aligned)
}

#[inline]
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_CONFIDENCE)
    }
}

#[inline]
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
