//! Cross-timeframe confirmation.
//!
//! Per-timeframe results are handed in as plain [`TimeframePatternSet`]s. The aggregator orders
//! them longest first, looks for the same formation at the same price levels and over the
//! same stretch of time on shorter timeframes, and boosts confidence for each confirmation.

use std::{collections::HashSet, fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::AggregationMode,
    scoring::clamp_confidence,
    PatternError, Result, ScoredPattern,
};

// ============================================================
// CONFIDENCE MULTIPLIERS
// ============================================================

/// Confirmed on two timeframes
pub const TWO_TIMEFRAME_MULTIPLIER: f64 = 1.4;
/// Confirmed on three or more
pub const MULTI_TIMEFRAME_MULTIPLIER: f64 = 1.8;
/// Every member saw the same prior trend direction
pub const TREND_ALIGNMENT_BONUS: f64 = 1.2;
/// Every member scored above-average breakout volume
pub const VOLUME_CONFIRMATION_BONUS: f64 = 1.15;

// ============================================================
// TIMEFRAME LABELS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Unit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl Unit {
    fn minutes(self) -> u64 {
        match self {
            Unit::Minute => 1,
            Unit::Hour => 60,
            Unit::Day => 24 * 60,
            Unit::Week => 7 * 24 * 60,
            // approximation
            Unit::Month => 30 * 24 * 60,
        }
    }

    fn suffix(self) -> char {
        match self {
            Unit::Minute => 'm',
            Unit::Hour => 'h',
            Unit::Day => 'd',
            Unit::Week => 'w',
            Unit::Month => 'M',
        }
    }
}

/// Bar interval parsed from labels like `"15m"`, `"4h"`, `"1d"`, `"1w"` or `"1M"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    count: u32,
    unit: Unit,
}

impl Timeframe {
    pub fn parse(label: &str) -> Result<Self> {
        label.parse()
    }

    pub fn minutes(&self) -> u64 {
        u64::from(self.count) * self.unit.minutes()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.minutes() * 60)
    }
}

impl FromStr for Timeframe {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || PatternError::UnknownTimeframe(s.to_string());
        let mut chars = s.chars();
        let unit = match chars.next_back().ok_or_else(unknown)? {
            'm' => Unit::Minute,
            'h' => Unit::Hour,
            'd' => Unit::Day,
            'w' => Unit::Week,
            'M' => Unit::Month,
            _ => return Err(unknown()),
        };
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unknown());
        }
        let count: u32 = digits.parse().map_err(|_| unknown())?;
        if count == 0 {
            return Err(unknown());
        }
        Ok(Self { count, unit })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

// ============================================================
// RECORDS
// ============================================================

/// Scored formations of one timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframePatternSet {
    pub timeframe: String,
    /// Length of the analysed series, used to place formations without timestamps
    pub bar_count: usize,
    pub patterns: Vec<ScoredPattern>,
}

/// A formation from its primary timeframe together with the timeframes that confirm it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframePattern {
    pub pattern: ScoredPattern,
    pub primary_timeframe: String,
    /// Primary first, then confirming timeframes from longest to shortest
    pub detected_on_timeframes: Vec<String>,
    pub confirmation_level: usize,
    /// Single-timeframe confidence before any boost
    pub base_confidence: f64,
    /// Mean geometric agreement of the confirmations, 0.0 without any
    pub alignment_score: f64,
    pub confidence: f64,
}

impl MultiTimeframePattern {
    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.confirmation_level > 1
    }
}

// ============================================================
// CORRESPONDENCE
// ============================================================

/// Span of a formation on a shared axis: timestamps when available, else series fraction
fn time_span(p: &ScoredPattern, bar_count: usize) -> (f64, f64) {
    let n = bar_count.max(1) as f64;
    (
        p.start_index() as f64 / n,
        (p.end_index() + 1) as f64 / n,
    )
}

fn spans(a: &ScoredPattern, a_bars: usize, b: &ScoredPattern, b_bars: usize) -> [(f64, f64); 2] {
    match (a.start_time, a.end_time, b.start_time, b.end_time) {
        (Some(a0), Some(a1), Some(b0), Some(b1)) => {
            [(a0 as f64, a1 as f64), (b0 as f64, b1 as f64)]
        }
        _ => [time_span(a, a_bars), time_span(b, b_bars)],
    }
}

/// Share of the shorter span covered by the intersection, `None` when disjoint.
///
/// Spans that only touch share no bar. A zero-length span counts as fully covered when it
/// lies within the other one.
fn overlap_ratio(a: (f64, f64), b: (f64, f64)) -> Option<f64> {
    let lo = a.0.max(b.0);
    let hi = a.1.min(b.1);
    let shorter = (a.1 - a.0).min(b.1 - b.0);
    if shorter <= 0.0 {
        return (hi >= lo).then_some(1.0);
    }
    if hi <= lo {
        return None;
    }
    Some(((hi - lo) / shorter).clamp(0.0, 1.0))
}

fn relative_diff(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

// ============================================================
// AGGREGATOR
// ============================================================

/// Combines per-timeframe results into cross-timeframe records.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTimeframeAggregator {
    mode: AggregationMode,
    level_tolerance: f64,
    primary_timeframe: Option<String>,
}

struct Ranked<'a> {
    label: &'a str,
    set: &'a TimeframePatternSet,
}

impl MultiTimeframeAggregator {
    pub fn new(mode: AggregationMode, level_tolerance: f64) -> Self {
        Self {
            mode,
            level_tolerance,
            primary_timeframe: None,
        }
    }

    /// Top-down primary; the longest supplied timeframe when `None`
    pub fn with_primary(mut self, label: Option<String>) -> Self {
        self.primary_timeframe = label;
        self
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    /// Alignment of `lower` with `primary` in [0, 1], or `None` when they do not correspond
    pub fn alignment(
        &self,
        primary: &ScoredPattern,
        primary_bars: usize,
        lower: &ScoredPattern,
        lower_bars: usize,
    ) -> Option<f64> {
        if primary.pattern_type() != lower.pattern_type() {
            return None;
        }
        let (p, q) = (primary.key_levels(), lower.key_levels());
        let entry = relative_diff(p.entry, q.entry);
        let stop = relative_diff(p.stop, q.stop);
        if !(entry <= self.level_tolerance && stop <= self.level_tolerance) {
            return None;
        }
        let [a, b] = spans(primary, primary_bars, lower, lower_bars);
        let overlap = overlap_ratio(a, b)?;

        let level_score = 1.0 - (entry + stop) / 2.0 / self.level_tolerance;
        Some(0.5 * level_score.clamp(0.0, 1.0) + 0.5 * overlap)
    }

    pub fn aggregate(&self, sets: &[TimeframePatternSet]) -> Result<Vec<MultiTimeframePattern>> {
        if !self.level_tolerance.is_finite() || self.level_tolerance <= 0.0 {
            return Err(PatternError::OutOfRange {
                field: "level_tolerance",
                value: self.level_tolerance,
                min: 0.0,
                max: 1.0,
            });
        }
        let ranked = rank_sets(sets)?;
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let out = match self.mode {
            AggregationMode::TopDown => self.top_down(&ranked)?,
            AggregationMode::MultiTimeframeDiscovery => self.discovery(&ranked),
        };
        debug!(
            timeframes = ranked.len(),
            patterns = out.len(),
            confirmed = out.iter().filter(|p| p.is_confirmed()).count(),
            "timeframes aggregated"
        );
        Ok(out)
    }

    fn top_down(&self, ranked: &[Ranked<'_>]) -> Result<Vec<MultiTimeframePattern>> {
        let primary_pos = match &self.primary_timeframe {
            Some(label) => ranked
                .iter()
                .position(|r| r.label == label.as_str())
                .ok_or_else(|| {
                    PatternError::InvalidConfig(format!(
                        "primary timeframe {label} is not among the inputs"
                    ))
                })?,
            None => 0,
        };
        let primary = &ranked[primary_pos];
        let lower = &ranked[primary_pos + 1..];

        Ok(primary
            .set
            .patterns
            .iter()
            .map(|p| {
                let confirmations: Vec<(&str, &ScoredPattern, f64)> = lower
                    .iter()
                    .filter_map(|r| {
                        self.best_match(p, primary.set.bar_count, r.set, |_| true)
                            .map(|(_, q, score)| (r.label, q, score))
                    })
                    .collect();
                merge(primary.label, p, &confirmations)
            })
            .collect())
    }

    fn discovery(&self, ranked: &[Ranked<'_>]) -> Vec<MultiTimeframePattern> {
        let mut consumed: HashSet<(usize, usize)> = HashSet::new();
        let mut out = Vec::new();

        for (si, primary) in ranked.iter().enumerate() {
            for (pi, p) in primary.set.patterns.iter().enumerate() {
                if consumed.contains(&(si, pi)) {
                    continue;
                }
                let mut confirmations = Vec::new();
                for (sj, r) in ranked.iter().enumerate().skip(si + 1) {
                    let found = self.best_match(p, primary.set.bar_count, r.set, |qi| {
                        !consumed.contains(&(sj, qi))
                    });
                    if let Some((_, q, score)) = found {
                        // every corresponding formation is the same match seen again
                        for (qi, other) in r.set.patterns.iter().enumerate() {
                            let same = self
                                .alignment(p, primary.set.bar_count, other, r.set.bar_count)
                                .is_some();
                            if same {
                                consumed.insert((sj, qi));
                            }
                        }
                        confirmations.push((r.label, q, score));
                    }
                }
                out.push(merge(primary.label, p, &confirmations));
            }
        }
        out
    }

    /// Best corresponding formation of `set`: highest alignment, then confidence, then earliest
    fn best_match<'s>(
        &self,
        primary: &ScoredPattern,
        primary_bars: usize,
        set: &'s TimeframePatternSet,
        available: impl Fn(usize) -> bool,
    ) -> Option<(usize, &'s ScoredPattern, f64)> {
        let mut best: Option<(usize, &ScoredPattern, f64)> = None;
        for (qi, q) in set.patterns.iter().enumerate() {
            if !available(qi) {
                continue;
            }
            let Some(score) = self.alignment(primary, primary_bars, q, set.bar_count) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((_, b, b_score)) => {
                    score > b_score || (score == b_score && q.confidence > b.confidence)
                }
            };
            if better {
                best = Some((qi, q, score));
            }
        }
        best
    }
}

/// Validate labels and order sets from longest to shortest timeframe
fn rank_sets(sets: &[TimeframePatternSet]) -> Result<Vec<Ranked<'_>>> {
    let mut seen = HashSet::new();
    let mut ranked = Vec::with_capacity(sets.len());
    for set in sets {
        let tf = Timeframe::parse(&set.timeframe)?;
        if !seen.insert(set.timeframe.as_str()) {
            return Err(PatternError::InvalidConfig(format!(
                "duplicate timeframe {}",
                set.timeframe
            )));
        }
        ranked.push((tf.minutes(), Ranked {
            label: set.timeframe.as_str(),
            set,
        }));
    }
    ranked.sort_by(|(a, ra), (b, rb)| b.cmp(a).then_with(|| ra.label.cmp(rb.label)));
    Ok(ranked.into_iter().map(|(_, r)| r).collect())
}

fn multiplier(level: usize) -> f64 {
    match level {
        0 | 1 => 1.0,
        2 => TWO_TIMEFRAME_MULTIPLIER,
        _ => MULTI_TIMEFRAME_MULTIPLIER,
    }
}

/// Confidence of `base` confirmed by `members` (primary included)
fn boosted(base: f64, members: &[&ScoredPattern]) -> f64 {
    if members.len() < 2 {
        return base;
    }
    let mut confidence = base * multiplier(members.len());
    let all_up = members.iter().all(|m| m.prior_trend.is_up());
    let all_down = members.iter().all(|m| m.prior_trend.is_down());
    if all_up || all_down {
        confidence *= TREND_ALIGNMENT_BONUS;
    }
    if members.iter().all(|m| m.candidate.volume_score > 0.5) {
        confidence *= VOLUME_CONFIRMATION_BONUS;
    }
    confidence
}

fn merge(
    primary_label: &str,
    primary: &ScoredPattern,
    confirmations: &[(&str, &ScoredPattern, f64)],
) -> MultiTimeframePattern {
    let base = primary.confidence;
    let mut members = vec![primary];
    let mut labels = vec![primary_label.to_string()];
    let mut confidence = base;

    for (label, q, _) in confirmations {
        members.push(*q);
        labels.push((*label).to_string());
        confidence = confidence.max(boosted(base, &members));
    }

    let alignment_score = if confirmations.is_empty() {
        0.0
    } else {
        confirmations.iter().map(|(_, _, s)| s).sum::<f64>() / confirmations.len() as f64
    };

    MultiTimeframePattern {
        pattern: primary.clone(),
        primary_timeframe: primary_label.to_string(),
        confirmation_level: labels.len(),
        detected_on_timeframes: labels,
        base_confidence: base,
        alignment_score,
        confidence: clamp_confidence(confidence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scoring::MAX_CONFIDENCE, KeyLevels, PatternCandidate, PatternType, Signal, Trend};

    fn pattern(
        pattern_type: PatternType,
        span: (usize, usize),
        entry: f64,
        stop: f64,
        confidence: f64,
    ) -> ScoredPattern {
        ScoredPattern {
            candidate: PatternCandidate::new(
                pattern_type,
                Signal::Bearish,
                span.0,
                span.1,
                KeyLevels::new(entry, entry - 10.0, stop),
            ),
            quality_score: 0.5,
            confidence,
            prior_trend: Trend::Sideways,
            start_time: None,
            end_time: None,
        }
    }

    fn set(label: &str, patterns: Vec<ScoredPattern>) -> TimeframePatternSet {
        TimeframePatternSet {
            timeframe: label.to_string(),
            bar_count: 200,
            patterns,
        }
    }

    fn top_down() -> MultiTimeframeAggregator {
        MultiTimeframeAggregator::new(AggregationMode::TopDown, 0.02)
    }

    #[test]
    fn test_parse_timeframes() {
        assert_eq!(Timeframe::parse("15m").unwrap().minutes(), 15);
        assert_eq!(Timeframe::parse("4h").unwrap().minutes(), 240);
        assert_eq!(Timeframe::parse("1d").unwrap().minutes(), 1440);
        assert_eq!(Timeframe::parse("1w").unwrap().minutes(), 10080);
        assert_eq!(Timeframe::parse("1M").unwrap().minutes(), 43200);
        assert_eq!(Timeframe::parse("4h").unwrap().to_string(), "4h");
        assert_eq!(Timeframe::parse("2d").unwrap().duration(), Duration::from_secs(2 * 86400));

        for bad in ["", "h", "0h", "4x", "-1d", "1.5h", "fortnight", " 1d"] {
            assert!(
                matches!(Timeframe::parse(bad), Err(PatternError::UnknownTimeframe(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_top_down_confirmation() {
        let sets = [
            set("4h", vec![pattern(PatternType::DoubleTop, (40, 120), 100.5, 110.0, 0.5)]),
            set("1d", vec![pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.6)]),
        ];
        let out = top_down().aggregate(&sets).unwrap();
        assert_eq!(out.len(), 1);

        let m = &out[0];
        assert_eq!(m.primary_timeframe, "1d");
        assert_eq!(m.detected_on_timeframes, vec!["1d", "4h"]);
        assert_eq!(m.confirmation_level, 2);
        assert_eq!(m.base_confidence, 0.6);
        assert!((m.confidence - 0.6 * TWO_TIMEFRAME_MULTIPLIER).abs() < 1e-12);
        // entry off by 0.5 % of a 2 % tolerance, identical stop, full overlap
        let expected = 0.5 * (1.0 - (0.5 / 100.5) / 2.0 / 0.02) + 0.5;
        assert!((m.alignment_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_no_correspondence_outside_tolerance() {
        let sets = [
            set("1d", vec![pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.6)]),
            // levels too far apart
            set("4h", vec![pattern(PatternType::DoubleTop, (40, 120), 105.0, 110.0, 0.6)]),
            // wrong type
            set("1h", vec![pattern(PatternType::DoubleBottom, (40, 120), 100.0, 110.0, 0.6)]),
            // disjoint in time
            set("15m", vec![pattern(PatternType::DoubleTop, (150, 190), 100.0, 110.0, 0.6)]),
        ];
        let out = top_down().aggregate(&sets).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confirmation_level, 1);
        assert_eq!(out[0].confidence, 0.6);
        assert_eq!(out[0].alignment_score, 0.0);
    }

    #[test]
    fn test_three_timeframes_with_bonuses() {
        let mut strong = pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.3);
        strong.prior_trend = Trend::StrongUp;
        strong.candidate.volume_score = 0.8;
        let sets = [
            set("1d", vec![strong.clone()]),
            set("4h", vec![strong.clone()]),
            set("1h", vec![strong]),
        ];
        let out = top_down().aggregate(&sets).unwrap();
        let m = &out[0];
        assert_eq!(m.confirmation_level, 3);
        let expected = 0.3 * MULTI_TIMEFRAME_MULTIPLIER * TREND_ALIGNMENT_BONUS * VOLUME_CONFIRMATION_BONUS;
        assert!((m.confidence - expected).abs() < 1e-12);
        assert_eq!(m.alignment_score, 1.0);
    }

    #[test]
    fn test_confidence_is_capped() {
        let sets = [
            set("1d", vec![pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.9)]),
            set("4h", vec![pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.9)]),
        ];
        let out = top_down().aggregate(&sets).unwrap();
        assert_eq!(out[0].confidence, MAX_CONFIDENCE);
    }

    #[test]
    fn test_explicit_primary() {
        let sets = [
            set("1d", vec![pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.6)]),
            set("4h", vec![pattern(PatternType::TripleTop, (40, 120), 100.0, 110.0, 0.5)]),
        ];
        let out = top_down()
            .with_primary(Some("4h".into()))
            .aggregate(&sets)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].primary_timeframe, "4h");

        let missing = top_down().with_primary(Some("1w".into())).aggregate(&sets);
        assert!(matches!(missing, Err(PatternError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_sets() {
        let dup = [set("1d", vec![]), set("1d", vec![])];
        assert!(matches!(top_down().aggregate(&dup), Err(PatternError::InvalidConfig(_))));

        let unknown = [set("daily", vec![])];
        assert!(matches!(
            top_down().aggregate(&unknown),
            Err(PatternError::UnknownTimeframe(_))
        ));
        assert!(top_down().aggregate(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_discovery_consumes_confirmations() {
        let sets = [
            set(
                "4h",
                vec![
                    pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.5),
                    pattern(PatternType::Rectangle, (130, 180), 90.0, 80.0, 0.4),
                ],
            ),
            set("1d", vec![pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.6)]),
        ];
        let discovery = MultiTimeframeAggregator::new(AggregationMode::MultiTimeframeDiscovery, 0.02);
        let out = discovery.aggregate(&sets).unwrap();

        let summary: Vec<(&str, &str, usize)> = out
            .iter()
            .map(|m| (m.primary_timeframe.as_str(), m.pattern.label(), m.confirmation_level))
            .collect();
        assert_eq!(summary, vec![("1d", "double_top", 2), ("4h", "rectangle", 1)]);

        // top-down only reports the primary timeframe
        assert_eq!(top_down().aggregate(&sets).unwrap().len(), 1);
    }

    #[test]
    fn test_discovery_consumes_every_corresponding_match() {
        let sets = [
            set("1d", vec![pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.6)]),
            set(
                "4h",
                vec![
                    pattern(PatternType::DoubleTop, (40, 79), 100.0, 110.0, 0.5),
                    pattern(PatternType::DoubleTop, (80, 120), 100.0, 110.0, 0.5),
                ],
            ),
        ];
        let discovery = MultiTimeframeAggregator::new(AggregationMode::MultiTimeframeDiscovery, 0.02);
        assert_eq!(discovery.mode(), AggregationMode::MultiTimeframeDiscovery);
        let out = discovery.aggregate(&sets).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].primary_timeframe, "1d");
        assert_eq!(out[0].confirmation_level, 2);
        assert!(out.iter().all(|m| m.primary_timeframe != "4h"));
    }

    #[test]
    fn test_adjacent_spans_do_not_confirm() {
        let sets = [
            set("1d", vec![pattern(PatternType::DoubleTop, (40, 120), 100.0, 110.0, 0.6)]),
            set("4h", vec![pattern(PatternType::DoubleTop, (121, 150), 100.0, 110.0, 0.6)]),
        ];
        assert_eq!(top_down().mode(), AggregationMode::TopDown);
        let out = top_down().aggregate(&sets).unwrap();
        assert_eq!(out[0].confirmation_level, 1);
        assert_eq!(out[0].confidence, 0.6);

        // timestamps that meet at a single instant
        let mut daily = pattern(PatternType::DoubleTop, (10, 30), 100.0, 110.0, 0.6);
        daily.start_time = Some(0);
        daily.end_time = Some(20 * 86_400);
        let mut intraday = daily.clone();
        intraday.start_time = Some(20 * 86_400);
        intraday.end_time = Some(25 * 86_400);
        let sets = [set("1d", vec![daily]), set("4h", vec![intraday])];
        assert_eq!(top_down().aggregate(&sets).unwrap()[0].confirmation_level, 1);

        // a single-instant formation inside the primary still corresponds
        assert_eq!(overlap_ratio((0.0, 10.0), (4.0, 4.0)), Some(1.0));
        assert_eq!(overlap_ratio((0.0, 10.0), (10.0, 12.0)), None);
    }

    #[test]
    fn test_timestamps_take_precedence() {
        let mut daily = pattern(PatternType::DoubleTop, (10, 30), 100.0, 110.0, 0.6);
        daily.start_time = Some(0);
        daily.end_time = Some(20 * 86_400);
        // same fractional position, different wall-clock time
        let mut intraday = pattern(PatternType::DoubleTop, (10, 30), 100.0, 110.0, 0.6);
        intraday.start_time = Some(40 * 86_400);
        intraday.end_time = Some(41 * 86_400);

        let sets = [set("1d", vec![daily.clone()]), set("4h", vec![intraday.clone()])];
        assert_eq!(top_down().aggregate(&sets).unwrap()[0].confirmation_level, 1);

        intraday.start_time = Some(5 * 86_400);
        intraday.end_time = Some(6 * 86_400);
        let sets = [set("1d", vec![daily]), set("4h", vec![intraday])];
        assert_eq!(top_down().aggregate(&sets).unwrap()[0].confirmation_level, 2);
    }
}
