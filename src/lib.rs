//! # chartform - chart formation recognition
//!
//! Detects multi-bar chart formations (head & shoulders, double/triple tops and bottoms,
//! triangles, flags and pennants, wedges, channels, rectangles, broadening formations and
//! diamonds) in OHLCV series, scores them, and cross-checks them across timeframes.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartform::prelude::*;
//!
//! // Define your OHLCV data
//! struct Candle { o: f64, h: f64, l: f64, c: f64, v: f64 }
//!
//! impl OHLCV for Candle {
//!     fn open(&self) -> f64 { self.o }
//!     fn high(&self) -> f64 { self.h }
//!     fn low(&self) -> f64 { self.l }
//!     fn close(&self) -> f64 { self.c }
//!     fn volume(&self) -> f64 { self.v }
//! }
//!
//! // Create engine with every builtin matcher
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! // Detect formations
//! let bars: Vec<Candle> = vec![];
//! let patterns = engine.detect(&bars).unwrap();
//! assert!(patterns.is_empty());
//! ```

pub mod config;
pub mod extrema;
pub mod matchers;
pub mod overlap;
pub mod scoring;
pub mod swing;
pub mod timeframe;
pub mod trendline;
pub mod volatility;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::{AggregationMode, DetectionConfig, ParamMeta, ParamType, ParameterizedMatcher},
        // Pipeline stages
        extrema::{ExtremaExtractor, Extremum, ExtremumKind},
        // Matchers
        matchers::*,
        overlap::OverlapResolver,
        // Parallel
        scan_parallel,
        scoring::QualityScorer,
        swing::SwingFilter,
        timeframe::{MultiTimeframeAggregator, MultiTimeframePattern, Timeframe, TimeframePatternSet},
        trendline::{fit_line, Trendline},
        volatility::{AtrVolatility, VolatilityEstimator},
        Analysis,
        Bar,
        // Engine
        BuiltinMatcher,
        DefaultEngine,
        EngineBuilder,
        KeyLevels,
        MatchContext,
        OHLCVExt,
        PatternCandidate,
        PatternEngine,
        // Errors
        PatternError,
        PatternFamily,
        // Core traits
        PatternMatcher,
        // Types
        PatternType,
        Period,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        ScoredPattern,
        Series,
        Signal,
        Trend,
        OHLCV,
    };
}

use std::{fmt, str::FromStr};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::DetectionConfig,
    extrema::{ExtremaExtractor, Extremum},
    overlap::OverlapResolver,
    scoring::QualityScorer,
    swing::SwingFilter,
    timeframe::{MultiTimeframeAggregator, MultiTimeframePattern, Timeframe, TimeframePatternSet},
    trendline::Trendline,
    volatility::{mean_over, AtrVolatility, VolatilityEstimator},
};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during configuration or detection
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown pattern type: {0}")]
    UnknownPatternType(String),

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Bar time (any monotonic unit, e.g. unix seconds)
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Range extended to the previous close when the bar gaps away from it
    #[inline]
    fn true_range(&self, prev_close: f64) -> f64 {
        self.range()
            .max((self.high() - prev_close).abs())
            .max((self.low() - prev_close).abs())
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
            || self.volume().is_nan()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
            || self.volume().is_infinite()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Plain serializable bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

/// Columnar copy of a bar slice, indexed like the original bars
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
    pub timestamps: Vec<Option<i64>>,
}

impl Series {
    pub fn from_bars<T: OHLCV>(bars: &[T]) -> Self {
        let mut series = Self {
            highs: Vec::with_capacity(bars.len()),
            lows: Vec::with_capacity(bars.len()),
            closes: Vec::with_capacity(bars.len()),
            volumes: Vec::with_capacity(bars.len()),
            timestamps: Vec::with_capacity(bars.len()),
        };
        for bar in bars {
            series.highs.push(bar.high());
            series.lows.push(bar.low());
            series.closes.push(bar.close());
            series.volumes.push(bar.volume());
            series.timestamps.push(bar.timestamp());
        }
        series
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    #[inline]
    pub fn timestamp(&self, index: usize) -> Option<i64> {
        self.timestamps.get(index).copied().flatten()
    }
}

// ============================================================
// PATTERN TYPES
// ============================================================

/// Expected direction of the move out of a formation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl Signal {
    #[inline]
    pub fn is_bullish(self) -> bool {
        self == Signal::Bullish
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        self == Signal::Bearish
    }
}

/// Market trend classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StrongUp,
    WeakUp,
    #[default]
    Sideways,
    WeakDown,
    StrongDown,
}

impl Trend {
    /// Classify a relative price change (±2% weak, ±5% strong)
    pub fn from_change(change: f64) -> Self {
        match change {
            c if c > 0.05 => Trend::StrongUp,
            c if c > 0.02 => Trend::WeakUp,
            c if c < -0.05 => Trend::StrongDown,
            c if c < -0.02 => Trend::WeakDown,
            _ => Trend::Sideways,
        }
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Trend::WeakDown | Trend::StrongDown)
    }

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Trend::WeakUp | Trend::StrongUp)
    }
}

/// How a formation relates to the trend that precedes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFamily {
    Reversal,
    Continuation,
    /// Breaks either way
    Bilateral,
}

macro_rules! define_pattern_types {
    ($($variant:ident => $label:literal),* $(,)?) => {
        /// Chart formation catalogue
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum PatternType {
            $($variant),*
        }

        impl PatternType {
            pub const ALL: &'static [PatternType] = &[$(PatternType::$variant),*];

            /// Stable snake_case label, identical to the serde representation
            pub fn as_str(self) -> &'static str {
                match self {
                    $(PatternType::$variant => $label),*
                }
            }
        }

        impl FromStr for PatternType {
            type Err = PatternError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($label => Ok(PatternType::$variant),)*
                    other => Err(PatternError::UnknownPatternType(other.to_string())),
                }
            }
        }
    };
}

define_pattern_types! {
    HeadAndShoulders => "head_and_shoulders",
    InverseHeadAndShoulders => "inverse_head_and_shoulders",
    DoubleTop => "double_top",
    DoubleBottom => "double_bottom",
    TripleTop => "triple_top",
    TripleBottom => "triple_bottom",
    AscendingTriangle => "ascending_triangle",
    DescendingTriangle => "descending_triangle",
    SymmetricalTriangle => "symmetrical_triangle",
    BullFlag => "bull_flag",
    BearFlag => "bear_flag",
    BullPennant => "bull_pennant",
    BearPennant => "bear_pennant",
    RisingWedge => "rising_wedge",
    FallingWedge => "falling_wedge",
    RoundingTop => "rounding_top",
    RoundingBottom => "rounding_bottom",
    AscendingChannel => "ascending_channel",
    DescendingChannel => "descending_channel",
    HorizontalChannel => "horizontal_channel",
    Rectangle => "rectangle",
    BroadeningFormation => "broadening_formation",
    DiamondTop => "diamond_top",
    DiamondBottom => "diamond_bottom",
}

impl PatternType {
    /// Direction the formation usually resolves in
    pub fn typical_signal(self) -> Signal {
        use PatternType::*;
        match self {
            HeadAndShoulders | DoubleTop | TripleTop | DescendingTriangle | BearFlag
            | BearPennant | RisingWedge | RoundingTop | DescendingChannel | DiamondTop => {
                Signal::Bearish
            }
            InverseHeadAndShoulders | DoubleBottom | TripleBottom | AscendingTriangle
            | BullFlag | BullPennant | FallingWedge | RoundingBottom | AscendingChannel
            | DiamondBottom => Signal::Bullish,
            SymmetricalTriangle | HorizontalChannel | Rectangle | BroadeningFormation => {
                Signal::Neutral
            }
        }
    }

    pub fn family(self) -> PatternFamily {
        use PatternType::*;
        match self {
            HeadAndShoulders | InverseHeadAndShoulders | DoubleTop | DoubleBottom | TripleTop
            | TripleBottom | RisingWedge | FallingWedge | RoundingTop | RoundingBottom
            | DiamondTop | DiamondBottom => PatternFamily::Reversal,
            AscendingTriangle | DescendingTriangle | SymmetricalTriangle | BullFlag | BearFlag
            | BullPennant | BearPennant | AscendingChannel | DescendingChannel
            | HorizontalChannel | Rectangle => PatternFamily::Continuation,
            BroadeningFormation => PatternFamily::Bilateral,
        }
    }

    /// Weight of trendline fit in the quality score
    pub fn fit_weight(self) -> f64 {
        use PatternType::*;
        match self {
            HeadAndShoulders | InverseHeadAndShoulders | DoubleTop | DoubleBottom | TripleTop
            | TripleBottom => 0.25,
            RoundingTop | RoundingBottom => 0.30,
            _ => 0.35,
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// CANDIDATES & SCORED PATTERNS
// ============================================================

/// Trade levels derived from a formation's geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyLevels {
    /// Breakout level
    pub entry: f64,
    /// Measured-move objective
    pub target: f64,
    /// Invalidation level
    pub stop: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neckline: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resistance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<f64>,
}

impl KeyLevels {
    pub fn new(entry: f64, target: f64, stop: f64) -> Self {
        Self {
            entry,
            target,
            stop,
            neckline: None,
            resistance: None,
            support: None,
        }
    }

    pub fn with_neckline(mut self, level: f64) -> Self {
        self.neckline = Some(level);
        self
    }

    pub fn with_resistance(mut self, level: f64) -> Self {
        self.resistance = Some(level);
        self
    }

    pub fn with_support(mut self, level: f64) -> Self {
        self.support = Some(level);
        self
    }

    pub fn is_finite(&self) -> bool {
        [self.entry, self.target, self.stop]
            .into_iter()
            .chain(self.neckline)
            .chain(self.resistance)
            .chain(self.support)
            .all(f64::is_finite)
    }

    /// Target and stop sit on opposite sides of entry
    pub fn is_consistent(&self) -> bool {
        (self.target - self.entry) * (self.stop - self.entry) < 0.0
    }
}

/// One formation found by a matcher, before scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCandidate {
    pub pattern_type: PatternType,
    pub signal: Signal,
    pub start_index: usize,
    pub end_index: usize,
    pub trendlines: Vec<Trendline>,
    pub key_levels: KeyLevels,
    pub base_confidence: f64,
    pub r_squared: f64,
    pub symmetry_score: f64,
    pub volume_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakout_index: Option<usize>,
}

impl PatternCandidate {
    pub fn new(
        pattern_type: PatternType,
        signal: Signal,
        start_index: usize,
        end_index: usize,
        key_levels: KeyLevels,
    ) -> Self {
        Self {
            pattern_type,
            signal,
            start_index,
            end_index,
            trendlines: Vec::new(),
            key_levels,
            base_confidence: 0.5,
            r_squared: 0.0,
            symmetry_score: 0.5,
            volume_score: 0.5,
            breakout_index: None,
        }
    }

    /// Attach boundary lines; `r_squared` becomes their mean
    pub fn with_trendlines(mut self, trendlines: Vec<Trendline>) -> Self {
        if let Some(r2) = mean_r_squared(&trendlines) {
            self.r_squared = r2;
        }
        self.trendlines = trendlines;
        self
    }

    pub fn with_r_squared(mut self, r_squared: f64) -> Self {
        self.r_squared = r_squared.clamp(0.0, 1.0);
        self
    }

    pub fn with_base_confidence(mut self, confidence: Ratio) -> Self {
        self.base_confidence = confidence.get();
        self
    }

    pub fn with_symmetry(mut self, score: f64) -> Self {
        self.symmetry_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn with_breakout(mut self, index: Option<usize>) -> Self {
        self.breakout_index = index;
        self
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.pattern_type.as_str()
    }

    #[inline]
    pub fn span(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }
}

/// Mean r² of a set of lines, `None` when empty
pub fn mean_r_squared(trendlines: &[Trendline]) -> Option<f64> {
    (!trendlines.is_empty())
        .then(|| trendlines.iter().map(|t| t.r_squared).sum::<f64>() / trendlines.len() as f64)
}

/// Candidate plus quality and final confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPattern {
    #[serde(flatten)]
    pub candidate: PatternCandidate,
    pub quality_score: f64,
    /// `base_confidence` adjusted by quality, at most 0.99
    pub confidence: f64,
    pub prior_trend: Trend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl ScoredPattern {
    #[inline]
    pub fn pattern_type(&self) -> PatternType {
        self.candidate.pattern_type
    }

    #[inline]
    pub fn signal(&self) -> Signal {
        self.candidate.signal
    }

    #[inline]
    pub fn start_index(&self) -> usize {
        self.candidate.start_index
    }

    #[inline]
    pub fn end_index(&self) -> usize {
        self.candidate.end_index
    }

    #[inline]
    pub fn key_levels(&self) -> &KeyLevels {
        &self.candidate.key_levels
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.candidate.label()
    }
}

// ============================================================
// PATTERN MATCHER TRAIT
// ============================================================

/// Everything a matcher may look at for one series
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub series: &'a Series,
    pub volatility: &'a [f64],
    pub extrema: &'a [Extremum],
    pub proximity_factor: f64,
    pub min_r_squared: f64,
}

impl<'a> MatchContext<'a> {
    #[inline]
    pub fn closes(&self) -> &'a [f64] {
        &self.series.closes
    }

    pub fn mean_volatility(&self, start: usize, end: usize) -> f64 {
        mean_over(self.volatility, start, end)
    }

    /// Price distance treated as "the same level" over `start..=end`
    pub fn tolerance(&self, start: usize, end: usize) -> f64 {
        self.proximity_factor * self.mean_volatility(start, end)
    }

    #[inline]
    pub fn is_sufficient(&self, min_extrema: usize) -> bool {
        self.extrema.len() >= min_extrema
    }
}

/// Formation matcher. Object safe, so custom matchers can be boxed next to the builtin table.
pub trait PatternMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Formation types this matcher can emit
    fn pattern_types(&self) -> &'static [PatternType];

    /// Fewest extrema the matcher can work with
    fn min_extrema(&self) -> usize;

    fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN MATCHERS - generated via macro
// ============================================================

use matchers::*;

/// Macro to generate BuiltinMatcher enum without boilerplate
macro_rules! define_builtin_matchers {
    (
        $(
            $variant:ident($matcher:ty)
        ),* $(,)?
    ) => {
        /// All builtin matchers - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinMatcher {
            $($variant($matcher)),*
        }

        impl BuiltinMatcher {
            /// Runs the matcher; too few extrema yields nothing
            #[inline]
            pub fn detect(&self, ctx: &MatchContext<'_>) -> Vec<PatternCandidate> {
                if !ctx.is_sufficient(self.min_extrema()) {
                    return Vec::new();
                }
                match self {
                    $(Self::$variant(m) => PatternMatcher::detect(m, ctx)),*
                }
            }

            #[inline]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(m) => PatternMatcher::name(m)),*
                }
            }

            pub fn pattern_types(&self) -> &'static [PatternType] {
                match self {
                    $(Self::$variant(m) => PatternMatcher::pattern_types(m)),*
                }
            }

            #[inline]
            pub fn min_extrema(&self) -> usize {
                match self {
                    $(Self::$variant(m) => PatternMatcher::min_extrema(m)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(m) => PatternMatcher::validate_config(m)),*
                }
            }
        }

        $(
            impl From<$matcher> for BuiltinMatcher {
                fn from(m: $matcher) -> Self {
                    Self::$variant(m)
                }
            }
        )*
    };
}

define_builtin_matchers! {
    // Reversal
    HeadAndShoulders(HeadAndShouldersMatcher),
    DoubleTopBottom(DoubleTopBottomMatcher),
    TripleTopBottom(TripleTopBottomMatcher),
    Rounding(RoundingMatcher),

    // Continuation
    Triangle(TriangleMatcher),
    FlagPennant(FlagPennantMatcher),
    Wedge(WedgeMatcher),
    Channel(ChannelMatcher),
    Rectangle(RectangleMatcher),

    // Broadening
    Broadening(BroadeningMatcher),
    Diamond(DiamondMatcher),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Intermediate products of one series: volatility and extrema
#[derive(Debug, Clone)]
pub struct Analysis {
    pub series: Series,
    pub volatility: Vec<f64>,
    pub extrema: Vec<Extremum>,
}

impl Analysis {
    pub fn context<'a>(&'a self, config: &DetectionConfig) -> MatchContext<'a> {
        MatchContext {
            series: &self.series,
            volatility: &self.volatility,
            extrema: &self.extrema,
            proximity_factor: config.proximity_factor,
            min_r_squared: config.min_r_squared,
        }
    }
}

/// Main formation detection engine
pub struct PatternEngine<V: VolatilityEstimator = AtrVolatility> {
    builtin: Vec<BuiltinMatcher>,
    custom: Vec<Box<dyn PatternMatcher>>,
    volatility: V,
    config: DetectionConfig,
    scorer: QualityScorer,
    validate_data: bool,
}

impl<V: VolatilityEstimator> PatternEngine<V> {
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn matcher_names(&self) -> Vec<&'static str> {
        self.builtin
            .iter()
            .map(BuiltinMatcher::name)
            .chain(self.custom.iter().map(|m| m.name()))
            .collect()
    }

    // ===========================================
    // LOW-LEVEL: Primitives
    // ===========================================

    /// Volatility and (optionally swing-filtered) extrema for a bar slice.
    pub fn analyze<T: OHLCV>(&self, bars: &[T]) -> Result<Analysis> {
        if self.validate_data {
            self.validate_bars(bars)?;
        }

        let series = Series::from_bars(bars);
        let volatility = self.volatility.estimate(bars, self.config.atr_window);
        let extractor = ExtremaExtractor::new(self.config.peak_order, self.config.prominence_factor)?;
        let mut extrema = extractor.extract(&series.closes, &volatility);
        if self.config.use_swing_filter {
            let before = extrema.len();
            extrema = SwingFilter::new(self.config.swing_deviation)?.filter(&extrema);
            debug!(before, after = extrema.len(), "swing filter applied");
        }
        debug!(bars = series.len(), extrema = extrema.len(), "series analyzed");

        Ok(Analysis {
            series,
            volatility,
            extrema,
        })
    }

    /// Raw matcher output for an analysis; excluded types and non-finite levels are dropped.
    pub fn candidates(&self, analysis: &Analysis) -> Vec<PatternCandidate> {
        if analysis.series.len() < self.config.min_pattern_length {
            debug!(
                bars = analysis.series.len(),
                min = self.config.min_pattern_length,
                "series shorter than min_pattern_length"
            );
            return Vec::new();
        }

        let ctx = analysis.context(&self.config);
        let mut out = Vec::new();

        // Fast path: builtin matchers (enum dispatch, no vtable)
        for matcher in &self.builtin {
            out.extend(matcher.detect(&ctx));
        }

        // Slow path: custom matchers (vtable)
        for matcher in &self.custom {
            if ctx.is_sufficient(matcher.min_extrema()) {
                out.extend(matcher.detect(&ctx));
            }
        }

        out.retain(|c| {
            if self.config.is_excluded(c.pattern_type) {
                return false;
            }
            if !c.key_levels.is_finite() {
                warn!(pattern = c.label(), start = c.start_index, "dropping candidate with non-finite levels");
                return false;
            }
            true
        });
        debug!(candidates = out.len(), "matching done");
        out
    }

    /// Score, filter by thresholds and resolve overlaps.
    pub fn score(&self, analysis: &Analysis, candidates: Vec<PatternCandidate>) -> Vec<ScoredPattern> {
        let scored: Vec<ScoredPattern> = candidates
            .into_iter()
            .filter(|c| c.r_squared >= self.config.min_r_squared)
            .map(|c| self.scorer.score(&analysis.series, c))
            .filter(|p| p.confidence >= self.config.min_confidence)
            .collect();

        OverlapResolver::new(self.config.overlap_threshold).resolve(scored)
    }

    // ===========================================
    // MID-LEVEL: Single series
    // ===========================================

    /// Detect formations in one series.
    pub fn detect<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<ScoredPattern>> {
        let analysis = self.analyze(bars)?;
        let candidates = self.candidates(&analysis);
        let patterns = self.score(&analysis, candidates);
        debug!(patterns = patterns.len(), "detection done");
        Ok(patterns)
    }

    /// Detect formations in one series and label the result with its timeframe.
    pub fn detect_timeframe<T: OHLCV>(&self, label: &str, bars: &[T]) -> Result<TimeframePatternSet> {
        Timeframe::parse(label)?;
        Ok(TimeframePatternSet {
            timeframe: label.to_string(),
            bar_count: bars.len(),
            patterns: self.detect(bars)?,
        })
    }

    // ===========================================
    // HIGH-LEVEL: Multiple timeframes
    // ===========================================

    /// Detect every timeframe in parallel. Output order follows `inputs`.
    pub fn detect_timeframes<T>(&self, inputs: &[(&str, &[T])]) -> Result<Vec<TimeframePatternSet>>
    where
        T: OHLCV + Sync,
    {
        for (label, _) in inputs {
            Timeframe::parse(label)?;
        }
        inputs
            .par_iter()
            .map(|(label, bars)| self.detect_timeframe(label, bars))
            .collect()
    }

    /// Per-timeframe detection followed by cross-timeframe aggregation.
    pub fn detect_multi_timeframe<T>(&self, inputs: &[(&str, &[T])]) -> Result<Vec<MultiTimeframePattern>>
    where
        T: OHLCV + Sync,
    {
        let sets = self.detect_timeframes(inputs)?;
        self.aggregator().aggregate(&sets)
    }

    pub fn aggregator(&self) -> MultiTimeframeAggregator {
        MultiTimeframeAggregator::new(self.config.aggregation_mode, self.config.level_tolerance)
            .with_primary(self.config.primary_timeframe.clone())
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn validate_bars<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for m in &self.builtin {
            m.validate_config()?;
        }
        for m in &self.custom {
            m.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
pub struct EngineBuilder<V: VolatilityEstimator = AtrVolatility> {
    volatility: V,
    builtin: Vec<BuiltinMatcher>,
    custom: Vec<Box<dyn PatternMatcher>>,
    config: DetectionConfig,
    scorer: QualityScorer,
    validate_data: bool,
}

impl Default for EngineBuilder<AtrVolatility> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<AtrVolatility> {
    pub fn new() -> Self {
        Self {
            volatility: AtrVolatility,
            builtin: Vec::new(),
            custom: Vec::new(),
            config: DetectionConfig::default(),
            scorer: QualityScorer::default(),
            validate_data: false,
        }
    }
}

/// Generate an array of `BuiltinMatcher` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinMatcher::$variant(Default::default())),*]
  };
}

impl<V: VolatilityEstimator> EngineBuilder<V> {
    /// Change volatility estimator
    pub fn volatility_estimator<V2: VolatilityEstimator>(self, estimator: V2) -> EngineBuilder<V2> {
        EngineBuilder {
            volatility: estimator,
            builtin: self.builtin,
            custom: self.custom,
            config: self.config,
            scorer: self.scorer,
            validate_data: self.validate_data,
        }
    }

    /// Add every builtin matcher with default parameters
    pub fn with_all_defaults(self) -> Self {
        self.with_reversal_defaults()
            .with_continuation_defaults()
            .with_broadening_defaults()
    }

    /// Head & shoulders, double/triple tops and bottoms, rounding
    pub fn with_reversal_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            HeadAndShoulders,
            DoubleTopBottom,
            TripleTopBottom,
            Rounding,
        ]);
        self
    }

    /// Triangles, flags/pennants, wedges, channels, rectangles
    pub fn with_continuation_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            Triangle,
            FlagPennant,
            Wedge,
            Channel,
            Rectangle,
        ]);
        self
    }

    /// Broadening formations and diamonds
    pub fn with_broadening_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![Broadening, Diamond]);
        self
    }

    /// Add a builtin matcher
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, matcher: impl Into<BuiltinMatcher>) -> Self {
        self.builtin.push(matcher.into());
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, matcher: impl Into<BuiltinMatcher>) -> Result<Self> {
        let matcher = matcher.into();
        matcher.validate_config()?;
        self.builtin.push(matcher);
        Ok(self)
    }

    /// Add a custom matcher (slow path)
    pub fn add_custom<M: PatternMatcher + 'static>(mut self, matcher: M) -> Self {
        self.custom.push(Box::new(matcher));
        self
    }

    /// Replace the whole detection config
    pub fn config(mut self, config: DetectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn min_confidence(mut self, value: f64) -> Self {
        self.config.min_confidence = value;
        self
    }

    pub fn min_r_squared(mut self, value: f64) -> Self {
        self.config.min_r_squared = value;
        self
    }

    /// Drop a formation type from the output
    pub fn exclude(mut self, pattern_type: PatternType) -> Self {
        self.config.exclude_pattern_types.insert(pattern_type);
        self
    }

    /// Re-enable a formation type excluded by default (e.g. rounding)
    pub fn include(mut self, pattern_type: PatternType) -> Self {
        self.config.exclude_pattern_types.remove(&pattern_type);
        self
    }

    /// Enable the percentage swing filter
    pub fn swing_filter(mut self, deviation: f64) -> Self {
        self.config.use_swing_filter = true;
        self.config.swing_deviation = deviation;
        self
    }

    pub fn aggregation_mode(mut self, mode: config::AggregationMode) -> Self {
        self.config.aggregation_mode = mode;
        self
    }

    pub fn primary_timeframe(mut self, label: impl Into<String>) -> Self {
        self.config.primary_timeframe = Some(label.into());
        self
    }

    pub fn scorer(mut self, scorer: QualityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.validate_data = enable;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine<V>> {
        let engine = PatternEngine {
            builtin: self.builtin,
            custom: self.custom,
            volatility: self.volatility,
            config: self.config,
            scorer: self.scorer,
            validate_data: self.validate_data,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub patterns: Vec<ScoredPattern>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel detection over multiple instruments
pub fn scan_parallel<'a, T, I, V>(
    engine: &PatternEngine<V>,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    V: VolatilityEstimator,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .detect(bars)
                .map(|patterns| ScanResult {
                    symbol: symbol.to_string(),
                    patterns,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TYPE ALIASES
// ============================================================

/// Default engine with ATR volatility
pub type DefaultEngine = PatternEngine<AtrVolatility>;

// ============================================================
// TESTS
// ============================================================
