//! Detection configuration and parameter metadata
//!
//! Every numeric knob of the pipeline is described by a [`ParamMeta`] entry, which gives:
//! - Eager validation with the offending field name in the error
//! - Parameter documentation
//! - Construction from a plain `HashMap` of overrides
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use chartform::config::DetectionConfig;
//!
//! let mut overrides = HashMap::new();
//! overrides.insert("peak_order", 3.0);
//! overrides.insert("min_confidence", 0.4);
//!
//! let config = DetectionConfig::with_params(&overrides).unwrap();
//! assert_eq!(config.peak_order, 3);
//! ```

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{timeframe::Timeframe, PatternError, PatternType, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Closed unit interval `[0, 1]`
  Ratio,
  /// Half-open unit interval `(0, 1]`
  OpenRatio,
  /// Positive integer
  Period,
  /// Finite multiplier `>= 0`
  Factor,
  /// Finite multiplier `> 0`
  PositiveFactor,
}

/// Metadata for a single parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "prominence_factor")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Accepted bounds `(min, max)`; exclusivity of `min` follows `param_type`
  pub range: (f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(name: &'static str, default: f64, description: &'static str) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range: (0.0, 1.0), description }
  }

  pub const fn open_ratio(name: &'static str, default: f64, description: &'static str) -> Self {
    Self { name, param_type: ParamType::OpenRatio, default, range: (0.0, 1.0), description }
  }

  pub const fn period(name: &'static str, default: f64, description: &'static str) -> Self {
    Self { name, param_type: ParamType::Period, default, range: (1.0, f64::INFINITY), description }
  }

  pub const fn factor(name: &'static str, default: f64, description: &'static str) -> Self {
    Self { name, param_type: ParamType::Factor, default, range: (0.0, f64::INFINITY), description }
  }

  pub const fn positive_factor(
    name: &'static str,
    default: f64,
    description: &'static str,
  ) -> Self {
    Self {
      name,
      param_type: ParamType::PositiveFactor,
      default,
      range: (0.0, f64::INFINITY),
      description,
    }
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(PatternError::InvalidConfig(format!("{} must be finite", self.name)));
    }
    let (min, max) = self.range;
    let below = match self.param_type {
      ParamType::OpenRatio | ParamType::PositiveFactor => value <= min,
      ParamType::Ratio | ParamType::Period | ParamType::Factor => value < min,
    };
    if below || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    if self.param_type == ParamType::Period && value.fract() != 0.0 {
      return Err(PatternError::InvalidConfig(format!("{} must be a positive integer", self.name)));
    }
    Ok(())
  }
}

// ============================================================
// DETECTION CONFIG
// ============================================================

/// How per-timeframe results are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
  /// Only the primary (longest by default) timeframe supplies patterns; lower ones confirm.
  #[default]
  TopDown,
  /// Every timeframe supplies patterns; confirmations are consumed and not re-emitted.
  MultiTimeframeDiscovery,
}

pub const CONFIG_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("min_pattern_length", 20.0, "Shortest series the matchers will look at"),
  ParamMeta::period("peak_order", 5.0, "Bars on each side an extremum must dominate"),
  ParamMeta::period("atr_window", 14.0, "Trailing bars averaged by the volatility estimator"),
  ParamMeta::positive_factor(
    "prominence_factor",
    1.5,
    "Extremum prominence must exceed this many volatility units",
  ),
  ParamMeta::factor("proximity_factor", 0.5, "Volatility units treated as the same price level"),
  ParamMeta::ratio("min_confidence", 0.0, "Patterns below this confidence are dropped"),
  ParamMeta::ratio("min_r_squared", 0.0, "Patterns below this fit quality are dropped"),
  ParamMeta::open_ratio("swing_deviation", 0.03, "Minimum swing as a fraction of price"),
  ParamMeta::ratio("overlap_threshold", 0.05, "Maximum index-range IoU between kept patterns"),
  ParamMeta::open_ratio(
    "level_tolerance",
    0.02,
    "Relative price difference accepted between timeframes",
  ),
];

/// Pipeline configuration. Validated eagerly by [`DetectionConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
  pub min_pattern_length: usize,
  pub peak_order: usize,
  pub atr_window: usize,
  pub prominence_factor: f64,
  pub proximity_factor: f64,
  pub min_confidence: f64,
  pub min_r_squared: f64,
  pub use_swing_filter: bool,
  pub swing_deviation: f64,
  pub overlap_threshold: f64,
  pub exclude_pattern_types: BTreeSet<PatternType>,
  pub aggregation_mode: AggregationMode,
  /// Top-down primary timeframe; the longest supplied timeframe when unset.
  pub primary_timeframe: Option<String>,
  pub level_tolerance: f64,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      min_pattern_length: 20,
      peak_order: 5,
      atr_window: 14,
      prominence_factor: 1.5,
      proximity_factor: 0.5,
      min_confidence: 0.0,
      min_r_squared: 0.0,
      use_swing_filter: false,
      swing_deviation: 0.03,
      overlap_threshold: 0.05,
      exclude_pattern_types: [PatternType::RoundingTop, PatternType::RoundingBottom]
        .into_iter()
        .collect(),
      aggregation_mode: AggregationMode::TopDown,
      primary_timeframe: None,
      level_tolerance: 0.02,
    }
  }
}

impl DetectionConfig {
  /// Returns metadata for all numeric parameters
  pub fn param_meta() -> &'static [ParamMeta] {
    CONFIG_PARAMS
  }

  /// Creates a config from numeric overrides. Missing parameters use their defaults.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let mut config = Self::default();
    // Sorted so the first reported error does not depend on hash order
    let mut keys: Vec<&&str> = params.keys().collect();
    keys.sort();
    for key in keys {
      let value = params[*key];
      let meta = CONFIG_PARAMS
        .iter()
        .find(|m| m.name == *key)
        .ok_or_else(|| PatternError::InvalidConfig(format!("unknown parameter '{key}'")))?;
      meta.validate(value)?;
      config.set(meta.name, value);
    }
    config.validate()?;
    Ok(config)
  }

  /// Current value of a numeric parameter by name
  pub fn value(&self, name: &str) -> Option<f64> {
    let value = match name {
      "min_pattern_length" => self.min_pattern_length as f64,
      "peak_order" => self.peak_order as f64,
      "atr_window" => self.atr_window as f64,
      "prominence_factor" => self.prominence_factor,
      "proximity_factor" => self.proximity_factor,
      "min_confidence" => self.min_confidence,
      "min_r_squared" => self.min_r_squared,
      "swing_deviation" => self.swing_deviation,
      "overlap_threshold" => self.overlap_threshold,
      "level_tolerance" => self.level_tolerance,
      _ => return None,
    };
    Some(value)
  }

  fn set(&mut self, name: &str, value: f64) {
    match name {
      "min_pattern_length" => self.min_pattern_length = value as usize,
      "peak_order" => self.peak_order = value as usize,
      "atr_window" => self.atr_window = value as usize,
      "prominence_factor" => self.prominence_factor = value,
      "proximity_factor" => self.proximity_factor = value,
      "min_confidence" => self.min_confidence = value,
      "min_r_squared" => self.min_r_squared = value,
      "swing_deviation" => self.swing_deviation = value,
      "overlap_threshold" => self.overlap_threshold = value,
      "level_tolerance" => self.level_tolerance = value,
      _ => {},
    }
  }

  /// Check every parameter against its metadata
  pub fn validate(&self) -> Result<()> {
    for meta in CONFIG_PARAMS {
      if let Some(value) = self.value(meta.name) {
        meta.validate(value)?;
      }
    }
    if let Some(label) = &self.primary_timeframe {
      Timeframe::parse(label)?;
    }
    Ok(())
  }

  #[inline]
  pub fn is_excluded(&self, pattern_type: PatternType) -> bool {
    self.exclude_pattern_types.contains(&pattern_type)
  }

  /// Replace the exclusion set from labels such as `"rounding_top"`
  pub fn exclude_labels<'a, I>(mut self, labels: I) -> Result<Self>
  where
    I: IntoIterator<Item = &'a str>,
  {
    self.exclude_pattern_types =
      labels.into_iter().map(str::parse).collect::<Result<BTreeSet<PatternType>>>()?;
    Ok(self)
  }
}

// ============================================================
// PARAMETERIZED MATCHER TRAIT
// ============================================================

/// Matchers whose thresholds can be discovered and overridden by name
pub trait ParameterizedMatcher: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a matcher with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Validate `(name, value)` pairs against a metadata table; names without metadata are skipped
pub fn check_params(meta: &[ParamMeta], values: &[(&str, f64)]) -> Result<()> {
  for (name, value) in values {
    if let Some(m) = meta.iter().find(|m| m.name == *name) {
      m.validate(*value)?;
    }
  }
  Ok(())
}

/// Helper to get a finite positive factor from params with default fallback
pub fn get_factor(params: &HashMap<&str, f64>, key: &'static str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() || value <= 0.0 {
    return Err(PatternError::OutOfRange { field: key, value, min: 0.0, max: f64::INFINITY });
  }
  Ok(value)
}

// ============================================================
// TESTS
// ============================================================
