//! Rolling true-range volatility.
//!
//! Every sensitivity threshold in the pipeline (extremum prominence, "same price level",
//! flat/rising/falling boundaries) is expressed in units of this estimate.

use crate::{OHLCVExt, OHLCV};

/// Produces one volatility value per bar.
pub trait VolatilityEstimator: Send + Sync {
    /// `window` is the trailing length requested by the engine configuration.
    fn estimate<T: OHLCV>(&self, bars: &[T], window: usize) -> Vec<f64>;
}

/// Average true range over a trailing window.
///
/// Early bars use whatever history is available, so the first value is simply the
/// first bar's range. Non-finite ranges contribute zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtrVolatility;

impl VolatilityEstimator for AtrVolatility {
    fn estimate<T: OHLCV>(&self, bars: &[T], window: usize) -> Vec<f64> {
        let window = window.max(1);
        let ranges = true_ranges(bars);

        (0..ranges.len())
            .map(|i| {
                let from = (i + 1).saturating_sub(window);
                let slice = &ranges[from..=i];
                slice.iter().sum::<f64>() / slice.len() as f64
            })
            .collect()
    }
}

/// True range per bar; bar 0 has no previous close and uses its high-low range.
pub fn true_ranges<T: OHLCV>(bars: &[T]) -> Vec<f64> {
    let mut prev_close: Option<f64> = None;
    bars.iter()
        .map(|bar| {
            let tr = match prev_close {
                Some(pc) => bar.true_range(pc),
                None => bar.range(),
            };
            prev_close = Some(bar.close());
            if tr.is_finite() {
                tr.max(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Mean of `values[start..=end]`, clamped to the slice bounds. Empty ranges give 0.
pub fn mean_over(values: &[f64], start: usize, end: usize) -> f64 {
    if values.is_empty() || start > end {
        return 0.0;
    }
    let end = end.min(values.len() - 1);
    if start > end {
        return 0.0;
    }
    let slice = &values[start..=end];
    slice.iter().sum::<f64>() / slice.len() as f64
}
