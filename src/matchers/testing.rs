//! Fixtures for matcher unit tests

use crate::{
    extrema::{ExtremaExtractor, Extremum},
    MatchContext, Series,
};

/// Piecewise-linear close series through `(index, price)` vertices.
pub(crate) fn path(vertices: &[(usize, f64)]) -> Vec<f64> {
    let mut closes = Vec::new();
    for pair in vertices.windows(2) {
        let ((i0, p0), (i1, p1)) = (pair[0], pair[1]);
        for i in i0..i1 {
            closes.push(p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64);
        }
    }
    if let Some(&(_, p)) = vertices.last() {
        closes.push(p);
    }
    closes
}

/// Series with unit volatility everywhere, so the level tolerance is 0.5.
pub(crate) struct Fixture {
    pub series: Series,
    pub volatility: Vec<f64>,
    pub extrema: Vec<Extremum>,
}

impl Fixture {
    pub fn new(vertices: &[(usize, f64)]) -> Self {
        let closes = path(vertices);
        let n = closes.len();
        let volatility = vec![1.0; n];
        let extrema = ExtremaExtractor::new(5, 1.5)
            .unwrap()
            .extract(&closes, &volatility);
        let series = Series {
            highs: closes.clone(),
            lows: closes.clone(),
            closes,
            volumes: vec![1000.0; n],
            timestamps: vec![None; n],
        };
        Self {
            series,
            volatility,
            extrema,
        }
    }

    pub fn context(&self) -> MatchContext<'_> {
        MatchContext {
            series: &self.series,
            volatility: &self.volatility,
            extrema: &self.extrema,
            proximity_factor: 0.5,
            min_r_squared: 0.0,
        }
    }
}
