//! Least-squares trendlines and arcs.
//!
//! Points are fitted on a relative index basis (`index - first index`), so slope and
//! intercept do not depend on where the window sits inside the series.

use serde::{Deserialize, Serialize};

use crate::extrema::Extremum;

/// Residuals below this fraction of the price scale count as an exact fit.
const COLLINEAR_EPS: f64 = 1e-9;

/// Straight line fitted through `(index, price)` points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trendline {
    /// Price change per bar
    pub slope: f64,
    /// Price at `start_index`
    pub intercept: f64,
    pub r_squared: f64,
    pub start_index: usize,
    pub end_index: usize,
}

impl Trendline {
    /// Line value at an absolute bar index
    #[inline]
    pub fn value_at(&self, index: usize) -> f64 {
        self.intercept + self.slope * (index as f64 - self.start_index as f64)
    }

    #[inline]
    pub fn span(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    /// Signed distance of a point from the line
    #[inline]
    pub fn residual(&self, index: usize, price: f64) -> f64 {
        price - self.value_at(index)
    }
}

/// Ordinary least squares through `points`.
///
/// - empty input: flat zero line with `r_squared = 0.0`
/// - one or two points, or collinear points: `r_squared = 1.0`
///
/// Non-finite prices are ignored.
pub fn fit_line(points: &[(usize, f64)]) -> Trendline {
    let points: Vec<(usize, f64)> = points.iter().copied().filter(|(_, y)| y.is_finite()).collect();
    let Some(start) = points.iter().map(|(i, _)| *i).min() else {
        return Trendline {
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
            start_index: 0,
            end_index: 0,
        };
    };
    let end = points.iter().map(|(i, _)| *i).max().unwrap_or(start);

    let n = points.len() as f64;
    let xs: Vec<f64> = points.iter().map(|(i, _)| (*i - start) as f64).collect();
    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(&ys) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let (slope, intercept) = if sxx > 0.0 {
        let slope = sxy / sxx;
        (slope, mean_y - slope * mean_x)
    } else {
        (0.0, mean_y)
    };

    let ss_res: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| {
            let r = y - (intercept + slope * x);
            r * r
        })
        .sum();

    let r_squared = if points.len() <= 2 {
        1.0
    } else {
        r_squared(ss_res, syy, &ys)
    };

    Trendline {
        slope,
        intercept,
        r_squared,
        start_index: start,
        end_index: end,
    }
}

/// Fit through extrema positions
pub fn fit_extrema<'a, I>(extrema: I) -> Trendline
where
    I: IntoIterator<Item = &'a Extremum>,
{
    let points: Vec<(usize, f64)> = extrema.into_iter().map(Extremum::point).collect();
    fit_line(&points)
}

/// Fit through raw closes in `start..=end`
pub fn fit_closes(closes: &[f64], start: usize, end: usize) -> Trendline {
    let end = end.min(closes.len().saturating_sub(1));
    let points: Vec<(usize, f64)> = (start..=end).filter_map(|i| closes.get(i).map(|c| (i, *c))).collect();
    fit_line(&points)
}

fn r_squared(ss_res: f64, ss_tot: f64, ys: &[f64]) -> f64 {
    let scale = ys.iter().fold(0.0_f64, |m, y| m.max(y.abs()));
    let tolerance = ys.len() as f64 * (COLLINEAR_EPS * scale).powi(2);
    if ss_res <= tolerance || ss_tot <= tolerance {
        return 1.0;
    }
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}

// ============================================================
// QUADRATIC ARCS
// ============================================================

/// `y = a*u^2 + b*u + c` with `u = index - center`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadraticFit {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub center: f64,
    pub r_squared: f64,
    pub start_index: usize,
    pub end_index: usize,
}

impl QuadraticFit {
    #[inline]
    pub fn value_at(&self, index: f64) -> f64 {
        let u = index - self.center;
        self.a * u * u + self.b * u + self.c
    }

    /// Absolute index of the turning point. `None` for a straight line.
    pub fn vertex_index(&self) -> Option<f64> {
        (self.a.abs() > f64::EPSILON).then(|| self.center - self.b / (2.0 * self.a))
    }
}

/// Least-squares parabola. Needs three distinct indices.
pub fn fit_quadratic(points: &[(usize, f64)]) -> Option<QuadraticFit> {
    let points: Vec<(usize, f64)> = points.iter().copied().filter(|(_, y)| y.is_finite()).collect();
    let start = points.iter().map(|(i, _)| *i).min()?;
    let end = points.iter().map(|(i, _)| *i).max()?;

    let mut distinct: Vec<usize> = points.iter().map(|(i, _)| *i).collect();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() < 3 {
        return None;
    }

    let n = points.len() as f64;
    let center = points.iter().map(|(i, _)| *i as f64).sum::<f64>() / n;

    let (mut s1, mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0, 0.0);
    let (mut t0, mut t1, mut t2) = (0.0, 0.0, 0.0);
    for (i, y) in &points {
        let u = *i as f64 - center;
        let u2 = u * u;
        s1 += u;
        s2 += u2;
        s3 += u2 * u;
        s4 += u2 * u2;
        t0 += y;
        t1 += u * y;
        t2 += u2 * y;
    }

    let [a, b, c] = solve3([[s4, s3, s2], [s3, s2, s1], [s2, s1, n]], [t2, t1, t0])?;

    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
    let mean_y = t0 / n;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = points
        .iter()
        .map(|(i, y)| {
            let u = *i as f64 - center;
            (y - (a * u * u + b * u + c)).powi(2)
        })
        .sum();

    let r_squared = if points.len() <= 3 {
        1.0
    } else {
        r_squared(ss_res, ss_tot, &ys)
    };

    Some(QuadraticFit {
        a,
        b,
        c,
        center,
        r_squared,
        start_index: start,
        end_index: end,
    })
}

/// Gaussian elimination with partial pivoting
fn solve3(mut m: [[f64; 3]; 3], mut v: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        v.swap(col, pivot);
        for row in col + 1..3 {
            let f = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= f * m[col][k];
            }
            v[row] -= f * v[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| m[row][k] * x[k]).sum();
        x[row] = (v[row] - tail) / m[row][row];
    }
    x.iter().all(|c| c.is_finite()).then_some(x)
}
