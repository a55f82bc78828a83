// derivative.rs - Local least-squares slopes and the automatic plateau cutoff

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocking::BlockingCurve;
use crate::error::{AnalysisError, Result};
use crate::spline::CubicSpline;

/// Axes transformed by log10 before differentiating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    Linear,
    #[default]
    LogXY,
    SemiLogX,
    SemiLogY,
}

impl ScaleMode {
    fn log_x(self) -> bool {
        matches!(self, ScaleMode::LogXY | ScaleMode::SemiLogX)
    }

    fn log_y(self) -> bool {
        matches!(self, ScaleMode::LogXY | ScaleMode::SemiLogY)
    }
}

impl FromStr for ScaleMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(ScaleMode::Linear),
            "logxy" => Ok(ScaleMode::LogXY),
            "semilogx" => Ok(ScaleMode::SemiLogX),
            "semilogy" => Ok(ScaleMode::SemiLogY),
            other => Err(AnalysisError::invalid(format!(
                "invalid data scale '{other}' (linear, logxy, semilogx, semilogy)"
            ))),
        }
    }
}

/// Ordinary least-squares line through `points`, returning `(slope, intercept)`.
pub fn linear_regression(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    let sxy: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();

    let slope = sxy / sxx;
    (slope, mean_y - slope * mean_x)
}

/// Local derivative of `points` by sliding-window linear regression.
///
/// For every index `i` in `locality..N-locality` a line is fitted through the
/// `2 * locality + 1` neighbours; the output holds `(x_i, slope)` with `x_i`
/// in the transformed coordinates (log10 where `scale` says so).
pub fn local_slope(
    points: &[(f64, f64)],
    locality: usize,
    scale: ScaleMode,
) -> Result<Vec<(f64, f64)>> {
    if locality == 0 {
        return Err(AnalysisError::invalid("locality must be at least 1"));
    }
    let half = points.len() / 2;
    if half < 1 || locality > half - 1 {
        return Err(AnalysisError::invalid(format!(
            "locality {} too large for {} points",
            locality,
            points.len()
        )));
    }
    if scale.log_x() && points.iter().any(|&(x, _)| !(x > 0.0)) {
        return Err(AnalysisError::invalid(
            "x contains non-positive values, cannot apply log10",
        ));
    }
    if scale.log_y() && points.iter().any(|&(_, y)| !(y > 0.0)) {
        return Err(AnalysisError::invalid(
            "y contains non-positive values, cannot apply log10",
        ));
    }

    let data: Vec<(f64, f64)> = points
        .iter()
        .map(|&(x, y)| {
            let x = if scale.log_x() { x.log10() } else { x };
            let y = if scale.log_y() { y.log10() } else { y };
            (x, y)
        })
        .collect();

    let mut slopes = Vec::with_capacity(data.len() - 2 * locality);
    for i in locality..data.len() - locality {
        let window = &data[i - locality..=i + locality];
        let (slope, _) = linear_regression(window);
        if !slope.is_finite() {
            return Err(AnalysisError::invalid(format!(
                "degenerate regression window around x = {}",
                data[i].0
            )));
        }
        slopes.push((data[i].0, slope));
    }
    Ok(slopes)
}

/// Block size at which the log-log slope of the blocking curve first crosses zero.
///
/// The slope sequence is interpolated with a natural cubic spline and its
/// first root is mapped back from log10. No root is a [`AnalysisError::RootNotFound`];
/// the caller then has to choose a cutoff explicitly.
pub fn plateau_cutoff(curve: &BlockingCurve, locality: usize) -> Result<f64> {
    let points: Vec<(f64, f64)> = curve.iter().map(|(&k, &v)| (k as f64, v)).collect();
    let slopes = local_slope(&points, locality, ScaleMode::LogXY)?;
    let (xs, ys): (Vec<f64>, Vec<f64>) = slopes.into_iter().unzip();
    let spline = CubicSpline::natural(&xs, &ys)?;

    let roots = spline.roots();
    debug!(n_roots = roots.len(), "derivative spline roots");
    roots
        .first()
        .map(|&r| 10f64.powf(r))
        .ok_or_else(|| {
            let (lo, hi) = spline.domain();
            AnalysisError::RootNotFound(format!(
                "blocking curve slope never crosses zero for block sizes {:.1}..{:.1}",
                10f64.powf(lo),
                10f64.powf(hi)
            ))
        })
}
