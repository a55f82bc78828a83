// autocorr.rs - Autocorrelation functions and integrated autocorrelation time

use crate::error::{AnalysisError, Result};

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

fn check_lag(n: usize, max_lag: usize) -> Result<()> {
    if n < 2 {
        return Err(AnalysisError::invalid("autocorrelation needs at least 2 samples"));
    }
    if max_lag >= n {
        return Err(AnalysisError::invalid(format!(
            "max lag {max_lag} must be smaller than the series length {n}"
        )));
    }
    Ok(())
}

/// Lagged covariance `sum((a_i - a_mean)(b_{i+t} - b_mean)) / (N - t)`.
fn lagged_covariance(a: &[f64], mean_a: f64, b: &[f64], mean_b: f64, lag: usize) -> f64 {
    let n = a.len();
    let sum: f64 = a[..n - lag]
        .iter()
        .zip(&b[lag..])
        .map(|(&x, &y)| (x - mean_a) * (y - mean_b))
        .sum();
    sum / (n - lag) as f64
}

/// Normalized autocorrelation `rho(t) = C(t) / C(0)` for `t = 0..=max_lag`.
///
/// A constant series has no fluctuations to correlate: `rho(0) = 1`, the rest 0.
pub fn autocorrelation(series: &[f64], max_lag: usize) -> Result<Vec<f64>> {
    check_lag(series.len(), max_lag)?;
    let mu = mean(series);
    let c0 = lagged_covariance(series, mu, series, mu, 0);
    if c0 == 0.0 {
        let mut rho = vec![0.0; max_lag + 1];
        rho[0] = 1.0;
        return Ok(rho);
    }
    Ok((0..=max_lag)
        .map(|t| lagged_covariance(series, mu, series, mu, t) / c0)
        .collect())
}

/// 2x2 auto- and cross-correlation matrices of two equal-length series.
///
/// Entry `[i][j]` at lag `t` is `C_ij(t) / sqrt(C_ii(0) C_jj(0))`, with
/// `C_ij(t)` correlating series `i` at time `s` with series `j` at `s + t`.
pub fn cross_autocorrelation(a: &[f64], b: &[f64], max_lag: usize) -> Result<Vec<[[f64; 2]; 2]>> {
    if a.len() != b.len() {
        return Err(AnalysisError::mismatch(format!(
            "series have lengths {} and {}",
            a.len(),
            b.len()
        )));
    }
    check_lag(a.len(), max_lag)?;
    let series = [a, b];
    let means = [mean(a), mean(b)];
    let sd = [
        lagged_covariance(a, means[0], a, means[0], 0).sqrt(),
        lagged_covariance(b, means[1], b, means[1], 0).sqrt(),
    ];
    if sd[0] == 0.0 || sd[1] == 0.0 {
        return Err(AnalysisError::invalid("cannot normalize a constant series"));
    }

    Ok((0..=max_lag)
        .map(|t| {
            let mut m = [[0.0; 2]; 2];
            for i in 0..2 {
                for j in 0..2 {
                    m[i][j] = lagged_covariance(series[i], means[i], series[j], means[j], t)
                        / (sd[i] * sd[j]);
                }
            }
            m
        })
        .collect())
}

/// Integrated autocorrelation time with Sokal's automatic window.
///
/// `tau = 1/2 + sum_{t=1}^{W} rho(t)`, where `W` is the first lag with
/// `W >= window_factor * tau(W)`. The variance of the mean is then
/// `2 tau Var(x) / N`, which is what the blocking plateau measures.
pub fn integrated_autocorrelation_time(series: &[f64], window_factor: f64) -> Result<f64> {
    if !(window_factor > 0.0) {
        return Err(AnalysisError::invalid("window factor must be positive"));
    }
    let n = series.len();
    if n < 2 {
        return Err(AnalysisError::invalid("autocorrelation needs at least 2 samples"));
    }
    let mu = mean(series);
    let c0 = lagged_covariance(series, mu, series, mu, 0);
    if c0 == 0.0 {
        return Ok(0.5);
    }

    let mut tau = 0.5;
    for t in 1..n / 2 {
        tau += lagged_covariance(series, mu, series, mu, t) / c0;
        if t as f64 >= window_factor * tau {
            break;
        }
    }
    Ok(tau.max(0.5))
}
