// jackknife.rs - Leave-one-out resampling of blocked data

use crate::error::{AnalysisError, Result};

fn check_len(len: usize, what: &str) -> Result<()> {
    if len < 2 {
        return Err(AnalysisError::invalid(format!(
            "jackknife needs at least 2 {what}, got {len}"
        )));
    }
    Ok(())
}

/// Leave-one-out means: replica `i` is the mean of all values except `values[i]`.
///
/// One pass for the total, then O(1) per replica.
pub fn jackknife_means(values: &[f64]) -> Result<Vec<f64>> {
    check_len(values.len(), "values")?;
    let m = values.len() as f64;
    let total: f64 = values.iter().sum();
    Ok(values.iter().map(|&v| (total - v) / (m - 1.0)).collect())
}

/// Jackknife variance of a statistic from its `M` replicas.
///
/// `(M - 1) / M * sum((r_i - r_mean)^2)`. The factor `M - 1` undoes the
/// shrinking of leave-one-out replicas relative to full-sample fluctuations;
/// applied to [`jackknife_means`] this reproduces `Var(x, ddof=1) / M` exactly.
pub fn jackknife_variance(replicas: &[f64]) -> Result<f64> {
    check_len(replicas.len(), "replicas")?;
    let m = replicas.len() as f64;
    let mean = replicas.iter().sum::<f64>() / m;
    let ss: f64 = replicas.iter().map(|&r| (r - mean).powi(2)).sum();
    Ok(ss * (m - 1.0) / m)
}

/// Replicas of a nonlinear functional of several blocked moment series.
///
/// Every series must have the same length `M`; `functional` receives the
/// leave-one-out means of all series for one replica, in the order given.
pub fn jackknife_replicas<F>(moments: &[&[f64]], functional: F) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let first = moments
        .first()
        .ok_or_else(|| AnalysisError::invalid("no moment series given"))?;
    let m = first.len();
    if let Some(bad) = moments.iter().find(|s| s.len() != m) {
        return Err(AnalysisError::mismatch(format!(
            "moment series have lengths {} and {}",
            m,
            bad.len()
        )));
    }
    let means = moments
        .iter()
        .map(|s| jackknife_means(s))
        .collect::<Result<Vec<_>>>()?;

    let mut args = vec![0.0; means.len()];
    Ok((0..m)
        .map(|i| {
            for (slot, series) in args.iter_mut().zip(&means) {
                *slot = series[i];
            }
            functional(&args)
        })
        .collect())
}

/// Jackknife variance of a nonlinear functional of several blocked moment series.
pub fn jackknife_functional_variance<F>(moments: &[&[f64]], functional: F) -> Result<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let replicas = jackknife_replicas(moments, functional)?;
    jackknife_variance(&replicas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_means_leave_one_out() {
        let jk = jackknife_means(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(jk, vec![2.5, 2.0, 1.5]);
    }

    #[test]
    fn test_short_input_rejected() {
        assert!(jackknife_means(&[1.0]).is_err());
        assert!(jackknife_variance(&[]).is_err());
    }

    #[test]
    fn test_unequal_moments_rejected() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.0];
        let err = jackknife_replicas(&[&a, &b], |x| x[0] * x[1]).unwrap_err();
        assert!(matches!(err, AnalysisError::DimensionMismatch(_)));
    }
}
