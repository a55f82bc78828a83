// finite_size.rs - Finite-size scaling collapse and critical exponent extraction

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::derivative::linear_regression;
use crate::error::{AnalysisError, Result};
use crate::fit::{least_squares, FitOptions, OffsetPowerLaw};

/// Critical coupling and exponents, supplied from outside or from [`fit_critical_exponents`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalExponents {
    pub beta_c: f64,
    pub nu: f64,
    pub gamma: f64,
}

impl CriticalExponents {
    fn validate(&self) -> Result<()> {
        if !(self.nu > 0.0) || !self.nu.is_finite() {
            return Err(AnalysisError::invalid(format!("nu must be positive, got {}", self.nu)));
        }
        Ok(())
    }

    /// Scaled control parameter `(beta - beta_c) L^(1/nu)`.
    pub fn scaled_beta(&self, beta: f64, lattice_side: usize) -> f64 {
        (beta - self.beta_c) * (lattice_side as f64).powf(1.0 / self.nu)
    }

    /// chi' ~ L^(gamma/nu).
    pub fn susceptibility_exponent(&self) -> f64 {
        self.gamma / self.nu
    }

    /// C ~ L^(alpha/nu) with hyperscaling `alpha = 2 - nu D`.
    pub fn specific_heat_exponent(&self, dimension: u32) -> f64 {
        (2.0 - self.nu * dimension as f64) / self.nu
    }

    /// <|m|> ~ L^(-beta_m/nu) with `beta_m = (nu D - gamma) / 2`.
    pub fn magnetization_exponent(&self, dimension: u32) -> f64 {
        -(self.nu * dimension as f64 - self.gamma) / (2.0 * self.nu)
    }
}

/// Mean and jackknife variance of one observable at one `(L, beta)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FssPoint {
    #[serde(rename = "L")]
    pub lattice_side: usize,
    pub beta: f64,
    pub mean: f64,
    pub variance: f64,
}

/// Point of a scaling collapse: `x = (beta - beta_c) L^(1/nu)`, `y = O / L^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaledPoint {
    #[serde(rename = "L")]
    pub lattice_side: usize,
    pub x: f64,
    pub y: f64,
    pub error: f64,
}

const BETA_MATCH_TOL: f64 = 1e-9;

/// Pair means with variances measured at the same `(L, beta)`.
///
/// Inputs are `(L, beta, value)` rows. A mean without a matching variance is a
/// [`AnalysisError::DimensionMismatch`].
pub fn join_means_and_variances(
    means: &[(usize, f64, f64)],
    variances: &[(usize, f64, f64)],
) -> Result<Vec<FssPoint>> {
    means
        .iter()
        .map(|&(l, beta, mean)| {
            variances
                .iter()
                .find(|&&(lv, bv, _)| lv == l && (bv - beta).abs() <= BETA_MATCH_TOL)
                .map(|&(_, _, variance)| FssPoint { lattice_side: l, beta, mean, variance })
                .ok_or_else(|| {
                    AnalysisError::mismatch(format!("no variance for L = {l}, beta = {beta}"))
                })
        })
        .collect()
}

/// Rescale observables of several lattice sizes onto a common scaling curve.
///
/// `exponent` is the power of `L` the observable is divided by, e.g.
/// [`CriticalExponents::susceptibility_exponent`] for chi'. Errors are the
/// square roots of the variances, rescaled the same way.
pub fn rescale(
    points: &[FssPoint],
    critical: &CriticalExponents,
    exponent: f64,
) -> Result<Vec<ScaledPoint>> {
    critical.validate()?;
    points
        .iter()
        .map(|p| {
            if p.lattice_side == 0 {
                return Err(AnalysisError::invalid("lattice side must be positive"));
            }
            if p.variance < 0.0 {
                return Err(AnalysisError::invalid(format!(
                    "negative variance at L = {}, beta = {}",
                    p.lattice_side, p.beta
                )));
            }
            let norm = (p.lattice_side as f64).powf(exponent);
            Ok(ScaledPoint {
                lattice_side: p.lattice_side,
                x: critical.scaled_beta(p.beta, p.lattice_side),
                y: p.mean / norm,
                error: p.variance.sqrt() / norm,
            })
        })
        .collect()
}

/// Per-lattice tables, each sorted by beta.
pub fn group_by_lattice(points: &[FssPoint]) -> BTreeMap<usize, Vec<FssPoint>> {
    let mut by_size: BTreeMap<usize, Vec<FssPoint>> = BTreeMap::new();
    for p in points {
        by_size.entry(p.lattice_side).or_default().push(*p);
    }
    for table in by_size.values_mut() {
        table.sort_by(|a, b| a.beta.total_cmp(&b.beta));
    }
    by_size
}

/// Location and height of the chi' peak for one lattice size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PseudoCriticalPoint {
    #[serde(rename = "L")]
    pub lattice_side: usize,
    pub beta_pc: f64,
    pub sigma_beta_pc: f64,
    pub max_chi_prime: f64,
    pub sigma_max_chi_prime: f64,
}

/// Scaling-law fits over all lattices with `L >= l_min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CriticalFit {
    pub l_min: usize,
    pub beta_c: f64,
    pub beta_c_err: f64,
    pub b: f64,
    pub b_err: f64,
    pub nu_inv: f64,
    pub nu_inv_err: f64,
    pub chi_sq_beta_pc: f64,
    pub ndof_beta_pc: usize,
    pub c0: f64,
    pub c0_err: f64,
    pub c1: f64,
    pub c1_err: f64,
    pub gamma_over_nu: f64,
    pub gamma_over_nu_err: f64,
    pub chi_sq_chi_max: f64,
    pub ndof_chi_max: usize,
}

/// gamma/nu from the slope of ln chi'_max against ln L.
pub fn gamma_over_nu_log_log(points: &[PseudoCriticalPoint]) -> Result<f64> {
    if points.len() < 2 {
        return Err(AnalysisError::invalid("log-log slope needs at least 2 lattice sizes"));
    }
    if points.iter().any(|p| p.lattice_side == 0 || !(p.max_chi_prime > 0.0)) {
        return Err(AnalysisError::invalid(
            "lattice sizes and chi' maxima must be positive",
        ));
    }
    let pts: Vec<(f64, f64)> = points
        .iter()
        .map(|p| ((p.lattice_side as f64).ln(), p.max_chi_prime.ln()))
        .collect();
    let (slope, _) = linear_regression(&pts);
    if !slope.is_finite() {
        return Err(AnalysisError::invalid("log-log slope needs distinct lattice sizes"));
    }
    Ok(slope)
}

/// Initial `(c0, c1, e)` for `c0 + c1 x^(sign e)`: with `e` fixed the model is linear.
fn power_law_guess(xs: &[f64], ys: &[f64], sign: f64, exponent: f64) -> [f64; 3] {
    let pts: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| (x.powf(sign * exponent), y))
        .collect();
    let (c1, c0) = linear_regression(&pts);
    if c0.is_finite() && c1.is_finite() {
        [c0, c1, exponent]
    } else {
        [ys[ys.len() - 1], 1.0, exponent]
    }
}

/// Fit `beta_pc(L) = beta_c + b L^(-1/nu)` and `chi'_max(L) = c0 + c1 L^(gamma/nu)`
/// for each `l_min`, weighting by the absolute uncertainties of the inputs.
pub fn fit_critical_exponents(
    points: &[PseudoCriticalPoint],
    l_min_values: &[usize],
) -> Result<Vec<CriticalFit>> {
    let options = FitOptions {
        absolute_sigma: true,
        ..FitOptions::default()
    };
    let shift = OffsetPowerLaw { sign: -1.0 };
    let growth = OffsetPowerLaw { sign: 1.0 };

    l_min_values
        .iter()
        .map(|&l_min| {
            let mut subset: Vec<PseudoCriticalPoint> = points
                .iter()
                .filter(|p| p.lattice_side >= l_min)
                .copied()
                .collect();
            subset.sort_by_key(|p| p.lattice_side);

            let ls: Vec<f64> = subset.iter().map(|p| p.lattice_side as f64).collect();
            let beta_pc: Vec<f64> = subset.iter().map(|p| p.beta_pc).collect();
            let sigma_beta: Vec<f64> = subset.iter().map(|p| p.sigma_beta_pc).collect();
            let chi_max: Vec<f64> = subset.iter().map(|p| p.max_chi_prime).collect();
            let sigma_chi: Vec<f64> = subset.iter().map(|p| p.sigma_max_chi_prime).collect();
            if subset.len() < 4 {
                return Err(AnalysisError::invalid(format!(
                    "L_min = {} leaves {} lattice sizes, need at least 4",
                    l_min,
                    subset.len()
                )));
            }

            let p0_beta = power_law_guess(&ls, &beta_pc, -1.0, 1.5);
            let beta_fit = least_squares(&shift, &ls, &beta_pc, Some(&sigma_beta), &p0_beta, &options)?;

            let slope = gamma_over_nu_log_log(&subset).unwrap_or(2.0);
            let p0_chi = power_law_guess(&ls, &chi_max, 1.0, slope);
            let chi_fit = least_squares(&growth, &ls, &chi_max, Some(&sigma_chi), &p0_chi, &options)?;

            let be = beta_fit.std_errors();
            let ce = chi_fit.std_errors();
            info!(
                l_min,
                beta_c = beta_fit.params[0],
                nu_inv = beta_fit.params[2],
                gamma_over_nu = chi_fit.params[2],
                "critical exponents fitted"
            );
            Ok(CriticalFit {
                l_min,
                beta_c: beta_fit.params[0],
                beta_c_err: be[0],
                b: beta_fit.params[1],
                b_err: be[1],
                nu_inv: beta_fit.params[2],
                nu_inv_err: be[2],
                chi_sq_beta_pc: beta_fit.chi_squared,
                ndof_beta_pc: beta_fit.ndof,
                c0: chi_fit.params[0],
                c0_err: ce[0],
                c1: chi_fit.params[1],
                c1_err: ce[1],
                gamma_over_nu: chi_fit.params[2],
                gamma_over_nu_err: ce[2],
                chi_sq_chi_max: chi_fit.chi_squared,
                ndof_chi_max: chi_fit.ndof,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanStd {
    pub mean: f64,
    /// Sample standard deviation; `None` for a single value.
    pub std_dev: Option<f64>,
}

impl MeanStd {
    fn of(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = (values.len() > 1).then(|| {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        });
        Self { mean, std_dev }
    }
}

/// Spread of gamma/nu and 1/nu across the `l_min` choices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExponentSummary {
    pub gamma_over_nu: MeanStd,
    pub nu_inv: MeanStd,
}

pub fn summarize_exponents(fits: &[CriticalFit]) -> Result<ExponentSummary> {
    if fits.is_empty() {
        return Err(AnalysisError::invalid("no critical fits to summarize"));
    }
    let gamma: Vec<f64> = fits.iter().map(|f| f.gamma_over_nu).collect();
    let nu_inv: Vec<f64> = fits.iter().map(|f| f.nu_inv).collect();
    Ok(ExponentSummary {
        gamma_over_nu: MeanStd::of(&gamma),
        nu_inv: MeanStd::of(&nu_inv),
    })
}
