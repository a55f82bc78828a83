// fit.rs - Levenberg-Marquardt least squares and the blocking plateau model

use nalgebra::{DMatrix, DVector, Matrix3};
use tracing::debug;

use crate::error::{AnalysisError, Result};

/// A model `y = f(x; p)` with an analytic gradient in the parameters.
pub trait FitModel {
    fn n_params(&self) -> usize;
    fn value(&self, x: f64, params: &[f64]) -> f64;
    /// Writes `df/dp_j` into `grad[j]`.
    fn gradient(&self, x: f64, params: &[f64], grad: &mut [f64]);
}

/// Saturating blocking curve `a * (1 - exp(-b * k^m))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlateauModel;

impl FitModel for PlateauModel {
    fn n_params(&self) -> usize {
        3
    }

    fn value(&self, k: f64, p: &[f64]) -> f64 {
        p[0] * (1.0 - (-p[1] * k.powf(p[2])).exp())
    }

    fn gradient(&self, k: f64, p: &[f64], grad: &mut [f64]) {
        let (a, b, m) = (p[0], p[1], p[2]);
        let km = k.powf(m);
        let e = (-b * km).exp();
        grad[0] = 1.0 - e;
        grad[1] = a * e * km;
        grad[2] = a * e * b * km * k.ln();
    }
}

/// Finite-size scaling law `c0 + c1 * x^(sign * e)`.
///
/// `sign = -1` gives the pseudo-critical shift `beta_c + b L^(-1/nu)`,
/// `sign = +1` the peak growth `c0 + c1 L^(gamma/nu)`.
#[derive(Debug, Clone, Copy)]
pub struct OffsetPowerLaw {
    pub sign: f64,
}

impl FitModel for OffsetPowerLaw {
    fn n_params(&self) -> usize {
        3
    }

    fn value(&self, x: f64, p: &[f64]) -> f64 {
        p[0] + p[1] * x.powf(self.sign * p[2])
    }

    fn gradient(&self, x: f64, p: &[f64], grad: &mut [f64]) {
        let pw = x.powf(self.sign * p[2]);
        grad[0] = 1.0;
        grad[1] = pw;
        grad[2] = p[1] * pw * self.sign * x.ln();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Budget of model evaluations over the whole data set.
    pub max_evaluations: usize,
    /// Relative reduction of the cost below which the fit has converged.
    pub ftol: f64,
    /// Relative step size below which the fit has converged.
    pub xtol: f64,
    /// Largest gradient component accepted as stationary.
    pub gtol: f64,
    /// Treat `sigma` as absolute errors instead of relative weights.
    pub absolute_sigma: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 4000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 0.0,
            absolute_sigma: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitResult {
    pub params: DVector<f64>,
    pub covariance: DMatrix<f64>,
    /// Weighted sum of squared residuals at the optimum.
    pub chi_squared: f64,
    pub ndof: usize,
    pub evaluations: usize,
}

impl FitResult {
    pub fn std_errors(&self) -> Vec<f64> {
        self.covariance.diagonal().iter().map(|v| v.sqrt()).collect()
    }

    /// Correlation matrix `cov_ij / (s_i s_j)`.
    pub fn correlation(&self) -> DMatrix<f64> {
        let s = self.std_errors();
        DMatrix::from_fn(s.len(), s.len(), |i, j| self.covariance[(i, j)] / (s[i] * s[j]))
    }
}

struct Problem<'a, M: FitModel> {
    model: &'a M,
    xs: &'a [f64],
    ys: &'a [f64],
    inv_sigma: Vec<f64>,
}

impl<M: FitModel> Problem<'_, M> {
    fn residuals(&self, p: &DVector<f64>) -> Option<DVector<f64>> {
        let r = DVector::from_iterator(
            self.xs.len(),
            self.xs
                .iter()
                .zip(self.ys)
                .zip(&self.inv_sigma)
                .map(|((&x, &y), &w)| (y - self.model.value(x, p.as_slice())) * w),
        );
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self, p: &DVector<f64>) -> DMatrix<f64> {
        let n_params = self.model.n_params();
        let mut jac = DMatrix::zeros(self.xs.len(), n_params);
        let mut grad = vec![0.0; n_params];
        for (i, (&x, &w)) in self.xs.iter().zip(&self.inv_sigma).enumerate() {
            self.model.gradient(x, p.as_slice(), &mut grad);
            for (j, g) in grad.iter().enumerate() {
                jac[(i, j)] = g * w;
            }
        }
        jac
    }
}

/// Nonlinear least squares by Levenberg-Marquardt.
///
/// `sigma` weights the residuals; without it every point has unit weight and
/// the covariance is rescaled by `chi^2 / ndof` like an unweighted fit.
/// Exhausting `max_evaluations` or a singular normal matrix at the optimum is
/// a [`AnalysisError::FitFailure`].
pub fn least_squares<M: FitModel>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    sigma: Option<&[f64]>,
    p0: &[f64],
    options: &FitOptions,
) -> Result<FitResult> {
    let n_params = model.n_params();
    if xs.len() != ys.len() {
        return Err(AnalysisError::mismatch(format!(
            "{} abscissae but {} ordinates",
            xs.len(),
            ys.len()
        )));
    }
    if p0.len() != n_params {
        return Err(AnalysisError::invalid(format!(
            "model has {} parameters, initial guess has {}",
            n_params,
            p0.len()
        )));
    }
    if xs.len() <= n_params {
        return Err(AnalysisError::invalid(format!(
            "{} points cannot constrain {} parameters",
            xs.len(),
            n_params
        )));
    }
    let inv_sigma = match sigma {
        Some(s) if s.len() != xs.len() => {
            return Err(AnalysisError::mismatch(format!(
                "{} points but {} uncertainties",
                xs.len(),
                s.len()
            )))
        }
        Some(s) => {
            if s.iter().any(|&v| !(v > 0.0) || !v.is_finite()) {
                return Err(AnalysisError::invalid("uncertainties must be positive and finite"));
            }
            s.iter().map(|v| 1.0 / v).collect()
        }
        None => vec![1.0; xs.len()],
    };
    let problem = Problem { model, xs, ys, inv_sigma };

    let mut p = DVector::from_column_slice(p0);
    let mut r = problem
        .residuals(&p)
        .ok_or_else(|| AnalysisError::fit("model is not finite at the initial guess"))?;
    let mut evaluations = 1;
    let mut cost = r.norm_squared();
    let mut lambda = 1e-3;

    'outer: loop {
        let jac = problem.jacobian(&p);
        let jtj = jac.transpose() * &jac;
        let g = jac.transpose() * &r;
        if g.amax() <= options.gtol || cost == 0.0 {
            break;
        }

        loop {
            if evaluations >= options.max_evaluations {
                return Err(AnalysisError::fit(format!(
                    "no convergence within {} evaluations",
                    options.max_evaluations
                )));
            }
            let mut damped = jtj.clone();
            for i in 0..n_params {
                damped[(i, i)] += lambda * jtj[(i, i)].max(f64::MIN_POSITIVE);
            }
            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&g),
                None => {
                    lambda *= 10.0;
                    if lambda > 1e20 {
                        return Err(AnalysisError::fit("damped normal matrix is singular"));
                    }
                    continue;
                }
            };

            let trial = &p + &step;
            let trial_r = problem.residuals(&trial);
            evaluations += 1;
            let trial_cost = trial_r.as_ref().map_or(f64::INFINITY, |v| v.norm_squared());

            if trial_cost < cost {
                let reduction = (cost - trial_cost) / cost;
                let small_step = step.norm() <= options.xtol * (trial.norm() + options.xtol);
                p = trial;
                r = trial_r.unwrap_or_else(|| DVector::zeros(xs.len()));
                cost = trial_cost;
                lambda = (lambda / 10.0).max(1e-15);
                if reduction <= options.ftol || small_step {
                    break 'outer;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > 1e16 {
                // no downhill step left at working precision
                break 'outer;
            }
        }
    }

    let jac = problem.jacobian(&p);
    let jtj = jac.transpose() * &jac;
    let inverse = jtj
        .cholesky()
        .map(|chol| chol.inverse())
        .ok_or_else(|| AnalysisError::fit("singular covariance at the optimum"))?;
    let ndof = xs.len() - n_params;
    let covariance = if sigma.is_some() && options.absolute_sigma {
        inverse
    } else {
        inverse * (cost / ndof as f64)
    };
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::fit("covariance is not finite"));
    }
    debug!(evaluations, chi_squared = cost, "least squares converged");

    Ok(FitResult {
        params: p,
        covariance,
        chi_squared: cost,
        ndof,
        evaluations,
    })
}

/// Parameters of the plateau model `a * (1 - exp(-b * k^m))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateauParams {
    pub a: f64,
    pub b: f64,
    pub m: f64,
}

impl PlateauParams {
    /// Starting point for a plateau fit.
    ///
    /// `a0` is the largest observed variance. With `m0 = 1`, `b0` solves the
    /// model at an early data point so the initial curve rises through it.
    pub fn initial_guess(block_sizes: &[f64], variances: &[f64]) -> Result<Self> {
        if block_sizes.len() != variances.len() {
            return Err(AnalysisError::mismatch(format!(
                "{} block sizes but {} variances",
                block_sizes.len(),
                variances.len()
            )));
        }
        let a = variances.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !(a > 0.0) || !a.is_finite() {
            return Err(AnalysisError::invalid("variances must contain a positive value"));
        }
        let j = 3.min(block_sizes.len() - 1);
        let (k, v) = (block_sizes[j], variances[j]);
        let ratio = v / a;
        let b = if ratio > 0.0 && ratio < 1.0 {
            -(1.0 - ratio).ln() / k
        } else {
            1.0 / k
        };
        Ok(Self { a, b, m: 1.0 })
    }

    pub fn eval(&self, k: f64) -> f64 {
        PlateauModel.value(k, &[self.a, self.b, self.m])
    }
}

#[derive(Debug, Clone)]
pub struct PlateauFit {
    pub params: PlateauParams,
    /// Covariance of `(a, b, m)`.
    pub covariance: Matrix3<f64>,
    /// Only block sizes strictly below this entered the fit.
    pub cutoff: f64,
    pub n_points: usize,
    pub chi_squared: f64,
    pub evaluations: usize,
}

impl PlateauFit {
    pub fn std_errors(&self) -> [f64; 3] {
        [
            self.covariance[(0, 0)].sqrt(),
            self.covariance[(1, 1)].sqrt(),
            self.covariance[(2, 2)].sqrt(),
        ]
    }

    /// Autocorrelation-corrected standard deviation of the sample mean, `sqrt(a)`.
    pub fn plateau_std_dev(&self) -> f64 {
        self.params.a.sqrt()
    }

    /// `(fit - data) / data` for every block size below the cutoff.
    pub fn relative_residuals(&self, block_sizes: &[f64], variances: &[f64]) -> Vec<(f64, f64)> {
        block_sizes
            .iter()
            .zip(variances)
            .filter(|(&k, _)| k < self.cutoff)
            .map(|(&k, &v)| (k, (self.params.eval(k) - v) / v))
            .collect()
    }
}

/// Fit the saturating model to a variance-vs-block-size curve.
///
/// Only block sizes `< cutoff` are used; pass `f64::INFINITY` to use all of
/// them. Without `initial_guess` the [`PlateauParams::initial_guess`] policy
/// is applied to the full curve.
pub fn fit_plateau(
    block_sizes: &[f64],
    variances: &[f64],
    cutoff: f64,
    initial_guess: Option<PlateauParams>,
) -> Result<PlateauFit> {
    if block_sizes.len() != variances.len() {
        return Err(AnalysisError::mismatch(format!(
            "{} block sizes but {} variances",
            block_sizes.len(),
            variances.len()
        )));
    }
    if block_sizes.iter().any(|&k| !(k > 0.0)) {
        return Err(AnalysisError::invalid("block sizes must be positive"));
    }
    let guess = match initial_guess {
        Some(g) => g,
        None => PlateauParams::initial_guess(block_sizes, variances)?,
    };

    let (xs, ys): (Vec<f64>, Vec<f64>) = block_sizes
        .iter()
        .zip(variances)
        .filter(|(&k, _)| k < cutoff)
        .map(|(&k, &v)| (k, v))
        .unzip();

    let fit = least_squares(
        &PlateauModel,
        &xs,
        &ys,
        None,
        &[guess.a, guess.b, guess.m],
        &FitOptions::default(),
    )?;
    let p = &fit.params;

    Ok(PlateauFit {
        params: PlateauParams { a: p[0], b: p[1], m: p[2] },
        covariance: Matrix3::from_iterator(fit.covariance.iter().cloned()),
        cutoff,
        n_points: xs.len(),
        chi_squared: fit.chi_squared,
        evaluations: fit.evaluations,
    })
}
