// observables.rs - Derived observables and their jackknife variances
//
// Point estimates come from the raw (unblocked) sample moments. Blocking and
// jackknife only ever feed the variance, never the point estimate.

use crate::error::{AnalysisError, Result};
use crate::jackknife::jackknife_functional_variance;

/// Binder cumulant U = <m^4> / <m^2>^2.
pub fn binder_cumulant(m2: f64, m4: f64) -> f64 {
    m4 / (m2 * m2)
}

/// Volume and temperature prefactor `beta * L^D` of the susceptibility.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SusceptibilityScale {
    pub beta: f64,
    pub lattice_side: usize,
    pub dimension: u32,
}

impl SusceptibilityScale {
    pub fn new(beta: f64, lattice_side: usize, dimension: u32) -> Self {
        Self { beta, lattice_side, dimension }
    }

    pub fn factor(&self) -> f64 {
        self.beta * (self.lattice_side as f64).powi(self.dimension as i32)
    }
}

/// chi' = beta * L^D * (<m^2> - <m>^2).
pub fn chi_prime(m: f64, m2: f64, scale: &SusceptibilityScale) -> f64 {
    scale.factor() * (m2 - m * m)
}

/// Jackknife variance of the Binder cumulant from blocked `m^2` and `m^4` series.
pub fn binder_variance(m2_blocked: &[f64], m4_blocked: &[f64]) -> Result<f64> {
    jackknife_functional_variance(&[m2_blocked, m4_blocked], |x| binder_cumulant(x[0], x[1]))
}

/// Jackknife variance of chi' from blocked `m` and `m^2` series.
pub fn chi_prime_variance(
    m_blocked: &[f64],
    m2_blocked: &[f64],
    scale: &SusceptibilityScale,
) -> Result<f64> {
    jackknife_functional_variance(&[m_blocked, m2_blocked], |x| chi_prime(x[0], x[1], scale))
}

/// Table of nonlinear observables built from per-sample moments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DerivedObservable {
    /// Moments `(m^2, m^4)`.
    Binder,
    /// Moments `(|m|, m^2)`.
    ChiPrime(SusceptibilityScale),
    /// Moments `(e, e^2)`; C = L^D (<e^2> - <e>^2).
    SpecificHeat { lattice_side: usize, dimension: u32 },
}

impl DerivedObservable {
    pub fn name(&self) -> &'static str {
        match self {
            DerivedObservable::Binder => "U",
            DerivedObservable::ChiPrime(_) => "chi_prime",
            DerivedObservable::SpecificHeat { .. } => "C",
        }
    }

    /// Number of moment series the functional consumes.
    pub fn arity(&self) -> usize {
        2
    }

    /// Value of the observable for one set of moment means.
    pub fn evaluate(&self, moments: &[f64]) -> f64 {
        match self {
            DerivedObservable::Binder => binder_cumulant(moments[0], moments[1]),
            DerivedObservable::ChiPrime(scale) => chi_prime(moments[0], moments[1], scale),
            DerivedObservable::SpecificHeat { lattice_side, dimension } => {
                let volume = (*lattice_side as f64).powi(*dimension as i32);
                volume * (moments[1] - moments[0] * moments[0])
            }
        }
    }

    fn check_arity(&self, got: usize) -> Result<()> {
        if got != self.arity() {
            return Err(AnalysisError::mismatch(format!(
                "{} takes {} moment series, got {}",
                self.name(),
                self.arity(),
                got
            )));
        }
        Ok(())
    }

    /// Point estimate from the raw, unblocked moment series.
    pub fn point_estimate(&self, raw: &[&[f64]]) -> Result<f64> {
        self.check_arity(raw.len())?;
        let n = raw[0].len();
        if n == 0 {
            return Err(AnalysisError::invalid("empty moment series"));
        }
        if let Some(bad) = raw.iter().find(|s| s.len() != n) {
            return Err(AnalysisError::mismatch(format!(
                "moment series have lengths {} and {}",
                n,
                bad.len()
            )));
        }
        let means: Vec<f64> = raw
            .iter()
            .map(|s| s.iter().sum::<f64>() / n as f64)
            .collect();
        Ok(self.evaluate(&means))
    }

    /// Jackknife variance from blocked moment series of equal length.
    pub fn jackknife_variance(&self, blocked: &[&[f64]]) -> Result<f64> {
        self.check_arity(blocked.len())?;
        jackknife_functional_variance(blocked, |x| self.evaluate(x))
    }
}

/// Point estimate and jackknife variance of one observable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub variance: f64,
}

impl Estimate {
    pub fn std_error(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Estimate an observable: value from `raw` moments, variance from `blocked` ones.
pub fn estimate(
    observable: &DerivedObservable,
    raw: &[&[f64]],
    blocked: &[&[f64]],
) -> Result<Estimate> {
    Ok(Estimate {
        value: observable.point_estimate(raw)?,
        variance: observable.jackknife_variance(blocked)?,
    })
}
