// analysis.rs - Batch drivers composing the blocking, jackknife and fit stages
//
// The core functions fail loudly per call. Drivers in this module decide what
// a batch does with a failed unit: column-wise blocking skips and logs it,
// everything else propagates.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::blocking::{block_series, block_variance_curve, run_in_pool, BlockingCurve};
use crate::derivative::plateau_cutoff;
use crate::error::{AnalysisError, Result};
use crate::fit::{fit_plateau, PlateauFit};
use crate::io::JackknifeRow;
use crate::measure::MeasurementSeries;
use crate::observables::{DerivedObservable, SusceptibilityScale};

/// Simulation parameters attached to one measurement series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeRun {
    pub lattice_side: usize,
    pub beta: f64,
    pub dimension: u32,
}

/// Blocking curve for each named column; failing columns are logged and skipped.
pub fn blocking_analysis(
    series: &MeasurementSeries,
    columns: &[&str],
    max_block_size: usize,
    num_cores: Option<usize>,
) -> Vec<(String, BlockingCurve)> {
    let mut curves = Vec::with_capacity(columns.len());
    for &name in columns {
        let Some(data) = series.column(name) else {
            warn!(column = name, "column not found, skipping");
            continue;
        };
        match block_variance_curve(data, max_block_size, num_cores) {
            Ok(curve) => {
                info!(column = name, sizes = curve.len(), "blocking curve computed");
                curves.push((name.to_string(), curve));
            }
            Err(err) => warn!(column = name, %err, "blocking failed, skipping"),
        }
    }
    curves
}

/// Jackknife + blocking result for one lattice run.
#[derive(Debug, Clone)]
pub struct JackknifeSummary {
    /// chi' from the raw moments.
    pub chi_prime: f64,
    /// Binder cumulant from the raw moments.
    pub binder: f64,
    /// Jackknife variances per block size, ascending.
    pub rows: Vec<JackknifeRow>,
}

/// Variances of chi' and U for every block size in `1..=max_block_size`.
pub fn jackknife_blocking_analysis(
    series: &MeasurementSeries,
    run: &LatticeRun,
    max_block_size: usize,
    num_cores: Option<usize>,
) -> Result<JackknifeSummary> {
    if max_block_size == 0 || series.len() / max_block_size < 2 {
        return Err(AnalysisError::invalid(format!(
            "max block size {} too large for {} samples",
            max_block_size,
            series.len()
        )));
    }
    let chi = DerivedObservable::ChiPrime(SusceptibilityScale::new(
        run.beta,
        run.lattice_side,
        run.dimension,
    ));
    let binder = DerivedObservable::Binder;

    let chi_prime = chi.point_estimate(&[&series.absm, &series.m2])?;
    let binder_value = binder.point_estimate(&[&series.m2, &series.m4])?;

    let block_sizes: Vec<usize> = (1..=max_block_size).collect();
    let rows = run_in_pool(num_cores, || {
        block_sizes
            .par_iter()
            .map(|&k| {
                let absm = block_series(&series.absm, k)?;
                let m2 = block_series(&series.m2, k)?;
                let m4 = block_series(&series.m4, k)?;
                Ok(JackknifeRow {
                    lattice_side: run.lattice_side,
                    beta: run.beta,
                    block_size: k,
                    var_chi_prime: chi.jackknife_variance(&[&absm, &m2])?,
                    var_u: binder.jackknife_variance(&[&m2, &m4])?,
                })
            })
            .collect::<Result<Vec<JackknifeRow>>>()
    })??;
    info!(
        L = run.lattice_side,
        beta = run.beta,
        chi_prime,
        binder = binder_value,
        "jackknife analysis done"
    );

    Ok(JackknifeSummary {
        chi_prime,
        binder: binder_value,
        rows,
    })
}

/// Where the fit cutoff came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffSource {
    /// First zero of the log-log slope of the blocking curve.
    Derivative,
    /// Supplied by the caller because the slope never crossed zero.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct PlateauReport {
    pub cutoff_source: CutoffSource,
    pub fit: PlateauFit,
    /// Square root of the `k = 1` variance, when present: the uncorrected error bar.
    pub naive_std_dev: Option<f64>,
}

impl PlateauReport {
    /// Corrected error bar over the naive one, `sqrt(2 tau_int)` for a Markov chain.
    pub fn error_inflation(&self) -> Option<f64> {
        self.naive_std_dev.map(|naive| self.fit.plateau_std_dev() / naive)
    }
}

/// Automatic cutoff followed by the plateau fit.
///
/// If the derivative has no root the explicit `fallback_cutoff` is used; with
/// no fallback the [`AnalysisError::RootNotFound`] is returned.
pub fn plateau_analysis(
    curve: &BlockingCurve,
    locality: usize,
    fallback_cutoff: Option<f64>,
) -> Result<PlateauReport> {
    let (cutoff, cutoff_source) = match plateau_cutoff(curve, locality) {
        Ok(cutoff) => (cutoff, CutoffSource::Derivative),
        Err(AnalysisError::RootNotFound(msg)) => match fallback_cutoff {
            Some(cutoff) => {
                warn!(%msg, cutoff, "using caller-supplied cutoff");
                (cutoff, CutoffSource::Fallback)
            }
            None => return Err(AnalysisError::RootNotFound(msg)),
        },
        Err(err) => return Err(err),
    };

    let sizes: Vec<f64> = curve.keys().map(|&k| k as f64).collect();
    let variances: Vec<f64> = curve.values().copied().collect();
    let fit = fit_plateau(&sizes, &variances, cutoff, None)?;

    Ok(PlateauReport {
        cutoff_source,
        fit,
        naive_std_dev: curve.get(&1).map(|v| v.sqrt()),
    })
}
