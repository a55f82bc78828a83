// blocking.rs - Blocking estimator for the variance of the mean of a correlated series

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::error::{AnalysisError, Result};

/// Block size -> variance-of-the-mean estimate.
///
/// Keyed by block size so the result does not depend on the order in which
/// workers finish; iteration is always ascending in block size.
pub type BlockingCurve = BTreeMap<usize, f64>;

/// Number of blocks and the truncated prefix used for a given block size.
///
/// Shared by [`block_series`] and [`block_variance`] so the two can never
/// partition differently.
fn partition(series: &[f64], block_size: usize) -> Result<(usize, &[f64])> {
    if block_size == 0 {
        return Err(AnalysisError::invalid("block size must be positive"));
    }
    let n_blocks = series.len() / block_size;
    if n_blocks <= 1 {
        return Err(AnalysisError::invalid(format!(
            "block size too large for dataset (N = {}, block size = {})",
            series.len(),
            block_size
        )));
    }
    // The trailing N mod k samples are dropped so that all blocks have length k.
    Ok((n_blocks, &series[..n_blocks * block_size]))
}

fn block_means(truncated: &[f64], block_size: usize) -> Vec<f64> {
    truncated
        .chunks_exact(block_size)
        .map(|block| block.iter().sum::<f64>() / block_size as f64)
        .collect()
}

/// Means of the contiguous, non-overlapping blocks of length `block_size`.
///
/// The result has length `N / block_size`; at least two blocks are required.
pub fn block_series(series: &[f64], block_size: usize) -> Result<Vec<f64>> {
    let (_, truncated) = partition(series, block_size)?;
    Ok(block_means(truncated, block_size))
}

/// Blocking estimate of the variance of the sample mean.
///
/// `sum((mean_i - mean)^2) / (n_blocks * (n_blocks - 1))`, centred on the mean
/// of the truncated series. For `block_size == 1` this is `Var(x, ddof=1) / N`.
pub fn block_variance(series: &[f64], block_size: usize) -> Result<f64> {
    let (n_blocks, truncated) = partition(series, block_size)?;
    let means = block_means(truncated, block_size);
    let grand_mean = truncated.iter().sum::<f64>() / truncated.len() as f64;
    let ss: f64 = means.iter().map(|&m| (m - grand_mean).powi(2)).sum();
    Ok(ss / (n_blocks * (n_blocks - 1)) as f64)
}

/// Run `op` on a dedicated pool of `num_cores` workers, or on the global pool.
pub(crate) fn run_in_pool<T, F>(num_cores: Option<usize>, op: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match num_cores {
        Some(0) => Err(AnalysisError::invalid("number of cores must be positive")),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            Ok(pool.install(op))
        }
        None => Ok(op()),
    }
}

fn check_block_sizes(series: &[f64], block_sizes: &[usize]) -> Result<()> {
    if block_sizes.is_empty() {
        return Err(AnalysisError::invalid("no block sizes requested"));
    }
    for &k in block_sizes {
        partition(series, k)?;
    }
    Ok(())
}

/// [`block_variance`] for every block size in `1..=max_block_size`, in parallel.
pub fn block_variance_curve(
    series: &[f64],
    max_block_size: usize,
    num_cores: Option<usize>,
) -> Result<BlockingCurve> {
    let block_sizes: Vec<usize> = (1..=max_block_size).collect();
    block_variance_at(series, &block_sizes, num_cores)
}

/// [`block_variance`] for an arbitrary set of block sizes, in parallel.
///
/// All block sizes are validated before any worker starts.
pub fn block_variance_at(
    series: &[f64],
    block_sizes: &[usize],
    num_cores: Option<usize>,
) -> Result<BlockingCurve> {
    check_block_sizes(series, block_sizes)?;
    debug!(
        n = series.len(),
        sizes = block_sizes.len(),
        "computing blocking variance curve"
    );
    run_in_pool(num_cores, || {
        block_sizes
            .par_iter()
            .map(|&k| block_variance(series, k).map(|var| (k, var)))
            .collect::<Result<BlockingCurve>>()
    })?
}

/// Blocked series for every block size in `1..=max_block_size`, in parallel.
///
/// This is the input the jackknife stage consumes for each block size.
pub fn blocked_series_map(
    series: &[f64],
    max_block_size: usize,
    num_cores: Option<usize>,
) -> Result<BTreeMap<usize, Vec<f64>>> {
    let block_sizes: Vec<usize> = (1..=max_block_size).collect();
    check_block_sizes(series, &block_sizes)?;
    run_in_pool(num_cores, || {
        block_sizes
            .par_iter()
            .map(|&k| block_series(series, k).map(|blocked| (k, blocked)))
            .collect::<Result<BTreeMap<usize, Vec<f64>>>>()
    })?
}

/// Distinct integer block sizes, log-spaced over `[1, max_block_size]`.
///
/// `count` points are spaced evenly in log10, truncated to integers and
/// deduplicated, so small block sizes appear once each.
pub fn log_spaced_block_sizes(max_block_size: usize, count: usize) -> Vec<usize> {
    if max_block_size == 0 || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![1];
    }
    let top = (max_block_size as f64).log10();
    let mut sizes: Vec<usize> = (0..count)
        .map(|i| {
            let exponent = top * i as f64 / (count - 1) as f64;
            // nudge so exact powers of ten survive the truncation
            ((10f64.powf(exponent) + 1e-9) as usize).clamp(1, max_block_size)
        })
        .collect();
    sizes.dedup();
    sizes
}

/// Largest block size that still leaves `min_blocks` blocks.
pub fn max_block_size_for(n: usize, min_blocks: usize) -> usize {
    if min_blocks == 0 {
        n
    } else {
        n / min_blocks
    }
}
