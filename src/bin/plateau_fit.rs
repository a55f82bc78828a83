// src/bin/plateau_fit.rs - Fit the saturating model to blocking curves

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mc_analysis::analysis::{plateau_analysis, CutoffSource};
use mc_analysis::blocking::{log_spaced_block_sizes, BlockingCurve};
use mc_analysis::config::AnalysisConfig;
use mc_analysis::io::{read_blocking_curves, resolve_output_path, write_rows, OverwritePolicy};

#[derive(Parser)]
struct Cli {
    /// YAML configuration; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Blocking curves written by `blocking_analysis`
    #[arg(long)]
    input: PathBuf,

    #[arg(long, default_value = "plateau_fits.csv")]
    output: PathBuf,

    /// Half-width of the derivative regression window
    #[arg(long)]
    locality: Option<usize>,

    /// Number of log-spaced block sizes kept from each curve (0 keeps all)
    #[arg(long)]
    block_size_count: Option<usize>,

    /// Cutoff used when the log-log slope never reaches zero
    #[arg(long)]
    fallback_cutoff: Option<f64>,

    #[arg(long, value_enum)]
    overwrite: Option<OverwritePolicy>,
}

#[derive(Serialize)]
struct PlateauRow {
    column: String,
    cutoff: f64,
    automatic_cutoff: bool,
    n_points: usize,
    a: f64,
    a_err: f64,
    b: f64,
    b_err: f64,
    m: f64,
    m_err: f64,
    std_dev: f64,
    naive_std_dev: Option<f64>,
    chi_squared: f64,
}

/// Keep only the log-spaced block sizes, so large block sizes do not dominate the fit.
fn thin_curve(curve: &BlockingCurve, count: usize) -> BlockingCurve {
    let Some(&max) = curve.keys().next_back() else {
        return BlockingCurve::new();
    };
    if count == 0 {
        return curve.clone();
    }
    log_spaced_block_sizes(max, count)
        .into_iter()
        .filter_map(|k| curve.get(&k).map(|&v| (k, v)))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Cli::parse();

    let mut cfg = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    let s = &mut cfg.settings;
    s.locality = args.locality.unwrap_or(s.locality);
    s.block_size_count = args.block_size_count.unwrap_or(s.block_size_count);
    s.overwrite = args.overwrite.unwrap_or(s.overwrite);
    cfg.validate()?;

    let Some(output) = resolve_output_path(&args.output, cfg.settings.overwrite) else {
        return Ok(());
    };

    let curves = read_blocking_curves(&args.input)?;
    let mut rows = Vec::new();
    for (column, curve) in &curves {
        let thinned = thin_curve(curve, cfg.settings.block_size_count);
        let report = match plateau_analysis(&thinned, cfg.settings.locality, args.fallback_cutoff) {
            Ok(report) => report,
            Err(err) => {
                warn!(column = %column, %err, "plateau fit failed");
                continue;
            }
        };
        let fit = &report.fit;
        let err = fit.std_errors();
        println!(
            "{:>8}: sigma = {:.6e} (naive {:.6e}), cutoff {:.1}, a = {:.4e} ± {:.1e}",
            column,
            fit.plateau_std_dev(),
            report.naive_std_dev.unwrap_or(f64::NAN),
            fit.cutoff,
            fit.params.a,
            err[0]
        );
        rows.push(PlateauRow {
            column: column.clone(),
            cutoff: fit.cutoff,
            automatic_cutoff: report.cutoff_source == CutoffSource::Derivative,
            n_points: fit.n_points,
            a: fit.params.a,
            a_err: err[0],
            b: fit.params.b,
            b_err: err[1],
            m: fit.params.m,
            m_err: err[2],
            std_dev: fit.plateau_std_dev(),
            naive_std_dev: report.naive_std_dev,
            chi_squared: fit.chi_squared,
        });
    }

    write_rows(&output, &rows)?;
    info!(output = %output.display(), fits = rows.len(), "wrote plateau fits");
    Ok(())
}
