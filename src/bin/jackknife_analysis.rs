// src/bin/jackknife_analysis.rs - Jackknife variances of chi' and U versus block size

use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mc_analysis::analysis::{jackknife_blocking_analysis, LatticeRun};
use mc_analysis::config::AnalysisConfig;
use mc_analysis::io::{
    beta_from_path, collect_input_files, ensure_directory, lattice_side_from_path,
    load_measurement_series, resolve_output_path, write_rows, OverwritePolicy,
};
use mc_analysis::observables::DerivedObservable;

#[derive(Parser)]
struct Cli {
    /// YAML configuration; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Binary files named like `data_b0.456_a1.0_L15.bin`, or directories of them
    #[arg(long, value_delimiter = ',')]
    inputs: Vec<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    first_index: Option<usize>,

    #[arg(long)]
    max_block_size: Option<usize>,

    #[arg(long)]
    num_cores: Option<usize>,

    /// Lattice dimension D in beta * L^D
    #[arg(long)]
    dimension: Option<u32>,

    #[arg(long, value_enum)]
    overwrite: Option<OverwritePolicy>,
}

/// Point estimates per run, from the raw moments.
#[derive(Serialize)]
struct SummaryRow {
    #[serde(rename = "L")]
    lattice_side: usize,
    beta: f64,
    n_samples: usize,
    absm: f64,
    chi_prime: f64,
    #[serde(rename = "U")]
    binder: f64,
    #[serde(rename = "C")]
    specific_heat: f64,
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
    if !args.inputs.is_empty() {
        cfg.paths.inputs = args.inputs.clone();
    }
    if let Some(dir) = args.output_dir {
        cfg.paths.output_dir = dir;
    }
    let s = &mut cfg.settings;
    s.first_index = args.first_index.unwrap_or(s.first_index);
    s.max_block_size = args.max_block_size.unwrap_or(s.max_block_size);
    s.num_cores = args.num_cores.or(s.num_cores);
    s.dimension = args.dimension.unwrap_or(s.dimension);
    s.overwrite = args.overwrite.unwrap_or(s.overwrite);
    cfg.validate()?;
    let settings = cfg.settings.clone();

    let files = collect_input_files(&cfg.paths.inputs, "bin")?;
    if files.is_empty() {
        return Err("no input files".into());
    }
    ensure_directory(&cfg.paths.output_dir)?;

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        " {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}"
    )?);

    let mut summary = Vec::new();
    for path in &files {
        bar.set_message(path.display().to_string());
        let (Some(lattice_side), Some(beta)) = (lattice_side_from_path(path), beta_from_path(path)) else {
            warn!(path = %path.display(), "no L or beta in file name, skipping");
            bar.inc(1);
            continue;
        };
        let run = LatticeRun { lattice_side, beta, dimension: settings.dimension };

        let series = match load_measurement_series(path, settings.first_index) {
            Ok(series) => series,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping file");
                bar.inc(1);
                continue;
            }
        };
        let max_block = settings.max_block_size.min(series.len() / 2);
        let result = jackknife_blocking_analysis(&series, &run, max_block, settings.num_cores)?;

        let heat = DerivedObservable::SpecificHeat { lattice_side, dimension: settings.dimension };
        let eps2 = series.epsilon_squared();
        summary.push(SummaryRow {
            lattice_side,
            beta,
            n_samples: series.len(),
            absm: series.absm.iter().sum::<f64>() / series.len() as f64,
            chi_prime: result.chi_prime,
            binder: result.binder,
            specific_heat: heat.point_estimate(&[&series.epsilon, &eps2])?,
        });

        let target = cfg.paths.output_dir.join(format!("jackknife_L{lattice_side}_b{beta}.csv"));
        if let Some(target) = resolve_output_path(&target, settings.overwrite) {
            write_rows(&target, &result.rows)?;
            info!(output = %target.display(), rows = result.rows.len(), "wrote jackknife variances");
        }
        bar.inc(1);
    }
    bar.finish();

    summary.sort_by(|a, b| a.lattice_side.cmp(&b.lattice_side).then(a.beta.total_cmp(&b.beta)));
    let target = cfg.paths.output_dir.join("observables_summary.csv");
    if let Some(target) = resolve_output_path(&target, settings.overwrite) {
        write_rows(&target, &summary)?;
        println!("Summary of {} runs written to {}", summary.len(), target.display());
    }
    Ok(())
}
