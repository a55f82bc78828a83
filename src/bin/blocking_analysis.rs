// src/bin/blocking_analysis.rs - Blocking variance curves for every measurement file

use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mc_analysis::analysis::blocking_analysis;
use mc_analysis::config::AnalysisConfig;
use mc_analysis::io::{
    collect_input_files, ensure_directory, load_measurement_series, resolve_output_path,
    write_blocking_curves, OverwritePolicy,
};
use mc_analysis::measure::COLUMNS;

#[derive(Parser)]
struct Cli {
    /// YAML configuration; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Binary measurement files or directories of them
    #[arg(long, value_delimiter = ',')]
    inputs: Vec<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Thermalization rows to discard
    #[arg(long)]
    first_index: Option<usize>,

    #[arg(long)]
    max_block_size: Option<usize>,

    #[arg(long)]
    num_cores: Option<usize>,

    #[arg(long, value_enum)]
    overwrite: Option<OverwritePolicy>,

    /// Columns to block (default: all)
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,
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
    s.overwrite = args.overwrite.unwrap_or(s.overwrite);
    cfg.validate()?;

    let columns: Vec<&str> = if args.columns.is_empty() {
        COLUMNS.to_vec()
    } else {
        args.columns.iter().map(String::as_str).collect()
    };

    let files = collect_input_files(&cfg.paths.inputs, "bin")?;
    if files.is_empty() {
        return Err("no input files".into());
    }
    ensure_directory(&cfg.paths.output_dir)?;
    info!(files = files.len(), max_block_size = cfg.settings.max_block_size, "blocking analysis");

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        " {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}"
    )?);

    for path in &files {
        bar.set_message(path.display().to_string());
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let target = cfg.paths.output_dir.join(format!("blocking_{stem}.csv"));
        let Some(target) = resolve_output_path(&target, cfg.settings.overwrite) else {
            bar.inc(1);
            continue;
        };

        let series = match load_measurement_series(path, cfg.settings.first_index) {
            Ok(series) => series,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping file");
                bar.inc(1);
                continue;
            }
        };
        let max_block = cfg.settings.max_block_size.min(series.len() / 2);
        let curves = blocking_analysis(&series, &columns, max_block, cfg.settings.num_cores);
        write_blocking_curves(&target, &curves)?;
        info!(output = %target.display(), columns = curves.len(), "wrote blocking curves");
        bar.inc(1);
    }
    bar.finish();
    Ok(())
}
