// src/bin/fss_analysis.rs - Scaling collapse and critical exponents across lattice sizes

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mc_analysis::config::AnalysisConfig;
use mc_analysis::finite_size::{
    fit_critical_exponents, group_by_lattice, join_means_and_variances, rescale,
    summarize_exponents, CriticalExponents,
};
use mc_analysis::io::{read_fss_column, read_pseudo_critical, write_rows};

#[derive(Parser)]
struct Cli {
    /// YAML configuration providing `critical_values` and `dimension`
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Observable {
    ChiPrime,
    SpecificHeat,
    Magnetization,
}

#[derive(Subcommand)]
enum Command {
    /// Rescale an observable onto the universal curve
    Collapse {
        /// Table with columns L, beta and the observable mean
        #[arg(long)]
        means: PathBuf,
        #[arg(long)]
        mean_column: String,
        /// Table with columns L, beta and the variance of the mean
        #[arg(long)]
        variances: PathBuf,
        #[arg(long)]
        variance_column: String,
        #[arg(long, value_enum)]
        observable: Observable,
        #[arg(long)]
        beta_c: Option<f64>,
        #[arg(long)]
        nu: Option<f64>,
        #[arg(long)]
        gamma: Option<f64>,
        #[arg(long, default_value = "fss_collapse.csv")]
        output: PathBuf,
    },
    /// Fit beta_pc(L) and chi'_max(L) for several minimum lattice sizes
    Exponents {
        /// Table with columns L, beta_pc, sigma_beta_pc, max_chi_prime, sigma_max_chi_prime
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_delimiter = ',', default_value = "9,12,15")]
        l_min: Vec<usize>,
        #[arg(long, default_value = "critical_exponents.csv")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Cli::parse();
    let cfg = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };

    match args.command {
        Command::Collapse {
            means,
            mean_column,
            variances,
            variance_column,
            observable,
            beta_c,
            nu,
            gamma,
            output,
        } => {
            let from_config = cfg.critical_values;
            let pick = |flag: Option<f64>, field: fn(&CriticalExponents) -> f64, name: &str| {
                flag.or(from_config.as_ref().map(field))
                    .ok_or_else(|| format!("{name} not given on the command line or in the config"))
            };
            let critical = CriticalExponents {
                beta_c: pick(beta_c, |c| c.beta_c, "beta_c")?,
                nu: pick(nu, |c| c.nu, "nu")?,
                gamma: pick(gamma, |c| c.gamma, "gamma")?,
            };
            let dimension = cfg.settings.dimension;
            let exponent = match observable {
                Observable::ChiPrime => critical.susceptibility_exponent(),
                Observable::SpecificHeat => critical.specific_heat_exponent(dimension),
                Observable::Magnetization => critical.magnetization_exponent(dimension),
            };

            let points = join_means_and_variances(
                &read_fss_column(&means, &mean_column)?,
                &read_fss_column(&variances, &variance_column)?,
            )?;
            for (l, table) in group_by_lattice(&points) {
                println!("L = {:>3}: {} beta values", l, table.len());
            }
            let scaled = rescale(&points, &critical, exponent)?;
            write_rows(&output, &scaled)?;
            info!(output = %output.display(), points = scaled.len(), exponent, "wrote scaling collapse");
        }
        Command::Exponents { input, l_min, output } => {
            let points = read_pseudo_critical(&input)?;
            let fits = fit_critical_exponents(&points, &l_min)?;
            write_rows(&output, &fits)?;

            println!("{:>6} {:>22} {:>22} {:>22}", "L_min", "beta_c", "1/nu", "gamma/nu");
            for f in &fits {
                println!(
                    "{:>6} {:>12.6} ± {:<8.1e} {:>12.4} ± {:<8.1e} {:>12.4} ± {:<8.1e}",
                    f.l_min, f.beta_c, f.beta_c_err, f.nu_inv, f.nu_inv_err, f.gamma_over_nu, f.gamma_over_nu_err
                );
            }
            let summary = summarize_exponents(&fits)?;
            println!(
                "gamma/nu = {:.4} (spread {:?}), 1/nu = {:.4} (spread {:?})",
                summary.gamma_over_nu.mean,
                summary.gamma_over_nu.std_dev,
                summary.nu_inv.mean,
                summary.nu_inv.std_dev
            );
        }
    }
    Ok(())
}
