use std::fs;

use approx::assert_relative_eq;
use tempfile::tempdir;

use mc_analysis::analysis::{
    blocking_analysis, jackknife_blocking_analysis, plateau_analysis, CutoffSource, LatticeRun,
};
use mc_analysis::blocking::{block_variance, BlockingCurve};
use mc_analysis::config::AnalysisConfig;
use mc_analysis::io::OverwritePolicy;
use mc_analysis::measure::{MeasurementSeries, COLUMNS};
use mc_analysis::observables::{binder_variance, chi_prime_variance, SusceptibilityScale};
use mc_analysis::synthetic::{ar1, iid_normal, thread_rng};
use mc_analysis::AnalysisError;

fn correlated_series(n: usize) -> MeasurementSeries {
    let mut series = MeasurementSeries::default();
    let mx = ar1(n, 0.7, 100);
    let my = ar1(n, 0.7, 101);
    let e = iid_normal(n, 102);
    for i in 0..n {
        series.push(0.5 + 0.1 * mx[i], 0.1 * my[i], -1.5 + 0.05 * e[i]);
    }
    series
}

#[test]
fn test_derived_columns() {
    let mut series = MeasurementSeries::default();
    series.push(3.0, 4.0, -2.0);
    assert_eq!(series.absm, vec![5.0]);
    assert_eq!(series.m2, vec![25.0]);
    assert_eq!(series.m4, vec![625.0]);
    assert_eq!(series.epsilon_squared(), vec![4.0]);
    for name in COLUMNS {
        assert!(series.column(name).is_some());
    }
    assert!(series.column("energy").is_none());
}

#[test]
fn test_blocking_analysis_skips_bad_columns() {
    let series = correlated_series(2000);
    let curves = blocking_analysis(&series, &["m2", "nonexistent", "absm"], 100, Some(2));
    let names: Vec<&str> = curves.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["m2", "absm"]);
    assert_eq!(curves[0].1.len(), 100);

    // block size 1500 leaves a single block for every column
    assert!(blocking_analysis(&series, &["m2"], 1500, None).is_empty());
}

#[test]
fn test_jackknife_rows_match_direct_computation() {
    let series = correlated_series(4000);
    let run = LatticeRun { lattice_side: 8, beta: 0.44, dimension: 2 };
    let summary = jackknife_blocking_analysis(&series, &run, 50, Some(2)).unwrap();
    assert_eq!(summary.rows.len(), 50);
    assert!(summary.rows.windows(2).all(|w| w[0].block_size < w[1].block_size));

    let scale = SusceptibilityScale::new(0.44, 8, 2);
    let row = summary.rows[9];
    assert_eq!(row.block_size, 10);
    let absm = mc_analysis::blocking::block_series(&series.absm, 10).unwrap();
    let m2 = mc_analysis::blocking::block_series(&series.m2, 10).unwrap();
    let m4 = mc_analysis::blocking::block_series(&series.m4, 10).unwrap();
    assert_relative_eq!(row.var_chi_prime, chi_prime_variance(&absm, &m2, &scale).unwrap(), max_relative = 1e-12);
    assert_relative_eq!(row.var_u, binder_variance(&m2, &m4).unwrap(), max_relative = 1e-12);

    let n = series.len() as f64;
    let mean_absm = series.absm.iter().sum::<f64>() / n;
    let mean_m2 = series.m2.iter().sum::<f64>() / n;
    assert_relative_eq!(summary.chi_prime, scale.factor() * (mean_m2 - mean_absm * mean_absm), max_relative = 1e-9);
}

#[test]
fn test_jackknife_rejects_oversized_blocks() {
    let series = correlated_series(100);
    let run = LatticeRun { lattice_side: 4, beta: 0.3, dimension: 2 };
    let err = jackknife_blocking_analysis(&series, &run, 60, None).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidParameter(_)));
}

#[test]
fn test_plateau_analysis_fallback() {
    // slope stays positive on 1..=100, so no automatic cutoff exists
    let curve: BlockingCurve = (1..=100usize)
        .map(|k| (k, 1.0 - (-0.05 * k as f64).exp()))
        .collect();
    assert!(matches!(plateau_analysis(&curve, 5, None), Err(AnalysisError::RootNotFound(_))));

    let report = plateau_analysis(&curve, 5, Some(1000.0)).unwrap();
    assert_eq!(report.cutoff_source, CutoffSource::Fallback);
    assert_eq!(report.fit.n_points, 100);
    assert_relative_eq!(report.fit.params.a, 1.0, max_relative = 1e-6);
    assert_relative_eq!(report.fit.params.b, 0.05, max_relative = 1e-5);
    let inflation = report.error_inflation().unwrap();
    assert_relative_eq!(inflation, (1.0 / curve[&1]).sqrt(), max_relative = 1e-5);
}

#[test]
fn test_iid_plateau_stays_at_naive_error() {
    let data = iid_normal(50_000, 77);
    let v1 = block_variance(&data, 1).unwrap();
    let curve = mc_analysis::blocking::block_variance_curve(&data, 100, None).unwrap();
    for (&k, &v) in &curve {
        let nb = (50_000 / k) as f64;
        assert!((v / v1 - 1.0).abs() < 5.0 * (2.0 / (nb - 1.0)).sqrt(), "k = {k}");
    }
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("analysis.yaml");
    fs::write(
        &path,
        "paths:\n  inputs: [runs/L8, runs/L16]\n  output_dir: out\n\
         settings:\n  first_index: 1000\n  num_cores: 4\n  overwrite: skip\n\
         critical_values:\n  beta_c: 0.4407\n  nu: 1.0\n  gamma: 1.75\n",
    )
    .unwrap();
    let cfg = AnalysisConfig::load(&path).unwrap();
    assert_eq!(cfg.paths.inputs.len(), 2);
    assert_eq!(cfg.settings.first_index, 1000);
    assert_eq!(cfg.settings.num_cores, Some(4));
    assert_eq!(cfg.settings.overwrite, OverwritePolicy::Skip);
    assert_eq!(cfg.settings.max_block_size, 5000);
    assert_eq!(cfg.critical_values.unwrap().gamma, 1.75);

    assert!(AnalysisConfig::from_yaml_str("settings:\n  num_cores: 0\n").is_err());
    assert!(matches!(
        AnalysisConfig::from_yaml_str("settings: [1, 2]"),
        Err(AnalysisError::Yaml(_))
    ));
}

#[test]
fn test_thread_rngs_are_reproducible_and_distinct() {
    use rand::Rng;
    let a: f64 = thread_rng(42, 0).gen();
    let b: f64 = thread_rng(42, 0).gen();
    let c: f64 = thread_rng(42, 1).gen();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(ar1(10, 0.5, 3), ar1(10, 0.5, 3));
}
