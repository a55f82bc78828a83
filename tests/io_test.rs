use std::fs;

use tempfile::tempdir;

use mc_analysis::blocking::BlockingCurve;
use mc_analysis::finite_size::PseudoCriticalPoint;
use mc_analysis::io::{
    collect_input_files, load_binary_records, load_measurement_series, read_blocking_curves,
    read_fss_column, read_pseudo_critical, read_rows, resolve_output_path, write_binary_records,
    write_blocking_curves, write_rows, JackknifeRow, OverwritePolicy,
};
use mc_analysis::AnalysisError;

#[test]
fn test_binary_records_and_thermalization_cut() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data_b0.44_L8.bin");
    let records: Vec<Vec<f64>> = (0..10)
        .map(|i| vec![i as f64 * 0.1, 0.0, -(i as f64)])
        .collect();
    write_binary_records(&path, &records).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 10 * 3 * 8);
    assert_eq!(load_binary_records(&path, 3).unwrap(), records);

    let series = load_measurement_series(&path, 4).unwrap();
    assert_eq!(series.len(), 6);
    assert_eq!(series.mx[0], 0.4);
    assert_eq!(series.epsilon[0], -4.0);

    let err = load_measurement_series(&path, 10).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidParameter(_)));
}

#[test]
fn test_blocking_curves_with_gaps() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("curves.csv");
    let a: BlockingCurve = [(1, 0.5), (2, 0.75), (4, 1.0)].into_iter().collect();
    let b: BlockingCurve = [(1, 2.0), (2, 3.0)].into_iter().collect();
    write_blocking_curves(&path, &[("m2".to_string(), a.clone()), ("absm".to_string(), b.clone())])
        .unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("block_size,var_m2,var_absm"));

    let curves = read_blocking_curves(&path).unwrap();
    assert_eq!(curves, vec![("m2".to_string(), a), ("absm".to_string(), b)]);
}

#[test]
fn test_overwrite_policies() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.csv");
    assert_eq!(resolve_output_path(&path, OverwritePolicy::Skip), Some(path.clone()));

    fs::write(&path, "x").unwrap();
    assert_eq!(resolve_output_path(&path, OverwritePolicy::Overwrite), Some(path.clone()));
    assert_eq!(resolve_output_path(&path, OverwritePolicy::Skip), None);
    assert_eq!(
        resolve_output_path(&path, OverwritePolicy::Rename),
        Some(dir.path().join("out_v1.csv"))
    );
    fs::write(dir.path().join("out_v1.csv"), "x").unwrap();
    assert_eq!(
        resolve_output_path(&path, OverwritePolicy::Rename),
        Some(dir.path().join("out_v2.csv"))
    );
}

#[test]
fn test_jackknife_rows_use_short_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("jk.csv");
    let rows = vec![
        JackknifeRow { lattice_side: 8, beta: 0.44, block_size: 1, var_chi_prime: 0.1, var_u: 0.01 },
        JackknifeRow { lattice_side: 8, beta: 0.44, block_size: 2, var_chi_prime: 0.2, var_u: 0.02 },
    ];
    write_rows(&path, &rows).unwrap();
    let header = fs::read_to_string(&path).unwrap().lines().next().unwrap().to_string();
    assert_eq!(header, "L,beta,block_size,var_chi_prime,var_U");
    let back: Vec<JackknifeRow> = read_rows(&path).unwrap();
    assert_eq!(back, rows);
}

#[test]
fn test_fss_tables() {
    let dir = tempdir().unwrap();
    let means = dir.path().join("means.csv");
    fs::write(&means, "L,beta,chi_prime,U\n8,0.44,12.5,1.3\n16,0.44,40.0,1.25\n").unwrap();
    let rows = read_fss_column(&means, "chi_prime").unwrap();
    assert_eq!(rows, vec![(8, 0.44, 12.5), (16, 0.44, 40.0)]);
    assert!(matches!(read_fss_column(&means, "C"), Err(AnalysisError::Format(_))));

    let pc = dir.path().join("pc.csv");
    fs::write(
        &pc,
        "L,beta_pc,sigma_beta_pc,max_chi_prime,sigma_max_chi_prime\n12,0.451,0.0002,150.0,3.0\n",
    )
    .unwrap();
    let points: Vec<PseudoCriticalPoint> = read_pseudo_critical(&pc).unwrap();
    assert_eq!(points[0].lattice_side, 12);
    assert_eq!(points[0].max_chi_prime, 150.0);
}

#[test]
fn test_collect_input_files() {
    let dir = tempdir().unwrap();
    for name in ["b.bin", "a.bin", "notes.txt"] {
        fs::write(dir.path().join(name), b"").unwrap();
    }
    let extra = dir.path().join("notes.txt");
    let files = collect_input_files(&[dir.path().to_path_buf(), extra.clone()], "bin").unwrap();
    assert_eq!(files, vec![dir.path().join("a.bin"), dir.path().join("b.bin"), extra]);
}
