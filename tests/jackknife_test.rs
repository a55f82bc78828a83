use approx::assert_relative_eq;
use proptest::prelude::*;

use mc_analysis::blocking::{block_series, block_variance};
use mc_analysis::observables::binder_variance;
use mc_analysis::jackknife::{
    jackknife_functional_variance, jackknife_means, jackknife_replicas, jackknife_variance,
};
use mc_analysis::synthetic::ar1;
use mc_analysis::AnalysisError;

#[test]
fn test_jackknife_of_mean_matches_blocking() {
    let data = ar1(10_000, 0.7, 17);
    for k in [1usize, 8, 40] {
        let blocked = block_series(&data, k).unwrap();
        let jk = jackknife_variance(&jackknife_means(&blocked).unwrap()).unwrap();
        assert_relative_eq!(jk, block_variance(&data, k).unwrap(), max_relative = 1e-9);
    }
}

#[test]
fn test_replicas_have_one_entry_per_block() {
    let a = [1.0, 2.0, 3.0, 4.0];
    let b = [2.0, 2.0, 2.0, 2.0];
    let replicas = jackknife_replicas(&[&a, &b], |x| x[0] * x[1]).unwrap();
    assert_eq!(replicas.len(), 4);
    // leave out a[0] = 1: mean 3, times 2
    assert_relative_eq!(replicas[0], 6.0, max_relative = 1e-12);
}

#[test]
fn test_constant_functional_has_zero_variance() {
    let a = [0.3, 1.7, -2.0, 4.1, 0.0];
    let var = jackknife_functional_variance(&[&a], |_| 42.0).unwrap();
    assert_eq!(var, 0.0);
}

#[test]
fn test_single_block_rejected() {
    let err = jackknife_functional_variance(&[&[1.0]], |x| x[0]).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidParameter(_)));
    let err = jackknife_replicas(&[], |x: &[f64]| x[0]).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidParameter(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_variance_of_means_is_standard_error(
        data in prop::collection::vec(-100.0f64..100.0, 2..60),
    ) {
        let m = data.len() as f64;
        let mean = data.iter().sum::<f64>() / m;
        let expected = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (m - 1.0) / m;
        let got = jackknife_variance(&jackknife_means(&data).unwrap()).unwrap();
        prop_assert!(
            (got - expected).abs() <= 1e-9 * expected + 1e-12,
            "jackknife {} vs {}", got, expected
        );
    }

    #[test]
    fn prop_linear_functional_matches_plain_jackknife(
        data in prop::collection::vec(-100.0f64..100.0, 2..60),
        scale in 0.1f64..10.0,
    ) {
        let plain = jackknife_variance(&jackknife_means(&data).unwrap()).unwrap();
        let scaled = jackknife_functional_variance(&[&data], |x| scale * x[0]).unwrap();
        prop_assert!((scaled - scale * scale * plain).abs() <= 1e-9 * scaled.abs() + 1e-12);
    }

    #[test]
    fn prop_constant_input_gives_constant_replicas(c in -1e6f64..1e6, m in 2usize..100) {
        let data = vec![c; m];
        let jk = jackknife_means(&data).unwrap();
        prop_assert_eq!(jk.len(), m);
        for v in &jk {
            prop_assert!((v - c).abs() <= 1e-9 * (1.0 + c.abs()));
        }
    }

    #[test]
    fn prop_constant_moments_give_zero_binder_variance(m2 in 0.1f64..10.0, blocks in 2usize..50) {
        let m2s = vec![m2; blocks];
        let m4s = vec![m2 * m2 * 1.7; blocks];
        let var = binder_variance(&m2s, &m4s).unwrap();
        prop_assert!(var.abs() <= 1e-20, "variance {}", var);
    }
}
