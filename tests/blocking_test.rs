use approx::assert_relative_eq;
use proptest::prelude::*;

use mc_analysis::blocking::{
    block_series, block_variance, block_variance_at, block_variance_curve, blocked_series_map,
    log_spaced_block_sizes, max_block_size_for,
};
use mc_analysis::synthetic::{ar1, iid_normal};
use mc_analysis::AnalysisError;

fn sample_variance(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

#[test]
fn test_block_size_one_is_naive_variance_of_mean() {
    let data = iid_normal(1000, 3);
    let expected = sample_variance(&data) / data.len() as f64;
    assert_relative_eq!(block_variance(&data, 1).unwrap(), expected, max_relative = 1e-12);
}

#[test]
fn test_truncated_tail_is_ignored() {
    // blocks [1,2,3] and [4,5,6]; the trailing 7 is dropped
    let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    assert_eq!(block_series(&data, 3).unwrap(), vec![2.0, 5.0]);
    // grand mean of the truncated series is 3.5
    assert_relative_eq!(block_variance(&data, 3).unwrap(), 2.25, max_relative = 1e-12);
}

#[test]
fn test_invalid_block_sizes() {
    let data = iid_normal(10, 1);
    for k in [0usize, 6, 10, 11] {
        assert!(
            matches!(block_variance(&data, k), Err(AnalysisError::InvalidParameter(_))),
            "block size {k} should be rejected"
        );
    }
    assert!(block_variance(&data, 5).is_ok());
}

#[test]
fn test_zero_cores_rejected() {
    let data = iid_normal(100, 1);
    let err = block_variance_curve(&data, 10, Some(0)).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidParameter(_)));
}

#[test]
fn test_curve_is_complete_and_ordered() {
    let data = ar1(5000, 0.5, 21);
    let curve = block_variance_curve(&data, 50, Some(2)).unwrap();
    let keys: Vec<usize> = curve.keys().copied().collect();
    assert_eq!(keys, (1..=50).collect::<Vec<_>>());
    for (&k, &v) in &curve {
        assert_eq!(v, block_variance(&data, k).unwrap());
    }
}

#[test]
fn test_worker_count_does_not_change_result() {
    let data = ar1(20_000, 0.8, 5);
    let sizes = log_spaced_block_sizes(2000, 40);
    let serial = block_variance_at(&data, &sizes, Some(1)).unwrap();
    let parallel = block_variance_at(&data, &sizes, Some(4)).unwrap();
    let global = block_variance_at(&data, &sizes, None).unwrap();
    assert_eq!(serial, parallel);
    assert_eq!(serial, global);
}

#[test]
fn test_oversized_block_in_set_fails_whole_call() {
    let data = iid_normal(100, 9);
    let err = block_variance_at(&data, &[1, 2, 60], None).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidParameter(_)));
}

#[test]
fn test_iid_curve_is_flat() {
    let n = 100_000;
    let data = iid_normal(n, 7);
    for k in [1usize, 10, 100, 1000] {
        let nb = (n / k) as f64;
        let tolerance = 4.0 * (2.0 / (nb - 1.0)).sqrt() / n as f64;
        let v = block_variance(&data, k).unwrap();
        assert!(
            (v - 1.0 / n as f64).abs() <= tolerance,
            "k = {k}: {v:e} differs from {:e} by more than {tolerance:e}",
            1.0 / n as f64
        );
    }
}

#[test]
fn test_correlated_curve_rises_to_two_tau() {
    // phi = 0.9 gives tau_int = 9.5, so the plateau sits near 19 * var(k = 1)
    let data = ar1(200_000, 0.9, 11);
    let v1 = block_variance(&data, 1).unwrap();
    let v500 = block_variance(&data, 500).unwrap();
    let ratio = v500 / v1;
    assert!((14.0..=24.0).contains(&ratio), "ratio {ratio}");
}

#[test]
fn test_blocked_series_map_matches_block_series() {
    let data = ar1(1000, 0.3, 2);
    let map = blocked_series_map(&data, 20, Some(3)).unwrap();
    assert_eq!(map.len(), 20);
    for (&k, blocked) in &map {
        assert_eq!(blocked, &block_series(&data, k).unwrap());
        assert_eq!(blocked.len(), 1000 / k);
    }
}

#[test]
fn test_log_spaced_sizes() {
    let sizes = log_spaced_block_sizes(5000, 400);
    assert_eq!(sizes.first(), Some(&1));
    assert_eq!(sizes.last(), Some(&5000));
    assert!(sizes.windows(2).all(|w| w[0] < w[1]));
    // dense enough at small k that every integer appears
    assert!((1..=20).all(|k| sizes.contains(&k)));
    assert!(log_spaced_block_sizes(0, 10).is_empty());
    assert_eq!(max_block_size_for(1000, 4), 250);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_block_variance_non_negative(
        data in prop::collection::vec(-1e3f64..1e3, 4..300),
        k in 1usize..8,
    ) {
        prop_assume!(data.len() / k >= 2);
        let v = block_variance(&data, k).unwrap();
        prop_assert!(v >= 0.0);
    }

    #[test]
    fn prop_block_means_preserve_truncated_mean(
        data in prop::collection::vec(-1e3f64..1e3, 4..300),
        k in 1usize..8,
    ) {
        prop_assume!(data.len() / k >= 2);
        let blocked = block_series(&data, k).unwrap();
        prop_assert_eq!(blocked.len(), data.len() / k);
        let truncated = &data[..blocked.len() * k];
        let lhs = blocked.iter().sum::<f64>() / blocked.len() as f64;
        let rhs = truncated.iter().sum::<f64>() / truncated.len() as f64;
        prop_assert!((lhs - rhs).abs() <= 1e-9 * (1.0 + rhs.abs()));
    }

    #[test]
    fn prop_variance_from_block_series_matches(
        data in prop::collection::vec(-1e3f64..1e3, 4..300),
        k in 1usize..8,
    ) {
        prop_assume!(data.len() / k >= 2);
        let blocked = block_series(&data, k).unwrap();
        let nb = blocked.len() as f64;
        let mean = blocked.iter().sum::<f64>() / nb;
        let manual = blocked.iter().map(|b| (b - mean).powi(2)).sum::<f64>() / (nb * (nb - 1.0));
        let direct = block_variance(&data, k).unwrap();
        prop_assert!((manual - direct).abs() <= 1e-9 * direct + 1e-12);
    }
}
