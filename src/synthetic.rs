// synthetic.rs - Reproducible synthetic time series for checks and demos

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, StandardNormal};

/// Per-thread deterministic RNG derived from a master seed (splitmix64 finalizer).
pub fn thread_rng(master: u64, thread_id: usize) -> ChaCha20Rng {
    let mut x = master ^ (thread_id as u64).wrapping_mul(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^= x >> 31;
    ChaCha20Rng::seed_from_u64(x)
}

/// `n` independent standard-normal samples.
pub fn iid_normal(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    (0..n).map(|_| StandardNormal.sample(&mut rng)).collect()
}

/// Stationary AR(1) process `x_t = phi x_{t-1} + e_t`, `e_t ~ N(0, 1)`.
///
/// The first sample is drawn from the stationary distribution
/// `N(0, 1 / (1 - phi^2))`, so no burn-in is needed. Requires `|phi| < 1`.
pub fn ar1(n: usize, phi: f64, seed: u64) -> Vec<f64> {
    assert!(phi.abs() < 1.0, "AR(1) needs |phi| < 1, got {phi}");
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(n);
    let mut x = {
        let z: f64 = StandardNormal.sample(&mut rng);
        z / (1.0 - phi * phi).sqrt()
    };
    for _ in 0..n {
        out.push(x);
        let e: f64 = StandardNormal.sample(&mut rng);
        x = phi * x + e;
    }
    out
}

/// Integrated autocorrelation time of an AR(1) process, `(1 + phi) / (2 (1 - phi))`.
pub fn ar1_tau_int(phi: f64) -> f64 {
    (1.0 + phi) / (2.0 * (1.0 - phi))
}

/// Fresh seed from the operating system, for runs that need not be reproducible.
pub fn entropy_seed() -> u64 {
    ChaCha20Rng::from_entropy().next_u64()
}
