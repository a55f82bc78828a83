// spline.rs - Natural cubic spline interpolation with root location

use crate::error::{AnalysisError, Result};

/// Piecewise cubic through `(x_i, y_i)` with vanishing second derivative at both ends.
///
/// On `[x_i, x_{i+1}]` the spline is `a_i + b_i t + c_i t^2 + d_i t^3`, `t = x - x_i`.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    knots: Vec<f64>,
    coeffs: Vec<[f64; 4]>,
}

impl CubicSpline {
    pub fn natural(xs: &[f64], ys: &[f64]) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(AnalysisError::mismatch(format!(
                "spline abscissae ({}) and ordinates ({}) differ in length",
                xs.len(),
                ys.len()
            )));
        }
        let n = xs.len();
        if n < 2 {
            return Err(AnalysisError::invalid("spline needs at least 2 points"));
        }
        if xs.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(AnalysisError::invalid(
                "spline abscissae must be strictly increasing",
            ));
        }
        if xs.iter().chain(ys).any(|v| !v.is_finite()) {
            return Err(AnalysisError::invalid("spline data must be finite"));
        }

        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();

        // Second derivatives at the knots; natural ends m_0 = m_{n-1} = 0.
        // Interior equations form a tridiagonal system solved by Thomas elimination.
        let mut m = vec![0.0; n];
        if n > 2 {
            let k = n - 2;
            let mut diag = vec![0.0; k];
            let mut upper = vec![0.0; k];
            let mut rhs = vec![0.0; k];
            for j in 0..k {
                let i = j + 1;
                diag[j] = 2.0 * (h[i - 1] + h[i]);
                upper[j] = h[i];
                rhs[j] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
            }
            for j in 1..k {
                let lower = h[j];
                let w = lower / diag[j - 1];
                diag[j] -= w * upper[j - 1];
                rhs[j] -= w * rhs[j - 1];
            }
            m[k] = rhs[k - 1] / diag[k - 1];
            for j in (0..k - 1).rev() {
                m[j + 1] = (rhs[j] - upper[j] * m[j + 2]) / diag[j];
            }
        }

        let coeffs = (0..n - 1)
            .map(|i| {
                let a = ys[i];
                let b = (ys[i + 1] - ys[i]) / h[i] - h[i] * (2.0 * m[i] + m[i + 1]) / 6.0;
                let c = m[i] / 2.0;
                let d = (m[i + 1] - m[i]) / (6.0 * h[i]);
                [a, b, c, d]
            })
            .collect();

        Ok(Self { knots: xs.to_vec(), coeffs })
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.knots[0], self.knots[self.knots.len() - 1])
    }

    fn segment(&self, x: f64) -> usize {
        // partition_point gives the first knot > x
        let idx = self.knots.partition_point(|&k| k <= x);
        idx.saturating_sub(1).min(self.coeffs.len() - 1)
    }

    /// Value at `x`; outside the knots the end cubics are extended.
    pub fn eval(&self, x: f64) -> f64 {
        let i = self.segment(x);
        eval_cubic(&self.coeffs[i], x - self.knots[i])
    }

    pub fn derivative(&self, x: f64) -> f64 {
        let i = self.segment(x);
        let [_, b, c, d] = self.coeffs[i];
        let t = x - self.knots[i];
        b + 2.0 * c * t + 3.0 * d * t * t
    }

    /// Sign-changing roots inside the knot range, ascending.
    ///
    /// Each segment is split at the stationary points of its cubic so every
    /// piece is monotone, then bracketed roots are refined by bisection.
    pub fn roots(&self) -> Vec<f64> {
        let mut roots: Vec<f64> = Vec::new();
        for (i, coeff) in self.coeffs.iter().enumerate() {
            let width = self.knots[i + 1] - self.knots[i];
            let mut cuts = vec![0.0];
            cuts.extend(stationary_points(coeff, width));
            cuts.push(width);

            for w in cuts.windows(2) {
                let (lo, hi) = (w[0], w[1]);
                let f_lo = eval_cubic(coeff, lo);
                let f_hi = eval_cubic(coeff, hi);
                if f_lo == 0.0 {
                    roots.push(self.knots[i] + lo);
                } else if f_lo * f_hi < 0.0 {
                    roots.push(self.knots[i] + bisect(coeff, lo, hi, f_lo));
                }
            }
        }
        let last = self.coeffs.len() - 1;
        let width = self.knots[last + 1] - self.knots[last];
        if eval_cubic(&self.coeffs[last], width) == 0.0 {
            roots.push(self.knots[last + 1]);
        }

        roots.dedup_by(|a, b| (*a - *b).abs() <= 1e-12 * (1.0 + b.abs()));
        roots
    }
}

fn eval_cubic(c: &[f64; 4], t: f64) -> f64 {
    c[0] + t * (c[1] + t * (c[2] + t * c[3]))
}

/// Zeros of the derivative `b + 2ct + 3dt^2` strictly inside `(0, width)`, ascending.
fn stationary_points(c: &[f64; 4], width: f64) -> Vec<f64> {
    let (qa, qb, qc) = (3.0 * c[3], 2.0 * c[2], c[1]);
    let mut pts = Vec::with_capacity(2);
    if qa.abs() < f64::EPSILON * (qb.abs() + qc.abs()).max(1.0) {
        if qb != 0.0 {
            pts.push(-qc / qb);
        }
    } else {
        let disc = qb * qb - 4.0 * qa * qc;
        if disc >= 0.0 {
            let sq = disc.sqrt();
            pts.push((-qb - sq) / (2.0 * qa));
            pts.push((-qb + sq) / (2.0 * qa));
        }
    }
    pts.retain(|&t| t > 0.0 && t < width);
    pts.sort_by(f64::total_cmp);
    pts
}

fn bisect(c: &[f64; 4], mut lo: f64, mut hi: f64, mut f_lo: f64) -> f64 {
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        let f_mid = eval_cubic(c, mid);
        if f_mid == 0.0 {
            return mid;
        }
        if f_lo * f_mid < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }
    0.5 * (lo + hi)
}
