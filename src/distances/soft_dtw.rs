//! Soft-DTW (Cuturi & Blondel, 2017).
//!
//! Replaces the hard minimum of the DTW recursion with a smoothed softmin:
//!
//! ```text
//! softmin_γ(a, b, c) = -γ · ln(e^{-a/γ} + e^{-b/γ} + e^{-c/γ})
//! ```
//!
//! The resulting score is differentiable and can be negative; the
//! self-score `sdtw(x, x)` is not zero in general. The mean-centered form
//! `sdtw(x, y) − ½·(sdtw(x, x) + sdtw(y, y))` is non-negative and zero on
//! identical inputs, which is what the silhouette wrapper uses.
//!
//! The backward pass produces the soft-alignment expectation matrix `E`,
//! where `E[i, j]` is the weight with which sample `j` of the second
//! series aligns to sample `i` of the first. The Soft-DTW barycenter
//! update consumes `E` directly.

use ndarray::Array2;

use crate::dataset::TimeSeries;
use crate::distances::pairwise;

/// Smoothed minimum of three accumulated costs.
#[inline]
fn softmin(a: f64, b: f64, c: f64, gamma: f64) -> f64 {
    let m = a.min(b).min(c);
    if m.is_infinite() {
        return m;
    }
    let sum = (-(a - m) / gamma).exp() + (-(b - m) / gamma).exp() + (-(c - m) / gamma).exp();
    m - gamma * sum.ln()
}

/// Forward recursion. Returns the full `(m+1)×(n+1)` accumulated-cost
/// matrix with `R[0, 0] = 0` and infinite borders.
fn forward(a: &TimeSeries, b: &TimeSeries, gamma: f64) -> Array2<f64> {
    let (m, n) = (a.len(), b.len());
    let mut r = Array2::from_elem((m + 1, n + 1), f64::INFINITY);
    r[[0, 0]] = 0.0;
    for i in 1..=m {
        for j in 1..=n {
            let cost = a.frame_sq_dist(i - 1, b, j - 1);
            r[[i, j]] = cost + softmin(r[[i - 1, j]], r[[i, j - 1]], r[[i - 1, j - 1]], gamma);
        }
    }
    r
}

/// Soft-DTW score between two series. `gamma` must be positive.
pub fn soft_dtw(a: &TimeSeries, b: &TimeSeries, gamma: f64) -> f64 {
    let r = forward(a, b, gamma);
    r[[a.len(), b.len()]]
}

/// Soft-DTW score together with the soft-alignment expectation matrix
/// (`|a|×|b|`, non-negative entries).
pub fn soft_alignment(a: &TimeSeries, b: &TimeSeries, gamma: f64) -> (f64, Array2<f64>) {
    let (m, n) = (a.len(), b.len());
    let r = forward(a, b, gamma);
    let value = r[[m, n]];

    // Padded copies for the backward recursion: an absorbing corner at
    // (m+1, n+1) and -inf walls so out-of-range transitions vanish.
    let mut rp = Array2::from_elem((m + 2, n + 2), f64::NEG_INFINITY);
    for i in 0..=m {
        for j in 0..=n {
            rp[[i, j]] = r[[i, j]];
        }
    }
    rp[[m + 1, n + 1]] = r[[m, n]];

    let mut dp = Array2::zeros((m + 2, n + 2));
    for i in 1..=m {
        for j in 1..=n {
            dp[[i, j]] = a.frame_sq_dist(i - 1, b, j - 1);
        }
    }

    let mut e = Array2::zeros((m + 2, n + 2));
    e[[m + 1, n + 1]] = 1.0;
    for j in (1..=n).rev() {
        for i in (1..=m).rev() {
            let down = ((rp[[i + 1, j]] - rp[[i, j]] - dp[[i + 1, j]]) / gamma).exp();
            let right = ((rp[[i, j + 1]] - rp[[i, j]] - dp[[i, j + 1]]) / gamma).exp();
            let diag = ((rp[[i + 1, j + 1]] - rp[[i, j]] - dp[[i + 1, j + 1]]) / gamma).exp();
            e[[i, j]] =
                e[[i + 1, j]] * down + e[[i, j + 1]] * right + e[[i + 1, j + 1]] * diag;
        }
    }

    let mut out = Array2::zeros((m, n));
    for i in 0..m {
        for j in 0..n {
            out[[i, j]] = e[[i + 1, j + 1]];
        }
    }
    (value, out)
}

/// Batch Soft-DTW cross-scores.
pub fn cdist_soft_dtw(a: &[TimeSeries], b: &[TimeSeries], gamma: f64) -> Array2<f64> {
    pairwise(a, b, |x, y| soft_dtw(x, y, gamma))
}

/// Batch mean-centered Soft-DTW:
/// `sdtw(x, y) − ½·(sdtw(x, x) + sdtw(y, y))`. Non-negative, zero on the
/// diagonal when both collections are the same set.
pub fn cdist_soft_dtw_normalized(
    a: &[TimeSeries],
    b: &[TimeSeries],
    gamma: f64,
) -> Array2<f64> {
    let mut out = cdist_soft_dtw(a, b, gamma);
    let self_a: Vec<f64> = a.iter().map(|x| soft_dtw(x, x, gamma)).collect();
    let self_b: Vec<f64> = b.iter().map(|y| soft_dtw(y, y, gamma)).collect();
    for i in 0..a.len() {
        for j in 0..b.len() {
            out[[i, j]] -= 0.5 * (self_a[i] + self_b[j]);
        }
    }
    out
}
