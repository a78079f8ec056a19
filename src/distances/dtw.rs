//! Dynamic Time Warping.
//!
//! DTW aligns two series by warping the time axis so that similar shapes
//! match even when they are locally stretched or shifted. The distance is
//! the square root of the minimal accumulated squared frame distance over
//! all monotone alignment paths:
//!
//! ```text
//! DTW(x, y)² = min_π Σ_{(i,j) ∈ π} ||xᵢ - yⱼ||²
//! ```
//!
//! Computed by the classic O(|x|·|y|) dynamic program. Series may have
//! different lengths, which is what makes DTW the workhorse metric for
//! ragged time-series collections.

use ndarray::Array2;

use crate::dataset::TimeSeries;
use crate::distances::pairwise;

/// DTW distance between two series (any lengths, same feature dimension).
pub fn dtw(a: &TimeSeries, b: &TimeSeries) -> f64 {
    let (m, n) = (a.len(), b.len());

    // Rolling-row dynamic program over accumulated squared cost.
    let mut prev = vec![f64::INFINITY; n + 1];
    let mut curr = vec![f64::INFINITY; n + 1];
    prev[0] = 0.0;

    for i in 1..=m {
        curr[0] = f64::INFINITY;
        for j in 1..=n {
            let cost = a.frame_sq_dist(i - 1, b, j - 1);
            let best = prev[j].min(curr[j - 1]).min(prev[j - 1]);
            curr[j] = cost + best;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n].sqrt()
}

/// DTW distance and the optimal alignment path as `(i, j)` index pairs,
/// ordered from `(0, 0)` to `(|a|-1, |b|-1)`.
///
/// The path is what DTW Barycenter Averaging consumes: every pair says
/// which barycenter sample each member sample contributes to.
pub fn dtw_path(a: &TimeSeries, b: &TimeSeries) -> (f64, Vec<(usize, usize)>) {
    let (m, n) = (a.len(), b.len());

    let mut acc = Array2::from_elem((m + 1, n + 1), f64::INFINITY);
    acc[[0, 0]] = 0.0;
    for i in 1..=m {
        for j in 1..=n {
            let cost = a.frame_sq_dist(i - 1, b, j - 1);
            let best = acc[[i - 1, j]]
                .min(acc[[i, j - 1]])
                .min(acc[[i - 1, j - 1]]);
            acc[[i, j]] = cost + best;
        }
    }

    // Backtrack from the end, preferring the diagonal on ties.
    let mut path = Vec::with_capacity(m.max(n));
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        path.push((i - 1, j - 1));
        let diag = acc[[i - 1, j - 1]];
        let up = acc[[i - 1, j]];
        let left = acc[[i, j - 1]];
        if diag <= up && diag <= left {
            i -= 1;
            j -= 1;
        } else if up <= left {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    path.reverse();

    (acc[[m, n]].sqrt(), path)
}

/// Batch DTW cross-distance between two series collections.
pub fn cdist_dtw(a: &[TimeSeries], b: &[TimeSeries]) -> Array2<f64> {
    pairwise(a, b, dtw)
}
