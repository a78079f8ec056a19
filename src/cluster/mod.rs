//! Partitional clustering estimators.
//!
//! Three estimators share one optimization skeleton — initialize, then
//! alternate assignment and centroid update until the inertia change
//! drops below a tolerance — and one restart controller that runs several
//! independently seeded attempts and keeps the best by inertia:
//!
//! - [`TimeSeriesKMeans`]: explicit centroids under Euclidean, DTW, or
//!   Soft-DTW, with the matching barycenter as the update step.
//! - [`KernelKMeans`]: no centroids at all; cluster membership is encoded
//!   in the label vector and distances come from the kernel trick over a
//!   precomputed Gram matrix.
//! - [`KShape`]: shift-invariant clustering where the update step extracts
//!   the leading eigenvector of a centered cross-correlation matrix.
//!
//! An attempt that produces an empty cluster is abandoned and retried
//! with fresh randomness, up to `max(n_init, 10)` attempts in total; if
//! every attempt fails, `fit` reports [`crate::Error::FitExhausted`] and
//! no fitted model exists.

mod init;
mod kernel_kmeans;
mod kmeans;
mod kshape;
mod traits;

pub use init::{KMeansInit, KShapeInit};
pub use kernel_kmeans::{FittedKernelKMeans, GakSigma, Kernel, KernelKMeans};
pub use kmeans::{FittedTimeSeriesKMeans, TimeSeriesKMeans};
pub use kshape::{FittedKShape, KShape};
pub use traits::Clustering;

use ndarray::Array2;
use rand::prelude::*;

/// Outcome of one optimization attempt. An empty cluster aborts the
/// attempt; the restart controller inspects the tag and retries.
pub(crate) enum AttemptOutcome<T> {
    Converged(T),
    EmptyCluster,
}

/// Build the per-fit random source. Attempts within one fit share the
/// generator so they are independent draws, never repeats.
pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Row-wise argmin; ties resolve to the lowest cluster index.
pub(crate) fn argmin_labels(dists: &Array2<f64>) -> Vec<usize> {
    let (n, k) = dists.dim();
    let mut labels = vec![0usize; n];
    for i in 0..n {
        let mut best = 0;
        for j in 1..k {
            if dists[[i, j]] < dists[[i, best]] {
                best = j;
            }
        }
        labels[i] = best;
    }
    labels
}

/// Whether any cluster index in `[0, k)` has no member.
pub(crate) fn has_empty_cluster(labels: &[usize], k: usize) -> bool {
    let mut seen = vec![false; k];
    for &l in labels {
        seen[l] = true;
    }
    seen.iter().any(|&s| !s)
}

/// Mean over samples of the (squared) distance to the assigned centroid.
pub(crate) fn compute_inertia(dists: &Array2<f64>, labels: &[usize], squared: bool) -> f64 {
    let n = labels.len();
    let total: f64 = labels
        .iter()
        .enumerate()
        .map(|(i, &l)| {
            let d = dists[[i, l]];
            if squared {
                d * d
            } else {
                d
            }
        })
        .sum();
    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmin_ties_take_lowest_index() {
        let dists = array![[1.0, 1.0, 2.0], [3.0, 0.5, 0.5]];
        assert_eq!(argmin_labels(&dists), vec![0, 1]);
    }

    #[test]
    fn test_empty_cluster_detection() {
        assert!(has_empty_cluster(&[0, 0, 2], 3));
        assert!(!has_empty_cluster(&[0, 1, 2], 3));
        assert!(has_empty_cluster(&[0, 1, 2], 4));
    }

    #[test]
    fn test_inertia_mean_of_squares() {
        // Assigned distances: 0.5 (sample 0 -> cluster 2) and 0.0
        // (sample 1 -> cluster 0); mean of squares = 0.125.
        let dists = array![[1.0, 2.0, 0.5], [0.0, 3.0, 1.0]];
        let inertia = compute_inertia(&dists, &[2, 0], true);
        assert!((inertia - 0.125).abs() < 1e-12);

        let unsquared = compute_inertia(&dists, &[2, 0], false);
        assert!((unsquared - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_rng_reproducible() {
        let mut a = make_rng(Some(7));
        let mut b = make_rng(Some(7));
        let xs: Vec<u64> = (0..4).map(|_| a.random::<u64>()).collect();
        let ys: Vec<u64> = (0..4).map(|_| b.random::<u64>()).collect();
        assert_eq!(xs, ys);
    }
}
