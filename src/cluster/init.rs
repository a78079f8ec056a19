//! Centroid initialization strategies.
//!
//! Three ways to seed an attempt, resolved once before the loop starts:
//! caller-supplied centroids, a uniform sample of the dataset, or a
//! metric-agnostic k-means++ (Arthur & Vassilvitskii, 2007). The k-means++
//! variant follows the greedy local-trials formulation: each new center is
//! chosen among `2 + ⌊ln k⌋` candidates drawn proportionally to the
//! current squared nearest-center distance, keeping the candidate that
//! minimizes the resulting total potential. For the Euclidean metric the
//! candidate distances come from precomputed squared norms instead of a
//! generic batch distance call.

use ndarray::Array2;
use rand::prelude::*;

use crate::dataset::TimeSeries;

/// Initialization strategy for [`super::TimeSeriesKMeans`].
#[derive(Debug, Clone)]
pub enum KMeansInit {
    /// Greedy k-means++ seeding under the estimator's metric.
    KMeansPlusPlus,
    /// k distinct series drawn uniformly at random.
    Random,
    /// Caller-provided centroids; must contain exactly k series.
    Explicit(Vec<TimeSeries>),
}

/// Initialization strategy for [`super::KShape`].
#[derive(Debug, Clone)]
pub enum KShapeInit {
    /// k distinct series drawn uniformly at random.
    Random,
    /// Caller-provided centroids; must contain exactly k series.
    Explicit(Vec<TimeSeries>),
}

/// Draw `k` distinct sample indices uniformly at random.
pub(crate) fn random_indices(n: usize, k: usize, rng: &mut impl Rng) -> Vec<usize> {
    rand::seq::index::sample(rng, n, k).into_vec()
}

/// Greedy k-means++ over `n` samples, generic in how squared
/// cross-distances are produced.
///
/// `cross_sq(rows)` must return the squared distances from each listed
/// sample to all `n` samples, one row per entry of `rows`. Returns the `k`
/// chosen sample indices.
pub(crate) fn kmeans_plusplus<F>(n: usize, k: usize, rng: &mut impl Rng, mut cross_sq: F) -> Vec<usize>
where
    F: FnMut(&[usize]) -> Array2<f64>,
{
    let first = rng.random_range(0..n);
    let mut centers = Vec::with_capacity(k);
    centers.push(first);

    let first_dists = cross_sq(&[first]);
    let mut closest: Vec<f64> = (0..n).map(|j| first_dists[[0, j]]).collect();
    let mut current_pot: f64 = closest.iter().sum();

    let n_local_trials = 2 + (k as f64).ln().floor() as usize;

    for _ in 1..k {
        // Sample candidates proportionally to the squared distance to the
        // nearest chosen center, via the cumulative sum.
        let mut cumsum = Vec::with_capacity(n);
        let mut acc = 0.0;
        for &v in &closest {
            acc += v;
            cumsum.push(acc);
        }
        let candidate_ids: Vec<usize> = (0..n_local_trials)
            .map(|_| {
                let rv = rng.random::<f64>() * current_pot;
                // Floating-point error in the cumulative sum can push the
                // search past the end; clip to the last valid index.
                cumsum.partition_point(|&c| c < rv).min(n - 1)
            })
            .collect();

        let mut dist_to_candidates = cross_sq(&candidate_ids);

        // Evaluate each candidate's total potential after the min-merge
        // with the running nearest distances.
        let mut best_trial = 0;
        let mut best_pot = f64::INFINITY;
        for t in 0..candidate_ids.len() {
            let mut pot = 0.0;
            for j in 0..n {
                let v = dist_to_candidates[[t, j]].min(closest[j]);
                dist_to_candidates[[t, j]] = v;
                pot += v;
            }
            if pot < best_pot {
                best_pot = pot;
                best_trial = t;
            }
        }

        current_pot = best_pot;
        for j in 0..n {
            closest[j] = dist_to_candidates[[best_trial, j]];
        }
        centers.push(candidate_ids[best_trial]);
    }

    centers
}

/// Closed-form Euclidean specialization over a flattened `(n, len·d)`
/// dataset, using `||a - b||² = ||a||² + ||b||² − 2·a·b` with precomputed
/// squared norms.
pub(crate) fn kmeans_plusplus_euclidean(
    flat: &Array2<f64>,
    k: usize,
    rng: &mut impl Rng,
) -> Vec<usize> {
    let n = flat.nrows();
    let dim = flat.ncols();
    let sq_norms: Vec<f64> = (0..n)
        .map(|i| (0..dim).map(|c| flat[[i, c]] * flat[[i, c]]).sum())
        .collect();

    kmeans_plusplus(n, k, rng, |rows| {
        let mut out = Array2::zeros((rows.len(), n));
        for (r, &i) in rows.iter().enumerate() {
            for j in 0..n {
                let mut dot = 0.0;
                for c in 0..dim {
                    dot += flat[[i, c]] * flat[[j, c]];
                }
                out[[r, j]] = (sq_norms[i] + sq_norms[j] - 2.0 * dot).max(0.0);
            }
        }
        out
    })
}

/// Metric-agnostic variant: candidate distances come from a batch
/// cross-distance callback and are squared here.
pub(crate) fn kmeans_plusplus_metric<F>(
    series: &[TimeSeries],
    k: usize,
    rng: &mut impl Rng,
    cdist: F,
) -> Vec<usize>
where
    F: Fn(&[TimeSeries], &[TimeSeries]) -> Array2<f64>,
{
    kmeans_plusplus(series.len(), k, rng, |rows| {
        let picked: Vec<TimeSeries> = rows.iter().map(|&i| series[i].clone()).collect();
        let mut d = cdist(&picked, series);
        d.mapv_inplace(|v| v * v);
        d
    })
}
