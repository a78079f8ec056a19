//! Clustering evaluation metrics.
//!
//! Two complementary views on clustering quality:
//!
//! | Metric | Needs ground truth | Range | Best |
//! |--------|--------------------|-------|------|
//! | [`silhouette_score`] | no | [-1, 1] | 1 |
//! | [`ari`] | yes | [-1, 1] | 1 |
//!
//! The silhouette compares each sample's mean distance to its own cluster
//! against its mean distance to the nearest other cluster, under the same
//! metric family the estimators use. The Adjusted Rand Index compares two
//! partitions (typically predicted vs. known labels), corrected for
//! chance agreement.
//!
//! # References
//!
//! - Rousseeuw (1987). "Silhouettes: a Graphical Aid to the
//!   Interpretation and Validation of Cluster Analysis"
//! - Hubert & Arabie (1985). "Comparing partitions"

use std::collections::HashMap;

use ndarray::Array2;

use crate::dataset::Dataset;
use crate::distances::soft_dtw::cdist_soft_dtw_normalized;
use crate::distances::{cdist_euclidean, dtw::cdist_dtw};
use crate::error::{Error, Result};

/// Distance family used by [`silhouette_score`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SilhouetteMetric {
    /// Euclidean distance over equal-length series.
    Euclidean,
    /// Dynamic Time Warping.
    Dtw,
    /// Mean-centered Soft-DTW, which is zero on identical series.
    SoftDtwNormalized {
        /// Softmin smoothing.
        gamma: f64,
    },
}

/// Mean silhouette coefficient of a labeled dataset.
///
/// Requires at least 2 and at most `n − 1` distinct clusters; samples in
/// singleton clusters score 0.
pub fn silhouette_score(
    dataset: &Dataset,
    labels: &[usize],
    metric: SilhouetteMetric,
) -> Result<f64> {
    if labels.len() != dataset.len() {
        return Err(Error::LengthMismatch {
            expected: dataset.len(),
            found: labels.len(),
        });
    }
    let dists = match metric {
        SilhouetteMetric::Euclidean => {
            if dataset.uniform_len().is_none() {
                return Err(Error::InvalidParameter {
                    name: "metric",
                    message: "euclidean metric requires equal-length series",
                });
            }
            cdist_euclidean(dataset.series(), dataset.series())
        }
        SilhouetteMetric::Dtw => cdist_dtw(dataset.series(), dataset.series()),
        SilhouetteMetric::SoftDtwNormalized { gamma } => {
            if !(gamma > 0.0) {
                return Err(Error::InvalidParameter {
                    name: "gamma",
                    message: "soft-dtw smoothing must be positive",
                });
            }
            cdist_soft_dtw_normalized(dataset.series(), dataset.series(), gamma)
        }
    };
    silhouette_score_precomputed(&dists, labels)
}

/// Mean silhouette coefficient from a precomputed pairwise distance
/// matrix.
pub fn silhouette_score_precomputed(dists: &Array2<f64>, labels: &[usize]) -> Result<f64> {
    let n = labels.len();
    if dists.nrows() != n || dists.ncols() != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            found: dists.nrows().max(dists.ncols()),
        });
    }

    let k = match labels.iter().max() {
        Some(&m) => m + 1,
        None => return Err(Error::EmptyInput),
    };
    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }
    let n_clusters = sizes.iter().filter(|&&s| s > 0).count();
    if n_clusters < 2 || n_clusters > n - 1 {
        return Err(Error::InvalidParameter {
            name: "labels",
            message: "silhouette requires between 2 and n-1 populated clusters",
        });
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] == 1 {
            continue;
        }

        let mut sums = vec![0.0; k];
        for j in 0..n {
            sums[labels[j]] += dists[[i, j]];
        }

        // Own-cluster mean excludes the sample itself.
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    Ok(total / n as f64)
}

/// Adjusted Rand Index between two partitions.
///
/// The corrected-for-chance version of the Rand Index: 0 for random
/// agreement, 1 for identical partitions (up to label permutation).
///
/// # Example
///
/// ```rust
/// use cadence::metrics::ari;
///
/// let pred = [0, 0, 1, 1];
/// let truth = [1, 1, 0, 0];
/// assert!((ari(&pred, &truth) - 1.0).abs() < 1e-12);
/// ```
pub fn ari(pred: &[usize], truth: &[usize]) -> f64 {
    if pred.len() != truth.len() || pred.is_empty() {
        return 0.0;
    }

    let mut joint: HashMap<(usize, usize), usize> = HashMap::new();
    let mut row_sums: HashMap<usize, usize> = HashMap::new();
    let mut col_sums: HashMap<usize, usize> = HashMap::new();
    for (&p, &t) in pred.iter().zip(truth) {
        *joint.entry((p, t)).or_insert(0) += 1;
        *row_sums.entry(p).or_insert(0) += 1;
        *col_sums.entry(t).or_insert(0) += 1;
    }

    let sum_comb_ij: f64 = joint.values().map(|&c| comb2(c)).sum();
    let sum_comb_a: f64 = row_sums.values().map(|&c| comb2(c)).sum();
    let sum_comb_b: f64 = col_sums.values().map(|&c| comb2(c)).sum();
    let comb_n = comb2(pred.len());

    let expected = sum_comb_a * sum_comb_b / comb_n;
    let max_index = (sum_comb_a + sum_comb_b) / 2.0;
    let denom = max_index - expected;
    if denom.abs() < 1e-10 {
        // Both partitions are trivial (all-singleton or all-together).
        return 1.0;
    }
    (sum_comb_ij - expected) / denom
}

fn comb2(n: usize) -> f64 {
    (n * n.saturating_sub(1)) as f64 / 2.0
}
