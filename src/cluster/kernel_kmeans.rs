//! Kernel k-means (Dhillon, Guan & Kulis, 2004).
//!
//! No centroid is ever materialized. Cluster membership lives entirely in
//! the label vector, and the distance of sample `i` to cluster `j` comes
//! from the kernel trick over a Gram matrix `K` with unit diagonal:
//!
//! ```text
//! d(i, j) = 2 − 2 · Σ_{m ∈ Mⱼ} wₘ·K[i, m] / Σ_{m ∈ Mⱼ} wₘ
//! ```
//!
//! where `Mⱼ` is cluster j's member set and `w` the optional sample
//! weights. Recomputing this from the current labels *is* the update
//! step, so one iteration is: distances from current membership, argmin
//! relabel, inertia check. Inertia here is the sum of every sample's
//! distance to its nearest cluster.
//!
//! The default kernel is the Global Alignment Kernel, whose bandwidth may
//! be fixed or derived from the training set by the median heuristic. A
//! precomputed Gram matrix can be clustered directly with
//! [`KernelKMeans::fit_precomputed`].

use core::fmt;
use std::str::FromStr;

use ndarray::Array2;
use rand::prelude::*;
use tracing::debug;

use super::{argmin_labels, has_empty_cluster, make_rng, AttemptOutcome};
use crate::dataset::Dataset;
use crate::distances::gak::{cdist_gak, sigma_gak};
use crate::error::{Error, Result};

/// Bandwidth choice for the Global Alignment Kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GakSigma {
    /// Median-heuristic bandwidth derived from the training set at fit
    /// time.
    Auto,
    /// Fixed bandwidth.
    Value(f64),
}

/// Kernel selection for [`KernelKMeans`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    /// Global Alignment Kernel; handles ragged series collections.
    Gak {
        /// Bandwidth parameter.
        sigma: GakSigma,
    },
    /// Radial basis function over flattened equal-length series.
    Rbf {
        /// Exponential scale, `exp(-gamma·||x − y||²)`.
        gamma: f64,
    },
    /// The caller supplies the Gram matrix directly.
    Precomputed,
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kernel::Gak { .. } => write!(f, "gak"),
            Kernel::Rbf { .. } => write!(f, "rbf"),
            Kernel::Precomputed => write!(f, "precomputed"),
        }
    }
}

impl FromStr for Kernel {
    type Err = Error;

    /// Parse a kernel name. `gak` uses the automatic bandwidth, `rbf`
    /// the default scale `gamma = 1.0`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gak" => Ok(Kernel::Gak {
                sigma: GakSigma::Auto,
            }),
            "rbf" => Ok(Kernel::Rbf { gamma: 1.0 }),
            "precomputed" => Ok(Kernel::Precomputed),
            _ => Err(Error::InvalidParameter {
                name: "kernel",
                message: "expected one of 'gak', 'rbf', 'precomputed'",
            }),
        }
    }
}

/// Kernel k-means over time series.
#[derive(Debug, Clone)]
pub struct KernelKMeans {
    /// Number of clusters.
    n_clusters: usize,
    /// Kernel selection.
    kernel: Kernel,
    /// Maximum iterations of one attempt.
    max_iter: usize,
    /// Inertia-change convergence tolerance.
    tol: f64,
    /// Number of accepted restarts.
    n_init: usize,
    /// Random seed.
    seed: Option<u64>,
}

impl KernelKMeans {
    /// Create a new estimator with `n_clusters` clusters.
    ///
    /// Defaults: GAK kernel with automatic bandwidth, `max_iter = 50`,
    /// `tol = 1e-6`, `n_init = 1`.
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            kernel: Kernel::Gak {
                sigma: GakSigma::Auto,
            },
            max_iter: 50,
            tol: 1e-6,
            n_init: 1,
            seed: None,
        }
    }

    /// Set the kernel.
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Set the maximum number of iterations per attempt.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the convergence tolerance on the inertia change.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the number of accepted restarts.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fit on a time-series dataset, computing the Gram matrix under the
    /// configured kernel. The fitted model retains the training set for
    /// prediction.
    pub fn fit(
        &self,
        dataset: &Dataset,
        sample_weight: Option<&[f64]>,
    ) -> Result<FittedKernelKMeans> {
        self.validate(dataset.len())?;
        if self.kernel == Kernel::Precomputed {
            return Err(Error::InvalidParameter {
                name: "kernel",
                message: "use fit_precomputed with a precomputed Gram matrix",
            });
        }
        let sw = check_sample_weight(sample_weight, dataset.len())?;
        let kernel = self.resolve_kernel(dataset);
        let gram = gram_matrix(&kernel, dataset, dataset)?;
        let (labels, inertia, n_iter) = self.run_attempts(&gram, &sw)?;
        Ok(FittedKernelKMeans {
            n_clusters: self.n_clusters,
            kernel,
            labels,
            inertia,
            n_iter,
            sample_weight: sw,
            train: Some(dataset.clone()),
        })
    }

    /// Fit directly on a precomputed Gram matrix with unit diagonal.
    pub fn fit_precomputed(
        &self,
        gram: &Array2<f64>,
        sample_weight: Option<&[f64]>,
    ) -> Result<FittedKernelKMeans> {
        let n = gram.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if gram.ncols() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: gram.ncols(),
            });
        }
        self.validate(n)?;
        let sw = check_sample_weight(sample_weight, n)?;
        let (labels, inertia, n_iter) = self.run_attempts(gram, &sw)?;
        Ok(FittedKernelKMeans {
            n_clusters: self.n_clusters,
            kernel: Kernel::Precomputed,
            labels,
            inertia,
            n_iter,
            sample_weight: sw,
            train: None,
        })
    }

    fn validate(&self, n_samples: usize) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(Error::InvalidParameter {
                name: "n_clusters",
                message: "must be at least 1",
            });
        }
        if self.n_clusters > n_samples {
            return Err(Error::InvalidClusterCount {
                requested: self.n_clusters,
                n_items: n_samples,
            });
        }
        if self.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be at least 1",
            });
        }
        if self.n_init == 0 {
            return Err(Error::InvalidParameter {
                name: "n_init",
                message: "must be at least 1",
            });
        }
        if !(self.tol >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "tol",
                message: "must be non-negative",
            });
        }
        Ok(())
    }

    /// Pin the automatic GAK bandwidth to a concrete value.
    fn resolve_kernel(&self, dataset: &Dataset) -> Kernel {
        match self.kernel {
            Kernel::Gak {
                sigma: GakSigma::Auto,
            } => Kernel::Gak {
                sigma: GakSigma::Value(sigma_gak(dataset.series())),
            },
            other => other,
        }
    }

    /// Restart controller over the attempts.
    fn run_attempts(&self, gram: &Array2<f64>, sw: &[f64]) -> Result<(Vec<usize>, f64, usize)> {
        let mut rng = make_rng(self.seed);
        let max_attempts = self.n_init.max(10);

        let mut best: Option<(Vec<usize>, f64, usize)> = None;
        let mut n_successful = 0;
        let mut n_attempts = 0;
        while n_successful < self.n_init && n_attempts < max_attempts {
            n_attempts += 1;
            match self.fit_one_init(gram, sw, &mut rng) {
                AttemptOutcome::Converged((labels, inertia, n_iter)) => {
                    debug!(attempt = n_attempts, inertia, n_iter, "attempt accepted");
                    if best.as_ref().is_none_or(|(_, b, _)| inertia < *b) {
                        best = Some((labels, inertia, n_iter));
                    }
                    n_successful += 1;
                }
                AttemptOutcome::EmptyCluster => {
                    debug!(attempt = n_attempts, "restarting after empty cluster");
                }
            }
        }
        best.ok_or(Error::FitExhausted {
            attempts: n_attempts,
        })
    }

    /// One attempt: uniform random labels, then relabel by the
    /// kernel-trick distances until the inertia settles.
    fn fit_one_init(
        &self,
        gram: &Array2<f64>,
        sw: &[f64],
        rng: &mut StdRng,
    ) -> AttemptOutcome<(Vec<usize>, f64, usize)> {
        let n = gram.nrows();
        let mut labels: Vec<usize> = (0..n)
            .map(|_| rng.random_range(0..self.n_clusters))
            .collect();

        let mut old_inertia = f64::INFINITY;
        let mut inertia = f64::INFINITY;
        let mut n_iter = 0;

        for it in 0..self.max_iter {
            let weight_sums = match cluster_weight_sums(&labels, sw, self.n_clusters) {
                Some(sums) => sums,
                None => return AttemptOutcome::EmptyCluster,
            };
            let dist = kernel_trick_distances(gram, &labels, sw, &weight_sums);
            labels = argmin_labels(&dist);
            if has_empty_cluster(&labels, self.n_clusters) {
                return AttemptOutcome::EmptyCluster;
            }
            inertia = (0..n)
                .map(|i| dist[[i, labels[i]]])
                .sum();
            debug!(iteration = it + 1, inertia, "relabel");
            n_iter = it + 1;

            if (old_inertia - inertia).abs() < self.tol {
                break;
            }
            old_inertia = inertia;
        }

        AttemptOutcome::Converged((labels, inertia, n_iter))
    }
}

impl super::Clustering for KernelKMeans {
    fn fit_predict(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        Ok(self.fit(dataset, None)?.labels().to_vec())
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }
}

/// A fitted kernel k-means clustering. Holds the training set (except for
/// precomputed-kernel fits) so unseen samples can be scored against the
/// frozen training-time membership.
#[derive(Debug, Clone)]
pub struct FittedKernelKMeans {
    n_clusters: usize,
    kernel: Kernel,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
    sample_weight: Vec<f64>,
    train: Option<Dataset>,
}

impl FittedKernelKMeans {
    /// Training-set labels of the best attempt.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Inertia of the best attempt: sum of each sample's kernel-trick
    /// distance to its nearest cluster.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Iterations the best attempt used.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Kernel with any automatic bandwidth pinned to its fit-time value.
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Nearest-cluster label for every series, using the kernel between
    /// the new samples and the retained training set and the frozen
    /// training-time membership.
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        let train = self.train.as_ref().ok_or(Error::InvalidParameter {
            name: "kernel",
            message: "precomputed-kernel model requires predict_precomputed",
        })?;
        let gram = gram_matrix(&self.kernel, dataset, train)?;
        Ok(self.predict_from_gram(&gram))
    }

    /// Nearest-cluster label from a precomputed kernel between new
    /// samples (rows) and the training samples (columns).
    pub fn predict_precomputed(&self, gram: &Array2<f64>) -> Result<Vec<usize>> {
        if gram.ncols() != self.labels.len() {
            return Err(Error::DimensionMismatch {
                expected: self.labels.len(),
                found: gram.ncols(),
            });
        }
        Ok(self.predict_from_gram(gram))
    }

    fn predict_from_gram(&self, gram: &Array2<f64>) -> Vec<usize> {
        let weight_sums =
            cluster_weight_sums(&self.labels, &self.sample_weight, self.n_clusters)
                .expect("a successful fit leaves no cluster empty");
        let dist = kernel_trick_distances(gram, &self.labels, &self.sample_weight, &weight_sums);
        argmin_labels(&dist)
    }
}

/// Per-cluster sums of sample weights, or `None` when some cluster has no
/// member at all.
fn cluster_weight_sums(labels: &[usize], sw: &[f64], k: usize) -> Option<Vec<f64>> {
    let mut counts = vec![0usize; k];
    let mut sums = vec![0.0; k];
    for (&l, &w) in labels.iter().zip(sw) {
        counts[l] += 1;
        sums[l] += w;
    }
    if counts.iter().any(|&c| c == 0) {
        return None;
    }
    Some(sums)
}

/// The kernel-trick distance matrix: rows index the samples of `gram`,
/// columns the clusters defined by `labels` over `gram`'s columns.
fn kernel_trick_distances(
    gram: &Array2<f64>,
    labels: &[usize],
    sw: &[f64],
    weight_sums: &[f64],
) -> Array2<f64> {
    let n_rows = gram.nrows();
    let k = weight_sums.len();
    let mut dist = Array2::zeros((n_rows, k));
    for i in 0..n_rows {
        let mut weighted = vec![0.0; k];
        for (m, (&l, &w)) in labels.iter().zip(sw).enumerate() {
            weighted[l] += w * gram[[i, m]];
        }
        for j in 0..k {
            dist[[i, j]] = 2.0 - 2.0 * weighted[j] / weight_sums[j];
        }
    }
    dist
}

/// Gram matrix between two datasets under a resolved kernel.
fn gram_matrix(kernel: &Kernel, a: &Dataset, b: &Dataset) -> Result<Array2<f64>> {
    match *kernel {
        Kernel::Gak {
            sigma: GakSigma::Value(sigma),
        } => Ok(cdist_gak(a.series(), b.series(), sigma)),
        Kernel::Gak {
            sigma: GakSigma::Auto,
        } => Err(Error::InvalidParameter {
            name: "sigma",
            message: "automatic bandwidth must be resolved before the Gram computation",
        }),
        Kernel::Rbf { gamma } => {
            let fa = a.flatten()?;
            let fb = b.flatten()?;
            if fa.ncols() != fb.ncols() {
                return Err(Error::LengthMismatch {
                    expected: fb.ncols(),
                    found: fa.ncols(),
                });
            }
            let mut out = Array2::zeros((fa.nrows(), fb.nrows()));
            for i in 0..fa.nrows() {
                for j in 0..fb.nrows() {
                    let mut sq = 0.0;
                    for c in 0..fa.ncols() {
                        let diff = fa[[i, c]] - fb[[j, c]];
                        sq += diff * diff;
                    }
                    out[[i, j]] = (-gamma * sq).exp();
                }
            }
            Ok(out)
        }
        Kernel::Precomputed => Err(Error::InvalidParameter {
            name: "kernel",
            message: "precomputed kernel has no Gram function",
        }),
    }
}

fn check_sample_weight(sample_weight: Option<&[f64]>, n: usize) -> Result<Vec<f64>> {
    match sample_weight {
        None => Ok(vec![1.0; n]),
        Some(sw) => {
            if sw.len() != n {
                return Err(Error::LengthMismatch {
                    expected: n,
                    found: sw.len(),
                });
            }
            if sw.iter().any(|&w| !(w >= 0.0) || !w.is_finite()) {
                return Err(Error::InvalidParameter {
                    name: "sample_weight",
                    message: "weights must be finite and non-negative",
                });
            }
            Ok(sw.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit-diagonal Gram matrix with two well-separated similarity
    /// blocks of sizes 3 and 2.
    fn block_gram() -> Array2<f64> {
        let mut k = Array2::from_elem((5, 5), 0.1);
        for i in 0..5 {
            k[[i, i]] = 1.0;
        }
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    k[[i, j]] = 0.9;
                }
            }
        }
        k[[3, 4]] = 0.9;
        k[[4, 3]] = 0.9;
        k
    }

    fn two_groups() -> Dataset {
        Dataset::from_vecs(vec![
            vec![0.0, 0.1, 0.0, 0.2],
            vec![0.1, 0.0, 0.1, 0.1],
            vec![0.2, 0.1, 0.2, 0.0],
            vec![10.0, 10.1, 10.0, 10.2],
            vec![10.1, 10.0, 10.1, 10.1],
            vec![10.2, 10.1, 10.2, 10.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_precomputed_blocks_recovered_quickly() {
        let gram = block_gram();
        let model = KernelKMeans::new(2)
            .with_kernel(Kernel::Precomputed)
            .with_seed(0)
            .fit_precomputed(&gram, None)
            .unwrap();
        let labels = model.labels();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
        assert!(
            model.n_iter() <= 3,
            "block structure took {} iterations",
            model.n_iter()
        );
        assert!(model.inertia() >= 0.0);
    }

    #[test]
    fn test_gak_fit_separates_groups_and_predicts_train() {
        let ds = two_groups();
        let model = KernelKMeans::new(2)
            .with_kernel(Kernel::Gak {
                sigma: GakSigma::Value(2.0),
            })
            .with_n_init(3)
            .with_seed(1)
            .fit(&ds, None)
            .unwrap();
        let labels = model.labels();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);

        let repredicted = model.predict(&ds).unwrap();
        assert_eq!(labels, repredicted.as_slice());
    }

    #[test]
    fn test_auto_sigma_resolved_at_fit() {
        let ds = two_groups();
        let model = KernelKMeans::new(2)
            .with_n_init(3)
            .with_seed(4)
            .fit(&ds, None)
            .unwrap();
        match model.kernel() {
            Kernel::Gak {
                sigma: GakSigma::Value(s),
            } => assert!(s > 0.0),
            other => panic!("expected resolved GAK bandwidth, got {other:?}"),
        }
    }

    #[test]
    fn test_uniform_weights_match_default() {
        let gram = block_gram();
        let base = KernelKMeans::new(2)
            .with_kernel(Kernel::Precomputed)
            .with_seed(6);
        let a = base.fit_precomputed(&gram, None).unwrap();
        let b = base.fit_precomputed(&gram, Some(&[1.0; 5])).unwrap();
        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.inertia(), b.inertia());
    }

    #[test]
    fn test_weight_validation() {
        let gram = block_gram();
        let est = KernelKMeans::new(2).with_kernel(Kernel::Precomputed);
        assert!(est.fit_precomputed(&gram, Some(&[1.0, 1.0])).is_err());
        assert!(est
            .fit_precomputed(&gram, Some(&[1.0, 1.0, 1.0, -1.0, 1.0]))
            .is_err());
    }

    #[test]
    fn test_precomputed_model_rejects_series_predict() {
        let gram = block_gram();
        let model = KernelKMeans::new(2)
            .with_kernel(Kernel::Precomputed)
            .with_seed(0)
            .fit_precomputed(&gram, None)
            .unwrap();
        assert!(model.predict(&two_groups()).is_err());

        // Scoring the training rows through the precomputed path
        // reproduces the fitted labels.
        let repredicted = model.predict_precomputed(&gram).unwrap();
        assert_eq!(model.labels(), repredicted.as_slice());
    }

    #[test]
    fn test_fit_rejects_precomputed_kernel() {
        let ds = two_groups();
        let err = KernelKMeans::new(2)
            .with_kernel(Kernel::Precomputed)
            .fit(&ds, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_kernel_from_str() {
        assert_eq!(
            "gak".parse::<Kernel>().unwrap(),
            Kernel::Gak {
                sigma: GakSigma::Auto
            }
        );
        assert_eq!("rbf".parse::<Kernel>().unwrap(), Kernel::Rbf { gamma: 1.0 });
        assert_eq!("precomputed".parse::<Kernel>().unwrap(), Kernel::Precomputed);
        assert!("sigmoid".parse::<Kernel>().is_err());
    }
}
