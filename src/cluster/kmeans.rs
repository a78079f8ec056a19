//! K-means for time series.
//!
//! Lloyd's algorithm generalized over the metric: assignment is a batch
//! cross-distance to the current centroids, the update is the metric's
//! own barycenter (arithmetic mean, DBA, or the Soft-DTW barycenter), and
//! convergence is declared when the inertia
//!
//! ```text
//! inertia = (1/n) Σᵢ d(xᵢ, c_{label(i)})²
//! ```
//!
//! changes by less than `tol` between consecutive iterations. Under DTW
//! and Soft-DTW the series may have different lengths; centroids live at
//! the dataset's reference (maximum) length and are resampled back to it
//! whenever an update produces a shorter series.
//!
//! A single run can land in a poor local minimum or abort on an empty
//! cluster, so `fit` runs up to `max(n_init, 10)` independently seeded
//! attempts, accepts the first `n_init` that complete, and keeps the one
//! with the lowest inertia.

use ndarray::Array2;
use rand::prelude::*;
use tracing::debug;

use super::init::{
    kmeans_plusplus_euclidean, kmeans_plusplus_metric, random_indices, KMeansInit,
};
use super::{argmin_labels, compute_inertia, has_empty_cluster, make_rng, AttemptOutcome};
use crate::barycenters::{dtw_barycenter_averaging, euclidean_barycenter, softdtw_barycenter};
use crate::dataset::{Dataset, TimeSeries};
use crate::distances::dtw::cdist_dtw;
use crate::distances::Metric;
use crate::error::{Error, Result};
use crate::preprocessing::resample_to_length;

/// Inner tolerance for the iterative barycenter solvers.
const BARYCENTER_TOL: f64 = 1e-5;

/// K-means clustering for time series under a pluggable metric.
#[derive(Debug, Clone)]
pub struct TimeSeriesKMeans {
    /// Number of clusters.
    n_clusters: usize,
    /// Maximum iterations of one attempt.
    max_iter: usize,
    /// Inertia-change convergence tolerance.
    tol: f64,
    /// Number of accepted restarts.
    n_init: usize,
    /// Assignment and barycenter metric.
    metric: Metric,
    /// Iteration cap for the DTW / Soft-DTW barycenter solvers.
    max_iter_barycenter: usize,
    /// Report (and select attempts by) inertia recomputed under DTW even
    /// when assignment used another metric.
    dtw_inertia: bool,
    /// Initialization strategy.
    init: KMeansInit,
    /// Random seed.
    seed: Option<u64>,
}

impl TimeSeriesKMeans {
    /// Create a new estimator with `n_clusters` clusters.
    ///
    /// Defaults: Euclidean metric, k-means++ initialization,
    /// `max_iter = 50`, `tol = 1e-6`, `n_init = 1`,
    /// `max_iter_barycenter = 100`.
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 50,
            tol: 1e-6,
            n_init: 1,
            metric: Metric::Euclidean,
            max_iter_barycenter: 100,
            dtw_inertia: false,
            init: KMeansInit::KMeansPlusPlus,
            seed: None,
        }
    }

    /// Set the assignment/barycenter metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
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

    /// Set the iteration cap for the barycenter solvers.
    pub fn with_max_iter_barycenter(mut self, max_iter: usize) -> Self {
        self.max_iter_barycenter = max_iter;
        self
    }

    /// Always report inertia under DTW, regardless of the assignment
    /// metric. The recomputed value also drives best-attempt selection.
    pub fn with_dtw_inertia(mut self, dtw_inertia: bool) -> Self {
        self.dtw_inertia = dtw_inertia;
        self
    }

    /// Set the initialization strategy.
    pub fn with_init(mut self, init: KMeansInit) -> Self {
        self.init = init;
        self
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fit the model and return the fitted clustering.
    ///
    /// Fails with [`Error::FitExhausted`] when every attempt aborted on an
    /// empty cluster, leaving no fitted model.
    pub fn fit(&self, dataset: &Dataset) -> Result<FittedTimeSeriesKMeans> {
        self.validate(dataset)?;
        let mut rng = make_rng(self.seed);
        let max_attempts = self.n_init.max(10);

        let mut best: Option<Attempt> = None;
        let mut n_successful = 0;
        let mut n_attempts = 0;
        while n_successful < self.n_init && n_attempts < max_attempts {
            n_attempts += 1;
            match self.fit_one_init(dataset, &mut rng)? {
                AttemptOutcome::Converged(attempt) => {
                    debug!(
                        attempt = n_attempts,
                        inertia = attempt.inertia,
                        n_iter = attempt.n_iter,
                        "attempt accepted"
                    );
                    if best.as_ref().is_none_or(|b| attempt.inertia < b.inertia) {
                        best = Some(attempt);
                    }
                    n_successful += 1;
                }
                AttemptOutcome::EmptyCluster => {
                    debug!(attempt = n_attempts, "restarting after empty cluster");
                }
            }
        }

        let attempt = best.ok_or(Error::FitExhausted {
            attempts: n_attempts,
        })?;
        Ok(FittedTimeSeriesKMeans {
            n_clusters: self.n_clusters,
            metric: self.metric,
            cluster_centers: attempt.centers,
            labels: attempt.labels,
            inertia: attempt.inertia,
            n_iter: attempt.n_iter,
        })
    }

    fn validate(&self, dataset: &Dataset) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(Error::InvalidParameter {
                name: "n_clusters",
                message: "must be at least 1",
            });
        }
        if self.n_clusters > dataset.len() {
            return Err(Error::InvalidClusterCount {
                requested: self.n_clusters,
                n_items: dataset.len(),
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
        if self.metric == Metric::Euclidean && dataset.uniform_len().is_none() {
            return Err(Error::InvalidParameter {
                name: "metric",
                message: "euclidean metric requires equal-length series",
            });
        }
        if let Metric::SoftDtw { gamma } = self.metric {
            if !(gamma > 0.0) {
                return Err(Error::InvalidParameter {
                    name: "gamma",
                    message: "soft-dtw smoothing must be positive",
                });
            }
        }
        if let KMeansInit::Explicit(centers) = &self.init {
            if centers.len() != self.n_clusters {
                return Err(Error::InvalidInitialization {
                    expected: self.n_clusters,
                    found: centers.len(),
                });
            }
            for c in centers {
                if c.n_features() != dataset.n_features() {
                    return Err(Error::DimensionMismatch {
                        expected: dataset.n_features(),
                        found: c.n_features(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve the initialization into k full-length centroids.
    fn initial_centers(&self, dataset: &Dataset, rng: &mut StdRng) -> Result<Vec<TimeSeries>> {
        let sz = dataset.max_len();
        let centers: Vec<TimeSeries> = match &self.init {
            KMeansInit::Explicit(centers) => centers.clone(),
            KMeansInit::Random => random_indices(dataset.len(), self.n_clusters, rng)
                .into_iter()
                .map(|i| dataset.get(i).clone())
                .collect(),
            KMeansInit::KMeansPlusPlus => {
                let indices = match self.metric {
                    Metric::Euclidean => {
                        kmeans_plusplus_euclidean(&dataset.flatten()?, self.n_clusters, rng)
                    }
                    _ => kmeans_plusplus_metric(dataset.series(), self.n_clusters, rng, |a, b| {
                        self.metric.cross_distance(a, b)
                    }),
                };
                indices
                    .into_iter()
                    .map(|i| dataset.get(i).clone())
                    .collect()
            }
        };
        Ok(centers
            .into_iter()
            .map(|c| {
                if c.len() != sz {
                    resample_to_length(&c, sz)
                } else {
                    c
                }
            })
            .collect())
    }

    /// One attempt of the optimization loop.
    fn fit_one_init(
        &self,
        dataset: &Dataset,
        rng: &mut StdRng,
    ) -> Result<AttemptOutcome<Attempt>> {
        let mut centers = self.initial_centers(dataset, rng)?;
        let mut old_inertia = f64::INFINITY;
        let mut inertia = f64::INFINITY;
        let mut n_iter = 0;

        for it in 0..self.max_iter {
            let dists = self.metric.cross_distance(dataset.series(), &centers);
            let labels = argmin_labels(&dists);
            if has_empty_cluster(&labels, self.n_clusters) {
                return Ok(AttemptOutcome::EmptyCluster);
            }
            inertia = self.assignment_inertia(dataset, &centers, &dists, &labels);
            debug!(iteration = it + 1, inertia, "assignment");

            self.update_centers(dataset, &labels, &mut centers)?;
            n_iter = it + 1;

            if (old_inertia - inertia).abs() < self.tol {
                break;
            }
            old_inertia = inertia;
        }

        // Re-derive labels from the final centers so the reported
        // assignment matches what prediction on the training set returns.
        let dists = self.metric.cross_distance(dataset.series(), &centers);
        let labels = argmin_labels(&dists);
        if has_empty_cluster(&labels, self.n_clusters) {
            return Ok(AttemptOutcome::EmptyCluster);
        }

        Ok(AttemptOutcome::Converged(Attempt {
            centers,
            labels,
            inertia,
            n_iter,
        }))
    }

    fn assignment_inertia(
        &self,
        dataset: &Dataset,
        centers: &[TimeSeries],
        dists: &Array2<f64>,
        labels: &[usize],
    ) -> f64 {
        if self.dtw_inertia && self.metric != Metric::Dtw {
            let dtw_dists = cdist_dtw(dataset.series(), centers);
            compute_inertia(&dtw_dists, labels, true)
        } else {
            compute_inertia(dists, labels, true)
        }
    }

    /// Replace every centroid by its cluster's barycenter under the
    /// active metric.
    fn update_centers(
        &self,
        dataset: &Dataset,
        labels: &[usize],
        centers: &mut [TimeSeries],
    ) -> Result<()> {
        let sz = dataset.max_len();
        for k in 0..self.n_clusters {
            let members: Vec<&TimeSeries> = labels
                .iter()
                .enumerate()
                .filter(|&(_, &l)| l == k)
                .map(|(i, _)| dataset.get(i))
                .collect();
            let updated = match self.metric {
                Metric::Euclidean => euclidean_barycenter(&members)?,
                Metric::Dtw => dtw_barycenter_averaging(
                    &members,
                    &centers[k],
                    self.max_iter_barycenter,
                    BARYCENTER_TOL,
                )?,
                Metric::SoftDtw { gamma } => softdtw_barycenter(
                    &members,
                    &centers[k],
                    gamma,
                    self.max_iter_barycenter,
                    BARYCENTER_TOL,
                )?,
            };
            centers[k] = if updated.len() != sz {
                resample_to_length(&updated, sz)
            } else {
                updated
            };
        }
        Ok(())
    }
}

impl super::Clustering for TimeSeriesKMeans {
    fn fit_predict(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        Ok(self.fit(dataset)?.labels().to_vec())
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }
}

struct Attempt {
    centers: Vec<TimeSeries>,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
}

/// A fitted time-series k-means clustering.
#[derive(Debug, Clone)]
pub struct FittedTimeSeriesKMeans {
    n_clusters: usize,
    metric: Metric,
    cluster_centers: Vec<TimeSeries>,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
}

impl FittedTimeSeriesKMeans {
    /// Training-set labels of the best attempt.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Final centroids, one per cluster.
    pub fn cluster_centers(&self) -> &[TimeSeries] {
        &self.cluster_centers
    }

    /// Inertia of the best attempt.
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

    /// Distance from every series to every cluster center.
    pub fn transform(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        self.check_compatible(dataset)?;
        Ok(self
            .metric
            .cross_distance(dataset.series(), &self.cluster_centers))
    }

    /// Nearest-cluster label for every series.
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        Ok(argmin_labels(&self.transform(dataset)?))
    }

    fn check_compatible(&self, dataset: &Dataset) -> Result<()> {
        if dataset.n_features() != self.cluster_centers[0].n_features() {
            return Err(Error::DimensionMismatch {
                expected: self.cluster_centers[0].n_features(),
                found: dataset.n_features(),
            });
        }
        if self.metric == Metric::Euclidean {
            let sz = self.cluster_centers[0].len();
            if dataset.uniform_len() != Some(sz) {
                return Err(Error::LengthMismatch {
                    expected: sz,
                    found: dataset.max_len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Clustering;

    /// Six univariate series of length 4 in two well-separated groups.
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

    fn assert_two_groups_split(labels: &[usize]) {
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_euclidean_separates_groups() {
        let model = TimeSeriesKMeans::new(2)
            .with_seed(42)
            .fit(&two_groups())
            .unwrap();
        assert_two_groups_split(model.labels());
        assert!(model.inertia() >= 0.0);
        assert!(model.labels().iter().all(|&l| l < 2));
    }

    #[test]
    fn test_deterministic_with_seed() {
        let ds = two_groups();
        let a = TimeSeriesKMeans::new(2).with_seed(7).fit(&ds).unwrap();
        let b = TimeSeriesKMeans::new(2).with_seed(7).fit(&ds).unwrap();
        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.cluster_centers(), b.cluster_centers());
        assert_eq!(a.inertia(), b.inertia());
    }

    #[test]
    fn test_fit_predict_matches_prediction_on_frozen_centers() {
        let ds = two_groups();
        let estimator = TimeSeriesKMeans::new(2).with_seed(5);
        let model = estimator.fit(&ds).unwrap();
        let repredicted = model.predict(&ds).unwrap();
        assert_eq!(model.labels(), repredicted.as_slice());

        let fit_predict_labels = estimator.fit_predict(&ds).unwrap();
        assert_eq!(model.labels(), fit_predict_labels.as_slice());
    }

    #[test]
    fn test_dtw_on_ragged_lengths() {
        let ds = Dataset::from_vecs(vec![
            vec![1.0, 2.0, 3.0, 4.0],
            vec![1.0, 2.0, 3.0],
            vec![9.0, 9.5, 10.0, 10.5, 11.0, 11.5],
        ])
        .unwrap();
        let model = TimeSeriesKMeans::new(2)
            .with_metric(Metric::Dtw)
            .with_max_iter(5)
            .with_seed(0)
            .fit(&ds)
            .unwrap();
        let labels = model.labels();
        assert_eq!(labels.len(), 3);
        assert!(labels.iter().all(|&l| l < 2));
        assert!(labels.iter().any(|&l| l == 0));
        assert!(labels.iter().any(|&l| l == 1));
        // Centroids live at the reference length.
        assert!(model.cluster_centers().iter().all(|c| c.len() == 6));
    }

    #[test]
    fn test_refit_from_fitted_centers_is_fixed_point() {
        let ds = two_groups();
        let model = TimeSeriesKMeans::new(2).with_seed(3).fit(&ds).unwrap();
        let refit = TimeSeriesKMeans::new(2)
            .with_init(KMeansInit::Explicit(model.cluster_centers().to_vec()))
            .fit(&ds)
            .unwrap();
        assert_eq!(model.labels(), refit.labels());
        assert!(
            refit.n_iter() <= 2,
            "restart from a fixed point took {} iterations",
            refit.n_iter()
        );
    }

    #[test]
    fn test_more_iterations_never_increase_inertia() {
        let ds = two_groups();
        let short = TimeSeriesKMeans::new(2)
            .with_seed(9)
            .with_max_iter(1)
            .fit(&ds)
            .unwrap();
        let long = TimeSeriesKMeans::new(2)
            .with_seed(9)
            .with_max_iter(10)
            .fit(&ds)
            .unwrap();
        assert!(
            long.inertia() <= short.inertia() + 1e-12,
            "inertia rose from {} to {}",
            short.inertia(),
            long.inertia()
        );
    }

    #[test]
    fn test_softdtw_separates_groups() {
        let model = TimeSeriesKMeans::new(2)
            .with_metric(Metric::SoftDtw { gamma: 0.5 })
            .with_max_iter(10)
            .with_max_iter_barycenter(10)
            .with_seed(42)
            .fit(&two_groups())
            .unwrap();
        assert_two_groups_split(model.labels());
    }

    #[test]
    fn test_dtw_inertia_reporting() {
        let model = TimeSeriesKMeans::new(2)
            .with_seed(1)
            .with_dtw_inertia(true)
            .fit(&two_groups())
            .unwrap();
        assert!(model.inertia().is_finite());
        assert!(model.inertia() >= 0.0);
    }

    #[test]
    fn test_explicit_init_wrong_count() {
        let ds = two_groups();
        let one_center = vec![ds.get(0).clone()];
        let err = TimeSeriesKMeans::new(2)
            .with_init(KMeansInit::Explicit(one_center))
            .fit(&ds)
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidInitialization {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_too_many_clusters() {
        let ds = two_groups();
        let err = TimeSeriesKMeans::new(7).fit(&ds).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidClusterCount {
                requested: 7,
                n_items: 6
            }
        );
    }

    #[test]
    fn test_euclidean_rejects_ragged_dataset() {
        let ds = Dataset::from_vecs(vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(TimeSeriesKMeans::new(2).fit(&ds).is_err());
    }

    #[test]
    fn test_transform_shape() {
        let ds = two_groups();
        let model = TimeSeriesKMeans::new(2).with_seed(2).fit(&ds).unwrap();
        let dists = model.transform(&ds).unwrap();
        assert_eq!(dists.dim(), (6, 2));
        for &v in dists.iter() {
            assert!(v >= 0.0);
        }
    }

    #[test]
    fn test_random_init_separates_groups() {
        let model = TimeSeriesKMeans::new(2)
            .with_init(KMeansInit::Random)
            .with_n_init(4)
            .with_seed(13)
            .fit(&two_groups())
            .unwrap();
        assert_two_groups_split(model.labels());
    }
}
