//! KShape clustering (Paparrizos & Gravano, 2015).
//!
//! Shift-invariant clustering for equal-length, mean/variance normalized
//! series. Assignment uses the shape-based distance `1 − NCC`, the
//! maximum normalized cross-correlation over all shifts. The update step
//! is *shape extraction*: align every member to the current centroid at
//! its best shift, build the aligned data matrix `Xp`, and take the
//! leading eigenvector of the mean-centered correlation matrix
//!
//! ```text
//! M = Qᵀ·(Xpᵀ·Xp)·Q,   Q = I − (1/sz)·𝟙
//! ```
//!
//! as the new centroid. Eigenvectors are sign-ambiguous, so both `+v` and
//! `−v` are scored against the aligned members and the closer one wins;
//! the result is re-normalized to zero mean and unit variance.
//!
//! Shape extraction does not guarantee the inertia decreases, so an
//! iteration that fails to improve rolls the attempt back to the previous
//! centroids and labels before stopping.

use faer::prelude::*;
use faer::{Mat, Side};
use ndarray::Array2;
use rand::prelude::*;
use tracing::debug;

use super::init::{random_indices, KShapeInit};
use super::{argmin_labels, compute_inertia, has_empty_cluster, make_rng, AttemptOutcome};
use crate::dataset::{Dataset, TimeSeries};
use crate::distances::cross_correlation::{cdist_normalized_cc, shift_to_reference};
use crate::error::{Error, Result};
use crate::preprocessing::{resample_to_length, MeanVarianceScaler};

/// KShape clustering.
#[derive(Debug, Clone)]
pub struct KShape {
    /// Number of clusters.
    n_clusters: usize,
    /// Maximum iterations of one attempt.
    max_iter: usize,
    /// Inertia-change convergence tolerance.
    tol: f64,
    /// Number of accepted restarts.
    n_init: usize,
    /// Initialization strategy.
    init: KShapeInit,
    /// Random seed.
    seed: Option<u64>,
}

impl KShape {
    /// Create a new estimator with `n_clusters` clusters.
    ///
    /// Defaults: random initialization, `max_iter = 100`, `tol = 1e-6`,
    /// `n_init = 1`. Input series are expected to be mean/variance
    /// normalized (see [`MeanVarianceScaler`]).
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 100,
            tol: 1e-6,
            n_init: 1,
            init: KShapeInit::Random,
            seed: None,
        }
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

    /// Set the initialization strategy.
    pub fn with_init(mut self, init: KShapeInit) -> Self {
        self.init = init;
        self
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fit the model and return the fitted clustering.
    pub fn fit(&self, dataset: &Dataset) -> Result<FittedKShape> {
        let sz = self.validate(dataset)?;
        let norms: Vec<f64> = dataset.iter().map(TimeSeries::norm).collect();
        let mut rng = make_rng(self.seed);
        let max_attempts = self.n_init.max(10);

        let mut best: Option<Attempt> = None;
        let mut n_successful = 0;
        let mut n_attempts = 0;
        while n_successful < self.n_init && n_attempts < max_attempts {
            n_attempts += 1;
            match self.fit_one_init(dataset, &norms, sz, &mut rng) {
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
        let center_norms: Vec<f64> = attempt.centers.iter().map(TimeSeries::norm).collect();
        Ok(FittedKShape {
            n_clusters: self.n_clusters,
            cluster_centers: attempt.centers,
            center_norms,
            labels: attempt.labels,
            inertia: attempt.inertia,
            n_iter: attempt.n_iter,
        })
    }

    fn validate(&self, dataset: &Dataset) -> Result<usize> {
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
        let sz = dataset.uniform_len().ok_or(Error::InvalidParameter {
            name: "dataset",
            message: "kshape requires equal-length series",
        })?;
        if let KShapeInit::Explicit(centers) = &self.init {
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
        Ok(sz)
    }

    fn initial_centers(&self, dataset: &Dataset, sz: usize, rng: &mut StdRng) -> Vec<TimeSeries> {
        let centers: Vec<TimeSeries> = match &self.init {
            KShapeInit::Explicit(centers) => centers.clone(),
            KShapeInit::Random => random_indices(dataset.len(), self.n_clusters, rng)
                .into_iter()
                .map(|i| dataset.get(i).clone())
                .collect(),
        };
        centers
            .into_iter()
            .map(|c| {
                if c.len() != sz {
                    resample_to_length(&c, sz)
                } else {
                    c
                }
            })
            .collect()
    }

    fn fit_one_init(
        &self,
        dataset: &Dataset,
        norms: &[f64],
        sz: usize,
        rng: &mut StdRng,
    ) -> AttemptOutcome<Attempt> {
        let mut centers = self.initial_centers(dataset, sz, rng);
        let mut center_norms: Vec<f64> = centers.iter().map(TimeSeries::norm).collect();

        let (mut labels, mut inertia) =
            match self.assign(dataset, norms, &centers, &center_norms) {
                Some(assignment) => assignment,
                None => return AttemptOutcome::EmptyCluster,
            };
        let mut old_inertia = f64::INFINITY;
        let mut n_iter = 0;

        for it in 0..self.max_iter {
            let old_centers = centers.clone();
            let old_center_norms = center_norms.clone();

            self.update_centers(dataset, norms, &labels, &mut centers, &mut center_norms);
            match self.assign(dataset, norms, &centers, &center_norms) {
                Some((new_labels, new_inertia)) => {
                    labels = new_labels;
                    inertia = new_inertia;
                }
                None => return AttemptOutcome::EmptyCluster,
            }
            debug!(iteration = it + 1, inertia, "assignment");
            n_iter = it + 1;

            // Shape extraction can overshoot: keep the previous state both
            // on plain convergence and when the inertia got worse.
            if (old_inertia - inertia).abs() < self.tol || old_inertia - inertia < 0.0 {
                centers = old_centers;
                center_norms = old_center_norms;
                match self.assign(dataset, norms, &centers, &center_norms) {
                    Some((new_labels, new_inertia)) => {
                        labels = new_labels;
                        inertia = new_inertia;
                    }
                    None => return AttemptOutcome::EmptyCluster,
                }
                break;
            }
            old_inertia = inertia;
        }

        AttemptOutcome::Converged(Attempt {
            centers,
            labels,
            inertia,
            n_iter,
        })
    }

    /// Shape-based assignment: distances `1 − NCC`, argmin labels, mean
    /// squared inertia. `None` signals an empty cluster.
    fn assign(
        &self,
        dataset: &Dataset,
        norms: &[f64],
        centers: &[TimeSeries],
        center_norms: &[f64],
    ) -> Option<(Vec<usize>, f64)> {
        let mut dists = cdist_normalized_cc(dataset.series(), centers, norms, center_norms);
        dists.mapv_inplace(|v| 1.0 - v);
        let labels = argmin_labels(&dists);
        if has_empty_cluster(&labels, self.n_clusters) {
            return None;
        }
        let inertia = compute_inertia(&dists, &labels, true);
        Some((labels, inertia))
    }

    fn update_centers(
        &self,
        dataset: &Dataset,
        norms: &[f64],
        labels: &[usize],
        centers: &mut [TimeSeries],
        center_norms: &mut [f64],
    ) {
        let scaler = MeanVarianceScaler::default();
        for k in 0..self.n_clusters {
            let mut members = Vec::new();
            let mut member_norms = Vec::new();
            for (i, &l) in labels.iter().enumerate() {
                if l == k {
                    members.push(dataset.get(i));
                    member_norms.push(norms[i]);
                }
            }
            let raw = shape_extraction(&members, &member_norms, &centers[k], center_norms[k]);
            centers[k] = scaler.transform(&raw);
        }
        for (c, n) in centers.iter().zip(center_norms.iter_mut()) {
            *n = c.norm();
        }
    }
}

/// Extract the shape centroid of a cluster: align members to the current
/// centroid, then take the sign-disambiguated leading eigenvector of the
/// mean-centered correlation matrix, per feature channel.
pub(crate) fn shape_extraction(
    members: &[&TimeSeries],
    member_norms: &[f64],
    center: &TimeSeries,
    center_norm: f64,
) -> TimeSeries {
    let sz = center.len();
    let d = center.n_features();

    let aligned: Vec<TimeSeries> = members
        .iter()
        .zip(member_norms)
        .map(|(m, &nm)| shift_to_reference(center, m, center_norm, nm).0)
        .collect();

    let mut out = Array2::zeros((sz, d));
    for c in 0..d {
        // S = Xpᵀ·Xp over the aligned members of this channel.
        let mut s = Mat::<f64>::zeros(sz, sz);
        for a in &aligned {
            for t1 in 0..sz {
                let v1 = a.values()[[t1, c]];
                if v1 == 0.0 {
                    continue;
                }
                for t2 in 0..sz {
                    s[(t1, t2)] += v1 * a.values()[[t2, c]];
                }
            }
        }

        // M = Qᵀ·S·Q projects out the mean component (Q is symmetric).
        let q = Mat::from_fn(sz, sz, |i, j| {
            let eye = if i == j { 1.0 } else { 0.0 };
            eye - 1.0 / sz as f64
        });
        let qs = &q * &s;
        let m = &qs * &q;

        let evd = m.selfadjoint_eigendecomposition(Side::Lower);
        let u = evd.u();

        // Locate the eigenvector of the largest eigenvalue by Rayleigh
        // quotient, without assuming how the solver orders its output.
        let mut best_col = 0;
        let mut best_val = f64::NEG_INFINITY;
        for j in 0..sz {
            let mut quad = 0.0;
            for r in 0..sz {
                let mut mv = 0.0;
                for t in 0..sz {
                    mv += m[(r, t)] * u[(t, j)];
                }
                quad += u[(r, j)] * mv;
            }
            if quad > best_val {
                best_val = quad;
                best_col = j;
            }
        }

        // Both +v and -v solve the eigenproblem; keep the candidate
        // closer to the aligned members.
        let mut dist_plus = 0.0;
        let mut dist_minus = 0.0;
        for a in &aligned {
            let mut sq_plus = 0.0;
            let mut sq_minus = 0.0;
            for t in 0..sz {
                let v = a.values()[[t, c]];
                let e = u[(t, best_col)];
                sq_plus += (v - e) * (v - e);
                sq_minus += (v + e) * (v + e);
            }
            dist_plus += sq_plus.sqrt();
            dist_minus += sq_minus.sqrt();
        }
        let sign = if dist_minus < dist_plus { -1.0 } else { 1.0 };

        for t in 0..sz {
            out[[t, c]] = sign * u[(t, best_col)];
        }
    }

    TimeSeries::new(out).expect("centroid has the reference length and feature dimension")
}

impl super::Clustering for KShape {
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

/// A fitted KShape clustering.
#[derive(Debug, Clone)]
pub struct FittedKShape {
    n_clusters: usize,
    cluster_centers: Vec<TimeSeries>,
    center_norms: Vec<f64>,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
}

impl FittedKShape {
    /// Training-set labels of the best attempt.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Final shape centroids, zero mean and unit variance per channel.
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

    /// Shape-based distance from every series to every centroid. Input
    /// series are mean/variance normalized before scoring.
    pub fn transform(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        let sz = self.cluster_centers[0].len();
        if dataset.n_features() != self.cluster_centers[0].n_features() {
            return Err(Error::DimensionMismatch {
                expected: self.cluster_centers[0].n_features(),
                found: dataset.n_features(),
            });
        }
        if dataset.uniform_len() != Some(sz) {
            return Err(Error::LengthMismatch {
                expected: sz,
                found: dataset.max_len(),
            });
        }
        let scaled = MeanVarianceScaler::default().transform_dataset(dataset)?;
        let norms: Vec<f64> = scaled.iter().map(TimeSeries::norm).collect();
        let mut dists = cdist_normalized_cc(
            scaled.series(),
            &self.cluster_centers,
            &norms,
            &self.center_norms,
        );
        dists.mapv_inplace(|v| 1.0 - v);
        Ok(dists)
    }

    /// Nearest-cluster label for every series.
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        Ok(argmin_labels(&self.transform(dataset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two shape families, three members each, z-normalized: a triangle
    /// pulse and an alternating wave. Members differ by small bumps and
    /// shifts, which the shape distance should absorb.
    fn two_shapes() -> Dataset {
        let scaler = MeanVarianceScaler::default();
        let rows = vec![
            vec![0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0],
            vec![0.1, 1.0, 2.1, 3.0, 2.0, 1.1, 0.0, 0.0],
            vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0],
            vec![-1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0],
            vec![1.0, -1.1, 1.0, -0.9, 1.0, -1.0, 1.1, -1.0],
        ];
        let series = rows
            .into_iter()
            .map(|r| scaler.transform(&TimeSeries::from_vec(r).unwrap()))
            .collect();
        Dataset::new(series).unwrap()
    }

    #[test]
    fn test_kshape_separates_shape_families() {
        let model = KShape::new(2)
            .with_n_init(8)
            .with_seed(42)
            .fit(&two_shapes())
            .unwrap();
        let labels = model.labels();
        assert_eq!(labels.len(), 6);
        assert!(labels.iter().all(|&l| l < 2));
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
        assert!(model.inertia() >= 0.0);
    }

    #[test]
    fn test_kshape_deterministic_with_seed() {
        let ds = two_shapes();
        let a = KShape::new(2).with_seed(11).fit(&ds).unwrap();
        let b = KShape::new(2).with_seed(11).fit(&ds).unwrap();
        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.inertia(), b.inertia());
    }

    #[test]
    fn test_kshape_predict_reproduces_training_labels() {
        let ds = two_shapes();
        let model = KShape::new(2).with_n_init(4).with_seed(42).fit(&ds).unwrap();
        let repredicted = model.predict(&ds).unwrap();
        assert_eq!(model.labels(), repredicted.as_slice());
    }

    #[test]
    fn test_kshape_centroids_normalized() {
        let ds = two_shapes();
        let model = KShape::new(2).with_n_init(4).with_seed(42).fit(&ds).unwrap();
        for center in model.cluster_centers() {
            let sz = center.len() as f64;
            let mean: f64 = center.values().iter().sum::<f64>() / sz;
            let var: f64 = center.values().iter().map(|v| v * v).sum::<f64>() / sz;
            assert!(mean.abs() < 1e-9, "centroid mean {mean}");
            assert!((var - 1.0).abs() < 1e-9, "centroid variance {var}");
        }
    }

    #[test]
    fn test_kshape_rejects_ragged_dataset() {
        let ds = Dataset::from_vecs(vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(KShape::new(2).fit(&ds).is_err());
    }

    #[test]
    fn test_shape_extraction_sign_invariance() {
        let scaler = MeanVarianceScaler::default();
        let members: Vec<TimeSeries> = [
            vec![0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0, 0.0],
            vec![0.1, 1.0, 2.1, 3.0, 2.0, 1.1, 0.0, 0.0],
            vec![0.0, 0.9, 2.0, 3.1, 2.1, 1.0, 0.1, 0.0],
        ]
        .into_iter()
        .map(|r| scaler.transform(&TimeSeries::from_vec(r).unwrap()))
        .collect();
        let center = members[0].clone();

        let negate = |ts: &TimeSeries| {
            TimeSeries::new(ts.values().mapv(|v| -v)).unwrap()
        };
        let neg_members: Vec<TimeSeries> = members.iter().map(negate).collect();
        let neg_center = negate(&center);

        let refs: Vec<&TimeSeries> = members.iter().collect();
        let neg_refs: Vec<&TimeSeries> = neg_members.iter().collect();
        let norms: Vec<f64> = members.iter().map(TimeSeries::norm).collect();

        let plus = shape_extraction(&refs, &norms, &center, center.norm());
        let minus = shape_extraction(&neg_refs, &norms, &neg_center, neg_center.norm());

        // Negating every member flips the extracted centroid; the
        // disambiguation score is symmetric so nothing else changes.
        for t in 0..plus.len() {
            assert!(
                (plus.values()[[t, 0]] + minus.values()[[t, 0]]).abs() < 1e-12,
                "sample {t}: {} vs {}",
                plus.values()[[t, 0]],
                minus.values()[[t, 0]]
            );
        }
    }
}
