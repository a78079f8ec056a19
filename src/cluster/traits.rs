//! Clustering traits.

use crate::dataset::Dataset;
use crate::error::Result;

/// Trait for partitional clustering estimators.
pub trait Clustering {
    /// Fit the model to a dataset and return cluster labels, one per
    /// series, each in `[0, n_clusters)`.
    fn fit_predict(&self, dataset: &Dataset) -> Result<Vec<usize>>;

    /// Get the number of clusters.
    fn n_clusters(&self) -> usize;
}
