//! # cadence
//!
//! Partitional clustering for time series under pluggable dissimilarity
//! measures: k-means over Euclidean, DTW, or Soft-DTW with the matching
//! barycenter updates, kernel k-means over a Gram matrix (Global
//! Alignment Kernel by default), and KShape's shift-invariant
//! cross-correlation clustering.
//!
//! All estimators follow the same shape: a builder-style configuration
//! struct whose `fit` consumes a [`Dataset`] and returns a fitted model
//! carrying labels, centroids (where they exist), inertia, and the
//! iteration count of the best restart. A fit that cannot produce a
//! valid partition (every attempt hit an empty cluster) fails with
//! [`Error::FitExhausted`] instead of leaving a half-fitted model behind.
//!
//! ```rust
//! use cadence::{Dataset, Metric, TimeSeriesKMeans};
//!
//! let dataset = Dataset::from_vecs(vec![
//!     vec![1.0, 2.0, 3.0, 4.0],
//!     vec![1.1, 2.1, 3.1, 4.1],
//!     vec![9.0, 8.0, 7.0, 6.0],
//!     vec![9.1, 8.1, 7.1, 6.1],
//! ]).unwrap();
//!
//! let model = TimeSeriesKMeans::new(2)
//!     .with_metric(Metric::Dtw)
//!     .with_seed(0)
//!     .fit(&dataset)
//!     .unwrap();
//!
//! assert_eq!(model.labels()[0], model.labels()[1]);
//! assert_ne!(model.labels()[0], model.labels()[2]);
//! ```

pub mod barycenters;
pub mod cluster;
pub mod dataset;
pub mod distances;
/// Error types used across `cadence`.
pub mod error;
pub mod metrics;
pub mod preprocessing;

pub use cluster::{
    Clustering, FittedKShape, FittedKernelKMeans, FittedTimeSeriesKMeans, GakSigma, KMeansInit,
    KShape, KShapeInit, Kernel, KernelKMeans, TimeSeriesKMeans,
};
pub use dataset::{Dataset, TimeSeries};
pub use distances::Metric;
pub use error::{Error, Result};
pub use metrics::{ari, silhouette_score, SilhouetteMetric};
pub use preprocessing::{resample_to_length, MeanVarianceScaler};
