//! Dissimilarity measures for time series.
//!
//! The clustering core consumes these through batch cross-distance calls:
//! given two series collections `A` (n) and `B` (m), each measure produces
//! an n×m matrix. Euclidean distance requires equal lengths; DTW and
//! Soft-DTW accept ragged collections; the Global Alignment Kernel
//! ([`gak`]) produces similarities normalized to 1 on the diagonal; the
//! shift-aware normalized cross-correlation ([`cross_correlation`]) backs
//! the KShape variant.
//!
//! Cross-distance computation is embarrassingly parallel and fans out over
//! rows with rayon when the `parallel` feature is enabled. The convergence
//! loops that call into this module stay sequential.

pub mod cross_correlation;
pub mod dtw;
pub mod gak;
pub mod soft_dtw;

use core::fmt;
use std::str::FromStr;

use ndarray::Array2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::dataset::TimeSeries;
use crate::error::Error;

/// Dissimilarity measure used for assignment and barycenter computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    /// Euclidean distance over equal-length series.
    Euclidean,
    /// Dynamic Time Warping; barycenters via DBA.
    Dtw,
    /// Soft-DTW with smoothing parameter `gamma > 0`.
    SoftDtw {
        /// Softmin smoothing. Smaller values approach plain DTW.
        gamma: f64,
    },
}

impl Metric {
    /// Batch cross-distance between two series collections.
    pub fn cross_distance(&self, a: &[TimeSeries], b: &[TimeSeries]) -> Array2<f64> {
        match *self {
            Metric::Euclidean => pairwise(a, b, euclidean),
            Metric::Dtw => dtw::cdist_dtw(a, b),
            Metric::SoftDtw { gamma } => soft_dtw::cdist_soft_dtw(a, b, gamma),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Euclidean => write!(f, "euclidean"),
            Metric::Dtw => write!(f, "dtw"),
            Metric::SoftDtw { .. } => write!(f, "softdtw"),
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    /// Parse a metric name. `softdtw` gets the default smoothing
    /// `gamma = 1.0`.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "euclidean" => Ok(Metric::Euclidean),
            "dtw" => Ok(Metric::Dtw),
            "softdtw" => Ok(Metric::SoftDtw { gamma: 1.0 }),
            _ => Err(Error::InvalidParameter {
                name: "metric",
                message: "expected one of 'euclidean', 'dtw', 'softdtw'",
            }),
        }
    }
}

/// Euclidean distance between two equal-length series, treating the whole
/// series as one flat vector.
pub fn euclidean(a: &TimeSeries, b: &TimeSeries) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "euclidean requires equal lengths");
    let mut acc = 0.0;
    for t in 0..a.len().min(b.len()) {
        acc += a.frame_sq_dist(t, b, t);
    }
    acc.sqrt()
}

/// Batch Euclidean cross-distance.
pub fn cdist_euclidean(a: &[TimeSeries], b: &[TimeSeries]) -> Array2<f64> {
    pairwise(a, b, euclidean)
}

/// Fill an n×m matrix by applying `f` to every pair, fanning out over
/// rows when the `parallel` feature is enabled.
pub(crate) fn pairwise<F>(a: &[TimeSeries], b: &[TimeSeries], f: F) -> Array2<f64>
where
    F: Fn(&TimeSeries, &TimeSeries) -> f64 + Sync,
{
    let mut out = Array2::zeros((a.len(), b.len()));

    #[cfg(feature = "parallel")]
    {
        let rows: Vec<Vec<f64>> = a
            .par_iter()
            .map(|x| b.iter().map(|y| f(x, y)).collect())
            .collect();
        for (i, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                out[[i, j]] = v;
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[[i, j]] = f(x, y);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    #[test]
    fn test_euclidean_known_value() {
        let a = TimeSeries::from_vec(vec![0.0, 0.0]).unwrap();
        let b = TimeSeries::from_vec(vec![3.0, 4.0]).unwrap();
        assert!((euclidean(&a, &b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_cdist_euclidean_shape_and_diagonal() {
        let ds = Dataset::from_vecs(vec![
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![2.0, 2.0],
        ])
        .unwrap();
        let d = cdist_euclidean(ds.series(), ds.series());
        assert_eq!(d.nrows(), 3);
        assert_eq!(d.ncols(), 3);
        for i in 0..3 {
            assert_eq!(d[[i, i]], 0.0);
        }
        assert!((d[[0, 1]] - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("euclidean".parse::<Metric>().unwrap(), Metric::Euclidean);
        assert_eq!("dtw".parse::<Metric>().unwrap(), Metric::Dtw);
        assert_eq!(
            "softdtw".parse::<Metric>().unwrap(),
            Metric::SoftDtw { gamma: 1.0 }
        );
        assert!("manhattan".parse::<Metric>().is_err());
    }
}
