//! Time-series containers.
//!
//! A [`TimeSeries`] is an ordered run of feature vectors stored as a dense
//! `(len, d)` matrix. Series are stored at their exact effective length —
//! there is no sentinel padding, so distance and barycenter code never has
//! to branch on placeholder values. A [`Dataset`] is an ordered collection
//! of series sharing a feature dimension; lengths may differ between
//! series (DTW-family metrics accept ragged collections, Euclidean fitting
//! requires a uniform length and checks for it up front).

use ndarray::Array2;

use crate::error::{Error, Result};

/// A single time series: `len` ordered samples of `d` features each.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    values: Array2<f64>,
}

impl TimeSeries {
    /// Create a series from a `(len, d)` value matrix.
    ///
    /// Fails with [`Error::EmptyInput`] when the matrix has zero rows or
    /// zero columns.
    pub fn new(values: Array2<f64>) -> Result<Self> {
        if values.nrows() == 0 || values.ncols() == 0 {
            return Err(Error::EmptyInput);
        }
        Ok(Self { values })
    }

    /// Create a univariate series from a value vector.
    pub fn from_vec(values: Vec<f64>) -> Result<Self> {
        let len = values.len();
        let arr = Array2::from_shape_vec((len, 1), values)
            .map_err(|e| Error::Other(e.to_string()))?;
        Self::new(arr)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    /// Whether the series holds zero samples. Always false for a
    /// constructed series; provided for the conventional pairing with
    /// [`TimeSeries::len`].
    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Feature dimension.
    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Borrow the underlying `(len, d)` matrix.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Frobenius norm over all samples and features.
    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Squared Euclidean distance between two frames of equal-length series.
    #[inline]
    pub(crate) fn frame_sq_dist(&self, i: usize, other: &TimeSeries, j: usize) -> f64 {
        let mut acc = 0.0;
        for c in 0..self.n_features() {
            let diff = self.values[[i, c]] - other.values[[j, c]];
            acc += diff * diff;
        }
        acc
    }
}

/// An ordered collection of time series with a shared feature dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    series: Vec<TimeSeries>,
    n_features: usize,
}

impl Dataset {
    /// Build a dataset, validating that every series shares the feature
    /// dimension of the first.
    pub fn new(series: Vec<TimeSeries>) -> Result<Self> {
        let first = series.first().ok_or(Error::EmptyInput)?;
        let n_features = first.n_features();
        for s in &series {
            if s.n_features() != n_features {
                return Err(Error::DimensionMismatch {
                    expected: n_features,
                    found: s.n_features(),
                });
            }
        }
        Ok(Self { series, n_features })
    }

    /// Build a univariate dataset from plain value vectors.
    pub fn from_vecs(rows: Vec<Vec<f64>>) -> Result<Self> {
        let series = rows
            .into_iter()
            .map(TimeSeries::from_vec)
            .collect::<Result<Vec<_>>>()?;
        Self::new(series)
    }

    /// Number of series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the dataset holds zero series. Always false for a
    /// constructed dataset.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Shared feature dimension.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Length of the longest series; the reference length centroids are
    /// resampled to.
    pub fn max_len(&self) -> usize {
        self.series.iter().map(TimeSeries::len).max().unwrap_or(0)
    }

    /// `Some(len)` when every series has the same length, `None` for a
    /// ragged collection.
    pub fn uniform_len(&self) -> Option<usize> {
        let len = self.series[0].len();
        self.series
            .iter()
            .all(|s| s.len() == len)
            .then_some(len)
    }

    /// Borrow a series by index.
    pub fn get(&self, index: usize) -> &TimeSeries {
        &self.series[index]
    }

    /// Borrow the series slice.
    pub fn series(&self) -> &[TimeSeries] {
        &self.series
    }

    /// Iterate over the series.
    pub fn iter(&self) -> std::slice::Iter<'_, TimeSeries> {
        self.series.iter()
    }

    /// Flatten an equal-length dataset to an `(n, len * d)` matrix, sample
    /// values in time-major order. Used by the closed-form Euclidean paths.
    pub(crate) fn flatten(&self) -> Result<Array2<f64>> {
        let len = self.uniform_len().ok_or(Error::LengthMismatch {
            expected: self.series[0].len(),
            found: self.max_len(),
        })?;
        let d = self.n_features;
        let mut out = Array2::zeros((self.len(), len * d));
        for (i, s) in self.series.iter().enumerate() {
            for t in 0..len {
                for c in 0..d {
                    out[[i, t * d + c]] = s.values()[[t, c]];
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_series_shape() {
        let ts = TimeSeries::new(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.n_features(), 2);
    }

    #[test]
    fn test_series_from_vec_is_univariate() {
        let ts = TimeSeries::from_vec(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.n_features(), 1);
        assert_eq!(ts.values()[[1, 0]], 2.0);
    }

    #[test]
    fn test_empty_series_rejected() {
        let result = TimeSeries::from_vec(vec![]);
        assert_eq!(result, Err(Error::EmptyInput));
    }

    #[test]
    fn test_series_norm() {
        let ts = TimeSeries::from_vec(vec![3.0, 4.0]).unwrap();
        assert!((ts.norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_dataset_ragged_lengths() {
        let ds = Dataset::from_vecs(vec![
            vec![1.0, 2.0, 3.0, 4.0],
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        ])
        .unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.max_len(), 6);
        assert_eq!(ds.uniform_len(), None);
    }

    #[test]
    fn test_dataset_uniform_len() {
        let ds = Dataset::from_vecs(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(ds.uniform_len(), Some(2));
    }

    #[test]
    fn test_dataset_dimension_mismatch() {
        let a = TimeSeries::new(array![[1.0, 2.0]]).unwrap();
        let b = TimeSeries::new(array![[1.0]]).unwrap();
        let result = Dataset::new(vec![a, b]);
        assert_eq!(
            result,
            Err(Error::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_flatten_requires_uniform_length() {
        let ds = Dataset::from_vecs(vec![vec![1.0, 2.0], vec![3.0]]).unwrap();
        assert!(ds.flatten().is_err());

        let ds = Dataset::from_vecs(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let flat = ds.flatten().unwrap();
        assert_eq!(flat[[1, 0]], 3.0);
        assert_eq!(flat[[1, 1]], 4.0);
    }
}
