//! Scaling and resampling transforms.
//!
//! Two small collaborators of the clustering core: a per-series
//! mean/variance scaler (KShape operates on z-normalized series and
//! re-normalizes its centroids after every shape extraction), and a
//! linear-interpolation resampler used to bring centroids back to the
//! dataset's reference length whenever an update or an explicit
//! initialization produces a shorter series.

use ndarray::Array2;

use crate::dataset::{Dataset, TimeSeries};
use crate::error::Result;

/// Rescale each series to a target mean and standard deviation,
/// independently per feature channel.
#[derive(Debug, Clone)]
pub struct MeanVarianceScaler {
    mu: f64,
    std: f64,
}

impl MeanVarianceScaler {
    /// Create a scaler targeting mean `mu` and standard deviation `std`.
    pub fn new(mu: f64, std: f64) -> Self {
        Self { mu, std }
    }

    /// Rescale one series. Channels with zero variance keep their values
    /// centered at `mu`.
    pub fn transform(&self, series: &TimeSeries) -> TimeSeries {
        let len = series.len();
        let d = series.n_features();
        let mut out = Array2::zeros((len, d));
        for c in 0..d {
            let mut mean = 0.0;
            for t in 0..len {
                mean += series.values()[[t, c]];
            }
            mean /= len as f64;

            let mut var = 0.0;
            for t in 0..len {
                let diff = series.values()[[t, c]] - mean;
                var += diff * diff;
            }
            var /= len as f64;
            let std = if var > 0.0 { var.sqrt() } else { 1.0 };

            for t in 0..len {
                out[[t, c]] = (series.values()[[t, c]] - mean) / std * self.std + self.mu;
            }
        }
        TimeSeries::new(out).expect("output shape matches a constructed input series")
    }

    /// Rescale every series in a dataset.
    pub fn transform_dataset(&self, dataset: &Dataset) -> Result<Dataset> {
        Dataset::new(dataset.iter().map(|s| self.transform(s)).collect())
    }
}

impl Default for MeanVarianceScaler {
    /// Zero mean, unit variance.
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

/// Resample a series to `target_len` samples by linear interpolation over
/// a uniform time grid, independently per feature channel.
///
/// A length-1 series is extended by repetition. Resampling to the current
/// length returns a plain copy.
pub fn resample_to_length(series: &TimeSeries, target_len: usize) -> TimeSeries {
    let len = series.len();
    let d = series.n_features();
    if len == target_len {
        return series.clone();
    }

    let mut out = Array2::zeros((target_len, d));
    for t in 0..target_len {
        // Position of output sample t on the input grid.
        let pos = if target_len > 1 {
            t as f64 * (len - 1) as f64 / (target_len - 1) as f64
        } else {
            0.0
        };
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(len - 1);
        let frac = pos - lo as f64;
        for c in 0..d {
            let a = series.values()[[lo, c]];
            let b = series.values()[[hi, c]];
            out[[t, c]] = a + (b - a) * frac;
        }
    }
    TimeSeries::new(out).expect("target_len >= 1 and d >= 1")
}
