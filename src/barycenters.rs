//! Cluster representatives under each metric.
//!
//! The centroid-update step of the clustering loop delegates here, once
//! per cluster per iteration:
//!
//! - [`euclidean_barycenter`]: element-wise mean of equal-length members.
//! - [`dtw_barycenter_averaging`]: DBA (Petitjean et al., 2011). Each
//!   iteration aligns every member to the current barycenter with DTW and
//!   replaces every barycenter sample by the mean of the member samples
//!   its path cell absorbed.
//! - [`softdtw_barycenter`]: the smoothed counterpart. The soft-alignment
//!   expectation matrix replaces the hard path, so every member sample
//!   contributes to every barycenter sample with its alignment weight.
//!
//! Both iterative solvers are seeded with the previous centroid, which is
//! what keeps successive k-means update steps cheap: a near-converged
//! centroid needs only a refinement, not a solve from scratch.

use ndarray::Array2;
use tracing::debug;

use crate::dataset::TimeSeries;
use crate::distances::dtw::dtw_path;
use crate::distances::soft_dtw::soft_alignment;
use crate::error::{Error, Result};

/// Element-wise mean of equal-length members.
pub fn euclidean_barycenter(members: &[&TimeSeries]) -> Result<TimeSeries> {
    let first = members.first().ok_or(Error::EmptyInput)?;
    let len = first.len();
    let d = first.n_features();
    for m in members {
        if m.len() != len {
            return Err(Error::LengthMismatch {
                expected: len,
                found: m.len(),
            });
        }
    }

    let mut out = Array2::zeros((len, d));
    for m in members {
        out += m.values();
    }
    out /= members.len() as f64;
    TimeSeries::new(out)
}

/// DTW Barycenter Averaging, seeded with `init` and refined for at most
/// `max_iter` rounds or until the largest per-sample change drops below
/// `tol`. The barycenter keeps the length of `init`.
pub fn dtw_barycenter_averaging(
    members: &[&TimeSeries],
    init: &TimeSeries,
    max_iter: usize,
    tol: f64,
) -> Result<TimeSeries> {
    if members.is_empty() {
        return Err(Error::EmptyInput);
    }
    let len = init.len();
    let d = init.n_features();
    let mut barycenter = init.clone();

    for iter in 0..max_iter {
        let mut sums = Array2::<f64>::zeros((len, d));
        let mut counts = vec![0usize; len];

        for m in members {
            let (_, path) = dtw_path(&barycenter, m);
            for (i, j) in path {
                for c in 0..d {
                    sums[[i, c]] += m.values()[[j, c]];
                }
                counts[i] += 1;
            }
        }

        let mut delta = 0.0_f64;
        let mut next = Array2::zeros((len, d));
        for i in 0..len {
            for c in 0..d {
                let v = if counts[i] > 0 {
                    sums[[i, c]] / counts[i] as f64
                } else {
                    barycenter.values()[[i, c]]
                };
                delta = delta.max((v - barycenter.values()[[i, c]]).abs());
                next[[i, c]] = v;
            }
        }
        barycenter = TimeSeries::new(next)?;
        debug!(iteration = iter + 1, delta, "dba refinement");
        if delta < tol {
            break;
        }
    }

    Ok(barycenter)
}

/// Soft-DTW barycenter via the soft-alignment expectation update, seeded
/// with `init`. Every round recomputes the alignment of each member to the
/// current barycenter and replaces each barycenter sample by the
/// expectation-weighted mean of the member samples aligned to it.
pub fn softdtw_barycenter(
    members: &[&TimeSeries],
    init: &TimeSeries,
    gamma: f64,
    max_iter: usize,
    tol: f64,
) -> Result<TimeSeries> {
    if members.is_empty() {
        return Err(Error::EmptyInput);
    }
    if gamma <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "gamma",
            message: "soft-dtw smoothing must be positive",
        });
    }
    let len = init.len();
    let d = init.n_features();
    let mut barycenter = init.clone();

    for iter in 0..max_iter {
        let mut num = Array2::<f64>::zeros((len, d));
        let mut den = vec![0.0_f64; len];

        for m in members {
            let (_, e) = soft_alignment(&barycenter, m, gamma);
            for i in 0..len {
                for j in 0..m.len() {
                    let w = e[[i, j]];
                    if w == 0.0 {
                        continue;
                    }
                    for c in 0..d {
                        num[[i, c]] += w * m.values()[[j, c]];
                    }
                    den[i] += w;
                }
            }
        }

        let mut delta = 0.0_f64;
        let mut next = Array2::zeros((len, d));
        for i in 0..len {
            for c in 0..d {
                let v = if den[i] > 0.0 {
                    num[[i, c]] / den[i]
                } else {
                    barycenter.values()[[i, c]]
                };
                delta = delta.max((v - barycenter.values()[[i, c]]).abs());
                next[[i, c]] = v;
            }
        }
        barycenter = TimeSeries::new(next)?;
        debug!(iteration = iter + 1, delta, "soft-dtw barycenter refinement");
        if delta < tol {
            break;
        }
    }

    Ok(barycenter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_barycenter_is_mean() {
        let a = TimeSeries::from_vec(vec![0.0, 0.0, 0.0]).unwrap();
        let b = TimeSeries::from_vec(vec![2.0, 4.0, 6.0]).unwrap();
        let bc = euclidean_barycenter(&[&a, &b]).unwrap();
        assert_eq!(bc.values()[[0, 0]], 1.0);
        assert_eq!(bc.values()[[1, 0]], 2.0);
        assert_eq!(bc.values()[[2, 0]], 3.0);
    }

    #[test]
    fn test_euclidean_barycenter_rejects_ragged_members() {
        let a = TimeSeries::from_vec(vec![0.0, 0.0]).unwrap();
        let b = TimeSeries::from_vec(vec![1.0]).unwrap();
        assert!(euclidean_barycenter(&[&a, &b]).is_err());
    }

    #[test]
    fn test_empty_members_rejected() {
        let init = TimeSeries::from_vec(vec![0.0, 0.0]).unwrap();
        assert_eq!(euclidean_barycenter(&[]), Err(Error::EmptyInput));
        assert_eq!(
            dtw_barycenter_averaging(&[], &init, 5, 1e-5),
            Err(Error::EmptyInput)
        );
        assert_eq!(
            softdtw_barycenter(&[], &init, 1.0, 5, 1e-5),
            Err(Error::EmptyInput)
        );
    }

    #[test]
    fn test_dba_identical_members_fixed_point() {
        let s = TimeSeries::from_vec(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let bc = dtw_barycenter_averaging(&[&s, &s, &s], &s, 10, 1e-8).unwrap();
        for t in 0..4 {
            assert!((bc.values()[[t, 0]] - s.values()[[t, 0]]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_dba_keeps_init_length() {
        let a = TimeSeries::from_vec(vec![1.0, 2.0, 3.0]).unwrap();
        let b = TimeSeries::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let init = TimeSeries::from_vec(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let bc = dtw_barycenter_averaging(&[&a, &b], &init, 10, 1e-5).unwrap();
        assert_eq!(bc.len(), 4);
    }

    #[test]
    fn test_soft_barycenter_constant_members_exact() {
        let s = TimeSeries::from_vec(vec![3.0, 3.0, 3.0]).unwrap();
        let bc = softdtw_barycenter(&[&s, &s], &s, 1.0, 10, 1e-10).unwrap();
        for t in 0..3 {
            assert!((bc.values()[[t, 0]] - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_soft_barycenter_small_gamma_tracks_members() {
        let s = TimeSeries::from_vec(vec![0.0, 1.0, 4.0, 9.0]).unwrap();
        let bc = softdtw_barycenter(&[&s, &s, &s], &s, 0.01, 5, 1e-8).unwrap();
        for t in 0..4 {
            assert!(
                (bc.values()[[t, 0]] - s.values()[[t, 0]]).abs() < 1e-3,
                "sample {t} drifted"
            );
        }
    }

    #[test]
    fn test_soft_barycenter_rejects_nonpositive_gamma() {
        let s = TimeSeries::from_vec(vec![1.0, 2.0]).unwrap();
        assert!(softdtw_barycenter(&[&s], &s, 0.0, 5, 1e-5).is_err());
    }
}
