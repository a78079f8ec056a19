//! Shift-aware normalized cross-correlation.
//!
//! The shape-based distance behind KShape (Paparrizos & Gravano, 2015):
//! two equal-length series are compared at every relative shift, the
//! cross-correlation is normalized by the product of the series norms, and
//! the best shift wins:
//!
//! ```text
//! NCC(x, y) = max_s  Σ_t <x[t+s], y[t]>  /  (||x||·||y||)
//! SBD(x, y) = 1 − NCC(x, y)
//! ```
//!
//! For multivariate series the correlation is summed over feature
//! channels and a single shift is chosen for the whole series.

use ndarray::Array2;

use crate::dataset::TimeSeries;

/// Cross-correlation profile between two equal-length series, normalized
/// by `norm_x * norm_y`.
///
/// The returned vector has `2·sz − 1` entries; index `idx` corresponds to
/// shift `s = idx − (sz − 1)`, with `profile[idx] = Σ_t <x[t+s], y[t]>`
/// over valid `t` (zero padding outside the series).
pub fn normalized_cc_profile(
    x: &TimeSeries,
    y: &TimeSeries,
    norm_x: f64,
    norm_y: f64,
) -> Vec<f64> {
    debug_assert_eq!(x.len(), y.len(), "cross-correlation requires equal lengths");
    let sz = x.len();
    let d = x.n_features();
    let denom = norm_x * norm_y;
    let mut profile = vec![0.0; 2 * sz - 1];
    if denom <= 0.0 {
        return profile;
    }

    for (idx, slot) in profile.iter_mut().enumerate() {
        let s = idx as isize - (sz as isize - 1);
        let mut acc = 0.0;
        let (t_lo, t_hi) = if s >= 0 {
            (0, sz - s as usize)
        } else {
            ((-s) as usize, sz)
        };
        for t in t_lo..t_hi {
            let u = (t as isize + s) as usize;
            for c in 0..d {
                acc += x.values()[[u, c]] * y.values()[[t, c]];
            }
        }
        *slot = acc / denom;
    }
    profile
}

/// Maximum of the normalized cross-correlation profile.
pub fn max_normalized_cc(x: &TimeSeries, y: &TimeSeries, norm_x: f64, norm_y: f64) -> f64 {
    normalized_cc_profile(x, y, norm_x, norm_y)
        .into_iter()
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Batch maximum normalized cross-correlation between two collections,
/// with precomputed norms. Entries lie in `[-1, 1]`.
pub fn cdist_normalized_cc(
    a: &[TimeSeries],
    b: &[TimeSeries],
    norms_a: &[f64],
    norms_b: &[f64],
) -> Array2<f64> {
    let mut out = Array2::zeros((a.len(), b.len()));
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[[i, j]] = max_normalized_cc(x, y, norms_a[i], norms_b[j]);
        }
    }
    out
}

/// Shift `member` to its best alignment against `reference`.
///
/// The chosen shift `s` maximizes the normalized cross-correlation of the
/// pair; the returned series satisfies `aligned[t + s] = member[t]`, with
/// zeros where the shift moves samples out of range. Also returns `s`.
pub fn shift_to_reference(
    reference: &TimeSeries,
    member: &TimeSeries,
    norm_ref: f64,
    norm_member: f64,
) -> (TimeSeries, isize) {
    let sz = reference.len();
    let d = member.n_features();
    let profile = normalized_cc_profile(reference, member, norm_ref, norm_member);

    let mut best_idx = 0;
    for (idx, &v) in profile.iter().enumerate() {
        if v > profile[best_idx] {
            best_idx = idx;
        }
    }
    let shift = best_idx as isize - (sz as isize - 1);

    let mut out = Array2::zeros((sz, d));
    for t in 0..sz {
        let u = t as isize + shift;
        if u >= 0 && (u as usize) < sz {
            for c in 0..d {
                out[[u as usize, c]] = member.values()[[t, c]];
            }
        }
    }
    (
        TimeSeries::new(out).expect("reference length and member dimension are nonzero"),
        shift,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::MeanVarianceScaler;

    fn znorm(values: Vec<f64>) -> TimeSeries {
        let ts = TimeSeries::from_vec(values).unwrap();
        MeanVarianceScaler::default().transform(&ts)
    }

    #[test]
    fn test_identical_series_correlate_at_one() {
        let x = znorm(vec![1.0, 3.0, 2.0, 5.0]);
        let n = x.norm();
        let ncc = max_normalized_cc(&x, &x, n, n);
        assert!((ncc - 1.0).abs() < 1e-12, "self NCC {ncc} should be 1");
    }

    #[test]
    fn test_shifted_copy_recovers_shift() {
        // y is x delayed by one sample.
        let x = TimeSeries::from_vec(vec![0.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
        let y = TimeSeries::from_vec(vec![0.0, 0.0, 1.0, 0.0, 0.0]).unwrap();
        let (aligned, shift) = shift_to_reference(&x, &y, x.norm(), y.norm());
        assert_eq!(shift, -1);
        // After alignment the spike sits where the reference has it.
        assert_eq!(aligned.values()[[1, 0]], 1.0);
        assert_eq!(aligned.values()[[2, 0]], 0.0);
    }

    #[test]
    fn test_profile_shift_convention() {
        let x = TimeSeries::from_vec(vec![1.0, 0.0]).unwrap();
        let y = TimeSeries::from_vec(vec![0.0, 1.0]).unwrap();
        let profile = normalized_cc_profile(&x, &y, 1.0, 1.0);
        // sz = 2: shifts -1, 0, 1. x[t-1]·y[t] hits x[0]·y[1] = 1 at s = -1.
        assert_eq!(profile.len(), 3);
        assert!((profile[0] - 1.0).abs() < 1e-12);
        assert!(profile[1].abs() < 1e-12);
        assert!(profile[2].abs() < 1e-12);
    }

    #[test]
    fn test_cdist_bounds() {
        let xs = vec![
            znorm(vec![0.0, 1.0, 2.0, 1.0]),
            znorm(vec![2.0, 1.0, 0.0, 1.0]),
            znorm(vec![1.0, 2.0, 1.0, 0.0]),
        ];
        let norms: Vec<f64> = xs.iter().map(TimeSeries::norm).collect();
        let cc = cdist_normalized_cc(&xs, &xs, &norms, &norms);
        for i in 0..3 {
            assert!((cc[[i, i]] - 1.0).abs() < 1e-12);
            for j in 0..3 {
                assert!(cc[[i, j]] <= 1.0 + 1e-12);
                assert!(cc[[i, j]] >= -1.0 - 1e-12);
            }
        }
    }

    #[test]
    fn test_zero_norm_yields_zero_profile() {
        let x = TimeSeries::from_vec(vec![0.0, 0.0, 0.0]).unwrap();
        let y = TimeSeries::from_vec(vec![1.0, 2.0, 3.0]).unwrap();
        let ncc = max_normalized_cc(&x, &y, x.norm(), y.norm());
        assert_eq!(ncc, 0.0);
    }
}
