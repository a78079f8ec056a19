//! Global Alignment Kernel (Cuturi, 2011).
//!
//! A positive-definite similarity between time series, built from the same
//! alignment recursion as DTW but summing over all alignments instead of
//! minimizing. The local kernel is the half-Gaussian
//!
//! ```text
//! κ(xᵢ, yⱼ) = e^{-||xᵢ-yⱼ||² / 2σ²} / (2 - e^{-||xᵢ-yⱼ||² / 2σ²})
//! ```
//!
//! and the accumulation runs entirely in log space to avoid underflow on
//! long series. [`cdist_gak`] returns the normalized kernel
//! `k(x, y) / √(k(x, x)·k(y, y))`, which is exactly 1 on the diagonal —
//! the property the kernel-trick distance formula of kernel k-means
//! relies on.

use ndarray::Array2;

use crate::dataset::TimeSeries;
use crate::distances::pairwise;

#[inline]
fn logsumexp3(a: f64, b: f64, c: f64) -> f64 {
    let m = a.max(b).max(c);
    if m == f64::NEG_INFINITY {
        return m;
    }
    m + ((a - m).exp() + (b - m).exp() + (c - m).exp()).ln()
}

/// Log of the unnormalized Global Alignment Kernel.
pub fn log_gak(a: &TimeSeries, b: &TimeSeries, sigma: f64) -> f64 {
    let (m, n) = (a.len(), b.len());
    let inv = 1.0 / (2.0 * sigma * sigma);

    // Rolling-row accumulation of log Σ_alignments Π κ.
    let mut prev = vec![f64::NEG_INFINITY; n + 1];
    let mut curr = vec![f64::NEG_INFINITY; n + 1];
    prev[0] = 0.0;

    for i in 1..=m {
        curr[0] = f64::NEG_INFINITY;
        for j in 1..=n {
            let g = -a.frame_sq_dist(i - 1, b, j - 1) * inv;
            // log κ for the half-Gaussian local kernel.
            let lk = g - (2.0 - g.exp()).ln();
            curr[j] = lk + logsumexp3(prev[j], curr[j - 1], prev[j - 1]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalized Global Alignment Kernel value in `(0, 1]`.
pub fn gak(a: &TimeSeries, b: &TimeSeries, sigma: f64) -> f64 {
    (log_gak(a, b, sigma) - 0.5 * (log_gak(a, a, sigma) + log_gak(b, b, sigma))).exp()
}

/// Batch normalized GAK similarity. When `a` and `b` are the same
/// collection the result is a Gram matrix with unit diagonal.
pub fn cdist_gak(a: &[TimeSeries], b: &[TimeSeries], sigma: f64) -> Array2<f64> {
    let self_a: Vec<f64> = a.iter().map(|x| log_gak(x, x, sigma)).collect();
    let self_b: Vec<f64> = b.iter().map(|y| log_gak(y, y, sigma)).collect();
    let mut out = pairwise(a, b, |x, y| log_gak(x, y, sigma));
    for i in 0..a.len() {
        for j in 0..b.len() {
            out[[i, j]] = (out[[i, j]] - 0.5 * (self_a[i] + self_b[j])).exp();
        }
    }
    out
}

/// Median-heuristic bandwidth for GAK, derived from the training set:
/// the median distance between sample frames, scaled by the square root
/// of the median series length. Frames are subsampled on a fixed stride
/// so the heuristic stays cheap and deterministic on large datasets.
pub fn sigma_gak(dataset: &[TimeSeries]) -> f64 {
    const MAX_FRAMES: usize = 128;

    let total_frames: usize = dataset.iter().map(TimeSeries::len).sum();
    let stride = (total_frames / MAX_FRAMES).max(1);

    let mut frames: Vec<(usize, usize)> = Vec::new();
    let mut counter = 0usize;
    for (s, series) in dataset.iter().enumerate() {
        for t in 0..series.len() {
            if counter % stride == 0 {
                frames.push((s, t));
            }
            counter += 1;
        }
    }

    let mut dists = Vec::with_capacity(frames.len() * frames.len() / 2);
    for (i, &(s1, t1)) in frames.iter().enumerate() {
        for &(s2, t2) in frames.iter().skip(i + 1) {
            dists.push(dataset[s1].frame_sq_dist(t1, &dataset[s2], t2).sqrt());
        }
    }
    if dists.is_empty() {
        return 1.0;
    }
    dists.sort_by(f64::total_cmp);
    let median_dist = dists[dists.len() / 2];

    let mut lens: Vec<usize> = dataset.iter().map(TimeSeries::len).collect();
    lens.sort_unstable();
    let median_len = lens[lens.len() / 2] as f64;

    let sigma = median_dist * median_len.sqrt();
    if sigma > 0.0 {
        sigma
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TimeSeries> {
        vec![
            TimeSeries::from_vec(vec![0.0, 0.2, 0.5, 0.3]).unwrap(),
            TimeSeries::from_vec(vec![0.1, 0.3, 0.4]).unwrap(),
            TimeSeries::from_vec(vec![2.0, 2.5, 2.2, 2.4, 2.1]).unwrap(),
        ]
    }

    #[test]
    fn test_gram_unit_diagonal() {
        let xs = sample();
        let k = cdist_gak(&xs, &xs, 1.0);
        for i in 0..3 {
            assert!(
                (k[[i, i]] - 1.0).abs() < 1e-12,
                "diagonal entry {} = {}",
                i,
                k[[i, i]]
            );
        }
    }

    #[test]
    fn test_gram_symmetric_in_unit_interval() {
        let xs = sample();
        let k = cdist_gak(&xs, &xs, 1.0);
        for i in 0..3 {
            for j in 0..3 {
                assert!((k[[i, j]] - k[[j, i]]).abs() < 1e-12);
                assert!(k[[i, j]] > 0.0);
                assert!(k[[i, j]] <= 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn test_similar_series_score_higher() {
        let xs = sample();
        let k = cdist_gak(&xs, &xs, 1.0);
        // Series 0 and 1 are close in value, series 2 is far from both.
        assert!(k[[0, 1]] > k[[0, 2]]);
        assert!(k[[0, 1]] > k[[1, 2]]);
    }

    #[test]
    fn test_sigma_gak_positive() {
        let xs = sample();
        let sigma = sigma_gak(&xs);
        assert!(sigma > 0.0);
        assert!(sigma.is_finite());
    }

    #[test]
    fn test_sigma_gak_degenerate_dataset() {
        let xs = vec![
            TimeSeries::from_vec(vec![1.0, 1.0]).unwrap(),
            TimeSeries::from_vec(vec![1.0, 1.0]).unwrap(),
        ];
        assert_eq!(sigma_gak(&xs), 1.0);
    }
}
