//! Azimuthal averaging of a 2D power spectrum into log-spaced radial bins.

use ndarray::{Array2, ArrayView2};

use crate::error::{PowspecError, Result};

/// Radial profile of a square image.
///
/// `edges` holds the bin edges without the innermost one (radius 1). The
/// innermost bin `[1, edges[0])` is not reported, so `means[k]` and
/// `counts[k]` describe the pixels with radius in `[edges[k], edges[k+1])`
/// and both are one shorter than `edges`. Empty bins have a NaN mean.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialProfile {
    pub edges: Vec<f64>,
    pub means: Vec<f64>,
    pub counts: Vec<usize>,
}

impl RadialProfile {
    /// Midpoints between consecutive edges, aligned with `means`.
    pub fn centers(&self) -> Vec<f64> {
        self.edges
            .windows(2)
            .map(|w| w[0] + 0.5 * (w[1] - w[0]))
            .collect()
    }
}

/// Centre used for an `n`x`n` image, shifted by half a pixel for even `n`.
pub fn image_center(n: usize) -> f64 {
    let c = (n as f64 - 1.0) / 2.0;
    if n % 2 == 0 {
        c + 0.5
    } else {
        c
    }
}

/// Distance of every pixel of an `n`x`n` image from [`image_center`].
pub fn pixel_radii(n: usize) -> Array2<f64> {
    let c = image_center(n);
    Array2::from_shape_fn((n, n), |(i, j)| (j as f64 - c).hypot(i as f64 - c))
}

/// `num_bins + 1` log-spaced edges from 1 to `n/2`.
pub fn log_bin_edges(n: usize, num_bins: usize) -> Vec<f64> {
    let top = n as f64 / 2.0;
    let log_top = top.log10();
    let mut edges: Vec<f64> = (0..=num_bins)
        .map(|k| 10_f64.powf(log_top * k as f64 / num_bins as f64))
        .collect();
    edges[0] = 1.0;
    edges[num_bins] = top;
    edges
}

pub fn radial_profile(image: ArrayView2<f64>, num_bins: usize) -> Result<RadialProfile> {
    let (rows, cols) = image.dim();
    if rows != cols {
        return Err(PowspecError::NotSquare { rows, cols });
    }
    if num_bins < 2 {
        return Err(PowspecError::InvalidConfig(format!(
            "radial profile needs at least 2 bins, got {num_bins}"
        )));
    }
    let n = rows;
    if n < 3 {
        return Err(PowspecError::InvalidConfig(format!(
            "image of side {n} is too small for radial binning"
        )));
    }

    let edges = log_bin_edges(n, num_bins);
    let radii = pixel_radii(n);

    let mut sorted: Vec<(f64, f64)> = radii
        .iter()
        .zip(image.iter())
        .map(|(&r, &v)| (r, v))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    // pixels inside radius 1 precede every bin in the sorted order
    let mut inner = 0_usize;
    let mut counts = vec![0_usize; num_bins];
    for &(r, _) in &sorted {
        if r < edges[0] {
            inner += 1;
            continue;
        }
        if r > edges[num_bins] {
            break;
        }
        let k = (edges.partition_point(|&e| e <= r) - 1).min(num_bins - 1);
        counts[k] += 1;
    }

    let mut prefix = vec![0.0; sorted.len() + 1];
    for (k, &(_, v)) in sorted.iter().enumerate() {
        prefix[k + 1] = prefix[k] + v;
    }

    let mut start = inner + counts[0];
    let means = counts[1..]
        .iter()
        .map(|&c| {
            let total = prefix[start + c] - prefix[start];
            start += c;
            total / c as f64
        })
        .collect();

    Ok(RadialProfile {
        edges: edges[1..].to_vec(),
        means,
        counts: counts[1..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_center_even_and_odd() {
        assert_eq!(image_center(37), 18.0);
        assert_eq!(image_center(8), 4.0);
        let r = pixel_radii(8);
        assert_eq!(r[(4, 4)], 0.0);
        assert_eq!(r[(4, 0)], 4.0);
    }

    #[test]
    fn test_edges_span_one_to_half_size() {
        let e = log_bin_edges(37, 50);
        assert_eq!(e.len(), 51);
        assert_eq!(e[0], 1.0);
        assert_eq!(e[50], 18.5);
        assert!(e.windows(2).all(|w| w[1] > w[0]));
        let ratio = e[1] / e[0];
        assert_relative_eq!(e[26] / e[25], ratio, max_relative = 1e-10);
    }

    #[test]
    fn test_zero_image_gives_zero_or_nan() {
        let image = Array2::<f64>::zeros((37, 37));
        let p = radial_profile(image.view(), 50).unwrap();
        assert_eq!(p.edges.len(), 50);
        assert_eq!(p.means.len(), 49);
        for (&m, &c) in p.means.iter().zip(p.counts.iter()) {
            if c == 0 {
                assert!(m.is_nan());
            } else {
                assert_eq!(m, 0.0);
            }
        }
        assert!(p.counts.iter().any(|&c| c == 0));
    }

    #[test]
    fn test_constant_rings_are_recovered() {
        let n = 64;
        let num_bins = 12;
        let edges = log_bin_edges(n, num_bins);
        let radii = pixel_radii(n);
        let ring_value = |r: f64| {
            let k = edges.partition_point(|&e| e <= r);
            10.0 * k as f64 + 3.0
        };
        let image = radii.map(|&r| ring_value(r));
        let p = radial_profile(image.view(), num_bins).unwrap();
        for (k, (&m, &c)) in p.means.iter().zip(p.counts.iter()).enumerate() {
            if c > 0 && k + 1 < p.edges.len() - 1 {
                assert_relative_eq!(m, ring_value(p.edges[k]), max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_matches_direct_binning() {
        let n = 20;
        let num_bins = 8;
        let mut rng = StdRng::seed_from_u64(7);
        let image = Array2::from_shape_fn((n, n), |_| rng.gen_range(0.0..5.0));
        let p = radial_profile(image.view(), num_bins).unwrap();

        let edges = log_bin_edges(n, num_bins);
        let radii = pixel_radii(n);
        for k in 1..num_bins {
            let lo = edges[k];
            let hi = edges[k + 1];
            let last = k == num_bins - 1;
            let (sum, count) = radii.iter().zip(image.iter()).fold(
                (0.0, 0_usize),
                |(s, c), (&r, &v)| {
                    if r >= lo && (r < hi || (last && r <= hi)) {
                        (s + v, c + 1)
                    } else {
                        (s, c)
                    }
                },
            );
            assert_eq!(p.counts[k - 1], count);
            if count > 0 {
                assert_relative_eq!(p.means[k - 1], sum / count as f64, max_relative = 1e-12);
            } else {
                assert!(p.means[k - 1].is_nan());
            }
        }
    }

    #[test]
    fn test_centers_align_with_means() {
        let image = Array2::<f64>::ones((16, 16));
        let p = radial_profile(image.view(), 6).unwrap();
        let centers = p.centers();
        assert_eq!(centers.len(), p.means.len());
        assert_relative_eq!(centers[0], 0.5 * (p.edges[0] + p.edges[1]));
    }

    #[test]
    fn test_rejects_bad_input() {
        let image = Array2::<f64>::zeros((4, 5));
        assert!(matches!(
            radial_profile(image.view(), 10),
            Err(PowspecError::NotSquare { rows: 4, cols: 5 })
        ));
        let image = Array2::<f64>::zeros((8, 8));
        assert!(radial_profile(image.view(), 1).is_err());
    }
}
