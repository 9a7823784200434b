//! Optional map conditioning applied before the Fourier transform.

use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut1, Axis};

use serde::{Deserialize, Serialize};

use statrs::function::erf::erf_inv;

use crate::error::{PowspecError, Result};

const SMOOTHING_TRUNCATE: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianizeOpts {
    /// Give pixels sharing the same value the mean of their Gaussian values.
    pub avg_repeats: bool,
    /// Width of the target Gaussian; estimated from the map when absent.
    pub sigma: Option<f64>,
    /// Estimate the width as `sqrt(log1p(var))` instead of the standard deviation.
    pub assume_lognormal: bool,
}

impl Default for GaussianizeOpts {
    fn default() -> Self {
        GaussianizeOpts {
            avg_repeats: true,
            sigma: None,
            assume_lognormal: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocess {
    pub smoothing_sigma_pix: Option<f64>,
    pub gaussianize: Option<GaussianizeOpts>,
}

impl Preprocess {
    pub fn validate(&self) -> Result<()> {
        if let Some(s) = self.smoothing_sigma_pix {
            if !(s.is_finite() && s > 0.0) {
                return Err(PowspecError::InvalidConfig(format!(
                    "smoothing sigma must be positive, got {s}"
                )));
            }
        }
        if let Some(GaussianizeOpts { sigma: Some(s), .. }) = self.gaussianize {
            if !(s.is_finite() && s > 0.0) {
                return Err(PowspecError::InvalidConfig(format!(
                    "gaussianization sigma must be positive, got {s}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_identity(&self) -> bool {
        self.smoothing_sigma_pix.is_none() && self.gaussianize.is_none()
    }

    /// Smooths, then Gaussianizes, whichever is enabled.
    pub fn apply(&self, map: Array2<f64>) -> Array2<f64> {
        let map = match self.smoothing_sigma_pix {
            Some(sigma) => gaussian_smooth(map.view(), sigma),
            None => map,
        };
        match &self.gaussianize {
            Some(opts) => gaussianize(map.view(), opts),
            None => map,
        }
    }
}

/// Normalized Gaussian kernel of radius `round(4 sigma)`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (SMOOTHING_TRUNCATE * sigma + 0.5) as isize;
    let w: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let norm = w.iter().sum::<f64>();
    w.into_iter().map(|x| x / norm).collect()
}

// d c b a | a b c d | d c b a
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - m - 1) as usize
    } else {
        m as usize
    }
}

fn convolve_lane(mut lane: ArrayViewMut1<f64>, kernel: &[f64]) {
    let n = lane.len();
    let radius = (kernel.len() / 2) as isize;
    let src: Array1<f64> = lane.to_owned();
    for (i, out) in lane.iter_mut().enumerate() {
        *out = kernel
            .iter()
            .enumerate()
            .map(|(k, &w)| w * src[reflect_index(i as isize + k as isize - radius, n)])
            .sum();
    }
}

/// Separable Gaussian filter with reflecting boundaries.
pub fn gaussian_smooth(map: ArrayView2<f64>, sigma_pix: f64) -> Array2<f64> {
    let kernel = gaussian_kernel(sigma_pix);
    let mut out = map.to_owned();
    for axis in [Axis(1), Axis(0)] {
        for lane in out.lanes_mut(axis) {
            convolve_lane(lane, &kernel);
        }
    }
    out
}

/// Maps pixel values by rank onto a Gaussian distribution.
///
/// The `k`-th smallest of `n` pixels receives the Gaussian quantile of
/// `(k + 0.5) / n`, so the output keeps the ordering of the input.
pub fn gaussianize(map: ArrayView2<f64>, opts: &GaussianizeOpts) -> Array2<f64> {
    let values: Vec<f64> = map.iter().cloned().collect();
    let n = values.len();
    if n == 0 {
        return map.to_owned();
    }

    let sigma = opts.sigma.unwrap_or_else(|| {
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        if opts.assume_lognormal {
            var.ln_1p().sqrt()
        } else {
            var.sqrt()
        }
    });

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let step = 1.0 / n as f64;
    let mut gauss = vec![0.0; n];
    for (rank, &idx) in order.iter().enumerate() {
        let q = 2.0 * (rank as f64 + 0.5) * step - 1.0;
        gauss[idx] = 2_f64.sqrt() * sigma * erf_inv(q);
    }

    if opts.avg_repeats {
        let mut start = 0;
        while start < n {
            let v = values[order[start]];
            let end = start + order[start..].iter().take_while(|&&i| values[i] == v).count();
            if end - start > 1 {
                let group = &order[start..end];
                let mean = group.iter().map(|&i| gauss[i]).sum::<f64>() / group.len() as f64;
                group.iter().for_each(|&i| gauss[i] = mean);
            }
            start = end.max(start + 1);
        }
    }

    Array2::from_shape_vec(map.raw_dim(), gauss).unwrap_or_else(|_| map.to_owned())
}
