//! Ensemble statistics: covariance, correlation and signal-to-noise.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::error::{PowspecError, Result};

/// Reciprocal condition number below which a covariance is not inverted.
pub const MIN_RCOND: f64 = 1e-12;

/// Sample covariance of the columns of `spectra` (rows are members), ddof = 1.
pub fn covariance(spectra: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (nmembers, _nbins) = spectra.dim();
    if nmembers < 2 {
        return Err(PowspecError::InsufficientEnsemble {
            required: 2,
            actual: nmembers,
        });
    }
    let mean = spectra.mean_axis(Axis(0)).ok_or(PowspecError::InsufficientEnsemble {
        required: 2,
        actual: nmembers,
    })?;
    let centered = &spectra - &mean;
    Ok(centered.t().dot(&centered) / (nmembers - 1) as f64)
}

/// Per-bin population standard deviation (ddof = 0), used for error bars.
pub fn spectrum_std(spectra: ArrayView2<f64>) -> Array1<f64> {
    spectra.std_axis(Axis(0), 0.0)
}

/// `R[i,j] = C[i,j] / (sigma_i sigma_j)` with `sigma = sqrt(diag(C))`.
///
/// The diagonal is exactly 1 and the result is exactly symmetric.
pub fn correlation_matrix(covar: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (rows, cols) = covar.dim();
    if rows != cols {
        return Err(PowspecError::NotSquare { rows, cols });
    }
    let sigma: Vec<f64> = covar.diag().iter().map(|&v| v.sqrt()).collect();
    if let Some(bin) = sigma.iter().position(|&s| !(s.is_finite() && s > 0.0)) {
        return Err(PowspecError::DegenerateVariance { bin });
    }
    let mut correl = Array2::<f64>::zeros((rows, cols));
    for i in 0..rows {
        correl[(i, i)] = 1.0;
        for j in i + 1..cols {
            let r = covar[(i, j)] / (sigma[i] * sigma[j]);
            correl[(i, j)] = r;
            correl[(j, i)] = r;
        }
    }
    Ok(correl)
}

#[derive(Debug, Clone)]
pub struct SignalToNoise {
    pub snr: f64,
    pub mean: Array1<f64>,
}

fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)])
}

/// Reciprocal condition number from the singular values, 0 when all vanish.
///
/// A matrix with a non-finite entry has no meaningful condition number and
/// gives NaN.
pub fn reciprocal_condition(covar: ArrayView2<f64>) -> f64 {
    if !covar.iter().all(|x| x.is_finite()) {
        return f64::NAN;
    }
    let sv = to_dmatrix(covar).singular_values();
    let max = sv.iter().cloned().fold(0.0, f64::max);
    let min = sv.iter().cloned().fold(f64::INFINITY, f64::min);
    if max > 0.0 && max.is_finite() {
        min / max
    } else {
        0.0
    }
}

/// Signal-to-noise of the ensemble mean, `sqrt(mean . C^-1 . mean^T)`.
///
/// Fails with [`PowspecError::SingularCovariance`] when the covariance
/// cannot be reliably inverted, e.g. when every member is identical or
/// there are fewer members than bins.
pub fn signal_to_noise(spectra: ArrayView2<f64>, covar: ArrayView2<f64>) -> Result<SignalToNoise> {
    let (nmembers, nbins) = spectra.dim();
    if covar.dim() != (nbins, nbins) {
        return Err(PowspecError::ShapeMismatch {
            expected: format!("{nbins}x{nbins}"),
            actual: format!("{}x{}", covar.nrows(), covar.ncols()),
        });
    }
    let mean = spectra.mean_axis(Axis(0)).ok_or(PowspecError::InsufficientEnsemble {
        required: 1,
        actual: nmembers,
    })?;
    if nmembers <= nbins {
        log::warn!(
            "{} members for {} bins: the covariance is rank deficient",
            nmembers,
            nbins
        );
    }

    let rcond = reciprocal_condition(covar);
    log::debug!("covariance reciprocal condition number {:e}", rcond);
    if !(rcond > MIN_RCOND) {
        return Err(PowspecError::SingularCovariance { rcond });
    }
    let chol = Cholesky::new(to_dmatrix(covar)).ok_or(PowspecError::SingularCovariance { rcond })?;

    let mu = DVector::from_iterator(nbins, mean.iter().cloned());
    let snr2 = mu.dot(&chol.solve(&mu));
    Ok(SignalToNoise {
        snr: snr2.sqrt(),
        mean,
    })
}
