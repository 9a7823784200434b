use std::f64::consts::PI;

use ndarray::ArrayView2;

use serde::{Deserialize, Serialize};

use crate::{
    error::{PowspecError, Result},
    radial::radial_profile,
};

/// Flat-sky geometry of the reconstruction maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyGeometry {
    /// Map area in square degrees.
    pub area_deg2: f64,
    /// Side of the square map in pixels.
    pub size_pix: usize,
    pub num_bins: usize,
}

impl Default for SurveyGeometry {
    fn default() -> Self {
        SurveyGeometry {
            area_deg2: 12.25,
            size_pix: 37,
            num_bins: 50,
        }
    }
}

impl SurveyGeometry {
    pub fn validate(&self) -> Result<()> {
        if !(self.area_deg2.is_finite() && self.area_deg2 > 0.0) {
            return Err(PowspecError::InvalidConfig(format!(
                "survey area must be positive, got {}",
                self.area_deg2
            )));
        }
        if self.size_pix < 3 {
            return Err(PowspecError::InvalidConfig(format!(
                "map size must be at least 3 pixels, got {}",
                self.size_pix
            )));
        }
        if self.num_bins < 2 {
            return Err(PowspecError::InvalidConfig(format!(
                "need at least 2 radial bins, got {}",
                self.num_bins
            )));
        }
        Ok(())
    }

    /// Multipole per pixel of radial frequency, `360 / sqrt(area)`.
    pub fn ell_per_pixel(&self) -> f64 {
        360.0 / self.area_deg2.sqrt()
    }

    /// Flat-sky normalization `(2 pi sqrt(area) / 360)^2 / size^4`.
    pub fn norm(&self) -> f64 {
        let side_rad = 2.0 * PI * self.area_deg2.sqrt() / 360.0;
        side_rad.powi(2) / (self.size_pix as f64).powi(4)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AngularPowerSpectrum {
    pub ells: Vec<f64>,
    /// `l(l+1) C_l / 2 pi` per multipole bin.
    pub cls: Vec<f64>,
}

impl AngularPowerSpectrum {
    pub fn len(&self) -> usize {
        self.ells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ells.is_empty()
    }
}

/// What [`trim_undersampled`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trim {
    /// Every bin was finite.
    Untouched,
    /// The leading `n` bins, up to the last non-finite one, were dropped.
    Leading(usize),
    /// No finite bin survives.
    Everything,
}

/// Drops the low-l bins that the pixel grid cannot sample.
///
/// Near the image centre the log-spaced radial bins are narrower than the
/// pixel spacing, so some of them contain no pixel and come out non-finite.
/// Everything up to and including the last non-finite bin is discarded.
pub fn trim_undersampled(spectrum: &mut AngularPowerSpectrum) -> Trim {
    let last_bad = spectrum.cls.iter().rposition(|x| !x.is_finite());
    match last_bad {
        None => Trim::Untouched,
        Some(i) if i + 1 == spectrum.cls.len() => {
            spectrum.ells.clear();
            spectrum.cls.clear();
            Trim::Everything
        }
        Some(i) => {
            spectrum.ells.drain(..=i);
            spectrum.cls.drain(..=i);
            Trim::Leading(i + 1)
        }
    }
}

/// Normalized angular power spectrum of a centred 2D power spectrum.
///
/// A 2D spectrum without any power yields an empty result.
pub fn angular_power_spectrum(
    psd2d: ArrayView2<f64>,
    geometry: &SurveyGeometry,
) -> Result<AngularPowerSpectrum> {
    geometry.validate()?;
    let (rows, cols) = psd2d.dim();
    if rows != geometry.size_pix || cols != geometry.size_pix {
        return Err(PowspecError::ShapeMismatch {
            expected: format!("{0}x{0}", geometry.size_pix),
            actual: format!("{rows}x{cols}"),
        });
    }
    if psd2d.iter().all(|&x| x == 0.0) {
        log::debug!("2D power spectrum is identically zero, nothing to bin");
        return Ok(AngularPowerSpectrum::default());
    }

    let profile = radial_profile(psd2d, geometry.num_bins)?;
    let ell_per_pixel = geometry.ell_per_pixel();
    let norm = geometry.norm();

    let ells: Vec<f64> = profile
        .centers()
        .into_iter()
        .map(|r| r * ell_per_pixel)
        .collect();
    let cls = ells
        .iter()
        .zip(profile.means.iter())
        .map(|(&l, &p)| l * (l + 1.0) / (2.0 * PI) * norm * p)
        .collect();

    let mut spectrum = AngularPowerSpectrum { ells, cls };
    let trim = trim_undersampled(&mut spectrum);
    log::trace!("trimmed undersampled bins: {:?}", trim);
    Ok(spectrum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radial::log_bin_edges;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_default_geometry() {
        let g = SurveyGeometry::default();
        assert_eq!(g.area_deg2, 12.25);
        assert_eq!(g.size_pix, 37);
        assert_eq!(g.num_bins, 50);
        assert_relative_eq!(g.ell_per_pixel(), 360.0 / 3.5);
        let expected = (2.0 * PI * 3.5 / 360.0).powi(2) / 37_f64.powi(4);
        assert_relative_eq!(g.norm(), expected);
    }

    #[test]
    fn test_trim_policy() {
        let mut s = AngularPowerSpectrum {
            ells: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            cls: vec![f64::NAN, 1.0, f64::NAN, 2.0, 3.0],
        };
        assert_eq!(trim_undersampled(&mut s), Trim::Leading(3));
        assert_eq!(s.ells, vec![4.0, 5.0]);
        assert_eq!(s.cls, vec![2.0, 3.0]);

        let mut clean = AngularPowerSpectrum {
            ells: vec![1.0, 2.0],
            cls: vec![0.5, 0.25],
        };
        assert_eq!(trim_undersampled(&mut clean), Trim::Untouched);
        assert_eq!(clean.len(), 2);

        let mut dead = AngularPowerSpectrum {
            ells: vec![1.0, 2.0],
            cls: vec![1.0, f64::NAN],
        };
        assert_eq!(trim_undersampled(&mut dead), Trim::Everything);
        assert!(dead.is_empty());
    }

    #[test]
    fn test_zero_spectrum_is_empty() {
        let psd = Array2::<f64>::zeros((37, 37));
        let s = angular_power_spectrum(psd.view(), &SurveyGeometry::default()).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn test_flat_spectrum_normalization() {
        let g = SurveyGeometry::default();
        let psd = Array2::<f64>::ones((37, 37));
        let s = angular_power_spectrum(psd.view(), &g).unwrap();
        assert!(!s.is_empty());
        assert!(s.cls.iter().all(|x| x.is_finite()));

        let edges = log_bin_edges(37, 50);
        let last_l = (edges[49] + 0.5 * (edges[50] - edges[49])) * g.ell_per_pixel();
        assert_relative_eq!(*s.ells.last().unwrap(), last_l, max_relative = 1e-12);
        let expected = last_l * (last_l + 1.0) / (2.0 * PI) * g.norm();
        assert_relative_eq!(*s.cls.last().unwrap(), expected, max_relative = 1e-12);
        assert!(s.ells.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_rejects_wrong_size() {
        let psd = Array2::<f64>::ones((16, 16));
        assert!(matches!(
            angular_power_spectrum(psd.view(), &SurveyGeometry::default()),
            Err(PowspecError::ShapeMismatch { .. })
        ));
    }
}
