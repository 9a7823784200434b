//! Per-member power spectra and their parallel collection into an ensemble.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use ndarray::{Array1, Array2, ArrayView2};

use ndarray_npy::{read_npy, ReadNpyError};

use rayon::prelude::*;

use crate::{
    config::PipelineConfig,
    error::{PowspecError, Result},
    fft::power_spectrum_2d,
    powspec::{angular_power_spectrum, AngularPowerSpectrum},
};

/// Where the ensemble maps come from.
pub trait MapSource: Sync {
    fn load(&self, index: usize) -> Result<Array2<f64>>;
}

/// Reads one `.npy` file per member, named by the configured template.
pub struct NpyMapSource {
    cfg: PipelineConfig,
}

impl NpyMapSource {
    pub fn new(cfg: &PipelineConfig) -> Self {
        NpyMapSource { cfg: cfg.clone() }
    }

    pub fn path(&self, index: usize) -> PathBuf {
        self.cfg.map_path(index)
    }
}

/// Reads a 2D `.npy` array of `f64`, widening `f32` data.
pub fn read_map(path: &Path) -> Result<Array2<f64>> {
    match read_npy::<_, Array2<f64>>(path) {
        Ok(a) => Ok(a),
        Err(ReadNpyError::WrongDescriptor(_)) => {
            let a: Array2<f32> = read_npy(path).map_err(|source| PowspecError::Npy {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(a.mapv(f64::from))
        }
        Err(source) => Err(PowspecError::Npy {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl MapSource for NpyMapSource {
    fn load(&self, index: usize) -> Result<Array2<f64>> {
        let path = self.path(index);
        log::trace!("loading member {} from {}", index, path.display());
        read_map(&path)
    }
}

/// Angular power spectrum of a single ensemble member.
pub fn member_power_spectrum(
    map: ArrayView2<f64>,
    cfg: &PipelineConfig,
) -> Result<AngularPowerSpectrum> {
    let n = cfg.geometry.size_pix;
    if map.dim() != (n, n) {
        return Err(PowspecError::ShapeMismatch {
            expected: format!("{n}x{n}"),
            actual: format!("{}x{}", map.nrows(), map.ncols()),
        });
    }
    let psd2d = if cfg.preprocess.is_identity() {
        power_spectrum_2d(map)
    } else {
        let conditioned = cfg.preprocess.apply(map.to_owned());
        power_spectrum_2d(conditioned.view())
    };
    angular_power_spectrum(psd2d.view(), &cfg.geometry)
}

/// All members' spectra on their shared multipole grid.
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub indices: Vec<usize>,
    pub ells: Array1<f64>,
    /// One row per member, in `indices` order.
    pub spectra: Array2<f64>,
}

impl Ensemble {
    /// Stacks member spectra, which must all share the first member's grid.
    pub fn from_members(members: Vec<(usize, AngularPowerSpectrum)>) -> Result<Self> {
        let (first_index, first) = members.first().ok_or(PowspecError::InsufficientEnsemble {
            required: 1,
            actual: 0,
        })?;
        if first.is_empty() {
            return Err(PowspecError::EmptySpectrum { index: *first_index });
        }
        let ells = first.ells.clone();
        let nbins = ells.len();

        for (index, s) in &members {
            if s.is_empty() {
                return Err(PowspecError::EmptySpectrum { index: *index });
            }
            if s.ells.len() != nbins || s.ells.iter().zip(ells.iter()).any(|(a, b)| a != b) {
                return Err(PowspecError::GridMismatch { index: *index });
            }
        }

        let mut spectra = Array2::<f64>::zeros((members.len(), nbins));
        for (mut row, (_, s)) in spectra.rows_mut().into_iter().zip(members.iter()) {
            row.iter_mut().zip(s.cls.iter()).for_each(|(x, &c)| *x = c);
        }
        Ok(Ensemble {
            indices: members.into_iter().map(|(i, _)| i).collect(),
            ells: Array1::from(ells),
            spectra,
        })
    }

    pub fn n_members(&self) -> usize {
        self.spectra.nrows()
    }

    pub fn n_bins(&self) -> usize {
        self.spectra.ncols()
    }
}

/// Computes every member's spectrum on a worker pool and stacks them.
///
/// Results keep the order of `cfg.indices()` whatever order the workers
/// finish in. The first failing member aborts the collection.
pub fn collect_ensemble<S: MapSource>(source: &S, cfg: &PipelineConfig) -> Result<Ensemble> {
    cfg.validate()?;

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = cfg.workers {
        builder = builder.num_threads(n);
    }
    let pool = builder.build()?;

    let total = cfg.ensemble_size();
    let done = AtomicUsize::new(0);
    let step = (total / 10).max(1);
    log::info!(
        "computing power spectra for {} members on {} workers",
        total,
        pool.current_num_threads()
    );

    let indices: Vec<usize> = cfg.indices().collect();
    let members = pool.install(|| {
        indices
            .par_iter()
            .map(|&index| {
                let spectrum = source
                    .load(index)
                    .and_then(|map| member_power_spectrum(map.view(), cfg))
                    .map_err(|e| e.for_member(index))?;
                if spectrum.is_empty() {
                    return Err(PowspecError::EmptySpectrum { index });
                }
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                if finished % step == 0 || finished == total {
                    log::info!("{}/{} members done", finished, total);
                }
                Ok((index, spectrum))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let ensemble = Ensemble::from_members(members)?;
    log::info!(
        "ensemble of {} members on {} multipole bins, l = {:.1}..{:.1}",
        ensemble.n_members(),
        ensemble.n_bins(),
        ensemble.ells[0],
        ensemble.ells[ensemble.n_bins() - 1]
    );
    Ok(ensemble)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        powspec::SurveyGeometry,
        preprocess::{gaussian_smooth, gaussianize, GaussianizeOpts, Preprocess},
    };
    use ndarray_npy::write_npy;
    use std::collections::HashMap;

    struct MemorySource(HashMap<usize, Array2<f64>>);

    impl MapSource for MemorySource {
        fn load(&self, index: usize) -> Result<Array2<f64>> {
            self.0.get(&index).cloned().ok_or(PowspecError::InvalidConfig(format!(
                "no map {index}"
            )))
        }
    }

    fn small_cfg(last_index: usize) -> PipelineConfig {
        PipelineConfig {
            map_template: "unused_{index}.npy".to_string(),
            first_index: 1,
            last_index,
            geometry: SurveyGeometry {
                area_deg2: 12.25,
                size_pix: 16,
                num_bins: 8,
            },
            workers: Some(2),
            ..Default::default()
        }
    }

    fn wave(n: usize, k: usize, amp: f64) -> Array2<f64> {
        Array2::from_shape_fn((n, n), |(i, j)| {
            amp * (2.0 * std::f64::consts::PI * (k * (i + j)) as f64 / n as f64).cos()
                + 0.01 * ((i * 7 + j * 3) % 5) as f64
        })
    }

    #[test]
    fn test_collect_keeps_index_order() {
        let maps: HashMap<_, _> = (1..=6).map(|i| (i, wave(16, 2, i as f64))).collect();
        let cfg = small_cfg(6);
        let ensemble = collect_ensemble(&MemorySource(maps.clone()), &cfg).unwrap();
        assert_eq!(ensemble.indices, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(ensemble.n_members(), 6);
        for (row, i) in ensemble.spectra.rows().into_iter().zip(1..=6) {
            let direct = member_power_spectrum(maps[&i].view(), &cfg).unwrap();
            assert_eq!(row.to_vec(), direct.cls);
        }
    }

    #[test]
    fn test_missing_member_aborts() {
        let maps: HashMap<_, _> = (1..=4)
            .filter(|&i| i != 3)
            .map(|i| (i, wave(16, 1, 1.0)))
            .collect();
        let err = collect_ensemble(&MemorySource(maps), &small_cfg(4)).unwrap_err();
        assert!(matches!(err, PowspecError::Member { index: 3, .. }));
    }

    #[test]
    fn test_wrong_size_member_is_reported() {
        let mut maps: HashMap<_, _> = (1..=3).map(|i| (i, wave(16, 1, 1.0))).collect();
        maps.insert(2, wave(12, 1, 1.0));
        let err = collect_ensemble(&MemorySource(maps), &small_cfg(3)).unwrap_err();
        match err {
            PowspecError::Member { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(*source, PowspecError::ShapeMismatch { .. }));
            }
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn test_blank_member_is_empty_spectrum() {
        let mut maps: HashMap<_, _> = (1..=2).map(|i| (i, wave(16, 1, 1.0))).collect();
        maps.insert(2, Array2::zeros((16, 16)));
        let err = collect_ensemble(&MemorySource(maps), &small_cfg(2)).unwrap_err();
        assert!(matches!(err, PowspecError::EmptySpectrum { index: 2 }));
    }

    #[test]
    fn test_preprocessing_smooths_then_gaussianizes() {
        let opts = GaussianizeOpts::default();
        let cfg = PipelineConfig {
            preprocess: Preprocess {
                smoothing_sigma_pix: Some(1.0),
                gaussianize: Some(opts.clone()),
            },
            ..small_cfg(1)
        };
        let base = wave(16, 2, 1.0);
        let map = Array2::from_shape_fn((16, 16), |(i, j)| {
            base[(i, j)].exp() + 0.1 * ((i * 13 + j * 29) % 11) as f64
        });

        let got = member_power_spectrum(map.view(), &cfg).unwrap();

        let smoothed = gaussian_smooth(map.view(), 1.0);
        let conditioned = gaussianize(smoothed.view(), &opts);
        let psd2d = power_spectrum_2d(conditioned.view());
        let expected = angular_power_spectrum(psd2d.view(), &cfg.geometry).unwrap();
        assert_eq!(got, expected);

        let swapped = gaussian_smooth(gaussianize(map.view(), &opts).view(), 1.0);
        let psd2d = power_spectrum_2d(swapped.view());
        let other = angular_power_spectrum(psd2d.view(), &cfg.geometry).unwrap();
        assert_ne!(got.cls, other.cls);

        let raw = member_power_spectrum(map.view(), &small_cfg(1)).unwrap();
        assert_ne!(got.cls, raw.cls);
    }

    #[test]
    fn test_grid_mismatch_detected() {
        let a = AngularPowerSpectrum {
            ells: vec![1.0, 2.0],
            cls: vec![1.0, 1.0],
        };
        let b = AngularPowerSpectrum {
            ells: vec![2.0],
            cls: vec![1.0],
        };
        let err = Ensemble::from_members(vec![(1, a), (2, b)]).unwrap_err();
        assert!(matches!(err, PowspecError::GridMismatch { index: 2 }));
    }

    #[test]
    fn test_npy_source_reads_f64_and_f32() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            map_template: dir
                .path()
                .join("map_{index}.npy")
                .to_string_lossy()
                .into_owned(),
            ..small_cfg(2)
        };
        let m64 = wave(16, 1, 1.0);
        write_npy(cfg.map_path(1), &m64).unwrap();
        write_npy(cfg.map_path(2), &m64.mapv(|x| x as f32)).unwrap();

        let source = NpyMapSource::new(&cfg);
        assert_eq!(source.path(1), dir.path().join("map_0001.npy"));
        assert_eq!(source.load(1).unwrap(), m64);
        let widened = source.load(2).unwrap();
        for (a, b) in widened.iter().zip(m64.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!(matches!(source.load(3), Err(PowspecError::Npy { .. })));
    }
}
