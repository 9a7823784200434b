use std::{
    fs::File,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{PowspecError, Result},
    powspec::SurveyGeometry,
    preprocess::Preprocess,
};

pub const INDEX_PLACEHOLDER: &str = "{index}";

pub const DEFAULT_MAP_TEMPLATE: &str = "/tigress/jialiu/CMBL_maps_46cosmo/noisy/reconMaps_Om0.296_Ol0.704_w-1.000_si0.786/recon_filtered_Om0.296_Ol0.704_w-1.000_si0.786_r{index}.npy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportCfg {
    pub out_dir: PathBuf,
    pub covariance_png: String,
    pub correlation_png: String,
    pub mean_png: String,
    pub spectra_png: String,
    /// Appended to the plot titles.
    pub label: String,
}

impl Default for ReportCfg {
    fn default() -> Self {
        ReportCfg {
            out_dir: PathBuf::from("."),
            covariance_png: "fnoisycovar.png".to_string(),
            correlation_png: "fnoisycorrmat.png".to_string(),
            mean_png: "fnoisypowermean.png".to_string(),
            spectra_png: "fnoisypowerspecs.png".to_string(),
            label: "Noisy Maps (Filtered), Ungaussianized, Unsmoothed".to_string(),
        }
    }
}

impl ReportCfg {
    pub fn covariance_path(&self) -> PathBuf {
        self.out_dir.join(&self.covariance_png)
    }

    pub fn correlation_path(&self) -> PathBuf {
        self.out_dir.join(&self.correlation_png)
    }

    pub fn mean_path(&self) -> PathBuf {
        self.out_dir.join(&self.mean_png)
    }

    pub fn spectra_path(&self) -> PathBuf {
        self.out_dir.join(&self.spectra_png)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path of one member's map, `{index}` standing for the zero-padded index.
    pub map_template: String,
    pub index_width: usize,
    pub first_index: usize,
    /// Inclusive.
    pub last_index: usize,
    pub geometry: SurveyGeometry,
    /// Worker threads, all cores when absent.
    pub workers: Option<usize>,
    pub preprocess: Preprocess,
    pub report: ReportCfg,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            map_template: DEFAULT_MAP_TEMPLATE.to_string(),
            index_width: 4,
            first_index: 1,
            last_index: 999,
            geometry: SurveyGeometry::default(),
            workers: None,
            preprocess: Preprocess::default(),
            report: ReportCfg::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut cfgfile = File::open(path).map_err(|source| PowspecError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: PipelineConfig = serde_yaml::from_reader(&mut cfgfile)?;
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.map_template.contains(INDEX_PLACEHOLDER) {
            return Err(PowspecError::InvalidConfig(format!(
                "map template {:?} has no {} placeholder",
                self.map_template, INDEX_PLACEHOLDER
            )));
        }
        if self.first_index > self.last_index {
            return Err(PowspecError::InvalidConfig(format!(
                "empty index range {}..={}",
                self.first_index, self.last_index
            )));
        }
        if self.workers == Some(0) {
            return Err(PowspecError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        self.geometry.validate()?;
        self.preprocess.validate()?;
        Ok(())
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        self.first_index..=self.last_index
    }

    pub fn ensemble_size(&self) -> usize {
        self.last_index - self.first_index + 1
    }

    pub fn map_path(&self, index: usize) -> PathBuf {
        let padded = format!("{:0width$}", index, width = self.index_width);
        PathBuf::from(self.map_template.replace(INDEX_PLACEHOLDER, &padded))
    }
}
