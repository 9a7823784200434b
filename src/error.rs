use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning an ensemble of maps into summary statistics.
#[derive(Error, Debug)]
pub enum PowspecError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read npy array {path}: {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("expected a square array, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("member {index} has an ell grid different from the first member")]
    GridMismatch { index: usize },

    #[error("member {index} has no usable multipole bins after trimming")]
    EmptySpectrum { index: usize },

    #[error("member {index}: {source}")]
    Member {
        index: usize,
        #[source]
        source: Box<PowspecError>,
    },

    #[error("need at least {required} ensemble members, got {actual}")]
    InsufficientEnsemble { required: usize, actual: usize },

    #[error("bin {bin} has non-positive variance")]
    DegenerateVariance { bin: usize },

    #[error("covariance matrix is singular or ill-conditioned (rcond = {rcond:e})")]
    SingularCovariance { rcond: f64 },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("plotting failed: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, PowspecError>;

impl PowspecError {
    /// Attach the ensemble member index to an error raised while processing it.
    pub fn for_member(self, index: usize) -> Self {
        match self {
            e @ PowspecError::Member { .. } => e,
            PowspecError::EmptySpectrum { .. } => PowspecError::EmptySpectrum { index },
            e => PowspecError::Member {
                index,
                source: Box::new(e),
            },
        }
    }
}
