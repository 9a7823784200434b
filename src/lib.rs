pub mod config;
pub mod ensemble;
pub mod error;
pub mod fft;
pub mod powspec;
pub mod preprocess;
pub mod radial;
pub mod report;
pub mod stats;

pub use crate::{
    config::{PipelineConfig, ReportCfg},
    ensemble::{collect_ensemble, member_power_spectrum, Ensemble, MapSource, NpyMapSource},
    error::{PowspecError, Result},
    powspec::{angular_power_spectrum, AngularPowerSpectrum, SurveyGeometry},
    radial::{radial_profile, RadialProfile},
    stats::{correlation_matrix, covariance, signal_to_noise, spectrum_std, SignalToNoise},
};
