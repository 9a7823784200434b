use anyhow::Context;

use clap::{Arg, Command};

use ndarray::Array2;

use ndarray_npy::write_npy;

use num::Complex;

use rand::{rngs::StdRng, SeedableRng};

use rand_distr::{Distribution, Normal};

use lensing_powspec::{
    fft::{fft2, ifft2},
    PipelineConfig,
};

/// Gaussian random field whose power falls as `k^slope`.
fn power_law_field(n: usize, slope: f64, sigma: f64, rng: &mut StdRng) -> anyhow::Result<Array2<f64>> {
    let normal = Normal::new(0.0, 1.0)?;
    let white = Array2::from_shape_fn((n, n), |_| normal.sample(rng));
    let mut modes = fft2(white.view());
    let freq = |i: usize| {
        let f = if i <= n / 2 { i as f64 } else { i as f64 - n as f64 };
        f / n as f64
    };
    for ((i, j), x) in modes.indexed_iter_mut() {
        let k = freq(i).hypot(freq(j));
        *x = if k > 0.0 {
            *x * k.powf(slope / 2.0)
        } else {
            Complex::new(0.0, 0.0)
        };
    }
    let field = ifft2(modes.view()).map(|x| x.re);
    let rms = (field.iter().map(|x| x * x).sum::<f64>() / (n * n) as f64).sqrt();
    Ok(if rms > 0.0 { field * (sigma / rms) } else { field })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("gen_synthetic_maps")
        .about("writes a synthetic ensemble of .npy maps for the configured template")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .takes_value(true)
                .value_name("yaml file")
                .required(false),
        )
        .arg(
            Arg::new("template")
                .short('t')
                .long("template")
                .takes_value(true)
                .value_name("path with {index}")
                .required(false)
                .help("overrides map_template of the configuration"),
        )
        .arg(
            Arg::new("slope")
                .long("slope")
                .takes_value(true)
                .value_name("power law index")
                .required(false)
                .allow_hyphen_values(true)
                .help("power spectrum slope, default -2"),
        )
        .arg(
            Arg::new("sigma")
                .long("sigma")
                .takes_value(true)
                .value_name("rms")
                .required(false)
                .help("rms of each map, default 0.02"),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .takes_value(true)
                .value_name("seed")
                .required(false),
        )
        .get_matches();

    let mut cfg = if let Some(fname) = matches.value_of("config") {
        PipelineConfig::from_yaml_file(fname)?
    } else {
        PipelineConfig::default()
    };
    if let Some(t) = matches.value_of("template") {
        cfg.map_template = t.to_string();
    }
    cfg.validate()?;

    let slope = match matches.value_of("slope") {
        Some(s) => s.parse::<f64>().with_context(|| format!("bad slope {s:?}"))?,
        None => -2.0,
    };
    let sigma = match matches.value_of("sigma") {
        Some(s) => s.parse::<f64>().with_context(|| format!("bad sigma {s:?}"))?,
        None => 0.02,
    };
    let seed = match matches.value_of("seed") {
        Some(s) => s.parse::<u64>().with_context(|| format!("bad seed {s:?}"))?,
        None => 0,
    };

    let n = cfg.geometry.size_pix;
    for index in cfg.indices() {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
        let map = power_law_field(n, slope, sigma, &mut rng)?;
        let path = cfg.map_path(index);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        write_npy(&path, &map).with_context(|| format!("writing {}", path.display()))?;
        log::debug!("wrote {}", path.display());
    }
    log::info!(
        "wrote {} maps of {}x{} following {}",
        cfg.ensemble_size(),
        n,
        n,
        cfg.map_template
    );
    Ok(())
}
