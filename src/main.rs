use std::io::{stdout, Write};

use anyhow::Context;

use clap::{Arg, Command};

use lensing_powspec::{
    collect_ensemble, correlation_matrix, covariance, report, signal_to_noise, spectrum_std,
    NpyMapSource, PipelineConfig,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("lensing_powspec")
        .about("covariance, correlation and signal-to-noise of an ensemble of convergence maps")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .takes_value(true)
                .value_name("yaml file")
                .required(false)
                .help("pipeline configuration, built-in defaults when omitted"),
        )
        .arg(
            Arg::new("out_dir")
                .short('o')
                .long("out-dir")
                .takes_value(true)
                .value_name("dir")
                .required(false)
                .help("directory for the png files"),
        )
        .arg(
            Arg::new("workers")
                .short('j')
                .long("workers")
                .takes_value(true)
                .value_name("n")
                .required(false)
                .help("number of worker threads"),
        )
        .arg(
            Arg::new("dump_config")
                .long("dump-config")
                .takes_value(false)
                .help("print the effective configuration as yaml and exit"),
        )
        .get_matches();

    let mut cfg = if let Some(fname) = matches.value_of("config") {
        PipelineConfig::from_yaml_file(fname)
            .with_context(|| format!("loading configuration {fname}"))?
    } else {
        PipelineConfig::default()
    };
    if let Some(dir) = matches.value_of("out_dir") {
        cfg.report.out_dir = dir.into();
    }
    if let Some(n) = matches.value_of("workers") {
        cfg.workers = Some(n.parse().with_context(|| format!("bad worker count {n:?}"))?);
    }

    if matches.is_present("dump_config") {
        print!("{}", cfg.to_yaml()?);
        return Ok(());
    }
    cfg.validate()?;

    let source = NpyMapSource::new(&cfg);
    let ensemble = collect_ensemble(&source, &cfg)?;

    let mut out = stdout();
    let covar = covariance(ensemble.spectra.view())?;
    report::write_covariance(&mut out, covar.view())?;
    report::plot_covariance(&cfg.report, covar.view())?;

    let correl = correlation_matrix(covar.view())?;
    report::write_correlation(&mut out, correl.view())?;
    report::plot_correlation(&cfg.report, correl.view())?;

    let s2r = signal_to_noise(ensemble.spectra.view(), covar.view())?;
    report::write_snr(&mut out, &s2r)?;
    out.flush()?;

    let std_p = spectrum_std(ensemble.spectra.view());
    report::plot_mean_spectrum(&cfg.report, ensemble.ells.view(), s2r.mean.view(), std_p.view())?;
    report::plot_all_spectra(&cfg.report, ensemble.ells.view(), ensemble.spectra.view())?;

    Ok(())
}
