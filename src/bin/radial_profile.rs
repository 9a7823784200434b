use anyhow::Context;

use clap::{Arg, Command};

use lensing_powspec::{
    angular_power_spectrum, ensemble::read_map, fft::power_spectrum_2d, radial_profile,
    SurveyGeometry,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let matches = Command::new("radial_profile")
        .about("radial profile and angular power spectrum of one map")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .takes_value(true)
                .value_name("npy file")
                .required(true),
        )
        .arg(
            Arg::new("area")
                .short('a')
                .long("area")
                .takes_value(true)
                .value_name("deg^2")
                .required(false)
                .help("survey area in square degrees"),
        )
        .arg(
            Arg::new("bins")
                .short('b')
                .long("bins")
                .takes_value(true)
                .value_name("num of bins")
                .required(false),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .takes_value(false)
                .help("print radius, mean power and pixel count instead of l and C_l"),
        )
        .get_matches();

    let fname = matches.value_of("input").unwrap_or_default();
    let map = read_map(fname.as_ref()).with_context(|| format!("reading {fname}"))?;

    let mut geometry = SurveyGeometry {
        size_pix: map.nrows(),
        ..Default::default()
    };
    if let Some(a) = matches.value_of("area") {
        geometry.area_deg2 = a.parse().with_context(|| format!("bad area {a:?}"))?;
    }
    if let Some(b) = matches.value_of("bins") {
        geometry.num_bins = b.parse().with_context(|| format!("bad bin count {b:?}"))?;
    }

    let psd2d = power_spectrum_2d(map.view());
    if matches.is_present("raw") {
        let profile = radial_profile(psd2d.view(), geometry.num_bins)?;
        for ((r, m), c) in profile
            .centers()
            .iter()
            .zip(profile.means.iter())
            .zip(profile.counts.iter())
        {
            println!("{} {} {}", r, m, c);
        }
    } else {
        let spectrum = angular_power_spectrum(psd2d.view(), &geometry)?;
        for (l, c) in spectrum.ells.iter().zip(spectrum.cls.iter()) {
            println!("{} {}", l, c);
        }
    }
    Ok(())
}
