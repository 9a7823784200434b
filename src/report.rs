//! Printed summary and PNG figures of the ensemble statistics.

use std::{error::Error, fs, io::Write, path::Path};

use ndarray::{ArrayView1, ArrayView2};

use plotters::prelude::*;

use crate::{
    config::ReportCfg,
    error::{PowspecError, Result},
    stats::SignalToNoise,
};

const HEATMAP_SIZE: (u32, u32) = (900, 760);
const SPECTRUM_SIZE: (u32, u32) = (1024, 768);
const ELL_RANGE: (f64, f64) = (1e2, 1e4);
const CL_DESC: &str = "l(l+1)C_l/2pi";

type PlotResult = std::result::Result<(), Box<dyn Error>>;

fn plot_err(e: Box<dyn Error>) -> PowspecError {
    PowspecError::Plot(e.to_string())
}

/// Rows as `[a b c]`, one per line, like numpy prints a matrix.
pub fn format_matrix(m: ArrayView2<f64>) -> String {
    m.rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let body = row
                .iter()
                .map(|x| format!("{x:>12.5e}"))
                .collect::<Vec<_>>()
                .join(" ");
            let open = if i == 0 { "[[" } else { " [" };
            let close = if i + 1 == m.nrows() { "]]" } else { "]" };
            format!("{open}{body}{close}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn write_covariance<W: Write>(out: &mut W, covar: ArrayView2<f64>) -> std::io::Result<()> {
    writeln!(out, "\nCovariance Matrix: ")?;
    writeln!(out, "{}", format_matrix(covar))
}

pub fn write_correlation<W: Write>(out: &mut W, correl: ArrayView2<f64>) -> std::io::Result<()> {
    writeln!(out, "\nCorrelation Matrix: ")?;
    writeln!(out, "{}", format_matrix(correl))
}

pub fn write_snr<W: Write>(out: &mut W, snr: &SignalToNoise) -> std::io::Result<()> {
    writeln!(out, "\nSignal-to-Noise ratio: ")?;
    writeln!(out, "{}", snr.snr)
}

/// matplotlib's "hot": black through red and yellow to white.
pub fn hot_colormap(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let channel = |x: f64| (x.clamp(0.0, 1.0) * 255.0).round() as u8;
    RGBColor(
        channel(3.0 * t),
        channel(3.0 * t - 1.0),
        channel(3.0 * t - 2.0),
    )
}

fn finite_range<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> Option<(f64, f64)> {
    values
        .into_iter()
        .filter(|x| x.is_finite())
        .fold(None, |acc, &x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        })
}

fn positive_range<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> Option<(f64, f64)> {
    finite_range(values.into_iter().filter(|&&x| x > 0.0))
}

fn draw_heatmap(path: &Path, matrix: ArrayView2<f64>, title: &str) -> PlotResult {
    let n = matrix.nrows();
    let (lo, hi) = finite_range(matrix.iter()).unwrap_or((0.0, 1.0));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let root = BitMapBackend::new(path, HEATMAP_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally((HEATMAP_SIZE.0 - 140) as i32);

    let mut chart = ChartBuilder::on(&left)
        .caption(title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0..n, 0..n)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .y_label_formatter(&|y| format!("{}", n.saturating_sub(*y + 1)))
        .draw()?;

    // row 0 on top, as an image is shown
    chart.draw_series(matrix.indexed_iter().map(|((i, j), &v)| {
        Rectangle::new(
            [(j, n - 1 - i), (j + 1, n - i)],
            hot_colormap((v - lo) / span).filled(),
        )
    }))?;

    let mut bar = ChartBuilder::on(&right)
        .margin_top(50)
        .margin_bottom(40)
        .margin_right(10)
        .y_label_area_size(80)
        .build_cartesian_2d(0.0..1.0, lo..(lo + span))?;
    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_label_formatter(&|y| format!("{y:.2e}"))
        .draw()?;
    let steps = 128;
    bar.draw_series((0..steps).map(|k| {
        let y0 = lo + span * k as f64 / steps as f64;
        let y1 = lo + span * (k + 1) as f64 / steps as f64;
        Rectangle::new(
            [(0.0, y0), (1.0, y1)],
            hot_colormap((k as f64 + 0.5) / steps as f64).filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

fn draw_mean_spectrum(
    path: &Path,
    ells: ArrayView1<f64>,
    mean: ArrayView1<f64>,
    std: ArrayView1<f64>,
    title: &str,
) -> PlotResult {
    let in_range: Vec<(f64, f64, f64)> = ells
        .iter()
        .zip(mean.iter().zip(std.iter()))
        .filter(|(&l, _)| l >= ELL_RANGE.0 && l <= ELL_RANGE.1)
        .map(|(&l, (&m, &s))| (l, m, s))
        .collect();
    let (ymin, ymax) = positive_range(
        in_range
            .iter()
            .flat_map(|(_, m, s)| [*m, m - s, m + s])
            .collect::<Vec<_>>()
            .iter(),
    )
    .unwrap_or((1e-10, 1.0));
    let floor = ymin * 0.5;
    let clip = |y: f64| if y > 0.0 { y } else { floor };

    let root = BitMapBackend::new(path, SPECTRUM_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(90)
        .build_cartesian_2d(
            (ELL_RANGE.0..ELL_RANGE.1).log_scale(),
            (floor..ymax * 2.0).log_scale(),
        )?;
    chart
        .configure_mesh()
        .x_desc("l")
        .y_desc(CL_DESC)
        .y_label_formatter(&|y| format!("{y:.1e}"))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    chart.draw_series(LineSeries::new(
        in_range.iter().map(|&(l, m, _)| (l, clip(m))),
        BLUE.stroke_width(2),
    ))?;
    chart.draw_series(in_range.iter().map(|&(l, m, s)| {
        ErrorBar::new_vertical(l, clip(m - s), clip(m), clip(m + s), BLUE.filled(), 6)
    }))?;

    root.present()?;
    Ok(())
}

fn draw_all_spectra(
    path: &Path,
    ells: ArrayView1<f64>,
    spectra: ArrayView2<f64>,
    title: &str,
) -> PlotResult {
    let (xmin, xmax) = positive_range(ells.iter()).unwrap_or(ELL_RANGE);
    let (ymin, ymax) = positive_range(spectra.iter()).unwrap_or((1e-10, 1.0));

    let root = BitMapBackend::new(path, SPECTRUM_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(90)
        .build_cartesian_2d(
            (xmin * 0.9..xmax * 1.1).log_scale(),
            (ymin * 0.5..ymax * 2.0).log_scale(),
        )?;
    chart
        .configure_mesh()
        .x_desc("l")
        .y_desc(CL_DESC)
        .y_label_formatter(&|y| format!("{y:.1e}"))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    for (k, row) in spectra.rows().into_iter().enumerate() {
        chart.draw_series(LineSeries::new(
            ells.iter()
                .zip(row.iter())
                .filter(|(&l, &c)| l > 0.0 && c > 0.0)
                .map(|(&l, &c)| (l, c)),
            Palette99::pick(k).stroke_width(1),
        ))?;
    }

    root.present()?;
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| PowspecError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

pub fn plot_covariance(cfg: &ReportCfg, covar: ArrayView2<f64>) -> Result<()> {
    ensure_dir(&cfg.out_dir)?;
    let path = cfg.covariance_path();
    draw_heatmap(&path, covar, "Covariance Matrix Heat Map").map_err(plot_err)?;
    log::info!("wrote {}", path.display());
    Ok(())
}

pub fn plot_correlation(cfg: &ReportCfg, correl: ArrayView2<f64>) -> Result<()> {
    ensure_dir(&cfg.out_dir)?;
    let path = cfg.correlation_path();
    let title = format!("Correlation Matrix Heat Map - {}", cfg.label);
    draw_heatmap(&path, correl, &title).map_err(plot_err)?;
    log::info!("wrote {}", path.display());
    Ok(())
}

pub fn plot_mean_spectrum(
    cfg: &ReportCfg,
    ells: ArrayView1<f64>,
    mean: ArrayView1<f64>,
    std: ArrayView1<f64>,
) -> Result<()> {
    ensure_dir(&cfg.out_dir)?;
    let path = cfg.mean_path();
    let title = format!("Mean Power Spectrum -- {}", cfg.label);
    draw_mean_spectrum(&path, ells, mean, std, &title).map_err(plot_err)?;
    log::info!("wrote {}", path.display());
    Ok(())
}

pub fn plot_all_spectra(cfg: &ReportCfg, ells: ArrayView1<f64>, spectra: ArrayView2<f64>) -> Result<()> {
    ensure_dir(&cfg.out_dir)?;
    let path = cfg.spectra_path();
    let title = format!("All Power Spectra -- {}", cfg.label);
    draw_all_spectra(&path, ells, spectra, &title).map_err(plot_err)?;
    log::info!("wrote {}", path.display());
    Ok(())
}
