/// Corpus sampling tool: reads labeled point locations, samples the raster
/// beneath each one and writes the training corpus CSV consumed by the
/// trainer and by the analyser's first-use training.
///
/// Input points CSV: one row per labeled location with longitude, latitude
/// and class columns (names configurable). Extra columns are ignored.
/// Output corpus CSV: `id,clase,valor_banda`.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use coffee_core::logging::init_logging;
use coffee_core::{GeoTiffRaster, LatLon, PixelWindow, RasterError, RasterSource};
use serde::Serialize;
use tracing::{info, warn};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sampler", about = "Sample raster values at labeled points into a training corpus CSV")]
struct Args {
    /// Labeled points CSV.
    #[arg(long)]
    points: PathBuf,

    /// Single-band GeoTIFF to sample.
    #[arg(long, env = "COFFEE_RASTER", default_value = "data/sentinel2/ndvi.tif")]
    raster: PathBuf,

    /// Output corpus CSV (parent directories are created).
    #[arg(short, long, default_value = "data/entrenamiento/poligonos_cultivos_points.csv")]
    output: PathBuf,

    #[arg(long, default_value = "lon")]
    lon_column: String,

    #[arg(long, default_value = "lat")]
    lat_column: String,

    #[arg(long, default_value = "clase")]
    label_column: String,

    /// Average a (2r+1)×(2r+1) pixel neighbourhood instead of a single pixel.
    #[arg(long, default_value = "0")]
    radius: usize,

    /// Minimum fraction of finite pixels required in the neighbourhood.
    #[arg(long, default_value = "0.5")]
    min_valid: f64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Sampling ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum PointSample {
    Value(f64),
    Outside,
    NoData,
}

/// Mean of the finite pixels in the neighbourhood of `point`, clamped to the
/// raster edge. `NoData` when fewer than `min_valid` of them are finite.
fn sample_point(
    raster: &dyn RasterSource,
    point: LatLon,
    radius: usize,
    min_valid: f64,
) -> Result<PointSample, RasterError> {
    let gt = raster.transform();
    let Some((col, row)) = gt.pixel_at(point) else {
        return Ok(PointSample::Outside);
    };
    let window = PixelWindow {
        min_x: col.saturating_sub(radius),
        min_y: row.saturating_sub(radius),
        max_x: (col + radius).min(gt.width - 1),
        max_y: (row + radius).min(gt.height - 1),
    };
    let values = raster.read_window(&window)?;
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || (finite.len() as f64) < min_valid * values.len() as f64 {
        return Ok(PointSample::NoData);
    }
    Ok(PointSample::Value(finite.iter().sum::<f64>() / finite.len() as f64))
}

#[derive(Serialize, Debug, Default, PartialEq)]
struct Manifest {
    points: usize,
    written: usize,
    outside: usize,
    no_data: usize,
    unparsable: usize,
}

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .with_context(|| format!("{} has no {name:?} column", path.display()))
}

fn run(args: &Args, raster: &dyn RasterSource) -> Result<Manifest> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(&args.points)
        .with_context(|| format!("Cannot open {}", args.points.display()))?;
    let headers = reader.headers()?.clone();
    let lon_idx = column(&headers, &args.lon_column, &args.points)?;
    let lat_idx = column(&headers, &args.lat_column, &args.points)?;
    let label_idx = column(&headers, &args.label_column, &args.points)?;

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    writer.write_record(["id", "clase", "valor_banda"])?;

    let mut manifest = Manifest::default();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        manifest.points += 1;
        let coord = |idx: usize| record.get(idx).and_then(|f| f.parse::<f64>().ok());
        let (Some(lon), Some(lat)) = (coord(lon_idx), coord(lat_idx)) else {
            warn!(line = line + 2, "unparsable coordinates; skipping");
            manifest.unparsable += 1;
            continue;
        };
        match sample_point(raster, LatLon::new(lat, lon), args.radius, args.min_valid)? {
            PointSample::Value(v) => {
                let label = record.get(label_idx).unwrap_or("");
                writer.write_record([manifest.written.to_string(), label.to_string(), v.to_string()])?;
                manifest.written += 1;
            }
            PointSample::Outside => manifest.outside += 1,
            PointSample::NoData => manifest.no_data += 1,
        }
    }
    writer.flush()?;
    Ok(manifest)
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let raster = GeoTiffRaster::open(&args.raster)
        .with_context(|| format!("Cannot open raster {}", args.raster.display()))?;
    let manifest = run(&args, &raster)?;

    info!(
        written = manifest.written,
        outside = manifest.outside,
        no_data = manifest.no_data,
        "[sampler] {} complete",
        args.output.display()
    );
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}
