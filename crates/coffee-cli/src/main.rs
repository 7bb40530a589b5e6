/// Coffee coverage runner: analyses GeoJSON polygons against the configured
/// raster and prints one JSON line per polygon on stdout.
///
/// Resources are opened once and reused for every polygon on the command line.
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use coffee_core::logging::init_logging;
use coffee_core::{ClassificationResult, CoverageAnalyzer, CoverageConfig, EmptyWindowPolicy};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "coffee-cover", about = "Estimate coffee coverage inside GeoJSON polygons")]
struct Args {
    /// GeoJSON files, each holding a Polygon or a Feature wrapping one.
    #[arg(required = true)]
    polygons: Vec<PathBuf>,

    /// JSON config file; flags below override its values.
    #[arg(short, long, env = "COFFEE_CONFIG")]
    config: Option<PathBuf>,

    /// Single-band GeoTIFF to analyse.
    #[arg(long, env = "COFFEE_RASTER")]
    raster: Option<PathBuf>,

    /// Persisted model (written after training when absent).
    #[arg(long, env = "COFFEE_MODEL")]
    model: Option<PathBuf>,

    /// Training corpus CSV used when no persisted model exists.
    #[arg(long, env = "COFFEE_CORPUS")]
    corpus: Option<PathBuf>,

    /// Corpus column holding the band value.
    #[arg(long)]
    feature_column: Option<String>,

    /// Visit every Nth pixel row and column (2 or 3 for very large polygons).
    #[arg(long)]
    sample_step: Option<usize>,

    /// Fail instead of reporting zero pixels when a polygon misses the raster.
    #[arg(long)]
    strict_bounds: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn resolve_config(&self) -> Result<CoverageConfig> {
        let mut config = CoverageConfig::load(self.config.as_deref())?;
        if let Some(p) = &self.raster {
            config.raster_path = p.clone();
        }
        if let Some(p) = &self.model {
            config.model_path = p.clone();
        }
        if let Some(p) = &self.corpus {
            config.corpus_path = p.clone();
        }
        if let Some(c) = &self.feature_column {
            config.corpus.feature_column = Some(c.clone());
        }
        if let Some(step) = self.sample_step {
            anyhow::ensure!(step >= 1, "--sample-step must be at least 1");
            config.sample_step = step;
        }
        if self.strict_bounds {
            config.empty_window = EmptyWindowPolicy::Error;
        }
        Ok(config)
    }
}

#[derive(Serialize)]
struct Report<'a> {
    polygon: &'a Path,
    #[serde(flatten)]
    outcome: Outcome,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Outcome {
    Result(ClassificationResult),
    Error(String),
}

fn read_polygon(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn analyse_one(analyzer: &CoverageAnalyzer, path: &Path) -> Outcome {
    let polygon = match read_polygon(path) {
        Ok(v) => v,
        Err(e) => return Outcome::Error(format!("{e:#}")),
    };
    match analyzer.analyze_default(&polygon) {
        Ok(result) => {
            info!(
                polygon = %path.display(),
                total = result.total_pixels,
                coffee = result.coffee_pixels,
                pct = result.coffee_percentage,
                "analysed"
            );
            Outcome::Result(result)
        }
        Err(e) => {
            error!(polygon = %path.display(), "{e}");
            Outcome::Error(e.to_string())
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = args.resolve_config()?;
    let analyzer = CoverageAnalyzer::new(config);

    let mut failures = 0usize;
    for path in &args.polygons {
        let outcome = analyse_one(&analyzer, path);
        if matches!(outcome, Outcome::Error(_)) {
            failures += 1;
        }
        println!("{}", serde_json::to_string(&Report { polygon: path, outcome })?);
    }

    Ok(if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
