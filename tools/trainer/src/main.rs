/// Classifier training tool: fits the two-class Gaussian model to a labeled
/// CSV corpus and persists it where the analyser expects to find it.
///
/// The analyser trains on first use when no model exists; this tool forces a
/// retrain, e.g. after the corpus changes.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use coffee_core::corpus::read_corpus;
use coffee_core::logging::init_logging;
use coffee_core::{ClassStats, ClassifierModel, CoverageConfig, Label, Sample};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "trainer", about = "Train the coffee classifier from a labeled CSV corpus")]
struct Args {
    /// JSON config file supplying defaults for the paths and corpus layout.
    #[arg(short, long, env = "COFFEE_CONFIG")]
    config: Option<PathBuf>,

    /// Training corpus CSV.
    #[arg(long, env = "COFFEE_CORPUS")]
    corpus: Option<PathBuf>,

    /// Where to write the model JSON.
    #[arg(short, long, env = "COFFEE_MODEL")]
    output: Option<PathBuf>,

    /// Column holding the class label.
    #[arg(long)]
    label_column: Option<String>,

    /// Label value marking the target class.
    #[arg(long)]
    target_label: Option<String>,

    /// Column holding the band value.
    #[arg(long)]
    feature_column: Option<String>,

    /// Fit and report without writing the model.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Report ───────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct TrainingReport {
    model_path: PathBuf,
    corpus_path: PathBuf,
    samples: usize,
    target_samples: usize,
    other_samples: usize,
    degenerate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<ClassStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    other: Option<ClassStats>,
    written: bool,
}

fn report(
    config: &CoverageConfig,
    samples: &[Sample],
    model: &ClassifierModel,
    written: bool,
) -> TrainingReport {
    let target_samples = samples.iter().filter(|s| s.label == Label::Target).count();
    let (target, other) = match model {
        ClassifierModel::Trained { target, other, .. } => (Some(*target), Some(*other)),
        ClassifierModel::Degenerate { .. } => (None, None),
    };
    TrainingReport {
        model_path: config.model_path.clone(),
        corpus_path: config.corpus_path.clone(),
        samples: samples.len(),
        target_samples,
        other_samples: samples.len() - target_samples,
        degenerate: model.is_degenerate(),
        target,
        other,
        written,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = CoverageConfig::load(args.config.as_deref())?;
    if let Some(p) = args.corpus {
        config.corpus_path = p;
    }
    if let Some(p) = args.output {
        config.model_path = p;
    }
    if let Some(c) = args.label_column {
        config.corpus.label_column = c;
    }
    if let Some(t) = args.target_label {
        config.corpus.target_label = t;
    }
    if let Some(f) = args.feature_column {
        config.corpus.feature_column = Some(f);
    }

    let samples = read_corpus(&config.corpus_path, &config.corpus)
        .with_context(|| format!("Cannot load corpus {}", config.corpus_path.display()))?;
    let model = ClassifierModel::train(&samples)
        .with_context(|| format!("Training on {} failed", config.corpus_path.display()))?;

    if !args.dry_run {
        model.save(&config.model_path)?;
    }
    info!(samples = samples.len(), degenerate = model.is_degenerate(), "[trainer] done");

    let summary = report(&config, &samples, &model, !args.dry_run);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
