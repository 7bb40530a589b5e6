//! Training corpus ingestion from CSV.
//!
//! Each row carries a class column (`clase` by default, `cafe` marks the
//! target class) and one numeric feature. The feature column is either named
//! explicitly, found among the recognised band-value names, or, as a last
//! resort, inferred per row as the first numeric column that is not an id or
//! label column. Rows whose feature is missing or non-finite are dropped.
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{Label, ModelError, Sample};

/// Feature column names tried, in order, when none is configured.
pub const RECOGNISED_FEATURE_COLUMNS: [&str; 6] =
    ["valor_banda", "band", "value", "valor", "valor_b", "valor_band"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub label_column: String,
    /// Label value (trimmed, case-insensitive) marking the target class.
    pub target_label: String,
    /// Explicit feature column. When unset, see [`RECOGNISED_FEATURE_COLUMNS`].
    pub feature_column: Option<String>,
    /// Columns never considered by per-row feature inference.
    pub skip_columns: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            label_column: "clase".into(),
            target_label: "cafe".into(),
            feature_column: None,
            skip_columns: ["clase", "class", "id", "id_muestra", "orig_fid"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// How the feature value of each row is located.
#[derive(Debug, Clone, PartialEq)]
enum FeatureColumn {
    Index(usize),
    /// First numeric column outside these indices.
    Inferred { skip: Vec<usize> },
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
}

fn resolve_feature(
    headers: &csv::StringRecord,
    config: &CorpusConfig,
    label_idx: Option<usize>,
    path: &Path,
) -> Result<FeatureColumn, ModelError> {
    if let Some(name) = &config.feature_column {
        return find_column(headers, name).map(FeatureColumn::Index).ok_or_else(|| {
            ModelError::MissingColumn { path: path.to_path_buf(), column: name.clone() }
        });
    }
    if let Some(idx) = RECOGNISED_FEATURE_COLUMNS.iter().find_map(|n| find_column(headers, n)) {
        debug!(column = &headers[idx], "using recognised feature column");
        return Ok(FeatureColumn::Index(idx));
    }
    let mut skip: Vec<usize> =
        config.skip_columns.iter().filter_map(|n| find_column(headers, n)).collect();
    skip.extend(label_idx);
    warn!(
        path = %path.display(),
        "no feature column configured or recognised; inferring the first numeric column per row"
    );
    Ok(FeatureColumn::Inferred { skip })
}

fn parse_finite(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read every usable sample from the CSV at `path`.
pub fn read_corpus(path: &Path, config: &CorpusConfig) -> Result<Vec<Sample>, ModelError> {
    let csv_err = |source| ModelError::Csv { path: path.to_path_buf(), source };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let label_idx = find_column(&headers, &config.label_column);
    if label_idx.is_none() {
        warn!(
            path = %path.display(),
            column = %config.label_column,
            "label column missing; every row is treated as non-target"
        );
    }
    let feature = resolve_feature(&headers, config, label_idx, path)?;
    let target = config.target_label.trim().to_lowercase();

    let mut samples = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let value = match &feature {
            FeatureColumn::Index(idx) => record.get(*idx).and_then(parse_finite),
            FeatureColumn::Inferred { skip } => record
                .iter()
                .enumerate()
                .filter(|(i, _)| !skip.contains(i))
                .find_map(|(_, field)| parse_finite(field)),
        };
        let Some(value) = value else {
            dropped += 1;
            continue;
        };
        let raw_label = label_idx.and_then(|i| record.get(i)).unwrap_or("");
        let label =
            if raw_label.trim().to_lowercase() == target { Label::Target } else { Label::Other };
        samples.push(Sample::new(value, label));
    }

    info!(path = %path.display(), samples = samples.len(), dropped, "read training corpus");
    Ok(samples)
}
