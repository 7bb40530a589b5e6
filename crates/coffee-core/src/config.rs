//! Pipeline configuration: resource paths, corpus layout and policies.
//!
//! Loaded from a JSON file when one is given; CLI flags and environment
//! variables are layered on top by the binaries.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use crate::corpus::CorpusConfig;

/// What `analyze` does when a polygon's window misses the raster entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyWindowPolicy {
    /// Return `{0, 0, 0}`.
    #[default]
    ZeroResult,
    /// Fail with `AnalysisError::OutOfBounds`.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Single-band GeoTIFF analysed by every request.
    pub raster_path: PathBuf,
    /// Persisted classifier; written after training when absent.
    pub model_path: PathBuf,
    /// Labeled CSV used to train when no persisted model exists.
    pub corpus_path: PathBuf,
    pub corpus: CorpusConfig,
    pub empty_window: EmptyWindowPolicy,
    /// Default pixel stride for requests that do not set one.
    pub sample_step: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            raster_path: PathBuf::from("data/sentinel2/ndvi.tif"),
            model_path: PathBuf::from("data/model/coffee-model.json"),
            corpus_path: PathBuf::from("data/entrenamiento/poligonos_cultivos_points.csv"),
            corpus: CorpusConfig::default(),
            empty_window: EmptyWindowPolicy::default(),
            sample_step: 1,
        }
    }
}

impl CoverageConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        anyhow::ensure!(config.sample_step >= 1, "sample_step must be at least 1");
        Ok(config)
    }

    /// `from_file` when a path is given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coffee.json");
        fs::write(
            &path,
            r#"{"raster_path": "scene.tif", "empty_window": "error", "corpus": {"feature_column": "ndvi"}}"#,
        )
        .unwrap();
        let config = CoverageConfig::from_file(&path).unwrap();
        assert_eq!(config.raster_path, PathBuf::from("scene.tif"));
        assert_eq!(config.empty_window, EmptyWindowPolicy::Error);
        assert_eq!(config.corpus.feature_column.as_deref(), Some("ndvi"));
        assert_eq!(config.corpus.label_column, "clase");
        assert_eq!(config.model_path, CoverageConfig::default().model_path);
        assert_eq!(config.sample_step, 1);
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(CoverageConfig::load(None).unwrap(), CoverageConfig::default());
    }

    #[test]
    fn zero_step_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coffee.json");
        fs::write(&path, r#"{"sample_step": 0}"#).unwrap();
        assert!(CoverageConfig::from_file(&path).is_err());
    }
}
