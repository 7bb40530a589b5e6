//! Two-class Gaussian generative classifier over one scalar feature.
//!
//! Each class gets a normal distribution fitted to its samples; prediction is
//! Bayes' rule over the two class densities weighted by their priors. A corpus
//! containing only one label yields [`ClassifierModel::Degenerate`], which
//! always predicts that label.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Lower bound applied to every fitted variance.
pub const VARIANCE_FLOOR: f64 = 1e-6;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{corpus} contains no usable samples")]
    EmptyCorpus { corpus: String },

    #[error(
        "no persisted model at {} and no training corpus at {}",
        model_path.display(),
        corpus_path.display()
    )]
    Unavailable { model_path: PathBuf, corpus_path: PathBuf },

    #[error("corpus {} has no column named {column:?}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("cannot read corpus {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("model file {} is malformed: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model file {} is inconsistent: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("model I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ── Samples ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// The land-cover class being measured (coffee).
    Target,
    Other,
}

/// One labeled training observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub label: Label,
}

impl Sample {
    pub fn new(value: f64, label: Label) -> Self {
        Self { value, label }
    }
}

// ── Model ────────────────────────────────────────────────────────────────────

/// Normal distribution parameters of one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub mean: f64,
    pub variance: f64,
}

impl ClassStats {
    /// Sample mean and unbiased (n − 1) variance, floored at
    /// [`VARIANCE_FLOOR`]. A single sample uses divisor 1.
    pub fn fit(values: &[f64]) -> Self {
        let n = values.len().max(1) as f64;
        let mean = values.iter().sum::<f64>() / n;
        let divisor = if values.len() > 1 { (values.len() - 1) as f64 } else { 1.0 };
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / divisor;
        Self { mean, variance: variance.max(VARIANCE_FLOOR) }
    }

    /// Probability density at `x`.
    pub fn density(&self, x: f64) -> f64 {
        self.log_density(x).exp()
    }

    fn log_density(&self, x: f64) -> f64 {
        let z2 = (x - self.mean).powi(2) / self.variance;
        -0.5 * (z2 + (2.0 * std::f64::consts::PI * self.variance).ln())
    }

    /// Standard score of `x` under this class.
    fn z_score(&self, x: f64) -> f64 {
        (x - self.mean) / self.variance.sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierModel {
    /// Both classes were present in the corpus.
    Trained {
        target: ClassStats,
        other: ClassStats,
        prior_target: f64,
        prior_other: f64,
    },
    /// Only `label` was present; predictions are fixed at 1 or 0.
    Degenerate { label: Label },
}

impl ClassifierModel {
    /// Fit per-class statistics and class-frequency priors.
    pub fn train(samples: &[Sample]) -> Result<Self, ModelError> {
        if samples.is_empty() {
            return Err(ModelError::EmptyCorpus { corpus: "training sample set".into() });
        }

        let (target, other): (Vec<&Sample>, Vec<&Sample>) =
            samples.iter().partition(|s| s.label == Label::Target);

        if target.is_empty() || other.is_empty() {
            let label = if target.is_empty() { Label::Other } else { Label::Target };
            warn!(?label, samples = samples.len(), "corpus holds a single class; model is degenerate");
            return Ok(Self::Degenerate { label });
        }

        let values = |class: &[&Sample]| class.iter().map(|s| s.value).collect::<Vec<_>>();
        let n = samples.len() as f64;
        let model = Self::Trained {
            target: ClassStats::fit(&values(&target[..])),
            other: ClassStats::fit(&values(&other[..])),
            prior_target: target.len() as f64 / n,
            prior_other: other.len() as f64 / n,
        };
        info!(target = target.len(), other = other.len(), "trained classifier");
        Ok(model)
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate { .. })
    }

    /// Posterior probability that `value` belongs to the target class.
    ///
    /// Evaluated as `1 / (1 + exp(ln Lo − ln Lt))`, which equals
    /// `Lt / (Lt + Lo)`. The log ratio is formed from the difference of
    /// squared standard scores, `(zo − zt)(zo + zt)`, so it stays finite after
    /// both densities underflow. A non-finite `value`, or a ratio that cannot
    /// be formed at all, carries no evidence and returns the target prior.
    pub fn predict(&self, value: f64) -> f64 {
        match self {
            Self::Degenerate { label: Label::Target } => 1.0,
            Self::Degenerate { label: Label::Other } => 0.0,
            Self::Trained { target, other, prior_target, prior_other } => {
                if !value.is_finite() {
                    return *prior_target;
                }
                let (zt, zo) = (target.z_score(value), other.z_score(value));
                let log_ratio = (prior_other / prior_target).ln()
                    - 0.5 * (other.variance / target.variance).ln()
                    - 0.5 * (zo - zt) * (zo + zt);
                if log_ratio.is_nan() {
                    return *prior_target;
                }
                1.0 / (1.0 + log_ratio.exp())
            }
        }
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    /// Write the model as pretty JSON, creating parent directories. The file
    /// is written beside its destination and renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let io_err = |source| ModelError::Io { path: path.to_path_buf(), source };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&PersistedModel::from(self))
            .map_err(|source| ModelError::Format { path: path.to_path_buf(), source })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        info!(path = %path.display(), "persisted model");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ModelError::Io { path: path.to_path_buf(), source })?;
        let persisted: PersistedModel = serde_json::from_str(&text)
            .map_err(|source| ModelError::Format { path: path.to_path_buf(), source })?;
        persisted
            .into_model()
            .map_err(|reason| ModelError::Invalid { path: path.to_path_buf(), reason })
    }
}

/// On-disk record. Field names match the model files produced by earlier
/// tooling: `{cafe, noCafe, priorCafe, priorNoCafe, degenerate}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedModel {
    cafe: ClassStats,
    no_cafe: ClassStats,
    prior_cafe: f64,
    prior_no_cafe: f64,
    #[serde(default)]
    degenerate: bool,
}

const PLACEHOLDER: ClassStats = ClassStats { mean: 0.0, variance: VARIANCE_FLOOR };

impl From<&ClassifierModel> for PersistedModel {
    fn from(model: &ClassifierModel) -> Self {
        match *model {
            ClassifierModel::Trained { target, other, prior_target, prior_other } => Self {
                cafe: target,
                no_cafe: other,
                prior_cafe: prior_target,
                prior_no_cafe: prior_other,
                degenerate: false,
            },
            ClassifierModel::Degenerate { label } => {
                let prior_cafe = if label == Label::Target { 1.0 } else { 0.0 };
                Self {
                    cafe: PLACEHOLDER,
                    no_cafe: PLACEHOLDER,
                    prior_cafe,
                    prior_no_cafe: 1.0 - prior_cafe,
                    degenerate: true,
                }
            }
        }
    }
}

impl PersistedModel {
    fn into_model(self) -> Result<ClassifierModel, String> {
        if self.degenerate {
            let label = if self.prior_cafe >= 0.5 { Label::Target } else { Label::Other };
            return Ok(ClassifierModel::Degenerate { label });
        }
        for (name, stats) in [("cafe", &self.cafe), ("noCafe", &self.no_cafe)] {
            if !stats.mean.is_finite() || !(stats.variance > 0.0) || !stats.variance.is_finite() {
                return Err(format!("{name} statistics must be finite with positive variance"));
            }
        }
        let priors_ok = [self.prior_cafe, self.prior_no_cafe].iter().all(|p| *p > 0.0 && *p < 1.0)
            && ((self.prior_cafe + self.prior_no_cafe) - 1.0).abs() < 1e-9;
        if !priors_ok {
            return Err(format!(
                "priors {} / {} must be in (0, 1) and sum to 1",
                self.prior_cafe, self.prior_no_cafe
            ));
        }
        Ok(ClassifierModel::Trained {
            target: self.cafe,
            other: self.no_cafe,
            prior_target: self.prior_cafe,
            prior_other: self.prior_no_cafe,
        })
    }
}
