//! Error kinds surfaced by the analysis pipeline.
//!
//! None of these are retried internally: they describe bad input or missing
//! static configuration, not transient faults.
use thiserror::Error;

use crate::classifier::ModelError;
use crate::raster::RasterError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Malformed or missing polygon, ring under three vertices, bad options.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Raster file missing or undecodable.
    #[error("raster unavailable: {0}")]
    RasterUnavailable(#[source] RasterError),

    /// Neither a persisted model nor a training corpus could be used.
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[source] ModelError),

    /// The corpus exists but produced zero usable rows.
    #[error("training corpus has no usable rows: {0}")]
    EmptyCorpus(String),

    /// The polygon's window does not intersect the raster. Only raised under
    /// `EmptyWindowPolicy::Error`.
    #[error("polygon lies outside raster coverage")]
    OutOfBounds,
}

impl From<RasterError> for AnalysisError {
    fn from(err: RasterError) -> Self {
        AnalysisError::RasterUnavailable(err)
    }
}

impl From<ModelError> for AnalysisError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::EmptyCorpus { corpus } => AnalysisError::EmptyCorpus(corpus),
            other => AnalysisError::ModelUnavailable(other),
        }
    }
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
