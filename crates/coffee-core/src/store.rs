//! Process-wide caches for the opened raster and the loaded classifier.
//!
//! Each cache is filled at most once. Concurrent first callers serialise on an
//! init mutex and the losers observe the winner's value, so the raster is
//! opened and the model trained exactly once. After initialisation reads go
//! straight to a `OnceLock` without locking.
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::{debug, info};

use crate::classifier::{ClassifierModel, ModelError};
use crate::config::CoverageConfig;
use crate::corpus::{read_corpus, CorpusConfig};
use crate::raster::{GeoTiffRaster, RasterError, RasterSource};

/// A lazily initialised, immutable shared value with single-flight init.
pub struct SingleFlight<T: ?Sized> {
    cell: OnceLock<Arc<T>>,
    init: Mutex<()>,
}

impl<T: ?Sized> Default for SingleFlight<T> {
    fn default() -> Self {
        Self { cell: OnceLock::new(), init: Mutex::new(()) }
    }
}

impl<T: ?Sized> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that is already filled.
    pub fn ready(value: Arc<T>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Self { cell, init: Mutex::new(()) }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.get().cloned()
    }

    /// Return the cached value, running `init` if the cache is empty. A
    /// failed `init` leaves the cache empty so a later call can retry.
    pub fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<Arc<T>, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(v) = self.cell.get() {
            return Ok(Arc::clone(v));
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(v) = self.cell.get() {
            return Ok(Arc::clone(v));
        }
        let value = init()?;
        let _ = self.cell.set(Arc::clone(&value));
        Ok(value)
    }
}

/// Load the persisted model, or train from the corpus and persist it.
///
/// A persisted model always wins; the corpus is only read when the model file
/// is absent.
pub fn load_or_train(
    model_path: &Path,
    corpus_path: &Path,
    corpus: &CorpusConfig,
) -> Result<ClassifierModel, ModelError> {
    if model_path.exists() {
        info!(path = %model_path.display(), "loading persisted model");
        return ClassifierModel::load(model_path);
    }
    if !corpus_path.exists() {
        return Err(ModelError::Unavailable {
            model_path: model_path.to_path_buf(),
            corpus_path: corpus_path.to_path_buf(),
        });
    }
    info!(corpus = %corpus_path.display(), "no persisted model; training");
    let samples = read_corpus(corpus_path, corpus)?;
    let model = ClassifierModel::train(&samples).map_err(|e| match e {
        ModelError::EmptyCorpus { .. } => {
            ModelError::EmptyCorpus { corpus: corpus_path.display().to_string() }
        }
        other => other,
    })?;
    model.save(model_path)?;
    Ok(model)
}

/// Owns both caches plus the configuration they are filled from.
pub struct ResourceStore {
    config: CoverageConfig,
    raster: SingleFlight<dyn RasterSource>,
    model: SingleFlight<ClassifierModel>,
}

impl ResourceStore {
    pub fn new(config: CoverageConfig) -> Self {
        Self { config, raster: SingleFlight::new(), model: SingleFlight::new() }
    }

    /// A store whose caches are pre-filled, bypassing the filesystem.
    pub fn from_parts(
        config: CoverageConfig,
        raster: Arc<dyn RasterSource>,
        model: Arc<ClassifierModel>,
    ) -> Self {
        Self { config, raster: SingleFlight::ready(raster), model: SingleFlight::ready(model) }
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    pub fn raster(&self) -> Result<Arc<dyn RasterSource>, RasterError> {
        if let Some(raster) = self.raster.get() {
            debug!("raster cache hit");
            return Ok(raster);
        }
        self.raster.get_or_try_init(|| {
            let raster = GeoTiffRaster::open(&self.config.raster_path)?;
            Ok(Arc::new(raster) as Arc<dyn RasterSource>)
        })
    }

    pub fn model(&self) -> Result<Arc<ClassifierModel>, ModelError> {
        self.model.get_or_try_init(|| {
            let c = &self.config;
            load_or_train(&c.model_path, &c.corpus_path, &c.corpus).map(Arc::new)
        })
    }
}
