//! Coffee land-cover estimation over a single-band GeoTIFF.
//!
//! A GeoJSON polygon is projected onto the raster grid, every pixel centre
//! inside it is classified by a two-class Gaussian model trained from labeled
//! point samples, and the counts are aggregated into a coverage percentage.
pub mod analysis;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod error;
pub mod geo;
pub mod logging;
pub mod polygon;
pub mod raster;
pub mod store;

pub use analysis::{AnalyzeOptions, ClassificationResult, CoverageAnalyzer};
pub use classifier::{ClassStats, ClassifierModel, Label, ModelError, Sample};
pub use config::{CorpusConfig, CoverageConfig, EmptyWindowPolicy};
pub use error::AnalysisError;
pub use geo::{BoundingBox, GeoTransform, LatLon, PixelWindow};
pub use polygon::Ring;
pub use raster::{GeoTiffRaster, MemoryRaster, RasterError, RasterSource};
pub use store::{load_or_train, ResourceStore, SingleFlight};
