//! Coffee coverage of a polygon: window → read → per-pixel classification.
//!
//! Steps, each a possible failure point:
//!   1. validate the polygon ring and options
//!   2. load (or train) the classifier
//!   3. open the raster
//!   4. project the ring's bounding box to a clamped pixel window
//!   5. read that window
//!   6. visit pixel centres at `sample_step`, keep those inside the ring with
//!      a finite value, classify each
//!   7. aggregate into a percentage rounded to two decimals
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::classifier::ClassifierModel;
use crate::config::{CoverageConfig, EmptyWindowPolicy};
use crate::error::{AnalysisError, Result};
use crate::geo::{GeoTransform, PixelWindow};
use crate::polygon::Ring;
use crate::store::ResourceStore;

/// A pixel counts as coffee when its posterior exceeds this.
pub const TARGET_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub total_pixels: u64,
    pub coffee_pixels: u64,
    /// 0–100, rounded to two decimals.
    pub coffee_percentage: f64,
}

impl ClassificationResult {
    pub const EMPTY: Self = Self { total_pixels: 0, coffee_pixels: 0, coffee_percentage: 0.0 };

    fn from_counts(tally: Tally) -> Self {
        let coffee_percentage = if tally.total > 0 {
            round2(tally.coffee as f64 / tally.total as f64 * 100.0)
        } else {
            0.0
        };
        Self { total_pixels: tally.total, coffee_pixels: tally.coffee, coffee_percentage }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOptions {
    /// Visit every `sample_step`-th row and column. 1 visits every pixel.
    pub sample_step: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self { sample_step: 1 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    total: u64,
    coffee: u64,
}

impl Tally {
    fn merge(self, other: Self) -> Self {
        Self { total: self.total + other.total, coffee: self.coffee + other.coffee }
    }
}

/// Read-only inputs shared by every row of one request.
struct WindowScan<'a> {
    ring: &'a Ring,
    transform: &'a GeoTransform,
    window: PixelWindow,
    samples: &'a [f64],
    step: usize,
    model: &'a ClassifierModel,
}

impl WindowScan<'_> {
    fn row(&self, y: usize) -> Tally {
        let width = self.window.width();
        let mut tally = Tally::default();
        for x in (0..width).step_by(self.step) {
            let centre =
                self.transform.pixel_center(self.window.min_x + x, self.window.min_y + y);
            if !self.ring.contains(centre) {
                continue;
            }
            let value = self.samples[y * width + x];
            if !value.is_finite() {
                continue;
            }
            if self.model.predict(value) > TARGET_THRESHOLD {
                tally.coffee += 1;
            }
            tally.total += 1;
        }
        tally
    }

    #[cfg(not(feature = "threading"))]
    fn run(&self) -> Tally {
        (0..self.window.height())
            .step_by(self.step)
            .map(|y| self.row(y))
            .fold(Tally::default(), Tally::merge)
    }

    #[cfg(feature = "threading")]
    fn run(&self) -> Tally {
        use rayon::prelude::*;
        (0..self.window.height())
            .into_par_iter()
            .step_by(self.step)
            .map(|y| self.row(y))
            .reduce(Tally::default, Tally::merge)
    }
}

/// Runs analyses against one raster/model pair held in a [`ResourceStore`].
pub struct CoverageAnalyzer {
    store: ResourceStore,
}

impl CoverageAnalyzer {
    pub fn new(config: CoverageConfig) -> Self {
        Self { store: ResourceStore::new(config) }
    }

    pub fn with_store(store: ResourceStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Analyse with the configured default sample step.
    pub fn analyze_default(&self, polygon: &Value) -> Result<ClassificationResult> {
        let options = AnalyzeOptions { sample_step: self.store.config().sample_step };
        self.analyze(polygon, options)
    }

    /// Percentage of in-polygon, finite-valued pixels classified as coffee.
    ///
    /// A polygon whose window misses the raster yields
    /// [`ClassificationResult::EMPTY`] or [`AnalysisError::OutOfBounds`],
    /// depending on [`EmptyWindowPolicy`].
    pub fn analyze(&self, polygon: &Value, options: AnalyzeOptions) -> Result<ClassificationResult> {
        let ring = Ring::from_geojson(polygon)?;
        if options.sample_step == 0 {
            return Err(AnalysisError::InvalidInput("sample_step must be at least 1".into()));
        }

        let model = self.store.model()?;
        let raster = self.store.raster()?;
        let transform = raster.transform();

        let bbox = ring.bounding_box();
        let Some(window) = transform.window_for(&bbox) else {
            debug!(?bbox, "polygon window misses the raster");
            return match self.store.config().empty_window {
                EmptyWindowPolicy::ZeroResult => Ok(ClassificationResult::EMPTY),
                EmptyWindowPolicy::Error => Err(AnalysisError::OutOfBounds),
            };
        };

        let samples = raster.read_window(&window)?;
        let scan = WindowScan {
            ring: &ring,
            transform,
            window,
            samples: &samples,
            step: options.sample_step,
            model: &model,
        };
        let result = ClassificationResult::from_counts(scan.run());
        debug!(
            ?window,
            step = options.sample_step,
            total = result.total_pixels,
            coffee = result.coffee_pixels,
            "analysed polygon"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::classifier::{ClassStats, Label, Sample};
    use crate::raster::MemoryRaster;

    fn grid() -> GeoTransform {
        GeoTransform { origin_x: 0.0, origin_y: 0.0, res_x: 1.0, res_y: -1.0, width: 10, height: 10 }
    }

    /// Equal class densities with a 0.9 target prior: predict(x) = 0.9.
    fn confident_model() -> ClassifierModel {
        let stats = ClassStats { mean: 5.0, variance: 1.0 };
        ClassifierModel::Trained { target: stats, other: stats, prior_target: 0.9, prior_other: 0.1 }
    }

    fn analyzer(
        raster: MemoryRaster,
        model: ClassifierModel,
        policy: EmptyWindowPolicy,
    ) -> CoverageAnalyzer {
        let config = CoverageConfig { empty_window: policy, ..Default::default() };
        let store = ResourceStore::from_parts(config, Arc::new(raster), Arc::new(model));
        CoverageAnalyzer::with_store(store)
    }

    fn uniform(policy: EmptyWindowPolicy) -> CoverageAnalyzer {
        analyzer(MemoryRaster::filled(grid(), 5.0).unwrap(), confident_model(), policy)
    }

    fn rect(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [min_lon, min_lat],
                [max_lon, min_lat],
                [max_lon, max_lat],
                [min_lon, max_lat],
                [min_lon, min_lat]
            ]]
        })
    }

    #[test]
    fn uniform_window_is_fully_coffee() {
        let a = uniform(EmptyWindowPolicy::ZeroResult);
        // Columns/rows 2–4: lon 2..5, lat -5..-2.
        let result = a.analyze(&rect(2.0, 5.0, -5.0, -2.0), AnalyzeOptions::default()).unwrap();
        assert_eq!(
            result,
            ClassificationResult { total_pixels: 9, coffee_pixels: 9, coffee_percentage: 100.0 }
        );
    }

    #[test]
    fn no_data_pixels_are_excluded() {
        let mut raster = MemoryRaster::filled(grid(), 5.0).unwrap();
        for col in 2..5 {
            raster.set(2, col, f64::NAN);
        }
        raster.set(3, 2, f64::INFINITY);
        let a = analyzer(raster, confident_model(), EmptyWindowPolicy::ZeroResult);
        let result = a.analyze(&rect(2.0, 5.0, -5.0, -2.0), AnalyzeOptions::default()).unwrap();
        assert_eq!(result.total_pixels, 5);
        assert_eq!(result.coffee_pixels, 5);
    }

    #[test]
    fn percentage_is_rounded_to_two_decimals() {
        // Left third of a 3x3 block is "other".
        let mut raster = MemoryRaster::filled(grid(), 0.8).unwrap();
        for row in 2..5 {
            raster.set(row, 2, 0.2);
        }
        raster.set(4, 3, 0.2);
        let samples = [0.7, 0.75, 0.8, 0.85, 0.2, 0.25, 0.3, 0.15]
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(v, if i < 4 { Label::Target } else { Label::Other }))
            .collect::<Vec<_>>();
        let model = ClassifierModel::train(&samples).unwrap();
        let a = analyzer(raster, model, EmptyWindowPolicy::ZeroResult);
        let result = a.analyze(&rect(2.0, 5.0, -5.0, -2.0), AnalyzeOptions::default()).unwrap();
        assert_eq!((result.total_pixels, result.coffee_pixels), (9, 5));
        assert_eq!(result.coffee_percentage, 55.56);
    }

    #[test]
    fn triangle_keeps_only_inside_centres() {
        let a = uniform(EmptyWindowPolicy::ZeroResult);
        let triangle = json!({
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [4.0, 0.0], [0.0, -4.0]]]}
        });
        // Centres (x+0.5, -(y+0.5)) with x + y + 1 < 4 → 6 pixels.
        let result = a.analyze(&triangle, AnalyzeOptions::default()).unwrap();
        assert_eq!(result.total_pixels, 6);
    }

    #[test]
    fn polygon_outside_raster_follows_policy() {
        let outside = rect(20.0, 25.0, -5.0, -2.0);
        let zero = uniform(EmptyWindowPolicy::ZeroResult);
        assert_eq!(zero.analyze(&outside, AnalyzeOptions::default()).unwrap(), ClassificationResult::EMPTY);
        let strict = uniform(EmptyWindowPolicy::Error);
        let err = strict.analyze(&outside, AnalyzeOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::OutOfBounds));
    }

    #[test]
    fn larger_step_visits_fewer_pixels() {
        let a = uniform(EmptyWindowPolicy::ZeroResult);
        let polygon = rect(0.0, 10.0, -10.0, 0.0);
        let mut previous = u64::MAX;
        for step in 1..=4 {
            let r = a.analyze(&polygon, AnalyzeOptions { sample_step: step }).unwrap();
            assert!(r.total_pixels <= previous);
            assert_eq!(r.coffee_percentage, 100.0);
            previous = r.total_pixels;
        }
        assert_eq!(a.analyze(&polygon, AnalyzeOptions { sample_step: 2 }).unwrap().total_pixels, 25);
    }

    #[test]
    fn default_analysis_uses_configured_step() {
        let config = CoverageConfig { sample_step: 2, ..Default::default() };
        let raster = MemoryRaster::filled(grid(), 5.0).unwrap();
        let store = ResourceStore::from_parts(config, Arc::new(raster), Arc::new(confident_model()));
        let a = CoverageAnalyzer::with_store(store);
        let polygon = rect(0.0, 10.0, -10.0, 0.0);
        let by_config = a.analyze_default(&polygon).unwrap();
        assert_eq!(by_config, a.analyze(&polygon, AnalyzeOptions { sample_step: 2 }).unwrap());
        assert_eq!(by_config.total_pixels, 25);
    }

    #[test]
    fn invalid_input_is_rejected_before_loading_resources() {
        // Empty store: any resource access would fail with a different error.
        let a = CoverageAnalyzer::new(CoverageConfig {
            raster_path: "missing.tif".into(),
            model_path: "missing.json".into(),
            corpus_path: "missing.csv".into(),
            ..Default::default()
        });
        let line = json!({"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 1.0]]]});
        assert!(matches!(a.analyze(&line, AnalyzeOptions::default()), Err(AnalysisError::InvalidInput(_))));
        let ok_polygon = rect(0.0, 1.0, -1.0, 0.0);
        assert!(matches!(
            a.analyze(&ok_polygon, AnalyzeOptions { sample_step: 0 }),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            a.analyze(&ok_polygon, AnalyzeOptions::default()),
            Err(AnalysisError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn result_serialises_with_camel_case_fields() {
        let r = ClassificationResult { total_pixels: 4, coffee_pixels: 1, coffee_percentage: 25.0 };
        assert_eq!(
            serde_json::to_value(r).unwrap(),
            json!({"totalPixels": 4, "coffeePixels": 1, "coffeePercentage": 25.0})
        );
    }
}
