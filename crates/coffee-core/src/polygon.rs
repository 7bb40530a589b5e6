//! Polygon ring extraction and point-in-polygon containment.
//!
//! Only the outer ring of a polygon is used. Holes are ignored and the ring is
//! assumed to be simple (not self-intersecting); a self-intersecting ring is
//! evaluated with the even-odd rule, which may not match the caller's intent.
use serde::Deserialize;
use serde_json::Value;

use crate::error::AnalysisError;
use crate::geo::{BoundingBox, LatLon};

/// Minimum number of distinct vertices a ring must have.
pub const MIN_RING_VERTICES: usize = 3;

/// The outer ring of a polygon as an ordered sequence of vertices.
///
/// The closing vertex may or may not repeat the first one; containment treats
/// the sequence as a ring either way.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    vertices: Vec<LatLon>,
}

// ── GeoJSON input shapes ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeoJsonInput {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    Feature { geometry: Option<GeoJsonGeometry> },
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeoJsonGeometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    #[serde(other)]
    Other,
}

impl Ring {
    /// Build a ring from vertices, validating its size.
    pub fn new(vertices: Vec<LatLon>) -> Result<Self, AnalysisError> {
        if vertices.iter().any(|v| !v.lat.is_finite() || !v.lon.is_finite()) {
            return Err(AnalysisError::InvalidInput(
                "polygon contains a non-finite coordinate".into(),
            ));
        }
        let ring = Self { vertices };
        let distinct = ring.distinct_vertices_up_to(MIN_RING_VERTICES);
        if distinct < MIN_RING_VERTICES {
            return Err(AnalysisError::InvalidInput(format!(
                "polygon ring needs at least {MIN_RING_VERTICES} distinct vertices, got {distinct}"
            )));
        }
        Ok(ring)
    }

    /// Extract the first ring from a GeoJSON `Polygon` or a `Feature` whose
    /// geometry is a `Polygon`.
    pub fn from_geojson(input: &Value) -> Result<Self, AnalysisError> {
        let shape = GeoJsonInput::deserialize(input).map_err(|e| {
            AnalysisError::InvalidInput(format!("expected a GeoJSON Polygon or Feature: {e}"))
        })?;
        let coordinates = match shape {
            GeoJsonInput::Polygon { coordinates } => coordinates,
            GeoJsonInput::Feature { geometry: Some(GeoJsonGeometry::Polygon { coordinates }) } => {
                coordinates
            }
            GeoJsonInput::Feature { .. } => {
                return Err(AnalysisError::InvalidInput(
                    "feature geometry must be a Polygon".into(),
                ))
            }
        };
        let Some(outer) = coordinates.into_iter().next() else {
            return Err(AnalysisError::InvalidInput("polygon has no coordinates".into()));
        };
        let vertices = outer
            .into_iter()
            .map(|pos| match pos.as_slice() {
                [lon, lat, ..] => Ok(LatLon::from_lon_lat(*lon, *lat)),
                _ => Err(AnalysisError::InvalidInput(
                    "polygon position must have at least two components".into(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(vertices)
    }

    pub fn vertices(&self) -> &[LatLon] {
        &self.vertices
    }

    /// Distinct vertex count, capped at `limit`; stops scanning at the cap.
    fn distinct_vertices_up_to(&self, limit: usize) -> usize {
        let mut seen: Vec<LatLon> = Vec::with_capacity(limit);
        for v in &self.vertices {
            if seen.len() == limit {
                break;
            }
            if !seen.contains(v) {
                seen.push(*v);
            }
        }
        seen.len()
    }

    /// Geographic bounding box via a linear scan.
    pub fn bounding_box(&self) -> BoundingBox {
        self.vertices.iter().fold(
            BoundingBox {
                min_lon: f64::INFINITY,
                max_lon: f64::NEG_INFINITY,
                min_lat: f64::INFINITY,
                max_lat: f64::NEG_INFINITY,
            },
            |acc, v| BoundingBox {
                min_lon: acc.min_lon.min(v.lon),
                max_lon: acc.max_lon.max(v.lon),
                min_lat: acc.min_lat.min(v.lat),
                max_lat: acc.max_lat.max(v.lat),
            },
        )
    }

    /// Even-odd ray casting. For each edge (i, j = i - 1 wrapping) the
    /// inclusion flag toggles when a horizontal ray from `point` towards +lon
    /// crosses it. Horizontal edges never satisfy the strict straddle test.
    pub fn contains(&self, point: LatLon) -> bool {
        let (x, y) = (point.lon, point.lat);
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.vertices[i].lon, self.vertices[i].lat);
            let (xj, yj) = (self.vertices[j].lon, self.vertices[j].lat);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}
