//! Geographic coordinate types and the affine pixel mapping.
//! All coordinate math uses f64 for precision.
//!
//! A north-up raster has a negative `res_y`; nothing here assumes a sign, so
//! south-up rasters map through the same code paths.
use serde::{Deserialize, Serialize};

/// A point in geographic coordinates (EPSG:4326 degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build from a GeoJSON position, which is ordered `[lon, lat]`.
    pub fn from_lon_lat(lon: f64, lat: f64) -> Self {
        Self { lat, lon }
    }
}

/// Geographic bounding box of a ring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Affine geotransform of a north-up (or south-up) raster without rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Geographic x (longitude) of the outer corner of pixel (0, 0).
    pub origin_x: f64,
    /// Geographic y (latitude) of the outer corner of pixel (0, 0).
    pub origin_y: f64,
    /// Pixel width in degrees. Never zero.
    pub res_x: f64,
    /// Pixel height in degrees. Negative for north-up imagery. Never zero.
    pub res_y: f64,
    pub width: usize,
    pub height: usize,
}

/// Inclusive pixel-space window, already clamped to the raster grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWindow {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl PixelWindow {
    #[inline]
    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    /// Number of pixels in the window.
    pub fn len(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GeoTransform {
    /// Column index containing longitude `lon`. May fall outside the grid.
    #[inline]
    pub fn to_pixel_x(&self, lon: f64) -> i64 {
        ((lon - self.origin_x) / self.res_x).floor() as i64
    }

    /// Row index containing latitude `lat`. May fall outside the grid.
    #[inline]
    pub fn to_pixel_y(&self, lat: f64) -> i64 {
        ((lat - self.origin_y) / self.res_y).floor() as i64
    }

    /// Geographic centre of pixel cell (`col`, `row`).
    #[inline]
    pub fn pixel_center(&self, col: usize, row: usize) -> LatLon {
        LatLon {
            lon: self.origin_x + (col as f64 + 0.5) * self.res_x,
            lat: self.origin_y + (row as f64 + 0.5) * self.res_y,
        }
    }

    /// Pixel containing `point`, or `None` when it lies outside the grid.
    pub fn pixel_at(&self, point: LatLon) -> Option<(usize, usize)> {
        let col = self.to_pixel_x(point.lon);
        let row = self.to_pixel_y(point.lat);
        let inside = (0..self.width as i64).contains(&col) && (0..self.height as i64).contains(&row);
        inside.then_some((col as usize, row as usize))
    }

    /// Minimal clamped pixel window covering `bbox`.
    ///
    /// Both bbox extremes are mapped per axis and ordered with min/max, so the
    /// sign of the resolution does not matter. Returns `None` when the mapped
    /// range lies entirely outside the grid on either axis.
    pub fn window_for(&self, bbox: &BoundingBox) -> Option<PixelWindow> {
        let (x0, x1) = (self.to_pixel_x(bbox.min_lon), self.to_pixel_x(bbox.max_lon));
        let (y0, y1) = (self.to_pixel_y(bbox.min_lat), self.to_pixel_y(bbox.max_lat));
        let (min_x, max_x) = clamp_span(x0.min(x1), x0.max(x1), self.width)?;
        let (min_y, max_y) = clamp_span(y0.min(y1), y0.max(y1), self.height)?;
        Some(PixelWindow { min_x, min_y, max_x, max_y })
    }
}

/// Clamp the inclusive span `[lo, hi]` to `[0, len - 1]`; `None` if disjoint.
fn clamp_span(lo: i64, hi: i64, len: usize) -> Option<(usize, usize)> {
    let last = len as i64 - 1;
    if len == 0 || hi < 0 || lo > last {
        return None;
    }
    Some((lo.max(0) as usize, hi.min(last) as usize))
}
