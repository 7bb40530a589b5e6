//! Single-band georeferenced raster access.
//!
//! GeoTIFFs are decoded with the pure-Rust `tiff` crate. Only the strips or
//! tiles intersecting a requested window are decoded, so large scenes are
//! never loaded in full. Samples of every integer/float width are widened to
//! f64; GDAL no-data values come back as NaN.
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::{PlanarConfiguration, Tag};
use tracing::{debug, info};

use crate::geo::{GeoTransform, PixelWindow};

// ── GeoTIFF tag ids ──────────────────────────────────────────────────────────

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GDAL_NODATA: u16 = 42113;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("raster file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot decode raster {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("unsupported raster layout in {}: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },

    #[error("window {window:?} exceeds raster bounds {width}x{height}")]
    WindowOutOfRange { window: PixelWindow, width: usize, height: usize },

    #[error("raster I/O error: {0}")]
    Io(#[from] io::Error),
}

// ── Access trait ─────────────────────────────────────────────────────────────

/// A single-band raster that can be read one rectangular window at a time.
pub trait RasterSource: Send + Sync {
    fn transform(&self) -> &GeoTransform;

    /// Row-major samples of `window`, `window.width() * window.height()` long.
    fn read_window(&self, window: &PixelWindow) -> Result<Vec<f64>, RasterError>;
}

fn check_window(window: &PixelWindow, gt: &GeoTransform) -> Result<(), RasterError> {
    if window.min_x > window.max_x
        || window.min_y > window.max_y
        || window.max_x >= gt.width
        || window.max_y >= gt.height
    {
        return Err(RasterError::WindowOutOfRange {
            window: *window,
            width: gt.width,
            height: gt.height,
        });
    }
    Ok(())
}

// ── GeoTIFF ──────────────────────────────────────────────────────────────────

/// An opened GeoTIFF. The decoder is kept open for the lifetime of the value
/// and serialised behind a mutex; metadata is immutable after `open`.
pub struct GeoTiffRaster {
    path: PathBuf,
    transform: GeoTransform,
    nodata: Option<f64>,
    /// Samples per pixel within one chunk row (1 for planar layouts).
    pixel_stride: usize,
    decoder: Mutex<Decoder<BufReader<File>>>,
}

impl std::fmt::Debug for GeoTiffRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffRaster")
            .field("path", &self.path)
            .field("transform", &self.transform)
            .field("nodata", &self.nodata)
            .finish()
    }
}

impl GeoTiffRaster {
    /// Open and validate a GeoTIFF. Fails with `NotFound` when the file is
    /// absent and `Decode`/`Unsupported` when it is not a usable raster.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let path = path.as_ref().to_path_buf();
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RasterError::NotFound(path));
            }
            Err(e) => return Err(e.into()),
        };
        let decode = |source| RasterError::Decode { path: path.clone(), source };

        let mut decoder = Decoder::new(BufReader::new(file)).map_err(decode)?;
        let (width, height) = decoder.dimensions().map_err(decode)?;
        if width == 0 || height == 0 {
            return Err(RasterError::Unsupported {
                path: path.clone(),
                reason: "zero-sized image".into(),
            });
        }

        let samples = decoder
            .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)
            .map_err(decode)?
            .unwrap_or(1)
            .max(1) as usize;
        let planar = decoder
            .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
            .map_err(decode)?
            .unwrap_or(PlanarConfiguration::Chunky.to_u16());
        let pixel_stride = if planar == PlanarConfiguration::Planar.to_u16() { 1 } else { samples };

        let transform = read_transform(&mut decoder, width as usize, height as usize)
            .map_err(|reason| match reason {
                GeoRefError::Tiff(source) => RasterError::Decode { path: path.clone(), source },
                GeoRefError::Invalid(reason) => {
                    RasterError::Unsupported { path: path.clone(), reason }
                }
            })?;
        let nodata = read_nodata(&mut decoder).map_err(decode)?;

        info!(
            path = %path.display(),
            width,
            height,
            samples,
            res_x = transform.res_x,
            res_y = transform.res_y,
            "opened raster"
        );

        Ok(Self { path, transform, nodata, pixel_stride, decoder: Mutex::new(decoder) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }
}

impl RasterSource for GeoTiffRaster {
    fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    fn read_window(&self, window: &PixelWindow) -> Result<Vec<f64>, RasterError> {
        check_window(window, &self.transform)?;
        let decode = |source| RasterError::Decode { path: self.path.clone(), source };

        // A poisoned lock only means another reader panicked mid-read; the
        // decoder seeks to each chunk from scratch, so it is still usable.
        let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);

        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
        let chunks_across = self.transform.width.div_ceil(chunk_w);
        let out_w = window.width();
        let mut out = vec![f64::NAN; window.len()];

        for cy in window.min_y / chunk_h..=window.max_y / chunk_h {
            for cx in window.min_x / chunk_w..=window.max_x / chunk_w {
                let index = (cy * chunks_across + cx) as u32;
                let (data_w, data_h) = decoder.chunk_data_dimensions(index);
                let (data_w, data_h) = (data_w as usize, data_h as usize);
                let chunk = widen(decoder.read_chunk(index).map_err(decode)?)
                    .ok_or_else(|| RasterError::Unsupported {
                        path: self.path.clone(),
                        reason: "unsupported sample format".into(),
                    })?;

                let (x0, y0) = (cx * chunk_w, cy * chunk_h);
                let rows = window.min_y.max(y0)..=window.max_y.min(y0 + data_h - 1);
                let cols = window.min_x.max(x0)..=window.max_x.min(x0 + data_w - 1);
                for row in rows {
                    for col in cols.clone() {
                        let src = ((row - y0) * data_w + (col - x0)) * self.pixel_stride;
                        let v = chunk[src];
                        out[(row - window.min_y) * out_w + (col - window.min_x)] =
                            match self.nodata {
                                Some(nd) if v == nd => f64::NAN,
                                _ => v,
                            };
                    }
                }
            }
        }

        debug!(?window, pixels = out.len(), "read raster window");
        Ok(out)
    }
}

/// Widen any decoded sample buffer to f64.
fn widen(result: DecodingResult) -> Option<Vec<f64>> {
    fn cast<T: Copy + Into<f64>>(v: Vec<T>) -> Vec<f64> {
        v.into_iter().map(Into::into).collect()
    }
    let out = match result {
        DecodingResult::U8(v) => cast(v),
        DecodingResult::U16(v) => cast(v),
        DecodingResult::U32(v) => cast(v),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => cast(v),
        DecodingResult::I16(v) => cast(v),
        DecodingResult::I32(v) => cast(v),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => cast(v),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(out)
}

enum GeoRefError {
    Tiff(tiff::TiffError),
    Invalid(String),
}

impl From<tiff::TiffError> for GeoRefError {
    fn from(e: tiff::TiffError) -> Self {
        GeoRefError::Tiff(e)
    }
}

fn find_f64s<R: io::Read + io::Seek>(
    decoder: &mut Decoder<R>,
    tag: u16,
) -> Result<Option<Vec<f64>>, tiff::TiffError> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(tag))?
        .map(|value| value.into_f64_vec())
        .transpose()
}

/// Affine transform from ModelPixelScale + ModelTiepoint, falling back to a
/// non-rotated ModelTransformation matrix.
fn read_transform<R: io::Read + io::Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
) -> Result<GeoTransform, GeoRefError> {
    let scale = find_f64s(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64s(decoder, MODEL_TIEPOINT)?;

    let gt = match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            // Tiepoint (i, j, k, x, y, z) pins raster (i, j) to model (x, y).
            let (res_x, res_y) = (s[0], -s[1]);
            GeoTransform {
                origin_x: t[3] - t[0] * res_x,
                origin_y: t[4] - t[1] * res_y,
                res_x,
                res_y,
                width,
                height,
            }
        }
        _ => {
            let Some(m) = find_f64s(decoder, MODEL_TRANSFORMATION)? else {
                return Err(GeoRefError::Invalid("missing GeoTIFF georeferencing tags".into()));
            };
            if m.len() < 16 {
                return Err(GeoRefError::Invalid("malformed ModelTransformation tag".into()));
            }
            if m[1] != 0.0 || m[4] != 0.0 {
                return Err(GeoRefError::Invalid("rotated rasters are not supported".into()));
            }
            GeoTransform { origin_x: m[3], origin_y: m[7], res_x: m[0], res_y: m[5], width, height }
        }
    };

    let usable = |r: f64| r.is_finite() && r != 0.0;
    if !usable(gt.res_x) || !usable(gt.res_y) || !gt.origin_x.is_finite() || !gt.origin_y.is_finite() {
        return Err(GeoRefError::Invalid(format!(
            "degenerate geotransform: origin ({}, {}), resolution ({}, {})",
            gt.origin_x, gt.origin_y, gt.res_x, gt.res_y
        )));
    }
    Ok(gt)
}

fn read_nodata<R: io::Read + io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Option<f64>, tiff::TiffError> {
    let Some(value) = decoder.find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    Ok(text.trim_matches(char::from(0)).trim().parse::<f64>().ok().filter(|v| !v.is_nan()))
}

// ── In-memory raster ─────────────────────────────────────────────────────────

/// A fully decoded single-band grid, row-major.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    transform: GeoTransform,
    data: Vec<f64>,
}

impl MemoryRaster {
    /// Returns `None` if `data` does not hold exactly `width * height` samples
    /// or the resolution is zero.
    pub fn new(transform: GeoTransform, data: Vec<f64>) -> Option<Self> {
        let sized = data.len() == transform.width * transform.height && !data.is_empty();
        let resolved = transform.res_x != 0.0 && transform.res_y != 0.0;
        (sized && resolved).then_some(Self { transform, data })
    }

    /// A raster filled with a single value.
    pub fn filled(transform: GeoTransform, fill: f64) -> Option<Self> {
        Self::new(transform, vec![fill; transform.width * transform.height])
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.transform.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.transform.width + col] = val;
    }
}

impl RasterSource for MemoryRaster {
    fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    fn read_window(&self, window: &PixelWindow) -> Result<Vec<f64>, RasterError> {
        check_window(window, &self.transform)?;
        let mut out = Vec::with_capacity(window.len());
        for row in window.min_y..=window.max_y {
            let start = row * self.transform.width;
            out.extend_from_slice(&self.data[start + window.min_x..=start + window.max_x]);
        }
        Ok(out)
    }
}
