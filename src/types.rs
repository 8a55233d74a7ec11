use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reflectance or index values (rows x cols), NaN marks no-data
pub type BandArray = Array2<f32>;

/// Index values constrained to [-1.0, 1.0], NaN marks no-data
pub type IndexRaster = Array2<f32>;

/// Logical band identifiers, independent of any provider's asset naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BandId {
    Nir,
    Red,
    Green,
    Swir,
    SwirAlt,
}

impl BandId {
    pub const ALL: [BandId; 5] = [BandId::Nir, BandId::Red, BandId::Green, BandId::Swir, BandId::SwirAlt];

    pub fn as_str(&self) -> &'static str {
        match self {
            BandId::Nir => "NIR",
            BandId::Red => "RED",
            BandId::Green => "GREEN",
            BandId::Swir => "SWIR",
            BandId::SwirAlt => "SWIR_ALT",
        }
    }
}

impl fmt::Display for BandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BandId {
    type Err = EoError;

    fn from_str(s: &str) -> EoResult<Self> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        BandId::ALL
            .iter()
            .copied()
            .find(|band| band.as_str() == normalized)
            .ok_or_else(|| EoError::Configuration(format!("Unknown band identifier: {}", s)))
    }
}

/// Normalized-difference spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexKind {
    /// Vegetation: (NIR - RED) / (NIR + RED)
    NDVI,
    /// Water: (GREEN - NIR) / (GREEN + NIR)
    NDWI,
    /// Burn severity: (NIR - SWIR) / (NIR + SWIR)
    NBR,
    /// Moisture: (NIR - SWIR_ALT) / (NIR + SWIR_ALT)
    NDMI,
}

impl IndexKind {
    pub const ALL: [IndexKind; 4] = [IndexKind::NDVI, IndexKind::NDWI, IndexKind::NBR, IndexKind::NDMI];

    /// Ordered band pair consumed by the kernel for this index.
    ///
    /// The first band is always NIR; the kernel decides which operand is
    /// subtracted from which.
    pub fn bands(&self) -> (BandId, BandId) {
        match self {
            IndexKind::NDVI => (BandId::Nir, BandId::Red),
            IndexKind::NDWI => (BandId::Nir, BandId::Green),
            IndexKind::NBR => (BandId::Nir, BandId::Swir),
            IndexKind::NDMI => (BandId::Nir, BandId::SwirAlt),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::NDVI => "NDVI",
            IndexKind::NDWI => "NDWI",
            IndexKind::NBR => "NBR",
            IndexKind::NDMI => "NDMI",
        }
    }

    fn supported() -> String {
        IndexKind::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = EoError;

    fn from_str(s: &str) -> EoResult<Self> {
        match s.trim().to_uppercase().as_str() {
            "NDVI" => Ok(IndexKind::NDVI),
            "NDWI" => Ok(IndexKind::NDWI),
            "NBR" => Ok(IndexKind::NBR),
            "NDMI" => Ok(IndexKind::NDMI),
            _ => Err(EoError::Configuration(format!(
                "Unsupported index type '{}' (supported: {})",
                s,
                IndexKind::supported()
            ))),
        }
    }
}

/// Axis-aligned extent in world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Overlapping part of two extents, `None` when they are disjoint
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let min_x = self.min_x.max(other.min_x);
        let min_y = self.min_y.max(other.min_y);
        let max_x = self.max_x.min(other.max_x);
        let max_y = self.max_y.min(other.max_y);
        if min_x < max_x && min_y < max_y {
            Some(BoundingBox { min_x, min_y, max_x, max_y })
        } else {
            None
        }
    }

    /// True if `other` lies inside this extent, allowing `tolerance` on each side
    pub fn covers(&self, other: &BoundingBox, tolerance: f64) -> bool {
        self.min_x <= other.min_x + tolerance
            && self.min_y <= other.min_y + tolerance
            && self.max_x >= other.max_x - tolerance
            && self.max_y >= other.max_y - tolerance
    }
}

impl From<geo::Rect<f64>> for BoundingBox {
    fn from(rect: geo::Rect<f64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        BoundingBox::new(min.x, min.y, max.x, max.y)
    }
}

/// Affine pixel -> world mapping, stored in GDAL coefficient order
///
/// ```text
/// x = top_left_x + col * pixel_width + row * rotation_x
/// y = top_left_y + col * rotation_y  + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// World coordinates of a fractional pixel position (col, row)
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel position (col, row) of a world coordinate
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (-self.rotation_y * dx + self.pixel_width * dy) / det;
        Some((col, row))
    }

    /// Transform of a sub-window starting at (row_off, col_off)
    pub fn window(&self, window: &PixelWindow) -> GeoTransform {
        let (x, y) = self.pixel_to_world(window.col_off as f64, window.row_off as f64);
        GeoTransform {
            top_left_x: x,
            top_left_y: y,
            ..*self
        }
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x.abs() < 1e-12 && self.rotation_y.abs() < 1e-12
    }

    /// Absolute pixel size (x, y)
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Extent covered by a grid of `shape` (rows, cols)
    pub fn bounds(&self, shape: (usize, usize)) -> BoundingBox {
        let (rows, cols) = (shape.0 as f64, shape.1 as f64);
        let corners = [
            self.pixel_to_world(0.0, 0.0),
            self.pixel_to_world(cols, 0.0),
            self.pixel_to_world(0.0, rows),
            self.pixel_to_world(cols, rows),
        ];
        let mut bbox = BoundingBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }
}

/// Georeferencing attached to every band and index array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialReference {
    pub transform: GeoTransform,
    /// CRS identifier, e.g. "EPSG:4326", or WKT
    pub crs: String,
}

impl SpatialReference {
    pub fn new(transform: GeoTransform, crs: impl Into<String>) -> Self {
        Self { transform, crs: crs.into() }
    }

    pub fn same_crs(&self, other: &str) -> bool {
        self.crs.trim().eq_ignore_ascii_case(other.trim())
    }

    /// Reference of a sub-window of this grid
    pub fn window(&self, window: &PixelWindow) -> SpatialReference {
        SpatialReference {
            transform: self.transform.window(window),
            crs: self.crs.clone(),
        }
    }
}

/// A band array together with its georeferencing
#[derive(Debug, Clone)]
pub struct LoadedBand {
    pub data: BandArray,
    pub spatial_ref: SpatialReference,
}

impl LoadedBand {
    pub fn new(data: BandArray, spatial_ref: SpatialReference) -> Self {
        Self { data, spatial_ref }
    }

    pub fn bounds(&self) -> BoundingBox {
        self.spatial_ref.transform.bounds(self.data.dim())
    }
}

/// Rectangular pixel region of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl PixelWindow {
    pub fn full(shape: (usize, usize)) -> Self {
        Self { row_off: 0, col_off: 0, rows: shape.0, cols: shape.1 }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

/// Error types for index processing
#[derive(Debug, thiserror::Error)]
pub enum EoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Alignment error: {message} (expected {expected}, got {actual})")]
    Alignment {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl EoError {
    pub fn alignment(message: impl Into<String>, expected: impl fmt::Debug, actual: impl fmt::Debug) -> Self {
        EoError::Alignment {
            message: message.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// I/O failures are worth retrying by the scheduler; everything else is fatal
    pub fn is_retryable(&self) -> bool {
        matches!(self, EoError::Io(_) | EoError::Gdal(_))
    }
}

/// Result type for index processing
pub type EoResult<T> = Result<T, EoError>;
