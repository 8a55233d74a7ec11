//! Zonal statistics over a geometry
//!
//! Reduces the pixels of an index raster that fall inside a polygon to
//! min/max/mean. No-data pixels and pixels outside the geometry are not
//! part of the population. When nothing valid remains, the fixed fallback
//! {-1, 1, 0} is returned with `degenerate` set instead of an error, so the
//! catalog can always store a record.

use crate::core::mask::{geometry_bounds, geometry_mask, window_for_bounds};
use crate::io::raster::RasterReader;
use crate::types::{EoResult, IndexRaster, PixelWindow, SpatialReference};
use geo::MultiPolygon;
use ndarray::Zip;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Summary statistics of the valid pixels in a zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid_pixels: usize,
    /// No valid pixel in the zone; min/max/mean hold the fallback constants
    pub degenerate: bool,
}

impl ZoneStatistics {
    pub const FALLBACK_MIN: f64 = -1.0;
    pub const FALLBACK_MAX: f64 = 1.0;
    pub const FALLBACK_MEAN: f64 = 0.0;

    pub fn fallback() -> Self {
        Self {
            min: Self::FALLBACK_MIN,
            max: Self::FALLBACK_MAX,
            mean: Self::FALLBACK_MEAN,
            valid_pixels: 0,
            degenerate: true,
        }
    }
}

/// Reduce a population of values, skipping NaN
pub fn statistics_of<T, I>(values: I) -> ZoneStatistics
where
    T: Float,
    I: IntoIterator<Item = T>,
{
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for value in values {
        if value.is_nan() {
            continue;
        }
        let v = match value.to_f64() {
            Some(v) => v,
            None => continue,
        };
        count += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }

    if count == 0 {
        return ZoneStatistics::fallback();
    }

    ZoneStatistics {
        min,
        max,
        mean: sum / count as f64,
        valid_pixels: count,
        degenerate: false,
    }
}

/// Masks rasters by geometry and reduces them to `ZoneStatistics`
#[derive(Debug, Clone, Default)]
pub struct ZonalReducer {
    all_touched: bool,
}

impl ZonalReducer {
    /// Reducer using the pixel-centre inclusion rule
    pub fn new() -> Self {
        Self { all_touched: false }
    }

    /// Reducer including every pixel the geometry touches when `all_touched` is set
    pub fn with_all_touched(all_touched: bool) -> Self {
        Self { all_touched }
    }

    /// Statistics of an in-memory raster restricted to `geometry`
    pub fn reduce_array(
        &self,
        raster: &IndexRaster,
        spatial_ref: &SpatialReference,
        geometry: &MultiPolygon<f64>,
    ) -> ZoneStatistics {
        let window = match self.zone_window(spatial_ref, raster.dim(), geometry) {
            Some(window) => window,
            None => return self.degenerate(),
        };

        let mask = geometry_mask(&spatial_ref.transform, &window, geometry, self.all_touched);
        let view = raster.slice(ndarray::s![
            window.row_off..window.row_off + window.rows,
            window.col_off..window.col_off + window.cols
        ]);

        let mut inside = Vec::with_capacity(window.rows * window.cols);
        Zip::from(&view).and(&mask).for_each(|&value, &keep| {
            if keep {
                inside.push(value);
            }
        });

        self.finish(statistics_of(inside))
    }

    /// Statistics of a persisted raster restricted to `geometry`.
    ///
    /// Only the window covering the geometry's extent is read; the dataset
    /// is opened read-only.
    pub fn reduce_raster<P: AsRef<Path>>(&self, path: P, geometry: &MultiPolygon<f64>) -> EoResult<ZoneStatistics> {
        let path = path.as_ref();
        log::debug!("Zonal statistics for {}", path.display());

        let (shape, spatial_ref) = RasterReader::describe(path)?;
        let window = match self.zone_window(&spatial_ref, shape, geometry) {
            Some(window) => window,
            None => return Ok(self.degenerate()),
        };

        let (data, _) = RasterReader::read_window(path, &window)?;
        let local_ref = spatial_ref.window(&window);
        Ok(self.reduce_array(&data, &local_ref, geometry))
    }

    fn zone_window(
        &self,
        spatial_ref: &SpatialReference,
        shape: (usize, usize),
        geometry: &MultiPolygon<f64>,
    ) -> Option<PixelWindow> {
        let bounds = geometry_bounds(geometry)?;
        let window = window_for_bounds(&spatial_ref.transform, shape, &bounds);
        if let Some(w) = &window {
            log::debug!("Zone window {:?} of raster {:?}", w, shape);
        }
        window
    }

    fn degenerate(&self) -> ZoneStatistics {
        log::warn!("Zone does not overlap the raster, using fallback statistics");
        ZoneStatistics::fallback()
    }

    fn finish(&self, stats: ZoneStatistics) -> ZoneStatistics {
        if stats.degenerate {
            log::warn!("No valid pixels inside zone, using fallback statistics");
        }
        stats
    }
}
