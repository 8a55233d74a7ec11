//! eostats: spectral index rasters and zonal statistics for optical imagery
//!
//! Computes normalized-difference indices (NDVI, NDWI, NBR, NDMI) from two
//! reflectance bands, persists them as GeoTIFF artifacts and reduces them
//! to min/max/mean over a region of interest, producing records for an
//! external catalog.

pub mod catalog;
pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use catalog::{CatalogSink, InMemoryCatalog, IndexRecord, UpsertOutcome};
pub use config::ProcessingConfig;
pub use types::{
    BandArray, BandId, BoundingBox, EoError, EoResult, GeoTransform, IndexKind, IndexRaster, LoadedBand,
    SpatialReference,
};

pub use crate::core::{
    BandProvider, IndexProcessor, ItemMetadata, ProcessingOutcome, RegionOfInterest, ZonalReducer,
    ZoneStatistics,
};
pub use io::{GdalBandProvider, RasterReader, RasterWriter, SidecarImporter};

#[cfg(feature = "python")]
mod python {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    fn to_py_err(err: EoError) -> PyErr {
        match err {
            EoError::Configuration(_) | EoError::Alignment { .. } => PyValueError::new_err(format!("{}", err)),
            _ => PyRuntimeError::new_err(format!("{}", err)),
        }
    }

    fn zone_from_rings(rings: Vec<Vec<(f64, f64)>>) -> MultiPolygon<f64> {
        MultiPolygon::new(
            rings
                .into_iter()
                .map(|ring| Polygon::new(LineString::from(ring), vec![]))
                .collect(),
        )
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(compute_index, m)?)?;
        m.add_function(wrap_pyfunction!(zone_statistics, m)?)?;
        m.add_function(wrap_pyfunction!(process_item, m)?)?;
        Ok(())
    }

    /// Compute an index from two aligned band arrays
    #[pyfunction]
    fn compute_index<'py>(
        py: Python<'py>,
        kind: &str,
        first: PyReadonlyArray2<f32>,
        second: PyReadonlyArray2<f32>,
    ) -> PyResult<&'py PyArray2<f32>> {
        let kind: IndexKind = kind.parse().map_err(to_py_err)?;
        let index = crate::core::compute_index(kind, first.as_array(), second.as_array()).map_err(to_py_err)?;
        Ok(index.into_pyarray(py))
    }

    /// (min, max, mean, valid_pixels) of a raster over polygons given as exterior rings
    #[pyfunction]
    #[pyo3(signature = (path, rings, all_touched = false))]
    fn zone_statistics(path: String, rings: Vec<Vec<(f64, f64)>>, all_touched: bool) -> PyResult<(f64, f64, f64, usize)> {
        let stats = ZonalReducer::with_all_touched(all_touched)
            .reduce_raster(&path, &zone_from_rings(rings))
            .map_err(to_py_err)?;
        Ok((stats.min, stats.max, stats.mean, stats.valid_pixels))
    }

    /// Run one index over a directory of `<asset>.tif` bands.
    ///
    /// Returns (source_item, index, min, max, mean, raster_reference).
    #[pyfunction]
    #[pyo3(signature = (item_id, band_dir, rings, crs, kind, storage_root = "media".to_string()))]
    fn process_item(
        item_id: String,
        band_dir: String,
        rings: Vec<Vec<(f64, f64)>>,
        crs: String,
        kind: &str,
        storage_root: String,
    ) -> PyResult<(String, String, f64, f64, f64, Option<String>)> {
        let processor = IndexProcessor::new(ProcessingConfig::with_storage_root(storage_root)).map_err(to_py_err)?;
        let provider = GdalBandProvider::from_directory(ItemMetadata::new(item_id), band_dir).map_err(to_py_err)?;
        let roi = RegionOfInterest::new(zone_from_rings(rings), crs);

        match processor.process_named(&provider, &roi, kind) {
            ProcessingOutcome::Completed(record) => Ok((
                record.source_item,
                record.index_kind.to_string(),
                record.min_value,
                record.max_value,
                record.mean_value,
                record.raster_reference,
            )),
            ProcessingOutcome::Skipped { source_item, reason } => {
                Err(PyValueError::new_err(format!("{} skipped: {}", source_item, reason)))
            }
            ProcessingOutcome::Failed(report) => Err(PyRuntimeError::new_err(format!(
                "{} failed at {}: {}",
                report.source_item, report.failed_at, report.message
            ))),
        }
    }
}
