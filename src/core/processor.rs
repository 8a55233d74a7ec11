//! Index processing orchestration
//!
//! One request runs strictly in sequence:
//! `Requested -> BandsLoaded -> IndexComputed -> Persisted -> StatisticsReady`.
//! Any error moves the request to `Failed` and comes back as a
//! [`FailureReport`]; nothing escapes as a raw error.

use crate::catalog::IndexRecord;
use crate::config::ProcessingConfig;
use crate::core::align::align_bands;
use crate::core::band_math::compute_index;
use crate::core::mask::{apply_mask, crop, geometry_bounds, geometry_mask, window_for_bounds};
use crate::core::reproject::reproject_geometry;
use crate::core::zonal::{ZonalReducer, ZoneStatistics};
use crate::io::raster::{RasterReader, RasterWriter};
use crate::types::{BandId, BoundingBox, EoError, EoResult, IndexKind, LoadedBand, PixelWindow};
use chrono::NaiveDate;
use geo::{MultiPolygon, Polygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity and acquisition metadata of a source imagery item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: String,
    pub acquisition_date: Option<NaiveDate>,
    /// Cloud cover percentage reported by the provider
    pub cloud_cover: Option<f64>,
}

impl ItemMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            acquisition_date: None,
            cloud_cover: None,
        }
    }
}

/// Capability to fetch the bands of one imagery item.
///
/// Provider-specific adapters (STAC catalogues, local archives) implement
/// this; the processor never knows which one it talks to.
pub trait BandProvider: Send + Sync {
    fn item(&self) -> &ItemMetadata;

    /// Read logical `band`, stored under the provider asset name `asset`.
    ///
    /// `region` is the area the caller needs, in its own CRS; adapters may
    /// reproject it to limit the read or ignore it.
    fn read_band(&self, band: BandId, asset: &str, region: Option<&RegionOfInterest>) -> EoResult<LoadedBand>;
}

/// Geometry a request is computed for, with the CRS of its coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOfInterest {
    pub geometry: MultiPolygon<f64>,
    pub crs: String,
    /// Catalog identifier of the region or user zone
    pub reference: Option<String>,
}

impl RegionOfInterest {
    pub fn new(geometry: MultiPolygon<f64>, crs: impl Into<String>) -> Self {
        Self {
            geometry,
            crs: crs.into(),
            reference: None,
        }
    }

    pub fn from_polygon(polygon: Polygon<f64>, crs: impl Into<String>) -> Self {
        Self::new(MultiPolygon::new(vec![polygon]), crs)
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        geometry_bounds(&self.geometry)
    }

    /// The same region expressed in `crs`
    pub fn to_crs(&self, crs: &str) -> EoResult<RegionOfInterest> {
        if crs.trim().is_empty() || self.crs.trim().is_empty() {
            return Ok(self.clone());
        }
        Ok(RegionOfInterest {
            geometry: reproject_geometry(&self.geometry, &self.crs, crs)?,
            crs: crs.to_string(),
            reference: self.reference.clone(),
        })
    }
}

/// Stage of an index computation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingState {
    Requested,
    BandsLoaded,
    IndexComputed,
    Persisted,
    StatisticsReady,
    Failed,
}

impl ProcessingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::StatisticsReady | ProcessingState::Failed)
    }

    fn successor(&self) -> Option<ProcessingState> {
        match self {
            ProcessingState::Requested => Some(ProcessingState::BandsLoaded),
            ProcessingState::BandsLoaded => Some(ProcessingState::IndexComputed),
            ProcessingState::IndexComputed => Some(ProcessingState::Persisted),
            ProcessingState::Persisted => Some(ProcessingState::StatisticsReady),
            ProcessingState::StatisticsReady | ProcessingState::Failed => None,
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingState::Requested => "REQUESTED",
            ProcessingState::BandsLoaded => "BANDS_LOADED",
            ProcessingState::IndexComputed => "INDEX_COMPUTED",
            ProcessingState::Persisted => "PERSISTED",
            ProcessingState::StatisticsReady => "STATISTICS_READY",
            ProcessingState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Forward-only state tracker for one request
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    label: String,
    state: ProcessingState,
    failed_at: Option<ProcessingState>,
}

impl RequestLifecycle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: ProcessingState::Requested,
            failed_at: None,
        }
    }

    pub fn state(&self) -> ProcessingState {
        self.state
    }

    /// Last non-terminal state before the request failed
    pub fn failed_at(&self) -> Option<ProcessingState> {
        self.failed_at
    }

    /// Move to `next`, which must be the direct successor of the current state
    pub fn advance(&mut self, next: ProcessingState) -> EoResult<()> {
        if self.state.successor() != Some(next) {
            return Err(EoError::Processing(format!(
                "Invalid transition {} -> {} for {}",
                self.state, next, self.label
            )));
        }
        log::debug!("{}: {} -> {}", self.label, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Enter `Failed`, returning the state the failure happened in
    pub fn fail(&mut self) -> ProcessingState {
        if self.state != ProcessingState::Failed {
            self.failed_at = Some(self.state);
            self.state = ProcessingState::Failed;
        }
        self.failed_at.unwrap_or(ProcessingState::Requested)
    }
}

/// Category of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Configuration,
    Alignment,
    Io,
    InvalidData,
    Processing,
}

impl From<&EoError> for FailureKind {
    fn from(err: &EoError) -> Self {
        match err {
            EoError::Configuration(_) => FailureKind::Configuration,
            EoError::Alignment { .. } => FailureKind::Alignment,
            EoError::Io(_) | EoError::Gdal(_) => FailureKind::Io,
            EoError::InvalidFormat(_) => FailureKind::InvalidData,
            EoError::Processing(_) => FailureKind::Processing,
        }
    }
}

/// Structured description of a failed request for the catalog layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub source_item: String,
    pub index_kind: Option<IndexKind>,
    pub failed_at: ProcessingState,
    pub kind: FailureKind,
    pub message: String,
    /// The scheduler may resubmit the request from `Requested`
    pub retryable: bool,
}

impl FailureReport {
    fn from_error(source_item: &str, index_kind: Option<IndexKind>, failed_at: ProcessingState, err: &EoError) -> Self {
        Self {
            source_item: source_item.to_string(),
            index_kind,
            failed_at,
            kind: FailureKind::from(err),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Result of one request as seen by the catalog layer
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Completed(IndexRecord),
    Skipped { source_item: String, reason: String },
    Failed(FailureReport),
}

impl ProcessingOutcome {
    pub fn record(&self) -> Option<&IndexRecord> {
        match self {
            ProcessingOutcome::Completed(record) => Some(record),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            ProcessingOutcome::Failed(report) => Some(report),
            _ => None,
        }
    }
}

/// One entry of a batch submitted to [`IndexProcessor::process_batch`]
#[derive(Clone, Copy)]
pub struct IndexRequest<'a> {
    pub item: &'a dyn BandProvider,
    pub roi: &'a RegionOfInterest,
    pub kind: IndexKind,
}

/// Computes, persists and summarises spectral indices
#[derive(Debug, Clone)]
pub struct IndexProcessor {
    config: ProcessingConfig,
    writer: RasterWriter,
    reducer: ZonalReducer,
}

impl IndexProcessor {
    pub fn new(config: ProcessingConfig) -> EoResult<Self> {
        config.validate()?;
        let writer = RasterWriter::from_config(&config);
        let reducer = ZonalReducer::with_all_touched(config.all_touched);
        Ok(Self { config, writer, reducer })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Location on disk of a stored raster reference
    pub fn resolve_reference(&self, key: &str) -> PathBuf {
        self.config.storage_root.join(key)
    }

    /// Compute `kind` for `item` over `roi`
    pub fn process(&self, item: &dyn BandProvider, roi: &RegionOfInterest, kind: IndexKind) -> ProcessingOutcome {
        let item_id = item.item().id.clone();
        let mut lifecycle = RequestLifecycle::new(format!("{}/{}", item_id, kind));
        log::info!("Processing {} for item {}", kind, item_id);

        match self.run(item, roi, kind, &mut lifecycle) {
            Ok(record) => {
                log::info!(
                    "{} for {} done: min={:.4} max={:.4} mean={:.4}{}",
                    kind,
                    item_id,
                    record.min_value,
                    record.max_value,
                    record.mean_value,
                    if record.degenerate { " (degenerate zone)" } else { "" }
                );
                ProcessingOutcome::Completed(record)
            }
            Err(err) => {
                let failed_at = lifecycle.fail();
                log::error!("{} for {} failed at {}: {}", kind, item_id, failed_at, err);
                ProcessingOutcome::Failed(FailureReport::from_error(&item_id, Some(kind), failed_at, &err))
            }
        }
    }

    /// Like [`process`](Self::process) with the index given by name
    pub fn process_named(&self, item: &dyn BandProvider, roi: &RegionOfInterest, kind: &str) -> ProcessingOutcome {
        match kind.parse::<IndexKind>() {
            Ok(kind) => self.process(item, roi, kind),
            Err(err) => {
                log::error!("Rejected request for {}: {}", item.item().id, err);
                ProcessingOutcome::Failed(FailureReport::from_error(
                    &item.item().id,
                    None,
                    ProcessingState::Requested,
                    &err,
                ))
            }
        }
    }

    /// Run independent requests on the rayon pool.
    ///
    /// Items above the configured cloud cover threshold are skipped.
    pub fn process_batch(&self, requests: &[IndexRequest<'_>]) -> Vec<ProcessingOutcome> {
        log::info!("Processing batch of {} requests", requests.len());
        requests
            .par_iter()
            .map(|request| {
                let meta = request.item.item();
                match (meta.cloud_cover, self.config.max_cloud_cover) {
                    (Some(cover), Some(limit)) if cover > limit => {
                        log::info!("Skipping {}: cloud cover {:.1}% above {:.1}%", meta.id, cover, limit);
                        ProcessingOutcome::Skipped {
                            source_item: meta.id.clone(),
                            reason: format!("cloud cover {:.1}% exceeds {:.1}%", cover, limit),
                        }
                    }
                    _ => self.process(request.item, request.roi, request.kind),
                }
            })
            .collect()
    }

    /// Statistics of a persisted index raster inside `zone`
    pub fn zone_statistics<P: AsRef<Path>>(
        &self,
        raster: P,
        zone: &RegionOfInterest,
    ) -> Result<ZoneStatistics, FailureReport> {
        let raster = raster.as_ref();
        let label = raster.display().to_string();
        self.reduce_zone(raster, zone).map_err(|err| {
            log::error!("Zone statistics for {} failed: {}", label, err);
            FailureReport::from_error(&label, None, ProcessingState::Persisted, &err)
        })
    }

    fn reduce_zone(&self, raster: &Path, zone: &RegionOfInterest) -> EoResult<ZoneStatistics> {
        let (_, spatial_ref) = RasterReader::describe(raster)?;
        let zone = zone.to_crs(&spatial_ref.crs)?;
        let stats = self.reducer.reduce_raster(raster, &zone.geometry)?;
        if stats.degenerate {
            log::warn!("Zone {:?} has no valid pixels in {}", zone.reference, raster.display());
        }
        Ok(stats)
    }

    fn run(
        &self,
        item: &dyn BandProvider,
        roi: &RegionOfInterest,
        kind: IndexKind,
        lifecycle: &mut RequestLifecycle,
    ) -> EoResult<IndexRecord> {
        let meta = item.item();
        if roi.bounds().is_none() {
            return Err(EoError::InvalidFormat("Region of interest has no extent".to_string()));
        }

        let (first_band, second_band) = kind.bands();
        let first = self.load_band(item, first_band, roi)?;
        let second = self.load_band(item, second_band, roi)?;

        let aligned = align_bands(first, second)?;
        let roi = roi.to_crs(&aligned.spatial_ref.crs)?;
        let roi_bounds = roi
            .bounds()
            .ok_or_else(|| EoError::InvalidFormat("Region of interest has no extent".to_string()))?;

        let window = window_for_bounds(&aligned.spatial_ref.transform, aligned.first.dim(), &roi_bounds)
            .ok_or_else(|| {
                EoError::alignment(
                    format!("Region of interest does not intersect item {}", meta.id),
                    aligned.spatial_ref.transform.bounds(aligned.first.dim()),
                    roi_bounds,
                )
            })?;
        let first = crop(aligned.first.view(), &window);
        let second = crop(aligned.second.view(), &window);
        let spatial_ref = aligned.spatial_ref.window(&window);
        log::debug!("Cropped bands to {:?}", window);
        lifecycle.advance(ProcessingState::BandsLoaded)?;

        let mut index = compute_index(kind, first.view(), second.view())?;
        let inside = geometry_mask(
            &spatial_ref.transform,
            &PixelWindow::full(index.dim()),
            &roi.geometry,
            self.config.all_touched,
        );
        apply_mask(&mut index, &inside);
        lifecycle.advance(ProcessingState::IndexComputed)?;

        let artifact = self.writer.write(&index, &spatial_ref, kind, &meta.id)?;
        lifecycle.advance(ProcessingState::Persisted)?;

        let stats = self.reducer.reduce_array(&index, &spatial_ref, &roi.geometry);
        lifecycle.advance(ProcessingState::StatisticsReady)?;

        Ok(IndexRecord {
            source_item: meta.id.clone(),
            index_kind: kind,
            min_value: stats.min,
            max_value: stats.max,
            mean_value: stats.mean,
            raster_reference: Some(artifact.key),
            acquisition_date: meta.acquisition_date,
            region_reference: roi.reference.clone(),
            degenerate: stats.degenerate,
        })
    }

    fn load_band(&self, item: &dyn BandProvider, band: BandId, region: &RegionOfInterest) -> EoResult<LoadedBand> {
        let asset = self.config.asset_for(band)?;
        let mut loaded = item.read_band(band, asset, Some(region))?;
        log::debug!(
            "Loaded {} ({}) for {}: {:?}",
            band,
            asset,
            item.item().id,
            loaded.data.dim()
        );
        if let Some(scale) = self.config.reflectance_scale {
            loaded.data.mapv_inplace(|v| v / scale);
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandArray, GeoTransform, SpatialReference};
    use approx::assert_abs_diff_eq;
    use geo::polygon;
    use ndarray::{array, Array2};
    use std::collections::HashMap;

    struct MemoryProvider {
        meta: ItemMetadata,
        bands: HashMap<String, BandArray>,
        spatial_ref: SpatialReference,
        fail_io: bool,
    }

    impl MemoryProvider {
        fn new(id: &str, bands: Vec<(&str, BandArray)>) -> Self {
            Self {
                meta: ItemMetadata {
                    id: id.to_string(),
                    acquisition_date: NaiveDate::from_ymd_opt(2024, 7, 14),
                    cloud_cover: Some(4.0),
                },
                bands: bands.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                spatial_ref: SpatialReference::new(GeoTransform::north_up(10.0, 37.0, 0.001, -0.001), "EPSG:4326"),
                fail_io: false,
            }
        }
    }

    impl BandProvider for MemoryProvider {
        fn item(&self) -> &ItemMetadata {
            &self.meta
        }

        fn read_band(&self, _band: BandId, asset: &str, _region: Option<&RegionOfInterest>) -> EoResult<LoadedBand> {
            if self.fail_io {
                return Err(EoError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "remote read timed out")));
            }
            let data = self
                .bands
                .get(asset)
                .cloned()
                .ok_or_else(|| EoError::alignment("Missing band", asset, self.bands.keys().collect::<Vec<_>>()))?;
            Ok(LoadedBand::new(data, self.spatial_ref.clone()))
        }
    }

    fn covering_roi() -> RegionOfInterest {
        RegionOfInterest::from_polygon(
            polygon![
                (x: 9.99, y: 36.99),
                (x: 10.01, y: 36.99),
                (x: 10.01, y: 37.01),
                (x: 9.99, y: 37.01),
            ],
            "EPSG:4326",
        )
        .with_reference("nabeul")
    }

    fn processor(root: &Path) -> IndexProcessor {
        IndexProcessor::new(ProcessingConfig::with_storage_root(root)).unwrap()
    }

    #[test]
    fn test_end_to_end_ndvi() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MemoryProvider::new(
            "S2B_T32SPF_20240714",
            vec![("B08", array![[0.5f32, 0.4]]), ("B04", array![[0.1f32, 0.4]])],
        );

        let outcome = processor(dir.path()).process(&provider, &covering_roi(), IndexKind::NDVI);
        let record = outcome.record().expect("request should complete");

        assert_abs_diff_eq!(record.min_value, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(record.max_value, 2.0 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(record.mean_value, 1.0 / 3.0, epsilon = 1e-6);
        assert!(!record.degenerate);
        assert_eq!(record.region_reference.as_deref(), Some("nabeul"));
        assert_eq!(record.acquisition_date, NaiveDate::from_ymd_opt(2024, 7, 14));

        let key = record.raster_reference.as_ref().unwrap();
        assert!(key.starts_with("indices/NDVI_S2B_T32SPF_20240714_"));
        assert!(dir.path().join(key).exists());
    }

    #[test]
    fn test_unknown_index_name_fails_at_request() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MemoryProvider::new("item", vec![]);
        let outcome = processor(dir.path()).process_named(&provider, &covering_roi(), "SAVI");
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Configuration);
        assert_eq!(failure.failed_at, ProcessingState::Requested);
        assert!(failure.message.contains("NDVI, NDWI, NBR, NDMI"));
        assert!(!failure.retryable);
    }

    #[test]
    fn test_missing_band_fails_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MemoryProvider::new("item", vec![("B08", array![[0.5f32]])]);
        let outcome = processor(dir.path()).process(&provider, &covering_roi(), IndexKind::NDWI);
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Alignment);
        assert_eq!(failure.failed_at, ProcessingState::Requested);
        assert!(!dir.path().join("indices").exists());
    }

    #[test]
    fn test_io_failure_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = MemoryProvider::new("item", vec![]);
        provider.fail_io = true;
        let outcome = processor(dir.path()).process(&provider, &covering_roi(), IndexKind::NBR);
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Io);
        assert!(failure.retryable);
    }

    #[test]
    fn test_all_nodata_zone_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MemoryProvider::new(
            "item",
            vec![("B08", array![[0.0f32, 0.0]]), ("B12", array![[0.0f32, 0.0]])],
        );
        let outcome = processor(dir.path()).process(&provider, &covering_roi(), IndexKind::NBR);
        let record = outcome.record().unwrap();
        assert!(record.degenerate);
        assert_eq!((record.min_value, record.max_value, record.mean_value), (-1.0, 1.0, 0.0));
        assert!(record.raster_reference.is_some());
    }

    #[test]
    fn test_lon_lat_roi_over_utm_bands() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = MemoryProvider::new(
            "S2B_T32SPF_20240714",
            vec![
                ("B08", Array2::from_elem((4, 4), 0.5f32)),
                ("B04", Array2::from_elem((4, 4), 0.1f32)),
            ],
        );
        provider.spatial_ref =
            SpatialReference::new(GeoTransform::north_up(500000.0, 4100000.0, 10.0, -10.0), "EPSG:32632");

        let utm_zone = MultiPolygon::new(vec![polygon![
            (x: 500001.0, y: 4099961.0),
            (x: 500039.0, y: 4099961.0),
            (x: 500039.0, y: 4099999.0),
            (x: 500001.0, y: 4099999.0),
        ]]);
        let lon_lat = reproject_geometry(&utm_zone, "EPSG:32632", crate::core::reproject::WGS84).unwrap();
        let roi = RegionOfInterest::new(lon_lat, "EPSG:4326");

        let outcome = processor(dir.path()).process(&provider, &roi, IndexKind::NDVI);
        let record = outcome.record().expect("lon/lat region over UTM bands should complete");
        assert_abs_diff_eq!(record.mean_value, 2.0 / 3.0, epsilon = 1e-6);
        assert!(!record.degenerate);

        let stats = processor(dir.path())
            .zone_statistics(dir.path().join(record.raster_reference.as_ref().unwrap()), &roi)
            .expect("lon/lat zone over a UTM artifact should reduce");
        assert_eq!(stats.valid_pixels, 16);
    }

    #[test]
    fn test_untransformable_roi_crs_is_alignment_failure() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MemoryProvider::new(
            "item",
            vec![("B08", array![[0.5f32]]), ("B04", array![[0.1f32]])],
        );
        let mut roi = covering_roi();
        roi.crs = "NOT-A-CRS".to_string();
        let outcome = processor(dir.path()).process(&provider, &roi, IndexKind::NDVI);
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Alignment);
        assert!(!failure.retryable);
    }

    #[test]
    fn test_batch_skips_cloudy_items() {
        let dir = tempfile::tempdir().unwrap();
        let clear = MemoryProvider::new(
            "clear",
            vec![("B08", array![[0.5f32, 0.4]]), ("B04", array![[0.1f32, 0.4]])],
        );
        let mut cloudy = MemoryProvider::new("cloudy", vec![]);
        cloudy.meta.cloud_cover = Some(80.0);
        let roi = covering_roi();

        let requests = [
            IndexRequest { item: &clear, roi: &roi, kind: IndexKind::NDVI },
            IndexRequest { item: &cloudy, roi: &roi, kind: IndexKind::NDVI },
        ];
        let outcomes = processor(dir.path()).process_batch(&requests);
        assert!(outcomes[0].record().is_some());
        assert!(matches!(&outcomes[1], ProcessingOutcome::Skipped { source_item, .. } if source_item == "cloudy"));
    }

    #[test]
    fn test_lifecycle_is_forward_only() {
        let mut lifecycle = RequestLifecycle::new("item/NDVI");
        assert!(lifecycle.advance(ProcessingState::IndexComputed).is_err());
        lifecycle.advance(ProcessingState::BandsLoaded).unwrap();
        lifecycle.advance(ProcessingState::IndexComputed).unwrap();
        assert!(lifecycle.advance(ProcessingState::BandsLoaded).is_err());
        assert_eq!(lifecycle.fail(), ProcessingState::IndexComputed);
        assert_eq!(lifecycle.state(), ProcessingState::Failed);
        assert!(lifecycle.state().is_terminal());
        assert!(lifecycle.advance(ProcessingState::Persisted).is_err());
    }
}
