use crate::config::ProcessingConfig;
use crate::types::{BandArray, EoError, EoResult, GeoTransform, IndexKind, IndexRaster, PixelWindow, SpatialReference};
use chrono::{DateTime, Utc};
use gdal::raster::{Buffer, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Storage reference of a published index raster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Absolute or root-relative location on disk
    pub path: PathBuf,
    /// Key relative to the storage root, e.g. `indices/NDVI_S2A_..._20240101T101500_000123.tif`
    pub key: String,
}

/// Persists index rasters as single-band Float32 GeoTIFFs.
///
/// Files are written into a staging directory first and then linked into
/// place without overwriting, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct RasterWriter {
    storage_root: PathBuf,
    prefix: String,
    staging_dir: PathBuf,
    compression: Option<String>,
}

const MAX_NAME_ATTEMPTS: usize = 1000;

impl RasterWriter {
    pub fn new<P: Into<PathBuf>>(storage_root: P, prefix: &str) -> Self {
        let storage_root = storage_root.into();
        let staging_dir = storage_root.join(".staging");
        Self {
            storage_root,
            prefix: prefix.to_string(),
            staging_dir,
            compression: None,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            storage_root: config.storage_root.clone(),
            prefix: config.artifact_prefix.clone(),
            staging_dir: config.staging_dir(),
            compression: config.compression.clone(),
        }
    }

    pub fn with_compression(mut self, compression: Option<&str>) -> Self {
        self.compression = compression.map(str::to_string);
        self
    }

    /// Staging must live on the same filesystem as the storage root
    pub fn with_staging_dir<P: Into<PathBuf>>(mut self, staging_dir: P) -> Self {
        self.staging_dir = staging_dir.into();
        self
    }

    /// `{KIND}_{item}_{YYYYmmddTHHMMSS_micros}.tif`
    pub fn artifact_name(kind: IndexKind, item_id: &str, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}.tif",
            kind,
            sanitize(item_id),
            timestamp.format("%Y%m%dT%H%M%S_%6f")
        )
    }

    /// Persist `raster` named after `kind`, `item_id` and the current time
    pub fn write(
        &self,
        raster: &IndexRaster,
        spatial_ref: &SpatialReference,
        kind: IndexKind,
        item_id: &str,
    ) -> EoResult<ArtifactRef> {
        self.write_at(raster, spatial_ref, kind, item_id, Utc::now())
    }

    pub fn write_at(
        &self,
        raster: &IndexRaster,
        spatial_ref: &SpatialReference,
        kind: IndexKind,
        item_id: &str,
        timestamp: DateTime<Utc>,
    ) -> EoResult<ArtifactRef> {
        let (height, width) = raster.dim();
        if height == 0 || width == 0 {
            return Err(EoError::Processing(format!(
                "Refusing to persist empty {} raster for {}",
                kind, item_id
            )));
        }

        let target_dir = self.storage_root.join(&self.prefix);
        fs::create_dir_all(&target_dir)?;
        fs::create_dir_all(&self.staging_dir)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".eostats-")
            .suffix(".tif")
            .tempfile_in(&self.staging_dir)?;
        log::debug!("Staging {} raster at {}", kind, staged.path().display());

        write_geotiff(staged.path(), raster, spatial_ref, self.compression.as_deref())?;

        let name = Self::artifact_name(kind, item_id, timestamp);
        let stem = name.trim_end_matches(".tif").to_string();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                name.clone()
            } else {
                format!("{}_{}.tif", stem, attempt)
            };
            let target = target_dir.join(&file_name);

            match staged.persist_noclobber(&target) {
                Ok(_) => {
                    log::info!("Published {} raster: {}", kind, target.display());
                    return Ok(ArtifactRef {
                        path: target,
                        key: format!("{}/{}", self.prefix, file_name),
                    });
                }
                Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    log::debug!("Artifact name {} taken, trying next suffix", file_name);
                    staged = err.file;
                }
                Err(err) => return Err(EoError::Io(err.error)),
            }
        }

        Err(EoError::Processing(format!(
            "Could not find a free artifact name for {}",
            name
        )))
    }
}

fn sanitize(item_id: &str) -> String {
    item_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// Write a single-band Float32 GeoTIFF with NaN as its no-data value
pub fn write_geotiff<P: AsRef<Path>>(
    path: P,
    raster: &Array2<f32>,
    spatial_ref: &SpatialReference,
    compression: Option<&str>,
) -> EoResult<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = raster.dim();

    let options: Vec<RasterCreationOption> = compression
        .map(|value| RasterCreationOption { key: "COMPRESS", value })
        .into_iter()
        .collect();

    let mut dataset = driver.create_with_band_type_with_options::<f32, _>(
        path.as_ref(),
        width as isize,
        height as isize,
        1,
        &options,
    )?;

    dataset.set_geo_transform(&spatial_ref.transform.to_gdal())?;
    if !spatial_ref.crs.trim().is_empty() {
        dataset.set_spatial_ref(&SpatialRef::from_definition(&spatial_ref.crs)?)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    rasterband.set_no_data_value(Some(f64::NAN))?;

    let flat_data: Vec<f32> = raster.iter().copied().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;

    Ok(())
}

/// Read-only access to single-band rasters
pub struct RasterReader;

impl RasterReader {
    /// Shape (rows, cols) and georeferencing without reading pixels
    pub fn describe<P: AsRef<Path>>(path: P) -> EoResult<((usize, usize), SpatialReference)> {
        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        Ok(((height, width), spatial_reference(&dataset)?))
    }

    /// Read the whole first band; stored no-data becomes NaN
    pub fn read<P: AsRef<Path>>(path: P) -> EoResult<(BandArray, SpatialReference)> {
        let (shape, _) = Self::describe(path.as_ref())?;
        Self::read_window(path, &PixelWindow::full(shape))
    }

    /// Read `window` of the first band with the georeferencing of that window
    pub fn read_window<P: AsRef<Path>>(path: P, window: &PixelWindow) -> EoResult<(BandArray, SpatialReference)> {
        log::debug!("Reading {:?} from {}", window, path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        if window.row_off + window.rows > height || window.col_off + window.cols > width {
            return Err(EoError::alignment(
                format!("Read window outside raster {}", path.as_ref().display()),
                (height, width),
                window,
            ));
        }

        let rasterband = dataset.rasterband(1)?;
        let nodata = rasterband.no_data_value();
        let buffer = rasterband.read_as::<f32>(
            (window.col_off as isize, window.row_off as isize),
            (window.cols, window.rows),
            (window.cols, window.rows),
            None,
        )?;

        let mut data = Array2::from_shape_vec((window.rows, window.cols), buffer.data)
            .map_err(|e| EoError::InvalidFormat(format!("Failed to reshape raster data: {}", e)))?;

        if let Some(nodata) = nodata.filter(|v| !v.is_nan()) {
            let nodata = nodata as f32;
            data.mapv_inplace(|v| if v == nodata { f32::NAN } else { v });
        }

        let spatial_ref = spatial_reference(&dataset)?.window(window);
        Ok((data, spatial_ref))
    }
}

fn spatial_reference(dataset: &Dataset) -> EoResult<SpatialReference> {
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let crs = match dataset.spatial_ref() {
        Ok(mut srs) => {
            // Identification is best-effort; WKT is the fallback
            let _ = srs.auto_identify_epsg();
            match (srs.auth_name(), srs.auth_code()) {
                (Ok(name), Ok(code)) => format!("{}:{}", name, code),
                _ => srs.to_wkt().unwrap_or_default(),
            }
        }
        Err(_) => String::new(),
    };
    Ok(SpatialReference { transform, crs })
}
