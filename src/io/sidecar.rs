//! Import of precomputed index statistics from GDAL PAM sidecars
//!
//! Rasters produced by external tooling come with `<name>.tif.aux.xml`
//! files holding `STATISTICS_MINIMUM/MAXIMUM/MEAN` metadata items. The file
//! name carries tile, acquisition time, index and resolution, e.g.
//! `T32SPF_20230115T101301_ndvi_10m.tif.aux.xml`. Values are stored scaled
//! by 10000 and are divided back on import.

use crate::catalog::{CatalogSink, IndexRecord, UpsertOutcome};
use crate::types::{EoError, EoResult, IndexKind};
use chrono::NaiveDateTime;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Divisor applied to sidecar statistics (reflectance-scaled products)
pub const STATISTICS_SCALE: f64 = 10000.0;

const SIDECAR_SUFFIX: &str = ".tif.aux.xml";

const NAME_PATTERN: &str =
    r"(?i)^(?P<tile>T\d{2}[A-Z]{3})_(?P<datetime>\d{8}T\d{6})_(?P<index>[a-z]+)_(?P<resolution>\d+m)\.tif(?:\.aux)?(?:\.xml)?$";

/// PAM dataset document, only the parts holding metadata items
#[derive(Debug, Deserialize)]
struct PamDataset {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PamMetadata>,
    #[serde(rename = "PAMRasterBand", default)]
    bands: Vec<PamRasterBand>,
}

#[derive(Debug, Deserialize)]
struct PamRasterBand {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PamMetadata>,
}

#[derive(Debug, Deserialize)]
struct PamMetadata {
    #[serde(rename = "MDI", default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    #[serde(rename = "@key")]
    key: String,
    #[serde(rename = "$text", default)]
    value: String,
}

/// Raw (unscaled) statistics read from a sidecar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SidecarStatistics {
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
}

/// Parse the statistics items of a PAM document.
///
/// Returns `Ok(None)` when any of minimum, maximum or mean is missing or
/// not numeric.
pub fn parse_statistics(xml: &str) -> EoResult<Option<SidecarStatistics>> {
    let doc: PamDataset =
        from_str(xml).map_err(|e| EoError::InvalidFormat(format!("Failed to parse PAM sidecar: {}", e)))?;

    let items = doc
        .metadata
        .iter()
        .chain(doc.bands.iter().flat_map(|band| band.metadata.iter()))
        .flat_map(|metadata| metadata.items.iter());

    let (mut minimum, mut maximum, mut mean) = (None, None, None);
    for item in items {
        let slot = match item.key.as_str() {
            "STATISTICS_MINIMUM" => &mut minimum,
            "STATISTICS_MAXIMUM" => &mut maximum,
            "STATISTICS_MEAN" => &mut mean,
            _ => continue,
        };
        match item.value.trim().parse::<f64>() {
            Ok(value) => *slot = Some(value),
            Err(_) => log::warn!("Could not convert {} value '{}'", item.key, item.value),
        }
    }

    Ok(match (minimum, maximum, mean) {
        (Some(minimum), Some(maximum), Some(mean)) => Some(SidecarStatistics { minimum, maximum, mean }),
        _ => None,
    })
}

/// Fields encoded in a sidecar file name
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarName {
    pub tile: String,
    pub acquired: NaiveDateTime,
    pub index: IndexKind,
    pub resolution: String,
}

impl SidecarName {
    /// Catalog identity of the scene, `{tile}_{YYYYmmdd}_{resolution}`
    pub fn source_item(&self) -> String {
        format!("{}_{}_{}", self.tile, self.acquired.format("%Y%m%d"), self.resolution)
    }
}

/// Summary of one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Walks directories of sidecars and turns them into catalog records
#[derive(Debug, Clone)]
pub struct SidecarImporter {
    pattern: Regex,
    region_reference: Option<String>,
}

impl SidecarImporter {
    pub fn new() -> EoResult<Self> {
        let pattern = Regex::new(NAME_PATTERN)
            .map_err(|e| EoError::Configuration(format!("Invalid sidecar name pattern: {}", e)))?;
        Ok(Self {
            pattern,
            region_reference: None,
        })
    }

    /// Attach every imported record to this catalog region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region_reference = Some(region.into());
        self
    }

    /// Decode a sidecar file name; `None` if it does not follow the naming scheme
    pub fn parse_name(&self, file_name: &str) -> Option<SidecarName> {
        let captures = self.pattern.captures(file_name)?;
        let acquired = NaiveDateTime::parse_from_str(&captures["datetime"], "%Y%m%dT%H%M%S").ok()?;
        let index = match captures["index"].parse::<IndexKind>() {
            Ok(index) => index,
            Err(_) => {
                log::warn!("Unsupported index '{}' in {}", &captures["index"], file_name);
                return None;
            }
        };
        Some(SidecarName {
            tile: captures["tile"].to_uppercase(),
            acquired,
            index,
            resolution: captures["resolution"].to_lowercase(),
        })
    }

    /// Record for one sidecar, `None` when the file is not importable
    pub fn record_for(&self, path: &Path) -> EoResult<Option<IndexRecord>> {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return Ok(None),
        };
        let name = match self.parse_name(file_name) {
            Some(name) => name,
            None => return Ok(None),
        };

        let xml = fs::read_to_string(path)?;
        let stats = match parse_statistics(&xml)? {
            Some(stats) => stats,
            None => {
                log::warn!("Missing required statistics in {}", file_name);
                return Ok(None);
            }
        };

        let raster = path.with_file_name(raster_file_name(file_name));
        Ok(Some(IndexRecord {
            source_item: name.source_item(),
            index_kind: name.index,
            min_value: stats.minimum / STATISTICS_SCALE,
            max_value: stats.maximum / STATISTICS_SCALE,
            mean_value: stats.mean / STATISTICS_SCALE,
            raster_reference: Some(raster.display().to_string()),
            acquisition_date: Some(name.acquired.date()),
            region_reference: self.region_reference.clone(),
            degenerate: false,
        }))
    }

    /// Records for every importable sidecar below `root`.
    ///
    /// Unreadable or malformed sidecars are logged and skipped.
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> EoResult<Vec<IndexRecord>> {
        let mut records = Vec::new();
        for path in find_sidecars(root.as_ref())? {
            match self.record_for(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => log::warn!("Skipping {}: {}", path.display(), err),
            }
        }
        Ok(records)
    }

    /// Upsert every importable sidecar below `root` into `sink`
    pub fn import<P: AsRef<Path>>(&self, root: P, sink: &mut dyn CatalogSink) -> EoResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        for path in find_sidecars(root.as_ref())? {
            summary.scanned += 1;
            let record = match self.record_for(&path) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(err) => {
                    log::warn!("Skipping {}: {}", path.display(), err);
                    summary.skipped += 1;
                    continue;
                }
            };

            log::info!(
                "Imported {} for {} (mean {:.4})",
                record.index_kind,
                record.source_item,
                record.mean_value
            );
            match sink.upsert(record)? {
                UpsertOutcome::Created => summary.created += 1,
                UpsertOutcome::Updated => summary.updated += 1,
            }
        }
        Ok(summary)
    }
}

/// Name of the raster a sidecar describes, `X.tif.aux.xml` -> `X.tif`
fn raster_file_name(sidecar: &str) -> &str {
    const AUX_SUFFIX: &str = ".aux.xml";
    let split = sidecar.len().saturating_sub(AUX_SUFFIX.len());
    match (sidecar.get(..split), sidecar.get(split..)) {
        (Some(stem), Some(suffix)) if suffix.eq_ignore_ascii_case(AUX_SUFFIX) => stem,
        _ => sidecar,
    }
}

fn is_sidecar(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(SIDECAR_SUFFIX)
}

/// All `*.tif.aux.xml` files below `root`, sorted.
///
/// Symbolic links are not followed.
pub fn find_sidecars(root: &Path) -> EoResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| EoError::Io(e.into()))?;
        if entry.file_type().is_file() && entry.file_name().to_str().map_or(false, is_sidecar) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}
