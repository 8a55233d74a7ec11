use crate::core::mask::window_for_bounds;
use crate::core::processor::{BandProvider, ItemMetadata, RegionOfInterest};
use crate::io::raster::RasterReader;
use crate::types::{BandId, EoError, EoResult, LoadedBand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Band provider over local single-band GeoTIFFs, one file per asset
#[derive(Debug, Clone)]
pub struct GdalBandProvider {
    meta: ItemMetadata,
    assets: BTreeMap<String, PathBuf>,
}

impl GdalBandProvider {
    pub fn new(meta: ItemMetadata) -> Self {
        Self {
            meta,
            assets: BTreeMap::new(),
        }
    }

    pub fn with_asset<P: Into<PathBuf>>(mut self, asset: &str, path: P) -> Self {
        self.assets.insert(asset.to_string(), path.into());
        self
    }

    /// Register every `<asset>.tif` / `<asset>.tiff` file found in `dir`
    pub fn from_directory<P: AsRef<Path>>(meta: ItemMetadata, dir: P) -> EoResult<Self> {
        let mut provider = Self::new(meta);
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_tiff = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"));
            if !is_tiff {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                provider.assets.insert(stem.to_string(), path.clone());
            }
        }
        log::debug!(
            "Item {} assets in {}: {:?}",
            provider.meta.id,
            dir.as_ref().display(),
            provider.assets.keys().collect::<Vec<_>>()
        );
        Ok(provider)
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }
}

impl BandProvider for GdalBandProvider {
    fn item(&self) -> &ItemMetadata {
        &self.meta
    }

    fn read_band(&self, band: BandId, asset: &str, region: Option<&RegionOfInterest>) -> EoResult<LoadedBand> {
        let path = self.assets.get(asset).ok_or_else(|| {
            EoError::alignment(
                format!("Item {} has no asset {} for band {}", self.meta.id, asset, band),
                asset,
                self.assets.keys().collect::<Vec<_>>(),
            )
        })?;

        let (data, spatial_ref) = match region {
            Some(region) => {
                let (shape, spatial_ref) = RasterReader::describe(path)?;
                let local = region.to_crs(&spatial_ref.crs)?;
                let bounds = local.bounds().ok_or_else(|| {
                    EoError::InvalidFormat("Region of interest has no extent".to_string())
                })?;
                let window = window_for_bounds(&spatial_ref.transform, shape, &bounds).ok_or_else(|| {
                    EoError::alignment(
                        format!("Requested extent does not intersect {}", path.display()),
                        spatial_ref.transform.bounds(shape),
                        bounds,
                    )
                })?;
                RasterReader::read_window(path, &window)?
            }
            None => RasterReader::read(path)?,
        };

        Ok(LoadedBand::new(data, spatial_ref))
    }
}
