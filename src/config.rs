//! Processing configuration handed to the index processor at construction

use crate::types::{BandId, EoError, EoResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Settings for one index processor instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Directory receiving published index rasters
    pub storage_root: PathBuf,
    /// Sub-directory of `storage_root` for index artifacts
    pub artifact_prefix: String,
    /// Staging directory for in-progress writes (defaults to `<storage_root>/.staging`)
    pub staging_dir: Option<PathBuf>,
    /// GeoTIFF COMPRESS creation option
    pub compression: Option<String>,
    /// Provider asset name for each logical band
    pub band_assets: BTreeMap<BandId, String>,
    /// Divisor applied to raw reflectance when bands are loaded
    pub reflectance_scale: Option<f32>,
    /// Items with a higher cloud cover percentage are skipped in batches
    pub max_cloud_cover: Option<f64>,
    /// Include every pixel touched by the geometry, not just those whose centre is inside
    pub all_touched: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("media"),
            artifact_prefix: "indices".to_string(),
            staging_dir: None,
            compression: Some("DEFLATE".to_string()),
            band_assets: sentinel2_assets(),
            reflectance_scale: None,
            max_cloud_cover: Some(30.0),
            all_touched: false,
        }
    }
}

/// Sentinel-2 L2A asset names
pub fn sentinel2_assets() -> BTreeMap<BandId, String> {
    BTreeMap::from([
        (BandId::Nir, "B08".to_string()),
        (BandId::Red, "B04".to_string()),
        (BandId::Green, "B03".to_string()),
        (BandId::Swir, "B12".to_string()),
        (BandId::SwirAlt, "B11".to_string()),
    ])
}

impl ProcessingConfig {
    pub fn with_storage_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    /// Directory artifacts are published into
    pub fn artifact_dir(&self) -> PathBuf {
        self.storage_root.join(&self.artifact_prefix)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| self.storage_root.join(".staging"))
    }

    /// Provider asset name for a logical band
    pub fn asset_for(&self, band: BandId) -> EoResult<&str> {
        self.band_assets
            .get(&band)
            .map(String::as_str)
            .ok_or_else(|| EoError::Configuration(format!("No asset mapping for band {}", band)))
    }

    pub fn validate(&self) -> EoResult<()> {
        if self.artifact_prefix.contains("..") {
            return Err(EoError::Configuration(format!(
                "Artifact prefix must stay inside the storage root: {}",
                self.artifact_prefix
            )));
        }
        for (band, asset) in &self.band_assets {
            if asset.trim().is_empty() {
                return Err(EoError::Configuration(format!("Empty asset name for band {}", band)));
            }
        }
        if let Some(scale) = self.reflectance_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(EoError::Configuration(format!("Reflectance scale must be positive, got {}", scale)));
            }
        }
        if let Some(cloud) = self.max_cloud_cover {
            if !(0.0..=100.0).contains(&cloud) {
                return Err(EoError::Configuration(format!("Cloud cover threshold out of range: {}", cloud)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProcessingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.asset_for(BandId::Nir).unwrap(), "B08");
        assert_eq!(config.asset_for(BandId::SwirAlt).unwrap(), "B11");
        assert_eq!(config.artifact_dir(), PathBuf::from("media").join("indices"));
        assert_eq!(config.staging_dir(), PathBuf::from("media").join(".staging"));
    }

    #[test]
    fn test_missing_asset_mapping() {
        let mut config = ProcessingConfig::default();
        config.band_assets.remove(&BandId::Green);
        assert!(matches!(config.asset_for(BandId::Green), Err(EoError::Configuration(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ProcessingConfig::default();
        config.reflectance_scale = Some(0.0);
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::default();
        config.max_cloud_cover = Some(140.0);
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::default();
        config.band_assets.insert(BandId::Red, " ".to_string());
        assert!(config.validate().is_err());
    }
}
