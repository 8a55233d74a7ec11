//! Raster and sidecar I/O

pub mod provider;
pub mod raster;
pub mod sidecar;

pub use provider::GdalBandProvider;
pub use raster::{write_geotiff, ArtifactRef, RasterReader, RasterWriter};
pub use sidecar::{ImportSummary, SidecarImporter, SidecarName, SidecarStatistics};
