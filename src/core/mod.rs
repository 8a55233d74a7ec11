//! Core index processing modules

pub mod align;
pub mod band_math;
pub mod mask;
pub mod processor;
pub mod reproject;
pub mod zonal;

// Re-export main types
pub use align::{align_bands, AlignedPair};
pub use band_math::{compute_index, nbr, ndmi, ndvi, ndwi, normalized_difference};
pub use mask::{geometry_mask, window_for_bounds};
pub use processor::{
    BandProvider, FailureKind, FailureReport, IndexProcessor, IndexRequest, ItemMetadata, ProcessingOutcome,
    ProcessingState, RegionOfInterest, RequestLifecycle,
};
pub use reproject::{reproject_geometry, WGS84};
pub use zonal::{ZonalReducer, ZoneStatistics};
