//! Moving region geometries between coordinate reference systems
//!
//! Regions of interest usually arrive in longitude/latitude while bands
//! are stored in a projected CRS (UTM for Sentinel-2). Geometries are
//! transformed vertex by vertex through GDAL/OGR.

use crate::types::{EoError, EoResult};
use gdal::errors::GdalError;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use geo::{Coord, LineString, MultiPolygon, Polygon};

/// Longitude/latitude on WGS84
pub const WGS84: &str = "EPSG:4326";

/// Spatial reference with x = easting/longitude whatever the authority axis order
fn traditional_order(definition: &str) -> Result<SpatialRef, GdalError> {
    let srs = SpatialRef::from_definition(definition)?;
    srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(srs)
}

fn untransformable(from: &str, to: &str, err: GdalError) -> EoError {
    EoError::alignment(
        format!("Cannot transform geometry between coordinate reference systems: {}", err),
        from,
        to,
    )
}

/// Transform `geometry` from CRS `from` into CRS `to`.
///
/// An empty CRS on either side means "unknown" and leaves the geometry
/// untouched. CRSs GDAL cannot build a transformation for are an
/// alignment error.
pub fn reproject_geometry(geometry: &MultiPolygon<f64>, from: &str, to: &str) -> EoResult<MultiPolygon<f64>> {
    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() || to.is_empty() || from.eq_ignore_ascii_case(to) {
        return Ok(geometry.clone());
    }

    log::debug!("Reprojecting geometry from {} to {}", from, to);
    let source = traditional_order(from).map_err(|e| untransformable(from, to, e))?;
    let target = traditional_order(to).map_err(|e| untransformable(from, to, e))?;
    let transform = CoordTransform::new(&source, &target).map_err(|e| untransformable(from, to, e))?;

    let polygons = geometry
        .iter()
        .map(|polygon| {
            let exterior = transform_ring(&transform, polygon.exterior())?;
            let interiors = polygon
                .interiors()
                .iter()
                .map(|ring| transform_ring(&transform, ring))
                .collect::<Result<Vec<_>, GdalError>>()?;
            Ok(Polygon::new(exterior, interiors))
        })
        .collect::<Result<Vec<_>, GdalError>>()
        .map_err(|e| untransformable(from, to, e))?;

    Ok(MultiPolygon::new(polygons))
}

fn transform_ring(transform: &CoordTransform, ring: &LineString<f64>) -> Result<LineString<f64>, GdalError> {
    let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
    let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
    let mut zs = vec![0.0; xs.len()];
    if !xs.is_empty() {
        transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
    }
    Ok(LineString::from(
        xs.into_iter().zip(ys).map(|(x, y)| Coord { x, y }).collect::<Vec<_>>(),
    ))
}
