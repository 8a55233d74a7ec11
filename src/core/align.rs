//! Bring two bands onto one pixel grid before band algebra
//!
//! Bands of a scene often come at different resolutions (10 m NIR, 20 m
//! SWIR). The coarser band is resampled onto the finer grid with nearest
//! neighbour sampling at pixel centres. Reprojection is not done here: a
//! CRS mismatch is an alignment error.

use crate::types::{BandArray, EoError, EoResult, GeoTransform, LoadedBand, SpatialReference};
use ndarray::{Array2, Zip};

/// Two bands sharing `spatial_ref`, in the order they were passed in
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub first: BandArray,
    pub second: BandArray,
    pub spatial_ref: SpatialReference,
}

/// Align `second` with `first` (or the other way round, whichever is finer)
pub fn align_bands(first: LoadedBand, second: LoadedBand) -> EoResult<AlignedPair> {
    if !first.spatial_ref.same_crs(&second.spatial_ref.crs) {
        return Err(EoError::alignment(
            "Bands use different coordinate reference systems",
            &first.spatial_ref.crs,
            &second.spatial_ref.crs,
        ));
    }

    if first.data.dim() == second.data.dim()
        && transforms_match(&first.spatial_ref.transform, &second.spatial_ref.transform)
    {
        return Ok(AlignedPair {
            first: first.data,
            second: second.data,
            spatial_ref: first.spatial_ref,
        });
    }

    let (t1, t2) = (&first.spatial_ref.transform, &second.spatial_ref.transform);
    if !(t1.is_north_up() && t2.is_north_up()) {
        return Err(EoError::alignment("Rotated band grids differ", t1, t2));
    }

    let second_is_finer = pixel_area(t2) < pixel_area(t1);
    let (target, source) = if second_is_finer { (&second, &first) } else { (&first, &second) };

    let target_bounds = target.bounds();
    let source_bounds = source.bounds();
    let tolerance = 0.5 * target.spatial_ref.transform.resolution().0.min(target.spatial_ref.transform.resolution().1);
    if !source_bounds.covers(&target_bounds, tolerance) {
        return Err(EoError::alignment(
            "Band extents are incompatible",
            target_bounds,
            source_bounds,
        ));
    }

    log::debug!(
        "Resampling {:?} band grid onto {:?}",
        source.data.dim(),
        target.data.dim()
    );
    let resampled = resample_nearest(
        &source.data,
        &source.spatial_ref.transform,
        &target.spatial_ref.transform,
        target.data.dim(),
    );

    let spatial_ref = target.spatial_ref.clone();
    if second_is_finer {
        Ok(AlignedPair { first: resampled, second: second.data, spatial_ref })
    } else {
        Ok(AlignedPair { first: first.data, second: resampled, spatial_ref })
    }
}

fn pixel_area(transform: &GeoTransform) -> f64 {
    let (x, y) = transform.resolution();
    x * y
}

fn transforms_match(a: &GeoTransform, b: &GeoTransform) -> bool {
    a.to_gdal().iter().zip(b.to_gdal().iter()).all(|(x, y)| {
        let scale = 1.0f64.max(x.abs()).max(y.abs());
        (x - y).abs() <= 1e-9 * scale
    })
}

/// Nearest-neighbour resample of `source` onto a grid of `target_shape`.
///
/// Target pixels whose centre falls outside the source are NaN.
pub fn resample_nearest(
    source: &Array2<f32>,
    source_transform: &GeoTransform,
    target_transform: &GeoTransform,
    target_shape: (usize, usize),
) -> Array2<f32> {
    let (source_rows, source_cols) = source.dim();
    let mut resampled = Array2::from_elem(target_shape, f32::NAN);

    let sample = |(i, j): (usize, usize), out: &mut f32| {
        let (x, y) = target_transform.pixel_to_world(j as f64 + 0.5, i as f64 + 0.5);
        if let Some((col, row)) = source_transform.world_to_pixel(x, y) {
            if col >= 0.0 && row >= 0.0 {
                let (c, r) = (col.floor() as usize, row.floor() as usize);
                if r < source_rows && c < source_cols {
                    *out = source[[r, c]];
                }
            }
        }
    };

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut resampled).par_for_each(sample);
    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut resampled).for_each(sample);

    resampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn band(data: Array2<f32>, transform: GeoTransform, crs: &str) -> LoadedBand {
        LoadedBand::new(data, SpatialReference::new(transform, crs))
    }

    #[test]
    fn test_identical_grids_pass_through() {
        let gt = GeoTransform::north_up(0.0, 2.0, 1.0, -1.0);
        let a = band(array![[1.0, 2.0], [3.0, 4.0]], gt, "EPSG:32631");
        let b = band(array![[5.0, 6.0], [7.0, 8.0]], gt, "epsg:32631");
        let pair = align_bands(a, b).unwrap();
        assert_eq!(pair.first, array![[1.0f32, 2.0], [3.0, 4.0]]);
        assert_eq!(pair.second, array![[5.0f32, 6.0], [7.0, 8.0]]);
        assert_eq!(pair.spatial_ref.transform, gt);
    }

    #[test]
    fn test_coarse_band_resampled_onto_fine_grid() {
        let fine = band(
            Array2::from_elem((4, 4), 1.0),
            GeoTransform::north_up(0.0, 40.0, 10.0, -10.0),
            "EPSG:32631",
        );
        let coarse = band(
            array![[0.1, 0.2], [0.3, 0.4]],
            GeoTransform::north_up(0.0, 40.0, 20.0, -20.0),
            "EPSG:32631",
        );
        let pair = align_bands(fine, coarse).unwrap();
        assert_eq!(pair.second.dim(), (4, 4));
        assert_eq!(pair.second[[0, 0]], 0.1);
        assert_eq!(pair.second[[1, 1]], 0.1);
        assert_eq!(pair.second[[0, 2]], 0.2);
        assert_eq!(pair.second[[3, 3]], 0.4);
        assert_eq!(pair.spatial_ref.transform.pixel_width, 10.0);
    }

    #[test]
    fn test_finer_second_band_keeps_order() {
        let coarse = band(
            array![[0.1, 0.2], [0.3, 0.4]],
            GeoTransform::north_up(0.0, 40.0, 20.0, -20.0),
            "EPSG:32631",
        );
        let fine = band(
            Array2::from_elem((4, 4), 1.0),
            GeoTransform::north_up(0.0, 40.0, 10.0, -10.0),
            "EPSG:32631",
        );
        let pair = align_bands(coarse, fine).unwrap();
        assert_eq!(pair.first[[3, 0]], 0.3);
        assert!(pair.second.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_crs_mismatch_rejected() {
        let gt = GeoTransform::north_up(0.0, 2.0, 1.0, -1.0);
        let a = band(Array2::zeros((2, 2)), gt, "EPSG:4326");
        let b = band(Array2::zeros((2, 2)), gt, "EPSG:32631");
        assert!(matches!(align_bands(a, b), Err(EoError::Alignment { .. })));
    }

    #[test]
    fn test_insufficient_coverage_rejected() {
        let fine = band(
            Array2::zeros((4, 4)),
            GeoTransform::north_up(0.0, 40.0, 10.0, -10.0),
            "EPSG:32631",
        );
        let shifted = band(
            Array2::zeros((2, 2)),
            GeoTransform::north_up(100.0, 40.0, 20.0, -20.0),
            "EPSG:32631",
        );
        assert!(matches!(align_bands(fine, shifted), Err(EoError::Alignment { .. })));
    }
}
