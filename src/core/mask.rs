//! Geometry-driven cropping and masking of georeferenced grids

use crate::types::{BoundingBox, GeoTransform, PixelWindow};
use geo::{BoundingRect, Coord, Intersects, LineString, MultiPolygon, Point, Polygon};
use ndarray::{s, Array2, ArrayView2, Zip};

/// Extent of a geometry, `None` for an empty geometry
pub fn geometry_bounds(geometry: &MultiPolygon<f64>) -> Option<BoundingBox> {
    geometry.bounding_rect().map(BoundingBox::from)
}

/// Pixel window of a `shape` grid that covers `bbox`, clipped to the grid.
///
/// Returns `None` when the extent misses the grid entirely.
pub fn window_for_bounds(
    transform: &GeoTransform,
    shape: (usize, usize),
    bbox: &BoundingBox,
) -> Option<PixelWindow> {
    const EPS: f64 = 1e-9;
    let (rows, cols) = shape;

    let corners = [
        (bbox.min_x, bbox.min_y),
        (bbox.min_x, bbox.max_y),
        (bbox.max_x, bbox.min_y),
        (bbox.max_x, bbox.max_y),
    ];
    let mut col_range = (f64::INFINITY, f64::NEG_INFINITY);
    let mut row_range = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let (col, row) = transform.world_to_pixel(x, y)?;
        col_range = (col_range.0.min(col), col_range.1.max(col));
        row_range = (row_range.0.min(row), row_range.1.max(row));
    }

    let col_start = (col_range.0 + EPS).floor().max(0.0);
    let col_end = (col_range.1 - EPS).ceil().min(cols as f64);
    let row_start = (row_range.0 + EPS).floor().max(0.0);
    let row_end = (row_range.1 - EPS).ceil().min(rows as f64);

    if !(col_start < col_end && row_start < row_end) {
        return None;
    }

    Some(PixelWindow {
        row_off: row_start as usize,
        col_off: col_start as usize,
        rows: (row_end - row_start) as usize,
        cols: (col_end - col_start) as usize,
    })
}

/// Boolean mask (true = inside) of `window` within the grid described by `transform`.
///
/// A pixel is inside when its centre lies in or on the geometry, or with
/// `all_touched` when any part of the pixel overlaps it.
pub fn geometry_mask(
    transform: &GeoTransform,
    window: &PixelWindow,
    geometry: &MultiPolygon<f64>,
    all_touched: bool,
) -> Array2<bool> {
    let mut mask = Array2::from_elem(window.shape(), false);
    let bounds = match geometry_bounds(geometry) {
        Some(bounds) => bounds,
        None => return mask,
    };

    let zip = Zip::indexed(&mut mask);
    let test = |(r, c): (usize, usize), inside: &mut bool| {
        let row = (window.row_off + r) as f64;
        let col = (window.col_off + c) as f64;
        *inside = if all_touched {
            let footprint = pixel_footprint(transform, col, row);
            footprint
                .bounding_rect()
                .map_or(false, |rect| overlaps_bounds(&rect, &bounds))
                && geometry.intersects(&footprint)
        } else {
            let (x, y) = transform.pixel_to_world(col + 0.5, row + 0.5);
            x >= bounds.min_x
                && x <= bounds.max_x
                && y >= bounds.min_y
                && y <= bounds.max_y
                && geometry.intersects(&Point::new(x, y))
        };
    };

    #[cfg(feature = "parallel")]
    zip.par_for_each(test);
    #[cfg(not(feature = "parallel"))]
    zip.for_each(test);

    mask
}

fn overlaps_bounds(rect: &geo::Rect<f64>, bounds: &BoundingBox) -> bool {
    rect.min().x <= bounds.max_x
        && rect.max().x >= bounds.min_x
        && rect.min().y <= bounds.max_y
        && rect.max().y >= bounds.min_y
}

fn pixel_footprint(transform: &GeoTransform, col: f64, row: f64) -> Polygon<f64> {
    let corner = |dc: f64, dr: f64| {
        let (x, y) = transform.pixel_to_world(col + dc, row + dr);
        Coord { x, y }
    };
    Polygon::new(
        LineString::from(vec![
            corner(0.0, 0.0),
            corner(1.0, 0.0),
            corner(1.0, 1.0),
            corner(0.0, 1.0),
            corner(0.0, 0.0),
        ]),
        vec![],
    )
}

/// Owned copy of `window` from `array`
pub fn crop(array: ArrayView2<'_, f32>, window: &PixelWindow) -> Array2<f32> {
    array
        .slice(s![
            window.row_off..window.row_off + window.rows,
            window.col_off..window.col_off + window.cols
        ])
        .to_owned()
}

/// Set every pixel outside `mask` to NaN
pub fn apply_mask(array: &mut Array2<f32>, mask: &Array2<bool>) {
    Zip::from(array).and(mask).for_each(|value, &inside| {
        if !inside {
            *value = f32::NAN;
        }
    });
}
