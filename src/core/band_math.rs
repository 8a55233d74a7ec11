//! Normalized-difference band algebra
//!
//! Every kernel computes `(x - y) / (x + y)` pixel by pixel. Pixels where
//! the denominator is not strictly positive, or where either input is
//! no-data, come out as NaN. Results are clamped to [-1, 1].

use crate::types::{EoError, EoResult, IndexKind, IndexRaster};
use ndarray::{Array2, ArrayView2, Zip};

/// `(a - b) / (a + b)` with the no-data and clamping rules above
pub fn normalized_difference(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> EoResult<IndexRaster> {
    if a.dim() != b.dim() {
        return Err(EoError::alignment("Band shapes differ", a.dim(), b.dim()));
    }

    let mut output = Array2::from_elem(a.dim(), f32::NAN);
    let zip = Zip::from(&mut output).and(&a).and(&b);

    #[cfg(feature = "parallel")]
    zip.par_for_each(|out, &x, &y| *out = normalized_pixel(x, y));
    #[cfg(not(feature = "parallel"))]
    zip.for_each(|out, &x, &y| *out = normalized_pixel(x, y));

    Ok(output)
}

#[inline]
fn normalized_pixel(x: f32, y: f32) -> f32 {
    let denominator = x + y;
    // NaN operands fail this comparison as well
    if denominator > 0.0 {
        ((x - y) / denominator).clamp(-1.0, 1.0)
    } else {
        f32::NAN
    }
}

/// Normalized Difference Vegetation Index: `(NIR - RED) / (NIR + RED)`
pub fn ndvi(nir: ArrayView2<'_, f32>, red: ArrayView2<'_, f32>) -> EoResult<IndexRaster> {
    normalized_difference(nir, red)
}

/// Normalized Difference Water Index (McFeeters): `(GREEN - NIR) / (GREEN + NIR)`
///
/// Takes NIR first like the other kernels; the operands are swapped internally.
pub fn ndwi(nir: ArrayView2<'_, f32>, green: ArrayView2<'_, f32>) -> EoResult<IndexRaster> {
    normalized_difference(green, nir)
}

/// Normalized Burn Ratio: `(NIR - SWIR) / (NIR + SWIR)`
pub fn nbr(nir: ArrayView2<'_, f32>, swir: ArrayView2<'_, f32>) -> EoResult<IndexRaster> {
    normalized_difference(nir, swir)
}

/// Normalized Difference Moisture Index: `(NIR - SWIR) / (NIR + SWIR)` on the alternate SWIR band
pub fn ndmi(nir: ArrayView2<'_, f32>, swir_alt: ArrayView2<'_, f32>) -> EoResult<IndexRaster> {
    normalized_difference(nir, swir_alt)
}

/// Compute `kind` from the band pair given in `IndexKind::bands()` order
pub fn compute_index(
    kind: IndexKind,
    first: ArrayView2<'_, f32>,
    second: ArrayView2<'_, f32>,
) -> EoResult<IndexRaster> {
    log::debug!("Computing {} over {:?} pixels", kind, first.dim());
    match kind {
        IndexKind::NDVI => ndvi(first, second),
        IndexKind::NDWI => ndwi(first, second),
        IndexKind::NBR => nbr(first, second),
        IndexKind::NDMI => ndmi(first, second),
    }
}
