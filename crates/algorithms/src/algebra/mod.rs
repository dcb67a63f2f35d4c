//! Raster algebra primitives
//!
//! - **band_math**: cell-by-cell arithmetic, comparisons and logic
//! - **remap**: exact-match categorical substitution
//! - **reduce**: region-wide statistics (percentiles, max, sum, ...)
//! - **resample**: explicit regridding onto a target grid

mod band_math;
mod reduce;
mod remap;
mod resample;

pub use band_math::{binary, clamp, map, map_valid, product, scalar, BinaryOp};
pub use reduce::{percentile_linear, reduce_region, Reducer, RegionStatistic};
pub use remap::{remap, RemapDefault};
pub use resample::{resample_to, ResampleMethod};

use sei_core::{Error, Raster, RasterElement, Result};

/// Build a raster on `template`'s grid from per-cell results, `None` = invalid
pub(crate) fn from_cells<T, U>(template: &Raster<T>, cells: Vec<Option<U>>) -> Result<Raster<U>>
where
    T: RasterElement,
    U: RasterElement,
{
    let (rows, cols) = template.shape();
    if cells.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }
    let mut data = Vec::with_capacity(cells.len());
    let mut valid = Vec::with_capacity(cells.len());
    for cell in cells {
        match cell {
            Some(v) if !v.is_nan_like() => {
                data.push(v);
                valid.push(true);
            }
            _ => {
                data.push(U::fill_value());
                valid.push(false);
            }
        }
    }
    let data = ndarray::Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    let valid = ndarray::Array2::from_shape_vec((rows, cols), valid)
        .map_err(|e| Error::Other(e.to_string()))?;
    template.derive(data, valid)
}
