//! Explicit regridding
//!
//! Nothing in the pipeline resamples implicitly: an input that arrives on
//! a different grid either fails the alignment check or is passed through
//! `resample_to` by the caller, which logs the change of resolution.

use super::from_cells;
use crate::maybe_rayon::*;
use sei_core::raster::Raster;
use sei_core::{Error, GridSpec, Result};
use tracing::info;

/// Resampling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleMethod {
    /// Value of the source cell containing the target cell center
    #[default]
    Nearest,
    /// Mean of the valid source cells whose centers fall in the target cell
    Mean,
}

/// Resample `raster` onto `target`.
///
/// Target cells outside the source extent are invalid. With
/// `ResampleMethod::Mean` a target cell smaller than the source cells
/// falls back to the nearest source cell. Rasters in a CRS other than
/// the target's are rejected.
pub fn resample_to(raster: &Raster<f64>, target: &GridSpec, method: ResampleMethod) -> Result<Raster<f64>> {
    if let (Some(from), Some(to)) = (raster.crs(), target.crs.as_ref()) {
        if !from.is_equivalent(to) {
            return Err(Error::CrsMismatch {
                left: raster.name().to_string(),
                right: "target grid".to_string(),
                left_crs: from.identifier(),
                right_crs: to.identifier(),
            });
        }
    }
    info!(
        raster = raster.name(),
        from_cell = raster.cell_size(),
        to_cell = target.cell_size(),
        from_shape = ?raster.shape(),
        to_shape = ?target.shape(),
        ?method,
        "Resampling raster onto target grid"
    );

    let template: Raster<f64> = Raster::on_grid(target, 0.0).named(raster.name());
    let (rows, cols) = target.shape();
    let src_t = *raster.transform();
    let dst_t = target.transform;
    let (src_rows, src_cols) = raster.shape();

    let nearest = |x: f64, y: f64| -> Option<f64> {
        let (c, r) = src_t.geo_to_pixel(x, y);
        if !(c >= 0.0 && r >= 0.0) {
            return None;
        }
        let (c, r) = (c.floor() as usize, r.floor() as usize);
        if r >= src_rows || c >= src_cols {
            return None;
        }
        raster.value(r, c)
    };

    let cells: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let (x, y) = dst_t.pixel_to_geo(col, row);
                *cell = match method {
                    ResampleMethod::Nearest => nearest(x, y),
                    ResampleMethod::Mean => {
                        let (c0, r0) = src_t.geo_to_pixel(
                            x - dst_t.pixel_width.abs() / 2.0,
                            y + dst_t.pixel_height.abs() / 2.0,
                        );
                        let (c1, r1) = src_t.geo_to_pixel(
                            x + dst_t.pixel_width.abs() / 2.0,
                            y - dst_t.pixel_height.abs() / 2.0,
                        );
                        // centers at index + 0.5 inside [lo, hi)
                        let lo_c = (c0.min(c1) - 0.5).ceil().max(0.0) as usize;
                        let hi_c = ((c0.max(c1) - 0.5).ceil().max(0.0) as usize).min(src_cols);
                        let lo_r = (r0.min(r1) - 0.5).ceil().max(0.0) as usize;
                        let hi_r = ((r0.max(r1) - 0.5).ceil().max(0.0) as usize).min(src_rows);

                        let mut sum = 0.0;
                        let mut n = 0usize;
                        let mut covered = false;
                        for r in lo_r..hi_r {
                            for c in lo_c..hi_c {
                                covered = true;
                                if let Some(v) = raster.value(r, c) {
                                    sum += v;
                                    n += 1;
                                }
                            }
                        }
                        if n > 0 {
                            Some(sum / n as f64)
                        } else if covered {
                            None
                        } else {
                            nearest(x, y)
                        }
                    }
                };
            }
            row_data
        })
        .collect();

    from_cells(&template, cells)
}
