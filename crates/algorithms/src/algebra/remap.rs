//! Categorical remapping
//!
//! Exact-match substitution of class codes, used to collapse decile
//! classes and to densify transition codes.

use super::from_cells;
use crate::maybe_rayon::*;
use sei_core::raster::Raster;
use sei_core::{Error, Result};

/// What happens to valid cells whose value is not in the `from` list
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemapDefault {
    /// Keep the original value
    PassThrough,
    /// Mark the cell invalid
    Mask,
    /// Replace with a constant
    Value(f64),
}

/// Replace every occurrence of `from[i]` with `to[i]`.
///
/// # Example
/// ```ignore
/// // Collapse deciles into core (1), grow (2) and other (3)
/// let class3 = remap(
///     &class10,
///     &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
///     &[3.0, 3.0, 3.0, 2.0, 2.0, 2.0, 2.0, 2.0, 1.0, 1.0],
///     RemapDefault::Mask,
/// )?;
/// ```
pub fn remap(raster: &Raster<f64>, from: &[f64], to: &[f64], default: RemapDefault) -> Result<Raster<f64>> {
    if from.len() != to.len() {
        return Err(Error::InvalidParameter {
            name: "remap",
            value: format!("{} -> {}", from.len(), to.len()),
            reason: "from and to lists must have the same length".into(),
        });
    }
    let (rows, cols) = raster.shape();

    let cells: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let Some(v) = raster.value(row, col) else {
                    continue;
                };
                *cell = match from.iter().position(|&f| f == v) {
                    Some(i) => Some(to[i]),
                    None => match default {
                        RemapDefault::PassThrough => Some(v),
                        RemapDefault::Mask => None,
                        RemapDefault::Value(d) => Some(d),
                    },
                };
            }
            row_data
        })
        .collect();

    from_cells(raster, cells)
}
