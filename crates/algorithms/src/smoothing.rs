//! Gaussian neighborhood mean
//!
//! Weighted mean of the cells around each output cell with weights
//! `exp(-d² / (2·radius²))`, where `d` is the distance between cell centers
//! in map units. The kernel is square with half-width
//! `ceil(radius / cell_size)` cells, so the standard deviation and the
//! cutoff are both controlled by the single `radius` parameter.
//!
//! The kernel is separable, so numerator and weight sums are each built
//! from one horizontal and one vertical pass. Renormalizing by the weight
//! sum makes masked cells and cells beyond the raster edge contribute no
//! weight.

use crate::maybe_rayon::*;
use ndarray::Array2;
use sei_core::raster::Raster;
use sei_core::{Error, Result};
use tracing::debug;

/// How masked input cells enter the weighted mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskPolicy {
    /// Masked cells carry no weight (mean of available values)
    #[default]
    Renormalize,
    /// Masked cells count as zero and keep their weight
    ZeroFill,
}

/// Which output cells are valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMask {
    /// Same validity as the input
    #[default]
    Input,
    /// Valid wherever at least one valid input cell lies under the kernel
    AnyContributor,
}

/// Parameters for the Gaussian neighborhood mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParams {
    /// Kernel standard deviation and cutoff, in map units
    pub radius: f64,
    pub mask_policy: MaskPolicy,
    pub output_mask: OutputMask,
}

impl GaussianParams {
    /// Default policies at the given radius
    pub fn with_radius(radius: f64) -> Self {
        Self {
            radius,
            mask_policy: MaskPolicy::default(),
            output_mask: OutputMask::default(),
        }
    }

    /// Kernel half-width in cells for a grid of `cell_size`.
    ///
    /// This is also the halo a tile needs for tiled results to match a
    /// whole-raster pass.
    pub fn half_width(&self, cell_size: f64) -> Result<usize> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(Error::InvalidParameter {
                name: "radius",
                value: self.radius.to_string(),
                reason: "must be a positive number of map units".into(),
            });
        }
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::InvalidParameter {
                name: "cell_size",
                value: cell_size.to_string(),
                reason: "raster has no usable cell size".into(),
            });
        }
        Ok((self.radius / cell_size).ceil() as usize)
    }

    /// One-dimensional weights for offsets `-hw..=hw`, unnormalized
    fn weights(&self, cell_size: f64, hw: usize) -> Vec<f64> {
        let two_sigma_sq = 2.0 * self.radius * self.radius;
        (0..=2 * hw)
            .map(|i| {
                let d = (i as f64 - hw as f64) * cell_size;
                (-(d * d) / two_sigma_sq).exp()
            })
            .collect()
    }
}

/// Gaussian-weighted neighborhood mean of `raster`
pub fn gaussian_mean(raster: &Raster<f64>, params: &GaussianParams) -> Result<Raster<f64>> {
    let cell_size = raster.cell_size();
    let hw = params.half_width(cell_size)?;
    let kernel = params.weights(cell_size, hw);
    let (rows, cols) = raster.shape();

    debug!(
        raster = raster.name(),
        radius = params.radius,
        half_width = hw,
        rows,
        cols,
        "Gaussian neighborhood mean"
    );

    let mask = raster.mask();
    let values = Array2::from_shape_fn((rows, cols), |(r, c)| {
        if mask[(r, c)] {
            raster.data()[(r, c)]
        } else {
            0.0
        }
    });
    let present = mask.mapv(|m| if m { 1.0 } else { 0.0 });

    let numerator = separable(&values, &kernel, hw);
    let contributors = separable(&present, &kernel, hw);
    let denominator = match params.mask_policy {
        MaskPolicy::Renormalize => contributors.clone(),
        MaskPolicy::ZeroFill => separable(&Array2::from_elem((rows, cols), 1.0), &kernel, hw),
    };

    let mut data = Array2::from_elem((rows, cols), f64::NAN);
    let mut valid = Array2::from_elem((rows, cols), false);
    for r in 0..rows {
        for c in 0..cols {
            let keep = match params.output_mask {
                OutputMask::Input => mask[(r, c)],
                OutputMask::AnyContributor => contributors[(r, c)] > 0.0,
            };
            let den = denominator[(r, c)];
            if keep && den > 0.0 {
                data[(r, c)] = numerator[(r, c)] / den;
                valid[(r, c)] = true;
            }
        }
    }

    raster.derive(data, valid)
}

/// Horizontal then vertical pass of a symmetric 1-D kernel, no padding
fn separable(input: &Array2<f64>, kernel: &[f64], hw: usize) -> Array2<f64> {
    let (rows, cols) = input.dim();

    let horizontal: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut out = vec![0.0; cols];
            for (col, o) in out.iter_mut().enumerate() {
                let lo = col.saturating_sub(hw);
                let hi = (col + hw).min(cols - 1);
                let mut sum = 0.0;
                for c in lo..=hi {
                    sum += kernel[c + hw - col] * input[(row, c)];
                }
                *o = sum;
            }
            out
        })
        .collect();
    let horizontal = Array2::from_shape_vec((rows, cols), horizontal)
        .unwrap_or_else(|_| Array2::zeros((rows, cols)));

    let vertical: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let lo = row.saturating_sub(hw);
            let hi = (row + hw).min(rows - 1);
            let mut out = vec![0.0; cols];
            for r in lo..=hi {
                let w = kernel[r + hw - row];
                for (col, o) in out.iter_mut().enumerate() {
                    *o += w * horizontal[(r, col)];
                }
            }
            out
        })
        .collect();
    Array2::from_shape_vec((rows, cols), vertical).unwrap_or_else(|_| Array2::zeros((rows, cols)))
}
