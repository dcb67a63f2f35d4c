//! Habitat-suitability (Q-curve) transform
//!
//! Each consecutive pair of rows `(x_i, x_{i+1})` defines a half-open bin
//! `[x_i, x_{i+1})` inside which the input is rescaled linearly onto
//! `[q_i, q_{i+1}]`. Bins are disjoint, so a value lands in at most one
//! and an interior breakpoint returns exactly its own row's quality.

use super::calibration::{Ecoregion, EcoregionCodes, QCurve};
use crate::algebra::{binary, map, scalar, BinaryOp};
use sei_core::raster::Raster;
use sei_core::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Behavior outside `[x_0, x_{n-1})`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveBoundary {
    /// Below `x_0` takes `q_0`; at or above `x_{n-1}` takes `q_{n-1}`
    #[default]
    Clamp,
    /// Values that fall in no bin yield 0
    Strict,
}

impl QCurve {
    /// Quality of `x` in the given ecoregion's column
    pub fn evaluate(&self, x: f64, eco: Ecoregion, boundary: CurveBoundary) -> f64 {
        let rows = self.rows();
        let col = eco.column();
        let (lo, hi) = self.domain();

        if x < lo {
            return match boundary {
                CurveBoundary::Clamp => rows[0].q[col],
                CurveBoundary::Strict => 0.0,
            };
        }
        if x >= hi {
            return match boundary {
                CurveBoundary::Clamp => rows[rows.len() - 1].q[col],
                CurveBoundary::Strict => 0.0,
            };
        }

        // first row whose breakpoint exceeds x closes the bin
        let upper = rows.partition_point(|r| r.x <= x);
        let (a, b) = (&rows[upper - 1], &rows[upper]);
        let t = (x - a.x) / (b.x - a.x);
        a.q[col] + t * (b.q[col] - a.q[col])
    }
}

/// Apply a Q-curve column to every valid cell
pub fn hsi_transform(
    raster: &Raster<f64>,
    curve: &QCurve,
    eco: Ecoregion,
    boundary: CurveBoundary,
) -> Result<Raster<f64>> {
    map(raster, |v| curve.evaluate(v, eco, boundary))
}

/// Inputs shared by the per-variable quality layers
pub struct QualityContext<'a> {
    /// Ecoregion code per cell; invalid outside all ecoregions
    pub ecoregions: &'a Raster<f64>,
    /// 1 on rangeland, invalid elsewhere
    pub rangeland: &'a Raster<f64>,
    pub codes: &'a EcoregionCodes,
    pub floor: f64,
    pub boundary: CurveBoundary,
}

/// Quality band for one variable, merged over ecoregions.
///
/// Per ecoregion: curve column, floored at `floor`, times the rangeland
/// mask, clipped to the ecoregion and zero-filled. The ecoregion results
/// are folded with an elementwise max, starting from zero, so a cell
/// outside every ecoregion or off rangeland ends up 0.
pub fn quality_layer(input: &Raster<f64>, curve: &QCurve, ctx: &QualityContext<'_>) -> Result<Raster<f64>> {
    input.ensure_aligned(ctx.ecoregions)?;
    input.ensure_aligned(ctx.rangeland)?;

    let zero = input.like(0.0);
    Ecoregion::ALL.iter().try_fold(zero, |merged, &eco| {
        let code = ctx.codes.code(eco) as f64;
        debug!(raster = input.name(), ecoregion = eco.label(), code, "Q-curve transform");

        let quality = hsi_transform(input, curve, eco, ctx.boundary)?;
        let floored = scalar(&quality, ctx.floor, BinaryOp::Max)?;
        let on_rangeland = binary(&floored, ctx.rangeland, BinaryOp::Multiply)?;
        let in_region = scalar(ctx.ecoregions, code, BinaryOp::Eq)?;
        let clipped = on_rangeland.update_mask(&in_region)?.unmask(0.0);
        binary(&merged, &clipped, BinaryOp::Max)
    })
}
