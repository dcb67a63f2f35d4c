//! Per-pixel reduction across ensemble members

use crate::algebra::{from_cells, percentile_linear};
use crate::maybe_rayon::*;
use sei_core::raster::Raster;
use sei_core::{Error, Result};
use tracing::debug;

/// Median and the symmetric low/high pair of an ensemble
#[derive(Debug, Clone)]
pub struct EnsembleStatistics {
    pub median: Raster<f64>,
    pub low: Raster<f64>,
    pub high: Raster<f64>,
    /// Members that entered the reduction
    pub members: usize,
}

/// Fractiles of the low and high statistics for `n` members:
/// `1/(n-1)` and `(n-2)/(n-1)`, the second-lowest and second-highest
/// ranks
pub fn low_high_fractiles(n: usize) -> (f64, f64) {
    if n < 2 {
        return (0.0, 1.0);
    }
    let d = (n - 1) as f64;
    (1.0 / d, (n as f64 - 2.0) / d)
}

/// Reduce aligned member rasters cell by cell.
///
/// A single member passes through unchanged. Two members are rejected
/// because the second-lowest and second-highest ranks swap. A cell
/// masked in any member is masked in the result.
pub fn reduce_members(members: &[&Raster<f64>]) -> Result<EnsembleStatistics> {
    let n = members.len();
    let Some(&first) = members.first() else {
        return Err(Error::Ensemble {
            reason: "no ensemble members".into(),
            missing: Vec::new(),
        });
    };
    if n == 1 {
        return Ok(EnsembleStatistics {
            median: first.clone().named("median"),
            low: first.clone().named("low"),
            high: first.clone().named("high"),
            members: 1,
        });
    }
    if n == 2 {
        return Err(Error::Ensemble {
            reason: "low/high statistics need at least 3 members, got 2".into(),
            missing: Vec::new(),
        });
    }
    for &m in &members[1..] {
        first.ensure_aligned(m)?;
    }

    let (lo_q, hi_q) = low_high_fractiles(n);
    debug!(members = n, low = lo_q, high = hi_q, "Reducing ensemble");

    let (rows, cols) = first.shape();
    let cells: Vec<[Option<f64>; 3]> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut values = Vec::with_capacity(n);
            let mut out = vec![[None; 3]; cols];
            for (col, cell) in out.iter_mut().enumerate() {
                values.clear();
                values.extend(members.iter().filter_map(|m| m.value(row, col)));
                if values.len() < n {
                    continue;
                }
                values.sort_by(|a, b| a.total_cmp(b));
                *cell = [
                    Some(percentile_linear(&values, 0.5)),
                    Some(percentile_linear(&values, lo_q)),
                    Some(percentile_linear(&values, hi_q)),
                ];
            }
            out
        })
        .collect();

    let pick = |i: usize| cells.iter().map(|c| c[i]).collect::<Vec<_>>();
    Ok(EnsembleStatistics {
        median: from_cells(first, pick(0))?.named("median"),
        low: from_cells(first, pick(1))?.named("low"),
        high: from_cells(first, pick(2))?.named("high"),
        members: n,
    })
}
