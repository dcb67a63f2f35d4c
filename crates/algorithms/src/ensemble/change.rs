//! Change products against a baseline scenario

use crate::algebra::{binary, from_cells, remap, scalar, BinaryOp, RemapDefault};
use crate::maybe_rayon::*;
use sei_core::raster::Raster;
use sei_core::Result;

/// `{11:1, 12:2, 13:3, 21:4, 22:5, 23:6, 31:7, 32:8, 33:9}`
pub const TRANSITION_CODES: [(u8, u8); 9] = [
    (11, 1),
    (12, 2),
    (13, 3),
    (21, 4),
    (22, 5),
    (23, 6),
    (31, 7),
    (32, 8),
    (33, 9),
];

/// Dense transition code of a (current, future) 3-class pair
pub fn transition_code(current: u8, future: u8) -> Option<u8> {
    let raw = current.checked_mul(10)?.checked_add(future)?;
    TRANSITION_CODES.iter().find(|&&(k, _)| k == raw).map(|&(_, v)| v)
}

/// `member - baseline`
pub fn difference(member: &Raster<f64>, baseline: &Raster<f64>) -> Result<Raster<f64>> {
    Ok(binary(member, baseline, BinaryOp::Subtract)?.named(format!("{}_diff", member.name())))
}

/// 9-class transition between two 3-class rasters
pub fn transition(current3: &Raster<f64>, future3: &Raster<f64>) -> Result<Raster<f64>> {
    let tens = scalar(current3, 10.0, BinaryOp::Multiply)?;
    let combined = binary(&tens, future3, BinaryOp::Add)?;
    let from: Vec<f64> = TRANSITION_CODES.iter().map(|&(k, _)| f64::from(k)).collect();
    let to: Vec<f64> = TRANSITION_CODES.iter().map(|&(_, v)| f64::from(v)).collect();
    Ok(remap(&combined, &from, &to, RemapDefault::Mask)?.named("transition"))
}

/// Sage, perennial and annual quality of one scenario
#[derive(Debug, Clone, Copy)]
pub struct CoreComponents<'a> {
    pub sage: &'a Raster<f64>,
    pub perennial: &'a Raster<f64>,
    pub annual: &'a Raster<f64>,
}

/// Share of the change attributed to each component, summing to 1
/// where any component moved with the composite
#[derive(Debug, Clone)]
pub struct Attribution {
    pub sage: Raster<f64>,
    pub perennial: Raster<f64>,
    pub annual: Raster<f64>,
}

/// Normalized shares of `|Δq / q_baseline|` for one cell.
///
/// A component whose change opposes the change of `sage x perennial x
/// annual` gets no share; a zero baseline gives no share.
pub fn attribute_cell(baseline: [f64; 3], future: [f64; 3]) -> [f64; 3] {
    let composite_b: f64 = baseline.iter().product();
    let composite_f: f64 = future.iter().product();
    let direction = sign(composite_f - composite_b);

    let mut shares = [0.0; 3];
    for i in 0..3 {
        let delta = future[i] - baseline[i];
        if baseline[i] == 0.0 || sign(delta) != direction {
            continue;
        }
        shares[i] = (delta / baseline[i]).abs();
    }
    let total: f64 = shares.iter().sum();
    if total > 0.0 {
        for s in shares.iter_mut() {
            *s /= total;
        }
    }
    shares
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Per-cell attribution of the change from `baseline` to `future`
pub fn attribution(baseline: &CoreComponents<'_>, future: &CoreComponents<'_>) -> Result<Attribution> {
    let all = [
        baseline.sage,
        baseline.perennial,
        baseline.annual,
        future.sage,
        future.perennial,
        future.annual,
    ];
    for &r in &all[1..] {
        all[0].ensure_aligned(r)?;
    }
    let (rows, cols) = baseline.sage.shape();

    let cells: Vec<Option<[f64; 3]>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut out = vec![None; cols];
            for (col, cell) in out.iter_mut().enumerate() {
                let mut v = [0.0; 6];
                let mut complete = true;
                for (slot, r) in v.iter_mut().zip(all.iter()) {
                    match r.value(row, col) {
                        Some(x) => *slot = x,
                        None => complete = false,
                    }
                }
                if complete {
                    *cell = Some(attribute_cell([v[0], v[1], v[2]], [v[3], v[4], v[5]]));
                }
            }
            out
        })
        .collect();

    let pick = |i: usize| cells.iter().map(|c| c.map(|s| s[i])).collect::<Vec<_>>();
    let template = baseline.sage;
    Ok(Attribution {
        sage: from_cells(template, pick(0))?.named("attr_sage"),
        perennial: from_cells(template, pick(1))?.named("attr_perennial"),
        annual: from_cells(template, pick(2))?.named("attr_annual"),
    })
}

/// Member agreement with the ensemble median
#[derive(Debug, Clone)]
pub struct Agreement {
    /// Members whose direction of change matches the median's
    pub direction: Raster<f64>,
    /// Members with a change above `+threshold`
    pub substantial_increase: Raster<f64>,
    /// Members with a change below `-threshold`
    pub substantial_decrease: Raster<f64>,
}

/// Count member agreement per cell; cells masked in the baseline, the
/// median or any member are masked
pub fn agreement_counts(
    baseline: &Raster<f64>,
    median: &Raster<f64>,
    members: &[&Raster<f64>],
    threshold: f64,
) -> Result<Agreement> {
    baseline.ensure_aligned(median)?;
    for &m in members {
        baseline.ensure_aligned(m)?;
    }
    let (rows, cols) = baseline.shape();

    let cells: Vec<Option<[f64; 3]>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut out = vec![None; cols];
            for (col, cell) in out.iter_mut().enumerate() {
                let (Some(b), Some(med)) = (baseline.value(row, col), median.value(row, col)) else {
                    continue;
                };
                let target = sign(med - b);
                let mut counts = [0.0; 3];
                let mut complete = true;
                for m in members {
                    let Some(v) = m.value(row, col) else {
                        complete = false;
                        break;
                    };
                    let delta = v - b;
                    if sign(delta) == target {
                        counts[0] += 1.0;
                    }
                    if delta > threshold {
                        counts[1] += 1.0;
                    }
                    if delta < -threshold {
                        counts[2] += 1.0;
                    }
                }
                if complete {
                    *cell = Some(counts);
                }
            }
            out
        })
        .collect();

    let pick = |i: usize| cells.iter().map(|c| c.map(|s| s[i])).collect::<Vec<_>>();
    Ok(Agreement {
        direction: from_cells(baseline, pick(0))?.named("agree_direction"),
        substantial_increase: from_cells(baseline, pick(1))?.named("agree_increase"),
        substantial_decrease: from_cells(baseline, pick(2))?.named("agree_decrease"),
    })
}
