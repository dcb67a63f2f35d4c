//! Region-wide reductions
//!
//! Statistics over every valid cell inside a region, optionally sampled
//! at a coarser scale. These are whole-domain barriers and are meant to
//! run once per scenario, not per tile.

use sei_core::raster::Raster;
use sei_core::{Error, Result};

/// Statistic to compute over a region
#[derive(Debug, Clone, PartialEq)]
pub enum Reducer {
    /// Percentiles in 0-100, linear interpolation between order statistics
    Percentiles(Vec<f64>),
    Max,
    Min,
    Sum,
    Mean,
    Count,
}

/// Result of a region reduction
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStatistic {
    /// Number of cells that entered the reduction
    pub count: usize,
    /// One value per requested percentile, or a single value; empty when
    /// no cell was sampled
    pub values: Vec<f64>,
}

impl RegionStatistic {
    /// First (or only) value
    pub fn value(&self) -> Option<f64> {
        self.values.first().copied()
    }
}

/// Reduce `raster` over the cells where `region` is valid and non-zero.
///
/// `scale` is the sampling resolution in map units; `None` or a scale at
/// or below the cell size uses every cell.
pub fn reduce_region(
    raster: &Raster<f64>,
    region: Option<&Raster<f64>>,
    reducer: &Reducer,
    scale: Option<f64>,
) -> Result<RegionStatistic> {
    if let Some(region) = region {
        raster.ensure_aligned(region)?;
    }
    if let Reducer::Percentiles(ps) = reducer {
        if let Some(bad) = ps.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(Error::InvalidParameter {
                name: "percentile",
                value: bad.to_string(),
                reason: "must be between 0 and 100".into(),
            });
        }
    }

    let stride = match scale {
        Some(s) if s > raster.cell_size() && raster.cell_size() > 0.0 => {
            (s / raster.cell_size()).round().max(1.0) as usize
        }
        _ => 1,
    };
    let phase = stride / 2;

    let mut values: Vec<f64> = raster
        .iter_valid()
        .filter(|&(r, c, _)| r % stride == phase && c % stride == phase)
        .filter(|&(r, c, _)| region.map_or(true, |m| m.value(r, c).map_or(false, |v| v != 0.0)))
        .map(|(_, _, v)| v)
        .collect();

    let count = values.len();
    if count == 0 {
        return Ok(RegionStatistic {
            count,
            values: Vec::new(),
        });
    }

    let values = match reducer {
        Reducer::Percentiles(ps) => {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            ps.iter().map(|p| percentile_linear(&values, p / 100.0)).collect()
        }
        Reducer::Max => vec![values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)],
        Reducer::Min => vec![values.iter().cloned().fold(f64::INFINITY, f64::min)],
        Reducer::Sum => vec![values.iter().sum()],
        Reducer::Mean => vec![values.iter().sum::<f64>() / count as f64],
        Reducer::Count => vec![count as f64],
    };

    Ok(RegionStatistic { count, values })
}

/// Percentile of sorted values at fraction `q` in [0, 1].
///
/// Position `q * (n - 1)` is interpolated linearly, so `q = 1/(n-1)` hits
/// the second-lowest value exactly.
pub fn percentile_linear(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            if lo == hi {
                sorted[lo]
            } else {
                sorted[lo] + (sorted[hi] - sorted[lo]) * frac
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sei_core::GeoTransform;

    fn ramp(size: usize) -> Raster<f64> {
        let mut r = Raster::new(size, size);
        r.set_transform(GeoTransform::square(0.0, 90.0 * size as f64, 90.0));
        for row in 0..size {
            for col in 0..size {
                r.set(row, col, (row * size + col) as f64).unwrap();
            }
        }
        r
    }

    #[test]
    fn test_percentile_linear_ranks() {
        let sorted: Vec<f64> = (1..=13).map(f64::from).collect();
        let n = sorted.len() as f64;
        assert_eq!(percentile_linear(&sorted, 1.0 / (n - 1.0)), 2.0);
        assert_eq!(percentile_linear(&sorted, (n - 2.0) / (n - 1.0)), 12.0);
        assert_eq!(percentile_linear(&sorted, 0.5), 7.0);
        assert_eq!(percentile_linear(&[1.0, 2.0], 0.5), 1.5);
        assert_eq!(percentile_linear(&[4.0], 0.9), 4.0);
    }

    #[test]
    fn test_region_max_and_count() {
        let r = ramp(4);
        let mut region = r.like(0.0);
        region.set(0, 0, 1.0).unwrap();
        region.set(1, 1, 1.0).unwrap();

        let max = reduce_region(&r, Some(&region), &Reducer::Max, None).unwrap();
        assert_eq!(max.count, 2);
        assert_eq!(max.value(), Some(5.0));

        let sum = reduce_region(&r, None, &Reducer::Sum, None).unwrap();
        assert_eq!(sum.value(), Some(120.0));
    }

    #[test]
    fn test_region_percentiles() {
        let r = ramp(3);
        let stat = reduce_region(&r, None, &Reducer::Percentiles(vec![0.0, 50.0, 100.0]), None).unwrap();
        assert_eq!(stat.values, vec![0.0, 4.0, 8.0]);
        assert!(reduce_region(&r, None, &Reducer::Percentiles(vec![120.0]), None).is_err());
    }

    #[test]
    fn test_sampling_scale() {
        let r = ramp(6);
        let stat = reduce_region(&r, None, &Reducer::Count, Some(180.0)).unwrap();
        assert_eq!(stat.count, 9);
    }

    #[test]
    fn test_empty_region() {
        let r = ramp(3);
        let region = r.like(0.0);
        let stat = reduce_region(&r, Some(&region), &Reducer::Mean, None).unwrap();
        assert_eq!(stat.count, 0);
        assert_eq!(stat.value(), None);
    }
}
