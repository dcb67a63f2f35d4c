//! Disturbance-adjusted temporal mean
//!
//! Year `y` of a window `[start, end]` drops a cell when a fire with year
//! `f` satisfies `y <= f <= end`. With `L` the latest fire year at or
//! before `end`, that is every `y <= L`: a fire removes its own year and
//! every earlier year of the window, and a cell keeps only the years after
//! its last fire.

use ndarray::Array2;
use sei_core::raster::Raster;
use sei_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Inclusive range of calendar years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearWindow {
    pub start: i32,
    pub end: i32,
}

impl YearWindow {
    pub fn new(start: i32, end: i32) -> Result<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::InvalidParameter {
                name: "year_window",
                value: format!("{}..{}", self.start, self.end),
                reason: "start year is after end year".into(),
            });
        }
        Ok(())
    }

    /// Years from `end` down to `start`
    pub fn years_descending(&self) -> impl Iterator<Item = i32> {
        (self.start..=self.end).rev()
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A per-year raster source for one variable
pub trait YearlyRasters {
    fn year(&self, year: i32) -> Result<Raster<f64>>;
}

impl YearlyRasters for BTreeMap<i32, Raster<f64>> {
    fn year(&self, year: i32) -> Result<Raster<f64>> {
        self.get(&year)
            .cloned()
            .ok_or_else(|| Error::MissingInput(format!("year {}", year)))
    }
}

/// Adapter for a closure that loads one year
pub struct YearFn<F>(pub F);

impl<F> YearlyRasters for YearFn<F>
where
    F: Fn(i32) -> Result<Raster<f64>>,
{
    fn year(&self, year: i32) -> Result<Raster<f64>> {
        (self.0)(year)
    }
}

/// Temporal mean and the number of years behind each cell
#[derive(Debug, Clone)]
pub struct TemporalMean {
    /// Invalid where no year contributed
    pub mean: Raster<f64>,
    pub years_used: Raster<f64>,
}

/// 1 where year `year` is unaffected by fire, invalid where excluded
pub fn no_fire_mask(latest_fire: &Raster<f64>, year: i32) -> Result<Raster<f64>> {
    let shape = latest_fire.shape();
    let valid = Array2::from_shape_fn(shape, |(r, c)| match latest_fire.value(r, c) {
        Some(fire) => fire < f64::from(year),
        None => true,
    });
    let mask = latest_fire.derive(Array2::from_elem(shape, 1.0), valid)?;
    Ok(mask.named(format!("no_fire_{}", year)))
}

/// Mean over the window of the valid, fire-unaffected yearly values.
///
/// `latest_fire` holds per cell the latest fire year at or before the
/// window end (see `latest_attribute_year`); `None` disables fire masking.
pub fn disturbance_masked_mean<S>(
    source: &S,
    window: YearWindow,
    latest_fire: Option<&Raster<f64>>,
) -> Result<TemporalMean>
where
    S: YearlyRasters + ?Sized,
{
    window.validate()?;

    let mut sum: Option<Array2<f64>> = None;
    let mut count: Option<Array2<f64>> = None;
    let mut template: Option<Raster<f64>> = None;

    for year in window.years_descending() {
        let cover = source.year(year)?;
        let cover = match latest_fire {
            Some(fire) => cover.update_mask(&no_fire_mask(fire, year)?)?,
            None => cover,
        };
        if let Some(t) = &template {
            t.ensure_aligned(&cover)?;
        }
        debug!(year, raster = cover.name(), valid = cover.valid_count(), "Accumulating year");

        let s = sum.get_or_insert_with(|| Array2::zeros(cover.shape()));
        let n = count.get_or_insert_with(|| Array2::zeros(cover.shape()));
        for (row, col, v) in cover.iter_valid() {
            s[(row, col)] += v;
            n[(row, col)] += 1.0;
        }
        if template.is_none() {
            template = Some(cover);
        }
    }

    let (Some(template), Some(sum), Some(count)) = (template, sum, count) else {
        return Err(Error::InvalidParameter {
            name: "year_window",
            value: format!("{}..{}", window.start, window.end),
            reason: "window contains no years".into(),
        });
    };

    let valid = count.mapv(|n| n > 0.0);
    let mean = ndarray::Zip::from(&sum)
        .and(&count)
        .map_collect(|&s, &n| if n > 0.0 { s / n } else { f64::NAN });

    let name = template.name().to_string();
    Ok(TemporalMean {
        mean: template.derive(mean, valid)?.named(name.clone()),
        years_used: template
            .derive(count, Array2::from_elem(template.shape(), true))?
            .named(format!("{}_years", name)),
    })
}
