//! Layers shared by every scenario of a run
//!
//! Loaded once, read-only afterwards: the analysis grid, rangeland mask,
//! study-area mask, ecoregion codes, human modification and the fire
//! perimeters.

use sei_algorithms::algebra::{binary, remap, resample_to, scalar, BinaryOp, RemapDefault, ResampleMethod};
use sei_algorithms::vector::{latest_attribute_year, rasterize_codes, rasterize_mask};
use sei_core::vector::FeatureCollection;
use sei_core::{GeoTransform, GridSpec, Raster, Result};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::source::InputSource;

/// How a raster is regridded when it has to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Cover, indices, ratios: mean aggregation
    Continuous,
    /// Masks and codes: nearest cell
    Categorical,
}

impl LayerKind {
    fn method(self) -> ResampleMethod {
        match self {
            LayerKind::Continuous => ResampleMethod::Mean,
            LayerKind::Categorical => ResampleMethod::Nearest,
        }
    }
}

/// Grid every scenario computes on
#[derive(Debug, Clone)]
pub struct AnalysisGrid {
    pub grid: GridSpec,
    /// Inputs on another grid are resampled rather than rejected
    pub resample_inputs: bool,
}

impl AnalysisGrid {
    /// The input grid, or the same extent at `output_resolution`
    pub fn new(input: GridSpec, output_resolution: Option<f64>) -> Self {
        let Some(res) = output_resolution else {
            return Self {
                grid: input,
                resample_inputs: false,
            };
        };
        let current = input.cell_size();
        if (res - current).abs() <= current * 1e-9 {
            return Self {
                grid: input,
                resample_inputs: false,
            };
        }
        let t = input.transform;
        let (min_x, min_y, max_x, max_y) = t.bounds(input.cols, input.rows);
        let cols = ((max_x - min_x) / res).ceil().max(1.0) as usize;
        let rows = ((max_y - min_y) / res).ceil().max(1.0) as usize;
        info!(from = current, to = res, rows, cols, "Analysis grid differs from input grid");
        Self {
            grid: GridSpec::new(rows, cols, GeoTransform::square(min_x, max_y, res), input.crs),
            resample_inputs: true,
        }
    }

    /// Bring `raster` onto the analysis grid.
    ///
    /// Aligned rasters pass through. Misaligned ones are resampled when the
    /// run asked for a different resolution or `always_resample` is set;
    /// otherwise the misalignment is an error naming the raster. A raster
    /// in another CRS is always an error.
    pub fn align(&self, raster: Raster<f64>, kind: LayerKind, always_resample: bool) -> Result<Raster<f64>> {
        match self.grid.ensure_matches(&raster) {
            Ok(()) => Ok(raster),
            Err(e) if e.is_regriddable() && (self.resample_inputs || always_resample) => {
                let name = raster.name().to_string();
                Ok(resample_to(&raster, &self.grid, kind.method())?.named(name))
            }
            Err(e) => Err(e),
        }
    }
}

/// Read-only layers of a run
#[derive(Debug, Clone)]
pub struct StaticLayers {
    pub grid: AnalysisGrid,
    /// 1 on rangeland outside the tundra codes, invalid elsewhere
    pub rangeland: Raster<f64>,
    /// 1 inside the study area, 0 outside
    pub study_area: Raster<f64>,
    /// Ecoregion code per cell, invalid outside all ecoregions
    pub ecoregions: Raster<f64>,
    /// Human modification on the analysis grid
    pub human_modification: Raster<f64>,
    pub fire_perimeters: FeatureCollection,
}

impl StaticLayers {
    pub fn load(source: &dyn InputSource, config: &RunConfig) -> Result<Self> {
        let grid = AnalysisGrid::new(source.grid()?, config.output_resolution);
        info!(
            source = %source.describe(),
            rows = grid.grid.rows,
            cols = grid.grid.cols,
            cell_size = grid.grid.cell_size(),
            "Loading static layers"
        );

        let rangeland = grid.align(source.rangeland()?, LayerKind::Categorical, false)?;
        let land_cover = match source.land_cover()? {
            Some(lc) => Some(grid.align(lc, LayerKind::Categorical, false)?),
            None => None,
        };
        let rangeland = rangeland_mask(&rangeland, land_cover.as_ref(), &config.tundra_codes)?;

        let study_area = rasterize_mask(&source.study_area()?.features, &grid.grid)?.named("study_area");
        let ecoregions = rasterize_codes(&source.ecoregions()?.features, &grid.grid, &config.ecoregions.attribute)?
            .named("ecoregions");
        if ecoregions.valid_count() == 0 {
            warn!(attribute = %config.ecoregions.attribute, "No cell falls inside an ecoregion");
        }

        // native resolution differs from the cover data by design
        let human_modification = grid.align(source.human_modification()?, LayerKind::Continuous, true)?;

        Ok(Self {
            grid,
            rangeland,
            study_area,
            ecoregions,
            human_modification,
            fire_perimeters: source.fire_perimeters()?,
        })
    }

    /// Latest fire year at or before `end` per cell
    pub fn latest_fire(&self, end: i32, attribute: &str) -> Result<Raster<f64>> {
        Ok(latest_attribute_year(&self.fire_perimeters.features, &self.grid.grid, attribute, i64::from(end))?
            .named("latest_fire"))
    }
}

/// Binary rangeland with tundra land-cover codes removed, self-masked.
///
/// Cells without land-cover data are not treated as tundra.
pub fn rangeland_mask(
    rangeland: &Raster<f64>,
    land_cover: Option<&Raster<f64>>,
    tundra_codes: &[i64],
) -> Result<Raster<f64>> {
    let mask = match land_cover {
        Some(lc) if !tundra_codes.is_empty() => {
            let from: Vec<f64> = tundra_codes.iter().map(|&c| c as f64).collect();
            let zeros = vec![0.0; from.len()];
            let not_tundra = remap(lc, &from, &zeros, RemapDefault::Value(1.0))?.unmask(1.0);
            binary(rangeland, &not_tundra, BinaryOp::Multiply)?
        }
        _ => rangeland.clone(),
    };
    let flagged = scalar(&mask, 0.0, BinaryOp::Neq)?;
    Ok(flagged.self_mask().named("rangeland"))
}
