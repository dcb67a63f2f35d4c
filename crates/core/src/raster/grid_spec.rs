//! Grid description shared by aligned rasters

use crate::crs::CRS;
use crate::error::Result;
use crate::raster::{GeoTransform, Raster, RasterElement};
use serde::{Deserialize, Serialize};

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Shape, lattice and CRS of a raster, without the data.
///
/// Used as a template for rasterizing vectors and for checking that every
/// input of a scenario lives on the same grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
}

impl GridSpec {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform, crs: Option<CRS>) -> Self {
        Self {
            rows,
            cols,
            transform,
            crs,
        }
    }

    /// Cell area in hectares, assuming a projected CRS in meters
    pub fn cell_area_hectares(&self) -> f64 {
        self.transform.cell_area() / SQUARE_METERS_PER_HECTARE
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// A raster on this grid filled with `value`
    pub fn filled<T: RasterElement>(&self, value: T) -> Raster<T> {
        Raster::on_grid(self, value)
    }

    /// Fail unless `raster` lives on this grid
    pub fn ensure_matches<T: RasterElement>(&self, raster: &Raster<T>) -> Result<()> {
        let template: Raster<u8> = Raster::on_grid(self, 0).named("grid");
        template.ensure_aligned(raster)
    }
}
