//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, GridSpec, RasterElement};
use ndarray::{s, Array2, Zip};
use tracing::warn;

/// A georeferenced 2D raster grid with an explicit validity mask.
///
/// Every cell carries a value and a flag. Invalid cells keep
/// [`RasterElement::fill_value`] in `data` but are never read by the
/// algebra: operations combine masks first and compute only where the
/// result is valid.
///
/// # Example
///
/// ```ignore
/// use sei_core::Raster;
///
/// let mut cover: Raster<f64> = Raster::filled(100, 100, 20.0).named("sagebrush");
/// cover.set_invalid(10, 20)?;
/// let filled = cover.unmask(0.0);
/// assert!(filled.is_valid(10, 20));
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Validity mask, `true` where the cell holds a value
    valid: Array2<bool>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// Identifier used in error messages and logs
    name: String,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros, all cells valid
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster on a grid, filled with a value
    pub fn on_grid(grid: &GridSpec, value: T) -> Self {
        let mut raster = Self::filled(grid.rows, grid.cols, value);
        raster.transform = grid.transform;
        raster.crs = grid.crs.clone();
        raster
    }

    /// Create a raster from existing data; NaN cells become invalid
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray; NaN cells become invalid
    pub fn from_array(data: Array2<T>) -> Self {
        let valid = data.map(|v| !v.is_nan_like());
        Self {
            data,
            valid,
            transform: GeoTransform::default(),
            crs: None,
            name: "unnamed".to_string(),
        }
    }

    /// Create a raster from data and an explicit validity mask
    pub fn from_parts(data: Array2<T>, valid: Array2<bool>) -> Result<Self> {
        if data.dim() != valid.dim() {
            let (rows, cols) = valid.dim();
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let mut raster = Self::from_array(data);
        Zip::from(&mut raster.valid)
            .and(&valid)
            .for_each(|v, &m| *v = *v && m);
        Ok(raster)
    }

    /// Create a raster with the same metadata but different data type.
    ///
    /// The new raster is zero-filled and fully valid.
    pub fn with_same_meta<U: RasterElement>(&self) -> Raster<U> {
        Raster {
            data: Array2::zeros(self.data.dim()),
            valid: Array2::from_elem(self.data.dim(), true),
            transform: self.transform,
            crs: self.crs.clone(),
            name: self.name.clone(),
        }
    }

    /// Create a raster with the same dimensions and metadata, filled with a value
    pub fn like(&self, fill_value: T) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), fill_value),
            valid: Array2::from_elem(self.data.dim(), true),
            transform: self.transform,
            crs: self.crs.clone(),
            name: self.name.clone(),
        }
    }

    /// Rebuild a raster on this raster's grid from computed data and mask.
    ///
    /// Invalid cells get the fill value so that stale numbers never leak.
    pub fn derive<U: RasterElement>(&self, mut data: Array2<U>, valid: Array2<bool>) -> Result<Raster<U>> {
        if data.dim() != self.data.dim() || valid.dim() != self.data.dim() {
            let (rows, cols) = data.dim();
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Zip::from(&mut data).and(&valid).for_each(|d, &m| {
            if !m {
                *d = U::fill_value();
            }
        });
        Ok(Raster {
            data,
            valid,
            transform: self.transform,
            crs: self.crs.clone(),
            name: self.name.clone(),
        })
    }

    /// Builder-style rename
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Identifier of this raster
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the identifier of this raster
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Grid description of this raster
    pub fn grid(&self) -> GridSpec {
        GridSpec {
            rows: self.rows(),
            cols: self.cols(),
            transform: self.transform,
            crs: self.crs.clone(),
        }
    }

    // Data access

    /// Get the stored value at (row, col), valid or not
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get the value at (row, col) if the cell is valid
    pub fn value(&self, row: usize, col: usize) -> Option<T> {
        match self.valid.get((row, col)) {
            Some(true) => Some(self.data[(row, col)]),
            _ => None,
        }
    }

    /// Whether the cell at (row, col) is valid; out-of-bounds is invalid
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        matches!(self.valid.get((row, col)), Some(true))
    }

    /// Set value at (row, col) and mark the cell valid
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        self.check_bounds(row, col)?;
        self.data[(row, col)] = value;
        self.valid[(row, col)] = !value.is_nan_like();
        Ok(())
    }

    /// Mark the cell at (row, col) invalid
    pub fn set_invalid(&mut self, row: usize, col: usize) -> Result<()> {
        self.check_bounds(row, col)?;
        self.data[(row, col)] = T::fill_value();
        self.valid[(row, col)] = false;
        Ok(())
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(())
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a reference to the validity mask
    pub fn mask(&self) -> &Array2<bool> {
        &self.valid
    }

    /// Iterate over valid cells as (row, col, value)
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        self.data
            .indexed_iter()
            .filter(move |(idx, _)| self.valid[*idx])
            .map(|((r, c), &v)| (r, c, v))
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Convert pixel coordinates to geographic coordinates (cell center)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    // Masking

    /// Replace invalid cells with `fill` and mark every cell valid
    pub fn unmask(&self, fill: T) -> Self {
        let mut out = self.clone();
        Zip::from(&mut out.data)
            .and(&mut out.valid)
            .for_each(|d, m| {
                if !*m {
                    *d = fill;
                    *m = true;
                }
            });
        out
    }

    /// Mark cells equal to zero invalid
    pub fn self_mask(&self) -> Self {
        self.self_mask_value(T::zero())
    }

    /// Mark cells equal to `sentinel` invalid
    pub fn self_mask_value(&self, sentinel: T) -> Self {
        let mut out = self.clone();
        Zip::from(&mut out.data)
            .and(&mut out.valid)
            .for_each(|d, m| {
                if *m && *d == sentinel {
                    *d = T::fill_value();
                    *m = false;
                }
            });
        out
    }

    /// Restrict validity to cells where `mask` is valid and non-zero
    pub fn update_mask<U: RasterElement>(&self, mask: &Raster<U>) -> Result<Self> {
        self.ensure_aligned(mask)?;
        let mut out = self.clone();
        Zip::from(&mut out.data)
            .and(&mut out.valid)
            .and(&mask.data)
            .and(&mask.valid)
            .for_each(|d, m, &mv, &mm| {
                if *m && !(mm && mv != U::zero()) {
                    *d = T::fill_value();
                    *m = false;
                }
            });
        Ok(out)
    }

    /// Fail unless `other` shares this raster's shape, lattice and CRS
    pub fn ensure_aligned<U: RasterElement>(&self, other: &Raster<U>) -> Result<()> {
        match (&self.crs, &other.crs) {
            (Some(a), Some(b)) if !a.is_equivalent(b) => {
                return Err(Error::CrsMismatch {
                    left: self.name.clone(),
                    right: other.name.clone(),
                    left_crs: a.identifier(),
                    right_crs: b.identifier(),
                });
            }
            (Some(known), None) | (None, Some(known)) => {
                let unknown = if self.crs.is_none() { &self.name } else { &other.name };
                warn!(raster = %unknown, assumed = %known, "Raster has no CRS; assuming it matches");
            }
            _ => {}
        }
        if self.shape() != other.shape() {
            return Err(Error::SizeMismatch {
                left: self.name.clone(),
                right: other.name.clone(),
                lr: self.rows(),
                lc: self.cols(),
                rr: other.rows(),
                rc: other.cols(),
            });
        }
        if !self.transform.is_aligned_with(&other.transform) {
            return Err(Error::GridMismatch {
                left: self.name.clone(),
                right: other.name.clone(),
                reason: format!("transforms differ: {:?} vs {:?}", self.transform, other.transform),
            });
        }
        Ok(())
    }

    /// Convert to another element type; values that do not fit become invalid
    pub fn cast<U: RasterElement>(&self) -> Raster<U> {
        let mut valid = self.valid.clone();
        let mut data = Array2::from_elem(self.data.dim(), U::fill_value());
        Zip::from(&mut data)
            .and(&mut valid)
            .and(&self.data)
            .for_each(|o, m, &v| {
                if *m {
                    match U::cast_from_f64(v.as_f64()) {
                        Some(u) => *o = u,
                        None => *m = false,
                    }
                }
            });
        Raster {
            data,
            valid,
            transform: self.transform,
            crs: self.crs.clone(),
            name: self.name.clone(),
        }
    }

    // Windows

    /// Copy a rectangular window into a new raster
    pub fn window(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Self> {
        if row + rows > self.rows() || col + cols > self.cols() {
            return Err(Error::IndexOutOfBounds {
                row: row + rows,
                col: col + cols,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(Self {
            data: self.data.slice(s![row..row + rows, col..col + cols]).to_owned(),
            valid: self.valid.slice(s![row..row + rows, col..col + cols]).to_owned(),
            transform: self.transform.window(row, col),
            crs: self.crs.clone(),
            name: self.name.clone(),
        })
    }

    /// Copy `rows` x `cols` cells of `src`, starting at (src_row, src_col),
    /// into this raster at (dst_row, dst_col)
    #[allow(clippy::too_many_arguments)]
    pub fn paste(
        &mut self,
        src: &Raster<T>,
        src_row: usize,
        src_col: usize,
        dst_row: usize,
        dst_col: usize,
        rows: usize,
        cols: usize,
    ) -> Result<()> {
        if src_row + rows > src.rows()
            || src_col + cols > src.cols()
            || dst_row + rows > self.rows()
            || dst_col + cols > self.cols()
        {
            return Err(Error::IndexOutOfBounds {
                row: dst_row + rows,
                col: dst_col + cols,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data
            .slice_mut(s![dst_row..dst_row + rows, dst_col..dst_col + cols])
            .assign(&src.data.slice(s![src_row..src_row + rows, src_col..src_col + cols]));
        self.valid
            .slice_mut(s![dst_row..dst_row + rows, dst_col..dst_col + cols])
            .assign(&src.valid.slice(s![src_row..src_row + rows, src_col..src_col + cols]));
        Ok(())
    }

    // Statistics

    /// Number of valid cells
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&m| m).count()
    }

    /// Basic statistics over valid cells
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for (_, _, value) in self.iter_valid() {
            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }
            sum += value.as_f64();
            count += 1;
        }

        let mean = if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        };

        RasterStatistics {
            min,
            max,
            mean,
            valid_count: count,
            invalid_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub invalid_count: usize,
}
