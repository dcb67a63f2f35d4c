//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation of a north-up grid.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `pixel_height` is negative for north-up rasters. Rotated grids are not
/// produced by any SEI input and are not representable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Cell size in X (map units, meters for Albers)
    pub pixel_width: f64,
    /// Cell size in Y, usually negative
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new north-up transform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Square-celled north-up transform anchored at its upper-left corner
    pub fn square(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self::new(origin_x, origin_y, cell_size, -cell_size)
    }

    /// Geographic coordinates of the center of cell (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel coordinates (col, row) of a geographic point
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-12 || self.pixel_height.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Area of one cell in squared map units
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of a grid of given size
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + cols as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + rows as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Whether two transforms describe the same lattice.
    ///
    /// Tolerance is a fraction of the cell size so that values read back
    /// from Float64 tags still compare equal.
    pub fn is_aligned_with(&self, other: &GeoTransform) -> bool {
        let tol = self.cell_size().max(other.cell_size()) * 1e-6;
        (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
            && (self.pixel_width - other.pixel_width).abs() <= tol
            && (self.pixel_height - other.pixel_height).abs() <= tol
    }

    /// Transform of a window starting at (row, col) of this grid
    pub fn window(&self, row: usize, col: usize) -> GeoTransform {
        GeoTransform::new(
            self.origin_x + col as f64 * self.pixel_width,
            self.origin_y + row as f64 * self.pixel_height,
            self.pixel_width,
            self.pixel_height,
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::square(-2_000_000.0, 3_000_000.0, 90.0);
        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);
        assert_relative_eq!(col, 5.5, epsilon = 1e-9);
        assert_relative_eq!(row, 10.5, epsilon = 1e-9);
    }

    #[test]
    fn test_bounds_and_area() {
        let gt = GeoTransform::square(0.0, 900.0, 90.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(10, 10);
        assert_relative_eq!(min_x, 0.0);
        assert_relative_eq!(min_y, 0.0);
        assert_relative_eq!(max_x, 900.0);
        assert_relative_eq!(max_y, 900.0);
        assert_relative_eq!(gt.cell_area(), 8100.0);
    }

    #[test]
    fn test_alignment() {
        let a = GeoTransform::square(0.0, 900.0, 90.0);
        let b = GeoTransform::square(0.0 + 1e-7, 900.0, 90.0);
        let c = GeoTransform::square(45.0, 900.0, 90.0);
        let d = GeoTransform::square(0.0, 900.0, 30.0);
        assert!(a.is_aligned_with(&b));
        assert!(!a.is_aligned_with(&c));
        assert!(!a.is_aligned_with(&d));
    }

    #[test]
    fn test_window_origin() {
        let gt = GeoTransform::square(100.0, 500.0, 10.0);
        let w = gt.window(2, 3);
        assert_relative_eq!(w.origin_x, 130.0);
        assert_relative_eq!(w.origin_y, 480.0);
    }
}
