//! Band math operations
//!
//! A cell masked in either operand is masked in the result. Callers that
//! want missing cover to count as zero call `unmask(0.0)` first; nothing
//! here fills masked cells implicitly.

use super::from_cells;
use crate::maybe_rayon::*;
use sei_core::raster::Raster;
use sei_core::{Error, Result};

/// Binary operations for band math
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    /// Division; a zero divisor masks the cell
    Divide,
    Min,
    Max,
    /// Comparisons produce 1.0 or 0.0
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Neq,
    /// Logical operations treat any non-zero value as true
    And,
    Or,
}

impl BinaryOp {
    /// Apply to two valid values; `None` means the result is masked
    pub fn apply(self, a: f64, b: f64) -> Option<f64> {
        let flag = |c: bool| if c { 1.0 } else { 0.0 };
        let v = match self {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => {
                if b == 0.0 {
                    return None;
                }
                a / b
            }
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
            BinaryOp::Gt => flag(a > b),
            BinaryOp::Ge => flag(a >= b),
            BinaryOp::Lt => flag(a < b),
            BinaryOp::Le => flag(a <= b),
            BinaryOp::Eq => flag(a == b),
            BinaryOp::Neq => flag(a != b),
            BinaryOp::And => flag(a != 0.0 && b != 0.0),
            BinaryOp::Or => flag(a != 0.0 || b != 0.0),
        };
        Some(v)
    }
}

/// Apply a binary operation between two aligned rasters.
///
/// Fails fast, naming both rasters, when they are not on the same grid.
pub fn binary(a: &Raster<f64>, b: &Raster<f64>, op: BinaryOp) -> Result<Raster<f64>> {
    a.ensure_aligned(b)?;
    let (rows, cols) = a.shape();

    let cells: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                if let (Some(va), Some(vb)) = (a.value(row, col), b.value(row, col)) {
                    *cell = op.apply(va, vb);
                }
            }
            row_data
        })
        .collect();

    from_cells(a, cells)
}

/// Apply a binary operation between a raster and a constant
pub fn scalar(a: &Raster<f64>, value: f64, op: BinaryOp) -> Result<Raster<f64>> {
    map_valid(a, |v| op.apply(v, value))
}

/// Apply a unary function to every valid cell
///
/// # Example
/// ```ignore
/// let proportion = map(&cover, |v| v / 100.0)?;
/// ```
pub fn map<F>(raster: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> f64 + Sync + Send,
{
    map_valid(raster, |v| Some(f(v)))
}

/// Apply a unary function that may mask the cell by returning `None`
pub fn map_valid<F>(raster: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> Option<f64> + Sync + Send,
{
    let (rows, cols) = raster.shape();

    let cells: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                *cell = raster.value(row, col).and_then(&f);
            }
            row_data
        })
        .collect();

    from_cells(raster, cells)
}

/// Clamp valid cells into `[lo, hi]`
pub fn clamp(raster: &Raster<f64>, lo: f64, hi: f64) -> Result<Raster<f64>> {
    if lo > hi {
        return Err(Error::InvalidParameter {
            name: "clamp",
            value: format!("[{}, {}]", lo, hi),
            reason: "lower bound exceeds upper bound".into(),
        });
    }
    map(raster, move |v| v.clamp(lo, hi))
}

/// Multiply a sequence of aligned rasters, left to right
pub fn product(factors: &[&Raster<f64>]) -> Result<Raster<f64>> {
    let (first, rest) = factors
        .split_first()
        .ok_or_else(|| Error::Algorithm("product of zero rasters".into()))?;
    rest.iter()
        .try_fold((*first).clone(), |acc, r| binary(&acc, r, BinaryOp::Multiply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sei_core::GeoTransform;

    fn make_band(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(5, 5, value);
        r.set_transform(GeoTransform::square(0.0, 450.0, 90.0));
        r
    }

    #[test]
    fn test_binary_add() {
        let result = binary(&make_band(3.0), &make_band(7.0), BinaryOp::Add).unwrap();
        assert_eq!(result.value(2, 2), Some(10.0));
    }

    #[test]
    fn test_mask_propagates_from_either_operand() {
        let mut a = make_band(3.0);
        let mut b = make_band(7.0);
        a.set_invalid(0, 0).unwrap();
        b.set_invalid(4, 4).unwrap();

        let result = binary(&a, &b, BinaryOp::Multiply).unwrap();
        assert!(!result.is_valid(0, 0));
        assert!(!result.is_valid(4, 4));
        assert_eq!(result.valid_count(), 23);
    }

    #[test]
    fn test_unmask_before_op_zero_fills() {
        let mut a = make_band(3.0);
        a.set_invalid(0, 0).unwrap();
        let result = binary(&a.unmask(0.0), &make_band(7.0), BinaryOp::Add).unwrap();
        assert_eq!(result.value(0, 0), Some(7.0));
    }

    #[test]
    fn test_divide_by_zero_masks() {
        let result = binary(&make_band(10.0), &make_band(0.0), BinaryOp::Divide).unwrap();
        assert!(!result.is_valid(2, 2));
    }

    #[test]
    fn test_comparisons_and_logic() {
        let a = make_band(0.2);
        assert_eq!(scalar(&a, 0.2, BinaryOp::Ge).unwrap().value(1, 1), Some(1.0));
        assert_eq!(scalar(&a, 0.2, BinaryOp::Gt).unwrap().value(1, 1), Some(0.0));
        assert_eq!(scalar(&a, 0.0, BinaryOp::And).unwrap().value(1, 1), Some(0.0));
        assert_eq!(scalar(&a, 0.0, BinaryOp::Or).unwrap().value(1, 1), Some(1.0));
    }

    #[test]
    fn test_misaligned_operands_rejected() {
        let a = make_band(1.0).named("sagebrush");
        let mut b = make_band(1.0).named("hmod");
        b.set_transform(GeoTransform::square(0.0, 450.0, 1000.0));
        let err = binary(&a, &b, BinaryOp::Add).unwrap_err();
        assert!(err.is_misalignment());
        assert!(err.to_string().contains("hmod"));
    }

    #[test]
    fn test_product_and_clamp() {
        let p = product(&[&make_band(0.5), &make_band(0.5), &make_band(2.0)]).unwrap();
        assert!((p.value(3, 3).unwrap() - 0.5).abs() < 1e-12);
        let c = clamp(&make_band(150.0), 0.0, 100.0).unwrap();
        assert_eq!(c.value(0, 0), Some(100.0));
        assert!(product(&[]).is_err());
    }
}
