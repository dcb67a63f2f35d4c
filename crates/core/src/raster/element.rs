//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Validity lives in the raster's mask, not in a sentinel value, so the
/// trait only has to describe conversion and the fill written under
/// invalid cells.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Value stored under invalid cells
    fn fill_value() -> Self;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Whether the value cannot represent a measurement (NaN for floats)
    fn is_nan_like(&self) -> bool;

    /// Lossy conversion to f64
    fn as_f64(self) -> f64 {
        num_traits::cast::<Self, f64>(self).unwrap_or(f64::NAN)
    }

    /// Conversion from f64, `None` when the value does not fit
    fn cast_from_f64(value: f64) -> Option<Self> {
        num_traits::cast::<f64, Self>(value)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn fill_value() -> Self {
                0
            }

            fn is_float() -> bool {
                false
            }

            fn is_nan_like(&self) -> bool {
                false
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn fill_value() -> Self {
                <$t>::NAN
            }

            fn is_float() -> bool {
                true
            }

            fn is_nan_like(&self) -> bool {
                self.is_nan()
            }
        }
    };
}

impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(i16);
impl_raster_element_int!(i32);
impl_raster_element_int!(u32);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_fill_is_nan() {
        assert!(f64::fill_value().is_nan());
        assert!(f32::NAN.is_nan_like());
        assert!(!7u8.is_nan_like());
    }

    #[test]
    fn test_cast_out_of_range() {
        assert_eq!(u8::cast_from_f64(3.0), Some(3));
        assert_eq!(u8::cast_from_f64(300.0), None);
        assert_eq!(12u8.as_f64(), 12.0);
    }
}
