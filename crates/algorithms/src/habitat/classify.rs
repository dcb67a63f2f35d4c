//! Decile and 3-class classification

use super::calibration::DecileThresholds;
use crate::algebra::{map, remap, RemapDefault};
use sei_core::raster::Raster;
use sei_core::Result;

/// Core habitat
pub const CORE: u8 = 1;
/// Growth opportunity areas
pub const GROW: u8 = 2;
/// Other rangeland
pub const OTHER: u8 = 3;

/// Labels of the 3-class output
pub const CLASS3_LABELS: [(u8, &str); 3] = [(CORE, "core"), (GROW, "grow"), (OTHER, "other")];

/// Labels of the 10-class output
pub const CLASS10_LABELS: [(u8, &str); 10] = [
    (1, "decile 1"),
    (2, "decile 2"),
    (3, "decile 3"),
    (4, "decile 4"),
    (5, "decile 5"),
    (6, "decile 6"),
    (7, "decile 7"),
    (8, "decile 8"),
    (9, "decile 9"),
    (10, "decile 10"),
];

/// Decile class 1..=10 per valid cell
pub fn classify_deciles(index: &Raster<f64>, thresholds: &DecileThresholds) -> Result<Raster<f64>> {
    thresholds.validate()?;
    Ok(map(index, |v| f64::from(thresholds.class_of(v)))?.named("class10"))
}

/// 3-class value of a decile class
pub fn collapse_class(class10: u8) -> Option<u8> {
    match class10 {
        1..=3 => Some(OTHER),
        4..=8 => Some(GROW),
        9 | 10 => Some(CORE),
        _ => None,
    }
}

/// Collapse deciles into core (9-10), grow (4-8) and other (1-3)
pub fn collapse3(class10: &Raster<f64>) -> Result<Raster<f64>> {
    let from: Vec<f64> = (1..=10u8).map(f64::from).collect();
    let to: Vec<f64> = (1..=10u8)
        .map(|c| f64::from(collapse_class(c).unwrap_or(OTHER)))
        .collect();
    Ok(remap(class10, &from, &to, RemapDefault::Mask)?.named("class3"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(values: &[f64]) -> Raster<f64> {
        Raster::from_vec(values.to_vec(), 1, values.len()).unwrap().named("sei_mgmt")
    }

    #[test]
    fn test_deciles_are_monotonic_and_bounded() {
        let values: Vec<f64> = (0..=1000).map(|i| i as f64 / 1000.0).collect();
        let classes = classify_deciles(&index(&values), &DecileThresholds::default()).unwrap();
        let mut prev = 0.0;
        for col in 0..values.len() {
            let c = classes.value(0, col).unwrap();
            assert!((1.0..=10.0).contains(&c));
            assert!(c >= prev);
            prev = c;
        }
        assert_eq!(classes.value(0, 0), Some(1.0));
        assert_eq!(classes.value(0, 1000), Some(10.0));
    }

    #[test]
    fn test_inclusive_threshold_pinned() {
        let classes = classify_deciles(&index(&[0.009, 0.068, 0.002]), &DecileThresholds::default()).unwrap();
        assert_eq!(classes.value(0, 0), Some(3.0));
        assert_eq!(classes.value(0, 1), Some(3.0));
        assert_eq!(classes.value(0, 2), Some(1.0));
    }

    #[test]
    fn test_masked_input_stays_masked() {
        let classes = classify_deciles(&index(&[f64::NAN, 0.5]), &DecileThresholds::default()).unwrap();
        assert!(!classes.is_valid(0, 0));
        assert!(!collapse3(&classes).unwrap().is_valid(0, 0));
    }

    #[test]
    fn test_collapse3_table() {
        let class10 = index(&(1..=10).map(f64::from).collect::<Vec<_>>());
        let class3 = collapse3(&class10).unwrap();
        let got: Vec<f64> = (0..10).map(|c| class3.value(0, c).unwrap()).collect();
        assert_eq!(got, vec![3.0, 3.0, 3.0, 2.0, 2.0, 2.0, 2.0, 2.0, 1.0, 1.0]);
        assert_eq!(collapse_class(0), None);
    }
}
