//! Area-by-class summaries
//!
//! Counts the cells of each class of a categorical raster and converts the
//! count to hectares from the grid's cell area.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sei_core::raster::Raster;
use sei_core::{Error, Result};

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// One row of an area table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassArea {
    pub class: u8,
    pub label: String,
    pub cells: usize,
    pub hectares: f64,
}

/// Area per class, in the order of `labels`.
///
/// Classes listed in `labels` but absent from the raster get a zero row.
/// Valid cells whose value is not a listed class are an error, since the
/// table would silently drop area otherwise.
pub fn area_by_class(classes: &Raster<f64>, labels: &[(u8, &str)]) -> Result<Vec<ClassArea>> {
    let mut counts: BTreeMap<u8, usize> = labels.iter().map(|&(c, _)| (c, 0)).collect();

    for (row, col, v) in classes.iter_valid() {
        let class = v as u8;
        match counts.get_mut(&class) {
            Some(n) if f64::from(class) == v => *n += 1,
            _ => {
                return Err(Error::Algorithm(format!(
                    "'{}' has unlabelled class value {} at ({}, {})",
                    classes.name(),
                    v,
                    row,
                    col
                )))
            }
        }
    }

    let cell_ha = classes.transform().cell_area() / SQUARE_METERS_PER_HECTARE;
    Ok(labels
        .iter()
        .map(|&(class, label)| {
            let cells = counts.get(&class).copied().unwrap_or(0);
            ClassArea {
                class,
                label: label.to_string(),
                cells,
                hectares: cells as f64 * cell_ha,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sei_core::GeoTransform;

    const LABELS: [(u8, &str); 3] = [(1, "core"), (2, "grow"), (3, "other")];

    fn classes(values: Vec<f64>) -> Raster<f64> {
        let n = values.len();
        let mut r = Raster::from_vec(values, 1, n).unwrap().named("class3");
        r.set_transform(GeoTransform::square(0.0, 90.0, 90.0));
        r
    }

    #[test]
    fn test_area_table() {
        let table = area_by_class(&classes(vec![1.0, 1.0, 3.0, f64::NAN]), &LABELS).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].cells, 2);
        assert_relative_eq!(table[0].hectares, 1.62);
        assert_eq!(table[1].cells, 0);
        assert_eq!(table[2].label, "other");
    }

    #[test]
    fn test_unlabelled_class_rejected() {
        assert!(area_by_class(&classes(vec![1.0, 7.0]), &LABELS).is_err());
        assert!(area_by_class(&classes(vec![1.5]), &LABELS).is_err());
    }
}
