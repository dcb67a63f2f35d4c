//! Composite index builder
//!
//! The ecological-scale index is the product of the five quality bands;
//! the management-scale index is that product smoothed at a larger
//! radius and restricted back to rangeland.

use crate::algebra::{binary, BinaryOp};
use sei_core::raster::Raster;
use sei_core::Result;
use tracing::debug;

/// The five quality bands of one scenario
#[derive(Debug, Clone)]
pub struct QualityBands {
    pub sage: Raster<f64>,
    pub perennial: Raster<f64>,
    pub annual: Raster<f64>,
    pub human: Raster<f64>,
    pub tree: Raster<f64>,
}

/// Ecological-scale composite with its partial products
#[derive(Debug, Clone)]
pub struct EcologicalComposite {
    /// sage x perennial
    pub q_sp: Raster<f64>,
    /// q_sp x annual
    pub q_spa: Raster<f64>,
    /// q_spa x human
    pub q_spah: Raster<f64>,
    /// q_spah x tree
    pub sei_eco: Raster<f64>,
}

/// Multiply the quality bands and clip every product to the study area
pub fn ecological_composite(q: &QualityBands, study_area: &Raster<f64>) -> Result<EcologicalComposite> {
    debug!(shape = ?q.sage.shape(), "Building ecological composite");
    let clip = |r: Raster<f64>, name: &str| -> Result<Raster<f64>> { Ok(r.update_mask(study_area)?.named(name)) };

    let q_sp = binary(&q.sage, &q.perennial, BinaryOp::Multiply)?;
    let q_spa = binary(&q_sp, &q.annual, BinaryOp::Multiply)?;
    let q_spah = binary(&q_spa, &q.human, BinaryOp::Multiply)?;
    let sei_eco = binary(&q_spah, &q.tree, BinaryOp::Multiply)?;

    Ok(EcologicalComposite {
        q_sp: clip(q_sp, "q_sp")?,
        q_spa: clip(q_spa, "q_spa")?,
        q_spah: clip(q_spah, "q_spah")?,
        sei_eco: clip(sei_eco, "sei_eco")?,
    })
}

/// Management-scale index from the ecological composite.
///
/// `smooth` receives the zero-filled composite; it is a parameter so the
/// caller decides between a whole-raster and a tiled pass.
pub fn management_composite<S>(sei_eco: &Raster<f64>, rangeland: &Raster<f64>, smooth: S) -> Result<Raster<f64>>
where
    S: FnOnce(&Raster<f64>) -> Result<Raster<f64>>,
{
    let filled = sei_eco.unmask(0.0);
    let smoothed = smooth(&filled)?;
    Ok(binary(&smoothed, rangeland, BinaryOp::Multiply)?.named("sei_mgmt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoothing::{gaussian_mean, GaussianParams};
    use approx::assert_relative_eq;
    use sei_core::GeoTransform;

    fn band(value: f64, name: &str) -> Raster<f64> {
        let mut r = Raster::filled(3, 3, value);
        r.set_transform(GeoTransform::square(0.0, 270.0, 90.0));
        r.named(name)
    }

    fn bands() -> QualityBands {
        QualityBands {
            sage: band(0.5, "q_sage"),
            perennial: band(0.8, "q_perennial"),
            annual: band(0.9, "q_annual"),
            human: band(1.0, "q_human"),
            tree: band(0.6, "q_tree"),
        }
    }

    #[test]
    fn test_partial_products() {
        let study = band(1.0, "study_area");
        let c = ecological_composite(&bands(), &study).unwrap();
        assert_relative_eq!(c.q_sp.value(1, 1).unwrap(), 0.4);
        assert_relative_eq!(c.q_spa.value(1, 1).unwrap(), 0.36);
        assert_relative_eq!(c.q_spah.value(1, 1).unwrap(), 0.36);
        assert_relative_eq!(c.sei_eco.value(1, 1).unwrap(), 0.216);
        assert_eq!(c.sei_eco.name(), "sei_eco");
    }

    #[test]
    fn test_clipped_to_study_area() {
        let mut study = band(1.0, "study_area");
        study.set(0, 0, 0.0).unwrap();
        let c = ecological_composite(&bands(), &study).unwrap();
        assert!(!c.sei_eco.is_valid(0, 0));
        assert!(!c.q_sp.is_valid(0, 0));
        assert_eq!(c.sei_eco.valid_count(), 8);
    }

    #[test]
    fn test_management_composite_masks_non_rangeland() {
        let mut eco = band(0.2, "sei_eco");
        eco.set_invalid(0, 0).unwrap();
        let mut rangeland = band(1.0, "rangeland");
        rangeland.set_invalid(2, 2).unwrap();

        let params = GaussianParams::with_radius(90.0);
        let mgmt = management_composite(&eco, &rangeland, |r| gaussian_mean(r, &params)).unwrap();
        assert_eq!(mgmt.name(), "sei_mgmt");
        assert!(!mgmt.is_valid(2, 2));
        // the zero-filled cell pulls its neighborhood down
        assert!(mgmt.value(0, 0).unwrap() < 0.2);
        assert!(mgmt.value(0, 0).unwrap() > 0.0);
    }
}
