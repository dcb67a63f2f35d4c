//! Habitat-suitability stages
//!
//! - **calibration**: Q-curves, decile thresholds, ecoregion codes, biomass coefficients
//! - **qcurve**: piecewise-linear quality transform merged over ecoregions
//! - **composite**: ecological- and management-scale index
//! - **classify**: deciles and the 3-class collapse

pub mod calibration;
mod classify;
mod composite;
mod qcurve;

pub use calibration::{
    default_curves, BiomassCoefficients, Calibration, DecileThresholds, Ecoregion, EcoregionCodes,
    LinearCoefficients, QCurve, QCurveRow, Variable, DEFAULT_QUALITY_FLOOR,
};
pub use classify::{
    classify_deciles, collapse3, collapse_class, CLASS10_LABELS, CLASS3_LABELS, CORE, GROW, OTHER,
};
pub use composite::{ecological_composite, management_composite, EcologicalComposite, QualityBands};
pub use qcurve::{hsi_transform, quality_layer, CurveBoundary, QualityContext};
