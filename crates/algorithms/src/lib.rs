//! # SEI Algorithms
//!
//! Raster stages of the Sagebrush Ecosystem Integrity pipeline.
//!
//! ## Modules
//!
//! - **algebra**: band math, remap, region reductions, explicit resampling
//! - **smoothing**: Gaussian neighborhood mean (ecological and management radii)
//! - **vector**: rasterization of boundaries, ecoregions and fire perimeters
//! - **disturbance**: fire-masked temporal mean over a year window
//! - **habitat**: calibration, Q-curve transform, composites, classification
//! - **ensemble**: median/low/high, differences, transitions, attribution, agreement
//! - **summary**: area-by-class tables

pub mod algebra;
pub mod disturbance;
pub mod ensemble;
pub mod habitat;
pub(crate) mod maybe_rayon;
pub mod smoothing;
pub mod summary;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::algebra::{
        binary, clamp, map, map_valid, product, reduce_region, remap, resample_to, scalar, BinaryOp, Reducer,
        RemapDefault, ResampleMethod,
    };
    pub use crate::disturbance::{disturbance_masked_mean, YearWindow, YearlyRasters};
    pub use crate::ensemble::{agreement_counts, attribution, difference, reduce_members, transition};
    pub use crate::habitat::{
        classify_deciles, collapse3, ecological_composite, management_composite, quality_layer, Calibration,
        CurveBoundary, Ecoregion, QualityBands, QualityContext, Variable,
    };
    pub use crate::smoothing::{gaussian_mean, GaussianParams, MaskPolicy, OutputMask};
    pub use crate::summary::{area_by_class, ClassArea};
    pub use crate::vector::{latest_attribute_year, rasterize_codes, rasterize_mask};
    pub use sei_core::prelude::*;
}
