//! # SEI Core
//!
//! Core types and I/O for the Sagebrush Ecosystem Integrity pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid with an explicit validity mask
//! - `RasterStack`: named multi-band rasters (pipeline inputs and outputs)
//! - `GeoTransform`, `GridSpec`, `CRS`: grid description and alignment checks
//! - Vector features for boundaries, ecoregions and fire perimeters
//! - GeoTIFF I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, GridSpec, Raster, RasterElement, RasterStack};
pub use vector::{AttributeValue, Feature, FeatureCollection};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, GridSpec, Raster, RasterElement, RasterStack};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
}
