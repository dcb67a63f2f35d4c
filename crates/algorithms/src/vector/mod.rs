//! Vector inputs turned into rasters on the analysis grid

mod rasterize;

pub use rasterize::{latest_attribute_year, rasterize_codes, rasterize_mask};
