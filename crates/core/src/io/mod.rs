//! GeoTIFF reading and writing

mod native;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer, ReadOptions,
};
