//! # SEI Parallel
//!
//! Execution strategies for SEI raster processing.
//!
//! This crate provides:
//! - Processing modes (sequential, rayon, fixed-size pool)
//! - Tiled processing with a halo for neighborhood operations
//! - Cooperative cancellation of scenario runs

pub mod cancel;
pub mod strategy;
pub mod tiled;

pub use cancel::CancelToken;
pub use strategy::{ParallelStrategy, ProcessingMode};
pub use tiled::{Tile, TileIterator, TiledProcessor};
