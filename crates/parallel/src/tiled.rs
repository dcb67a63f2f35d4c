//! Tiled processing for large rasters
//!
//! Neighborhood operations read cells up to the kernel half-width away, so
//! every tile is processed on a window padded by a halo of at least that
//! width. Only the tile's own core is copied back, which makes the tiled
//! result identical to an untiled run.

use crate::cancel::CancelToken;
use crate::strategy::{ParallelStrategy, ProcessingMode};
use sei_core::raster::{Raster, RasterElement};
use sei_core::{Error, Result};
use tracing::debug;

/// A tile of a raster: a core region plus the padded window read for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Row of the core's upper-left cell in the source raster
    pub row: usize,
    /// Column of the core's upper-left cell in the source raster
    pub col: usize,
    /// Rows in the core
    pub rows: usize,
    /// Columns in the core
    pub cols: usize,
    /// Upper-left row of the padded window
    pub window_row: usize,
    /// Upper-left column of the padded window
    pub window_col: usize,
    /// Rows in the padded window
    pub window_rows: usize,
    /// Columns in the padded window
    pub window_cols: usize,
}

impl Tile {
    /// Offset of the core inside the padded window
    pub fn core_offset(&self) -> (usize, usize) {
        (self.row - self.window_row, self.col - self.window_col)
    }
}

/// Iterator over non-overlapping cores covering a raster
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_size: usize,
    halo: usize,
    current_row: usize,
    current_col: usize,
}

impl TileIterator {
    pub fn new(total_rows: usize, total_cols: usize, tile_size: usize, halo: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            tile_size: tile_size.max(1),
            halo,
            current_row: 0,
            current_col: 0,
        }
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let rows = self.tile_size.min(self.total_rows - self.current_row);
        let cols = self.tile_size.min(self.total_cols - self.current_col);

        let window_row = self.current_row.saturating_sub(self.halo);
        let window_col = self.current_col.saturating_sub(self.halo);
        let window_row_end = (self.current_row + rows + self.halo).min(self.total_rows);
        let window_col_end = (self.current_col + cols + self.halo).min(self.total_cols);

        let tile = Tile {
            row: self.current_row,
            col: self.current_col,
            rows,
            cols,
            window_row,
            window_col,
            window_rows: window_row_end - window_row,
            window_cols: window_col_end - window_col,
        };

        self.current_col += self.tile_size;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.tile_size;
        }

        Some(tile)
    }
}

/// Processor for tiled raster operations
#[derive(Debug, Clone)]
pub struct TiledProcessor {
    tile_size: usize,
    halo: usize,
    mode: ProcessingMode,
    cancel: Option<CancelToken>,
}

impl TiledProcessor {
    /// Create a new tiled processor; `halo` must cover the kernel half-width
    pub fn new(tile_size: usize, halo: usize) -> Self {
        Self {
            tile_size,
            halo,
            mode: ProcessingMode::default(),
            cancel: None,
        }
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn halo(&self) -> usize {
        self.halo
    }

    /// Apply `f` to every padded tile window and stitch the cores.
    ///
    /// `f` must return a raster with the shape of the window it was given.
    pub fn map<T, U, F>(&self, input: &Raster<T>, f: F) -> Result<Raster<U>>
    where
        T: RasterElement,
        U: RasterElement,
        F: Fn(&Raster<T>) -> Result<Raster<U>> + Sync + Send,
    {
        if self.tile_size == 0 {
            return Err(Error::InvalidParameter {
                name: "tile_size",
                value: "0".into(),
                reason: "tiles must hold at least one cell".into(),
            });
        }

        let (rows, cols) = input.shape();
        let tiles: Vec<Tile> = TileIterator::new(rows, cols, self.tile_size, self.halo).collect();
        debug!(
            raster = input.name(),
            tiles = tiles.len(),
            tile_size = self.tile_size,
            halo = self.halo,
            "tiled map"
        );

        let results = self.mode.try_map(tiles, |tile| {
            if let Some(token) = &self.cancel {
                token.check(input.name())?;
            }
            let window = input.window(
                tile.window_row,
                tile.window_col,
                tile.window_rows,
                tile.window_cols,
            )?;
            let processed = f(&window)?;
            if processed.shape() != window.shape() {
                return Err(Error::SizeMismatch {
                    left: window.name().to_string(),
                    right: processed.name().to_string(),
                    lr: window.rows(),
                    lc: window.cols(),
                    rr: processed.rows(),
                    rc: processed.cols(),
                });
            }
            Ok((tile, processed))
        })?;

        let mut output = input.with_same_meta::<U>();
        for (tile, processed) in results {
            let (off_row, off_col) = tile.core_offset();
            output.paste(&processed, off_row, off_col, tile.row, tile.col, tile.rows, tile.cols)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_iterator_first_tile() {
        let tiles: Vec<_> = TileIterator::new(100, 100, 32, 3).collect();
        assert_eq!(tiles.len(), 16);
        assert_eq!((tiles[0].row, tiles[0].col), (0, 0));
        assert_eq!((tiles[0].window_rows, tiles[0].window_cols), (35, 35));
        assert_eq!(tiles[5].core_offset(), (3, 3));
    }

    #[test]
    fn test_tile_coverage_is_exact() {
        let (rows, cols) = (37, 53);
        let mut covered = vec![vec![0u8; cols]; rows];
        for tile in TileIterator::new(rows, cols, 16, 4) {
            for r in tile.row..tile.row + tile.rows {
                for c in tile.col..tile.col + tile.cols {
                    covered[r][c] += 1;
                }
            }
            assert!(tile.window_row + tile.window_rows <= rows);
            assert!(tile.window_col + tile.window_cols <= cols);
        }
        for r in 0..rows {
            for c in 0..cols {
                assert_eq!(covered[r][c], 1, "Cell ({}, {}) covered {} times", r, c, covered[r][c]);
            }
        }
    }

    #[test]
    fn test_map_with_halo_matches_global_result() {
        let mut input: Raster<f64> = Raster::new(20, 23);
        for r in 0..20 {
            for c in 0..23 {
                input.set(r, c, (r * 31 + c * 7) as f64).unwrap();
            }
        }
        // 3x3 box sum needs a halo of one cell
        let box_sum = |src: &Raster<f64>| -> Result<Raster<f64>> {
            let mut out = src.like(0.0);
            for r in 0..src.rows() {
                for c in 0..src.cols() {
                    let mut s = 0.0;
                    for dr in -1isize..=1 {
                        for dc in -1isize..=1 {
                            let (nr, nc) = (r as isize + dr, c as isize + dc);
                            if nr >= 0 && nc >= 0 {
                                if let Some(v) = src.value(nr as usize, nc as usize) {
                                    s += v;
                                }
                            }
                        }
                    }
                    out.set(r, c, s)?;
                }
            }
            Ok(out)
        };

        let global = box_sum(&input).unwrap();
        let tiled = TiledProcessor::new(6, 1).map(&input, box_sum).unwrap();
        assert_eq!(global.data(), tiled.data());

        // Without a halo the seams differ
        let seamed = TiledProcessor::new(6, 0).map(&input, box_sum).unwrap();
        assert_ne!(global.data(), seamed.data());
    }

    #[test]
    fn test_cancelled_processor_fails() {
        let token = CancelToken::new();
        token.cancel();
        let input: Raster<f64> = Raster::filled(4, 4, 1.0);
        let result = TiledProcessor::new(2, 0)
            .with_cancel(token)
            .map(&input, |w| Ok(w.clone()));
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }
}
