//! Error types for SEI raster processing

use thiserror::Error;

/// Main error type for SEI operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch between '{left}' ({lr}x{lc}) and '{right}' ({rr}x{rc})")]
    SizeMismatch {
        left: String,
        right: String,
        lr: usize,
        lc: usize,
        rr: usize,
        rc: usize,
    },

    #[error("Grid mismatch between '{left}' and '{right}': {reason}")]
    GridMismatch {
        left: String,
        right: String,
        reason: String,
    },

    #[error("CRS mismatch between '{left}' ({left_crs}) and '{right}' ({right_crs})")]
    CrsMismatch {
        left: String,
        right: String,
        left_crs: String,
        right_crs: String,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("Missing band '{0}'")]
    MissingBand(String),

    #[error("Ensemble error: {reason} (missing members: {missing:?})")]
    Ensemble {
        reason: String,
        missing: Vec<String>,
    },

    #[error("Input '{0}' not available")]
    MissingInput(String),

    #[error("Scenario '{0}' cancelled")]
    Cancelled(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error stems from combining rasters on different grids.
    pub fn is_misalignment(&self) -> bool {
        matches!(
            self,
            Error::SizeMismatch { .. } | Error::GridMismatch { .. } | Error::CrsMismatch { .. }
        )
    }

    /// Whether resampling onto the other grid can resolve this error.
    /// A CRS mismatch cannot: resampling does not reproject.
    pub fn is_regriddable(&self) -> bool {
        matches!(self, Error::SizeMismatch { .. } | Error::GridMismatch { .. })
    }
}

/// Result type alias for SEI operations
pub type Result<T> = std::result::Result<T, Error>;
