//! Coordinate reference systems
//!
//! Rasters are never reprojected. A CRS is only compared, so it is kept as
//! the EPSG code read from the GeoTIFF key directory.

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG code of NAD83 / Conus Albers, the equal-area grid of the
/// sagebrush biome cover products
pub const CONUS_ALBERS_EPSG: u32 = 5070;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CRS {
    epsg: u32,
}

impl CRS {
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    pub fn conus_albers() -> Self {
        Self::from_epsg(CONUS_ALBERS_EPSG)
    }

    pub fn epsg(&self) -> Option<u32> {
        Some(self.epsg)
    }

    /// Same grid space; identical codes only
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        self.epsg == other.epsg
    }

    /// Label used in mismatch errors
    pub fn identifier(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conus_albers() {
        let crs = CRS::conus_albers();
        assert_eq!(crs.epsg(), Some(5070));
        assert_eq!(crs.to_string(), "EPSG:5070");
        assert!(crs.is_equivalent(&CRS::from_epsg(5070)));
        assert!(!crs.is_equivalent(&CRS::from_epsg(4326)));
    }

    #[test]
    fn test_serializes_as_code() {
        assert_eq!(serde_json::to_string(&CRS::conus_albers()).unwrap(), "5070");
        let back: CRS = serde_json::from_str("4326").unwrap();
        assert_eq!(back, CRS::from_epsg(4326));
    }
}
