//! Named multi-band rasters

use crate::error::{Error, Result};
use crate::raster::{GridSpec, Raster};

/// Ordered set of named `f64` bands on one grid.
///
/// Pipeline outputs and multi-band inputs (annual cover with its
/// annual-grass, perennial-grass and tree bands) are stacks. Adding a band
/// that is not aligned with the first one fails.
#[derive(Debug, Clone, Default)]
pub struct RasterStack {
    bands: Vec<(String, Raster<f64>)>,
}

impl RasterStack {
    pub fn new() -> Self {
        Self { bands: Vec::new() }
    }

    /// Append a band, replacing any band with the same name
    pub fn add_band(&mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<()> {
        let name = name.into();
        if let Some((_, first)) = self.bands.first() {
            first.ensure_aligned(&raster)?;
        }
        let raster = raster.named(name.clone());
        match self.bands.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = raster,
            None => self.bands.push((name, raster)),
        }
        Ok(())
    }

    /// Builder-style [`RasterStack::add_band`]
    pub fn with_band(mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<Self> {
        self.add_band(name, raster)?;
        Ok(self)
    }

    /// Band by name
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.bands
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
            .ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bands.iter().any(|(n, _)| n == name)
    }

    /// Band names in insertion order
    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.bands.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Grid of the stack, `None` while empty
    pub fn grid(&self) -> Option<GridSpec> {
        self.bands.first().map(|(_, r)| r.grid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let stack = RasterStack::new()
            .with_band("AFG", Raster::filled(2, 2, 10.0))
            .unwrap()
            .with_band("PFG", Raster::filled(2, 2, 20.0))
            .unwrap();
        assert_eq!(stack.band_names(), vec!["AFG", "PFG"]);
        assert_eq!(stack.band("PFG").unwrap().value(0, 0), Some(20.0));
        assert_eq!(stack.band("PFG").unwrap().name(), "PFG");
        assert!(matches!(stack.band("TRE"), Err(Error::MissingBand(_))));
    }

    #[test]
    fn test_replace_keeps_order() {
        let mut stack = RasterStack::new();
        stack.add_band("a", Raster::filled(2, 2, 1.0)).unwrap();
        stack.add_band("b", Raster::filled(2, 2, 2.0)).unwrap();
        stack.add_band("a", Raster::filled(2, 2, 3.0)).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.band("a").unwrap().value(1, 1), Some(3.0));
    }

    #[test]
    fn test_misaligned_band_rejected() {
        let mut stack = RasterStack::new();
        stack.add_band("a", Raster::filled(2, 2, 1.0)).unwrap();
        assert!(stack.add_band("b", Raster::filled(3, 2, 1.0)).is_err());
    }
}
