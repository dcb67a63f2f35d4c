//! Input boundary
//!
//! The pipeline never reads files itself; it asks an `InputSource` for
//! each raster and vector layer. `MemorySource` backs tests and
//! synthetic runs, `GeoTiffDirectorySource` reads a directory laid out as
//!
//! ```text
//! root/
//!   cover/<variable>/<year>.tif        sagebrush, annual_grass, perennial_grass, tree
//!   human_modification.tif
//!   rangeland.tif
//!   land_cover.tif                     optional
//!   study_area.json                    FeatureCollection
//!   ecoregions.json                    FeatureCollection
//!   fire_perimeters.json               FeatureCollection
//!   drivers/<driver>/<member>/<variable>.tif
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sei_algorithms::habitat::Variable;
use sei_core::io::read_geotiff;
use sei_core::vector::FeatureCollection;
use sei_core::{Error, GridSpec, Raster, Result};
use tracing::debug;

use crate::scenario::Driver;

/// Provider of every input layer of a run
pub trait InputSource: Send + Sync {
    /// Short description for logs and reports
    fn describe(&self) -> String;

    /// Grid of the cover inputs
    fn grid(&self) -> Result<GridSpec>;

    /// Percent cover of an annual variable for one year
    fn annual_cover(&self, variable: Variable, year: i32) -> Result<Raster<f64>>;

    /// Static human-modification index, possibly on its own grid
    fn human_modification(&self) -> Result<Raster<f64>>;

    /// Binary rangeland raster
    fn rangeland(&self) -> Result<Raster<f64>>;

    /// Categorical land cover used for the tundra exclusion, if available
    fn land_cover(&self) -> Result<Option<Raster<f64>>>;

    fn study_area(&self) -> Result<FeatureCollection>;

    fn ecoregions(&self) -> Result<FeatureCollection>;

    fn fire_perimeters(&self) -> Result<FeatureCollection>;

    /// Ratio, delta or biomass raster of one member and variable
    fn driver(&self, driver: Driver, member: &str, variable: Variable) -> Result<Raster<f64>>;
}

fn not_annual(variable: Variable) -> Error {
    Error::InvalidParameter {
        name: "variable",
        value: variable.to_string(),
        reason: "has no per-year cover product".into(),
    }
}

/// In-memory layers
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    grid: Option<GridSpec>,
    cover: HashMap<(Variable, i32), Raster<f64>>,
    human_modification: Option<Raster<f64>>,
    rangeland: Option<Raster<f64>>,
    land_cover: Option<Raster<f64>>,
    study_area: Option<FeatureCollection>,
    ecoregions: Option<FeatureCollection>,
    fire_perimeters: FeatureCollection,
    drivers: HashMap<(Driver, String, Variable), Raster<f64>>,
}

impl MemorySource {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid: Some(grid),
            ..Self::default()
        }
    }

    pub fn with_cover(mut self, variable: Variable, year: i32, raster: Raster<f64>) -> Self {
        let raster = raster.named(format!("{}_{}", variable, year));
        self.cover.insert((variable, year), raster);
        self
    }

    pub fn with_human_modification(mut self, raster: Raster<f64>) -> Self {
        self.human_modification = Some(raster.named("human_modification"));
        self
    }

    pub fn with_rangeland(mut self, raster: Raster<f64>) -> Self {
        self.rangeland = Some(raster.named("rangeland"));
        self
    }

    pub fn with_land_cover(mut self, raster: Raster<f64>) -> Self {
        self.land_cover = Some(raster.named("land_cover"));
        self
    }

    pub fn with_study_area(mut self, features: FeatureCollection) -> Self {
        self.study_area = Some(features);
        self
    }

    pub fn with_ecoregions(mut self, features: FeatureCollection) -> Self {
        self.ecoregions = Some(features);
        self
    }

    pub fn with_fire_perimeters(mut self, features: FeatureCollection) -> Self {
        self.fire_perimeters = features;
        self
    }

    pub fn with_driver(mut self, driver: Driver, member: &str, variable: Variable, raster: Raster<f64>) -> Self {
        let raster = raster.named(format!("{}_{}_{}", driver, member, variable));
        self.drivers.insert((driver, member.to_string(), variable), raster);
        self
    }

    pub fn remove_driver(&mut self, driver: Driver, member: &str, variable: Variable) {
        self.drivers.remove(&(driver, member.to_string(), variable));
    }
}

impl InputSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} cover rasters)", self.cover.len())
    }

    fn grid(&self) -> Result<GridSpec> {
        self.grid.clone().ok_or_else(|| Error::MissingInput("grid".into()))
    }

    fn annual_cover(&self, variable: Variable, year: i32) -> Result<Raster<f64>> {
        if !variable.is_annual() {
            return Err(not_annual(variable));
        }
        self.cover
            .get(&(variable, year))
            .cloned()
            .ok_or_else(|| Error::MissingInput(format!("{}_{}", variable, year)))
    }

    fn human_modification(&self) -> Result<Raster<f64>> {
        self.human_modification
            .clone()
            .ok_or_else(|| Error::MissingInput("human_modification".into()))
    }

    fn rangeland(&self) -> Result<Raster<f64>> {
        self.rangeland.clone().ok_or_else(|| Error::MissingInput("rangeland".into()))
    }

    fn land_cover(&self) -> Result<Option<Raster<f64>>> {
        Ok(self.land_cover.clone())
    }

    fn study_area(&self) -> Result<FeatureCollection> {
        self.study_area.clone().ok_or_else(|| Error::MissingInput("study_area".into()))
    }

    fn ecoregions(&self) -> Result<FeatureCollection> {
        self.ecoregions.clone().ok_or_else(|| Error::MissingInput("ecoregions".into()))
    }

    fn fire_perimeters(&self) -> Result<FeatureCollection> {
        Ok(self.fire_perimeters.clone())
    }

    fn driver(&self, driver: Driver, member: &str, variable: Variable) -> Result<Raster<f64>> {
        self.drivers
            .get(&(driver, member.to_string(), variable))
            .cloned()
            .ok_or_else(|| Error::MissingInput(format!("{}/{}/{}", driver, member, variable)))
    }
}

/// GeoTIFF rasters and JSON feature collections under one directory
#[derive(Debug, Clone)]
pub struct GeoTiffDirectorySource {
    root: PathBuf,
}

impl GeoTiffDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cover_path(&self, variable: Variable, year: i32) -> PathBuf {
        self.root.join("cover").join(variable.key()).join(format!("{}.tif", year))
    }

    pub fn driver_path(&self, driver: Driver, member: &str, variable: Variable) -> PathBuf {
        self.root
            .join("drivers")
            .join(driver.key())
            .join(member)
            .join(format!("{}.tif", variable.key()))
    }

    fn raster(&self, path: &Path, name: String) -> Result<Raster<f64>> {
        if !path.exists() {
            return Err(Error::MissingInput(path.display().to_string()));
        }
        debug!(path = %path.display(), "Reading raster");
        Ok(read_geotiff::<f64, _>(path, None)?.named(name))
    }

    fn features(&self, file: &str) -> Result<FeatureCollection> {
        let path = self.root.join(file);
        if !path.exists() {
            return Err(Error::MissingInput(path.display().to_string()));
        }
        FeatureCollection::read_json(&path)
    }
}

impl InputSource for GeoTiffDirectorySource {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    fn grid(&self) -> Result<GridSpec> {
        Ok(self.rangeland()?.grid())
    }

    fn annual_cover(&self, variable: Variable, year: i32) -> Result<Raster<f64>> {
        if !variable.is_annual() {
            return Err(not_annual(variable));
        }
        self.raster(&self.cover_path(variable, year), format!("{}_{}", variable, year))
    }

    fn human_modification(&self) -> Result<Raster<f64>> {
        self.raster(&self.root.join("human_modification.tif"), "human_modification".into())
    }

    fn rangeland(&self) -> Result<Raster<f64>> {
        self.raster(&self.root.join("rangeland.tif"), "rangeland".into())
    }

    fn land_cover(&self) -> Result<Option<Raster<f64>>> {
        let path = self.root.join("land_cover.tif");
        if !path.exists() {
            return Ok(None);
        }
        self.raster(&path, "land_cover".into()).map(Some)
    }

    fn study_area(&self) -> Result<FeatureCollection> {
        self.features("study_area.json")
    }

    fn ecoregions(&self) -> Result<FeatureCollection> {
        self.features("ecoregions.json")
    }

    fn fire_perimeters(&self) -> Result<FeatureCollection> {
        self.features("fire_perimeters.json")
    }

    fn driver(&self, driver: Driver, member: &str, variable: Variable) -> Result<Raster<f64>> {
        self.raster(
            &self.driver_path(driver, member, variable),
            format!("{}_{}_{}", driver, member, variable),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sei_core::io::write_geotiff;
    use sei_core::{GeoTransform, CRS};

    fn grid() -> GridSpec {
        GridSpec::new(2, 3, GeoTransform::square(-1_500_000.0, 2_400_000.0, 90.0), Some(CRS::conus_albers()))
    }

    #[test]
    fn test_memory_source_missing_inputs() {
        let source = MemorySource::new(grid()).with_cover(Variable::Tree, 2019, grid().filled(3.0));
        assert_eq!(source.annual_cover(Variable::Tree, 2019).unwrap().name(), "tree_2019");
        assert!(matches!(
            source.annual_cover(Variable::Tree, 2020),
            Err(Error::MissingInput(_))
        ));
        assert!(source.annual_cover(Variable::HumanModification, 2019).is_err());
        assert!(source.land_cover().unwrap().is_none());
        assert!(source.fire_perimeters().unwrap().is_empty());
    }

    #[test]
    fn test_directory_source_reads_layout() {
        let dir = tempfile::tempdir().unwrap();
        let source = GeoTiffDirectorySource::new(dir.path());

        write_geotiff(&grid().filled(1.0), dir.path().join("rangeland.tif")).unwrap();
        write_geotiff(&grid().filled(12.5), source.cover_path(Variable::Sagebrush, 2018)).unwrap();
        write_geotiff(&grid().filled(1.1), source.driver_path(Driver::Ratio, "gcm_a", Variable::AnnualGrass)).unwrap();
        std::fs::write(dir.path().join("fire_perimeters.json"), r#"{"features": []}"#).unwrap();

        let g = source.grid().unwrap();
        assert_eq!(g.shape(), (2, 3));
        assert_eq!(g.cell_size(), 90.0);
        assert_eq!((g.transform.origin_x, g.transform.origin_y), (-1_500_000.0, 2_400_000.0));
        assert_eq!(g.crs, Some(CRS::conus_albers()));
        assert_eq!(g, grid());
        assert!(g.ensure_matches(&source.rangeland().unwrap()).is_ok());

        let sage = source.annual_cover(Variable::Sagebrush, 2018).unwrap();
        assert_eq!(sage.name(), "sagebrush_2018");
        assert_eq!(sage.value(1, 2), Some(12.5));

        let ratio = source.driver(Driver::Ratio, "gcm_a", Variable::AnnualGrass).unwrap();
        assert!((ratio.value(0, 0).unwrap() - 1.1).abs() < 1e-6);

        assert!(source.fire_perimeters().unwrap().is_empty());
        assert!(matches!(source.study_area(), Err(Error::MissingInput(_))));
        assert!(source.land_cover().unwrap().is_none());
    }
}
