//! Pipeline and ensemble products

use std::fs;
use std::path::Path;

use sei_algorithms::ensemble::CoreComponents;
use sei_algorithms::habitat::{Variable, CLASS10_LABELS, CLASS3_LABELS};
use sei_algorithms::summary::{area_by_class, ClassArea};
use sei_core::io::read_geotiff;
use sei_core::{Error, Raster, RasterStack, Result};

use crate::scenario::ScenarioMetadata;

pub const Q_SP: &str = "q_sp";
pub const Q_SPA: &str = "q_spa";
pub const Q_SPAH: &str = "q_spah";
pub const SEI_ECO: &str = "sei_eco";
pub const SEI_MGMT: &str = "sei_mgmt";
pub const CLASS10: &str = "class10";
pub const CLASS3: &str = "class3";

/// Band order of a pipeline output
pub fn output_band_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Variable::ALL.iter().map(|v| v.quality_band()).collect();
    names.extend([Q_SP, Q_SPA, Q_SPAH, SEI_ECO, SEI_MGMT, CLASS10, CLASS3]);
    names
}

/// Result of one scenario run; immutable once built
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub metadata: ScenarioMetadata,
    pub bands: RasterStack,
    pub area_class10: Vec<ClassArea>,
    pub area_class3: Vec<ClassArea>,
}

impl PipelineOutput {
    /// Build from a complete band stack, deriving the area tables
    pub fn new(metadata: ScenarioMetadata, bands: RasterStack) -> Result<Self> {
        for name in output_band_names() {
            bands.band(name)?;
        }
        let area_class10 = area_by_class(bands.band(CLASS10)?, &CLASS10_LABELS)?;
        let area_class3 = area_by_class(bands.band(CLASS3)?, &CLASS3_LABELS)?;
        Ok(Self {
            metadata,
            bands,
            area_class10,
            area_class3,
        })
    }

    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.bands.band(name)
    }

    pub fn sei_mgmt(&self) -> Result<&Raster<f64>> {
        self.band(SEI_MGMT)
    }

    pub fn class3(&self) -> Result<&Raster<f64>> {
        self.band(CLASS3)
    }

    /// Sage, perennial and annual quality bands
    pub fn core_components(&self) -> Result<CoreComponents<'_>> {
        Ok(CoreComponents {
            sage: self.band(Variable::Sagebrush.quality_band())?,
            perennial: self.band(Variable::PerennialGrass.quality_band())?,
            annual: self.band(Variable::AnnualGrass.quality_band())?,
        })
    }

    /// Read an output directory written by `OutputWriter::write_scenario`
    pub fn read(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let meta_path = dir.join("metadata.json");
        let text = fs::read_to_string(&meta_path)
            .map_err(|e| Error::MissingInput(format!("{}: {}", meta_path.display(), e)))?;
        let metadata: ScenarioMetadata =
            serde_json::from_str(&text).map_err(|e| Error::Other(format!("{}: {}", meta_path.display(), e)))?;

        let mut bands = RasterStack::new();
        for name in output_band_names() {
            let path = dir.join(format!("{}.tif", name));
            if !path.exists() {
                return Err(Error::MissingBand(format!("{} in {}", name, dir.display())));
            }
            bands.add_band(name, read_geotiff::<f64, _>(&path, None)?)?;
        }
        Self::new(metadata, bands)
    }
}

/// Products of one member relative to the baseline
#[derive(Debug, Clone)]
pub struct MemberProducts {
    pub member: String,
    /// `diff`, `transition`, `attr_sage`, `attr_perennial`, `attr_annual`
    pub bands: RasterStack,
}

/// Cross-member statistics of one scenario collection
#[derive(Debug, Clone)]
pub struct EnsembleOutput {
    pub metadata: ScenarioMetadata,
    /// Members that entered the statistics
    pub members: Vec<String>,
    /// Expected members without an output
    pub missing: Vec<String>,
    /// Median/low/high index, their differences and transitions, and
    /// agreement counts
    pub bands: RasterStack,
    pub member_products: Vec<MemberProducts>,
}
