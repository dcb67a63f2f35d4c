//! Run configuration
//!
//! A run is described by one JSON document. Every field has a default, so
//! `{}` is a valid configuration for a current-conditions run over
//! 2017-2020 with the built-in calibration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sei_algorithms::disturbance::YearWindow;
use sei_algorithms::habitat::{
    BiomassCoefficients, Calibration, CurveBoundary, DecileThresholds, EcoregionCodes, QCurve, Variable,
    DEFAULT_QUALITY_FLOOR,
};
use sei_core::{Error, Result};

use crate::scenario::{Driver, ScenarioConfig};

pub const DEFAULT_ECOLOGICAL_RADIUS: f64 = 560.0;
pub const DEFAULT_MANAGEMENT_RADIUS: f64 = 2000.0;

/// What to do when some ensemble members fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum MissingMemberPolicy {
    /// No ensemble statistics unless every member succeeded
    #[default]
    Refuse,
    /// Reduce over the members that succeeded, if there are enough of them
    Partial { min_members: usize },
}

/// Flat run parameters plus the scenario list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run_id: String,
    /// Default time window for scenarios that do not set their own
    pub window: YearWindow,
    pub ecological_radius: f64,
    pub management_radius: f64,
    pub thresholds: DecileThresholds,
    /// JSON map of variable to curve rows; built-in curves when absent
    pub curves_path: Option<PathBuf>,
    pub curve_boundary: CurveBoundary,
    pub quality_floor: f64,
    pub ecoregions: EcoregionCodes,
    /// Land-cover codes excluded from rangeland (tundra, high elevation)
    pub tundra_codes: Vec<i64>,
    pub fire_year_attribute: String,
    pub fire_masking: bool,
    /// Analysis cell size in map units; the input grid's when absent
    pub output_resolution: Option<f64>,
    /// Tile edge in cells for smoothing; whole rasters when absent
    pub tile_size: Option<usize>,
    /// Absolute index change counted as substantial in agreement counts
    pub substantial_change: f64,
    pub missing_members: MissingMemberPolicy,
    pub biomass: BiomassCoefficients,
    pub output_dir: PathBuf,
    pub scenarios: Vec<ScenarioConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: "sei".into(),
            window: YearWindow { start: 2017, end: 2020 },
            ecological_radius: DEFAULT_ECOLOGICAL_RADIUS,
            management_radius: DEFAULT_MANAGEMENT_RADIUS,
            thresholds: DecileThresholds::default(),
            curves_path: None,
            curve_boundary: CurveBoundary::default(),
            quality_floor: DEFAULT_QUALITY_FLOOR,
            ecoregions: EcoregionCodes::default(),
            tundra_codes: Vec::new(),
            fire_year_attribute: "FIRE_YEAR".into(),
            fire_masking: true,
            output_resolution: None,
            tile_size: None,
            substantial_change: 0.05,
            missing_members: MissingMemberPolicy::default(),
            biomass: BiomassCoefficients::new(),
            output_dir: PathBuf::from("output"),
            scenarios: vec![ScenarioConfig::current("current")],
        }
    }
}

impl RunConfig {
    /// Read and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config: RunConfig = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        // relative curve tables resolve against the config's directory
        if let (Some(curves), Some(dir)) = (&config.curves_path, path.parent()) {
            if curves.is_relative() {
                config.curves_path = Some(dir.join(curves));
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.run_id.trim().is_empty() {
            return Err(Error::Config("run_id must not be empty".into()));
        }
        self.window.validate()?;
        for (name, radius) in [
            ("ecological_radius", self.ecological_radius),
            ("management_radius", self.management_radius),
        ] {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(Error::Config(format!("{} must be positive, got {}", name, radius)));
            }
        }
        self.thresholds.validate()?;
        self.ecoregions.validate()?;
        if let Some(res) = self.output_resolution {
            if !(res.is_finite() && res > 0.0) {
                return Err(Error::Config(format!("output_resolution must be positive, got {}", res)));
            }
        }
        if self.tile_size == Some(0) {
            return Err(Error::Config("tile_size must be at least 1".into()));
        }
        if !(self.substantial_change.is_finite() && self.substantial_change >= 0.0) {
            return Err(Error::Config(format!(
                "substantial_change must be non-negative, got {}",
                self.substantial_change
            )));
        }
        if let MissingMemberPolicy::Partial { min_members } = self.missing_members {
            if min_members < 1 {
                return Err(Error::Config("min_members must be at least 1".into()));
            }
        }
        if self.scenarios.is_empty() {
            return Err(Error::Config("no scenarios configured".into()));
        }

        let mut ids = HashSet::new();
        for scenario in &self.scenarios {
            if !ids.insert(scenario.id.as_str()) {
                return Err(Error::Config(format!("duplicate scenario id '{}'", scenario.id)));
            }
            scenario.validate()?;
        }
        for scenario in &self.scenarios {
            if scenario.driver == Driver::Current {
                continue;
            }
            let baseline = self.baseline_for(scenario).ok_or_else(|| {
                Error::Config(format!("scenario '{}' has no current-conditions baseline", scenario.id))
            })?;
            if baseline.driver != Driver::Current {
                return Err(Error::Config(format!(
                    "baseline '{}' of scenario '{}' is not a current-conditions scenario",
                    baseline.id, scenario.id
                )));
            }
            if scenario.driver == Driver::Biomass {
                for v in Variable::ALL.iter().filter(|v| v.is_projected()) {
                    if !self.biomass.contains_key(v) {
                        return Err(Error::Config(format!(
                            "scenario '{}' uses biomass drivers but no coefficients are given for {}",
                            scenario.id, v
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Baseline scenario of `scenario`: the named one, or the first
    /// current-conditions scenario
    pub fn baseline_for(&self, scenario: &ScenarioConfig) -> Option<&ScenarioConfig> {
        match &scenario.baseline {
            Some(id) => self.scenarios.iter().find(|s| &s.id == id),
            None => self.scenarios.iter().find(|s| s.driver == Driver::Current),
        }
    }

    /// Calibration for this run: curve table, thresholds, floor and
    /// biomass coefficients
    pub fn calibration(&self) -> Result<Calibration> {
        let mut calibration = Calibration {
            thresholds: self.thresholds.clone(),
            quality_floor: self.quality_floor,
            biomass: self.biomass.clone(),
            ..Calibration::default()
        };
        if let Some(path) = &self.curves_path {
            let text = fs::read_to_string(path)?;
            let curves: std::collections::BTreeMap<Variable, QCurve> = serde_json::from_str(&text)
                .map_err(|e| Error::Calibration(format!("{}: {}", path.display(), e)))?;
            calibration.curves = curves;
        }
        calibration.validate()?;
        Ok(calibration)
    }
}
