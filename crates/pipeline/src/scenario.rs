//! Scenarios and scenario collections
//!
//! A `ScenarioConfig` in the run file expands into a `ScenarioCollection`:
//! one `Scenario` per ensemble member, identical apart from the member.

use serde::{Deserialize, Serialize};
use std::fmt;

use sei_algorithms::disturbance::YearWindow;
use sei_core::{Error, Result};

use crate::config::RunConfig;

/// How future cover is derived from current cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    /// Observed cover, no projection
    #[default]
    Current,
    /// `future = current x ratio`
    Ratio,
    /// `future = clamp(current + delta, 0, region max of current)`
    Delta,
    /// `future = clamp(b0 + b1 x biomass, 0, 100)`
    Biomass,
}

impl Driver {
    /// Directory name of the driver rasters
    pub fn key(self) -> &'static str {
        match self {
            Driver::Current => "current",
            Driver::Ratio => "ratio",
            Driver::Delta => "delta",
            Driver::Biomass => "biomass",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One scenario entry of the run file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub id: String,
    /// Human-readable label, e.g. an RCP/epoch name
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub driver: Driver,
    /// Ensemble members (climate models); empty for a single run
    #[serde(default)]
    pub members: Vec<String>,
    /// Current-conditions scenario to compare against
    #[serde(default)]
    pub baseline: Option<String>,
    #[serde(default)]
    pub window: Option<YearWindow>,
    #[serde(default)]
    pub fire_masking: Option<bool>,
    #[serde(default)]
    pub ecological_radius: Option<f64>,
    #[serde(default)]
    pub management_radius: Option<f64>,
}

impl ScenarioConfig {
    /// A current-conditions scenario with run defaults
    pub fn current(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            driver: Driver::Current,
            members: Vec::new(),
            baseline: None,
            window: None,
            fire_masking: None,
            ecological_radius: None,
            management_radius: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() || self.id.contains(['/', '\\']) {
            return Err(Error::Config(format!("invalid scenario id '{}'", self.id)));
        }
        if let Some(window) = &self.window {
            window.validate()?;
        }
        match self.driver {
            Driver::Current if !self.members.is_empty() => Err(Error::Config(format!(
                "current-conditions scenario '{}' cannot have ensemble members",
                self.id
            ))),
            Driver::Ratio | Driver::Delta | Driver::Biomass if self.members.is_empty() => Err(Error::Config(
                format!("scenario '{}' uses {} drivers but lists no members", self.id, self.driver),
            )),
            _ => Ok(()),
        }
    }

    /// Resolve run defaults and expand into one scenario per member
    pub fn expand(&self, run: &RunConfig) -> ScenarioCollection {
        let base = Scenario {
            id: self.id.clone(),
            label: self.label.clone().unwrap_or_else(|| self.id.clone()),
            driver: self.driver,
            member: None,
            window: self.window.unwrap_or(run.window),
            fire_masking: self.fire_masking.unwrap_or(run.fire_masking),
            ecological_radius: self.ecological_radius.unwrap_or(run.ecological_radius),
            management_radius: self.management_radius.unwrap_or(run.management_radius),
        };
        let scenarios = if self.members.is_empty() {
            vec![base]
        } else {
            self.members
                .iter()
                .map(|m| Scenario {
                    member: Some(m.clone()),
                    ..base.clone()
                })
                .collect()
        };
        ScenarioCollection {
            id: self.id.clone(),
            baseline: run.baseline_for(self).map(|b| b.id.clone()),
            scenarios,
        }
    }
}

/// Fully resolved parameters of one pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub label: String,
    pub driver: Driver,
    /// Ensemble member, `None` for current conditions
    pub member: Option<String>,
    pub window: YearWindow,
    pub fire_masking: bool,
    pub ecological_radius: f64,
    pub management_radius: f64,
}

impl Scenario {
    /// Unique key: `id` or `id/member`
    pub fn key(&self) -> String {
        match &self.member {
            Some(m) => format!("{}/{}", self.id, m),
            None => self.id.clone(),
        }
    }

    pub fn member_label(&self) -> &str {
        self.member.as_deref().unwrap_or("current")
    }

    pub fn metadata(&self, run_id: &str) -> ScenarioMetadata {
        ScenarioMetadata {
            run_id: run_id.to_string(),
            scenario_id: self.id.clone(),
            label: self.label.clone(),
            member: self.member_label().to_string(),
        }
    }
}

/// Ordered scenarios sharing all parameters except the member
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioCollection {
    pub id: String,
    /// Id of the current-conditions scenario this collection is compared to
    pub baseline: Option<String>,
    pub scenarios: Vec<Scenario>,
}

impl ScenarioCollection {
    /// Whether the collection is an ensemble rather than a single run
    pub fn is_ensemble(&self) -> bool {
        self.scenarios.iter().any(|s| s.member.is_some())
    }

    pub fn members(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.member_label().to_string()).collect()
    }
}

/// Identification written next to every output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub run_id: String,
    pub scenario_id: String,
    pub label: String,
    pub member: String,
}
