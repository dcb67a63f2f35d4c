//! Per-scenario outcome of a run

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sei_core::{Error, Result};

/// Outcome of one scenario or ensemble aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    Succeeded,
    Failed { error: String },
    Cancelled,
}

impl RunStatus {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Cancelled(_) => RunStatus::Cancelled,
            other => RunStatus::Failed {
                error: other.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// `id` or `id/member`
    pub key: String,
    pub scenario_id: String,
    pub member: String,
    #[serde(flatten)]
    pub status: RunStatus,
    /// Files written for this scenario
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub scenario_id: String,
    pub members_used: Vec<String>,
    pub missing: Vec<String>,
    #[serde(flatten)]
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PathBuf>,
}

/// Success or failure per scenario id, plus ensemble aggregation results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub source: String,
    pub scenarios: Vec<ScenarioReport>,
    pub ensembles: Vec<EnsembleReport>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    /// Whether every scenario and every aggregation succeeded
    pub fn succeeded(&self) -> bool {
        self.scenarios.iter().all(|s| s.status.is_success()) && self.ensembles.iter().all(|e| e.status.is_success())
    }

    pub fn scenario(&self, key: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.key == key)
    }

    pub fn ensemble(&self, scenario_id: &str) -> Option<&EnsembleReport> {
        self.ensembles.iter().find(|e| e.scenario_id == scenario_id)
    }

    /// Keys of the scenarios that did not succeed
    pub fn failures(&self) -> Vec<&str> {
        self.scenarios
            .iter()
            .filter(|s| !s.status.is_success())
            .map(|s| s.key.as_str())
            .collect()
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json() {
        let report = ScenarioReport {
            key: "rcp45/gcm1".into(),
            scenario_id: "rcp45".into(),
            member: "gcm1".into(),
            status: RunStatus::Failed {
                error: "Input 'x' not available".into(),
            },
            outputs: Vec::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "Input 'x' not available");
        assert!(json.get("outputs").is_none());

        let back: ScenarioReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_cancelled_error_maps_to_cancelled() {
        assert_eq!(
            RunStatus::from_error(&Error::Cancelled("current".into())),
            RunStatus::Cancelled
        );
        assert!(matches!(
            RunStatus::from_error(&Error::MissingBand("q_sage".into())),
            RunStatus::Failed { .. }
        ));
    }

    #[test]
    fn test_succeeded_and_failures() {
        let mut report = RunReport::new("sei", "memory");
        report.scenarios.push(ScenarioReport {
            key: "current".into(),
            scenario_id: "current".into(),
            member: "current".into(),
            status: RunStatus::Succeeded,
            outputs: Vec::new(),
        });
        assert!(report.succeeded());
        report.scenarios.push(ScenarioReport {
            key: "rcp45/a".into(),
            scenario_id: "rcp45".into(),
            member: "a".into(),
            status: RunStatus::Cancelled,
            outputs: Vec::new(),
        });
        assert!(!report.succeeded());
        assert_eq!(report.failures(), vec!["rcp45/a"]);
        assert!(report.scenario("current").is_some());
    }
}
