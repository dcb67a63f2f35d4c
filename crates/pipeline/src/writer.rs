//! Output directory layout
//!
//! ```text
//! <root>/run_report.json
//! <root>/<scenario>/<member>/{band}.tif, class10_area.csv, class3_area.csv, metadata.json
//! <root>/<scenario>/ensemble/{band}.tif, metadata.json
//! <root>/<scenario>/ensemble/members/<member>/{band}.tif
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use sei_algorithms::summary::ClassArea;
use sei_core::io::write_geotiff;
use sei_core::{Error, RasterStack, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::products::{EnsembleOutput, PipelineOutput};
use crate::report::RunReport;

pub const REPORT_FILE: &str = "run_report.json";

/// Writes pipeline products below a root directory
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scenario_dir(&self, scenario_id: &str, member: &str) -> PathBuf {
        self.root.join(scenario_id).join(member)
    }

    pub fn ensemble_dir(&self, scenario_id: &str) -> PathBuf {
        self.root.join(scenario_id).join("ensemble")
    }

    /// Write every band, both area tables and the metadata; returns the
    /// files written
    pub fn write_scenario(&self, output: &PipelineOutput) -> Result<Vec<PathBuf>> {
        let meta = &output.metadata;
        let dir = self.scenario_dir(&meta.scenario_id, &meta.member);
        fs::create_dir_all(&dir)?;

        let mut written = write_bands(&output.bands, &dir)?;
        written.push(write_area_csv(&output.area_class10, &dir.join("class10_area.csv"))?);
        written.push(write_area_csv(&output.area_class3, &dir.join("class3_area.csv"))?);
        written.push(write_json(meta, &dir.join("metadata.json"))?);

        info!(
            scenario = %meta.scenario_id,
            member = %meta.member,
            dir = %dir.display(),
            files = written.len(),
            "Wrote scenario outputs"
        );
        Ok(written)
    }

    pub fn write_ensemble(&self, output: &EnsembleOutput) -> Result<Vec<PathBuf>> {
        let dir = self.ensemble_dir(&output.metadata.scenario_id);
        fs::create_dir_all(&dir)?;

        let mut written = write_bands(&output.bands, &dir)?;
        for member in &output.member_products {
            let member_dir = dir.join("members").join(&member.member);
            fs::create_dir_all(&member_dir)?;
            written.extend(write_bands(&member.bands, &member_dir)?);
        }
        written.push(write_json(&EnsembleMetadata::from(output), &dir.join("metadata.json"))?);

        info!(
            scenario = %output.metadata.scenario_id,
            members = output.members.len(),
            missing = output.missing.len(),
            dir = %dir.display(),
            "Wrote ensemble outputs"
        );
        Ok(written)
    }

    pub fn write_report(&self, report: &RunReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(REPORT_FILE);
        report.write_json(&path)?;
        Ok(path)
    }
}

#[derive(Serialize)]
struct EnsembleMetadata<'a> {
    run_id: &'a str,
    scenario_id: &'a str,
    label: &'a str,
    members: &'a [String],
    missing: &'a [String],
}

impl<'a> From<&'a EnsembleOutput> for EnsembleMetadata<'a> {
    fn from(output: &'a EnsembleOutput) -> Self {
        Self {
            run_id: &output.metadata.run_id,
            scenario_id: &output.metadata.scenario_id,
            label: &output.metadata.label,
            members: &output.members,
            missing: &output.missing,
        }
    }
}

fn write_bands(bands: &RasterStack, dir: &Path) -> Result<Vec<PathBuf>> {
    bands
        .iter()
        .map(|(name, raster)| {
            let path = dir.join(format!("{}.tif", name));
            debug!(band = name, path = %path.display(), "Writing band");
            write_geotiff(raster, &path)?;
            Ok(path)
        })
        .collect()
}

fn write_area_csv(rows: &[ClassArea], path: &Path) -> Result<PathBuf> {
    let csv_err = |e: csv::Error| Error::Other(format!("{}: {}", path.display(), e));
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<PathBuf> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::Other(e.to_string()))?;
    fs::write(path, text)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class3_area.csv");
        let rows = vec![
            ClassArea {
                class: 1,
                label: "core".into(),
                cells: 4,
                hectares: 3.24,
            },
            ClassArea {
                class: 3,
                label: "other".into(),
                cells: 0,
                hectares: 0.0,
            },
        ];
        write_area_csv(&rows, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "class,label,cells,hectares");
        assert_eq!(lines[1], "1,core,4,3.24");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_layout() {
        let writer = OutputWriter::new("/out");
        assert_eq!(writer.scenario_dir("rcp45", "gcm1"), PathBuf::from("/out/rcp45/gcm1"));
        assert_eq!(writer.ensemble_dir("rcp45"), PathBuf::from("/out/rcp45/ensemble"));
    }
}
