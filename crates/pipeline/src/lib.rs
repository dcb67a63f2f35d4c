//! # SEI Pipeline
//!
//! Scenario configuration and end-to-end orchestration of the Sagebrush
//! Ecosystem Integrity index.
//!
//! - [`RunConfig`]: flat run parameters and the scenario list, from JSON
//! - [`InputSource`]: boundary to the input rasters and polygons
//! - [`Pipeline`]: runs scenarios, member runs in parallel, and aggregates
//!   ensembles against their baseline
//! - [`OutputWriter`]: GeoTIFF bands, area tables and metadata on disk
//!
//! ```ignore
//! let config = RunConfig::load("run.json")?;
//! let source = Arc::new(GeoTiffDirectorySource::new("inputs"));
//! let pipeline = Pipeline::new(config, source)?;
//! let outcome = pipeline.run(Some(&OutputWriter::new("output")))?;
//! assert!(outcome.report.succeeded());
//! ```

pub mod config;
pub mod context;
pub mod ensemble;
pub mod products;
pub mod report;
pub mod run;
pub mod scenario;
pub mod source;
pub mod writer;

pub use config::{MissingMemberPolicy, RunConfig};
pub use context::{AnalysisGrid, LayerKind, StaticLayers};
pub use ensemble::{aggregate, missing_members, AggregateSettings};
pub use products::{output_band_names, EnsembleOutput, MemberProducts, PipelineOutput};
pub use report::{EnsembleReport, RunReport, RunStatus, ScenarioReport};
pub use run::{Pipeline, RunOutcome};
pub use scenario::{Driver, Scenario, ScenarioCollection, ScenarioConfig, ScenarioMetadata};
pub use source::{GeoTiffDirectorySource, InputSource, MemorySource};
pub use writer::OutputWriter;
