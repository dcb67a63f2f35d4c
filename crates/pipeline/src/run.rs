//! End-to-end scenario execution
//!
//! A `Pipeline` owns the run configuration, the calibration tables and the
//! input source. `run_scenario` executes the stages for one scenario on
//! shared static layers; `run` executes every configured scenario, member
//! runs in parallel, and aggregates each ensemble against its baseline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sei_algorithms::algebra::{binary, clamp, map, reduce_region, scalar, BinaryOp, Reducer};
use sei_algorithms::disturbance::{disturbance_masked_mean, YearFn};
use sei_algorithms::habitat::{
    classify_deciles, collapse3, ecological_composite, management_composite, quality_layer, Calibration,
    QualityBands, QualityContext, Variable,
};
use sei_algorithms::smoothing::{gaussian_mean, GaussianParams};
use sei_core::{Error, Raster, RasterStack, Result};
use sei_parallel::{CancelToken, ParallelStrategy, ProcessingMode, TiledProcessor};
use tracing::{debug, error, info, info_span, warn, Level};

use crate::config::RunConfig;
use crate::context::{LayerKind, StaticLayers};
use crate::ensemble::{aggregate, AggregateSettings};
use crate::products::{EnsembleOutput, PipelineOutput, CLASS10, CLASS3, Q_SP, Q_SPA, Q_SPAH, SEI_ECO, SEI_MGMT};
use crate::report::{EnsembleReport, RunReport, RunStatus, ScenarioReport};
use crate::scenario::{Driver, Scenario, ScenarioCollection};
use crate::source::InputSource;
use crate::writer::OutputWriter;

/// Products and report of a full run
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub report: RunReport,
    /// Successful scenario outputs by scenario key
    pub outputs: BTreeMap<String, PipelineOutput>,
    /// Successful aggregations by scenario id
    pub ensembles: BTreeMap<String, EnsembleOutput>,
}

pub struct Pipeline {
    config: RunConfig,
    calibration: Calibration,
    source: Arc<dyn InputSource>,
    cancel: CancelToken,
    mode: ProcessingMode,
}

impl Pipeline {
    /// Validate the configuration and load its calibration
    pub fn new(config: RunConfig, source: Arc<dyn InputSource>) -> Result<Self> {
        config.validate()?;
        let calibration = config.calibration()?;
        Ok(Self {
            config,
            calibration,
            source,
            cancel: CancelToken::new(),
            mode: ProcessingMode::default(),
        })
    }

    /// Share a cancellation token with the caller
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn load_static_layers(&self) -> Result<StaticLayers> {
        StaticLayers::load(self.source.as_ref(), &self.config)
    }

    /// Expanded scenario collections in configuration order
    pub fn collections(&self) -> Vec<ScenarioCollection> {
        self.config.scenarios.iter().map(|s| s.expand(&self.config)).collect()
    }

    /// Run one scenario; any stage error aborts it with nothing persisted
    pub fn run_scenario(&self, statics: &StaticLayers, scenario: &Scenario) -> Result<PipelineOutput> {
        let key = scenario.key();
        let span = info_span!("scenario", key = %key);
        let _guard = span.enter();
        info!(driver = %scenario.driver, window = ?scenario.window, "Starting scenario");

        self.cancel.check(&key)?;
        let mut covers = self.temporal_means(statics, scenario)?;

        if scenario.driver != Driver::Current {
            let member = scenario.member.as_deref().ok_or_else(|| {
                Error::Config(format!("scenario '{}' uses {} drivers without a member", key, scenario.driver))
            })?;
            for variable in Variable::ALL.into_iter().filter(|v| v.is_projected()) {
                self.cancel.check(&key)?;
                let current = covers.remove(&variable).ok_or_else(|| missing_cover(variable))?;
                let projected = self.project(statics, scenario.driver, member, variable, &current)?;
                covers.insert(variable, projected.named(variable.key()));
            }
        }

        let quality = self.quality_bands(statics, scenario, &covers, &key)?;

        self.cancel.check(&key)?;
        let eco = ecological_composite(&quality, &statics.study_area)?;
        debug!(valid = eco.sei_eco.valid_count(), "Ecological composite");

        self.cancel.check(&key)?;
        let mgmt_params = GaussianParams::with_radius(scenario.management_radius);
        let sei_mgmt = management_composite(&eco.sei_eco, &statics.rangeland, |r| self.smooth(r, &mgmt_params))?;

        let class10 = classify_deciles(&sei_mgmt, &self.calibration.thresholds)?;
        let class3 = collapse3(&class10)?;
        if tracing::enabled!(Level::DEBUG) {
            let deciles = Reducer::Percentiles((1..10).map(|d| f64::from(d) * 10.0).collect());
            let stat = reduce_region(&sei_mgmt, Some(&statics.study_area), &deciles, None)?;
            debug!(deciles = ?stat.values, cells = stat.count, "Index deciles over the study area");
        }

        let QualityBands {
            sage,
            perennial,
            annual,
            human,
            tree,
        } = quality;
        let mut bands = RasterStack::new();
        for q in [sage, perennial, annual, human, tree] {
            let name = q.name().to_string();
            bands.add_band(name, q)?;
        }
        bands.add_band(Q_SP, eco.q_sp)?;
        bands.add_band(Q_SPA, eco.q_spa)?;
        bands.add_band(Q_SPAH, eco.q_spah)?;
        bands.add_band(SEI_ECO, eco.sei_eco)?;
        bands.add_band(SEI_MGMT, sei_mgmt)?;
        bands.add_band(CLASS10, class10)?;
        bands.add_band(CLASS3, class3)?;

        let output = PipelineOutput::new(scenario.metadata(&self.config.run_id), bands)?;
        info!(
            core_ha = output.area_class3.first().map(|a| a.hectares).unwrap_or(0.0),
            "Scenario complete"
        );
        Ok(output)
    }

    /// Disturbance-adjusted means of the annual cover products.
    ///
    /// Sagebrush is never fire-masked.
    fn temporal_means(&self, statics: &StaticLayers, scenario: &Scenario) -> Result<BTreeMap<Variable, Raster<f64>>> {
        let latest_fire = if scenario.fire_masking {
            Some(statics.latest_fire(scenario.window.end, &self.config.fire_year_attribute)?)
        } else {
            None
        };

        let mut covers = BTreeMap::new();
        for variable in Variable::ALL.into_iter().filter(|v| v.is_annual()) {
            self.cancel.check(&scenario.key())?;
            let fire = match variable {
                Variable::Sagebrush => None,
                _ => latest_fire.as_ref(),
            };
            let years = YearFn(|year: i32| {
                statics
                    .grid
                    .align(self.source.annual_cover(variable, year)?, LayerKind::Continuous, false)
            });
            let mean = disturbance_masked_mean(&years, scenario.window, fire)?;
            debug!(variable = variable.key(), valid = mean.mean.valid_count(), "Temporal mean");
            covers.insert(variable, mean.mean.named(variable.key()));
        }
        Ok(covers)
    }

    /// Future cover of one projected variable under a scenario driver
    fn project(
        &self,
        statics: &StaticLayers,
        driver: Driver,
        member: &str,
        variable: Variable,
        current: &Raster<f64>,
    ) -> Result<Raster<f64>> {
        let input = statics
            .grid
            .align(self.source.driver(driver, member, variable)?, LayerKind::Continuous, false)?;
        debug!(variable = variable.key(), driver = %driver, member, "Projecting cover");
        match driver {
            Driver::Current => Ok(current.clone()),
            Driver::Ratio => binary(current, &input, BinaryOp::Multiply),
            Driver::Delta => {
                let region_max = reduce_region(current, Some(&statics.study_area), &Reducer::Max, None)?
                    .value()
                    .unwrap_or(0.0)
                    .max(0.0);
                clamp(&binary(current, &input, BinaryOp::Add)?, 0.0, region_max)
            }
            Driver::Biomass => {
                let coefficients = self.calibration.biomass_coefficients(variable)?;
                clamp(&map(&input, move |b| coefficients.apply(b))?, 0.0, 100.0)
            }
        }
    }

    /// Ecological smoothing and Q-curve transform of all five variables
    fn quality_bands(
        &self,
        statics: &StaticLayers,
        scenario: &Scenario,
        covers: &BTreeMap<Variable, Raster<f64>>,
        key: &str,
    ) -> Result<QualityBands> {
        let params = GaussianParams::with_radius(scenario.ecological_radius);
        let ctx = QualityContext {
            ecoregions: &statics.ecoregions,
            rangeland: &statics.rangeland,
            codes: &self.config.ecoregions,
            floor: self.calibration.quality_floor,
            boundary: self.config.curve_boundary,
        };

        let mut layers = HashMap::new();
        for variable in Variable::ALL {
            self.cancel.check(key)?;
            let raw = match variable {
                Variable::HumanModification => &statics.human_modification,
                _ => covers.get(&variable).ok_or_else(|| missing_cover(variable))?,
            };
            let smoothed = self.smooth(raw, &params)?;
            let scaled = if variable.is_percent_cover() {
                scalar(&smoothed, 100.0, BinaryOp::Divide)?
            } else {
                smoothed
            };
            let input = scaled.unmask(0.0).named(variable.key());
            let q = quality_layer(&input, self.calibration.curve(variable)?, &ctx)?.named(variable.quality_band());
            debug!(variable = variable.key(), "Quality layer");
            layers.insert(variable, q);
        }

        let mut take = |v: Variable| layers.remove(&v).ok_or_else(|| missing_cover(v));
        Ok(QualityBands {
            sage: take(Variable::Sagebrush)?,
            perennial: take(Variable::PerennialGrass)?,
            annual: take(Variable::AnnualGrass)?,
            human: take(Variable::HumanModification)?,
            tree: take(Variable::Tree)?,
        })
    }

    /// Gaussian mean, tiled with a halo of one kernel half-width when a
    /// tile size is configured
    fn smooth(&self, raster: &Raster<f64>, params: &GaussianParams) -> Result<Raster<f64>> {
        match self.config.tile_size {
            Some(tile_size) => {
                let halo = params.half_width(raster.cell_size())?;
                TiledProcessor::new(tile_size, halo)
                    .with_mode(self.mode)
                    .with_cancel(self.cancel.clone())
                    .map(raster, |window| gaussian_mean(window, params))
            }
            None => gaussian_mean(raster, params),
        }
    }

    /// Run every scenario, aggregate ensembles and write outputs.
    ///
    /// Static layers that fail to load abort the run. After that a failing
    /// scenario only affects itself and the aggregation it belongs to.
    pub fn run(&self, writer: Option<&OutputWriter>) -> Result<RunOutcome> {
        let statics = self.load_static_layers()?;
        let collections = self.collections();
        let scenarios: Vec<Scenario> = collections.iter().flat_map(|c| c.scenarios.iter().cloned()).collect();
        info!(run = %self.config.run_id, scenarios = scenarios.len(), "Starting run");

        let results = self.mode.map_all(scenarios, |scenario| {
            let result = self.run_scenario(&statics, &scenario).and_then(|output| {
                let written = match writer {
                    Some(w) => w.write_scenario(&output)?,
                    None => Vec::new(),
                };
                Ok((output, written))
            });
            (scenario, result)
        })?;

        let mut outcome = RunOutcome {
            report: RunReport::new(&self.config.run_id, self.source.describe()),
            ..RunOutcome::default()
        };
        for (scenario, result) in results {
            let key = scenario.key();
            let (status, outputs) = match result {
                Ok((output, written)) => {
                    outcome.outputs.insert(key.clone(), output);
                    (RunStatus::Succeeded, written)
                }
                Err(e) => {
                    error!(scenario = %key, error = %e, "Scenario failed");
                    (RunStatus::from_error(&e), Vec::new())
                }
            };
            outcome.report.scenarios.push(ScenarioReport {
                key,
                scenario_id: scenario.id.clone(),
                member: scenario.member_label().to_string(),
                status,
                outputs,
            });
        }

        for collection in collections.iter().filter(|c| c.is_ensemble()) {
            let (status, members_used, written, missing) = match self.aggregate_collection(collection, &outcome) {
                Ok(ensemble) => {
                    let written = match writer {
                        Some(w) => w.write_ensemble(&ensemble),
                        None => Ok(Vec::new()),
                    };
                    let used = ensemble.members.clone();
                    let missing = ensemble.missing.clone();
                    match written {
                        Ok(paths) => {
                            outcome.ensembles.insert(collection.id.clone(), ensemble);
                            (RunStatus::Succeeded, used, paths, missing)
                        }
                        Err(e) => (RunStatus::from_error(&e), used, Vec::new(), missing),
                    }
                }
                Err(e) => {
                    warn!(scenario = %collection.id, error = %e, "Ensemble aggregation failed");
                    let missing = match &e {
                        Error::Ensemble { missing, .. } => missing.clone(),
                        _ => Vec::new(),
                    };
                    (RunStatus::from_error(&e), Vec::new(), Vec::new(), missing)
                }
            };
            outcome.report.ensembles.push(EnsembleReport {
                scenario_id: collection.id.clone(),
                members_used,
                missing,
                status,
                outputs: written,
            });
        }

        if let Some(w) = writer {
            let path = w.write_report(&outcome.report)?;
            info!(report = %path.display(), "Wrote run report");
        }
        info!(
            run = %self.config.run_id,
            succeeded = outcome.report.succeeded(),
            failures = outcome.report.failures().len(),
            "Run complete"
        );
        Ok(outcome)
    }

    fn aggregate_collection(&self, collection: &ScenarioCollection, outcome: &RunOutcome) -> Result<EnsembleOutput> {
        let baseline_id = collection.baseline.as_deref().ok_or_else(|| {
            Error::Config(format!("scenario '{}' has no current-conditions baseline", collection.id))
        })?;
        let baseline = outcome.outputs.get(baseline_id).ok_or_else(|| Error::Ensemble {
            reason: format!("baseline '{}' has no output", baseline_id),
            missing: Vec::new(),
        })?;
        let members: Vec<&PipelineOutput> = collection
            .scenarios
            .iter()
            .filter_map(|s| outcome.outputs.get(&s.key()))
            .collect();
        let metadata = match collection.scenarios.first() {
            Some(first) => {
                let mut meta = first.metadata(&self.config.run_id);
                meta.member = "ensemble".to_string();
                meta
            }
            None => return Err(Error::Config(format!("scenario '{}' has no members", collection.id))),
        };
        let settings = AggregateSettings {
            metadata,
            policy: self.config.missing_members,
            substantial_change: self.config.substantial_change,
            thresholds: self.calibration.thresholds.clone(),
        };
        aggregate(baseline, &members, &collection.members(), &settings)
    }
}

fn missing_cover(variable: Variable) -> Error {
    Error::MissingInput(format!("{} cover", variable))
}
