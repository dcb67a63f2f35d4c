//! End-to-end runs on synthetic in-memory inputs.
//!
//! Every fixture is a small grid in a projected CRS with 90 m cells, one
//! Great Basin ecoregion polygon and a study area covering the whole grid.

use std::sync::Arc;

use approx::assert_relative_eq;
use geo_types::{Geometry, Rect};
use sei_algorithms::ensemble::transition_code;
use sei_algorithms::habitat::{default_curves, CurveBoundary, Ecoregion, Variable, DEFAULT_QUALITY_FLOOR};
use sei_core::io::write_geotiff;
use sei_core::{AttributeValue, Error, Feature, FeatureCollection, GeoTransform, GridSpec, Raster, CRS};
use sei_parallel::{CancelToken, ProcessingMode};
use sei_pipeline::{
    Driver, GeoTiffDirectorySource, MemorySource, MissingMemberPolicy, OutputWriter, Pipeline, PipelineOutput, RunConfig, RunStatus,
    ScenarioConfig,
};

const CELL: f64 = 90.0;
const YEARS: std::ops::RangeInclusive<i32> = 2017..=2020;

fn grid(rows: usize, cols: usize) -> GridSpec {
    GridSpec::new(
        rows,
        cols,
        GeoTransform::square(0.0, rows as f64 * CELL, CELL),
        Some(CRS::conus_albers()),
    )
}

fn covering(grid: &GridSpec) -> Geometry<f64> {
    let (min_x, min_y, max_x, max_y) = grid.transform.bounds(grid.cols, grid.rows);
    Geometry::Rect(Rect::new((min_x - 1.0, min_y - 1.0), (max_x + 1.0, max_y + 1.0)))
}

fn one_feature(geometry: Geometry<f64>, attribute: Option<(&str, i64)>) -> FeatureCollection {
    let mut fc = FeatureCollection::new();
    let mut feature = Feature::new(geometry);
    if let Some((key, value)) = attribute {
        feature = feature.with_property(key, AttributeValue::Int(value));
    }
    fc.push(feature);
    fc
}

/// Uniform cover of `value` percent for every annual variable and year
fn uniform_source(grid: &GridSpec, value: f64) -> MemorySource {
    varying_source(grid, |_, _| value)
}

fn varying_source(grid: &GridSpec, cover: impl Fn(usize, usize) -> f64) -> MemorySource {
    let mut source = MemorySource::new(grid.clone())
        .with_human_modification(grid.filled(0.0))
        .with_rangeland(grid.filled(1.0))
        .with_study_area(one_feature(covering(grid), None))
        .with_ecoregions(one_feature(covering(grid), Some(("ecoregion", 1))));
    for variable in Variable::ALL.into_iter().filter(|v| v.is_annual()) {
        for year in YEARS {
            let mut raster = grid.filled(0.0);
            for row in 0..grid.rows {
                for col in 0..grid.cols {
                    raster.set(row, col, cover(row, col)).unwrap();
                }
            }
            source = source.with_cover(variable, year, raster);
        }
    }
    source
}

fn ensemble_config(members: &[&str], driver: Driver) -> RunConfig {
    RunConfig {
        scenarios: vec![
            ScenarioConfig::current("current"),
            ScenarioConfig {
                driver,
                members: members.iter().map(|m| m.to_string()).collect(),
                ..ScenarioConfig::current("rcp45")
            },
        ],
        ..RunConfig::default()
    }
}

fn with_drivers(mut source: MemorySource, driver: Driver, members: &[(&str, f64)], grid: &GridSpec) -> MemorySource {
    for &(member, value) in members {
        for variable in Variable::ALL.into_iter().filter(|v| v.is_projected()) {
            source = source.with_driver(driver, member, variable, grid.filled(value));
        }
    }
    source
}

// ---------------------------------------------------------------------------
// Single scenario
// ---------------------------------------------------------------------------

#[test]
fn uniform_cover_gives_curve_values_and_constant_classes() {
    let g = grid(3, 3);
    let pipeline = Pipeline::new(RunConfig::default(), Arc::new(uniform_source(&g, 20.0))).unwrap();
    let outcome = pipeline.run(None).unwrap();
    assert!(outcome.report.succeeded(), "{:?}", outcome.report);

    let output = &outcome.outputs["current"];
    let curves = default_curves();
    let expected = |variable: Variable, x: f64| {
        curves[&variable]
            .evaluate(x, Ecoregion::GreatBasin, CurveBoundary::Clamp)
            .max(DEFAULT_QUALITY_FLOOR)
    };

    let mut product = 1.0;
    for variable in Variable::ALL {
        let x = if variable == Variable::HumanModification { 0.0 } else { 0.20 };
        let q = expected(variable, x);
        product *= q;
        let band = output.band(variable.quality_band()).unwrap();
        for (_, _, v) in band.iter_valid() {
            assert_relative_eq!(v, q, epsilon = 1e-6);
        }
        assert_eq!(band.valid_count(), 9, "{}", variable);
    }

    let sei_eco = output.band("sei_eco").unwrap();
    for (_, _, v) in sei_eco.iter_valid() {
        assert_relative_eq!(v, product, epsilon = 1e-6);
    }
    for (_, _, v) in output.sei_mgmt().unwrap().iter_valid() {
        assert_relative_eq!(v, product, epsilon = 1e-6);
    }

    let class3 = output.class3().unwrap();
    let first = class3.value(0, 0).unwrap();
    assert!((1.0..=3.0).contains(&first));
    assert!(class3.iter_valid().all(|(_, _, v)| v == first));
    assert_eq!(output.area_class3.iter().map(|a| a.cells).sum::<usize>(), 9);
}

#[test]
fn fire_perimeter_masks_grass_but_not_sagebrush() {
    let g = grid(3, 3);
    // Annual grass drops to 0 in 2017 and 2018, but a 2018 fire excludes
    // those years, so the mean over 2019-2020 matches the unburned run.
    let mut source = uniform_source(&g, 20.0);
    for year in [2017, 2018] {
        source = source.with_cover(Variable::AnnualGrass, year, g.filled(0.0));
    }
    let burned = source
        .clone()
        .with_fire_perimeters(one_feature(covering(&g), Some(("FIRE_YEAR", 2018))));

    let burned_run = Pipeline::new(RunConfig::default(), Arc::new(burned)).unwrap().run(None).unwrap();
    let reference = Pipeline::new(RunConfig::default(), Arc::new(uniform_source(&g, 20.0)))
        .unwrap()
        .run(None)
        .unwrap();
    let unmasked = Pipeline::new(RunConfig::default(), Arc::new(source)).unwrap().run(None).unwrap();

    let q = |run: &sei_pipeline::RunOutcome, band: &str| run.outputs["current"].band(band).unwrap().value(1, 1).unwrap();
    assert_relative_eq!(q(&burned_run, "q_annual"), q(&reference, "q_annual"), epsilon = 1e-9);
    assert_relative_eq!(q(&burned_run, "q_sage"), q(&reference, "q_sage"), epsilon = 1e-9);
    // without the fire the 0% years pull the mean down to 10%
    let curves = default_curves();
    let at_ten = curves[&Variable::AnnualGrass]
        .evaluate(0.10, Ecoregion::GreatBasin, CurveBoundary::Clamp)
        .max(DEFAULT_QUALITY_FLOOR);
    assert_relative_eq!(q(&unmasked, "q_annual"), at_ten, epsilon = 1e-6);
}

#[test]
fn misaligned_input_fails_only_its_scenario() {
    let g = grid(3, 3);
    let shifted = GridSpec::new(3, 3, GeoTransform::square(45.0, 270.0, CELL), Some(CRS::conus_albers()));
    let mut source = uniform_source(&g, 20.0);
    for variable in Variable::ALL.into_iter().filter(|v| v.is_annual()) {
        for year in [2015, 2016] {
            source = source.with_cover(variable, year, shifted.filled(20.0));
        }
    }
    let config = RunConfig {
        scenarios: vec![
            ScenarioConfig::current("current"),
            ScenarioConfig {
                window: Some(sei_algorithms::disturbance::YearWindow::new(2015, 2016).unwrap()),
                ..ScenarioConfig::current("early")
            },
        ],
        ..RunConfig::default()
    };
    let outcome = Pipeline::new(config, Arc::new(source)).unwrap().run(None).unwrap();

    assert_eq!(outcome.report.scenario("current").unwrap().status, RunStatus::Succeeded);
    match &outcome.report.scenario("early").unwrap().status {
        RunStatus::Failed { error } => assert!(error.contains("sagebrush_2016"), "{}", error),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!outcome.outputs.contains_key("early"));
}

#[test]
fn tiled_smoothing_matches_whole_raster() {
    let g = grid(12, 10);
    let cover = |row: usize, col: usize| ((row * 7 + col * 13) % 40) as f64;
    let whole = Pipeline::new(RunConfig::default(), Arc::new(varying_source(&g, cover)))
        .unwrap()
        .run(None)
        .unwrap();
    let tiled_config = RunConfig {
        tile_size: Some(4),
        ..RunConfig::default()
    };
    let tiled = Pipeline::new(tiled_config, Arc::new(varying_source(&g, cover)))
        .unwrap()
        .with_mode(ProcessingMode::Sequential)
        .run(None)
        .unwrap();

    let a = whole.outputs["current"].sei_mgmt().unwrap();
    let b = tiled.outputs["current"].sei_mgmt().unwrap();
    assert_eq!(a.valid_count(), b.valid_count());
    for (row, col, v) in a.iter_valid() {
        assert_relative_eq!(v, b.value(row, col).unwrap(), epsilon = 1e-12);
    }
}

#[test]
fn cancelled_run_reports_every_scenario_cancelled() {
    let g = grid(3, 3);
    let token = CancelToken::new();
    let pipeline = Pipeline::new(RunConfig::default(), Arc::new(uniform_source(&g, 20.0)))
        .unwrap()
        .with_cancel(token.clone());
    token.cancel();
    let outcome = pipeline.run(None).unwrap();
    assert_eq!(outcome.report.scenario("current").unwrap().status, RunStatus::Cancelled);
    assert!(outcome.outputs.is_empty());
}

// ---------------------------------------------------------------------------
// Ensembles
// ---------------------------------------------------------------------------

#[test]
fn unchanged_members_keep_every_class() {
    let g = grid(3, 3);
    let members = [("a", 1.0), ("b", 1.0), ("c", 1.0)];
    let source = with_drivers(uniform_source(&g, 20.0), Driver::Ratio, &members, &g);
    let outcome = Pipeline::new(ensemble_config(&["a", "b", "c"], Driver::Ratio), Arc::new(source))
        .unwrap()
        .run(None)
        .unwrap();
    assert!(outcome.report.succeeded(), "{:?}", outcome.report);

    let base_class = outcome.outputs["current"].class3().unwrap().value(0, 0).unwrap() as u8;
    let same = f64::from(transition_code(base_class, base_class).unwrap());

    let ensemble = &outcome.ensembles["rcp45"];
    assert_eq!(ensemble.members, vec!["a", "b", "c"]);
    assert!(ensemble.missing.is_empty());
    for (_, _, v) in ensemble.bands.band("median_diff").unwrap().iter_valid() {
        assert_relative_eq!(v, 0.0, epsilon = 1e-12);
    }
    assert!(ensemble.bands.band("median_transition").unwrap().iter_valid().all(|(_, _, v)| v == same));
    assert!(ensemble.bands.band("agree_direction").unwrap().iter_valid().all(|(_, _, v)| v == 3.0));
    assert!(ensemble.bands.band("agree_increase").unwrap().iter_valid().all(|(_, _, v)| v == 0.0));

    for member in &ensemble.member_products {
        assert!(member.bands.band("transition").unwrap().iter_valid().all(|(_, _, v)| v == same));
        // no component changed, so nothing is attributed
        for band in ["attr_sage", "attr_perennial", "attr_annual"] {
            assert!(member.bands.band(band).unwrap().iter_valid().all(|(_, _, v)| v == 0.0));
        }
    }
}

#[test]
fn ratio_driver_median_and_attribution() {
    let g = grid(3, 3);
    let members = [("a", 0.5), ("b", 0.25), ("c", 0.75)];
    let source = with_drivers(uniform_source(&g, 20.0), Driver::Ratio, &members, &g);
    let config = RunConfig {
        curve_boundary: CurveBoundary::Clamp,
        ..ensemble_config(&["a", "b", "c"], Driver::Ratio)
    };
    let outcome = Pipeline::new(config, Arc::new(source)).unwrap().run(None).unwrap();
    assert!(outcome.report.succeeded(), "{:?}", outcome.report);

    let ensemble = &outcome.ensembles["rcp45"];
    let base = outcome.outputs["current"].sei_mgmt().unwrap().value(1, 1).unwrap();
    let member_index = |m: &str| outcome.outputs[&format!("rcp45/{}", m)].sei_mgmt().unwrap().value(1, 1).unwrap();

    let mut indices: Vec<f64> = ["a", "b", "c"].iter().map(|m| member_index(m)).collect();
    indices.sort_by(|x, y| x.total_cmp(y));
    assert_relative_eq!(
        ensemble.bands.band("median").unwrap().value(1, 1).unwrap(),
        indices[1],
        epsilon = 1e-12
    );
    assert_relative_eq!(
        ensemble.bands.band("median_diff").unwrap().value(1, 1).unwrap(),
        indices[1] - base,
        epsilon = 1e-12
    );

    for member in &ensemble.member_products {
        let total: f64 = ["attr_sage", "attr_perennial", "attr_annual"]
            .iter()
            .map(|b| member.bands.band(b).unwrap().value(1, 1).unwrap())
            .sum();
        assert!(total == 0.0 || (total - 1.0).abs() < 1e-9, "{} sums to {}", member.member, total);
    }
}

#[test]
fn delta_driver_is_clamped_to_region_max() {
    let g = grid(3, 3);
    // +50 percentage points, clamped back to the 20% study-area maximum
    let source = with_drivers(uniform_source(&g, 20.0), Driver::Delta, &[("m", 50.0)], &g);
    let outcome = Pipeline::new(ensemble_config(&["m"], Driver::Delta), Arc::new(source))
        .unwrap()
        .run(None)
        .unwrap();
    assert!(outcome.report.succeeded(), "{:?}", outcome.report);

    let ensemble = &outcome.ensembles["rcp45"];
    for band in ["median_diff", "low_diff", "high_diff"] {
        for (_, _, v) in ensemble.bands.band(band).unwrap().iter_valid() {
            assert_relative_eq!(v, 0.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn missing_member_refused_by_default() {
    let g = grid(3, 3);
    let members = [("a", 1.0), ("b", 0.9), ("c", 0.8), ("d", 0.7)];
    let mut source = with_drivers(uniform_source(&g, 20.0), Driver::Ratio, &members, &g);
    source.remove_driver(Driver::Ratio, "d", Variable::Sagebrush);

    let outcome = Pipeline::new(ensemble_config(&["a", "b", "c", "d"], Driver::Ratio), Arc::new(source))
        .unwrap()
        .run(None)
        .unwrap();

    assert!(matches!(
        outcome.report.scenario("rcp45/d").unwrap().status,
        RunStatus::Failed { .. }
    ));
    for key in ["current", "rcp45/a", "rcp45/b", "rcp45/c"] {
        assert_eq!(outcome.report.scenario(key).unwrap().status, RunStatus::Succeeded, "{}", key);
    }
    let report = outcome.report.ensemble("rcp45").unwrap();
    assert!(matches!(report.status, RunStatus::Failed { .. }));
    assert_eq!(report.missing, vec!["d"]);
    assert!(!outcome.ensembles.contains_key("rcp45"));
}

#[test]
fn missing_member_reduced_under_partial_policy() {
    let g = grid(3, 3);
    let members = [("a", 1.0), ("b", 0.9), ("c", 0.8), ("d", 0.7)];
    let mut source = with_drivers(uniform_source(&g, 20.0), Driver::Ratio, &members, &g);
    source.remove_driver(Driver::Ratio, "d", Variable::AnnualGrass);

    let config = RunConfig {
        missing_members: MissingMemberPolicy::Partial { min_members: 3 },
        ..ensemble_config(&["a", "b", "c", "d"], Driver::Ratio)
    };
    let outcome = Pipeline::new(config.clone(), Arc::new(source.clone())).unwrap().run(None).unwrap();
    let report = outcome.report.ensemble("rcp45").unwrap();
    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.members_used, vec!["a", "b", "c"]);
    assert_eq!(report.missing, vec!["d"]);
    assert_eq!(outcome.ensembles["rcp45"].member_products.len(), 3);

    // a fourth member requirement cannot be met
    let strict = RunConfig {
        missing_members: MissingMemberPolicy::Partial { min_members: 4 },
        ..config
    };
    let outcome = Pipeline::new(strict, Arc::new(source)).unwrap().run(None).unwrap();
    assert!(matches!(
        outcome.report.ensemble("rcp45").unwrap().status,
        RunStatus::Failed { .. }
    ));
}

// ---------------------------------------------------------------------------
// Output files
// ---------------------------------------------------------------------------

#[test]
fn written_outputs_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let g = grid(3, 3);
    let members = [("a", 0.5), ("b", 0.25), ("c", 0.75)];
    let source = with_drivers(uniform_source(&g, 20.0), Driver::Ratio, &members, &g);
    let writer = OutputWriter::new(dir.path());
    let outcome = Pipeline::new(ensemble_config(&["a", "b", "c"], Driver::Ratio), Arc::new(source))
        .unwrap()
        .run(Some(&writer))
        .unwrap();
    assert!(outcome.report.succeeded(), "{:?}", outcome.report);

    assert!(dir.path().join("run_report.json").exists());
    assert!(dir.path().join("current/current/class3_area.csv").exists());
    assert!(dir.path().join("rcp45/ensemble/median.tif").exists());
    assert!(dir.path().join("rcp45/ensemble/members/b/attr_sage.tif").exists());

    let back = PipelineOutput::read(dir.path().join("rcp45/a")).unwrap();
    assert_eq!(back.metadata, outcome.outputs["rcp45/a"].metadata);
    let original = outcome.outputs["rcp45/a"].sei_mgmt().unwrap();
    for (row, col, v) in back.sei_mgmt().unwrap().iter_valid() {
        assert_relative_eq!(v, original.value(row, col).unwrap(), epsilon = 1e-6);
    }
    assert_eq!(back.area_class3, outcome.outputs["rcp45/a"].area_class3);

    let written = &outcome.report.scenario("rcp45/a").unwrap().outputs;
    assert_eq!(written.len(), 12 + 3);
}

// ---------------------------------------------------------------------------
// GeoTIFF directory inputs
// ---------------------------------------------------------------------------

fn cover_pattern(row: usize, col: usize) -> f64 {
    5.0 + 4.0 * row as f64 + 3.0 * col as f64
}

fn write_layer(path: std::path::PathBuf, layer: &FeatureCollection) {
    std::fs::write(path, serde_json::to_string(layer).unwrap()).unwrap();
}

#[test]
fn directory_source_matches_in_memory_run() {
    let dir = tempfile::tempdir().unwrap();
    let g = GridSpec::new(8, 6, GeoTransform::square(-1_200_000.0, 2_500_000.0, CELL), Some(CRS::conus_albers()));
    let source = GeoTiffDirectorySource::new(dir.path());

    write_geotiff(&g.filled(1.0), dir.path().join("rangeland.tif")).unwrap();
    write_geotiff(&g.filled(0.0), dir.path().join("human_modification.tif")).unwrap();
    write_layer(dir.path().join("study_area.json"), &one_feature(covering(&g), None));
    write_layer(dir.path().join("ecoregions.json"), &one_feature(covering(&g), Some(("ecoregion", 1))));
    write_layer(dir.path().join("fire_perimeters.json"), &FeatureCollection::new());
    let memory = varying_source(&g, cover_pattern);
    for variable in Variable::ALL.into_iter().filter(|v| v.is_annual()) {
        for year in YEARS {
            let raster = sei_pipeline::InputSource::annual_cover(&memory, variable, year).unwrap();
            write_geotiff(&raster, source.cover_path(variable, year)).unwrap();
        }
    }

    assert_eq!(sei_pipeline::InputSource::grid(&source).unwrap(), g);

    let from_disk = Pipeline::new(RunConfig::default(), Arc::new(source)).unwrap().run(None).unwrap();
    let in_memory = Pipeline::new(RunConfig::default(), Arc::new(memory)).unwrap().run(None).unwrap();
    assert!(from_disk.report.succeeded(), "{:?}", from_disk.report);

    let disk = from_disk.outputs["current"].sei_mgmt().unwrap();
    let mem = in_memory.outputs["current"].sei_mgmt().unwrap();
    assert_eq!(disk.valid_count(), 48);
    for (row, col, v) in mem.iter_valid() {
        assert_relative_eq!(disk.value(row, col).unwrap(), v, epsilon = 1e-5);
    }
    assert_eq!(
        from_disk.outputs["current"].area_class10,
        in_memory.outputs["current"].area_class10
    );
}

#[test]
fn human_modification_in_other_crs_fails_the_run() {
    let g = grid(3, 3);
    let mut geographic: Raster<f64> = Raster::filled(3, 3, 0.1);
    geographic.set_transform(GeoTransform::square(-120.0, 45.0, 0.01));
    geographic.set_crs(Some(CRS::from_epsg(4326)));
    let source = uniform_source(&g, 20.0).with_human_modification(geographic.named("human_modification"));

    let err = Pipeline::new(RunConfig::default(), Arc::new(source)).unwrap().run(None).unwrap_err();
    assert!(matches!(err, Error::CrsMismatch { .. }), "{err}");
    assert!(err.to_string().contains("human_modification"));
}
