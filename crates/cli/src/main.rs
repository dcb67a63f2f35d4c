//! SEI CLI - Sagebrush Ecosystem Integrity pipeline

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sei_algorithms::habitat::{classify_deciles, collapse3, Calibration, DecileThresholds};
use sei_core::io::{read_geotiff, write_geotiff};
use sei_core::Raster;
use sei_parallel::ProcessingMode;
use sei_pipeline::{
    aggregate, AggregateSettings, GeoTiffDirectorySource, MissingMemberPolicy, OutputWriter, Pipeline,
    PipelineOutput, RunConfig, RunStatus,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sei")]
#[command(author, version, about = "Sagebrush Ecosystem Integrity index", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Run every scenario of a configuration file
    Run {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Input directory (cover/, drivers/, rangeland.tif, ...)
        #[arg(short, long)]
        input: PathBuf,
        /// Output directory; defaults to the configuration's output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads for member runs (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Aggregate member outputs written by `run` against a baseline
    Ensemble {
        /// Baseline scenario output directory
        #[arg(short, long)]
        baseline: PathBuf,
        /// Member output directories
        #[arg(short, long, num_args = 1.., required = true)]
        members: Vec<PathBuf>,
        /// Output root; products go to <output>/<scenario>/ensemble
        #[arg(short, long)]
        output: PathBuf,
        /// Expected member names; missing ones are handled by --policy
        #[arg(short, long, num_args = 1..)]
        expect: Vec<String>,
        /// Missing-member policy
        #[arg(short, long, value_enum, default_value = "refuse")]
        policy: PolicyArg,
        /// Minimum members for the partial policy
        #[arg(long, default_value = "3")]
        min_members: usize,
        /// Change in the index counted as substantial
        #[arg(short, long, default_value = "0.05")]
        substantial: f64,
    },
    /// Classify a continuous index raster into deciles and 3 classes
    Classify {
        /// Input index raster
        input: PathBuf,
        /// Output directory for class10.tif and class3.tif
        output: PathBuf,
    },
    /// Print the built-in calibration tables as JSON
    Calibration {
        /// Print a default run configuration instead
        #[arg(long)]
        run_config: bool,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Refuse,
    Partial,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> =
        read_geotiff(path, None).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_raster(raster: &Raster<f64>, path: &Path) -> Result<()> {
    write_geotiff(raster, path).with_context(|| format!("Failed to write {}", path.display()))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn write_text(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

// ─── Commands ───────────────────────────────────────────────────────────

fn info_command(input: &Path) -> Result<()> {
    let raster = read_raster(input)?;
    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = raster.crs() {
        println!("CRS: {}", crs);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

fn run_command(config: &Path, input: &Path, output: Option<PathBuf>, threads: Option<usize>) -> Result<()> {
    let config = RunConfig::load(config).with_context(|| format!("Invalid configuration {}", config.display()))?;
    let output = output.unwrap_or_else(|| config.output_dir.clone());
    let mode = match threads {
        Some(1) => ProcessingMode::Sequential,
        Some(n) => ProcessingMode::ParallelWith(n),
        None => ProcessingMode::Parallel,
    };

    let source = Arc::new(GeoTiffDirectorySource::new(input));
    let pipeline = Pipeline::new(config, source)
        .context("Failed to prepare pipeline")?
        .with_mode(mode);
    let writer = OutputWriter::new(&output);

    let pb = spinner("Running scenarios...");
    let start = Instant::now();
    let outcome = pipeline.run(Some(&writer)).context("Run aborted")?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    for scenario in &outcome.report.scenarios {
        match &scenario.status {
            RunStatus::Succeeded => println!("  ok        {}", scenario.key),
            RunStatus::Cancelled => println!("  cancelled {}", scenario.key),
            RunStatus::Failed { error } => println!("  FAILED    {}: {}", scenario.key, error),
        }
    }
    for ensemble in &outcome.report.ensembles {
        let status = if ensemble.status.is_success() { "ok" } else { "FAILED" };
        print!("  {:<9} {} ensemble ({} members)", status, ensemble.scenario_id, ensemble.members_used.len());
        if !ensemble.missing.is_empty() {
            print!(", missing {}", ensemble.missing.join(", "));
        }
        println!();
    }
    done("Run", &output, elapsed);

    if !outcome.report.succeeded() {
        bail!(
            "{} scenario(s) failed, see {}",
            outcome.report.failures().len(),
            output.join(sei_pipeline::writer::REPORT_FILE).display()
        );
    }
    Ok(())
}

struct EnsembleArgs {
    baseline: PathBuf,
    members: Vec<PathBuf>,
    output: PathBuf,
    expect: Vec<String>,
    policy: MissingMemberPolicy,
    substantial: f64,
}

fn ensemble_command(args: EnsembleArgs) -> Result<()> {
    let pb = spinner("Reading outputs...");
    let baseline = PipelineOutput::read(&args.baseline)
        .with_context(|| format!("Failed to read baseline {}", args.baseline.display()))?;
    let mut members = Vec::with_capacity(args.members.len());
    for dir in &args.members {
        match PipelineOutput::read(dir) {
            Ok(m) => members.push(m),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Skipping unreadable member"),
        }
    }
    pb.finish_and_clear();

    let Some(first) = members.first() else {
        bail!("No member output could be read");
    };
    let mut metadata = first.metadata.clone();
    metadata.member = "ensemble".to_string();
    let expected = if args.expect.is_empty() {
        members.iter().map(|m| m.metadata.member.clone()).collect()
    } else {
        args.expect
    };
    let settings = AggregateSettings {
        metadata,
        policy: args.policy,
        substantial_change: args.substantial,
        thresholds: DecileThresholds::default(),
    };

    let start = Instant::now();
    let refs: Vec<&PipelineOutput> = members.iter().collect();
    let ensemble = aggregate(&baseline, &refs, &expected, &settings).context("Ensemble aggregation failed")?;
    let writer = OutputWriter::new(&args.output);
    writer.write_ensemble(&ensemble).context("Failed to write ensemble outputs")?;
    done(
        "Ensemble",
        &writer.ensemble_dir(&ensemble.metadata.scenario_id),
        start.elapsed(),
    );
    Ok(())
}

fn classify_command(input: &Path, output: &Path) -> Result<()> {
    let index = read_raster(input)?;
    let start = Instant::now();
    let class10 = classify_deciles(&index, &DecileThresholds::default()).context("Failed to classify")?;
    let class3 = collapse3(&class10).context("Failed to collapse classes")?;
    let elapsed = start.elapsed();

    std::fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let pb = spinner("Writing output...");
    write_raster(&class10, &output.join("class10.tif"))?;
    write_raster(&class3, &output.join("class3.tif"))?;
    pb.finish_and_clear();
    done("Classes", output, elapsed);
    Ok(())
}

fn calibration_command(run_config: bool, output: Option<&Path>) -> Result<()> {
    let text = if run_config {
        RunConfig::default().to_json()?
    } else {
        serde_json::to_string_pretty(&Calibration::default()).context("Failed to serialize calibration")?
    };
    write_text(&text, output)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => info_command(&input),
        Commands::Run {
            config,
            input,
            output,
            threads,
        } => run_command(&config, &input, output, threads),
        Commands::Ensemble {
            baseline,
            members,
            output,
            expect,
            policy,
            min_members,
            substantial,
        } => ensemble_command(EnsembleArgs {
            baseline,
            members,
            output,
            expect,
            policy: match policy {
                PolicyArg::Refuse => MissingMemberPolicy::Refuse,
                PolicyArg::Partial => MissingMemberPolicy::Partial { min_members },
            },
            substantial,
        }),
        Commands::Classify { input, output } => classify_command(&input, &output),
        Commands::Calibration { run_config, output } => calibration_command(run_config, output.as_deref()),
    }
}
