//! Command-line interface for the S3DIS preparation pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use crate::core::catalog::Catalog;
use crate::core::writers::write_records_csv;
use crate::processors::consolidation::{raw_to_intermediate, MANIFEST_FILE};
use crate::processors::driver::{JobReport, ParallelDriver, Phase};
use crate::processors::AugmentationScheduler;
use crate::PipelineConfig;

/// Per-job timing report written into the dataset directory.
pub const TIMINGS_FILE: &str = "job_timings.csv";

#[derive(Parser)]
#[command(name = "s3dis-pipeline")]
#[command(about = "Convert S3DIS room annotations into training and testing shards", version)]
pub struct Cli {
    /// Root of the raw dataset (one annotation directory per room)
    #[arg(long = "raw_dir", default_value = "data/s3dis_raw")]
    raw_dir: PathBuf,

    /// Directory for the consolidated per-room containers
    #[arg(long = "pkl_dir", default_value = "data/s3dis_pkl")]
    pkl_dir: PathBuf,

    /// Directory for the final training/testing shards
    #[arg(long = "dataset_dir", default_value = "data/s3dis_dataset")]
    dataset_dir: PathBuf,

    /// Number of worker threads (overrides the config file)
    #[arg(long = "num_cpus", value_parser = clap::value_parser!(u32).range(1..))]
    num_cpus: Option<u32>,

    /// Directory holding the class, room directory and room stem lists
    #[arg(long = "catalog_dir")]
    catalog_dir: Option<PathBuf>,

    /// Path to YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    if let Some(num_cpus) = cli.num_cpus {
        config.workers.num_cpus = num_cpus as usize;
    }
    if let Some(dir) = &cli.catalog_dir {
        config.catalog.dir = dir.clone();
    }

    if let Err(e) = run_pipeline(&cli, &config) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_pipeline(cli: &Cli, config: &PipelineConfig) -> Result<()> {
    let start = Instant::now();

    let catalog = Catalog::load(&config.catalog).with_context(|| {
        format!(
            "failed to load reference catalog from {}",
            config.catalog.dir.display()
        )
    })?;
    info!(
        "Catalog: {} classes, {} room directories, {} room stems",
        catalog.class_names().len(),
        catalog.room_directories().len(),
        catalog.room_stems().len()
    );

    // Split before any work so a malformed stem aborts immediately
    let (train, test) = catalog
        .split_train_test(config.split.test_area)
        .context("failed to split rooms into train and test sets")?;

    println!("Consolidating raw rooms...");
    println!("Raw directory: {}", cli.raw_dir.display());
    println!("Intermediate directory: {}", cli.pkl_dir.display());

    let names = raw_to_intermediate(&cli.raw_dir, &cli.pkl_dir, &catalog)
        .context("raw to intermediate conversion failed")?;

    let missing = train
        .iter()
        .chain(&test)
        .filter(|stem| !names.contains(*stem))
        .count();
    if missing > 0 {
        warn!(
            "{} room stems are not listed in {}",
            missing,
            cli.pkl_dir.join(MANIFEST_FILE).display()
        );
    }

    println!(
        "Preparing {} training and {} testing rooms with {} workers...",
        train.len(),
        test.len(),
        config.workers.num_cpus
    );

    let scheduler = AugmentationScheduler::with_blocks(config.blocks.clone());
    let mut driver = ParallelDriver::new(
        scheduler,
        config.workers.num_cpus,
        &cli.pkl_dir,
        &cli.dataset_dir,
        config.blocks.seed,
    )
    .context("failed to start the worker pool")?;

    let reports = driver
        .run(&train, &test)
        .context("shard preparation failed")?;

    let spinner = create_spinner("Writing job timings...");
    let timings_path = cli.dataset_dir.join(TIMINGS_FILE);
    write_records_csv(&timings_path, &reports)
        .with_context(|| format!("failed to write {}", timings_path.display()))?;
    spinner.finish_and_clear();

    let phase_seconds = |phase: Phase| -> f64 {
        reports
            .iter()
            .filter(|r| r.phase == phase)
            .map(|r| r.elapsed_seconds)
            .sum()
    };
    let blocks = |phase: Phase| -> usize {
        reports
            .iter()
            .filter(|r| r.phase == phase)
            .map(|r| r.num_blocks)
            .sum()
    };
    let slowest = reports
        .iter()
        .max_by(|a, b| a.elapsed_seconds.total_cmp(&b.elapsed_seconds))
        .map(|r: &JobReport| format!("{} ({:.2} s)", r.stem, r.elapsed_seconds))
        .unwrap_or_else(|| "-".to_string());

    print_summary(
        "S3DIS Preparation Complete",
        &[
            ("Rooms consolidated", names.len().to_string()),
            ("Training rooms", train.len().to_string()),
            ("Testing rooms", test.len().to_string()),
            ("Training blocks", blocks(Phase::Train).to_string()),
            ("Testing blocks", blocks(Phase::Test).to_string()),
            ("Train job time", format!("{:.2} s", phase_seconds(Phase::Train))),
            ("Test job time", format!("{:.2} s", phase_seconds(Phase::Test))),
            ("Slowest room", slowest),
            ("Workers", config.workers.num_cpus.to_string()),
            ("Output directory", cli.dataset_dir.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}
