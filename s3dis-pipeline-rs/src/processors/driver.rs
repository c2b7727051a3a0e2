//! Two-phase parallel shard generation.
//!
//! Every training room is processed before any testing room starts. Each
//! phase fans its rooms out over a fixed-size worker pool and waits for all
//! of them; the first failing room aborts the run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use thiserror::Error;

use crate::core::blocks::BlockError;
use crate::core::container::{load_container, save_container, ContainerError};
use crate::core::loaders::RoomRecord;
use crate::processors::augmentation::{room_seed, AugmentationScheduler, VariantPipeline};

/// Which shard a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Test,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Test => write!(f, "test"),
        }
    }
}

/// Progress of a driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    TrainSubmitted,
    TrainBarrier,
    TestSubmitted,
    TestBarrier,
    Done,
}

/// Everything a single room job can fail with.
#[derive(Debug, Error)]
pub enum ShardError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Errors that abort a driver run.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{phase} job for room '{stem}' failed: {source}")]
    JobFailure {
        stem: String,
        phase: Phase,
        #[source]
        source: ShardError,
    },

    #[error("failed to build worker pool with {threads} threads: {source}")]
    PoolBuild {
        threads: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    #[error("failed to create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Timing record of one finished job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub stem: String,
    pub phase: Phase,
    pub elapsed_seconds: f64,
    pub num_blocks: usize,
}

/// Runs the training phase then the testing phase over a worker pool.
pub struct ParallelDriver<P> {
    scheduler: AugmentationScheduler<P>,
    pool: ThreadPool,
    num_workers: usize,
    intermediate_dir: PathBuf,
    output_dir: PathBuf,
    base_seed: u64,
    state: DriverState,
}

impl<P: VariantPipeline> ParallelDriver<P> {
    /// Create a driver with a pool of `num_workers` threads.
    ///
    /// Rooms are read from `intermediate_dir` and shards written to
    /// `output_dir` under the same file name.
    pub fn new(
        scheduler: AugmentationScheduler<P>,
        num_workers: usize,
        intermediate_dir: &Path,
        output_dir: &Path,
        base_seed: u64,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("shard-worker-{}", i))
            .build()
            .map_err(|e| DriverError::PoolBuild {
                threads: num_workers,
                source: e,
            })?;

        Ok(Self {
            scheduler,
            pool,
            num_workers,
            intermediate_dir: intermediate_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            base_seed,
            state: DriverState::Idle,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Produce every training shard, wait, then produce every testing shard.
    ///
    /// # Returns
    ///
    /// One report per room, training rooms first, each phase in input order.
    pub fn run(&mut self, train: &[String], test: &[String]) -> Result<Vec<JobReport>> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| DriverError::OutputDir {
            path: self.output_dir.clone(),
            source: e,
        })?;

        info!(
            "Submitting {} training rooms to {} workers",
            train.len(),
            self.num_workers
        );
        self.transition(DriverState::TrainSubmitted);
        let mut reports = self.run_phase(Phase::Train, train)?;
        self.transition(DriverState::TrainBarrier);

        info!("Submitting {} testing rooms", test.len());
        self.transition(DriverState::TestSubmitted);
        reports.extend(self.run_phase(Phase::Test, test)?);
        self.transition(DriverState::TestBarrier);

        self.transition(DriverState::Done);
        Ok(reports)
    }

    fn transition(&mut self, next: DriverState) {
        debug!("driver state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn run_phase(&self, phase: Phase, stems: &[String]) -> Result<Vec<JobReport>> {
        let pb = phase_progress(phase, stems.len());

        let reports = self.pool.install(|| {
            stems
                .par_iter()
                .map(|stem| {
                    let report = self
                        .run_job(phase, stem)
                        .map_err(|source| DriverError::JobFailure {
                            stem: stem.clone(),
                            phase,
                            source,
                        })?;
                    pb.inc(1);
                    Ok(report)
                })
                .collect::<Result<Vec<_>>>()
        });

        match &reports {
            Ok(_) => pb.finish_with_message(format!("{} shards written", phase)),
            Err(_) => pb.abandon_with_message(format!("{} phase aborted", phase)),
        }

        reports
    }

    fn run_job(&self, phase: Phase, stem: &str) -> std::result::Result<JobReport, ShardError> {
        let start = Instant::now();

        let room: RoomRecord = load_container(self.intermediate_dir.join(stem))?;
        let seed = room_seed(self.base_seed, stem);

        let shard = match phase {
            Phase::Train => self.scheduler.prepare_training_shard(&room, seed)?,
            Phase::Test => self.scheduler.prepare_testing_shard(&room, seed)?,
        };

        if shard.is_empty() {
            warn!("{} {} produced no blocks", phase, stem);
        }

        save_container(self.output_dir.join(stem), &shard)?;

        let elapsed = start.elapsed().as_secs_f64();
        info!("{} {} done cost {:.3} s", phase, stem, elapsed);

        Ok(JobReport {
            stem: stem.to_string(),
            phase,
            elapsed_seconds: elapsed,
            num_blocks: shard.num_blocks(),
        })
    }
}

fn phase_progress(phase: Phase, len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:>5} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏"),
    );
    pb.set_prefix(phase.to_string());
    pb
}
