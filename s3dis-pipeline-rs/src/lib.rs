//! S3DIS room preparation pipeline.
//!
//! This crate provides tools for:
//! - Consolidating raw per-class annotation files into one container per room
//! - Splitting rooms into training and testing sets by area
//! - Block sampling with axis swap/flip augmentation (eight variants per training room)
//! - Running both phases over a fixed-size worker pool, training first
//!
//! # Example
//!
//! ```no_run
//! use s3dis_pipeline::config::BlockConfig;
//! use s3dis_pipeline::core::{load_container, RoomRecord};
//! use s3dis_pipeline::processors::AugmentationScheduler;
//!
//! let room: RoomRecord = load_container("data/s3dis_pkl/0_Area_1_office_1.bin").unwrap();
//! let scheduler = AugmentationScheduler::with_blocks(BlockConfig::default());
//! let shard = scheduler.prepare_training_shard(&room, 0).unwrap();
//! println!("{} blocks", shard.num_blocks());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{BlockConfig, CatalogConfig, PipelineConfig, SplitConfig, WorkerConfig};
pub use core::loaders::{RoomRecord, Shard};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
