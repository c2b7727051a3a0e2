//! Configuration types for the S3DIS preparation pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Location and naming of the static reference catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory holding the reference text files
    #[serde(default = "default_catalog_dir")]
    pub dir: PathBuf,

    /// One class name per line, in label order
    #[serde(default = "default_class_names_file")]
    pub class_names_file: String,

    /// One room directory per line, path components separated by spaces
    #[serde(default = "default_room_dirs_file")]
    pub room_dirs_file: String,

    /// One room identifier stem per line
    #[serde(default = "default_room_stems_file")]
    pub room_stems_file: String,

    /// Catch-all class that rare classes collapse into
    #[serde(default = "default_clutter_class")]
    pub clutter_class: String,

    /// First class (in label order) that is folded into clutter
    #[serde(default = "default_discarded_class")]
    pub discarded_class: String,
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("catalog")
}

fn default_class_names_file() -> String {
    "s3dis_class_names.txt".to_string()
}

fn default_room_dirs_file() -> String {
    "s3dis_dir_names.txt".to_string()
}

fn default_room_stems_file() -> String {
    "s3dis_room_stems.txt".to_string()
}

fn default_clutter_class() -> String {
    "clutter".to_string()
}

fn default_discarded_class() -> String {
    "stairs".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dir: default_catalog_dir(),
            class_names_file: default_class_names_file(),
            room_dirs_file: default_room_dirs_file(),
            room_stems_file: default_room_stems_file(),
            clutter_class: default_clutter_class(),
            discarded_class: default_discarded_class(),
        }
    }
}

/// Parameters of the block sampling and normalization routines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Voxel edge used for down-sampling, in meters
    #[serde(default = "default_down_sample_stride")]
    pub down_sample_stride: f32,

    /// Edge of each square block window, in meters
    #[serde(default = "default_block_size")]
    pub block_size: f32,

    /// Step between neighbouring block windows, in meters
    #[serde(default = "default_block_stride")]
    pub block_stride: f32,

    /// Minimum points per block for training shards
    #[serde(default = "default_train_min_points")]
    pub train_min_points: usize,

    /// Minimum points per block for testing shards
    #[serde(default = "default_test_min_points")]
    pub test_min_points: usize,

    /// Lower bound of the resampled point fraction
    #[serde(default = "default_resample_low")]
    pub resample_low: f32,

    /// Upper bound of the resampled point fraction
    #[serde(default = "default_resample_high")]
    pub resample_high: f32,

    /// Maximum absolute color perturbation per channel
    #[serde(default = "default_jitter_value")]
    pub jitter_value: f32,

    /// Lower bound of the isotropic rescale factor
    #[serde(default = "default_rescale_low")]
    pub rescale_low: f32,

    /// Upper bound of the isotropic rescale factor
    #[serde(default = "default_rescale_high")]
    pub rescale_high: f32,

    /// Base seed for the per-room random streams
    #[serde(default)]
    pub seed: u64,
}

fn default_down_sample_stride() -> f32 {
    0.05
}

fn default_block_size() -> f32 {
    3.0
}

fn default_block_stride() -> f32 {
    1.5
}

fn default_train_min_points() -> usize {
    512
}

fn default_test_min_points() -> usize {
    128
}

fn default_resample_low() -> f32 {
    0.8
}

fn default_resample_high() -> f32 {
    1.0
}

fn default_jitter_value() -> f32 {
    2.5
}

fn default_rescale_low() -> f32 {
    0.9
}

fn default_rescale_high() -> f32 {
    1.1
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            down_sample_stride: default_down_sample_stride(),
            block_size: default_block_size(),
            block_stride: default_block_stride(),
            train_min_points: default_train_min_points(),
            test_min_points: default_test_min_points(),
            resample_low: default_resample_low(),
            resample_high: default_resample_high(),
            jitter_value: default_jitter_value(),
            rescale_low: default_rescale_low(),
            rescale_high: default_rescale_high(),
            seed: 0,
        }
    }
}

/// Train/test split rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Area index held out for testing
    #[serde(default = "default_test_area")]
    pub test_area: u32,
}

fn default_test_area() -> u32 {
    5
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_area: default_test_area(),
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker threads in the pool
    #[serde(default = "default_num_cpus")]
    pub num_cpus: usize,
}

fn default_num_cpus() -> usize {
    4
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_cpus: default_num_cpus(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub blocks: BlockConfig,

    #[serde(default)]
    pub split: SplitConfig,

    #[serde(default)]
    pub workers: WorkerConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
