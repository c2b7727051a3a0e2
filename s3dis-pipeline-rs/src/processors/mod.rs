//! Pipeline stages: raw consolidation, augmentation, and the parallel driver.

pub mod augmentation;
pub mod consolidation;
pub mod driver;

// Re-export key types for convenience
pub use augmentation::{
    room_seed, training_axis_flags, AugmentationScheduler, AxisFlags, BlockPipeline,
    VariantParams, VariantPipeline,
};
pub use consolidation::{consolidate, container_name, raw_to_intermediate, ConsolidateError};
pub use driver::{DriverError, DriverState, JobReport, ParallelDriver, Phase, ShardError};
