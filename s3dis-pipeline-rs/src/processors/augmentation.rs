//! Augmentation variants and per-room shard assembly.
//!
//! A training shard is the concatenation of eight variants of the same
//! room, one for each combination of axis swap, x flip and y flip. A
//! testing shard is a single unaugmented pass with a lower point floor.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::BlockConfig;
use crate::core::blocks::{
    normalize_block, sample_block, BlockError, NormalizeOptions, SampleOptions,
};
use crate::core::loaders::{RoomRecord, Shard};

/// Axis permutation and reflections applied to one variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AxisFlags {
    pub axis_swap: bool,
    pub flip_x: bool,
    pub flip_y: bool,
}

/// Number of training variants per room.
pub const TRAINING_VARIANTS: usize = 8;

/// All axis flag combinations in lexicographic order, `axis_swap` most
/// significant: `000, 001, 010, ..., 111`.
pub fn training_axis_flags() -> [AxisFlags; TRAINING_VARIANTS] {
    std::array::from_fn(|i| AxisFlags {
        axis_swap: i & 0b100 != 0,
        flip_x: i & 0b010 != 0,
        flip_y: i & 0b001 != 0,
    })
}

/// Everything one block-preparation call needs besides the room itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantParams {
    pub down_sample_stride: f32,
    pub block_size: f32,
    pub block_stride: f32,
    pub min_points_per_block: usize,
    pub rescale: bool,
    pub flags: AxisFlags,
    pub resample: bool,
    pub jitter_color: bool,
    pub seed: u64,
}

impl VariantParams {
    /// Parameters of one training variant.
    pub fn training(config: &BlockConfig, flags: AxisFlags, seed: u64) -> Self {
        Self {
            down_sample_stride: config.down_sample_stride,
            block_size: config.block_size,
            block_stride: config.block_stride,
            min_points_per_block: config.train_min_points,
            rescale: true,
            flags,
            resample: true,
            jitter_color: true,
            seed,
        }
    }

    /// Parameters of the single testing pass.
    pub fn testing(config: &BlockConfig, seed: u64) -> Self {
        Self {
            down_sample_stride: config.down_sample_stride,
            block_size: config.block_size,
            block_stride: config.block_stride,
            min_points_per_block: config.test_min_points,
            rescale: false,
            flags: AxisFlags::default(),
            resample: false,
            jitter_color: false,
            seed,
        }
    }
}

/// Turns a room into the blocks of one variant.
pub trait VariantPipeline: Sync {
    fn prepare_variant(
        &self,
        room: &RoomRecord,
        params: &VariantParams,
    ) -> Result<Shard, BlockError>;
}

/// Sampling followed by normalization, with a random stream seeded from the
/// variant parameters.
#[derive(Debug, Clone)]
pub struct BlockPipeline {
    config: BlockConfig,
}

impl BlockPipeline {
    pub fn new(config: BlockConfig) -> Self {
        Self { config }
    }
}

impl VariantPipeline for BlockPipeline {
    fn prepare_variant(
        &self,
        room: &RoomRecord,
        params: &VariantParams,
    ) -> Result<Shard, BlockError> {
        let mut rng = StdRng::seed_from_u64(params.seed);

        let sample = SampleOptions {
            down_sample_stride: params.down_sample_stride,
            block_size: params.block_size,
            block_stride: params.block_stride,
            min_points_per_block: params.min_points_per_block,
            rescale: params.rescale,
            axis_swap: params.flags.axis_swap,
            flip_x: params.flags.flip_x,
            flip_y: params.flags.flip_y,
            rescale_range: (self.config.rescale_low, self.config.rescale_high),
        };
        let blocks = sample_block(&room.points, &room.labels, &sample, &mut rng)?;

        let normalize = NormalizeOptions {
            block_size: params.block_size,
            resample: params.resample,
            resample_low: self.config.resample_low,
            resample_high: self.config.resample_high,
            max_sample: false,
            jitter_color: params.jitter_color,
            jitter_value: self.config.jitter_value,
        };
        normalize_block(blocks, &normalize, &mut rng)
    }
}

/// Seed of a room's random streams.
///
/// The base seed is hashed as little-endian bytes, so hosts of either byte
/// order agree. `DefaultHasher` is only stable within one toolchain release;
/// shards built with a different compiler may use different seeds.
pub fn room_seed(base_seed: u64, stem: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(&base_seed.to_le_bytes());
    stem.hash(&mut hasher);
    hasher.finish()
}

/// Builds training and testing shards for single rooms.
#[derive(Debug, Clone)]
pub struct AugmentationScheduler<P> {
    pipeline: P,
    config: BlockConfig,
}

impl<P: VariantPipeline> AugmentationScheduler<P> {
    pub fn new(pipeline: P, config: BlockConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Concatenate the eight training variants of `room`, in flag order.
    ///
    /// Variant `k` uses seed `seed + k`. The first failing variant aborts
    /// the whole room.
    pub fn prepare_training_shard(
        &self,
        room: &RoomRecord,
        seed: u64,
    ) -> Result<Shard, BlockError> {
        let mut shard = Shard::new();

        for (ordinal, flags) in training_axis_flags().into_iter().enumerate() {
            let variant_seed = seed.wrapping_add(ordinal as u64);
            let params = VariantParams::training(&self.config, flags, variant_seed);
            shard.append(self.pipeline.prepare_variant(room, &params)?);
        }

        Ok(shard)
    }

    /// Produce the single unaugmented testing shard of `room`.
    pub fn prepare_testing_shard(&self, room: &RoomRecord, seed: u64) -> Result<Shard, BlockError> {
        let params = VariantParams::testing(&self.config, seed);
        self.pipeline.prepare_variant(room, &params)
    }
}

impl AugmentationScheduler<BlockPipeline> {
    /// Scheduler backed by the concrete block routines.
    pub fn with_blocks(config: BlockConfig) -> Self {
        Self::new(BlockPipeline::new(config.clone()), config)
    }
}
