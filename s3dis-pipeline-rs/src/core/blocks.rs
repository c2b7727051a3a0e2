//! Spatial block sampling and per-block normalization.
//!
//! A room is reflected/permuted/rescaled as requested, shifted to a zero
//! minimum corner, voxel down-sampled, and cut into overlapping square
//! windows in the x/y plane (full room height). Windows with too few points
//! are dropped. Normalization then moves each block into local coordinates
//! and optionally resamples points and jitters colors.

use std::collections::HashSet;

use rand::Rng;
use thiserror::Error;

use super::loaders::{Shard, RAW_COLUMNS};

/// Errors raised by the block routines.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("room has no points")]
    EmptyRoom,

    #[error("points and labels differ in length: {points} points, {labels} labels")]
    LengthMismatch { points: usize, labels: usize },

    #[error("invalid block parameter: {0}")]
    InvalidParameter(String),

    #[error("point {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// Result type for block operations.
pub type Result<T> = std::result::Result<T, BlockError>;

/// One spatial window of a room, in room coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub xyz: Vec<[f32; 3]>,
    pub rgb: Vec<[f32; 3]>,
    pub labels: Vec<u8>,
}

impl Block {
    #[inline]
    pub fn len(&self) -> usize {
        self.xyz.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xyz.is_empty()
    }
}

/// Options for [`sample_block`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOptions {
    pub down_sample_stride: f32,
    pub block_size: f32,
    pub block_stride: f32,
    pub min_points_per_block: usize,
    pub rescale: bool,
    pub axis_swap: bool,
    pub flip_x: bool,
    pub flip_y: bool,
    /// Bounds of the isotropic scale factor drawn when `rescale` is set
    pub rescale_range: (f32, f32),
}

/// Options for [`normalize_block`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    pub block_size: f32,
    pub resample: bool,
    pub resample_low: f32,
    pub resample_high: f32,
    /// Always keep the upper bound of the resample range instead of drawing
    pub max_sample: bool,
    pub jitter_color: bool,
    pub jitter_value: f32,
}

impl SampleOptions {
    fn validate(&self) -> Result<()> {
        if !(self.down_sample_stride > 0.0) {
            return Err(BlockError::InvalidParameter(format!(
                "down_sample_stride must be positive, got {}",
                self.down_sample_stride
            )));
        }
        if !(self.block_size > 0.0) || !(self.block_stride > 0.0) {
            return Err(BlockError::InvalidParameter(format!(
                "block_size and block_stride must be positive, got {} and {}",
                self.block_size, self.block_stride
            )));
        }
        let (low, high) = self.rescale_range;
        if self.rescale && !(low > 0.0 && low <= high) {
            return Err(BlockError::InvalidParameter(format!(
                "rescale range must satisfy 0 < low <= high, got [{}, {}]",
                low, high
            )));
        }
        Ok(())
    }
}

impl NormalizeOptions {
    fn validate(&self) -> Result<()> {
        if self.resample
            && !(self.resample_low > 0.0
                && self.resample_low <= self.resample_high
                && self.resample_high <= 1.0)
        {
            return Err(BlockError::InvalidParameter(format!(
                "resample range must satisfy 0 < low <= high <= 1, got [{}, {}]",
                self.resample_low, self.resample_high
            )));
        }
        if self.jitter_color && !(self.jitter_value >= 0.0) {
            return Err(BlockError::InvalidParameter(format!(
                "jitter_value must be non-negative, got {}",
                self.jitter_value
            )));
        }
        Ok(())
    }
}

/// Number of windows of `size` at `stride` needed to cover `[0, extent]`.
fn window_count(extent: f32, size: f32, stride: f32) -> usize {
    if extent <= size {
        1
    } else {
        ((extent - size) / stride).ceil() as usize + 1
    }
}

/// Inclusive range of window indices whose span `[i * stride, i * stride + size]` holds `v`.
fn covering_windows(v: f32, size: f32, stride: f32, count: usize) -> (usize, usize) {
    let lo = ((v - size) / stride).ceil().max(0.0) as usize;
    let hi = ((v / stride).floor().max(0.0) as usize).min(count - 1);
    (lo, hi)
}

/// Partition a room into fixed-size blocks.
///
/// Coordinates are permuted and reflected before blocking, in the order
/// swap, flip-x, flip-y, then scaled. Down-sampling keeps the first point
/// that falls into each voxel. Blocks are returned in x-major window order.
pub fn sample_block<R: Rng>(
    points: &[[f32; RAW_COLUMNS]],
    labels: &[u8],
    options: &SampleOptions,
    rng: &mut R,
) -> Result<Vec<Block>> {
    options.validate()?;

    if points.len() != labels.len() {
        return Err(BlockError::LengthMismatch {
            points: points.len(),
            labels: labels.len(),
        });
    }
    if points.is_empty() {
        return Err(BlockError::EmptyRoom);
    }

    let scale = if options.rescale {
        let (low, high) = options.rescale_range;
        rng.gen_range(low..=high)
    } else {
        1.0
    };

    let mut xyz = Vec::with_capacity(points.len());
    let mut min = [f32::INFINITY; 3];

    for (index, p) in points.iter().enumerate() {
        let (mut x, mut y, z) = (p[0], p[1], p[2]);
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(BlockError::NonFinite { index });
        }

        if options.axis_swap {
            std::mem::swap(&mut x, &mut y);
        }
        if options.flip_x {
            x = -x;
        }
        if options.flip_y {
            y = -y;
        }

        let q = [x * scale, y * scale, z * scale];
        for axis in 0..3 {
            min[axis] = min[axis].min(q[axis]);
        }
        xyz.push(q);
    }

    for q in &mut xyz {
        for axis in 0..3 {
            q[axis] -= min[axis];
        }
    }

    // Voxel down-sampling
    let stride = options.down_sample_stride;
    let mut occupied: HashSet<(i64, i64, i64)> = HashSet::with_capacity(xyz.len() / 4);
    let kept: Vec<usize> = (0..xyz.len())
        .filter(|&i| {
            let q = xyz[i];
            occupied.insert((
                (q[0] / stride).floor() as i64,
                (q[1] / stride).floor() as i64,
                (q[2] / stride).floor() as i64,
            ))
        })
        .collect();

    let (max_x, max_y) = kept.iter().fold((0.0f32, 0.0f32), |(mx, my), &i| {
        (mx.max(xyz[i][0]), my.max(xyz[i][1]))
    });

    let size = options.block_size;
    let step = options.block_stride;
    let nx = window_count(max_x, size, step);
    let ny = window_count(max_y, size, step);

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); nx * ny];
    for &i in &kept {
        let (x_lo, x_hi) = covering_windows(xyz[i][0], size, step, nx);
        let (y_lo, y_hi) = covering_windows(xyz[i][1], size, step, ny);
        for bx in x_lo..=x_hi {
            for by in y_lo..=y_hi {
                members[bx * ny + by].push(i);
            }
        }
    }

    let blocks = members
        .into_iter()
        .filter(|idx| !idx.is_empty() && idx.len() >= options.min_points_per_block)
        .map(|idx| Block {
            xyz: idx.iter().map(|&i| xyz[i]).collect(),
            rgb: idx
                .iter()
                .map(|&i| [points[i][3], points[i][4], points[i][5]])
                .collect(),
            labels: idx.iter().map(|&i| labels[i]).collect(),
        })
        .collect();

    Ok(blocks)
}

/// Move blocks into local coordinates and apply resampling and color jitter.
///
/// Each block's minimum corner is recorded in `block_mins` and subtracted
/// from its points. Colors end up in `[-1, 1]`.
pub fn normalize_block<R: Rng>(
    blocks: Vec<Block>,
    options: &NormalizeOptions,
    rng: &mut R,
) -> Result<Shard> {
    options.validate()?;

    let mut shard = Shard::new();

    for block in blocks {
        if block.is_empty() {
            continue;
        }

        let n = block.len();
        let selected: Vec<usize> = if options.resample {
            let low = ((options.resample_low * n as f32).ceil() as usize).clamp(1, n);
            let high = ((options.resample_high * n as f32).floor() as usize).clamp(low, n);
            let count = if options.max_sample {
                high
            } else {
                rng.gen_range(low..=high)
            };
            let mut picked = rand::seq::index::sample(rng, n, count).into_vec();
            picked.sort_unstable();
            picked
        } else {
            (0..n).collect()
        };

        let mut min = [f32::INFINITY; 3];
        for &i in &selected {
            for axis in 0..3 {
                min[axis] = min[axis].min(block.xyz[i][axis]);
            }
        }

        let xyz: Vec<[f32; 3]> = selected
            .iter()
            .map(|&i| {
                let p = block.xyz[i];
                [p[0] - min[0], p[1] - min[1], p[2] - min[2]]
            })
            .collect();

        let rgb: Vec<[f32; 3]> = selected
            .iter()
            .map(|&i| {
                let mut c = block.rgb[i];
                for channel in &mut c {
                    if options.jitter_color {
                        *channel += rng.gen_range(-options.jitter_value..=options.jitter_value);
                    }
                    *channel = channel.clamp(0.0, 255.0) / 127.5 - 1.0;
                }
                c
            })
            .collect();

        let labels: Vec<u8> = selected.iter().map(|&i| block.labels[i]).collect();

        shard.xyz.push(xyz);
        shard.rgb.push(rgb);
        shard.labels.push(labels);
        shard.block_mins.push(min);
    }

    Ok(shard)
}
