//! Room-level data types and the raw annotation file parser.
//!
//! Raw S3DIS annotations are one whitespace-delimited text file per class
//! instance, each row holding `x y z r g b`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::LabelRemap;

/// Number of columns in a raw annotation row (x, y, z, r, g, b).
pub const RAW_COLUMNS: usize = 6;

/// Errors that can occur while reading raw annotation files.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed row {line} in '{path}': expected {expected} numeric columns, got '{row}'")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        expected: usize,
        row: String,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Consolidated points and labels of one room.
///
/// `points[i]` is `[x, y, z, r, g, b]` and `labels[i]` its class index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub points: Vec<[f32; RAW_COLUMNS]>,
    pub labels: Vec<u8>,
}

impl RoomRecord {
    /// Creates an empty room.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of points in the room.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append rows that all belong to `label`.
    pub fn extend_class(&mut self, rows: Vec<[f32; RAW_COLUMNS]>, label: u8) {
        self.labels.extend(std::iter::repeat(label).take(rows.len()));
        self.points.extend(rows);
    }

    /// Fold labels at or above the remap threshold into clutter.
    pub fn remap_labels(&mut self, remap: LabelRemap) {
        for label in &mut self.labels {
            *label = remap.apply(*label);
        }
    }
}

/// Four parallel per-block sequences produced for one room.
///
/// Block `i` is `xyz[i]`, `rgb[i]`, `labels[i]` with its minimum corner in
/// `block_mins[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shard {
    pub xyz: Vec<Vec<[f32; 3]>>,
    pub rgb: Vec<Vec<[f32; 3]>>,
    pub labels: Vec<Vec<u8>>,
    pub block_mins: Vec<[f32; 3]>,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks in the shard.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.xyz.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xyz.is_empty()
    }

    /// Append every block of `other` after the blocks already present.
    pub fn append(&mut self, other: Shard) {
        self.xyz.extend(other.xyz);
        self.rgb.extend(other.rgb);
        self.labels.extend(other.labels);
        self.block_mins.extend(other.block_mins);
    }

    /// True when all four sequences have the same length.
    pub fn is_aligned(&self) -> bool {
        let n = self.xyz.len();
        self.rgb.len() == n && self.labels.len() == n && self.block_mins.len() == n
    }
}

/// Load every row of one raw annotation file.
///
/// Blank lines are skipped. Any row that does not hold exactly six numeric
/// values is reported with its 1-based line number.
pub fn load_raw_rows<P: AsRef<Path>>(path: P) -> Result<Vec<[f32; RAW_COLUMNS]>> {
    let path = path.as_ref();
    let io_err = |e| LoaderError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let file = File::open(path).map_err(io_err)?;
    let reader = BufReader::with_capacity(64 * 1024, file);

    let mut rows = Vec::with_capacity(16_384);

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }

        let malformed = || LoaderError::MalformedRow {
            path: path.to_path_buf(),
            line: idx + 1,
            expected: RAW_COLUMNS,
            row: line.clone(),
        };

        let mut row = [0.0f32; RAW_COLUMNS];
        let mut count = 0;
        for field in line.split_whitespace() {
            if count == RAW_COLUMNS {
                return Err(malformed());
            }
            row[count] = field.parse::<f32>().map_err(|_| malformed())?;
            count += 1;
        }

        if count != RAW_COLUMNS {
            return Err(malformed());
        }

        rows.push(row);
    }

    Ok(rows)
}
