//! Binary container files for intermediate rooms and final shards.
//!
//! Any serde value round-trips through `bincode` with its exact shape and
//! element types, so room labels stay `u8` on disk.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// File extension used for intermediate room containers.
pub const CONTAINER_EXT: &str = "bin";

/// Errors that can occur while reading or writing a container.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("failed to access container '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode container '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to decode container '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Serialize `value` to `path`, creating parent directories as needed.
///
/// An existing file is overwritten.
pub fn save_container<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let io_err = |e| ContainerError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);

    bincode::serialize_into(&mut writer, value).map_err(|e| ContainerError::Encode {
        path: path.to_path_buf(),
        source: e,
    })?;

    writer.flush().map_err(io_err)?;
    Ok(())
}

/// Deserialize a value previously written by [`save_container`].
pub fn load_container<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ContainerError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    bincode::deserialize_from(BufReader::with_capacity(1024 * 1024, file)).map_err(|e| {
        ContainerError::Decode {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
