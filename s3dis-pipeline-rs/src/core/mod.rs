//! Core data types and I/O operations.

pub mod blocks;
pub mod catalog;
pub mod container;
pub mod loaders;
pub mod writers;

pub use blocks::{normalize_block, sample_block, Block, BlockError, NormalizeOptions, SampleOptions};
pub use catalog::{split_train_test, Catalog, CatalogError, LabelRemap};
pub use container::{load_container, save_container, ContainerError};
pub use loaders::{load_raw_rows, LoaderError, RoomRecord, Shard};
pub use writers::{write_manifest, write_records_csv, WriteError};
