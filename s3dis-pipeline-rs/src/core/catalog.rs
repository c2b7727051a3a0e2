//! Static reference catalog: class names, raw room directories and room stems.
//!
//! The catalog is loaded once per process from plain text files and is never
//! regenerated at run time. It is passed by reference into every component
//! that needs class lookups or the room list.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::CatalogConfig;

/// Position of the area index within an underscore-delimited room stem.
pub const AREA_FIELD_INDEX: usize = 2;

/// Errors raised while loading or interpreting the reference catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("missing reference artifact '{path}': {source}")]
    MissingArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reference artifact is empty: {0}")]
    EmptyArtifact(PathBuf),

    #[error("room stem '{0}' has fewer than 3 underscore-delimited fields")]
    MalformedStem(String),

    #[error("class '{0}' is not present in the class catalog")]
    MissingClass(String),

    #[error("class catalog has {0} entries, labels are limited to 256")]
    TooManyClasses(usize),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Collapses every label at or above `threshold` into the clutter class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRemap {
    pub threshold: u8,
    pub clutter: u8,
}

impl LabelRemap {
    #[inline]
    pub fn apply(&self, label: u8) -> u8 {
        if label >= self.threshold {
            self.clutter
        } else {
            label
        }
    }
}

/// Immutable reference data shared by every stage of the pipeline.
#[derive(Debug, Clone)]
pub struct Catalog {
    class_names: Vec<String>,
    room_dirs: Vec<PathBuf>,
    room_stems: Vec<String>,
    remap: LabelRemap,
}

impl Catalog {
    /// Load all three reference lists from the configured directory.
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        let class_names = read_lines(&config.dir.join(&config.class_names_file))?;
        let room_dirs = read_lines(&config.dir.join(&config.room_dirs_file))?
            .iter()
            .map(|line| line.split_whitespace().collect::<PathBuf>())
            .collect();
        let room_stems = read_lines(&config.dir.join(&config.room_stems_file))?;

        Self::from_parts(
            class_names,
            room_dirs,
            room_stems,
            &config.clutter_class,
            &config.discarded_class,
        )
    }

    /// Build a catalog from in-memory lists, validating stems and class names.
    ///
    /// The remap threshold is the index of `discarded_class` when the catalog
    /// has one, otherwise everything after the clutter class is folded into it.
    pub fn from_parts(
        class_names: Vec<String>,
        room_dirs: Vec<PathBuf>,
        room_stems: Vec<String>,
        clutter_class: &str,
        discarded_class: &str,
    ) -> Result<Self> {
        if class_names.len() > 256 {
            return Err(CatalogError::TooManyClasses(class_names.len()));
        }

        for stem in &room_stems {
            area_index(stem)?;
        }

        let position = |name: &str| class_names.iter().position(|c| c == name);

        let clutter = position(clutter_class)
            .ok_or_else(|| CatalogError::MissingClass(clutter_class.to_string()))?;
        let threshold = position(discarded_class).unwrap_or(clutter + 1);

        // A threshold past the last index can never be reached; clamp into u8.
        let threshold = threshold.min(u8::MAX as usize) as u8;

        Ok(Self {
            class_names,
            room_dirs,
            room_stems,
            remap: LabelRemap {
                threshold,
                clutter: clutter as u8,
            },
        })
    }

    /// Class names in label order.
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Raw room directories, relative to the raw dataset root.
    pub fn room_directories(&self) -> &[PathBuf] {
        &self.room_dirs
    }

    /// Room identifier stems, one per logical room.
    pub fn room_stems(&self) -> &[String] {
        &self.room_stems
    }

    /// Resolve a class name to its label.
    pub fn class_index(&self, name: &str) -> Option<u8> {
        self.class_names
            .iter()
            .position(|c| c == name)
            .map(|i| i as u8)
    }

    pub fn remap(&self) -> LabelRemap {
        self.remap
    }

    /// Partition the catalog's stems into train and test sets.
    pub fn split_train_test(&self, test_area: u32) -> Result<(Vec<String>, Vec<String>)> {
        split_train_test(&self.room_stems, test_area)
    }
}

/// Return the area-index field of a room stem.
pub fn area_index(stem: &str) -> Result<&str> {
    stem.split('_')
        .nth(AREA_FIELD_INDEX)
        .ok_or_else(|| CatalogError::MalformedStem(stem.to_string()))
}

/// Split stems by area: equal to `test_area` goes to test, anything else to train.
///
/// Input order is preserved within each side.
pub fn split_train_test(stems: &[String], test_area: u32) -> Result<(Vec<String>, Vec<String>)> {
    let test_token = test_area.to_string();
    let mut train = Vec::new();
    let mut test = Vec::new();

    for stem in stems {
        if area_index(stem)? == test_token {
            test.push(stem.clone());
        } else {
            train.push(stem.clone());
        }
    }

    Ok((train, test))
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| CatalogError::MissingArtifact {
        path: path.to_path_buf(),
        source: e,
    })?;

    let lines: Vec<String> = content
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.trim().is_empty())
        .collect();

    if lines.is_empty() {
        return Err(CatalogError::EmptyArtifact(path.to_path_buf()));
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn s3dis_classes() -> Vec<String> {
        [
            "ceiling", "floor", "wall", "beam", "column", "window", "door", "table", "chair",
            "sofa", "bookcase", "board", "clutter", "stairs",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn write_catalog(dir: &Path, stems: &str) -> CatalogConfig {
        fs::write(dir.join("s3dis_class_names.txt"), s3dis_classes().join("\n")).unwrap();
        fs::write(
            dir.join("s3dis_dir_names.txt"),
            "Area_1 office_1 Annotations\nArea_5 hallway_2 Annotations\n",
        )
        .unwrap();
        fs::write(dir.join("s3dis_room_stems.txt"), stems).unwrap();

        CatalogConfig {
            dir: dir.to_path_buf(),
            ..CatalogConfig::default()
        }
    }

    #[test]
    fn test_load_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_catalog(
            temp_dir.path(),
            "0_Area_1_office_1.bin\n1_Area_5_hallway_2.bin\n",
        );

        let catalog = Catalog::load(&config).unwrap();

        assert_eq!(catalog.class_names().len(), 14);
        assert_eq!(catalog.class_index("chair"), Some(8));
        assert_eq!(catalog.class_index("piano"), None);
        assert_eq!(
            catalog.room_directories()[0],
            ["Area_1", "office_1", "Annotations"].iter().collect::<PathBuf>()
        );
        assert_eq!(catalog.room_stems().len(), 2);
    }

    #[test]
    fn test_documented_catalog_remaps_stairs_to_clutter() {
        let catalog =
            Catalog::from_parts(s3dis_classes(), vec![], vec![], "clutter", "stairs").unwrap();
        let remap = catalog.remap();

        assert_eq!(remap, LabelRemap { threshold: 13, clutter: 12 });
        assert_eq!(remap.apply(4), 4);
        assert_eq!(remap.apply(12), 12);
        assert_eq!(remap.apply(13), 12);
        assert_eq!(remap.apply(255), 12);
    }

    #[test]
    fn test_remap_without_discarded_class() {
        let classes = vec!["wall".to_string(), "clutter".to_string(), "extra".to_string()];
        let catalog = Catalog::from_parts(classes, vec![], vec![], "clutter", "stairs").unwrap();

        assert_eq!(catalog.remap(), LabelRemap { threshold: 2, clutter: 1 });
    }

    #[test]
    fn test_missing_clutter_class() {
        let classes = vec!["wall".to_string()];
        let result = Catalog::from_parts(classes, vec![], vec![], "clutter", "stairs");

        assert!(matches!(result, Err(CatalogError::MissingClass(name)) if name == "clutter"));
    }

    #[test]
    fn test_missing_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let config = CatalogConfig {
            dir: temp_dir.path().to_path_buf(),
            ..CatalogConfig::default()
        };

        match Catalog::load(&config) {
            Err(CatalogError::MissingArtifact { path, .. }) => {
                assert!(path.ends_with("s3dis_class_names.txt"));
            }
            other => panic!("Expected MissingArtifact, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_stem_rejected_at_load() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_catalog(temp_dir.path(), "0_Area_1_office_1.bin\nbroken_stem\n");

        let result = Catalog::load(&config);
        assert!(matches!(result, Err(CatalogError::MalformedStem(s)) if s == "broken_stem"));
    }

    #[test]
    fn test_split_train_test_by_area() {
        let stems = vec!["area_x_5_office_1".to_string(), "area_x_3_office_1".to_string()];

        let (train, test) = split_train_test(&stems, 5).unwrap();

        assert_eq!(train, vec!["area_x_3_office_1".to_string()]);
        assert_eq!(test, vec!["area_x_5_office_1".to_string()]);
    }

    #[test]
    fn test_split_is_a_partition() {
        let stems: Vec<String> = (0..30)
            .map(|i| format!("{}_Area_{}_room_{}.bin", i, i % 6 + 1, i))
            .collect();

        let (train, test) = split_train_test(&stems, 5).unwrap();

        assert_eq!(train.len() + test.len(), stems.len());
        for stem in &stems {
            assert!(train.contains(stem) ^ test.contains(stem));
        }
        assert!(test.iter().all(|s| area_index(s).unwrap() == "5"));
        assert!(train.iter().all(|s| area_index(s).unwrap() != "5"));
    }

    #[test]
    fn test_area_index_exact_match() {
        // "15" must not be treated as area 5
        let stems = vec!["3_Area_15_office_1.bin".to_string()];
        let (train, test) = split_train_test(&stems, 5).unwrap();

        assert_eq!(train.len(), 1);
        assert!(test.is_empty());
    }
}
