//! Raw annotation folders to consolidated per-room containers.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use thiserror::Error;

use crate::core::catalog::Catalog;
use crate::core::container::{save_container, ContainerError, CONTAINER_EXT};
use crate::core::loaders::{load_raw_rows, LoaderError, RoomRecord};
use crate::core::writers::{write_manifest, WriteError};

/// Manifest of produced containers, written into the intermediate directory.
pub const MANIFEST_FILE: &str = "room_names.txt";

/// Errors that can occur while consolidating rooms.
#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error("unknown class '{class}' in annotation file {path}")]
    UnknownClass { class: String, path: PathBuf },

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("no annotation files found in room directory {0}")]
    EmptyRoom(PathBuf),

    #[error("failed to list directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Result type for consolidation.
pub type Result<T> = std::result::Result<T, ConsolidateError>;

/// List the `*.txt` annotation files of a room, sorted by path.
pub fn find_annotation_files(room_dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir_err = |e| ConsolidateError::ReadDir {
        path: room_dir.to_path_buf(),
        source: e,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(room_dir).map_err(read_dir_err)? {
        let path = entry.map_err(read_dir_err)?.path();
        let is_txt = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if is_txt && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Class name encoded in an annotation file name (text before the first `_`).
pub fn class_prefix(path: &Path) -> &str {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('_').next())
        .unwrap_or_default()
}

/// Build the consolidated record of one room.
///
/// Every annotation file contributes its rows, labelled with the class
/// resolved from the file name. Labels are not remapped here.
pub fn consolidate(room_dir: &Path, catalog: &Catalog) -> Result<RoomRecord> {
    let files = find_annotation_files(room_dir)?;
    if files.is_empty() {
        return Err(ConsolidateError::EmptyRoom(room_dir.to_path_buf()));
    }

    // Resolve every class before parsing so an unknown class fails fast.
    let labelled: Vec<(&PathBuf, u8)> = files
        .iter()
        .map(|path| {
            let class = class_prefix(path);
            catalog
                .class_index(class)
                .map(|label| (path, label))
                .ok_or_else(|| ConsolidateError::UnknownClass {
                    class: class.to_string(),
                    path: path.clone(),
                })
        })
        .collect::<Result<_>>()?;

    let parsed: Vec<(Vec<[f32; 6]>, u8)> = labelled
        .iter()
        .map(|&(path, label)| load_raw_rows(path).map(|rows| (rows, label)))
        .collect::<std::result::Result<_, LoaderError>>()?;

    let total: usize = parsed.iter().map(|(rows, _)| rows.len()).sum();
    let mut room = RoomRecord {
        points: Vec::with_capacity(total),
        labels: Vec::with_capacity(total),
    };
    for (rows, label) in parsed {
        room.extend_class(rows, label);
    }

    debug!(
        "{}: {} files, {} points",
        room_dir.display(),
        files.len(),
        room.len()
    );

    Ok(room)
}

/// Container name for the room at position `index` of the catalog.
///
/// The trailing annotation folder is dropped and the remaining path
/// components are joined with `_`, e.g. `Area_1/office_1/Annotations` at
/// index 3 becomes `3_Area_1_office_1.bin`.
pub fn container_name(index: usize, room_dir: &Path) -> String {
    let components: Vec<String> = room_dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    let kept = if components.len() > 1 {
        &components[..components.len() - 1]
    } else {
        &components[..]
    };

    format!("{}_{}.{}", index, kept.join("_"), CONTAINER_EXT)
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.green/blue}] {pos}/{len} rooms ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏"),
    );
    pb
}

/// Consolidate every catalog room under `raw_dir` into `out_dir`.
///
/// Rooms are processed one after another in catalog order. Labels at or
/// above the catalog's remap threshold become clutter before saving. The
/// manifest lists the produced container names in processing order.
///
/// # Returns
///
/// The container names, in catalog order.
pub fn raw_to_intermediate(
    raw_dir: &Path,
    out_dir: &Path,
    catalog: &Catalog,
) -> Result<Vec<String>> {
    fs::create_dir_all(out_dir).map_err(|e| ConsolidateError::CreateDir {
        path: out_dir.to_path_buf(),
        source: e,
    })?;

    let remap = catalog.remap();
    let room_dirs = catalog.room_directories();
    let mut names = Vec::with_capacity(room_dirs.len());

    let pb = progress_bar(room_dirs.len());
    pb.set_message("Consolidating rooms");

    for (index, dir) in room_dirs.iter().enumerate() {
        let mut room = consolidate(&raw_dir.join(dir), catalog)?;
        room.remap_labels(remap);

        let name = container_name(index, dir);
        save_container(out_dir.join(&name), &room)?;

        info!("raw2intermediate {} done ({} points)", name, room.len());
        names.push(name);
        pb.inc(1);
    }

    pb.finish_with_message("Rooms consolidated");

    write_manifest(&out_dir.join(MANIFEST_FILE), &names)?;

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::core::container::load_container;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn test_catalog(room_dirs: Vec<PathBuf>) -> Catalog {
        let classes = [
            "ceiling", "floor", "beam", "column", "chair", "window", "door", "wall", "table",
            "sofa", "bookcase", "board", "clutter", "stairs",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Catalog::from_parts(classes, room_dirs, vec![], "clutter", "stairs").unwrap()
    }

    fn write_class_file(dir: &Path, name: &str, rows: usize, offset: f32) {
        let mut file = File::create(dir.join(name)).unwrap();
        for i in 0..rows {
            writeln!(
                file,
                "{:.3} {:.3} {:.3} 120 130 140",
                offset + (i % 30) as f32 * 0.06,
                (i / 30) as f32 * 0.06,
                0.4
            )
            .unwrap();
        }
    }

    #[test]
    fn test_consolidate_chair_and_wall() {
        let temp_dir = TempDir::new().unwrap();
        write_class_file(temp_dir.path(), "chair_0.txt", 600, 0.0);
        write_class_file(temp_dir.path(), "wall_0.txt", 600, 2.0);
        let catalog = test_catalog(vec![]);

        let room = consolidate(temp_dir.path(), &catalog).unwrap();

        assert_eq!(room.points.len(), 1200);
        assert_eq!(room.labels.len(), 1200);
        assert_eq!(room.labels.iter().filter(|&&l| l == 4).count(), 600);
        assert_eq!(room.labels.iter().filter(|&&l| l == 7).count(), 600);
    }

    #[test]
    fn test_unknown_class_prefix() {
        let temp_dir = TempDir::new().unwrap();
        write_class_file(temp_dir.path(), "chair_0.txt", 3, 0.0);
        write_class_file(temp_dir.path(), "piano_1.txt", 3, 0.0);

        match consolidate(temp_dir.path(), &test_catalog(vec![])) {
            Err(ConsolidateError::UnknownClass { class, path }) => {
                assert_eq!(class, "piano");
                assert!(path.ends_with("piano_1.txt"));
            }
            other => panic!("Expected UnknownClass, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_row_propagates() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("wall_2.txt"), "1 2 3 4 5 6\n1 2 3\n").unwrap();

        let result = consolidate(temp_dir.path(), &test_catalog(vec![]));
        assert!(matches!(
            result,
            Err(ConsolidateError::Loader(LoaderError::MalformedRow { line: 2, .. }))
        ));
    }

    #[test]
    fn test_room_without_annotations() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.md"), "not an annotation").unwrap();

        let result = consolidate(temp_dir.path(), &test_catalog(vec![]));
        assert!(matches!(result, Err(ConsolidateError::EmptyRoom(_))));
    }

    #[test]
    fn test_container_name() {
        let dir: PathBuf = ["Area_1", "conferenceRoom_1", "Annotations"].iter().collect();
        assert_eq!(container_name(0, &dir), "0_Area_1_conferenceRoom_1.bin");
        assert_eq!(container_name(17, Path::new("lonely")), "17_lonely.bin");
    }

    #[test]
    fn test_raw_to_intermediate_remaps_and_writes_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let raw_dir = temp_dir.path().join("raw");
        let out_dir = temp_dir.path().join("out");

        let room_a: PathBuf = ["Area_1", "office_1", "Annotations"].iter().collect();
        let room_b: PathBuf = ["Area_5", "hallway_2", "Annotations"].iter().collect();
        fs::create_dir_all(raw_dir.join(&room_a)).unwrap();
        fs::create_dir_all(raw_dir.join(&room_b)).unwrap();

        write_class_file(&raw_dir.join(&room_a), "chair_0.txt", 10, 0.0);
        write_class_file(&raw_dir.join(&room_b), "stairs_1.txt", 5, 0.0);
        write_class_file(&raw_dir.join(&room_b), "clutter_1.txt", 5, 1.0);

        let catalog = test_catalog(vec![room_a, room_b]);

        let names = raw_to_intermediate(&raw_dir, &out_dir, &catalog).unwrap();
        assert_eq!(names, vec!["0_Area_1_office_1.bin", "1_Area_5_hallway_2.bin"]);

        let manifest = fs::read_to_string(out_dir.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest, "0_Area_1_office_1.bin\n1_Area_5_hallway_2.bin\n");

        let hallway: RoomRecord = load_container(out_dir.join(&names[1])).unwrap();
        assert_eq!(hallway.len(), 10);
        assert!(hallway.labels.iter().all(|&l| l == 12));

        let class_count = catalog.class_names().len() as u8;
        let office: RoomRecord = load_container(out_dir.join(&names[0])).unwrap();
        assert!(office.labels.iter().all(|&l| l < class_count && l != 13));
    }

    #[test]
    fn test_rerun_produces_identical_labels() {
        let temp_dir = TempDir::new().unwrap();
        let raw_dir = temp_dir.path().join("raw");
        let room: PathBuf = ["Area_2", "storage_1", "Annotations"].iter().collect();
        fs::create_dir_all(raw_dir.join(&room)).unwrap();
        write_class_file(&raw_dir.join(&room), "wall_0.txt", 40, 0.0);
        write_class_file(&raw_dir.join(&room), "chair_3.txt", 25, 3.0);
        write_class_file(&raw_dir.join(&room), "stairs_0.txt", 7, 6.0);

        let catalog = test_catalog(vec![room]);

        let first_dir = temp_dir.path().join("first");
        let second_dir = temp_dir.path().join("second");
        let names = raw_to_intermediate(&raw_dir, &first_dir, &catalog).unwrap();
        raw_to_intermediate(&raw_dir, &second_dir, &catalog).unwrap();

        let first: RoomRecord = load_container(first_dir.join(&names[0])).unwrap();
        let second: RoomRecord = load_container(second_dir.join(&names[0])).unwrap();
        assert_eq!(first.labels, second.labels);

        let mut first_rows: Vec<Vec<u32>> = first
            .points
            .iter()
            .map(|p| p.iter().map(|v| v.to_bits()).collect())
            .collect();
        let mut second_rows: Vec<Vec<u32>> = second
            .points
            .iter()
            .map(|p| p.iter().map(|v| v.to_bits()).collect())
            .collect();
        first_rows.sort();
        second_rows.sort();
        assert_eq!(first_rows, second_rows);
    }

    #[test]
    fn test_points_follow_sorted_file_order() {
        let temp_dir = TempDir::new().unwrap();
        write_class_file(temp_dir.path(), "wall_0.txt", 4, 0.0);
        write_class_file(temp_dir.path(), "chair_1.txt", 2, 1.0);
        write_class_file(temp_dir.path(), "chair_0.txt", 3, 2.0);

        let room = consolidate(temp_dir.path(), &test_catalog(vec![])).unwrap();

        assert_eq!(room.labels, vec![4, 4, 4, 4, 4, 7, 7, 7, 7]);
        assert_eq!(room.points[0][0], 2.0);
        assert_eq!(room.points[3][0], 1.0);
        assert_eq!(room.points[5][0], 0.0);
    }

    #[test]
    fn test_missing_room_directory() {
        let temp_dir = TempDir::new().unwrap();
        let room_dir = temp_dir.path().join("Area_9").join("gone_1");

        match consolidate(&room_dir, &test_catalog(vec![])) {
            Err(ConsolidateError::ReadDir { path, .. }) => assert_eq!(path, room_dir),
            other => panic!("Expected ReadDir, got {:?}", other),
        }
    }

    #[test]
    fn test_shipped_catalog_names_match_containers() {
        let config = CatalogConfig {
            dir: Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("catalog"),
            ..CatalogConfig::default()
        };
        let catalog = Catalog::load(&config).unwrap();

        assert_eq!(catalog.class_names().len(), 14);
        assert_eq!(catalog.remap().threshold, 13);
        assert_eq!(catalog.remap().clutter, 12);

        let dirs = catalog.room_directories();
        let stems = catalog.room_stems();
        assert_eq!(dirs.len(), 272);
        assert_eq!(stems.len(), dirs.len());
        for (index, (dir, stem)) in dirs.iter().zip(stems).enumerate() {
            assert_eq!(&container_name(index, dir), stem);
        }

        let (train, test) = catalog.split_train_test(5).unwrap();
        assert_eq!(test.len(), 68);
        assert_eq!(train.len(), 204);
    }
}
