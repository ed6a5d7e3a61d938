//! Finding music files to upload on the local file system

use walkdir::WalkDir;

use std::path::{Path, PathBuf};

use crate::storage::error::StorageError;

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "opus", "aac", "aiff"];

pub fn is_music_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MUSIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collects music files under `root`, sorted by path.
pub fn scan_dir(root: &Path, follow_symlinks: bool) -> Vec<PathBuf> {
    let root_str = root.to_string_lossy();

    let mut paths = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("error while scanning dir {root_str}, skipping an entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_music_file(p))
        .collect::<Vec<PathBuf>>();
    paths.sort();
    paths
}

/// Expands the given paths into upload candidates: directories are scanned,
/// files are taken as they are whatever their extension.
pub fn collect_uploads(
    inputs: &[PathBuf],
    follow_symlinks: bool,
) -> Result<Vec<PathBuf>, StorageError> {
    let mut uploads = Vec::new();
    for input in inputs {
        let meta = std::fs::metadata(input)?;
        if meta.is_dir() {
            uploads.extend(scan_dir(input, follow_symlinks));
        } else {
            uploads.push(input.clone());
        }
    }
    Ok(uploads)
}
