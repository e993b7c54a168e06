//! Path and filesystem utilities

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ConvertError;

/// Lowercased extension with the leading dot (`IMG_1.JPG` -> `.jpg`), or None when there is none.
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

/// File name as a String, empty when the path has none.
pub fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `stem + ext` (`/a/DSC_1.NEF`, `.jpg` -> `DSC_1.jpg`).
pub fn normalized_name(path: &Path, ext: &str) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}{ext}")
}

/// Create `dir` (and parents) unless it already exists as a directory.
/// Several workers may race on the same folder; losing the race is not an error.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    log::debug!("Creating folder: {}", dir.display());
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e).with_context(|| format!("create folder {}", dir.display())),
    }
}

/// Canonicalize the source path, mapping a missing path to [`ConvertError::SourceNotFound`].
pub fn check_source_and_canonicalize(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(p) => Ok(p),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ConvertError::SourceNotFound(path.to_path_buf()).into())
        }
        Err(e) => Err(e).with_context(|| format!("canonicalize {}", path.display())),
    }
}
