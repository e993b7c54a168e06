//! Folder scan: list candidates, filter by extension, read capture dates.

use anyhow::{Context, Result};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::ImageFile;
use crate::engine::tools::lowercase_extension;
use crate::settings::normalize_extension;

use super::capture_date::{CaptureDateSource, capture_keys, now_keys};

/// What the scan needs besides the source path.
pub struct ScanOptions<'a> {
    /// Recognized extensions, sorted (binary search).
    pub extensions: &'a [String],
    pub ext_remap: &'a BTreeMap<String, String>,
    pub strict_metadata: bool,
}

/// Candidate paths under `source`.
///
/// A directory is listed non-recursively, sorted by path and filtered to recognized extensions.
/// A single file is the only candidate whatever its extension.
pub fn list_candidates(source: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(source).with_context(|| format!("stat {}", source.display()))?;
    if !meta.is_dir() {
        return Ok(vec![source.to_path_buf()]);
    }

    debug!("Getting image files in folder {}", source.display());
    let mut paths = Vec::new();
    for entry in WalkDir::new(source).min_depth(1).max_depth(1) {
        match entry {
            Ok(entry) if !entry.file_type().is_dir() => paths.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => warn!("Skipping unreadable entry: {}", err),
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .filter(|p| is_recognized(p, extensions))
        .collect())
}

/// True when the lowercased extension of `path` is in the sorted `extensions`.
pub fn is_recognized(path: &Path, extensions: &[String]) -> bool {
    lowercase_extension(path).is_some_and(|ext| extensions.binary_search(&ext).is_ok())
}

/// Output extension for `path`: the remapped one if any, else its own lowercased extension.
pub fn target_extension(path: &Path, ext_remap: &BTreeMap<String, String>) -> String {
    let ext = lowercase_extension(path).unwrap_or_default();
    match ext_remap.get(&ext) {
        Some(target) => normalize_extension(target),
        None => ext,
    }
}

/// Turn candidates into [`ImageFile`]s, reading dates in parallel. Order of `candidates` is kept.
///
/// An unreadable date falls back to the current time, or excludes the file when
/// `strict_metadata` is set.
pub fn collect_image_files(
    candidates: &[PathBuf],
    opts: &ScanOptions<'_>,
    dates: &dyn CaptureDateSource,
) -> Vec<ImageFile> {
    candidates
        .par_iter()
        .filter_map(|path| {
            let (timestamp, sort_key) = match dates.capture_time(path) {
                Ok(dt) => capture_keys(&dt),
                Err(e) if opts.strict_metadata => {
                    warn!("Excluding {}: {:#}", path.display(), e);
                    return None;
                }
                Err(e) => {
                    warn!("{:#}; dating {} with the current time", e, path.display());
                    now_keys()
                }
            };
            debug!(
                "Image file {}: timestamp {}, sort key {}",
                path.display(),
                timestamp,
                sort_key
            );
            Some(ImageFile {
                path: path.clone(),
                timestamp,
                sort_key,
                target_ext: target_extension(path, opts.ext_remap),
            })
        })
        .collect()
}
