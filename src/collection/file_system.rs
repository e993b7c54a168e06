//! Folder-level context for one run: the scanned files and the derived output folders.

use anyhow::Result;
use log::info;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::ImageFile;
use crate::engine::tools::check_source_and_canonicalize;
use crate::error::ConvertError;
use crate::settings::{ConversionSettings, Settings, normalize_extension};

use super::capture_date::CaptureDateSource;
use super::scan::{ScanOptions, collect_image_files, list_candidates};

/// Resolved once per run from [`Settings`] and a scan of the source. Read-only afterwards.
#[derive(Clone, Debug)]
pub struct CollectionFileSystem {
    pub coll_name: String,
    pub source_dir: PathBuf,
    /// Sorted, deduplicated recognized extensions.
    pub extensions: Vec<String>,
    pub ext_remap: BTreeMap<String, String>,
    /// Files in scan (path) order.
    pub image_files: Vec<ImageFile>,
    /// `publish_dir/{first}_{last}_{coll_name}`; None when no file was found.
    pub collection_publish_folder: Option<PathBuf>,
    /// `collection_publish_folder/archive_subfolder_name`; None when no file was found.
    pub collection_archive_folder: Option<PathBuf>,
    pub timeout_ms: u64,
    /// Configured workers per stage, at least 1. Capped against the open file limit once the
    /// stage count is known.
    pub workers: usize,
    pub conversion: ConversionSettings,
    pub tool_command: Vec<String>,
}

impl CollectionFileSystem {
    /// Validate the collection name, scan the source and derive the output folders.
    /// An empty scan is not an error here; the caller decides.
    pub fn resolve(settings: &Settings, dates: &dyn CaptureDateSource) -> Result<Self> {
        if settings.coll_name.trim().is_empty() {
            return Err(ConvertError::EmptyCollectionName.into());
        }
        let source_dir = check_source_and_canonicalize(&settings.source_dir)?;

        let extensions = settings.sorted_extensions();
        let ext_remap: BTreeMap<String, String> = settings
            .ext_remap
            .iter()
            .map(|(from, to)| (normalize_extension(from), normalize_extension(to)))
            .collect();

        let candidates = list_candidates(&source_dir, &extensions)?;
        let scan_opts = ScanOptions {
            extensions: &extensions,
            ext_remap: &ext_remap,
            strict_metadata: settings.strict_metadata,
        };
        let image_files = collect_image_files(&candidates, &scan_opts, dates);
        info!(
            "Found {} image files in {}",
            image_files.len(),
            source_dir.display()
        );

        let (collection_publish_folder, collection_archive_folder) =
            match (image_files.first(), image_files.last()) {
                (Some(first), Some(last)) => {
                    let publish = settings.publish_dir.join(collection_folder_name(
                        first,
                        last,
                        &settings.coll_name,
                    ));
                    let archive = publish.join(&settings.archive_subfolder_name);
                    (Some(publish), Some(archive))
                }
                _ => (None, None),
            };

        let workers = settings.conversion.workers.max(1);

        Ok(Self {
            coll_name: settings.coll_name.clone(),
            source_dir,
            extensions,
            ext_remap,
            image_files,
            collection_publish_folder,
            collection_archive_folder,
            timeout_ms: settings.timeout_ms,
            workers,
            conversion: settings.conversion.clone(),
            tool_command: settings.tool_command.clone(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.image_files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.image_files.len()
    }

    /// Publish folder, or [`ConvertError::EmptyCollection`] when nothing was found.
    pub fn publish_folder(&self) -> Result<&Path> {
        self.collection_publish_folder
            .as_deref()
            .ok_or_else(|| ConvertError::EmptyCollection(self.source_dir.clone()).into())
    }

    /// Archive folder, or [`ConvertError::EmptyCollection`] when nothing was found.
    pub fn archive_folder(&self) -> Result<&Path> {
        self.collection_archive_folder
            .as_deref()
            .ok_or_else(|| ConvertError::EmptyCollection(self.source_dir.clone()).into())
    }
}

/// `{first.sort_key}_{last.sort_key}_{coll_name}`; first and last in scan order.
pub fn collection_folder_name(first: &ImageFile, last: &ImageFile, coll_name: &str) -> String {
    [first.sort_key.as_str(), last.sort_key.as_str(), coll_name].join("_")
}
