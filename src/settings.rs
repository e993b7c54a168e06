//! Settings value object consumed by the engine.
//!
//! Built from defaults, optionally overlaid with a `photobatch.toml` file
//! ([`crate::utils::settings_toml`]) and CLI flags. Read-only once a run starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::utils::config::{
    IMAGE_EXTENSIONS, RAW_EXTENSIONS, RAW_TARGET_EXTENSION, SettingsDefaults,
};

/// Resize and archive options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub width: u32,
    pub height: u32,
    /// Move the original into the archive folder instead of copying it.
    pub move_original: bool,
    /// Workers per stage.
    pub workers: usize,
}

impl ConversionSettings {
    /// Pixel area used for the `-resize <area>@` geometry.
    pub fn area_in_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            width: SettingsDefaults::WIDTH,
            height: SettingsDefaults::HEIGHT,
            move_original: false,
            workers: SettingsDefaults::WORKERS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub coll_name: String,
    /// Folder (or single file) to convert.
    pub source_dir: PathBuf,
    /// Root under which the collection folder is created.
    pub publish_dir: PathBuf,
    /// Name of the archive subfolder inside the collection folder.
    pub archive_subfolder_name: String,
    /// Budget for one stage invocation on one file.
    pub timeout_ms: u64,
    pub conversion: ConversionSettings,
    /// Image tool argv prefix, e.g. `["convert"]` or `["magick", "convert"]`.
    pub tool_command: Vec<String>,
    /// Recognized extensions, lowercase with the leading dot.
    pub extensions: Vec<String>,
    /// Source extension -> output extension for derivatives.
    pub ext_remap: BTreeMap<String, String>,
    /// Exclude files whose capture date can not be read instead of dating them "now".
    pub strict_metadata: bool,
    pub verbose: bool,
}

impl Settings {
    /// Defaults for everything but the two mandatory values.
    pub fn new(coll_name: &str, source_dir: impl AsRef<Path>) -> Self {
        let publish_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SettingsDefaults::PUBLISH_SUBDIR);
        let mut extensions: Vec<String> = IMAGE_EXTENSIONS
            .iter()
            .chain(RAW_EXTENSIONS)
            .map(|e| e.to_string())
            .collect();
        extensions.sort();
        let ext_remap = RAW_EXTENSIONS
            .iter()
            .map(|e| (e.to_string(), RAW_TARGET_EXTENSION.to_string()))
            .collect();
        Self {
            coll_name: coll_name.to_string(),
            source_dir: source_dir.as_ref().to_path_buf(),
            publish_dir,
            archive_subfolder_name: SettingsDefaults::ARCHIVE_SUBFOLDER.to_string(),
            timeout_ms: SettingsDefaults::TIMEOUT_MS,
            conversion: ConversionSettings::default(),
            tool_command: vec![SettingsDefaults::TOOL.to_string()],
            extensions,
            ext_remap,
            strict_metadata: false,
            verbose: false,
        }
    }

    /// Recognized extensions normalized for lookup: lowercase, leading dot, sorted, deduplicated.
    pub fn sorted_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self
            .extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| e.len() > 1)
            .collect();
        exts.sort();
        exts.dedup();
        exts
    }
}

/// `JPG` / `jpg` / `.jpg` -> `.jpg`.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}
