//! Load `photobatch.toml` (CLI only). Lib callers build [`Settings`] themselves.
//!
//! ```toml
//! [deploy]
//! publish_dir = "/srv/photos"
//! archive_subfolder_name = "pwg_high"
//! verbose = true
//!
//! [convert]
//! width = 1600
//! height = 1200
//! workers = 4
//! move_original = true
//! timeout_ms = 30000
//! tool = ["magick", "convert"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::settings::Settings;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsToml {
    #[serde(default)]
    deploy: DeploySection,
    #[serde(default)]
    convert: ConvertSection,
}

#[derive(Debug, Default, Deserialize)]
struct DeploySection {
    publish_dir: Option<String>,
    archive_subfolder_name: Option<String>,
    verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ConvertSection {
    width: Option<u32>,
    height: Option<u32>,
    workers: Option<usize>,
    move_original: Option<bool>,
    timeout_ms: Option<u64>,
    tool: Option<Vec<String>>,
    extensions: Option<Vec<String>>,
    strict_metadata: Option<bool>,
}

/// Default settings file location for a source folder.
pub fn settings_toml_path(dir: &Path) -> PathBuf {
    dir.join(PackagePaths::get().config_filename())
}

pub fn parse_settings_toml(s: &str) -> Result<SettingsToml> {
    toml::from_str(s).context("parse settings file")
}

/// Load the settings file at `path`. None if missing or unreadable (a parse error is logged).
pub fn load_settings_toml(path: &Path) -> Option<SettingsToml> {
    let s = std::fs::read_to_string(path).ok()?;
    parse_settings_toml(&s)
        .map_err(|e| log::warn!("{}: {:#}", path.display(), e))
        .ok()
}

/// Overwrite settings field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $target:expr, $field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $target.$field = v;
        }
    };
}

/// Apply file config (only fields present in the file). Call before applying CLI flags.
/// Collection name and source are per run and never read from the file.
pub fn apply_file_to_settings(file: &SettingsToml, settings: &mut Settings) {
    let deploy = &file.deploy;
    if let Some(ref p) = deploy.publish_dir {
        settings.publish_dir = PathBuf::from(p);
    }
    apply_file_opt!(deploy, settings, archive_subfolder_name);
    apply_file_opt!(deploy, settings, verbose);

    let convert = &file.convert;
    apply_file_opt!(convert, settings.conversion, width);
    apply_file_opt!(convert, settings.conversion, height);
    apply_file_opt!(convert, settings.conversion, workers);
    apply_file_opt!(convert, settings.conversion, move_original);
    apply_file_opt!(convert, settings, timeout_ms);
    apply_file_opt!(convert, settings, extensions);
    apply_file_opt!(convert, settings, strict_metadata);
    if let Some(ref tool) = convert.tool
        && !tool.is_empty()
    {
        settings.tool_command = tool.clone();
    }
}
