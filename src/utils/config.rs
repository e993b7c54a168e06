//! Application configuration constants.
//! Defaults and tuning in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!("{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Settings file looked up in the source directory when `--config` is not given.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Settings defaults ----

/// Defaults used by [`Settings::new`](crate::settings::Settings::new).
pub struct SettingsDefaults;

impl SettingsDefaults {
    pub const PUBLISH_SUBDIR: &'static str = "Pictures";
    pub const ARCHIVE_SUBFOLDER: &'static str = "pwg_high";
    pub const WIDTH: u32 = 1024;
    pub const HEIGHT: u32 = 768;
    pub const WORKERS: usize = 1;
    pub const TIMEOUT_MS: u64 = 10_000;
    pub const TOOL: &'static str = "convert";
    pub const TOOL_VERSION_ARG: &'static str = "-version";
}

/// Extensions picked up by the scan (lowercase, with the leading dot).
pub const IMAGE_EXTENSIONS: &[&str] = &[".bmp", ".gif", ".jpeg", ".jpg", ".png"];

/// Camera raw extensions; derivatives of these are written as [`RAW_TARGET_EXTENSION`].
pub const RAW_EXTENSIONS: &[&str] = &[".arw", ".cr2", ".dng", ".nef", ".orf", ".raf", ".rw2"];

pub const RAW_TARGET_EXTENSION: &str = ".jpg";

// ---- Resize profiles ----

/// Names, prefixes and subfolders of the two built-in resize profiles.
pub struct ProfileConsts;

impl ProfileConsts {
    pub const SMALL_NAME: &'static str = "small";
    pub const THUMBNAIL_NAME: &'static str = "thumbnail";
    pub const THUMBNAIL_PREFIX: &'static str = "TN-";
    pub const THUMBNAIL_SUBFOLDER: &'static str = "thumbnail";
    pub const THUMBNAIL_GEOMETRY: &'static str = "128x128";
}

// ---- Worker threads ----

/// Bounds for the per-stage worker count.
pub struct WorkerLimits;

impl WorkerLimits {
    pub const MIN: usize = 1;
    /// File descriptors one worker may hold at once (tool pipes, source and destination files).
    pub const FDS_PER_WORKER: usize = 8;
}

// ---- External tool ----

/// Polling interval while waiting for the external tool to exit.
pub const TOOL_POLL_INTERVAL_MS: u64 = 20;
