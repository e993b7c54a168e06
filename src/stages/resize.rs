//! Resize stage: one derivative per profile through the external image tool.

use anyhow::{Result, bail};
use log::debug;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::ImageFile;
use crate::engine::tools::ensure_dir;
use crate::settings::ConversionSettings;
use crate::utils::config::ProfileConsts;

use super::Stage;
use super::tool::ExternalTool;

/// One derivative: tool flags, output name prefix and subfolder of the publish folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResizeProfile {
    pub name: String,
    pub args: Vec<String>,
    /// Relative to the publish folder; empty for the folder itself.
    pub subfolder: String,
    pub prefix: String,
}

impl ResizeProfile {
    /// Framed web-size image sized by pixel area.
    pub fn small(conv: &ConversionSettings) -> Self {
        let geometry = format!("{}@", conv.area_in_pixels());
        let args = [
            "-resize",
            geometry.as_str(),
            "-mattecolor",
            "gray4",
            "-frame",
            "4x4+2+2",
            "-font",
            "helvetica",
            "-fill",
            "black",
        ];
        Self {
            name: ProfileConsts::SMALL_NAME.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            subfolder: String::new(),
            prefix: String::new(),
        }
    }

    pub fn thumbnail() -> Self {
        let args = [
            "-resize",
            ProfileConsts::THUMBNAIL_GEOMETRY,
            "-mattecolor",
            "gray4",
            "-font",
            "helvetica",
        ];
        Self {
            name: ProfileConsts::THUMBNAIL_NAME.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            subfolder: ProfileConsts::THUMBNAIL_SUBFOLDER.to_string(),
            prefix: ProfileConsts::THUMBNAIL_PREFIX.to_string(),
        }
    }

    pub fn defaults(conv: &ConversionSettings) -> Vec<Self> {
        vec![Self::small(conv), Self::thumbnail()]
    }
}

pub struct ResizeStage {
    publish_folder: PathBuf,
    profiles: Vec<ResizeProfile>,
    tool: ExternalTool,
}

impl ResizeStage {
    pub fn new(publish_folder: PathBuf, profiles: Vec<ResizeProfile>, tool: ExternalTool) -> Self {
        Self {
            publish_folder,
            profiles,
            tool,
        }
    }

    /// Destination folder for `profile`.
    pub fn profile_folder(&self, profile: &ResizeProfile) -> PathBuf {
        if profile.subfolder.is_empty() {
            self.publish_folder.clone()
        } else {
            self.publish_folder.join(&profile.subfolder)
        }
    }

    /// Destination path of `img` for `profile`.
    pub fn output_path(&self, profile: &ResizeProfile, img: &ImageFile) -> PathBuf {
        self.profile_folder(profile)
            .join(format!("{}{}", profile.prefix, img.normalized_name(true)))
    }
}

impl Stage for ResizeStage {
    fn name(&self) -> &str {
        "resize"
    }

    /// Every profile in order; the first failure aborts the rest.
    fn run(&self, img: &ImageFile) -> Result<()> {
        debug!("Resizing img: {}", img.display_name());
        for profile in &self.profiles {
            if profile.args.is_empty() {
                bail!("command arguments must be specified (profile {})", profile.name);
            }
            ensure_dir(&self.profile_folder(profile))?;

            let mut args: Vec<OsString> = profile.args.iter().map(OsString::from).collect();
            args.push(img.path.clone().into_os_string());
            args.push(self.output_path(profile, img).into_os_string());
            self.tool.run(&args)?;
        }
        Ok(())
    }

    fn preflight(&self) -> Result<()> {
        self.tool.version_check()?;
        Ok(())
    }
}
