//! Archive stage: move or copy the original into the collection's archive folder.

use anyhow::{Context, Result};
use filetime::FileTime;
use log::debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::ImageFile;
use crate::engine::tools::ensure_dir;

use super::Stage;

pub struct ArchiveStage {
    archive_folder: PathBuf,
    move_original: bool,
}

impl ArchiveStage {
    pub fn new(archive_folder: PathBuf, move_original: bool) -> Self {
        Self {
            archive_folder,
            move_original,
        }
    }

    pub fn archive_path(&self, img: &ImageFile) -> PathBuf {
        self.archive_folder.join(img.normalized_name(false))
    }
}

impl Stage for ArchiveStage {
    fn name(&self) -> &str {
        "archive"
    }

    fn run(&self, img: &ImageFile) -> Result<()> {
        ensure_dir(&self.archive_folder)?;
        let dest = self.archive_path(img);
        if self.move_original {
            debug!("Archiving original file to: {}", dest.display());
            move_file(&img.path, &dest)
        } else {
            debug!("Copying original file to: {}", dest.display());
            copy_preserving_mtime(&img.path, &dest)
        }
    }
}

/// Rename when possible; across filesystems fall back to copy + remove.
pub fn move_file(src: &Path, dest: &Path) -> Result<()> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            copy_preserving_mtime(src, dest)?;
            std::fs::remove_file(src).with_context(|| format!("remove {}", src.display()))
        }
        Err(e) => Err(e)
            .with_context(|| format!("move {} -> {}", src.display(), dest.display())),
    }
}

/// Copy `src` to `dest` and give the copy the original's modification time.
pub fn copy_preserving_mtime(src: &Path, dest: &Path) -> Result<()> {
    std::fs::copy(src, dest)
        .with_context(|| format!("copy {} -> {}", src.display(), dest.display()))?;
    let meta = std::fs::metadata(src).with_context(|| format!("stat {}", src.display()))?;
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_times(dest, mtime, mtime)
        .with_context(|| format!("set times on {}", dest.display()))?;
    Ok(())
}
