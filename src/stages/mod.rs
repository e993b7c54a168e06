//! Pipeline stages: the operations every image passes through, in order.

pub mod archive;
pub mod resize;
pub mod tool;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::ImageFile;
use crate::collection::CollectionFileSystem;

pub use archive::{ArchiveStage, copy_preserving_mtime, move_file};
pub use resize::{ResizeProfile, ResizeStage};
pub use tool::ExternalTool;

/// One named operation on an image. Stage *i* finishes for an item before stage *i+1* starts on it.
pub trait Stage: Send + Sync {
    /// Name used in progress messages and logs.
    fn name(&self) -> &str;

    /// Do the work for one file. Runs on its own thread under the per-item timeout.
    fn run(&self, img: &ImageFile) -> Result<()>;

    /// Checked once before any worker starts (e.g. that an external tool runs).
    fn preflight(&self) -> Result<()> {
        Ok(())
    }
}

/// Ordered stages shared by all workers.
pub type StageList = Vec<Arc<dyn Stage>>;

/// Resize (small + thumbnail profiles) then archive.
pub fn default_stages(cfs: &CollectionFileSystem) -> Result<StageList> {
    let tool = ExternalTool::new(cfs.tool_command.clone())
        .with_deadline(Duration::from_millis(cfs.timeout_ms));
    let resize = ResizeStage::new(
        cfs.publish_folder()?.to_path_buf(),
        ResizeProfile::defaults(&cfs.conversion),
        tool,
    );
    let archive = ArchiveStage::new(
        cfs.archive_folder()?.to_path_buf(),
        cfs.conversion.move_original,
    );
    Ok(vec![Arc::new(resize), Arc::new(archive)])
}
