//! Photobatch: batch image conversion with a bounded, cancellable worker pipeline.

pub mod collection;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod settings;
pub mod stages;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use error::{ConvertError, StageError};
pub use process::Process;
pub use settings::{ConversionSettings, Settings};
pub use types::*;

use crossbeam_channel::Sender;
use log::debug;

use crate::collection::CollectionFileSystem;

/// Result alias used by public photobatch API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: start converting `settings.source_dir` with the default stages
/// (resize to the small and thumbnail profiles, then archive the original).
///
/// Progress for process `id` arrives on `out`, ending with one `end` message. Call
/// [`Process::wait`] for the overall result or [`Process::kill`] to stop early.
///
/// ```ignore
/// let (tx, rx) = crossbeam_channel::unbounded();
/// let settings = photobatch::Settings::new("trip", "/photos/inbox");
/// let (process, cfs) = photobatch::convert_dir("run-1", &settings, tx)?;
/// for msg in rx.iter() {
///     println!("{}: {}", msg.kind, msg.body.trim_end());
///     if msg.is_end() { break; }
/// }
/// process.wait()?;
/// ```
pub fn convert_dir(
    id: &str,
    settings: &Settings,
    out: Sender<ProgressMessage>,
) -> Result<(Process, CollectionFileSystem)> {
    let config_str = format!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        settings
    );
    debug!("{}", config_str);
    Process::start(id, settings, out, stages::default_stages)
}
