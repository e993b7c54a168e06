//! Console reporter: renders the progress message stream of one process.

use crossbeam_channel::Receiver;
use kdam::{Animation, Bar, BarExt};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};

use crate::settings::Settings;
use crate::{MessageKind, ProgressMessage};

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

/// Create a progress bar with the given configuration
pub fn create_progress_bar(config: ProgressBarConfig) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation
    )))
}

/// Update progress bar if available
/// Uses try_lock to avoid blocking if mutex is contended (non-blocking)
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Push the bar to its total (failed items never reach the later stages).
fn finish_bar(pb: &ProgressBar, remaining: usize) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.update(remaining);
        let _ = bar.refresh();
    }
}

/// How the reporter renders messages.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReporterOpts {
    /// One JSON line per message on stdout instead of log lines.
    pub json: bool,
    /// Show a progress bar (verbose mode).
    pub show_bar: bool,
}

impl ReporterOpts {
    /// Bar in verbose mode, unless the JSON stream owns stdout.
    pub fn for_settings(settings: &Settings, json: bool) -> Self {
        Self {
            json,
            show_bar: settings.verbose && !json,
        }
    }
}

/// Counts seen by [`report_progress`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Body of the `end` message; None when it was empty (success) or never arrived.
    pub end_error: Option<String>,
    pub ended: bool,
}

/// Render messages for `id` until its `end` message (or the channel closes).
/// `expected` is the number of stage invocations (files x stages), for the bar total.
pub fn report_progress(
    rx: &Receiver<ProgressMessage>,
    id: &str,
    expected: usize,
    opts: ReporterOpts,
) -> RunSummary {
    let bar = (opts.show_bar && !opts.json).then(|| {
        create_progress_bar(ProgressBarConfig::new(
            expected.max(1),
            "Converting",
            Animation::Classic,
        ))
    });
    let mut summary = RunSummary::default();
    let mut advanced = 0usize;

    for msg in rx.iter() {
        if msg.id != id {
            continue;
        }
        if opts.json {
            match msg.to_json() {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("could not encode message: {:#}", e),
            }
        }
        match msg.kind {
            MessageKind::Stdout => {
                summary.succeeded += 1;
                debug!("{}", msg.body.trim_end());
            }
            MessageKind::Stderr => {
                summary.failed += 1;
                if !opts.json {
                    warn!("{}", msg.body.trim_end());
                }
            }
            MessageKind::End => {
                summary.ended = true;
                if !msg.body.is_empty() {
                    summary.end_error = Some(msg.body.clone());
                }
                break;
            }
        }
        if let Some(bar) = &bar {
            update_progress_bar(bar, 1);
            advanced += 1;
        }
    }

    if let Some(bar) = &bar {
        finish_bar(bar, expected.saturating_sub(advanced));
        eprintln!();
    }
    match &summary.end_error {
        None if summary.ended => info!(
            "Conversion finished: {} steps succeeded, {} failed",
            summary.succeeded, summary.failed
        ),
        None => warn!("progress stream closed before the end message"),
        Some(e) => error!("Conversion ended: {}", e),
    }
    summary
}
