//! Runtime handle for one conversion run.
//!
//! [`Process::start`] resolves the collection, validates it, wires the pipeline and starts a
//! completion watcher thread. The watcher is the only place the terminal `end` message is sent:
//! after the drainer reports (all items out, or killed) and every feeder and worker thread has
//! been joined, so `end` is always the last message for the id.
//!
//! [`Process::wait`] blocks until the watcher has sent `end`; [`Process::kill`] fires the kill
//! broadcast once and then blocks the same way. Both may be called from any thread, any number
//! of times. Dropping every handle does not stop the run.

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use crate::collection::{CaptureDateSource, CollectionFileSystem, ExifDateSource};
use crate::error::ConvertError;
use crate::pipeline::{PipelineHandles, PipelineTuning, run_pipeline};
use crate::settings::Settings;
use crate::stages::StageList;
use crate::utils::cap_workers;
use crate::{ProcessState, ProgressMessage, RunOutcome};

struct Shared {
    id: String,
    out: Sender<ProgressMessage>,
    /// Taken (and dropped) by the first `kill`.
    kill_tx: Mutex<Option<Sender<()>>>,
    state: AtomicU8,
    outcome: OnceLock<RunOutcome>,
    /// Disconnects when the process has ended.
    ended_rx: Receiver<()>,
}

impl Shared {
    fn set_state(&self, state: ProcessState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Cheap to clone; all clones control the same run.
#[derive(Clone)]
pub struct Process {
    shared: Arc<Shared>,
}

impl Process {
    /// Start a run with capture dates read from EXIF.
    ///
    /// `out` is owned by the caller and must be drained: every stage invocation sends one
    /// `stdout` or `stderr` message, and one `end` message closes the run.
    pub fn start<F>(
        id: &str,
        settings: &Settings,
        out: Sender<ProgressMessage>,
        stage_factory: F,
    ) -> Result<(Process, CollectionFileSystem)>
    where
        F: FnOnce(&CollectionFileSystem) -> Result<StageList>,
    {
        Self::start_with(id, settings, out, &ExifDateSource, stage_factory)
    }

    /// [`Process::start`] with an explicit capture-date source.
    ///
    /// Setup errors (empty collection name, missing source, no images, no stages, a stage
    /// preflight such as the image tool check, a failed thread spawn) are returned here; the
    /// `end` message carrying the error is sent first.
    pub fn start_with<F>(
        id: &str,
        settings: &Settings,
        out: Sender<ProgressMessage>,
        dates: &dyn CaptureDateSource,
        stage_factory: F,
    ) -> Result<(Process, CollectionFileSystem)>
    where
        F: FnOnce(&CollectionFileSystem) -> Result<StageList>,
    {
        let started = prepare(settings, dates, stage_factory).and_then(|(mut cfs, stages)| {
            cfs.workers = cap_workers(cfs.workers, stages.len());
            let process = Self::spawn(id, &cfs, &stages, out.clone())?;
            Ok((process, cfs))
        });
        started.inspect_err(|e| {
            warn!("Process {} could not start: {:#}", id, e);
            let _ = out.send(ProgressMessage::end(id, Some(format!("{:#}", e))));
        })
    }

    fn spawn(
        id: &str,
        cfs: &CollectionFileSystem,
        stages: &StageList,
        out: Sender<ProgressMessage>,
    ) -> Result<Process> {
        let (ended_tx, ended_rx) = bounded::<()>(0);
        let shared = Arc::new(Shared {
            id: id.to_string(),
            out: out.clone(),
            kill_tx: Mutex::new(None),
            state: AtomicU8::new(ProcessState::Created as u8),
            outcome: OnceLock::new(),
            ended_rx,
        });

        let tuning = PipelineTuning {
            workers: cfs.workers,
            timeout: Duration::from_millis(cfs.timeout_ms),
        };
        let items = cfs.image_files.iter().cloned().map(Arc::new).collect();
        if let Ok(folder) = cfs.publish_folder() {
            info!(
                "Processing {} images into {}",
                cfs.len(),
                folder.display()
            );
        }
        let PipelineHandles {
            kill_tx,
            done_rx,
            feeder_handle,
            drainer_handle,
            worker_handles,
        } = run_pipeline(id, items, stages, &tuning, out)?;
        *shared.kill_tx.lock().unwrap() = Some(kill_tx);
        shared.set_state(ProcessState::Running);

        let watcher_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("watcher-{id}"))
            .spawn(move || {
                let shared = watcher_shared;
                let outcome = done_rx.recv().unwrap_or(RunOutcome::Killed);
                let fed = feeder_handle.join().unwrap_or(0);
                let _ = drainer_handle.join();
                for h in worker_handles {
                    let _: std::thread::Result<()> = h.join();
                }
                debug!("Process {}: {:?}, {} items fed", shared.id, outcome, fed);

                let _ = shared.outcome.set(outcome);
                shared.set_state(match outcome {
                    RunOutcome::Completed => ProcessState::Completed,
                    RunOutcome::Killed => ProcessState::Killed,
                });
                let error = match outcome {
                    RunOutcome::Completed => None,
                    RunOutcome::Killed => Some(ConvertError::Killed.to_string()),
                };
                let _ = shared.out.send(ProgressMessage::end(&shared.id, error));
                shared.set_state(ProcessState::Ended);
                drop(ended_tx);
            })
            .map_err(|e| {
                // Without a watcher nobody would ever end the run; stop it.
                shared.kill_tx.lock().unwrap().take();
                anyhow::Error::new(e).context("spawn completion watcher")
            })?;

        Ok(Process { shared })
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Block until the run has ended. Ok when every item went through (per-item failures
    /// included); [`ConvertError::Killed`] when it was killed.
    pub fn wait(&self) -> Result<()> {
        // Never sent on: returns when the watcher drops its sender.
        let _ = self.shared.ended_rx.recv();
        match self.shared.outcome.get() {
            Some(RunOutcome::Completed) => Ok(()),
            _ => Err(ConvertError::Killed.into()),
        }
    }

    /// Fire the kill broadcast (first call only) and block until the run has ended.
    /// In-flight items finish or time out; nothing new is picked up.
    pub fn kill(&self) {
        let kill_tx = self.shared.kill_tx.lock().unwrap().take();
        if let Some(kill_tx) = kill_tx {
            info!("Killing process {}", self.shared.id);
            drop(kill_tx);
        }
        let _ = self.shared.ended_rx.recv();
    }
}

/// Resolve the collection, reject empty ones, build the stages and run their preflights.
fn prepare<F>(
    settings: &Settings,
    dates: &dyn CaptureDateSource,
    stage_factory: F,
) -> Result<(CollectionFileSystem, StageList)>
where
    F: FnOnce(&CollectionFileSystem) -> Result<StageList>,
{
    let cfs = CollectionFileSystem::resolve(settings, dates)?;
    if cfs.is_empty() {
        return Err(ConvertError::EmptyCollection(cfs.source_dir.clone()).into());
    }
    let stages = stage_factory(&cfs)?;
    if stages.is_empty() {
        bail!("pipeline needs at least one stage");
    }
    for stage in &stages {
        stage.preflight()?;
    }
    Ok((cfs, stages))
}
