//! Pipeline channels and shared worker context.

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::{ImageFile, ProgressMessage, RunOutcome};

/// What leaves the pipeline for one item. Every fed item produces exactly one.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Passed every stage.
    Done(Arc<ImageFile>),
    /// A stage failed; later stages never saw it.
    Dropped(Arc<ImageFile>),
}

/// Shared by every worker of every stage.
#[derive(Clone)]
pub struct WorkerContext {
    /// Process id stamped on every progress message.
    pub id: String,
    pub timeout: Duration,
    pub out: Sender<ProgressMessage>,
    /// Never sent on; disconnects when the process is killed.
    pub kill_rx: Receiver<()>,
    pub result_tx: Sender<ItemOutcome>,
}

/// Channels for the feed -> stages -> drain chain. All rendezvous (capacity 0), so the feeder
/// only gets ahead of the workers by the items they are holding.
pub struct PipelineChannels {
    pub feed_tx: Sender<Arc<ImageFile>>,
    pub feed_rx: Receiver<Arc<ImageFile>>,
    pub result_tx: Sender<ItemOutcome>,
    pub result_rx: Receiver<ItemOutcome>,
    /// Dropping the only sender is the kill broadcast.
    pub kill_tx: Sender<()>,
    pub kill_rx: Receiver<()>,
    pub done_tx: Sender<RunOutcome>,
    pub done_rx: Receiver<RunOutcome>,
}

pub fn create_pipeline_channels() -> PipelineChannels {
    let (feed_tx, feed_rx) = bounded::<Arc<ImageFile>>(0);
    let (result_tx, result_rx) = bounded::<ItemOutcome>(0);
    let (kill_tx, kill_rx) = bounded::<()>(0);
    let (done_tx, done_rx) = bounded::<RunOutcome>(1);
    PipelineChannels {
        feed_tx,
        feed_rx,
        result_tx,
        result_rx,
        kill_tx,
        kill_rx,
        done_tx,
        done_rx,
    }
}

/// Handles returned by [`run_pipeline`](super::run_pipeline).
/// `done_rx` yields once, when the drainer has seen every item or the kill broadcast.
/// Dropping `kill_tx` kills the run.
pub struct PipelineHandles {
    pub kill_tx: Sender<()>,
    pub done_rx: Receiver<RunOutcome>,
    pub feeder_handle: JoinHandle<usize>,
    pub drainer_handle: JoinHandle<()>,
    pub worker_handles: Vec<JoinHandle<()>>,
}

/// True once the kill broadcast has fired. Checked before blocking so a killed worker
/// never takes new work even when input is also ready.
pub fn is_killed(kill_rx: &Receiver<()>) -> bool {
    matches!(kill_rx.try_recv(), Err(TryRecvError::Disconnected))
}
