use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender, select};
use log::{debug, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::stages::StageList;
use crate::{ImageFile, ProgressMessage, RunOutcome};

use super::context::{
    ItemOutcome, PipelineHandles, WorkerContext, create_pipeline_channels, is_killed,
};
use super::worker::spawn_stage_workers;

/// Tuning for one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineTuning {
    /// Workers per stage.
    pub workers: usize,
    /// Budget for one stage invocation on one item.
    pub timeout: Duration,
}

/// Wire `stages` into a chain of worker pools and start feeding `items`.
///
/// Feed -> [workers x stage 0] -> ... -> [workers x stage N-1] -> drain.
/// Progress goes to `out`. The caller holds `kill_tx` and waits on `done_rx`.
pub fn run_pipeline(
    id: &str,
    items: Vec<Arc<ImageFile>>,
    stages: &StageList,
    tuning: &PipelineTuning,
    out: Sender<ProgressMessage>,
) -> Result<PipelineHandles> {
    if stages.is_empty() {
        bail!("pipeline needs at least one stage");
    }
    let workers = tuning.workers.max(1);
    let channels = create_pipeline_channels();
    let ctx = WorkerContext {
        id: id.to_string(),
        timeout: tuning.timeout,
        out,
        kill_rx: channels.kill_rx.clone(),
        result_tx: channels.result_tx.clone(),
    };

    let mut worker_handles = Vec::with_capacity(workers * stages.len());
    let mut input = channels.feed_rx;
    for (i, stage) in stages.iter().enumerate() {
        if i + 1 == stages.len() {
            worker_handles.extend(spawn_stage_workers(stage, &input, None, &ctx, workers)?);
        } else {
            let (next_tx, next_rx) = crossbeam_channel::bounded::<Arc<ImageFile>>(0);
            worker_handles.extend(spawn_stage_workers(
                stage,
                &input,
                Some(&next_tx),
                &ctx,
                workers,
            )?);
            input = next_rx;
        }
    }
    // Workers hold the only remaining copies, so a closed feed cascades down the chain.
    drop(input);
    drop(ctx);
    drop(channels.result_tx);
    debug!(
        "Started {} workers per stage for {} stages",
        workers,
        stages.len()
    );

    let total = items.len();
    let feeder_handle = spawn_feeder(items, channels.feed_tx, channels.kill_rx.clone())?;
    let drainer_handle = spawn_drainer(
        total,
        channels.result_rx,
        channels.kill_rx,
        channels.done_tx,
    )?;

    Ok(PipelineHandles {
        kill_tx: channels.kill_tx,
        done_rx: channels.done_rx,
        feeder_handle,
        drainer_handle,
        worker_handles,
    })
}

/// Push every item into the first stage, one at a time. Returns how many were handed over.
fn spawn_feeder(
    items: Vec<Arc<ImageFile>>,
    feed_tx: Sender<Arc<ImageFile>>,
    kill_rx: Receiver<()>,
) -> Result<JoinHandle<usize>> {
    thread::Builder::new()
        .name("feeder".to_string())
        .spawn(move || {
            let mut sent = 0_usize;
            for img in items {
                if is_killed(&kill_rx) {
                    break;
                }
                debug!("Feeding image file {}", img.path.display());
                let delivered = select! {
                    send(feed_tx, img) -> res => res.is_ok(),
                    recv(kill_rx) -> _ => false,
                };
                if !delivered {
                    break;
                }
                sent += 1;
            }
            drop(feed_tx);
            sent
        })
        .context("spawn feeder")
}

/// Pull exactly `total` outcomes, then report [`RunOutcome::Completed`] on `done_tx`.
/// The kill broadcast ends the drain early with [`RunOutcome::Killed`].
fn spawn_drainer(
    total: usize,
    result_rx: Receiver<ItemOutcome>,
    kill_rx: Receiver<()>,
    done_tx: Sender<RunOutcome>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("drainer".to_string())
        .spawn(move || {
            let mut outcome = RunOutcome::Completed;
            let mut dropped = 0_usize;
            for _ in 0..total {
                select! {
                    recv(result_rx) -> res => match res {
                        Ok(ItemOutcome::Done(_)) => {}
                        Ok(ItemOutcome::Dropped(_)) => dropped += 1,
                        Err(_) => {
                            warn!("pipeline closed before every item was drained");
                            outcome = RunOutcome::Killed;
                            break;
                        }
                    },
                    recv(kill_rx) -> _ => {
                        outcome = RunOutcome::Killed;
                        break;
                    }
                }
            }
            debug!(
                "drainer: {:?} ({} items, {} dropped)",
                outcome, total, dropped
            );
            let _ = done_tx.send(outcome);
        })
        .context("spawn drainer")
}
