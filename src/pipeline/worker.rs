use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, select};
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::stages::Stage;
use crate::{ImageFile, ProgressMessage};

use super::context::{ItemOutcome, WorkerContext, is_killed};
use super::timeout::execute_with_timeout;

/// Where a worker hands an item after its stage succeeded.
#[derive(Clone)]
enum Downstream {
    Stage(Sender<Arc<ImageFile>>),
    Terminal,
}

/// Single stage worker: take items from `in_rx`, run the stage under the timeout, report, then
/// forward to the next stage (or the drainer). A failed item goes to the drainer as dropped.
/// Exits when the input closes or on the kill broadcast.
fn stage_worker_loop(
    stage: Arc<dyn Stage>,
    in_rx: Receiver<Arc<ImageFile>>,
    downstream: Downstream,
    ctx: WorkerContext,
) {
    loop {
        if is_killed(&ctx.kill_rx) {
            break;
        }
        let img = select! {
            recv(ctx.kill_rx) -> _ => break,
            recv(in_rx) -> msg => match msg {
                Ok(img) => img,
                Err(_) => break,
            },
        };
        if is_killed(&ctx.kill_rx) {
            break;
        }

        let name = img.display_name();
        let forwarded = match execute_with_timeout(&stage, ctx.timeout, &img) {
            Err(err) => {
                let _ = ctx.out.send(ProgressMessage::stderr(
                    &ctx.id,
                    format!(
                        "{} for image {} failed to process due to error {}\n",
                        stage.name(),
                        name,
                        err
                    ),
                ));
                forward(&ctx.result_tx, &ctx, ItemOutcome::Dropped(img))
            }
            Ok(()) => {
                let _ = ctx.out.send(ProgressMessage::stdout(
                    &ctx.id,
                    format!("{} for image {} correctly executed\n", stage.name(), name),
                ));
                match &downstream {
                    Downstream::Stage(tx) => forward(tx, &ctx, img),
                    Downstream::Terminal => forward(&ctx.result_tx, &ctx, ItemOutcome::Done(img)),
                }
            }
        };
        if !forwarded {
            break;
        }
    }
    debug!("{} worker quitting", stage.name());
}

/// Send unless killed first. False when the item could not be handed on.
fn forward<T>(tx: &Sender<T>, ctx: &WorkerContext, value: T) -> bool {
    select! {
        send(tx, value) -> res => res.is_ok(),
        recv(ctx.kill_rx) -> _ => false,
    }
}

/// Spawn `workers` threads for `stage` pulling from `in_rx`. `next_tx` is the next stage's input,
/// None for the last stage. Callers drop their own copies of the channels afterwards so closing
/// propagates down the chain.
pub fn spawn_stage_workers(
    stage: &Arc<dyn Stage>,
    in_rx: &Receiver<Arc<ImageFile>>,
    next_tx: Option<&Sender<Arc<ImageFile>>>,
    ctx: &WorkerContext,
    workers: usize,
) -> Result<Vec<JoinHandle<()>>> {
    let downstream = match next_tx {
        Some(tx) => Downstream::Stage(tx.clone()),
        None => Downstream::Terminal,
    };
    (0..workers)
        .map(|j| {
            let stage = Arc::clone(stage);
            let in_rx = in_rx.clone();
            let downstream = downstream.clone();
            let ctx = ctx.clone();
            thread::Builder::new()
                .name(format!("{}-worker-{}", stage.name(), j))
                .spawn(move || stage_worker_loop(stage, in_rx, downstream, ctx))
                .context("spawn stage worker")
        })
        .collect()
}
