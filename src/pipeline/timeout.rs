//! Per-item timeout and fault isolation for one stage invocation.

use crossbeam_channel::{after, bounded, select};
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use crate::ImageFile;
use crate::error::StageError;
use crate::stages::Stage;

thread_local! {
    /// Set on stage task threads; the panic hook only records traces there.
    static IN_STAGE_TASK: Cell<bool> = const { Cell::new(false) };
    /// Backtrace captured at the panic site, taken by the task after unwinding.
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook in front of the current one: on stage task threads it captures the backtrace
/// while the panicking frames are still on the stack; everywhere else it defers to the old hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_STAGE_TASK.with(Cell::get) {
                let trace = Backtrace::force_capture().to_string();
                PANIC_TRACE.with(|t| *t.borrow_mut() = Some(trace));
                log::debug!("stage task {}", info);
            } else {
                previous(info);
            }
        }));
    });
}

/// Run `stage` on `img` on its own thread and race it against `timeout`.
///
/// On timeout the thread is abandoned, not stopped; a stage that must not outlive its budget
/// enforces the deadline itself (see `ExternalTool::with_deadline`). A panic inside the stage
/// comes back as [`StageError::Panicked`] or [`StageError::Critical`] (see [`panic_to_error`]).
pub fn execute_with_timeout(
    stage: &Arc<dyn Stage>,
    timeout: Duration,
    img: &Arc<ImageFile>,
) -> Result<(), StageError> {
    // Capacity 1: an abandoned thread can still deliver its result and exit.
    let (tx, rx) = bounded::<Result<(), StageError>>(1);
    let task_stage = Arc::clone(stage);
    let task_img = Arc::clone(img);
    install_panic_hook();
    let spawned = thread::Builder::new()
        .name(format!("{}-task", stage.name()))
        .spawn(move || {
            IN_STAGE_TASK.with(|f| f.set(true));
            let result = match panic::catch_unwind(AssertUnwindSafe(|| task_stage.run(&task_img)))
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(StageError::from(e)),
                Err(payload) => {
                    let trace = PANIC_TRACE.with(|t| t.borrow_mut().take());
                    Err(panic_to_error(payload, trace))
                }
            };
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        return Err(StageError::Failed(format!("could not start stage task: {e}")));
    }

    select! {
        recv(rx) -> res => res.unwrap_or_else(|_| {
            Err(StageError::Critical {
                trace: "stage task ended without a result".to_string(),
            })
        }),
        recv(after(timeout)) -> _ => Err(StageError::TimedOut {
            path: img.path.clone(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Classify a panic payload.
///
/// Error values raised with `panic_any` (`anyhow::Error`, `StageError`, `io::Error`, boxed
/// `dyn Error`) keep their text as [`StageError::Panicked`]. Everything else, including the
/// string messages of runtime faults (out-of-bounds index, `unwrap` on `None`, `panic!`), is
/// [`StageError::Critical`] carrying the message and `trace`, the panic-site backtrace
/// (captured here when None).
pub fn panic_to_error(payload: Box<dyn Any + Send>, trace: Option<String>) -> StageError {
    let payload = match payload.downcast::<anyhow::Error>() {
        Ok(e) => return StageError::Panicked(format!("{:#}", e)),
        Err(p) => p,
    };
    let payload = match payload.downcast::<StageError>() {
        Ok(e) => return *e,
        Err(p) => p,
    };
    let payload = match payload.downcast::<std::io::Error>() {
        Ok(e) => return StageError::Panicked(e.to_string()),
        Err(p) => p,
    };
    let payload = match payload.downcast::<Box<dyn std::error::Error + Send + Sync>>() {
        Ok(e) => return StageError::Panicked(e.to_string()),
        Err(p) => p,
    };

    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else {
        "stage panicked with a non-error value".to_string()
    };
    let trace = trace.unwrap_or_else(|| Backtrace::force_capture().to_string());
    StageError::Critical {
        trace: format!("{message}\n{trace}"),
    }
}
