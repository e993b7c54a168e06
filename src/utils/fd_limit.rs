//! Worker cap from the open file limit (Unix).
//!
//! Each in-flight item holds a few descriptors (source, destination, tool pipes), and every
//! stage runs its own pool, so the budget is split across `workers * stages`.

use crate::utils::config::WorkerLimits;

/// Share of the soft limit the pools may use.
const FD_BUDGET_PERCENT: u64 = 80;

/// Soft `RLIMIT_NOFILE`. `None` when unlimited or the call fails.
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    u64::try_from(limit.rlim_cur).ok()
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Workers per stage that fit the descriptor budget for `stages` pools.
pub fn max_workers_by_fd_limit(stages: usize) -> Option<usize> {
    let budget = max_open_fds()?.saturating_mul(FD_BUDGET_PERCENT) / 100;
    let per_worker = (WorkerLimits::FDS_PER_WORKER * stages.max(1)) as u64;
    let fit = usize::try_from(budget / per_worker).unwrap_or(usize::MAX);
    Some(fit.max(WorkerLimits::MIN))
}

/// Clamp the configured per-stage worker count to `[1, budget for stages pools]`.
pub fn cap_workers(configured: usize, stages: usize) -> usize {
    let configured = configured.max(WorkerLimits::MIN);
    match max_workers_by_fd_limit(stages) {
        Some(cap) if cap < configured => {
            log::debug!(
                "Capping workers {} -> {} for {} stages (open file limit)",
                configured,
                cap,
                stages
            );
            cap
        }
        _ => configured,
    }
}
