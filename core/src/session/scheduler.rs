//! Rate-paced tick loop and task invocation

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::pool::{ExecutorPool, SessionCounters};

use super::aggregator::ResultBatch;

/// Why the tick loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickExit {
    /// The session deadline passed
    Deadline,
    /// The cancellation token was raised
    Cancelled,
}

/// Everything an invocation task needs, shared by all tasks of a session
pub(crate) struct SessionContext {
    pub session_id: String,
    pub pool: ExecutorPool,
    pub batch: Arc<ResultBatch>,
    pub counters: SessionCounters,
    pub cancel: CancellationToken,
    pub tracker: TaskTracker,
    pub failure: OnceLock<String>,
    pub invocation_timeout: Option<Duration>,
}

impl SessionContext {
    /// First failure recorded for this session, if any
    pub fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }
}

/// Tick until the deadline passes or the session is cancelled
///
/// The first tick fires immediately. Each tick checks the deadline, then
/// the cancellation token, then dispatches one invocation per slot without
/// waiting for earlier ticks to finish.
pub(crate) async fn run_ticks(
    ctx: &Arc<SessionContext>,
    tick_interval: Duration,
    deadline: Instant,
) -> TickExit {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                tracing::debug!(session_id = %ctx.session_id, tick, "Cancelled between ticks");
                return TickExit::Cancelled;
            }

            _ = interval.tick() => {}
        }

        if Instant::now() >= deadline {
            tracing::debug!(session_id = %ctx.session_id, ticks = tick, "Deadline reached");
            return TickExit::Deadline;
        }
        if ctx.cancel.is_cancelled() {
            return TickExit::Cancelled;
        }

        dispatch_tick(ctx, tick);
        tick += 1;
    }
}

fn dispatch_tick(ctx: &Arc<SessionContext>, tick: u64) {
    let slots = ctx.pool.len();
    ctx.counters.record_tick(slots);
    tracing::trace!(session_id = %ctx.session_id, tick, slots, "Dispatching tick");

    for index in 0..slots {
        ctx.tracker.spawn(invoke_slot(Arc::clone(ctx), index, tick));
    }
}

async fn invoke_slot(ctx: Arc<SessionContext>, index: usize, tick: u64) {
    let Some(slot) = ctx.pool.slot(index) else {
        return;
    };

    // The slot lock is released inside `invoke`; nothing below holds it.
    match slot.invoke(ctx.invocation_timeout).await {
        Ok(record) => {
            ctx.counters.record_success();
            ctx.batch.append(&ctx.session_id, record);
        }
        Err(e) => {
            ctx.counters.record_failure();
            tracing::warn!(
                session_id = %ctx.session_id,
                slot = index,
                tick,
                error = %e,
                "Invocation failed, cancelling session"
            );
            let _ = ctx.failure.set(e.to_string());
            ctx.cancel.cancel();
        }
    }
}
