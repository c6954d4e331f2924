//! Session orchestration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::command::StartCommand;
use crate::config::{NodeConfig, SessionConfig};
use crate::error::{NodeError, NodeResult};
use crate::pool::{PoolBuilder, SessionCounters, SessionStats};
use crate::status::NodeHealth;
use crate::traits::ScriptFactory;

use super::aggregator::ResultBatch;
use super::scheduler::{run_ticks, SessionContext, TickExit};
use super::state::{ActiveSession, SessionFailure, SessionPhase};

/// Result of asking the manager to start a session
#[derive(Debug)]
pub enum StartOutcome {
    /// The session was started
    Accepted(SessionHandle),
    /// Another session already occupies the node
    Rejected {
        /// Session that is running or draining
        active_session: String,
    },
}

/// Result of asking the manager to stop the active session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session's cancellation signal was raised
    Cancelling(String),
    /// No session was active
    NotActive,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Ran until its deadline with no failures
    Completed,
    /// Cancelled by a stop command or node shutdown
    Stopped,
    /// An invocation failed and cancelled the session
    Failed(String),
    /// The session never started ticking
    Aborted(String),
}

impl SessionOutcome {
    /// Whether the session ended because something went wrong
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionOutcome::Failed(_) | SessionOutcome::Aborted(_))
    }

    fn error_message(&self) -> Option<&str> {
        match self {
            SessionOutcome::Failed(msg) | SessionOutcome::Aborted(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Session identifier
    pub session_id: String,
    /// How it ended
    pub outcome: SessionOutcome,
    /// Counters at the end of draining
    pub stats: SessionStats,
}

/// Handle to a session running in the background
#[derive(Debug)]
pub struct SessionHandle {
    session_id: String,
    handle: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Session identifier
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the session to return to idle
    pub async fn wait(self) -> NodeResult<SessionReport> {
        self.handle
            .await
            .map_err(|e| NodeError::Task(format!("session task failed: {e}")))
    }
}

/// Session Orchestrator
///
/// Owns the node's single session slot. At most one session is running or
/// draining at any time; a start while one is active is rejected, never
/// queued. The active-state and the result batch are guarded by their own
/// independent locks and are only reachable through these accessors.
pub struct SessionManager {
    factory: Arc<dyn ScriptFactory>,
    config: NodeConfig,
    active: Mutex<Option<ActiveSession>>,
    phase: watch::Sender<SessionPhase>,
    batch: Arc<ResultBatch>,
    last_failure: Mutex<Option<SessionFailure>>,
    degraded: AtomicBool,
}

impl SessionManager {
    /// Create an idle manager
    pub fn new(factory: Arc<dyn ScriptFactory>, config: NodeConfig) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Idle);
        Self {
            factory,
            config,
            active: Mutex::new(None),
            phase,
            batch: Arc::new(ResultBatch::new()),
            last_failure: Mutex::new(None),
            degraded: AtomicBool::new(false),
        }
    }

    /// Start a session unless one is already active
    ///
    /// Returns immediately; the pool is built and the tick loop runs on a
    /// spawned task. Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>, command: StartCommand) -> StartOutcome {
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock();
            if let Some(current) = active.as_ref() {
                tracing::info!(
                    requested = %command.session_id,
                    active_session = %current.id,
                    "Start rejected, session already active"
                );
                return StartOutcome::Rejected {
                    active_session: current.id.clone(),
                };
            }

            *active = Some(ActiveSession {
                id: command.session_id.clone(),
                throughput: command.throughput,
                cancel: cancel.clone(),
            });
            self.phase.send_replace(SessionPhase::Running);
        }

        let session_id = command.session_id.clone();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.run_session(command, cancel).await });

        StartOutcome::Accepted(SessionHandle { session_id, handle })
    }

    /// Raise the active session's cancellation signal
    ///
    /// Does not wait for the session to drain. A no-op when idle.
    pub fn stop(&self) -> StopOutcome {
        match self.active.lock().as_ref() {
            Some(session) => {
                session.cancel.cancel();
                StopOutcome::Cancelling(session.id.clone())
            }
            None => StopOutcome::NotActive,
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Whether a session is running or draining
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Identifier of the active session
    pub fn active_session_id(&self) -> Option<String> {
        self.active.lock().as_ref().map(|s| s.id.clone())
    }

    /// Throughput of the active session
    pub fn active_throughput(&self) -> Option<usize> {
        self.active.lock().as_ref().map(|s| s.throughput)
    }

    /// Watch phase transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Wait until no session is active
    pub async fn wait_idle(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|phase| *phase == SessionPhase::Idle).await;
    }

    /// Shared result batch
    pub fn batch(&self) -> &Arc<ResultBatch> {
        &self.batch
    }

    /// Node health derived from the most recent finished session
    pub fn health(&self) -> NodeHealth {
        if self.degraded.load(Ordering::SeqCst) {
            NodeHealth::Degraded
        } else {
            NodeHealth::Healthy
        }
    }

    /// Take the unreported failure of the most recent session, if any
    pub fn take_failure(&self) -> Option<SessionFailure> {
        self.last_failure.lock().take()
    }

    async fn run_session(
        self: Arc<Self>,
        command: StartCommand,
        cancel: CancellationToken,
    ) -> SessionReport {
        let session_id = command.session_id.clone();
        let session = self.config.session(command.throughput, command.duration);

        tracing::info!(
            session_id = %session_id,
            throughput = session.throughput,
            duration_secs = session.duration.as_secs_f64(),
            expected_ticks = session.expected_ticks(),
            "Starting session"
        );

        // A panic inside the session must still return the node to idle.
        let execution = {
            let manager = Arc::clone(&self);
            tokio::spawn(async move { manager.execute(&command, session, cancel).await })
        };
        let (outcome, stats) = match execution.await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "Session aborted before scheduling"
                );
                (SessionOutcome::Aborted(e.to_string()), SessionStats::default())
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Session task panicked");
                let message = format!("session task failed: {e}");
                (SessionOutcome::Aborted(message), SessionStats::default())
            }
        };

        self.finish(&session_id, &outcome);

        tracing::info!(
            session_id = %session_id,
            outcome = ?outcome,
            ticks = stats.ticks,
            succeeded = stats.succeeded,
            failed = stats.failed,
            elapsed_secs = stats.elapsed.as_secs_f64(),
            "Session finished"
        );

        SessionReport {
            session_id,
            outcome,
            stats,
        }
    }

    async fn execute(
        &self,
        command: &StartCommand,
        session: SessionConfig,
        cancel: CancellationToken,
    ) -> NodeResult<(SessionOutcome, SessionStats)> {
        session
            .validate()
            .map_err(|e| NodeError::config(e.to_string()))?;

        let pool = PoolBuilder::new()
            .factory(Arc::clone(&self.factory))
            .throughput(session.throughput)
            .script(command.script.as_str())
            .build_blocking()
            .await?;

        let ctx = Arc::new(SessionContext {
            session_id: command.session_id.clone(),
            pool,
            batch: Arc::clone(&self.batch),
            counters: SessionCounters::new(),
            cancel,
            tracker: TaskTracker::new(),
            failure: OnceLock::new(),
            invocation_timeout: session.invocation_timeout,
        });

        // The deadline counts from the first tick, not from the start command.
        let started = Instant::now();
        let deadline = started.checked_add(session.duration).ok_or_else(|| {
            NodeError::config(format!("duration {:?} is out of range", session.duration))
        })?;
        let exit = run_ticks(&ctx, session.tick_interval, deadline).await;

        self.set_phase(SessionPhase::Draining);
        tracing::debug!(
            session_id = %ctx.session_id,
            exit = ?exit,
            outstanding = ctx.tracker.len(),
            "Draining outstanding invocations"
        );
        ctx.tracker.close();
        ctx.tracker.wait().await;

        let stats = ctx.counters.snapshot(started.elapsed());
        let outcome = match (ctx.failure(), exit) {
            (Some(msg), _) => SessionOutcome::Failed(msg.to_string()),
            (None, TickExit::Cancelled) => SessionOutcome::Stopped,
            (None, TickExit::Deadline) => SessionOutcome::Completed,
        };

        Ok((outcome, stats))
    }

    fn set_phase(&self, phase: SessionPhase) {
        let _active = self.active.lock();
        self.phase.send_replace(phase);
    }

    fn finish(&self, session_id: &str, outcome: &SessionOutcome) {
        match outcome.error_message() {
            Some(message) => {
                *self.last_failure.lock() = Some(SessionFailure {
                    session_id: session_id.to_string(),
                    message: message.to_string(),
                });
                self.degraded.store(true, Ordering::SeqCst);
            }
            None => {
                self.degraded.store(false, Ordering::SeqCst);
            }
        }

        let mut active = self.active.lock();
        *active = None;
        self.phase.send_replace(SessionPhase::Idle);
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("backend", &self.factory.backend_name())
            .field("phase", &self.phase())
            .field("active_session", &self.active_session_id())
            .finish()
    }
}
