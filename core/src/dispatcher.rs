//! Inbound command routing

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::session::{SessionManager, StartOutcome, StopOutcome};

/// What the dispatcher did with one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A session was started
    Started(String),
    /// A start arrived while another session was active
    StartRejected {
        /// Session the command asked for
        requested: String,
        /// Session already occupying the node
        active: String,
    },
    /// The active session is being cancelled
    Stopping(String),
    /// A stop arrived while idle
    StopIgnored,
    /// The coordinator acknowledged this node joining
    Joined,
    /// An action this node does not handle
    Ignored(String),
    /// The message could not be decoded or validated
    Invalid(String),
}

/// Command Dispatcher
///
/// Decodes inbound payloads and routes them to the session manager. A
/// malformed command is rejected before it can touch session state.
pub struct CommandDispatcher {
    sessions: Arc<SessionManager>,
    max_throughput: usize,
}

impl CommandDispatcher {
    /// Create a dispatcher bounding start commands to `max_throughput`
    pub fn new(sessions: Arc<SessionManager>, max_throughput: usize) -> Self {
        Self {
            sessions,
            max_throughput,
        }
    }

    /// Handle one inbound payload
    pub fn handle(&self, payload: &[u8]) -> Dispatch {
        let command = match Command::decode(payload, self.max_throughput) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "Rejected inbound command");
                return Dispatch::Invalid(e.to_string());
            }
        };

        match command {
            Command::Start(start) => {
                let requested = start.session_id.clone();
                tracing::info!(
                    session_id = %requested,
                    throughput = start.throughput,
                    duration_secs = start.duration.as_secs_f64(),
                    "Received start_loadtest"
                );
                match self.sessions.start(start) {
                    StartOutcome::Accepted(handle) => {
                        Dispatch::Started(handle.session_id().to_string())
                    }
                    StartOutcome::Rejected { active_session } => Dispatch::StartRejected {
                        requested,
                        active: active_session,
                    },
                }
            }
            Command::Stop { session_id } => match self.sessions.stop() {
                StopOutcome::Cancelling(active) => {
                    if let Some(requested) = session_id.filter(|id| *id != active) {
                        tracing::warn!(
                            requested = %requested,
                            active_session = %active,
                            "Stop named a different session, stopping the active one"
                        );
                    }
                    tracing::info!(session_id = %active, "Stopping session");
                    Dispatch::Stopping(active)
                }
                StopOutcome::NotActive => {
                    tracing::debug!("Stop received while idle");
                    Dispatch::StopIgnored
                }
            },
            Command::JoinAcknowledged => {
                tracing::info!("Coordinator acknowledged node");
                Dispatch::Joined
            }
            Command::Unknown(action) => {
                tracing::debug!(action = %action, "Ignoring unhandled action");
                Dispatch::Ignored(action)
            }
        }
    }

    /// Handle inbound payloads until shutdown or until the channel closes
    pub async fn run(&self, mut inbound: mpsc::Receiver<Vec<u8>>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                message = inbound.recv() => match message {
                    Some(payload) => {
                        self.handle(&payload);
                    }
                    None => {
                        tracing::warn!("Inbound channel closed");
                        break;
                    }
                }
            }
        }

        tracing::debug!("Command dispatcher stopped");
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("max_throughput", &self.max_throughput)
            .field("sessions", &self.sessions)
            .finish()
    }
}
