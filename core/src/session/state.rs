//! Session lifecycle state

use tokio_util::sync::CancellationToken;

/// Where the single session slot of this node currently is
///
/// Transitions are `Idle -> Running -> Draining -> Idle` and never skip a
/// step, except that a session whose pool fails to build goes straight
/// from `Running` back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session
    #[default]
    Idle,
    /// Pool is being built or ticks are being dispatched
    Running,
    /// Ticks have stopped, outstanding invocations are finishing
    Draining,
}

impl SessionPhase {
    /// Whether a session occupies the node
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionPhase::Idle)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Running => "running",
            SessionPhase::Draining => "draining",
        };
        f.write_str(name)
    }
}

/// The session currently occupying the node
#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub id: String,
    pub throughput: usize,
    pub cancel: CancellationToken,
}

/// Why the most recent failed session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    /// Session that failed
    pub session_id: String,
    /// First error observed
    pub message: String,
}
