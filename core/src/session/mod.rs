//! Session lifecycle: scheduling, cancellation and result collection
//!
//! A session runs one script at a fixed throughput for a bounded duration:
//!
//! 1. The [`SessionManager`] accepts a start command if the node is idle and
//!    builds an executor pool with one slot per unit of throughput.
//! 2. The scheduler ticks at a fixed interval, dispatching one invocation
//!    per slot each tick, until the deadline passes or the session's
//!    cancellation token is raised.
//! 3. Successful invocations append to the shared [`ResultBatch`]; the
//!    first failure cancels the session.
//! 4. Once every outstanding invocation has finished the node is idle again.
//!
//! # Example
//!
//! ```ignore
//! use dlt_node_core::session::{SessionManager, StartOutcome};
//!
//! let sessions = Arc::new(SessionManager::new(factory, config));
//! if let StartOutcome::Accepted(handle) = sessions.start(command) {
//!     let report = handle.wait().await?;
//!     println!("{:?}: {} results", report.outcome, report.stats.succeeded);
//! }
//! ```

mod aggregator;
mod executor;
mod scheduler;
mod state;

pub use aggregator::{ResultBatch, ResultSegment};
pub use executor::{
    SessionHandle, SessionManager, SessionOutcome, SessionReport, StartOutcome, StopOutcome,
};
pub use state::{SessionFailure, SessionPhase};
