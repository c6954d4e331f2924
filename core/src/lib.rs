//! dlt-node-core: load-test execution engine for a fleet-joined worker
//!
//! This crate holds everything a worker node does between receiving a
//! command and publishing results:
//!
//! - Wire types for inbound commands and outbound status messages
//! - The executor pool of per-slot script instances
//! - The rate-paced scheduler and session lifecycle
//! - The status reporter and command dispatcher
//! - Core traits for script backends and the pub/sub bus
//!
//! Concrete script engines and transports live in their own crates and
//! plug in through [`ScriptFactory`] and [`Bus`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod node;
pub mod pool;
pub mod reporter;
pub mod session;
pub mod status;
pub mod traits;

pub use command::{Command, StartCommand};
pub use config::{ConfigError, NodeConfig, SessionConfig};
pub use dispatcher::{CommandDispatcher, Dispatch};
pub use error::*;
pub use node::Node;
pub use pool::{ExecutorPool, PoolBuilder, SessionStats};
pub use reporter::StatusReporter;
pub use session::{
    ResultBatch, SessionManager, SessionOutcome, SessionPhase, SessionReport, StartOutcome,
    StopOutcome,
};
pub use status::{Announcement, NodeHealth, StatusMessage};
pub use traits::*;

#[cfg(test)]
pub(crate) mod test_support;
