//! Executor pool: the per-slot script instances a session runs against
//!
//! A session owns exactly one pool. The pool is built from a throughput `N`
//! and a script payload, producing `N` isolated script instances that all
//! share one capability bundle through the [`ScriptFactory`]. Construction is
//! all-or-nothing, so a session never schedules against a partial pool.
//!
//! Each [`ExecutorSlot`] wraps its instance in an exclusive lock. Invocations
//! on different slots run fully in parallel; invocations on one slot are
//! serialized by that lock even when ticks overlap.
//!
//! # Example
//!
//! ```ignore
//! use dlt_node_core::pool::PoolBuilder;
//!
//! let pool = PoolBuilder::new()
//!     .factory(factory)
//!     .throughput(4)
//!     .script(source)
//!     .build_blocking()
//!     .await?;
//!
//! let record = pool.slot(0).unwrap().invoke(None).await?;
//! ```
//!
//! [`ScriptFactory`]: crate::traits::ScriptFactory

mod builder;
mod slot;
mod stats;

pub use builder::{ExecutorPool, PoolBuilder};
pub use slot::ExecutorSlot;
pub use stats::{SessionCounters, SessionStats};

#[cfg(test)]
mod tests;
