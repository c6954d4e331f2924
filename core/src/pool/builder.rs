//! Builder pattern for ExecutorPool construction

use std::sync::Arc;

use crate::error::{NodeError, NodeResult};
use crate::traits::ScriptFactory;

use super::slot::ExecutorSlot;

/// Fixed set of executor slots for one session
///
/// Created once per session and discarded when the session ends; the
/// number of slots equals the session throughput for its whole lifetime.
pub struct ExecutorPool {
    slots: Vec<ExecutorSlot>,
    backend: String,
}

impl ExecutorPool {
    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot by index
    pub fn slot(&self, index: usize) -> Option<&ExecutorSlot> {
        self.slots.get(index)
    }

    /// All slots in index order
    pub fn slots(&self) -> &[ExecutorSlot] {
        &self.slots
    }

    /// Backend that produced the slots
    pub fn backend(&self) -> &str {
        &self.backend
    }
}

impl std::fmt::Debug for ExecutorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorPool")
            .field("slots", &self.slots.len())
            .field("backend", &self.backend)
            .finish()
    }
}

/// Builder for creating an ExecutorPool
///
/// # Example
/// ```ignore
/// let pool = PoolBuilder::new()
///     .factory(factory)
///     .throughput(10)
///     .script(source)
///     .build_blocking()
///     .await?;
/// ```
#[derive(Default)]
pub struct PoolBuilder {
    factory: Option<Arc<dyn ScriptFactory>>,
    throughput: Option<usize>,
    script: Option<Arc<str>>,
}

impl PoolBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the script factory
    pub fn factory(mut self, factory: Arc<dyn ScriptFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Set the number of slots
    pub fn throughput(mut self, throughput: usize) -> Self {
        self.throughput = Some(throughput);
        self
    }

    /// Set the script source every slot loads
    pub fn script(mut self, source: impl Into<Arc<str>>) -> Self {
        self.script = Some(source.into());
        self
    }

    /// Build the pool on the current thread
    ///
    /// All-or-nothing: the first slot that fails to load aborts the build
    /// and every instance created so far is dropped.
    ///
    /// # Errors
    /// Returns an error if a required field is missing, the throughput is
    /// zero, or any slot fails to load.
    pub fn build(self) -> NodeResult<ExecutorPool> {
        let factory = self.factory.ok_or(NodeError::missing_config("factory"))?;
        let throughput = self
            .throughput
            .ok_or(NodeError::missing_config("throughput"))?;
        let script = self.script.ok_or(NodeError::missing_config("script"))?;

        if throughput == 0 {
            return Err(NodeError::config("throughput must be at least 1"));
        }

        let mut slots = Vec::with_capacity(throughput);
        for index in 0..throughput {
            let instance = factory
                .load(index, &script)
                .map_err(|e| NodeError::plugin_load(index, e.to_string()))?;
            slots.push(ExecutorSlot::new(index, instance));
        }

        tracing::debug!(
            slots = slots.len(),
            backend = factory.backend_name(),
            "Executor pool created"
        );

        Ok(ExecutorPool {
            slots,
            backend: factory.backend_name().to_string(),
        })
    }

    /// Build the pool on a blocking thread
    ///
    /// Script engines compile synchronously; this keeps that work off the
    /// async workers.
    pub async fn build_blocking(self) -> NodeResult<ExecutorPool> {
        tokio::task::spawn_blocking(move || self.build())
            .await
            .map_err(|e| NodeError::Task(format!("pool construction panicked: {e}")))?
    }
}
