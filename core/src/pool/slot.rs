//! Executor slot: one script instance behind an exclusive lock

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{NodeError, NodeResult};
use crate::traits::ScriptInstance;

/// One isolated script instance plus its exclusive lock
///
/// Every invocation against the slot holds the lock for exactly the span
/// of the script call, so a script instance is never re-entered.
pub struct ExecutorSlot {
    index: usize,
    instance: Arc<Mutex<Box<dyn ScriptInstance>>>,
}

impl ExecutorSlot {
    /// Wrap a loaded instance
    pub fn new(index: usize, instance: Box<dyn ScriptInstance>) -> Self {
        Self {
            index,
            instance: Arc::new(Mutex::new(instance)),
        }
    }

    /// Slot index within its pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether an invocation currently holds this slot
    pub fn is_busy(&self) -> bool {
        self.instance.try_lock().is_err()
    }

    /// Run the script once against this slot
    ///
    /// Waits for the slot lock, then runs the script on a blocking thread.
    /// The lock guard moves into that thread and is dropped as soon as the
    /// script returns, before the result is inspected.
    ///
    /// With a `timeout`, the caller stops waiting after the limit and gets
    /// [`NodeError::InvocationTimeout`]. The script call itself cannot be
    /// interrupted, so the slot stays locked until it actually returns.
    pub async fn invoke(&self, timeout: Option<Duration>) -> NodeResult<String> {
        let guard = Arc::clone(&self.instance).lock_owned().await;

        let call = tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            let result = guard.invoke();
            drop(guard);
            result
        });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(NodeError::InvocationTimeout {
                        slot: self.index,
                        timeout: limit,
                    })
                }
            },
            None => call.await,
        };

        joined
            .map_err(|e| NodeError::invocation(self.index, format!("script call panicked: {e}")))?
            .map_err(|e| NodeError::invocation(self.index, e.to_string()))
    }
}

impl std::fmt::Debug for ExecutorSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorSlot")
            .field("index", &self.index)
            .field("busy", &self.is_busy())
            .finish()
    }
}
