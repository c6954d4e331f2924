//! Core traits for script backends and the pub/sub transport
//!
//! These traits are defined in core so the engine never depends on a
//! concrete backend. Implementations live in their own crates
//! (scripting/, bus/).

use async_trait::async_trait;

// ============================================================================
// Script Backend Traits
// ============================================================================

/// One loaded instance of a load-test script
///
/// An instance is owned by exactly one executor slot and is never entered
/// by two invocations at once. `invoke` is synchronous: the engine always
/// calls it from a blocking thread, so implementations may block on I/O.
pub trait ScriptInstance: Send {
    /// Run the script's entry point once and return its result record
    fn invoke(&mut self) -> Result<String, ScriptError>;
}

/// Factory that turns script source into independent instances
///
/// Implementations bind every instance to the same fixed set of host
/// capabilities (network calls, string/JSON helpers, timing, result builder).
pub trait ScriptFactory: Send + Sync {
    /// Backend identifier (e.g., "quickjs")
    fn backend_name(&self) -> &str;

    /// Load `source` into a fresh, isolated instance for `slot`
    fn load(&self, slot: usize, source: &str) -> Result<Box<dyn ScriptInstance>, ScriptError>;
}

/// Script backend errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// Source failed to compile or its top-level code threw
    #[error("compile error: {0}")]
    Compile(String),

    /// Source compiled but exposes no callable entry point
    #[error("entry point not found: {0}")]
    MissingEntryPoint(String),

    /// Entry point threw during an invocation
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Entry point returned a value that cannot become a result record
    #[error("invalid result: {0}")]
    InvalidResult(String),

    /// Engine-level failure (allocation, runtime setup)
    #[error("engine error: {0}")]
    Engine(String),
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Outbound side of the pub/sub transport
///
/// Inbound messages are delivered separately as raw payloads over an
/// `mpsc` channel owned by the dispatcher.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Transport identifier (e.g., "mqtt")
    fn name(&self) -> &str;

    /// Publish a payload to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Connection to the broker failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Subscription request failed
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Publish request failed
    #[error("publish failed: {0}")]
    Publish(String),

    /// Transport has been shut down
    #[error("transport closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoInstance(usize);

    impl ScriptInstance for EchoInstance {
        fn invoke(&mut self) -> Result<String, ScriptError> {
            Ok(format!("slot-{}", self.0))
        }
    }

    struct EchoFactory;

    impl ScriptFactory for EchoFactory {
        fn backend_name(&self) -> &str {
            "echo"
        }

        fn load(&self, slot: usize, source: &str) -> Result<Box<dyn ScriptInstance>, ScriptError> {
            if source.is_empty() {
                return Err(ScriptError::Compile("empty source".into()));
            }
            Ok(Box::new(EchoInstance(slot)))
        }
    }

    #[test]
    fn test_factory_trait_object() {
        let factory: Box<dyn ScriptFactory> = Box::new(EchoFactory);
        assert_eq!(factory.backend_name(), "echo");

        let mut instance = factory.load(4, "src").expect("load failed");
        assert_eq!(instance.invoke().unwrap(), "slot-4");

        let err = factory.load(0, "").err().expect("empty source should fail");
        assert_eq!(err, ScriptError::Compile("empty source".into()));
    }

    #[test]
    fn test_bus_error_display() {
        assert_eq!(BusError::Closed.to_string(), "transport closed");
        assert_eq!(
            BusError::Publish("queue full".into()).to_string(),
            "publish failed: queue full"
        );
    }
}
