//! Session and node configuration types

use std::time::Duration;

/// Default scheduler cadence
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default status report cadence
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound on the throughput a single command may request
pub const DEFAULT_MAX_THROUGHPUT: usize = 1000;

/// Longest session a start command may request (30 days)
pub const MAX_SESSION_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Session configuration
///
/// Defines how one load-test session is paced: `throughput` invocations
/// are dispatched every `tick_interval` until `duration` has elapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Invocations dispatched per tick (one per executor slot)
    pub throughput: usize,

    /// Session length
    pub duration: Duration,

    /// Scheduler tick cadence
    pub tick_interval: Duration,

    /// Optional upper bound on a single script call
    pub invocation_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Create a new config with the default tick interval and no timeout
    pub fn new(throughput: usize, duration: Duration) -> Self {
        Self {
            throughput,
            duration,
            tick_interval: DEFAULT_TICK_INTERVAL,
            invocation_timeout: None,
        }
    }

    /// Set the tick interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the per-invocation timeout
    pub fn with_invocation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Number of ticks a session runs when nothing cancels it
    pub fn expected_ticks(&self) -> u64 {
        if self.tick_interval.is_zero() {
            return 0;
        }
        let duration = self.duration.as_nanos();
        let tick = self.tick_interval.as_nanos();
        duration.div_ceil(tick) as u64
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.throughput == 0 {
            return Err(ConfigError::InvalidThroughput(
                "throughput must be at least 1".into(),
            ));
        }

        if self.duration.is_zero() {
            return Err(ConfigError::InvalidDuration(
                "duration must be positive".into(),
            ));
        }

        if self.duration > MAX_SESSION_DURATION {
            return Err(ConfigError::InvalidDuration(format!(
                "duration must not exceed {}s",
                MAX_SESSION_DURATION.as_secs()
            )));
        }

        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "tick interval must be positive".into(),
            ));
        }

        if let Some(timeout) = self.invocation_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidInterval(
                    "invocation timeout must be positive".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Node configuration
///
/// Identity and cadence settings for one worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// This worker's identity
    pub node_id: String,

    /// Node group this worker reports to
    pub group_id: String,

    /// Status report cadence
    pub report_interval: Duration,

    /// Scheduler tick cadence for every session
    pub tick_interval: Duration,

    /// Optional upper bound on a single script call
    pub invocation_timeout: Option<Duration>,

    /// Largest throughput a start command may request
    pub max_throughput: usize,
}

impl NodeConfig {
    /// Create a new config with default cadences
    pub fn new(node_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            group_id: group_id.into(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            tick_interval: DEFAULT_TICK_INTERVAL,
            invocation_timeout: None,
            max_throughput: DEFAULT_MAX_THROUGHPUT,
        }
    }

    /// Set the report interval
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Set the tick interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the per-invocation timeout
    pub fn with_invocation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Set the throughput ceiling
    pub fn with_max_throughput(mut self, max: usize) -> Self {
        self.max_throughput = max;
        self
    }

    /// Topic shared by the node group for outbound status
    pub fn group_topic(&self) -> String {
        format!("ngs/{}", self.group_id)
    }

    /// Node-scoped topic for inbound commands
    pub fn node_topic(&self) -> String {
        format!("nodes/{}", self.node_id)
    }

    /// Build the session config for a session of the given shape
    pub fn session(&self, throughput: usize, duration: Duration) -> SessionConfig {
        SessionConfig::new(throughput, duration)
            .with_tick_interval(self.tick_interval)
            .with_invocation_timeout(self.invocation_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::MissingIdentity("node id is empty".into()));
        }

        if self.group_id.trim().is_empty() {
            return Err(ConfigError::MissingIdentity("node group id is empty".into()));
        }

        if self.report_interval.is_zero() || self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "report and tick intervals must be positive".into(),
            ));
        }

        if self.max_throughput == 0 {
            return Err(ConfigError::InvalidThroughput(
                "max throughput must be at least 1".into(),
            ));
        }

        if let Some(timeout) = self.invocation_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidInterval(
                    "invocation timeout must be positive".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid throughput value
    #[error("Invalid throughput: {0}")]
    InvalidThroughput(String),

    /// Invalid session duration
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Invalid interval or timeout
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Node or group identity missing
    #[error("Missing identity: {0}")]
    MissingIdentity(String),
}
