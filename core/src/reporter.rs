//! Periodic health and result reporting

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::NodeResult;
use crate::session::SessionManager;
use crate::status::StatusMessage;
use crate::traits::{Bus, BusError};

/// Longest a single status or announcement publish may take
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publish with [`PUBLISH_TIMEOUT`], reporting a stalled bus as a failure
pub(crate) async fn publish_bounded(
    bus: &dyn Bus,
    topic: &str,
    payload: Vec<u8>,
) -> Result<(), BusError> {
    match tokio::time::timeout(PUBLISH_TIMEOUT, bus.publish(topic, payload)).await {
        Ok(result) => result,
        Err(_) => Err(BusError::Publish(format!(
            "publish to {topic} timed out after {}s",
            PUBLISH_TIMEOUT.as_secs()
        ))),
    }
}

/// Health/Status Reporter
///
/// Runs for the whole process lifetime on its own cadence, independent of
/// any session. Each report drains the result batch and publishes to the
/// node group topic.
pub struct StatusReporter {
    node_id: String,
    topic: String,
    interval: Duration,
    bus: Arc<dyn Bus>,
    sessions: Arc<SessionManager>,
}

impl StatusReporter {
    /// Create a reporter publishing to `topic`
    pub fn new(
        node_id: impl Into<String>,
        topic: impl Into<String>,
        interval: Duration,
        bus: Arc<dyn Bus>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            topic: topic.into(),
            interval,
            bus,
            sessions,
        }
    }

    /// Report every interval until `shutdown` is cancelled
    ///
    /// The first report goes out one interval after start. The caller is
    /// expected to flush a final report with [`report_once`](Self::report_once)
    /// once the active session has drained.
    pub async fn run(&self, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            topic = %self.topic,
            interval_ms = self.interval.as_millis() as u64,
            "Status reporter started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = interval.tick() => {}
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::warn!("Shutdown interrupted a status report in flight");
                    break;
                }

                result = self.report_once() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to compose status report");
                    }
                }
            }
        }

        tracing::debug!("Status reporter stopped");
    }

    /// Compose and publish one report
    ///
    /// Returns the number of messages the bus accepted. Publish failures and
    /// publishes exceeding [`PUBLISH_TIMEOUT`] are logged and not retried;
    /// the drained results of a failed publish are lost.
    pub async fn report_once(&self) -> NodeResult<usize> {
        let messages = self.compose()?;
        let mut published = 0;

        for message in messages {
            let payload = message.to_bytes()?;
            match publish_bounded(self.bus.as_ref(), &self.topic, payload).await {
                Ok(()) => published += 1,
                Err(e) => {
                    tracing::warn!(
                        bus = self.bus.name(),
                        topic = %self.topic,
                        session_id = message.load_test_id.as_deref().unwrap_or_default(),
                        error = %e,
                        "Status publish failed"
                    );
                }
            }
        }

        Ok(published)
    }

    /// Build the messages for one report
    ///
    /// One message per drained session segment; a pending session failure
    /// rides on its session's segment or gets its own message. With nothing
    /// to carry, a single health-only message.
    pub fn compose(&self) -> NodeResult<Vec<StatusMessage>> {
        // Take the failure before draining: a failed session has appended
        // all of its results by the time its failure is recorded.
        let mut failure = self.sessions.take_failure();
        let segments = self.sessions.batch().drain();
        let health = self.sessions.health();
        let active = self.sessions.is_active();

        let mut messages = Vec::with_capacity(segments.len().max(1));
        for segment in segments {
            tracing::debug!(
                session_id = %segment.session_id,
                records = segment.records.len(),
                "Reporting results"
            );
            let mut message = StatusMessage::new(&self.node_id, health, active)
                .with_results(&segment.session_id, &segment.records)?;
            if failure
                .as_ref()
                .is_some_and(|f| f.session_id == segment.session_id)
            {
                if let Some(f) = failure.take() {
                    message = message.with_error(f.session_id, f.message);
                }
            }
            messages.push(message);
        }

        if let Some(f) = failure {
            let message = StatusMessage::new(&self.node_id, health, active);
            messages.push(message.with_error(f.session_id, f.message));
        }

        if messages.is_empty() {
            messages.push(StatusMessage::new(&self.node_id, health, active));
        }

        Ok(messages)
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("node_id", &self.node_id)
            .field("topic", &self.topic)
            .field("interval", &self.interval)
            .field("bus", &self.bus.name())
            .finish()
    }
}
