//! Worker node wiring

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::{NodeError, NodeResult};
use crate::reporter::{publish_bounded, StatusReporter};
use crate::session::{SessionManager, StopOutcome};
use crate::status::Announcement;
use crate::traits::{Bus, ScriptFactory};

/// A worker attached to the bus
///
/// Owns the session manager and runs the reporter and dispatcher side by
/// side until shutdown.
pub struct Node {
    config: NodeConfig,
    bus: Arc<dyn Bus>,
    sessions: Arc<SessionManager>,
}

impl Node {
    /// Create a node
    ///
    /// # Errors
    /// Returns a configuration error if `config` does not validate.
    pub fn new(
        config: NodeConfig,
        factory: Arc<dyn ScriptFactory>,
        bus: Arc<dyn Bus>,
    ) -> NodeResult<Self> {
        config
            .validate()
            .map_err(|e| NodeError::config(e.to_string()))?;

        let sessions = Arc::new(SessionManager::new(factory, config.clone()));
        Ok(Self {
            config,
            bus,
            sessions,
        })
    }

    /// Session manager driven by this node
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Announces the node, then reports and dispatches commands. On
    /// shutdown any active session is stopped and drained, a final report
    /// is flushed and the node announces its departure.
    pub async fn run(
        &self,
        inbound: mpsc::Receiver<Vec<u8>>,
        shutdown: CancellationToken,
    ) -> NodeResult<()> {
        let group_topic = self.config.group_topic();

        tracing::info!(
            node_id = %self.config.node_id,
            group_id = %self.config.group_id,
            bus = self.bus.name(),
            "Node starting"
        );
        self.announce(Announcement::join(&self.config.node_id)).await?;

        let reporter = Arc::new(StatusReporter::new(
            &self.config.node_id,
            &group_topic,
            self.config.report_interval,
            Arc::clone(&self.bus),
            Arc::clone(&self.sessions),
        ));
        let dispatcher =
            CommandDispatcher::new(Arc::clone(&self.sessions), self.config.max_throughput);

        let reporter_task = {
            let reporter = Arc::clone(&reporter);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { reporter.run(shutdown).await })
        };
        let dispatcher_task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { dispatcher.run(inbound, shutdown).await })
        };

        shutdown.cancelled().await;
        tracing::info!("Node shutting down");

        dispatcher_task
            .await
            .map_err(|e| NodeError::Task(format!("dispatcher task failed: {e}")))?;
        reporter_task
            .await
            .map_err(|e| NodeError::Task(format!("reporter task failed: {e}")))?;

        if let StopOutcome::Cancelling(session_id) = self.sessions.stop() {
            tracing::info!(session_id = %session_id, "Waiting for active session to drain");
        }
        self.sessions.wait_idle().await;

        match reporter.report_once().await {
            Ok(published) => tracing::debug!(published, "Final status report sent"),
            Err(e) => tracing::error!(error = %e, "Failed to send final status report"),
        }

        self.announce(Announcement::leave(&self.config.node_id)).await?;
        tracing::info!(node_id = %self.config.node_id, "Node stopped");
        Ok(())
    }

    async fn announce(&self, announcement: Announcement) -> NodeResult<()> {
        let payload = announcement.to_bytes()?;
        let topic = self.config.group_topic();
        if let Err(e) = publish_bounded(self.bus.as_ref(), &topic, payload).await {
            tracing::warn!(
                action = %announcement.action,
                error = %e,
                "Announcement not delivered"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.config)
            .field("bus", &self.bus.name())
            .field("sessions", &self.sessions)
            .finish()
    }
}
