//! dlt-node-bus: MQTT transport for dlt-node
//!
//! Publishes outbound envelopes and forwards inbound command payloads from
//! the node topic into an `mpsc` channel. The event loop task reconnects on
//! its own and re-subscribes after every connection acknowledgement.
//!
//! # Example
//!
//! ```ignore
//! use dlt_node_bus::{MqttBus, MqttSettings};
//!
//! let settings = MqttSettings::new("localhost", 1883, "node-1");
//! let (bus, inbound, event_loop) = MqttBus::connect(settings, "nodes/node-1", shutdown.clone());
//!
//! node.run(inbound, shutdown).await?;
//! bus.close()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dlt_node_core::{Bus, BusError};

/// Default MQTT keep-alive
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Default delay before polling again after a connection error
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Default packet size limit; script payloads travel inside commands
pub const DEFAULT_MAX_PACKET_SIZE: usize = 4 * 1024 * 1024;

const REQUEST_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 32;

/// Broker connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    /// Broker host
    pub host: String,

    /// Broker port
    pub port: u16,

    /// MQTT client id
    pub client_id: String,

    /// Keep-alive interval
    pub keep_alive: Duration,

    /// Username and password
    pub credentials: Option<(String, String)>,

    /// Delay between reconnect attempts
    pub reconnect_delay: Duration,

    /// Largest packet accepted or sent
    pub max_packet_size: usize,
}

impl MqttSettings {
    /// Create settings with default tuning
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            credentials: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    /// Set the keep-alive interval
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Authenticate with a username and password
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the packet size limit
    pub fn with_max_packet_size(mut self, bytes: usize) -> Self {
        self.max_packet_size = bytes;
        self
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options.set_max_packet_size(self.max_packet_size, self.max_packet_size);
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }
        options
    }
}

/// MQTT-backed [`Bus`]
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    /// Create the client and spawn its event loop
    ///
    /// Inbound publishes on `subscribe_topic` arrive on the returned
    /// receiver. The event loop runs until [`close`](Self::close) has been
    /// flushed to the broker or `shutdown` is cancelled. Must be called from
    /// within a tokio runtime.
    pub fn connect(
        settings: MqttSettings,
        subscribe_topic: impl Into<String>,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<Vec<u8>>, JoinHandle<()>) {
        let (client, eventloop) = AsyncClient::new(settings.options(), REQUEST_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        tracing::info!(
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "Connecting to MQTT broker"
        );

        let driver = EventLoopDriver {
            eventloop,
            client: client.clone(),
            topic: subscribe_topic.into(),
            inbound: inbound_tx,
            reconnect_delay: settings.reconnect_delay,
        };
        let handle = tokio::spawn(driver.run(shutdown));

        (Self { client }, inbound_rx, handle)
    }

    /// Queue a disconnect behind any pending publishes
    ///
    /// Fails instead of waiting when the request queue is full.
    pub fn close(&self) -> Result<(), BusError> {
        self.client
            .try_disconnect()
            .map_err(|e| BusError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Bus for MqttBus {
    fn name(&self) -> &str {
        "mqtt"
    }

    /// Queue a QoS 1 publish
    ///
    /// Never waits: while the broker is unreachable the request queue fills
    /// up, and publishes beyond its capacity fail immediately.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}

impl std::fmt::Debug for MqttBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBus").finish_non_exhaustive()
    }
}

struct EventLoopDriver {
    eventloop: EventLoop,
    client: AsyncClient,
    topic: String,
    inbound: mpsc::Sender<Vec<u8>>,
    reconnect_delay: Duration,
}

impl EventLoopDriver {
    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    tracing::info!(
                        code = ?ack.code,
                        topic = %self.topic,
                        "Connected to MQTT broker"
                    );
                    let topic = self.topic.as_str();
                    if let Err(e) = self.client.try_subscribe(topic, QoS::AtLeastOnce) {
                        tracing::error!(topic, error = %e, "Subscribe request failed");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    tracing::debug!(topic = %self.topic, "Subscribed");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic != self.topic {
                        tracing::debug!(
                            topic = %publish.topic,
                            "Ignoring message on foreign topic"
                        );
                        continue;
                    }
                    if self.inbound.send(publish.payload.to_vec()).await.is_err() {
                        tracing::debug!("Inbound receiver dropped, discarding message");
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    tracing::info!("Disconnected from MQTT broker");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_ms = self.reconnect_delay.as_millis() as u64,
                        "MQTT connection error"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
            }
        }

        tracing::debug!("MQTT event loop stopped");
    }
}
