//! CLI argument parsing and node startup

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use dlt_node_bus::{MqttBus, MqttSettings};
use dlt_node_core::config::{
    DEFAULT_MAX_THROUGHPUT, DEFAULT_REPORT_INTERVAL, DEFAULT_TICK_INTERVAL,
};
use dlt_node_core::{Node, NodeConfig};
use dlt_node_scripting::{HostCapabilities, QuickJsFactory};

use crate::shutdown::install_shutdown_handler;

/// How long to wait for queued MQTT traffic to flush on exit
const BUS_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "dlt-node")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub json_logs: bool,

    /// This worker's identity
    #[arg(long, env = "NODE_ID")]
    pub node_id: String,

    /// Node group to report to
    #[arg(long, env = "NODEGROUP_ID")]
    pub group_id: String,

    /// MQTT broker host
    #[arg(long, env = "MQTT_HOST", default_value = "localhost")]
    pub mqtt_host: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT username
    #[arg(long, env = "MQTT_USERNAME", requires = "mqtt_password")]
    pub mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true, requires = "mqtt_username")]
    pub mqtt_password: Option<String>,

    /// MQTT keep-alive in seconds
    #[arg(long, env = "MQTT_KEEP_ALIVE_SECS", default_value_t = 30)]
    pub mqtt_keep_alive_secs: u64,

    /// Seconds between status reports
    #[arg(
        long,
        env = "REPORT_INTERVAL_SECS",
        default_value_t = DEFAULT_REPORT_INTERVAL.as_secs()
    )]
    pub report_interval_secs: u64,

    /// Milliseconds between scheduler ticks
    #[arg(
        long,
        env = "TICK_INTERVAL_MS",
        default_value_t = DEFAULT_TICK_INTERVAL.as_millis() as u64
    )]
    pub tick_interval_ms: u64,

    /// Fail a session when one script call runs longer than this (off when unset)
    #[arg(long, env = "INVOCATION_TIMEOUT_MS")]
    pub invocation_timeout_ms: Option<u64>,

    /// Largest tps a start command may request
    #[arg(long, env = "MAX_THROUGHPUT", default_value_t = DEFAULT_MAX_THROUGHPUT)]
    pub max_throughput: usize,

    /// JS heap limit per executor slot, in MiB
    #[arg(long, env = "SCRIPT_MEMORY_LIMIT_MB")]
    pub script_memory_limit_mb: Option<usize>,

    /// Timeout for HTTP calls made by scripts, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,
}

impl Cli {
    /// Node configuration from the parsed arguments
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig::new(&self.node_id, &self.group_id)
            .with_report_interval(Duration::from_secs(self.report_interval_secs))
            .with_tick_interval(Duration::from_millis(self.tick_interval_ms))
            .with_invocation_timeout(self.invocation_timeout_ms.map(Duration::from_millis))
            .with_max_throughput(self.max_throughput)
    }

    /// Broker settings from the parsed arguments
    pub fn mqtt_settings(&self) -> MqttSettings {
        let settings = MqttSettings::new(&self.mqtt_host, self.mqtt_port, &self.node_id)
            .with_keep_alive(Duration::from_secs(self.mqtt_keep_alive_secs));
        match (&self.mqtt_username, &self.mqtt_password) {
            (Some(username), Some(password)) => settings.with_credentials(username, password),
            _ => settings,
        }
    }

    /// Per-slot JS heap limit in bytes
    pub fn script_memory_limit(&self) -> Result<Option<usize>> {
        self.script_memory_limit_mb
            .map(|mb| {
                mb.checked_mul(1024 * 1024)
                    .with_context(|| format!("--script-memory-limit-mb {mb} is too large"))
            })
            .transpose()
    }

    fn script_factory(&self) -> Result<QuickJsFactory> {
        let memory_limit = self.script_memory_limit()?;
        let caps = HostCapabilities::from_current(Duration::from_secs(self.http_timeout_secs))
            .context("failed to set up script host capabilities")?;
        let factory = QuickJsFactory::new(caps);
        Ok(match memory_limit {
            Some(bytes) => factory.with_memory_limit(bytes),
            None => factory,
        })
    }
}

/// Run the node until SIGINT/SIGTERM
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.node_config();
    config.validate().context("invalid node configuration")?;

    let shutdown = install_shutdown_handler().context("failed to install signal handlers")?;
    let factory = cli.script_factory()?;

    let bus_shutdown = CancellationToken::new();
    let (bus, inbound, event_loop) =
        MqttBus::connect(cli.mqtt_settings(), config.node_topic(), bus_shutdown.clone());
    let bus = Arc::new(bus);

    let node = Node::new(config, Arc::new(factory), bus.clone())?;
    let result = node.run(inbound, shutdown).await;

    if let Err(e) = bus.close() {
        tracing::warn!(error = %e, "Failed to queue MQTT disconnect");
    }
    match tokio::time::timeout(BUS_FLUSH_TIMEOUT, event_loop).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "MQTT event loop panicked"),
        Err(_) => tracing::warn!("MQTT traffic not flushed before exit"),
    }
    bus_shutdown.cancel();

    result.context("node stopped with an error")
}
