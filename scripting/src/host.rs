//! Host capabilities exposed to scripts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rquickjs::{Ctx, Function};
use serde::Serialize;
use tokio::runtime::Handle;

use dlt_node_core::ScriptError;

/// Default timeout for a single HTTP helper call
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed capability bundle shared by every script instance
///
/// Scripts run on blocking threads; HTTP helpers drive the shared client
/// to completion on `handle` from there.
#[derive(Clone)]
pub struct HostCapabilities {
    client: reqwest::Client,
    handle: Handle,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpReply {
    status: u16,
    body: String,
    latency_ms: f64,
}

#[derive(Serialize)]
struct HttpFailure {
    error: String,
}

impl HostCapabilities {
    /// Build capabilities with a fresh HTTP client
    pub fn new(handle: Handle, http_timeout: Duration) -> Result<Self, ScriptError> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| ScriptError::Engine(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, handle))
    }

    /// Build capabilities from an existing client
    pub fn with_client(client: reqwest::Client, handle: Handle) -> Self {
        Self { client, handle }
    }

    /// Build capabilities on the current tokio runtime
    pub fn from_current(http_timeout: Duration) -> Result<Self, ScriptError> {
        let handle = Handle::try_current()
            .map_err(|e| ScriptError::Engine(format!("no tokio runtime: {e}")))?;
        Self::new(handle, http_timeout)
    }

    /// Perform one HTTP request, answering with a JSON reply for the prelude
    ///
    /// Must not be called from an async worker thread.
    pub(crate) fn http(&self, method: &str, url: &str, body: &str, headers_json: &str) -> String {
        let reply = match self.request(method, url, body, headers_json) {
            Ok(reply) => serde_json::to_string(&reply),
            Err(error) => serde_json::to_string(&HttpFailure { error }),
        };
        reply.unwrap_or_else(|e| format!(r#"{{"error":"unencodable reply: {e}"}}"#))
    }

    fn request(
        &self,
        method: &str,
        url: &str,
        body: &str,
        headers_json: &str,
    ) -> Result<HttpReply, String> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| format!("invalid method {method}: {e}"))?;
        let headers: HashMap<String, String> = if headers_json.is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(headers_json)
                .map_err(|e| format!("headers must be a string map: {e}"))?
        };

        let mut request = self.client.request(method.clone(), url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            request = request.body(body.to_string());
        }

        let started = Instant::now();
        let (status, body) = self.handle.block_on(async move {
            let response = request.send().await.map_err(|e| format!("{method} {url}: {e}"))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| format!("failed to read response body: {e}"))?;
            Ok::<_, String>((status, body))
        })?;

        Ok(HttpReply {
            status,
            body,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

impl std::fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCapabilities").finish_non_exhaustive()
    }
}

/// Integer in `[min, max)`, or `min` when the range is empty
fn random_between(min: f64, max: f64) -> f64 {
    let (lo, hi) = (min.floor() as i64, max.floor() as i64);
    if hi <= lo {
        return lo as f64;
    }
    rand::rng().random_range(lo..hi) as f64
}

/// Install the `__host_*` functions the prelude builds on
pub(crate) fn install(
    ctx: &Ctx<'_>,
    slot: usize,
    caps: &Arc<HostCapabilities>,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    globals.set(
        "__host_log",
        Function::new(ctx.clone(), move |msg: String| {
            tracing::info!(slot, "script: {}", msg);
        })?,
    )?;

    globals.set("__host_random", Function::new(ctx.clone(), random_between)?)?;

    globals.set(
        "__host_now_ms",
        Function::new(ctx.clone(), || chrono::Utc::now().timestamp_millis() as f64)?,
    )?;

    let caps = Arc::clone(caps);
    globals.set(
        "__host_http",
        Function::new(
            ctx.clone(),
            move |method: String, url: String, body: String, headers: String| {
                tracing::trace!(slot, method = %method, url = %url, "Script HTTP call");
                caps.http(&method, &url, &body, &headers)
            },
        )?,
    )?;

    Ok(())
}
