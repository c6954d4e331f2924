//! Outbound status and membership envelopes

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// Periodic status update
pub const ACTION_NODE_UPDATE: &str = "node_update";

/// Node announces itself to its group
pub const ACTION_ADD_NODE: &str = "add_node";

/// Node leaves its group
pub const ACTION_REMOVE_NODE: &str = "remove_node";

/// Health indicator carried on every status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeHealth {
    /// Node is able to run sessions
    Healthy,
    /// The most recent session ended in failure
    Degraded,
}

/// Status message published to the group topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Always `node_update`
    pub action: String,

    /// Emission time (unix seconds)
    pub timestamp: i64,

    /// This worker's identity
    pub node_id: String,

    /// Health indicator
    pub node_status: NodeHealth,

    /// Whether a session is running or draining
    #[serde(rename = "isTestActive")]
    pub is_test_active: bool,

    /// Session the carried results (or error) belong to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_test_id: Option<String>,

    /// base64 of the JSON array of result records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_test_results: Option<String>,

    /// Why the session ended early, reported once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_test_error: Option<String>,
}

impl StatusMessage {
    /// Health-only status message
    pub fn new(node_id: impl Into<String>, health: NodeHealth, is_test_active: bool) -> Self {
        Self {
            action: ACTION_NODE_UPDATE.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            node_id: node_id.into(),
            node_status: health,
            is_test_active,
            load_test_id: None,
            load_test_results: None,
            load_test_error: None,
        }
    }

    /// Attach a batch of results for a session
    pub fn with_results(
        mut self,
        session_id: impl Into<String>,
        records: &[String],
    ) -> NodeResult<Self> {
        self.load_test_id = Some(session_id.into());
        self.load_test_results = Some(encode_results(records)?);
        Ok(self)
    }

    /// Attach a session failure
    pub fn with_error(mut self, session_id: impl Into<String>, error: impl Into<String>) -> Self {
        self.load_test_id = Some(session_id.into());
        self.load_test_error = Some(error.into());
        self
    }

    /// Decode the carried results, if any
    pub fn decode_results(&self) -> NodeResult<Option<Vec<String>>> {
        self.load_test_results
            .as_deref()
            .map(decode_results)
            .transpose()
    }

    /// Serialize for the transport
    pub fn to_bytes(&self) -> NodeResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Group membership announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    /// `add_node` or `remove_node`
    pub action: String,

    /// This worker's identity
    pub node_id: String,

    /// Emission time (unix seconds)
    pub timestamp: i64,
}

impl Announcement {
    /// Join announcement
    pub fn join(node_id: impl Into<String>) -> Self {
        Self::new(ACTION_ADD_NODE, node_id)
    }

    /// Leave announcement
    pub fn leave(node_id: impl Into<String>) -> Self {
        Self::new(ACTION_REMOVE_NODE, node_id)
    }

    fn new(action: &str, node_id: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            node_id: node_id.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Serialize for the transport
    pub fn to_bytes(&self) -> NodeResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Encode result records as base64 of a JSON array
pub fn encode_results(records: &[String]) -> NodeResult<String> {
    let json = serde_json::to_vec(records)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Inverse of [`encode_results`]
pub fn decode_results(encoded: &str) -> NodeResult<Vec<String>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| NodeError::Decode(format!("invalid base64: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}
