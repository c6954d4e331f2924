//! Inbound command envelopes
//!
//! Commands arrive on the node-scoped topic as JSON maps keyed by `action`.
//! Decoding validates every field a `start_loadtest` needs before anything
//! touches session state, so a malformed command can never leave the node
//! half-started.

use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;

use crate::config::MAX_SESSION_DURATION;
use crate::error::{NodeError, NodeResult};

/// Start a load-test session
pub const ACTION_START_LOADTEST: &str = "start_loadtest";

/// Stop the active load-test session
pub const ACTION_STOP_LOADTEST: &str = "stop_loadtest";

/// Coordinator acknowledged this node joining the group
pub const ACTION_ADD_NODE_SUCCESS: &str = "add_node_success";

/// A decoded inbound command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a new session
    Start(StartCommand),

    /// Stop the active session
    Stop {
        /// Session the coordinator meant to stop, if it said
        session_id: Option<String>,
    },

    /// Coordinator accepted this node into the group
    JoinAcknowledged,

    /// Action this node does not handle
    Unknown(String),
}

/// Parameters of an accepted `start_loadtest`
#[derive(Clone, PartialEq)]
pub struct StartCommand {
    /// Session identifier
    pub session_id: String,

    /// Invocations per tick
    pub throughput: usize,

    /// Session length
    pub duration: Duration,

    /// Decoded script source
    pub script: String,
}

impl std::fmt::Debug for StartCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartCommand")
            .field("session_id", &self.session_id)
            .field("throughput", &self.throughput)
            .field("duration", &self.duration)
            .field("script_bytes", &self.script.len())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    action: String,
    #[serde(default)]
    load_test_id: Option<String>,
    #[serde(default)]
    tps: Option<f64>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    plugin_data: Option<String>,
}

impl Command {
    /// Decode and validate a transport payload
    ///
    /// `max_throughput` bounds the `tps` a start command may request.
    pub fn decode(payload: &[u8], max_throughput: usize) -> NodeResult<Self> {
        let raw: RawEnvelope = serde_json::from_slice(payload)
            .map_err(|e| NodeError::invalid_command(format!("malformed envelope: {e}")))?;

        match raw.action.as_str() {
            ACTION_START_LOADTEST => {
                StartCommand::from_raw(raw, max_throughput).map(Command::Start)
            }
            ACTION_STOP_LOADTEST => Ok(Command::Stop {
                session_id: raw.load_test_id,
            }),
            ACTION_ADD_NODE_SUCCESS => Ok(Command::JoinAcknowledged),
            _ => Ok(Command::Unknown(raw.action)),
        }
    }

    /// The wire action name
    pub fn action(&self) -> &str {
        match self {
            Command::Start(_) => ACTION_START_LOADTEST,
            Command::Stop { .. } => ACTION_STOP_LOADTEST,
            Command::JoinAcknowledged => ACTION_ADD_NODE_SUCCESS,
            Command::Unknown(action) => action,
        }
    }
}

impl StartCommand {
    fn from_raw(raw: RawEnvelope, max_throughput: usize) -> NodeResult<Self> {
        let session_id = raw
            .load_test_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| NodeError::invalid_command("load_test_id is required"))?;

        let tps = raw
            .tps
            .ok_or_else(|| NodeError::invalid_command("tps is required"))?;
        if !tps.is_finite() || tps < 1.0 || tps.fract() != 0.0 {
            return Err(NodeError::invalid_command(format!(
                "tps must be a whole number >= 1, got {tps}"
            )));
        }
        if tps > max_throughput as f64 {
            return Err(NodeError::invalid_command(format!(
                "tps {tps} exceeds node limit {max_throughput}"
            )));
        }

        let secs = raw
            .duration
            .ok_or_else(|| NodeError::invalid_command("duration is required"))?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(NodeError::invalid_command(format!(
                "duration must be a positive number of seconds, got {secs}"
            )));
        }
        if secs > MAX_SESSION_DURATION.as_secs_f64() {
            return Err(NodeError::invalid_command(format!(
                "duration {secs}s exceeds limit of {}s",
                MAX_SESSION_DURATION.as_secs()
            )));
        }
        let duration = Duration::try_from_secs_f64(secs)
            .map_err(|e| NodeError::invalid_command(format!("duration out of range: {e}")))?;

        let encoded = raw
            .plugin_data
            .ok_or_else(|| NodeError::invalid_command("plugin_data is required"))?;
        let script = decode_script(&encoded)?;

        Ok(Self {
            session_id,
            throughput: tps as usize,
            duration,
            script,
        })
    }
}

/// Decode base64 script source into UTF-8 text
pub fn decode_script(encoded: &str) -> NodeResult<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| NodeError::invalid_command(format!("plugin_data is not valid base64: {e}")))?;
    let script = String::from_utf8(bytes)
        .map_err(|_| NodeError::invalid_command("plugin_data is not UTF-8 source"))?;
    if script.trim().is_empty() {
        return Err(NodeError::invalid_command("plugin_data is empty"));
    }
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(source: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(source)
    }

    fn start_payload(tps: serde_json::Value, duration: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": "start_loadtest",
            "load_test_id": "lt-1",
            "tps": tps,
            "duration": duration,
            "plugin_data": encode("export default () => 'ok';"),
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_start() {
        let cmd = Command::decode(&start_payload(json!(5), json!(10)), 100).unwrap();
        match cmd {
            Command::Start(start) => {
                assert_eq!(start.session_id, "lt-1");
                assert_eq!(start.throughput, 5);
                assert_eq!(start.duration, Duration::from_secs(10));
                assert_eq!(start.script, "export default () => 'ok';");
            }
            other => panic!("Expected Start, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_start_fractional_duration() {
        let cmd = Command::decode(&start_payload(json!(1), json!(1.5)), 100).unwrap();
        let Command::Start(start) = cmd else {
            panic!("Expected Start");
        };
        assert_eq!(start.duration, Duration::from_millis(1500));
    }

    #[test]
    fn test_decode_stop() {
        let payload = br#"{"action":"stop_loadtest"}"#;
        assert_eq!(
            Command::decode(payload, 10).unwrap(),
            Command::Stop { session_id: None }
        );

        let payload = br#"{"action":"stop_loadtest","load_test_id":"lt-9"}"#;
        assert_eq!(
            Command::decode(payload, 10).unwrap(),
            Command::Stop {
                session_id: Some("lt-9".into())
            }
        );
    }

    #[test]
    fn test_decode_join_ack_and_unknown() {
        let payload = br#"{"action":"add_node_success","node_id":"n1"}"#;
        assert_eq!(
            Command::decode(payload, 10).unwrap(),
            Command::JoinAcknowledged
        );

        let payload = br#"{"action":"reboot"}"#;
        let cmd = Command::decode(payload, 10).unwrap();
        assert_eq!(cmd, Command::Unknown("reboot".into()));
        assert_eq!(cmd.action(), "reboot");
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = Command::decode(b"not json", 10).unwrap_err();
        assert!(matches!(err, NodeError::InvalidCommand(_)));

        let err = Command::decode(br#"{"load_test_id":"x"}"#, 10).unwrap_err();
        assert!(matches!(err, NodeError::InvalidCommand(_)));
    }

    #[test]
    fn test_decode_rejects_mistyped_fields() {
        let payload = serde_json::to_vec(&json!({
            "action": "start_loadtest",
            "load_test_id": "lt-1",
            "tps": "five",
            "duration": 10,
            "plugin_data": encode("x"),
        }))
        .unwrap();
        assert!(Command::decode(&payload, 10).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_throughput() {
        for tps in [json!(0), json!(-3), json!(2.5)] {
            let err = Command::decode(&start_payload(tps.clone(), json!(10)), 100).unwrap_err();
            assert!(err.to_string().contains("tps"), "tps {tps} accepted");
        }

        let err = Command::decode(&start_payload(json!(101), json!(10)), 100).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_decode_rejects_bad_duration() {
        for duration in [json!(0), json!(-1)] {
            assert!(Command::decode(&start_payload(json!(1), duration), 100).is_err());
        }
    }

    #[test]
    fn test_decode_rejects_oversized_duration() {
        for duration in [json!(1e19), json!(MAX_SESSION_DURATION.as_secs() + 1)] {
            let err = Command::decode(&start_payload(json!(1), duration.clone()), 100).unwrap_err();
            assert!(matches!(err, NodeError::InvalidCommand(_)), "duration {duration} accepted");
            assert!(err.to_string().contains("exceeds"));
        }

        let max = json!(MAX_SESSION_DURATION.as_secs());
        let cmd = Command::decode(&start_payload(json!(1), max), 100).unwrap();
        let Command::Start(start) = cmd else {
            panic!("Expected Start");
        };
        assert_eq!(start.duration, MAX_SESSION_DURATION);
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        for field in ["load_test_id", "tps", "duration", "plugin_data"] {
            let mut value = json!({
                "action": "start_loadtest",
                "load_test_id": "lt-1",
                "tps": 2,
                "duration": 3,
                "plugin_data": encode("x"),
            });
            value.as_object_mut().unwrap().remove(field);
            let err = Command::decode(&serde_json::to_vec(&value).unwrap(), 10).unwrap_err();
            assert!(err.to_string().contains(field), "missing {field} accepted");
        }
    }

    #[test]
    fn test_decode_script_errors() {
        assert!(decode_script("%%%").is_err());
        assert!(decode_script(&encode("   ")).is_err());
        let invalid_utf8 = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe]);
        assert!(decode_script(&invalid_utf8).is_err());
    }

    #[test]
    fn test_start_command_debug_hides_source() {
        let start = StartCommand {
            session_id: "lt".into(),
            throughput: 1,
            duration: Duration::from_secs(1),
            script: "secret-token".into(),
        };
        let debug = format!("{start:?}");
        assert!(debug.contains("script_bytes"));
        assert!(!debug.contains("secret-token"));
    }
}
