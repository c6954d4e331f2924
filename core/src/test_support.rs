//! Mocks shared by the engine's test modules

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::status::StatusMessage;
use crate::traits::{Bus, BusError, ScriptError, ScriptFactory, ScriptInstance};

// ============================================================================
// Mock Script Factory
// ============================================================================

/// Which invocations fail
#[derive(Debug, Clone)]
pub(crate) enum FailMode {
    Never,
    Always,
    /// Fail the nth invocation across the whole factory (0-based)
    OnCall(usize),
    /// Fail every invocation on these slots
    Slots(HashSet<usize>),
}

/// Instrumentation shared by every instance a factory creates
#[derive(Default)]
pub(crate) struct Probe {
    pub loads: AtomicUsize,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub max_slot_overlap: AtomicUsize,
    per_slot: Mutex<HashMap<usize, Arc<AtomicUsize>>>,
}

impl Probe {
    fn slot_counter(&self, slot: usize) -> Arc<AtomicUsize> {
        Arc::clone(self.per_slot.lock().entry(slot).or_default())
    }
}

pub(crate) struct MockScriptFactory {
    output: Option<String>,
    delay: Option<Duration>,
    fail_mode: FailMode,
    fail_load_slot: Option<usize>,
    pub probe: Arc<Probe>,
}

impl MockScriptFactory {
    /// Every invocation returns `output`
    pub fn constant(output: &str) -> Self {
        Self {
            output: Some(output.to_string()),
            delay: None,
            fail_mode: FailMode::Never,
            fail_load_slot: None,
            probe: Arc::new(Probe::default()),
        }
    }

    /// Every invocation returns a unique `"{slot}:{call}"` record
    pub fn numbered() -> Self {
        Self {
            output: None,
            ..Self::constant("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_fail_mode(mut self, mode: FailMode) -> Self {
        self.fail_mode = mode;
        self
    }

    pub fn with_fail_load_slot(mut self, slot: usize) -> Self {
        self.fail_load_slot = Some(slot);
        self
    }
}

impl ScriptFactory for MockScriptFactory {
    fn backend_name(&self) -> &str {
        "mock"
    }

    fn load(&self, slot: usize, _source: &str) -> Result<Box<dyn ScriptInstance>, ScriptError> {
        if self.fail_load_slot == Some(slot) {
            return Err(ScriptError::Compile(format!("slot {slot} refused to load")));
        }
        self.probe.loads.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockInstance {
            slot,
            calls: 0,
            output: self.output.clone(),
            delay: self.delay,
            fail_mode: self.fail_mode.clone(),
            entered: self.probe.slot_counter(slot),
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct MockInstance {
    slot: usize,
    calls: usize,
    output: Option<String>,
    delay: Option<Duration>,
    fail_mode: FailMode,
    entered: Arc<AtomicUsize>,
    probe: Arc<Probe>,
}

impl ScriptInstance for MockInstance {
    fn invoke(&mut self) -> Result<String, ScriptError> {
        let global_call = self.probe.calls.fetch_add(1, Ordering::SeqCst);

        let overlap = self.entered.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe
            .max_slot_overlap
            .fetch_max(overlap, Ordering::SeqCst);
        let in_flight = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.entered.fetch_sub(1, Ordering::SeqCst);

        let call = self.calls;
        self.calls += 1;

        let fail = match &self.fail_mode {
            FailMode::Never => false,
            FailMode::Always => true,
            FailMode::OnCall(n) => global_call == *n,
            FailMode::Slots(slots) => slots.contains(&self.slot),
        };
        if fail {
            return Err(ScriptError::Runtime(format!(
                "simulated failure on slot {}",
                self.slot
            )));
        }

        Ok(match &self.output {
            Some(output) => output.clone(),
            None => format!("{}:{}", self.slot, call),
        })
    }
}

// ============================================================================
// Recording Bus
// ============================================================================

#[derive(Default)]
pub(crate) struct RecordingBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
    stalled: AtomicBool,
}

impl RecordingBus {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every publish hang forever, like a broker that stopped reading
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published
            .lock()
            .iter()
            .map(|(topic, payload)| {
                (
                    topic.clone(),
                    serde_json::from_slice(payload).expect("published payload is JSON"),
                )
            })
            .collect()
    }

    /// Status messages in publish order
    pub fn status_messages(&self) -> Vec<StatusMessage> {
        self.published()
            .into_iter()
            .filter(|(_, value)| value["action"] == "node_update")
            .map(|(_, value)| serde_json::from_value(value).expect("valid status message"))
            .collect()
    }

    /// Every result record across all published status messages
    pub fn reported_records(&self) -> Vec<String> {
        self.status_messages()
            .iter()
            .filter_map(|msg| msg.decode_results().expect("decodable results"))
            .flatten()
            .collect()
    }

    pub fn actions(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .map(|(_, value)| value["action"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl Bus for RecordingBus {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Publish("simulated outage".into()));
        }
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }
}

/// Script payload as the coordinator would send it
pub(crate) fn encoded_script(source: &str) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(source)
}

/// JSON `start_loadtest` envelope
pub(crate) fn start_payload(session_id: &str, tps: usize, duration_secs: f64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "action": "start_loadtest",
        "load_test_id": session_id,
        "tps": tps,
        "duration": duration_secs,
        "plugin_data": encoded_script("export default () => 'ok';"),
    }))
    .expect("serializable envelope")
}

/// JSON `stop_loadtest` envelope
pub(crate) fn stop_payload() -> Vec<u8> {
    br#"{"action":"stop_loadtest"}"#.to_vec()
}
