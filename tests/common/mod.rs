#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use embassy_time::Duration;
use mqtt_switchboard::{
    BackendError, BackendResult, Capabilities, ClientConfig, LastWill, Message, MessageSink,
    MqttBackend, QoS,
};

/// Everything a [`MockBackend`] saw, plus the knobs that make it fail.
#[derive(Default)]
pub struct ProbeState {
    pub calls: Vec<String>,
    pub connected: bool,
    pub published: Vec<(String, Vec<u8>, QoS, bool)>,
    pub subscriptions: Vec<(String, QoS)>,
    pub inbound: VecDeque<(String, Vec<u8>)>,
    pub callback_installed: Option<bool>,
    pub will: Option<LastWill>,
    pub fail_init: Option<BackendError>,
    pub fail_connect: Option<BackendError>,
    pub fail_disconnect: Option<BackendError>,
    pub fail_publish: Option<BackendError>,
    pub fail_callback: Option<BackendError>,
    /// What the backend reports through `last_error` after a failure.
    pub error_text: &'static str,
}

/// Shared handle onto a mock backend's state, kept by the test after the
/// backend itself moved into the registry.
#[derive(Clone, Default)]
pub struct Probe(Arc<Mutex<ProbeState>>);

impl Probe {
    pub fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.0.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn called(&self, op: &str) -> bool {
        self.state().calls.iter().any(|c| c == op)
    }

    pub fn count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == op).count()
    }
}

pub struct MockBackend {
    capabilities: Capabilities,
    version: &'static str,
    probe: Probe,
    last_error: String,
}

impl MockBackend {
    pub fn new(capabilities: Capabilities) -> (Box<dyn MqttBackend>, Probe) {
        Self::versioned(capabilities, "1.0")
    }

    pub fn versioned(
        capabilities: Capabilities,
        version: &'static str,
    ) -> (Box<dyn MqttBackend>, Probe) {
        let probe = Probe::default();
        let backend = MockBackend {
            capabilities,
            version,
            probe: probe.clone(),
            last_error: String::new(),
        };
        (Box::new(backend), probe)
    }
}

fn record<'a>(probe: &'a Probe, op: &str) -> MutexGuard<'a, ProbeState> {
    let mut state = probe.state();
    state.calls.push(op.to_owned());
    state
}

/// Fails with `failure` when set, copying the scripted error text.
fn outcome(
    last_error: &mut String,
    state: &ProbeState,
    failure: Option<BackendError>,
) -> BackendResult {
    last_error.clear();
    match failure {
        Some(err) => {
            last_error.push_str(state.error_text);
            Err(err)
        }
        None => Ok(()),
    }
}

/// Capabilities of a backend that implements the whole contract except a
/// native yield and reconnect.
pub fn full() -> Capabilities {
    Capabilities::REQUIRED
        | Capabilities::INIT
        | Capabilities::CLEANUP
        | Capabilities::LOOP
        | Capabilities::STATUS
        | Capabilities::LAST_ERROR
        | Capabilities::WILL
        | Capabilities::CALLBACK
}

impl MqttBackend for MockBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn version(&self) -> &str {
        self.version
    }

    fn init(&mut self, _config: &ClientConfig) -> BackendResult {
        let state = record(&self.probe, "init");
        outcome(&mut self.last_error, &state, state.fail_init)
    }

    fn cleanup(&mut self) {
        let mut state = record(&self.probe, "cleanup");
        state.connected = false;
    }

    fn connect(&mut self) -> BackendResult {
        let mut state = record(&self.probe, "connect");
        outcome(&mut self.last_error, &state, state.fail_connect)?;
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> BackendResult {
        let mut state = record(&self.probe, "disconnect");
        state.connected = false;
        outcome(&mut self.last_error, &state, state.fail_disconnect)
    }

    fn is_connected(&self) -> bool {
        self.probe.state().connected
    }

    fn reconnect(&mut self) -> BackendResult {
        let mut state = record(&self.probe, "reconnect");
        state.connected = true;
        Ok(())
    }

    fn publish(&mut self, message: &Message<'_>) -> BackendResult {
        let mut state = record(&self.probe, "publish");
        outcome(&mut self.last_error, &state, state.fail_publish)?;
        state.published.push((
            message.topic.to_owned(),
            message.payload.to_vec(),
            message.qos,
            message.retained,
        ));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> BackendResult {
        let mut state = record(&self.probe, "subscribe");
        state.subscriptions.push((topic.to_owned(), qos));
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> BackendResult {
        let mut state = record(&self.probe, "unsubscribe");
        state.subscriptions.retain(|(t, _)| t != topic);
        Ok(())
    }

    fn run_loop(&mut self, _timeout: Duration, sink: &mut dyn MessageSink) -> BackendResult {
        let pending: Vec<_> = {
            let mut state = record(&self.probe, "loop");
            state.inbound.drain(..).collect()
        };
        for (topic, payload) in pending {
            sink.on_message(&topic, &payload);
        }
        Ok(())
    }

    fn yield_now(&mut self, _timeout: Duration, _sink: &mut dyn MessageSink) -> BackendResult {
        record(&self.probe, "yield");
        Ok(())
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn set_will(&mut self, will: &LastWill) -> BackendResult {
        let mut state = record(&self.probe, "set_will");
        state.will = Some(will.clone());
        Ok(())
    }

    fn clear_will(&mut self) -> BackendResult {
        let mut state = record(&self.probe, "clear_will");
        state.will = None;
        Ok(())
    }

    fn set_callback(&mut self, installed: bool) -> BackendResult {
        let mut state = record(&self.probe, "set_callback");
        outcome(&mut self.last_error, &state, state.fail_callback)?;
        state.callback_installed = Some(installed);
        Ok(())
    }
}

pub fn config() -> ClientConfig {
    mqtt_switchboard::create_default_config("broker.local", 1883, "test-client")
}
