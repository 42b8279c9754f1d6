//! Shared fixtures: a scripted bridge and an event recorder.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use chat_engine::config::AcceptedConfig;
use chat_engine::types::GenerationRequest;
use chat_engine::{
    BridgeError, ChatEngine, EngineConfiguration, EngineEvent, EventName, EventSink,
    GenerationMetrics, NativeBridge,
};

/// Bridge driven entirely by the test: records every call, fails the
/// operations it is told to, and lets the test push stream events.
#[derive(Default)]
pub struct ScriptedBridge {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    sink: Mutex<Option<EventSink>>,
    create_gate: Mutex<Option<Arc<Notify>>>,
    /// Answer for `is_generating`.
    pub native_generating: AtomicBool,
}

impl ScriptedBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `op` (bridge operation name, e.g. `"clearHistory"`) fail.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// Hold `create_engine` until the returned handle is notified.
    pub fn gate_create(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    fn record(&self, op: &'static str) -> Result<(), BridgeError> {
        self.calls.lock().unwrap().push(op);
        if self.failing.lock().unwrap().contains(op) {
            Err(BridgeError::rejected("SCRIPTED", format!("{op} failed")))
        } else {
            Ok(())
        }
    }

    fn sink(&self) -> EventSink {
        self.sink
            .lock()
            .unwrap()
            .clone()
            .expect("engine was never created")
    }

    pub fn partial(&self, text: &str) {
        self.sink().response(text, false);
    }

    pub fn finish(&self, text: &str) {
        self.sink().response(text, true);
    }

    pub fn metrics(&self, metrics: GenerationMetrics) {
        self.sink().metrics(metrics);
    }

    pub fn failure(&self, message: &str) {
        self.sink().failure(message);
    }
}

#[async_trait]
impl NativeBridge for ScriptedBridge {
    async fn create_engine(
        &self,
        _config: &AcceptedConfig,
        sink: EventSink,
    ) -> Result<(), BridgeError> {
        self.record("createEngine")?;
        let gate = self.create_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn destroy_engine(&self) -> Result<(), BridgeError> {
        self.record("destroyEngine")
    }

    async fn is_ready(&self) -> Result<bool, BridgeError> {
        self.record("isReady").map(|_| true)
    }

    async fn generate_async(&self, _request: &GenerationRequest) -> Result<(), BridgeError> {
        self.record("generateAsync")
    }

    async fn stop_generation(&self) -> Result<(), BridgeError> {
        self.record("stopGeneration")
    }

    async fn is_generating(&self) -> Result<bool, BridgeError> {
        self.record("isGenerating")
            .map(|_| self.native_generating.load(Ordering::SeqCst))
    }

    async fn clear_history(&self) -> Result<(), BridgeError> {
        self.record("clearHistory")
    }

    async fn get_model_info(&self) -> Result<String, BridgeError> {
        self.record("getModelInfo").map(|_| "scripted model".to_string())
    }

    async fn get_debug_message(&self) -> Result<String, BridgeError> {
        self.record("getDebugMessage").map(|_| "last line".to_string())
    }

    async fn get_debug_history(&self) -> Result<String, BridgeError> {
        self.record("getDebugHistory").map(|_| "first line\nlast line".to_string())
    }

    async fn clear_debug_history(&self) -> Result<(), BridgeError> {
        self.record("clearDebugHistory")
    }

    async fn log_message(&self, _message: &str) -> Result<(), BridgeError> {
        self.record("logMessage")
    }

    async fn test_connectivity(&self) -> Result<i32, BridgeError> {
        self.record("testConnectivity").map(|_| 42)
    }
}

pub fn valid_config() -> EngineConfiguration {
    EngineConfiguration {
        model_path: "/models/test.litertlm".to_string(),
        backend: 0,
        max_tokens: 128,
        temperature: 0.7,
        thread_count: 2,
    }
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Subscribe to every event and render each one as a short string.
pub fn record_events(engine: &ChatEngine) -> EventLog {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    for name in EventName::ALL {
        let log = log.clone();
        engine.subscribe(name, move |event| {
            log.lock().unwrap().push(describe(event));
        });
    }
    log
}

pub fn describe(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Response(r) if r.is_final => format!("final:{}", r.accumulated_text),
        EngineEvent::Response(r) => format!("partial:{}", r.accumulated_text),
        EngineEvent::Metrics(m) => format!("metrics:{}", m.decode_tokens),
        EngineEvent::Error(e) => format!("error:{}", e.code),
        EngineEvent::Ready => "ready".to_string(),
        EngineEvent::Generating(flag) => format!("generating:{flag}"),
    }
}

pub fn take(log: &EventLog) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

/// An initialized engine over a fresh scripted bridge, with the `ready`
/// event already drained from the log.
pub async fn ready_engine() -> (ChatEngine, Arc<ScriptedBridge>, EventLog) {
    let bridge = ScriptedBridge::new();
    let engine = ChatEngine::new(bridge.clone());
    let log = record_events(&engine);
    engine.initialize(&valid_config()).await.unwrap();
    assert_eq!(take(&log), vec!["ready"]);
    (engine, bridge, log)
}
