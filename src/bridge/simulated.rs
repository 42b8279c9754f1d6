//! In-process stand-in for the native chat engine.
//!
//! Behaves like the real module from the facade's point of view: creation,
//! asynchronous word-by-word streaming from a background task, advisory
//! stop, conversation history and a debug log. The "model" just echoes the
//! prompt back, bounded by `max_tokens`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bridge::{BridgeError, EventSink, NativeBridge};
use crate::config::{AcceptedConfig, SimulationConfig};
use crate::types::{GenerationMetrics, GenerationRequest};

/// Value answered by the connectivity probe.
pub const CONNECTIVITY_PROBE: i32 = 42;

const DEBUG_HISTORY_LIMIT: usize = 256;

struct Loaded {
    config: AcceptedConfig,
    sink: EventSink,
}

struct Generation {
    stop: AtomicBool,
    done: AtomicBool,
}

#[derive(Default)]
struct NativeState {
    engine: Option<Loaded>,
    generation: Option<Arc<Generation>>,
    /// (prompt, reply) pairs.
    history: Vec<(String, String)>,
    debug_log: Vec<String>,
}

impl NativeState {
    fn log(&mut self, line: impl Into<String>) {
        self.debug_log.push(line.into());
        if self.debug_log.len() > DEBUG_HISTORY_LIMIT {
            let excess = self.debug_log.len() - DEBUG_HISTORY_LIMIT;
            self.debug_log.drain(..excess);
        }
    }

    fn loaded(&self) -> Result<&Loaded, BridgeError> {
        self.engine.as_ref().ok_or(BridgeError::NoEngine)
    }

    fn is_generating(&self) -> bool {
        self.generation
            .as_ref()
            .is_some_and(|g| !g.done.load(Ordering::Acquire))
    }
}

/// Simulated native engine.
pub struct SimulatedEngine {
    pacing: SimulationConfig,
    state: Arc<Mutex<NativeState>>,
}

impl SimulatedEngine {
    pub fn new(pacing: SimulationConfig) -> Self {
        Self {
            pacing,
            state: Arc::new(Mutex::new(NativeState::default())),
        }
    }

    /// No artificial delays; useful in tests.
    pub fn instant() -> Self {
        Self::new(SimulationConfig {
            prefill_delay_ms: 0,
            chunk_delay_ms: 0,
        })
    }

    /// Number of completed or in-flight turns remembered.
    pub fn history_len(&self) -> usize {
        self.state().history.len()
    }

    fn state(&self) -> MutexGuard<'_, NativeState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<NativeState>) -> MutexGuard<'_, NativeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rough prompt token estimate: ~1 token per 4 characters.
fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4).max(1) as u32
}

fn compose_reply(prompt: &str, turn: usize, max_tokens: u32) -> Vec<String> {
    format!("Turn {turn}: you said \"{}\"", prompt.trim())
        .split_whitespace()
        .take(max_tokens as usize)
        .map(str::to_string)
        .collect()
}

struct Job {
    words: Vec<String>,
    prompt: String,
    prompt_tokens: u32,
    prefill: Duration,
    chunk: Duration,
    sink: EventSink,
    generation: Arc<Generation>,
    state: Arc<Mutex<NativeState>>,
}

async fn run_generation(job: Job) {
    let started = Instant::now();
    tokio::time::sleep(job.prefill).await;
    let prefill = started.elapsed();

    let decode_started = Instant::now();
    let mut text = String::new();
    let mut produced = 0u32;

    for word in &job.words {
        if job.generation.stop.load(Ordering::Acquire) {
            debug!(produced, "Simulated generation interrupted");
            break;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(word);
        produced += 1;
        job.sink.response(text.clone(), false);
        tokio::time::sleep(job.chunk).await;
    }
    let decode = decode_started.elapsed();

    job.generation.done.store(true, Ordering::Release);
    {
        let mut state = lock(&job.state);
        if let Some(turn) = state.history.iter_mut().rev().find(|(p, _)| *p == job.prompt) {
            turn.1 = text.clone();
        }
        state.log(format!(
            "generation finished: {produced} tokens in {decode:?}"
        ));
    }

    // The native engine always closes a stream, even after a stop request.
    job.sink.response(text, true);
    job.sink.metrics(GenerationMetrics::from_timings(
        prefill,
        decode,
        job.prompt_tokens,
        produced,
    ));
}

#[async_trait]
impl NativeBridge for SimulatedEngine {
    async fn create_engine(
        &self,
        config: &AcceptedConfig,
        sink: EventSink,
    ) -> Result<(), BridgeError> {
        let mut state = self.state();
        if state.engine.is_some() {
            return Err(BridgeError::rejected(
                "ENGINE_EXISTS",
                "Engine already created",
            ));
        }

        state.log(format!(
            "createEngine model={} backend={} threads={}",
            config.model_path, config.backend, config.thread_count
        ));
        state.engine = Some(Loaded {
            config: config.clone(),
            sink,
        });
        info!(model = %config.model_path, backend = %config.backend, "Simulated engine created");
        Ok(())
    }

    async fn destroy_engine(&self) -> Result<(), BridgeError> {
        let mut state = self.state();
        state.engine.take().ok_or(BridgeError::NoEngine)?;
        if let Some(generation) = state.generation.take() {
            generation.stop.store(true, Ordering::Release);
        }
        state.log("destroyEngine");
        Ok(())
    }

    async fn is_ready(&self) -> Result<bool, BridgeError> {
        Ok(self.state().engine.is_some())
    }

    async fn generate_async(&self, request: &GenerationRequest) -> Result<(), BridgeError> {
        let mut state = self.state();
        let (config, sink) = {
            let loaded = state.loaded()?;
            (loaded.config.clone(), loaded.sink.clone())
        };
        if state.is_generating() {
            return Err(BridgeError::rejected(
                "BUSY",
                "A generation is already running",
            ));
        }

        state.history.push((request.text.clone(), String::new()));
        let turn = state.history.len();
        state.log(format!("generateAsync request={} turn={turn}", request.id));

        let generation = Arc::new(Generation {
            stop: AtomicBool::new(false),
            done: AtomicBool::new(false),
        });
        state.generation = Some(generation.clone());

        let job = Job {
            words: compose_reply(&request.text, turn, config.max_tokens),
            prompt: request.text.clone(),
            prompt_tokens: estimate_tokens(&request.text),
            prefill: Duration::from_millis(self.pacing.prefill_delay_ms),
            chunk: Duration::from_millis(self.pacing.chunk_delay_ms),
            sink,
            generation,
            state: self.state.clone(),
        };
        drop(state);

        tokio::spawn(run_generation(job));
        Ok(())
    }

    async fn stop_generation(&self) -> Result<(), BridgeError> {
        let mut state = self.state();
        if let Some(generation) = &state.generation {
            generation.stop.store(true, Ordering::Release);
        }
        state.log("stopGeneration");
        Ok(())
    }

    async fn is_generating(&self) -> Result<bool, BridgeError> {
        Ok(self.state().is_generating())
    }

    async fn clear_history(&self) -> Result<(), BridgeError> {
        let mut state = self.state();
        state.loaded()?;
        state.history.clear();
        state.log("clearHistory");
        Ok(())
    }

    async fn get_model_info(&self) -> Result<String, BridgeError> {
        let state = self.state();
        let config = &state.loaded()?.config;
        Ok(format!(
            "{} ({} backend, {} threads, max {} tokens, temperature {:.2})",
            config.model_path,
            config.backend,
            config.thread_count,
            config.max_tokens,
            config.temperature
        ))
    }

    async fn get_debug_message(&self) -> Result<String, BridgeError> {
        Ok(self.state().debug_log.last().cloned().unwrap_or_default())
    }

    async fn get_debug_history(&self) -> Result<String, BridgeError> {
        Ok(self.state().debug_log.join("\n"))
    }

    async fn clear_debug_history(&self) -> Result<(), BridgeError> {
        self.state().debug_log.clear();
        Ok(())
    }

    async fn log_message(&self, message: &str) -> Result<(), BridgeError> {
        self.state().log(format!("[host] {message}"));
        Ok(())
    }

    async fn test_connectivity(&self) -> Result<i32, BridgeError> {
        Ok(CONNECTIVITY_PROBE)
    }
}
