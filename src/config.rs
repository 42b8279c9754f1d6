//! Runtime configuration for chat-engine.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! [`EngineConfiguration`] is the raw, caller-supplied engine config; it only
//! becomes an [`AcceptedConfig`] after passing validation.

use std::fmt;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments for the demo driver.
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-engine", about = "Stream a prompt through the chat engine facade")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "engine.json")]
    pub config: PathBuf,

    /// Prompt to generate a response for.
    #[arg(short, long, default_value = "Hello there")]
    pub prompt: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Print the native debug history before shutting down.
    #[arg(long)]
    pub debug_history: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine configuration passed to `initialize`.
    pub engine: EngineConfiguration,

    /// Pacing of the bundled simulated engine.
    pub simulation: SimulationConfig,
}

/// Inference backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    Cpu = 0,
    Gpu = 1,
}

impl Backend {
    /// Map the native integer code to a backend.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Backend::Cpu),
            1 => Some(Backend::Gpu),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => f.write_str("CPU"),
            Backend::Gpu => f.write_str("GPU"),
        }
    }
}

/// Engine configuration as supplied by the caller.
///
/// Numeric fields are wider than the native types; range checks happen in
/// [`crate::validation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfiguration {
    /// Path to the model file.
    pub model_path: String,

    /// Backend code: 0 = CPU, 1 = GPU.
    #[serde(alias = "backendType")]
    pub backend: i32,

    /// Maximum number of tokens to generate.
    pub max_tokens: i64,

    /// Sampling temperature, 0.0 to 2.0.
    pub temperature: f64,

    /// Number of inference threads.
    #[serde(alias = "numThreads")]
    pub thread_count: i64,
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        Self {
            model_path: "model.litertlm".to_string(),
            backend: Backend::Cpu.code(),
            max_tokens: 1024,
            temperature: 0.7,
            thread_count: 4,
        }
    }
}

/// A validated engine configuration. Only this form reaches the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedConfig {
    pub model_path: String,
    pub backend: Backend,
    pub max_tokens: u32,
    pub temperature: f32,
    pub thread_count: u32,
}

/// Pacing knobs for [`crate::bridge::SimulatedEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Delay before the first chunk, emulating prompt prefill.
    pub prefill_delay_ms: u64,

    /// Delay between streamed chunks.
    pub chunk_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            prefill_delay_ms: 20,
            chunk_delay_ms: 15,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
