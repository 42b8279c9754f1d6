//! Input validation performed before any boundary call.
//!
//! All rules run on every call so a single round reports every problem at
//! once. Nothing here touches the bridge.

use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};
use crate::config::{AcceptedConfig, Backend, EngineConfiguration};

/// Highest count the native ABI can take (C `int`).
const MAX_NATIVE_COUNT: i64 = i32::MAX as i64;

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Offending field name.
    pub field: &'static str,

    /// Why the value was rejected.
    pub message: String,

    /// The offending value, for diagnostics.
    pub value: Value,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>, value: Value) -> Self {
        Self {
            field,
            message: message.into(),
            value,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found in one validation round, rendered as one message.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|e| e.field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Check an engine configuration. An empty list means valid.
pub fn validate_configuration(config: &EngineConfiguration) -> Vec<FieldError> {
    match accept_configuration(config) {
        Ok(_) => Vec::new(),
        Err(ValidationErrors(errors)) => errors,
    }
}

/// Check generation input. Whitespace-only text is accepted here.
pub fn validate_generation_text(text: &str) -> Vec<FieldError> {
    if text.is_empty() {
        vec![FieldError::new(
            "text",
            "Input text must be a non-empty string",
            json!(text),
        )]
    } else {
        Vec::new()
    }
}

/// Validate and convert into the typed form handed to the bridge.
pub fn accept_configuration(
    config: &EngineConfiguration,
) -> Result<AcceptedConfig, ValidationErrors> {
    let mut errors = Vec::new();

    if config.model_path.is_empty() {
        errors.push(FieldError::new(
            "modelPath",
            "Model path must be a non-empty string",
            json!(config.model_path),
        ));
    }

    let backend = Backend::from_code(config.backend);
    if backend.is_none() {
        errors.push(FieldError::new(
            "backend",
            "Backend must be 0 (CPU) or 1 (GPU)",
            json!(config.backend),
        ));
    }

    let max_tokens = positive_count(config.max_tokens);
    if let Err(reason) = &max_tokens {
        errors.push(FieldError::new(
            "maxTokens",
            format!("Max tokens {reason}"),
            json!(config.max_tokens),
        ));
    }

    let temperature = config.temperature;
    if !(temperature.is_finite() && (0.0..=2.0).contains(&temperature)) {
        errors.push(FieldError::new(
            "temperature",
            "Temperature must be between 0 and 2",
            json!(temperature),
        ));
    }

    let thread_count = positive_count(config.thread_count);
    if let Err(reason) = &thread_count {
        errors.push(FieldError::new(
            "threadCount",
            format!("Thread count {reason}"),
            json!(config.thread_count),
        ));
    }

    match (backend, max_tokens, thread_count) {
        (Some(backend), Ok(max_tokens), Ok(thread_count)) if errors.is_empty() => {
            Ok(AcceptedConfig {
                model_path: config.model_path.clone(),
                backend,
                max_tokens,
                temperature: temperature as f32,
                thread_count,
            })
        }
        _ => Err(ValidationErrors(errors)),
    }
}

fn positive_count(value: i64) -> Result<u32, String> {
    if value <= 0 {
        Err("must be a positive number".to_string())
    } else if value > MAX_NATIVE_COUNT {
        Err(format!("must not exceed {MAX_NATIVE_COUNT}"))
    } else {
        // Bounded by i32::MAX above.
        Ok(value as u32)
    }
}
