//! Domain error taxonomy.
//!
//! Every failure the facade reports, whether as a rejected operation or on
//! the `error` event channel, is a [`DomainError`] with a stable
//! [`ErrorCode`]. The underlying failure (a bridge rejection, a set of
//! validation errors) travels along as an opaque `cause`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Opaque underlying failure attached to a [`DomainError`].
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Stable, symbolic error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConfigurationInvalid,
    InputInvalid,
    AlreadyInitialized,
    NotInitialized,
    EngineDestroyed,
    GenerationInProgress,
    InitializationFailed,
    GenerationFailed,
    /// A boundary call failed for a reason the facade cannot classify.
    BridgeCallFailed,
    ConnectivityTestFailed,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ConfigurationInvalid => "CONFIGURATION_INVALID",
            ErrorCode::InputInvalid => "INPUT_INVALID",
            ErrorCode::AlreadyInitialized => "ALREADY_INITIALIZED",
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::EngineDestroyed => "ENGINE_DESTROYED",
            ErrorCode::GenerationInProgress => "GENERATION_IN_PROGRESS",
            ErrorCode::InitializationFailed => "INITIALIZATION_FAILED",
            ErrorCode::GenerationFailed => "GENERATION_FAILED",
            ErrorCode::BridgeCallFailed => "BRIDGE_CALL_FAILED",
            ErrorCode::ConnectivityTestFailed => "CONNECTIVITY_TEST_FAILED",
        }
    }

    /// Message used when the facade rejects an operation on state alone.
    pub const fn default_message(self) -> &'static str {
        match self {
            ErrorCode::ConfigurationInvalid => "Configuration validation failed",
            ErrorCode::InputInvalid => "Input validation failed",
            ErrorCode::AlreadyInitialized => "Chat engine is already initialized",
            ErrorCode::NotInitialized => "Chat engine must be initialized first",
            ErrorCode::EngineDestroyed => "Chat engine has been destroyed",
            ErrorCode::GenerationInProgress => "A generation is already in progress",
            ErrorCode::InitializationFailed => "Failed to initialize chat engine",
            ErrorCode::GenerationFailed => "Failed to generate response",
            ErrorCode::BridgeCallFailed => "Native call failed",
            ErrorCode::ConnectivityTestFailed => "Connectivity test failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DomainError {
    /// Stable classification.
    pub code: ErrorCode,

    /// Human-readable description (composite for multi-field validation).
    pub message: String,

    /// Original failure, kept for diagnostics only.
    #[source]
    pub cause: Option<Cause>,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Rejection raised purely from lifecycle state.
    pub fn rejected(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }
}
