//! Boundary to the native chat engine.
//!
//! - [`NativeBridge`]: async operation set the native collaborator implements
//! - [`EventSink`]: handle the collaborator uses to push stream events back
//! - [`simulated`]: in-process stand-in engine for demos and tests
//! - [`unsupported`]: bridge for platforms without a native engine
//!
//! The facade receives a bridge at construction time and never looks one up
//! from ambient state.

pub mod simulated;
pub mod unsupported;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AcceptedConfig;
use crate::types::{GenerationMetrics, GenerationRequest, StreamingResponse};

pub use simulated::SimulatedEngine;
pub use unsupported::UnsupportedPlatform;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The native side rejected the call with its own code.
    #[error("{message} ({code})")]
    Rejected { code: String, message: String },

    #[error("Native engine has not been created")]
    NoEngine,

    /// Failure reported asynchronously through the event sink.
    #[error("Native engine reported: {0}")]
    Reported(String),
}

impl BridgeError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Events the native collaborator emits outside of any call.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Streaming response chunk.
    Response(StreamingResponse),

    /// Performance metrics for the generation that just finished.
    Metrics(GenerationMetrics),

    /// Asynchronous failure (e.g. decode error mid-stream).
    Failure { message: String },
}

/// Receiver side of [`EventSink`]. Implemented by the facade.
pub trait BridgeEventHandler: Send + Sync {
    fn on_bridge_event(&self, event: BridgeEvent);
}

/// Event callback handed to the bridge in [`NativeBridge::create_engine`].
///
/// Holds only a weak reference, so a bridge that outlives its facade simply
/// emits into the void.
#[derive(Clone)]
pub struct EventSink {
    target: Weak<dyn BridgeEventHandler>,
}

impl EventSink {
    pub fn new(target: &Arc<dyn BridgeEventHandler>) -> Self {
        Self {
            target: Arc::downgrade(target),
        }
    }

    /// A sink connected to nothing.
    pub fn detached() -> Self {
        struct Nowhere;
        impl BridgeEventHandler for Nowhere {
            fn on_bridge_event(&self, _event: BridgeEvent) {}
        }

        let target: Weak<dyn BridgeEventHandler> = Weak::<Nowhere>::new();
        Self { target }
    }

    pub fn is_attached(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Deliver an event. Returns false if the receiver is gone.
    pub fn emit(&self, event: BridgeEvent) -> bool {
        match self.target.upgrade() {
            Some(target) => {
                target.on_bridge_event(event);
                true
            }
            None => false,
        }
    }

    pub fn response(&self, accumulated_text: impl Into<String>, is_final: bool) -> bool {
        self.emit(BridgeEvent::Response(StreamingResponse {
            accumulated_text: accumulated_text.into(),
            is_final,
        }))
    }

    pub fn metrics(&self, metrics: GenerationMetrics) -> bool {
        self.emit(BridgeEvent::Metrics(metrics))
    }

    pub fn failure(&self, message: impl Into<String>) -> bool {
        self.emit(BridgeEvent::Failure {
            message: message.into(),
        })
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Operations the native collaborator must support.
///
/// Every method is a boundary call: it may suspend, and it may fail with a
/// [`BridgeError`] that the facade normalizes.
#[async_trait]
pub trait NativeBridge: Send + Sync {
    /// Create the native engine. `sink` stays valid for the engine's lifetime.
    async fn create_engine(
        &self,
        config: &AcceptedConfig,
        sink: EventSink,
    ) -> Result<(), BridgeError>;

    async fn destroy_engine(&self) -> Result<(), BridgeError>;

    async fn is_ready(&self) -> Result<bool, BridgeError>;

    /// Start generating. Resolves once the request is accepted; output
    /// arrives through the sink.
    async fn generate_async(&self, request: &GenerationRequest) -> Result<(), BridgeError>;

    async fn stop_generation(&self) -> Result<(), BridgeError>;

    async fn is_generating(&self) -> Result<bool, BridgeError>;

    async fn clear_history(&self) -> Result<(), BridgeError>;

    async fn get_model_info(&self) -> Result<String, BridgeError>;

    async fn get_debug_message(&self) -> Result<String, BridgeError>;

    async fn get_debug_history(&self) -> Result<String, BridgeError>;

    async fn clear_debug_history(&self) -> Result<(), BridgeError>;

    async fn log_message(&self, message: &str) -> Result<(), BridgeError>;

    /// Liveness probe, independent of engine lifecycle.
    async fn test_connectivity(&self) -> Result<i32, BridgeError>;
}
