//! Async lifecycle facade over a native, model-backed chat engine.
//!
//! The crate validates engine configuration, drives the native collaborator
//! through a [`NativeBridge`], enforces one generation at a time, and fans
//! streamed responses, metrics and errors out to subscribers.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod types;
pub mod validation;

pub use bridge::{
    BridgeError, BridgeEvent, EventSink, NativeBridge, SimulatedEngine, UnsupportedPlatform,
};
pub use config::{AcceptedConfig, Backend, Config, EngineConfiguration};
pub use engine::{ChatEngine, EngineState};
pub use error::{DomainError, ErrorCode};
pub use events::{EngineEvent, EventChannel, EventName, ResponseStream, Subscription};
pub use types::{GenerationMetrics, StreamingResponse};
pub use validation::{validate_configuration, validate_generation_text, FieldError};
