//! Event delivery to host observers.
//!
//! - [`channel`]: Typed publish/subscribe keyed by [`EventName`]
//! - [`stream`]: `futures::Stream` adapter over one generation's responses

pub mod channel;
pub mod stream;

pub use channel::{EngineEvent, EventChannel, EventName, Subscription, UnknownEvent};
pub use stream::ResponseStream;
