//! Typed publish/subscribe channel.
//!
//! One observer list per [`EventName`]. Delivery is synchronous with the
//! publish call, in subscription order. There is no buffering: a subscriber
//! registered after an event fired never sees it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;

use crate::error::DomainError;
use crate::types::{GenerationMetrics, StreamingResponse};

/// The closed set of events the facade publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Response,
    Metrics,
    Error,
    Ready,
    Generating,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::Response,
        EventName::Metrics,
        EventName::Error,
        EventName::Ready,
        EventName::Generating,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EventName::Response => "response",
            EventName::Metrics => "metrics",
            EventName::Error => "error",
            EventName::Ready => "ready",
            EventName::Generating => "generating",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for EventName {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

/// An event together with its payload.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Response(StreamingResponse),
    Metrics(GenerationMetrics),
    Error(DomainError),
    Ready,
    Generating(bool),
}

impl EngineEvent {
    pub fn name(&self) -> EventName {
        match self {
            EngineEvent::Response(_) => EventName::Response,
            EngineEvent::Metrics(_) => EventName::Metrics,
            EngineEvent::Error(_) => EventName::Error,
            EngineEvent::Ready => EventName::Ready,
            EngineEvent::Generating(_) => EventName::Generating,
        }
    }
}

type Handler = Box<dyn Fn(&EngineEvent) + Send + Sync>;

struct Listener {
    id: u64,
    live: AtomicBool,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventName, Vec<Arc<Listener>>>>,
}

impl Registry {
    fn listeners(&self) -> MutexGuard<'_, HashMap<EventName, Vec<Arc<Listener>>>> {
        // Handlers never run under this lock, so poisoning can only come
        // from a panic in our own bookkeeping; the map is still consistent.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, name: EventName, id: u64) {
        if let Some(list) = self.listeners().get_mut(&name) {
            list.retain(|l| l.id != id);
        }
    }
}

/// Handle returned by [`EventChannel::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    name: EventName,
    listener: Weak<Listener>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn event(&self) -> EventName {
        self.name
    }

    pub fn is_active(&self) -> bool {
        self.listener
            .upgrade()
            .is_some_and(|l| l.live.load(Ordering::Acquire))
    }

    /// Stop delivery to this subscriber. Safe to repeat and safe to call
    /// from inside the subscriber's own handler.
    pub fn unsubscribe(&self) {
        if let Some(listener) = self.listener.upgrade() {
            listener.live.store(false, Ordering::Release);
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.name, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Fan-out event channel.
#[derive(Clone, Default)]
pub struct EventChannel {
    registry: Arc<Registry>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every future event named `name`.
    pub fn subscribe<F>(&self, name: EventName, handler: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let listener = Arc::new(Listener {
            id,
            live: AtomicBool::new(true),
            handler: Box::new(handler),
        });
        let weak = Arc::downgrade(&listener);

        self.registry
            .listeners()
            .entry(name)
            .or_default()
            .push(listener);

        Subscription {
            id,
            name,
            listener: weak,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove every subscriber for `name`. Returns how many were removed.
    pub fn unsubscribe_all(&self, name: EventName) -> usize {
        let removed = self.registry.listeners().remove(&name).unwrap_or_default();
        for listener in &removed {
            listener.live.store(false, Ordering::Release);
        }
        removed.len()
    }

    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.registry.listeners().get(&name).map_or(0, Vec::len)
    }

    /// Deliver `event` to every live subscriber. Returns the delivery count.
    pub(crate) fn publish(&self, event: EngineEvent) -> usize {
        let snapshot: Vec<Arc<Listener>> = self
            .registry
            .listeners()
            .get(&event.name())
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for listener in snapshot {
            // A handler earlier in this round may have unsubscribed it.
            if listener.live.load(Ordering::Acquire) {
                (listener.handler)(&event);
                delivered += 1;
            }
        }
        delivered
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.registry.listeners();
        let mut map = f.debug_map();
        for (name, list) in listeners.iter() {
            map.entry(name, &list.len());
        }
        map.finish()
    }
}
