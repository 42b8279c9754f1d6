//! Lifecycle state machine.
//!
//! [`Session`] is pure bookkeeping: it decides which operations are legal and
//! which stream events are accepted, but never calls the bridge or publishes
//! events. The facade applies its decisions.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::types::StreamingResponse;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Generating,
    Destroyed,
}

impl EngineState {
    /// A native engine exists and accepts calls.
    pub fn is_active(self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Generating)
    }

    /// Code for rejecting a contract operation while inactive.
    pub fn inactive_code(self) -> ErrorCode {
        match self {
            EngineState::Destroyed => ErrorCode::EngineDestroyed,
            _ => ErrorCode::NotInitialized,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Generating => "generating",
            EngineState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Bookkeeping for the most recent generation request.
#[derive(Debug, Clone)]
struct StreamGuard {
    request_id: Uuid,
    last_len: usize,
    closed: bool,
    stopped: bool,
    metrics_seen: bool,
}

impl StreamGuard {
    fn open(request_id: Uuid) -> Self {
        Self {
            request_id,
            last_len: 0,
            closed: false,
            stopped: false,
            metrics_seen: false,
        }
    }
}

/// Outcome of a pending bridge create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    Failed,
    /// `destroy` landed while the create was in flight.
    DestroyedMeanwhile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    NoRequest,
    AfterFinal,
    Destroyed,
}

/// What to do with an incoming streaming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    Deliver {
        request_id: Uuid,
        /// This response ends an active generation (publish `generating=false`).
        completes: bool,
        /// Accumulated text got shorter than the previous chunk.
        regressed: bool,
    },
    Discard(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// An active generation was interrupted.
    Interrupted(Uuid),
    /// Ready with nothing in flight; the stop is still forwarded.
    Idle,
    /// No native engine to talk to.
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    AlreadyDestroyed,
    /// No native engine was created (yet).
    Released,
    Teardown { was_generating: bool },
}

#[derive(Debug)]
pub struct Session {
    state: EngineState,
    stream: Option<StreamGuard>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            stream: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn current_request(&self) -> Option<Uuid> {
        self.stream.as_ref().map(|s| s.request_id)
    }

    pub fn check_initialize(&self) -> Result<(), ErrorCode> {
        match self.state {
            EngineState::Uninitialized => Ok(()),
            EngineState::Destroyed => Err(ErrorCode::EngineDestroyed),
            EngineState::Initializing | EngineState::Ready | EngineState::Generating => {
                Err(ErrorCode::AlreadyInitialized)
            }
        }
    }

    /// Uninitialized → Initializing. Call after `check_initialize` and validation.
    pub fn begin_initialize(&mut self) {
        debug_assert_eq!(self.state, EngineState::Uninitialized);
        self.state = EngineState::Initializing;
    }

    pub fn finish_initialize(&mut self, created: bool) -> InitOutcome {
        match (self.state, created) {
            (EngineState::Destroyed, _) => InitOutcome::DestroyedMeanwhile,
            (_, true) => {
                self.state = EngineState::Ready;
                InitOutcome::Ready
            }
            (_, false) => {
                self.state = EngineState::Uninitialized;
                InitOutcome::Failed
            }
        }
    }

    pub fn check_generate(&self) -> Result<(), ErrorCode> {
        match self.state {
            EngineState::Ready => Ok(()),
            EngineState::Generating => Err(ErrorCode::GenerationInProgress),
            EngineState::Destroyed => Err(ErrorCode::EngineDestroyed),
            EngineState::Uninitialized | EngineState::Initializing => {
                Err(ErrorCode::NotInitialized)
            }
        }
    }

    /// Ready → Generating with a fresh stream guard.
    pub fn begin_generation(&mut self) -> Uuid {
        debug_assert_eq!(self.state, EngineState::Ready);
        let request_id = Uuid::new_v4();
        self.state = EngineState::Generating;
        self.stream = Some(StreamGuard::open(request_id));
        request_id
    }

    /// Bridge rejected the generate call. Returns true when the facade must
    /// publish `generating=false`.
    pub fn abort_generation(&mut self, request_id: Uuid) -> bool {
        let is_current = self.current_request() == Some(request_id);
        if is_current && self.state == EngineState::Generating {
            self.state = EngineState::Ready;
            if let Some(stream) = self.stream.as_mut() {
                stream.closed = true;
            }
            true
        } else {
            false
        }
    }

    pub fn accept_response(&mut self, response: &StreamingResponse) -> ResponseDisposition {
        if self.state == EngineState::Destroyed {
            return ResponseDisposition::Discard(DiscardReason::Destroyed);
        }
        let Some(stream) = self.stream.as_mut() else {
            return ResponseDisposition::Discard(DiscardReason::NoRequest);
        };
        if stream.closed {
            return ResponseDisposition::Discard(DiscardReason::AfterFinal);
        }

        let regressed = response.len() < stream.last_len;
        stream.last_len = response.len();

        let mut completes = false;
        if response.is_final {
            stream.closed = true;
            if self.state == EngineState::Generating && !stream.stopped {
                self.state = EngineState::Ready;
                completes = true;
            }
        }

        ResponseDisposition::Deliver {
            request_id: stream.request_id,
            completes,
            regressed,
        }
    }

    /// Metrics are accepted once per request.
    pub fn accept_metrics(&mut self) -> bool {
        if self.state == EngineState::Destroyed {
            return false;
        }
        match self.stream.as_mut() {
            Some(stream) if !stream.metrics_seen => {
                stream.metrics_seen = true;
                true
            }
            _ => false,
        }
    }

    /// Native side reported an asynchronous failure. Returns the request it
    /// ended, if one was generating.
    pub fn fail_generation(&mut self) -> Option<Uuid> {
        if self.state != EngineState::Generating {
            return None;
        }
        self.state = EngineState::Ready;
        self.stream.as_mut().map(|stream| {
            stream.closed = true;
            stream.request_id
        })
    }

    pub fn stop(&mut self) -> StopOutcome {
        match self.state {
            EngineState::Generating => {
                self.state = EngineState::Ready;
                match self.stream.as_mut() {
                    Some(stream) => {
                        stream.stopped = true;
                        StopOutcome::Interrupted(stream.request_id)
                    }
                    None => StopOutcome::Idle,
                }
            }
            EngineState::Ready => StopOutcome::Idle,
            _ => StopOutcome::Inactive,
        }
    }

    pub fn destroy(&mut self) -> DestroyOutcome {
        let previous = self.state;
        if previous == EngineState::Destroyed {
            return DestroyOutcome::AlreadyDestroyed;
        }

        self.state = EngineState::Destroyed;
        self.stream = None;
        match previous {
            EngineState::Ready | EngineState::Generating => DestroyOutcome::Teardown {
                was_generating: previous == EngineState::Generating,
            },
            _ => DestroyOutcome::Released,
        }
    }
}
