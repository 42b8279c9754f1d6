//! The caller-facing chat engine.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::bridge::{BridgeError, BridgeEvent, BridgeEventHandler, EventSink, NativeBridge};
use crate::config::EngineConfiguration;
use crate::engine::policy::{FailurePolicy, Operation};
use crate::engine::session::{
    DestroyOutcome, EngineState, InitOutcome, ResponseDisposition, Session, StopOutcome,
};
use crate::error::{DomainError, ErrorCode};
use crate::events::{EngineEvent, EventChannel, EventName, ResponseStream, Subscription};
use crate::types::{GenerationRequest, StreamingResponse};
use crate::validation::{accept_configuration, validate_generation_text, ValidationErrors};

struct Inner {
    bridge: Arc<dyn NativeBridge>,
    session: Mutex<Session>,
    events: EventChannel,
}

impl Inner {
    /// Never held across an await or while handlers run.
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: EngineEvent) {
        let name = event.name();
        let delivered = self.events.publish(event);
        debug!(event = %name, delivered, "Published event");
    }

    /// Normalize a boundary failure and publish it on the error channel.
    fn fail(
        &self,
        code: ErrorCode,
        context: &str,
        operation: &'static str,
        err: BridgeError,
    ) -> DomainError {
        warn!(operation, code = %code, error = %err, "Native call failed");
        let error = DomainError::new(code, format!("{context}: {err}")).with_cause(err);
        self.publish(EngineEvent::Error(error.clone()));
        error
    }

    fn report(&self, op: Operation, err: BridgeError) -> DomainError {
        self.fail(op.failure_code(), &op.failure_message(), op.name(), err)
    }

    fn on_response(&self, response: StreamingResponse) {
        let disposition = self.session().accept_response(&response);
        match disposition {
            ResponseDisposition::Discard(reason) => {
                debug!(?reason, len = response.len(), "Discarding response");
            }
            ResponseDisposition::Deliver {
                request_id,
                completes,
                regressed,
            } => {
                if regressed {
                    warn!(%request_id, len = response.len(), "Accumulated text shrank");
                }
                self.publish(EngineEvent::Response(response));
                if completes {
                    info!(%request_id, "Generation complete");
                    self.publish(EngineEvent::Generating(false));
                }
            }
        }
    }

    fn on_failure(&self, message: String) {
        let err = BridgeError::Reported(message);
        let ended = self.session().fail_generation();
        match ended {
            Some(request_id) => {
                warn!(%request_id, "Native engine failed mid-generation");
                self.publish(EngineEvent::Generating(false));
                self.report(Operation::Generate, err);
            }
            None => {
                self.fail(
                    ErrorCode::BridgeCallFailed,
                    "Native engine reported a failure",
                    "onError",
                    err,
                );
            }
        }
    }
}

impl BridgeEventHandler for Inner {
    fn on_bridge_event(&self, event: BridgeEvent) {
        match event {
            BridgeEvent::Response(response) => self.on_response(response),
            BridgeEvent::Metrics(metrics) => {
                let accepted = self.session().accept_metrics();
                if accepted {
                    self.publish(EngineEvent::Metrics(metrics.sanitized()));
                } else {
                    debug!("Discarding metrics");
                }
            }
            BridgeEvent::Failure { message } => self.on_failure(message),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .state();
        if state.is_active() {
            warn!(%state, "Chat engine dropped without destroy; native engine left running");
        }
    }
}

/// Lifecycle facade over a native chat engine.
///
/// Cheap to clone; clones share one session. Operations fall into two
/// groups (see [`crate::engine::policy`]): contract operations return
/// `Err(DomainError)` on failure, best-effort ones degrade to a default
/// value. Every boundary failure is also published on [`EventName::Error`].
///
/// Events are published after the session lock is released. The ordering
/// of `generating` events relative to state holds when one task drives the
/// engine; clones driven from several threads may observe an old request's
/// `generating=false` after a new request's `generating=true`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use chat_engine::{ChatEngine, EngineConfiguration, SimulatedEngine};
///
/// # async fn run() -> Result<(), chat_engine::DomainError> {
/// let engine = ChatEngine::new(Arc::new(SimulatedEngine::instant()));
/// engine.initialize(&EngineConfiguration::default()).await?;
/// engine.generate_async("Hello").await?;
/// engine.destroy().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatEngine {
    inner: Arc<Inner>,
}

impl ChatEngine {
    pub fn new(bridge: Arc<dyn NativeBridge>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bridge,
                session: Mutex::new(Session::new()),
                events: EventChannel::new(),
            }),
        }
    }

    pub fn state(&self) -> EngineState {
        self.inner.session().state()
    }

    pub fn events(&self) -> &EventChannel {
        &self.inner.events
    }

    fn sink(&self) -> EventSink {
        let handler: Arc<dyn BridgeEventHandler> = self.inner.clone();
        EventSink::new(&handler)
    }

    /// Apply the operation's failure policy to a boundary result.
    fn settle<T: Default>(
        &self,
        op: Operation,
        result: Result<T, BridgeError>,
    ) -> Result<T, DomainError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                let error = self.inner.report(op, err);
                match op.policy() {
                    FailurePolicy::Propagate => Err(error),
                    FailurePolicy::Degrade => Ok(T::default()),
                }
            }
        }
    }

    /// Whether `op` may reach the bridge in the current state.
    fn admit(&self, op: Operation) -> Result<bool, DomainError> {
        let state = self.state();
        if state.is_active() {
            return Ok(true);
        }
        match op.policy() {
            FailurePolicy::Propagate => Err(DomainError::rejected(state.inactive_code())),
            FailurePolicy::Degrade => {
                debug!(operation = op.name(), %state, "Skipping native call");
                Ok(false)
            }
        }
    }

    fn admitted(&self, op: Operation) -> bool {
        matches!(self.admit(op), Ok(true))
    }

    /// Validate `config` and create the native engine.
    ///
    /// Publishes [`EventName::Ready`] on success.
    pub async fn initialize(&self, config: &EngineConfiguration) -> Result<(), DomainError> {
        let accepted = {
            let mut session = self.inner.session();
            session.check_initialize().map_err(DomainError::rejected)?;
            let accepted = accept_configuration(config)
                .map_err(|errors| invalid(ErrorCode::ConfigurationInvalid, errors))?;
            session.begin_initialize();
            accepted
        };

        info!(
            model = %accepted.model_path,
            backend = %accepted.backend,
            threads = accepted.thread_count,
            "Initializing chat engine"
        );
        let result = self.inner.bridge.create_engine(&accepted, self.sink()).await;

        let outcome = self.inner.session().finish_initialize(result.is_ok());
        match (outcome, result) {
            (InitOutcome::Ready, _) => {
                info!(model = %accepted.model_path, "Chat engine ready");
                self.inner.publish(EngineEvent::Ready);
                Ok(())
            }
            (InitOutcome::Failed, Err(err)) => {
                Err(self.inner.report(Operation::Initialize, err))
            }
            (InitOutcome::Failed, Ok(())) => {
                Err(DomainError::rejected(ErrorCode::InitializationFailed))
            }
            (InitOutcome::DestroyedMeanwhile, created) => {
                if created.is_ok() {
                    warn!("Destroyed during initialization; tearing down native engine");
                    if let Err(err) = self.inner.bridge.destroy_engine().await {
                        self.inner.report(Operation::Destroy, err);
                    }
                }
                Err(DomainError::rejected(ErrorCode::EngineDestroyed))
            }
        }
    }

    pub async fn is_ready(&self) -> bool {
        if !self.admitted(Operation::IsReady) {
            return false;
        }
        let result = self.inner.bridge.is_ready().await;
        self.settle(Operation::IsReady, result).unwrap_or_default() && self.state().is_active()
    }

    /// Start generating a reply to `text`.
    ///
    /// Resolves once the native engine accepted the request. Output arrives
    /// as [`EventName::Response`] events.
    pub async fn generate_async(&self, text: &str) -> Result<(), DomainError> {
        let request = {
            let mut session = self.inner.session();
            session.check_generate().map_err(DomainError::rejected)?;
            let errors = validate_generation_text(text);
            if !errors.is_empty() {
                return Err(invalid(ErrorCode::InputInvalid, ValidationErrors(errors)));
            }
            GenerationRequest {
                id: session.begin_generation(),
                text: text.to_string(),
            }
        };

        info!(request_id = %request.id, chars = text.len(), "Generation requested");
        self.inner.publish(EngineEvent::Generating(true));

        let result = self.inner.bridge.generate_async(&request).await;
        if result.is_err() {
            let reverted = self.inner.session().abort_generation(request.id);
            if reverted {
                self.inner.publish(EngineEvent::Generating(false));
            }
        }
        self.settle(Operation::Generate, result)
    }

    /// Like [`generate_async`](Self::generate_async), but returns the
    /// generation's responses as a stream.
    pub async fn generate_stream(&self, text: &str) -> Result<ResponseStream, DomainError> {
        let stream = ResponseStream::attach(&self.inner.events);
        self.generate_async(text).await?;
        Ok(stream)
    }

    /// Request that the running generation stop.
    ///
    /// Local state returns to Ready at once; the native engine may still
    /// deliver a late response.
    pub async fn stop_generation(&self) {
        let outcome = self.inner.session().stop();
        match outcome {
            StopOutcome::Interrupted(request_id) => {
                info!(%request_id, "Generation stopped");
                self.inner.publish(EngineEvent::Generating(false));
            }
            StopOutcome::Idle => debug!("Stop requested with nothing in flight"),
            StopOutcome::Inactive => {
                debug!(state = %self.state(), "Ignoring stop");
                return;
            }
        }

        let result = self.inner.bridge.stop_generation().await;
        self.settle(Operation::StopGeneration, result).unwrap_or_default()
    }

    pub async fn is_generating(&self) -> bool {
        if self.state() != EngineState::Generating {
            return false;
        }

        let result = self.inner.bridge.is_generating().await;
        let native = self.settle(Operation::IsGenerating, result).unwrap_or_default();
        let local = self.state() == EngineState::Generating;
        if native != local {
            debug!(native, local, "Native generation flag diverges from local state");
        }
        local
    }

    pub async fn clear_history(&self) {
        if self.admitted(Operation::ClearHistory) {
            let result = self.inner.bridge.clear_history().await;
            self.settle(Operation::ClearHistory, result).unwrap_or_default()
        }
    }

    pub async fn get_model_info(&self) -> Result<String, DomainError> {
        self.admit(Operation::GetModelInfo)?;
        let result = self.inner.bridge.get_model_info().await;
        self.settle(Operation::GetModelInfo, result)
    }

    pub async fn get_debug_message(&self) -> String {
        if !self.admitted(Operation::GetDebugMessage) {
            return String::new();
        }
        let result = self.inner.bridge.get_debug_message().await;
        self.settle(Operation::GetDebugMessage, result).unwrap_or_default()
    }

    pub async fn get_debug_history(&self) -> String {
        if !self.admitted(Operation::GetDebugHistory) {
            return String::new();
        }
        let result = self.inner.bridge.get_debug_history().await;
        self.settle(Operation::GetDebugHistory, result).unwrap_or_default()
    }

    pub async fn clear_debug_history(&self) {
        if self.admitted(Operation::ClearDebugHistory) {
            let result = self.inner.bridge.clear_debug_history().await;
            self.settle(Operation::ClearDebugHistory, result).unwrap_or_default()
        }
    }

    /// Append a host line to the native debug log.
    pub async fn log_message(&self, message: &str) {
        if self.admitted(Operation::LogMessage) {
            let result = self.inner.bridge.log_message(message).await;
            self.settle(Operation::LogMessage, result).unwrap_or_default()
        }
    }

    /// Liveness probe. Works in every state, including before initialize.
    pub async fn test_connectivity(&self) -> Result<i32, DomainError> {
        let result = self.inner.bridge.test_connectivity().await;
        self.settle(Operation::TestConnectivity, result)
    }

    /// Release the native engine. Idempotent; the facade cannot be reused.
    pub async fn destroy(&self) {
        let outcome = self.inner.session().destroy();
        match outcome {
            DestroyOutcome::AlreadyDestroyed => debug!("Chat engine already destroyed"),
            DestroyOutcome::Released => info!("Chat engine released"),
            DestroyOutcome::Teardown { was_generating } => {
                if was_generating {
                    self.inner.publish(EngineEvent::Generating(false));
                }
                let result = self.inner.bridge.destroy_engine().await;
                self.settle(Operation::Destroy, result).unwrap_or_default();
                info!("Chat engine destroyed");
            }
        }
    }

    pub fn subscribe<F>(&self, name: EventName, handler: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(name, handler)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    pub fn unsubscribe_all(&self, name: EventName) -> usize {
        self.inner.events.unsubscribe_all(name)
    }
}

impl fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatEngine")
            .field("state", &self.state())
            .field("events", &self.inner.events)
            .finish()
    }
}

fn invalid(code: ErrorCode, errors: ValidationErrors) -> DomainError {
    DomainError::new(code, format!("{}: {errors}", code.default_message())).with_cause(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{SimulatedEngine, UnsupportedPlatform};

    #[tokio::test]
    async fn test_invalid_configuration_is_local() {
        let engine = ChatEngine::new(Arc::new(SimulatedEngine::instant()));
        let errors = Arc::new(Mutex::new(0));
        let e = errors.clone();
        engine.subscribe(EventName::Error, move |_| *e.lock().unwrap() += 1);

        let config = EngineConfiguration {
            model_path: String::new(),
            temperature: 3.0,
            ..EngineConfiguration::default()
        };
        let err = engine.initialize(&config).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigurationInvalid);
        assert_eq!(
            err.message,
            "Configuration validation failed: modelPath: Model path must be a non-empty string, \
             temperature: Temperature must be between 0 and 2"
        );
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(*errors.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_platform_maps_codes() {
        let engine = ChatEngine::new(Arc::new(UnsupportedPlatform::new("Android")));

        let err = engine.test_connectivity().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConnectivityTestFailed);

        let err = engine.initialize(&EngineConfiguration::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InitializationFailed);
        assert!(err.message.contains(
            "Android support is not yet implemented"
        ));
        assert_eq!(engine.state(), EngineState::Uninitialized);

        let err = engine.get_model_info().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotInitialized);
        assert_eq!(engine.get_debug_history().await, "");
    }

    #[tokio::test]
    async fn test_clones_share_one_session() {
        let engine = ChatEngine::new(Arc::new(SimulatedEngine::instant()));
        let other = engine.clone();
        engine.initialize(&EngineConfiguration::default()).await.unwrap();
        assert_eq!(other.state(), EngineState::Ready);
        assert!(other.is_ready().await);

        other.destroy().await;
        assert_eq!(engine.state(), EngineState::Destroyed);
        assert!(!engine.is_ready().await);
    }
}
