//! Failure policy: which boundary failures propagate and which degrade.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chat_engine::bridge::unsupported::NOT_SUPPORTED_CODE;
use chat_engine::{BridgeError, ChatEngine, EngineState, ErrorCode, UnsupportedPlatform};

use common::{ready_engine, record_events, take, valid_config, ScriptedBridge};

#[tokio::test]
async fn test_best_effort_failures_degrade_and_publish() {
    let (engine, bridge, log) = ready_engine().await;
    for op in [
        "isReady",
        "clearHistory",
        "getDebugMessage",
        "getDebugHistory",
        "clearDebugHistory",
        "logMessage",
    ] {
        bridge.fail(op);
    }

    assert!(!engine.is_ready().await);
    engine.clear_history().await;
    assert_eq!(engine.get_debug_message().await, "");
    assert_eq!(engine.get_debug_history().await, "");
    engine.clear_debug_history().await;
    engine.log_message("hello").await;

    let events = take(&log);
    assert_eq!(events.len(), 6);
    assert!(events.iter().all(|e| e == "error:BRIDGE_CALL_FAILED"));
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn test_best_effort_successes_pass_through() {
    let (engine, _bridge, log) = ready_engine().await;

    assert!(engine.is_ready().await);
    assert_eq!(engine.get_debug_message().await, "last line");
    assert_eq!(engine.get_debug_history().await, "first line\nlast line");
    assert!(take(&log).is_empty());
}

#[tokio::test]
async fn test_model_info_failure_propagates() {
    let (engine, bridge, log) = ready_engine().await;
    assert_eq!(engine.get_model_info().await.unwrap(), "scripted model");

    bridge.fail("getModelInfo");
    let err = engine.get_model_info().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BridgeCallFailed);
    assert_eq!(
        err.message,
        "Failed to get model info: getModelInfo failed (SCRIPTED)"
    );
    assert_eq!(take(&log), vec!["error:BRIDGE_CALL_FAILED"]);
}

#[tokio::test]
async fn test_rejected_generate_returns_to_ready() {
    let (engine, bridge, log) = ready_engine().await;
    bridge.fail("generateAsync");

    let err = engine.generate_async("hello").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::GenerationFailed);
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(
        take(&log),
        vec![
            "generating:true",
            "generating:false",
            "error:GENERATION_FAILED",
        ]
    );

    let cause = err.cause.as_deref().and_then(|c| c.downcast_ref::<BridgeError>());
    assert_eq!(
        cause,
        Some(&BridgeError::rejected("SCRIPTED", "generateAsync failed"))
    );

    bridge.heal("generateAsync");
    engine.generate_async("hello").await.unwrap();
    assert_eq!(engine.state(), EngineState::Generating);
}

#[tokio::test]
async fn test_rejected_generate_closes_pending_stream() {
    let (engine, bridge, _log) = ready_engine().await;
    bridge.fail("generateAsync");

    let err = engine.generate_stream("hello").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::GenerationFailed);
    assert_eq!(
        engine.events().subscriber_count(chat_engine::EventName::Response),
        1
    );
}

#[tokio::test]
async fn test_connectivity_failure_propagates() {
    let bridge = ScriptedBridge::new();
    let engine = ChatEngine::new(bridge.clone());
    let log = record_events(&engine);

    assert_eq!(engine.test_connectivity().await.unwrap(), 42);
    bridge.fail("testConnectivity");
    let err = engine.test_connectivity().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ConnectivityTestFailed);
    assert_eq!(take(&log), vec!["error:CONNECTIVITY_TEST_FAILED"]);
}

#[tokio::test]
async fn test_stop_failure_still_resets_state() {
    let (engine, bridge, log) = ready_engine().await;
    bridge.fail("stopGeneration");
    engine.generate_async("hello").await.unwrap();

    engine.stop_generation().await;
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(
        take(&log),
        vec![
            "generating:true",
            "generating:false",
            "error:BRIDGE_CALL_FAILED",
        ]
    );
}

#[tokio::test]
async fn test_destroy_failure_still_destroys() {
    let (engine, bridge, log) = ready_engine().await;
    bridge.fail("destroyEngine");

    engine.destroy().await;
    assert_eq!(engine.state(), EngineState::Destroyed);
    assert_eq!(take(&log), vec!["error:BRIDGE_CALL_FAILED"]);
}

#[tokio::test]
async fn test_is_generating_trusts_local_state() {
    let (engine, bridge, _log) = ready_engine().await;
    engine.generate_async("hello").await.unwrap();

    bridge.native_generating.store(false, Ordering::SeqCst);
    assert!(engine.is_generating().await);
    assert_eq!(bridge.count("isGenerating"), 1);

    bridge.fail("isGenerating");
    assert!(engine.is_generating().await);

    engine.stop_generation().await;
    assert!(!engine.is_generating().await);
    assert_eq!(bridge.count("isGenerating"), 2);
}

#[tokio::test]
async fn test_unsupported_platform_maps_to_domain_codes() {
    let engine = ChatEngine::new(Arc::new(UnsupportedPlatform::new("Android")));
    let log = record_events(&engine);

    let err = engine.initialize(&valid_config()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InitializationFailed);
    assert!(err.message.contains(NOT_SUPPORTED_CODE));
    assert_eq!(engine.state(), EngineState::Uninitialized);

    let err = engine.test_connectivity().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ConnectivityTestFailed);

    let err = engine.generate_async("hello").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotInitialized);

    engine.destroy().await;
    assert_eq!(
        take(&log),
        vec![
            "error:INITIALIZATION_FAILED",
            "error:CONNECTIVITY_TEST_FAILED",
        ]
    );
}
