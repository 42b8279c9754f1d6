//! Failure policy for boundary calls, in one table.
//!
//! | Operation | Policy | Failure code |
//! |-----------|--------|--------------|
//! | initialize | Propagate | `INITIALIZATION_FAILED` |
//! | generateAsync | Propagate | `GENERATION_FAILED` |
//! | getModelInfo | Propagate | `BRIDGE_CALL_FAILED` |
//! | testConnectivity | Propagate | `CONNECTIVITY_TEST_FAILED` |
//! | everything else | Degrade | `BRIDGE_CALL_FAILED` |
//!
//! Failures are published on the `error` channel under both policies.
//! Propagate operations additionally return the error; Degrade operations
//! return a default value. The same table decides what happens when an
//! operation is called with no live native engine: Propagate rejects,
//! Degrade is a no-op.

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject the operation.
    Propagate,
    /// Report on the error channel, return a default.
    Degrade,
}

/// Boundary operations the facade performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Initialize,
    IsReady,
    Generate,
    StopGeneration,
    IsGenerating,
    ClearHistory,
    GetModelInfo,
    GetDebugMessage,
    GetDebugHistory,
    ClearDebugHistory,
    LogMessage,
    Destroy,
    TestConnectivity,
}

impl Operation {
    pub const fn policy(self) -> FailurePolicy {
        match self {
            Operation::Initialize
            | Operation::Generate
            | Operation::GetModelInfo
            | Operation::TestConnectivity => FailurePolicy::Propagate,
            Operation::IsReady
            | Operation::StopGeneration
            | Operation::IsGenerating
            | Operation::ClearHistory
            | Operation::GetDebugMessage
            | Operation::GetDebugHistory
            | Operation::ClearDebugHistory
            | Operation::LogMessage
            | Operation::Destroy => FailurePolicy::Degrade,
        }
    }

    pub const fn failure_code(self) -> ErrorCode {
        match self {
            Operation::Initialize => ErrorCode::InitializationFailed,
            Operation::Generate => ErrorCode::GenerationFailed,
            Operation::TestConnectivity => ErrorCode::ConnectivityTestFailed,
            _ => ErrorCode::BridgeCallFailed,
        }
    }

    /// Bridge operation name, as used in logs and messages.
    pub const fn name(self) -> &'static str {
        match self {
            Operation::Initialize => "createEngine",
            Operation::IsReady => "isReady",
            Operation::Generate => "generateAsync",
            Operation::StopGeneration => "stopGeneration",
            Operation::IsGenerating => "isGenerating",
            Operation::ClearHistory => "clearHistory",
            Operation::GetModelInfo => "getModelInfo",
            Operation::GetDebugMessage => "getDebugMessage",
            Operation::GetDebugHistory => "getDebugHistory",
            Operation::ClearDebugHistory => "clearDebugHistory",
            Operation::LogMessage => "logMessage",
            Operation::Destroy => "destroyEngine",
            Operation::TestConnectivity => "testConnectivity",
        }
    }

    /// Prefix for the normalized error message.
    pub fn failure_message(self) -> String {
        match self {
            Operation::Initialize => "Failed to initialize chat engine".to_string(),
            Operation::Generate => "Failed to generate response".to_string(),
            Operation::GetModelInfo => "Failed to get model info".to_string(),
            Operation::TestConnectivity => "Connectivity test failed".to_string(),
            other => format!("Native call {} failed", other.name()),
        }
    }
}
