//! Bridge for targets that ship without a native engine.
//!
//! Every call rejects, so a facade built on it fails cleanly instead of
//! looking for a module that is not there.

use async_trait::async_trait;

use crate::bridge::{BridgeError, EventSink, NativeBridge};
use crate::config::AcceptedConfig;
use crate::types::GenerationRequest;

pub const NOT_SUPPORTED_CODE: &str = "PLATFORM_NOT_SUPPORTED";

#[derive(Debug, Clone)]
pub struct UnsupportedPlatform {
    platform: String,
}

impl UnsupportedPlatform {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    fn reject<T>(&self) -> Result<T, BridgeError> {
        Err(BridgeError::rejected(
            NOT_SUPPORTED_CODE,
            format!("{} support is not yet implemented", self.platform),
        ))
    }
}

#[async_trait]
impl NativeBridge for UnsupportedPlatform {
    async fn create_engine(
        &self,
        _config: &AcceptedConfig,
        _sink: EventSink,
    ) -> Result<(), BridgeError> {
        self.reject()
    }

    async fn destroy_engine(&self) -> Result<(), BridgeError> {
        self.reject()
    }

    async fn is_ready(&self) -> Result<bool, BridgeError> {
        self.reject()
    }

    async fn generate_async(&self, _request: &GenerationRequest) -> Result<(), BridgeError> {
        self.reject()
    }

    async fn stop_generation(&self) -> Result<(), BridgeError> {
        self.reject()
    }

    async fn is_generating(&self) -> Result<bool, BridgeError> {
        self.reject()
    }

    async fn clear_history(&self) -> Result<(), BridgeError> {
        self.reject()
    }

    async fn get_model_info(&self) -> Result<String, BridgeError> {
        self.reject()
    }

    async fn get_debug_message(&self) -> Result<String, BridgeError> {
        self.reject()
    }

    async fn get_debug_history(&self) -> Result<String, BridgeError> {
        self.reject()
    }

    async fn clear_debug_history(&self) -> Result<(), BridgeError> {
        self.reject()
    }

    async fn log_message(&self, _message: &str) -> Result<(), BridgeError> {
        self.reject()
    }

    async fn test_connectivity(&self) -> Result<i32, BridgeError> {
        self.reject()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_call_rejects_with_platform_code() {
        let bridge = UnsupportedPlatform::new("Android");
        let err = bridge.test_connectivity().await.unwrap_err();
        assert_eq!(
            err,
            BridgeError::rejected(NOT_SUPPORTED_CODE, "Android support is not yet implemented")
        );
        assert!(bridge.get_model_info().await.is_err());
        assert!(bridge.log_message("hi").await.is_err());
    }
}
