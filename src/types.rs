//! Data carried across the facade: requests, streamed responses and metrics.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single generation request.
///
/// Exists only for the duration of one `generate_async` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Correlation ID for logs.
    pub id: Uuid,

    /// Input text (validated non-empty).
    pub text: String,
}

/// One incremental response chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingResponse {
    /// Full text generated so far for this request.
    pub accumulated_text: String,

    /// Whether this is the terminal response for the request.
    pub is_final: bool,
}

impl StreamingResponse {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            accumulated_text: text.into(),
            is_final: false,
        }
    }

    pub fn complete(text: impl Into<String>) -> Self {
        Self {
            accumulated_text: text.into(),
            is_final: true,
        }
    }

    /// Accumulated length in bytes.
    pub fn len(&self) -> usize {
        self.accumulated_text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated_text.is_empty()
    }
}

/// Performance metrics for one completed generation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetrics {
    pub total_time_ms: f64,
    pub prefill_time_ms: f64,
    pub decode_time_ms: f64,
    pub tokens_per_second: f64,
    pub prefill_tokens: u32,
    pub decode_tokens: u32,
}

impl GenerationMetrics {
    /// Build metrics from measured phase durations.
    pub fn from_timings(
        prefill: Duration,
        decode: Duration,
        prefill_tokens: u32,
        decode_tokens: u32,
    ) -> Self {
        let decode_secs = decode.as_secs_f64();
        let tokens_per_second = if decode_secs > 0.0 {
            decode_tokens as f64 / decode_secs
        } else {
            0.0
        };

        Self {
            total_time_ms: (prefill + decode).as_secs_f64() * 1000.0,
            prefill_time_ms: prefill.as_secs_f64() * 1000.0,
            decode_time_ms: decode_secs * 1000.0,
            tokens_per_second,
            prefill_tokens,
            decode_tokens,
        }
    }

    /// Clamp every real-valued field to a finite, non-negative number.
    pub fn sanitized(self) -> Self {
        fn clamp(v: f64) -> f64 {
            if v.is_finite() && v > 0.0 {
                v
            } else {
                0.0
            }
        }

        Self {
            total_time_ms: clamp(self.total_time_ms),
            prefill_time_ms: clamp(self.prefill_time_ms),
            decode_time_ms: clamp(self.decode_time_ms),
            tokens_per_second: clamp(self.tokens_per_second),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_from_timings() {
        let m = GenerationMetrics::from_timings(
            Duration::from_millis(50),
            Duration::from_millis(500),
            10,
            20,
        );
        assert_eq!(m.prefill_tokens, 10);
        assert!((m.total_time_ms - 550.0).abs() < 1e-6);
        assert!((m.tokens_per_second - 40.0).abs() < 1e-6);

        let instant = GenerationMetrics::from_timings(Duration::ZERO, Duration::ZERO, 1, 0);
        assert_eq!(instant.tokens_per_second, 0.0);
    }

    #[test]
    fn test_sanitized_clamps_garbage() {
        let m = GenerationMetrics {
            total_time_ms: f64::NAN,
            prefill_time_ms: -3.0,
            decode_time_ms: f64::INFINITY,
            tokens_per_second: 12.5,
            prefill_tokens: 4,
            decode_tokens: 8,
        }
        .sanitized();

        assert_eq!(m.total_time_ms, 0.0);
        assert_eq!(m.prefill_time_ms, 0.0);
        assert_eq!(m.decode_time_ms, 0.0);
        assert_eq!(m.tokens_per_second, 12.5);
        assert_eq!(m.decode_tokens, 8);
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let json = serde_json::to_value(StreamingResponse::complete("hi")).unwrap();
        assert_eq!(json["accumulatedText"], "hi");
        assert_eq!(json["isFinal"], true);
    }
}
