//! Call metering via the CallSink trait.
//!
//! `MeteredService` reports every service call through a CallSink so the
//! client stays independent of where the records end up:
//! - the CLI uses TracingCallSink
//! - tests use NoopCallSink or a collecting sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::EvaluationMode;

/// Status of a service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of one evaluation service call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Endpoint: "config" or "evaluate".
    pub endpoint: &'static str,
    /// Mode of the submitted request (evaluate only).
    pub mode: Option<EvaluationMode>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Call status.
    pub status: CallStatus,
    /// Error code if status is Error.
    pub error_code: Option<String>,
    /// Service request ID (for debugging).
    pub request_id: Option<String>,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            mode: None,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            request_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }

    pub fn request_id(mut self, id: Option<&str>) -> Self {
        self.request_id = id.map(str::to_string);
        self
    }
}

/// Trait for recording service calls.
#[async_trait]
pub trait CallSink: Send + Sync {
    /// Record a call. Fire-and-forget: failures are not propagated.
    async fn record(&self, record: CallRecord);
}

/// Sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallSink;

#[async_trait]
impl CallSink for NoopCallSink {
    async fn record(&self, _record: CallRecord) {}
}

/// Sink that emits each record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCallSink;

#[async_trait]
impl CallSink for TracingCallSink {
    async fn record(&self, record: CallRecord) {
        let mode = record.mode.map(|m| m.as_str()).unwrap_or("-");
        match record.status {
            CallStatus::Success => tracing::info!(
                endpoint = record.endpoint,
                mode,
                latency_ms = record.latency_ms,
                status = record.status.as_str(),
                "evaluation service call"
            ),
            CallStatus::Error => tracing::warn!(
                endpoint = record.endpoint,
                mode,
                latency_ms = record.latency_ms,
                status = record.status.as_str(),
                error_code = record.error_code.as_deref().unwrap_or("unknown"),
                request_id = record.request_id.as_deref().unwrap_or("-"),
                "evaluation service call failed"
            ),
        }
    }
}
