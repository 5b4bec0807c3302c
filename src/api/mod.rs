//! Evaluation service boundary: wire types, service traits and the HTTP client.

pub mod error;
pub mod http;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::Instant;

pub use error::{ErrorContext, ServiceError};
pub use http::{ClientConfig, HttpEvaluationClient};
pub use types::*;
pub use usage::{CallRecord, CallSink, CallStatus, NoopCallSink, TracingCallSink};

/// Source of the evaluation catalog (models, detectors, jury roles).
#[async_trait::async_trait]
pub trait ConfigService: Send + Sync {
    async fn fetch_config(&self) -> Result<EvaluationConfig, ServiceError>;
}

/// Runs an evaluation request and returns its result.
#[async_trait::async_trait]
pub trait EvaluationService: Send + Sync {
    async fn submit_evaluation(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResponse, ServiceError>;
}

/// Wraps a service and reports every call to a [`CallSink`].
pub struct MeteredService<S, U: CallSink> {
    inner: S,
    sink: Arc<U>,
}

impl<S, U: CallSink> MeteredService<S, U> {
    pub fn new(inner: S, sink: Arc<U>) -> Self {
        Self { inner, sink }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn record<T>(&self, record: CallRecord, started: Instant, result: &Result<T, ServiceError>) {
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let record = record.latency(latency_ms);
        let record = match result {
            Ok(_) => record,
            Err(err) => record.error(err.code()).request_id(err.request_id()),
        };
        self.sink.record(record).await;
    }
}

#[async_trait::async_trait]
impl<S: ConfigService, U: CallSink> ConfigService for MeteredService<S, U> {
    async fn fetch_config(&self) -> Result<EvaluationConfig, ServiceError> {
        let started = Instant::now();
        let result = self.inner.fetch_config().await;
        self.record(CallRecord::new("config"), started, &result).await;
        result
    }
}

#[async_trait::async_trait]
impl<S: EvaluationService, U: CallSink> EvaluationService for MeteredService<S, U> {
    async fn submit_evaluation(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResponse, ServiceError> {
        let started = Instant::now();
        let result = self.inner.submit_evaluation(request).await;
        self.record(CallRecord::new("evaluate").mode(request.mode), started, &result)
            .await;
        result
    }
}
