#![forbid(unsafe_code)]

//! # inspection-client
//!
//! Client-side session for the inspection evaluation service.
//!
//! An [`EvaluationSession`] loads the service's catalog (models, detectors,
//! jury roles), holds the user's selections, validates them into an
//! [`EvaluationRequest`] and tracks the submission until a result or an error
//! comes back. The service itself sits behind the [`ConfigService`] and
//! [`EvaluationService`] traits; [`HttpEvaluationClient`] implements both over
//! HTTP.

pub mod api;
pub mod session;

pub use api::{
    CallSink, ClientConfig, ConfigService, EvaluationConfig, EvaluationMode, EvaluationRequest,
    EvaluationResponse, EvaluationService, HttpEvaluationClient, MeteredService, ServiceError,
};
pub use session::{
    ConfigLoadError, EvaluationSession, SessionState, SubmissionError, SubmissionStatus,
    ValidationError,
};
