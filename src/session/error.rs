//! Error types for session initialisation and submission.

use thiserror::Error;

use crate::api::ServiceError;

/// Message shown when the catalog cannot be loaded.
pub const CONFIG_LOAD_FAILURE_MESSAGE: &str = "failed to load configuration, please try again later.";

/// Message shown when a submission fails without a usable message of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "request failed, check the network or configuration.";

/// Largest number of models the service compares in one request.
pub const MAX_COMPARE_MODELS: usize = 3;

/// Local rule violated by the current selections. Raised before any network
/// call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("at least one comparison model is required.")]
    NoModels,

    #[error("at least one jury role is required.")]
    NoRoles,

    #[error("at most {max} models can be compared at once (got {count}).")]
    TooManyModels { count: usize, max: usize },

    #[error("threshold for detector '{detector_id}' must be between 0 and 1 (got {threshold}).")]
    ThresholdOutOfRange { detector_id: String, threshold: f64 },

    #[error("weight for jury role '{role_id}' must be a non-negative number (got {weight}).")]
    InvalidWeight { role_id: String, weight: f64 },
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config service error: {0}")]
    Service(#[from] ServiceError),

    #[error("configuration is already loading")]
    InFlight,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("evaluation service error: {0}")]
    Service(#[from] ServiceError),

    #[error("a submission is already in flight")]
    InFlight,
}

impl SubmissionError {
    /// Text stored in the session's error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Service(err) => err
                .user_message()
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            Self::InFlight => self.to_string(),
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Service(err) => err.code(),
            Self::InFlight => "in_flight",
        }
    }
}
