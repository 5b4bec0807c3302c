//! Selection state and the request builder.
//!
//! Everything here is synchronous and side-effect free apart from mutating
//! `self`; the async lifecycle lives in [`super::EvaluationSession`].

use std::collections::BTreeMap;

use crate::api::{
    CompareRequest, DetectorOption, DetectorSelection, EvaluationConfig, EvaluationMode,
    EvaluationRequest, EvaluationResponse, JuryRequest, JuryRoleOption, JuryRoleSelection,
    LlmConfig, ModelOption,
};

use super::error::{ValidationError, MAX_COMPARE_MODELS};

/// Where the session is in the submit cycle.
///
/// Only `submit` drives this. A failed catalog load sets the error message
/// but leaves the status alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// Full session state. Read it through [`super::EvaluationSession::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub mode: EvaluationMode,
    pub input_text: String,
    pub llm_base_url: String,
    pub llm_api_key: String,

    // Catalog, replaced wholesale on every successful load.
    pub models: Vec<ModelOption>,
    pub detectors: Vec<DetectorOption>,
    pub jury_roles: Vec<JuryRoleOption>,

    /// Ordered, duplicate-free.
    pub selected_models: Vec<String>,
    /// Ordered, at most one entry per role id.
    pub selected_roles: Vec<JuryRoleSelection>,
    /// Keyed by detector id; a missing key means "not configured yet".
    pub selected_detectors: BTreeMap<String, DetectorSelection>,

    pub loading: bool,
    pub submitting: bool,
    pub result: Option<EvaluationResponse>,
    /// Empty when there is no error to show.
    pub error_message: String,
    /// Whether the last finished submit failed.
    pub submission_failed: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SubmissionStatus {
        if self.submitting {
            SubmissionStatus::Submitting
        } else if self.submission_failed {
            SubmissionStatus::Failed
        } else if self.result.is_some() {
            SubmissionStatus::Succeeded
        } else {
            SubmissionStatus::Idle
        }
    }

    /// Replace the catalog and seed a selection for every listed detector.
    ///
    /// Seeding overwrites prior entries for listed ids and keeps entries for
    /// ids the new catalog no longer lists.
    pub fn apply_config(&mut self, config: EvaluationConfig) {
        self.models = config.models;
        self.detectors = config.detectors;
        self.jury_roles = config.jury_roles;

        for detector in &self.detectors {
            self.selected_detectors.insert(
                detector.id.clone(),
                DetectorSelection {
                    id: detector.id.clone(),
                    enabled: true,
                    threshold: Some(detector.default_threshold),
                },
            );
        }
    }

    // =========================================================================
    // Selections
    // =========================================================================

    pub fn toggle_detector(&mut self, detector_id: &str, enabled: bool) {
        match self.selected_detectors.get_mut(detector_id) {
            Some(current) => current.enabled = enabled,
            None => {
                self.selected_detectors.insert(
                    detector_id.to_string(),
                    DetectorSelection {
                        id: detector_id.to_string(),
                        enabled,
                        threshold: None,
                    },
                );
            }
        }
    }

    /// No-op for detectors without a selection.
    pub fn update_detector_threshold(&mut self, detector_id: &str, threshold: f64) {
        if let Some(current) = self.selected_detectors.get_mut(detector_id) {
            current.threshold = Some(threshold);
        }
    }

    /// Enabled selections in detector-id order.
    pub fn active_detectors(&self) -> Vec<DetectorSelection> {
        self.selected_detectors
            .values()
            .filter(|selection| selection.enabled)
            .cloned()
            .collect()
    }

    pub fn update_roles(&mut self, role_id: &str, weight: f64, checked: bool) {
        if checked {
            match self.selected_roles.iter_mut().find(|role| role.id == role_id) {
                Some(existing) => existing.weight = weight,
                None => self.selected_roles.push(JuryRoleSelection {
                    id: role_id.to_string(),
                    weight,
                }),
            }
        } else {
            self.selected_roles.retain(|role| role.id != role_id);
        }
    }

    pub fn select_model(&mut self, model_id: &str, checked: bool) {
        if checked {
            if !self.selected_models.iter().any(|id| id == model_id) {
                self.selected_models.push(model_id.to_string());
            }
        } else {
            self.selected_models.retain(|id| id != model_id);
        }
    }

    /// Replace the model selection, dropping repeats after their first
    /// occurrence.
    pub fn set_selected_models<I, S>(&mut self, model_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_models.clear();
        for id in model_ids {
            let id = id.into();
            if !self.selected_models.contains(&id) {
                self.selected_models.push(id);
            }
        }
    }

    pub fn reset_result(&mut self) {
        self.result = None;
        self.error_message.clear();
        self.submission_failed = false;
    }

    // =========================================================================
    // Payload
    // =========================================================================

    /// Validate the current selections and build the evaluate payload.
    pub fn build_request(&self) -> Result<EvaluationRequest, ValidationError> {
        self.validate()?;

        let detectors = self.active_detectors();
        let llm = Some(LlmConfig {
            base_url: self.llm_base_url.clone(),
            api_key: self.llm_api_key.clone(),
        });

        let request = match self.mode {
            EvaluationMode::Compare => EvaluationRequest {
                mode: self.mode,
                compare: Some(CompareRequest {
                    input_text: self.input_text.clone(),
                    models: self.selected_models.clone(),
                    detectors,
                }),
                jury: None,
                llm,
            },
            EvaluationMode::Jury => EvaluationRequest {
                mode: self.mode,
                compare: None,
                jury: Some(JuryRequest {
                    input_text: self.input_text.clone(),
                    roles: self.selected_roles.clone(),
                    detectors,
                }),
                llm,
            },
        };
        Ok(request)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self.mode {
            EvaluationMode::Compare if self.selected_models.is_empty() => {
                return Err(ValidationError::NoModels);
            }
            EvaluationMode::Jury if self.selected_roles.is_empty() => {
                return Err(ValidationError::NoRoles);
            }
            _ => {}
        }

        if self.mode == EvaluationMode::Compare && self.selected_models.len() > MAX_COMPARE_MODELS {
            return Err(ValidationError::TooManyModels {
                count: self.selected_models.len(),
                max: MAX_COMPARE_MODELS,
            });
        }

        for selection in self.selected_detectors.values().filter(|s| s.enabled) {
            if let Some(threshold) = selection.threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(ValidationError::ThresholdOutOfRange {
                        detector_id: selection.id.clone(),
                        threshold,
                    });
                }
            }
        }

        if self.mode == EvaluationMode::Jury {
            for role in &self.selected_roles {
                if !role.weight.is_finite() || role.weight < 0.0 {
                    return Err(ValidationError::InvalidWeight {
                        role_id: role.id.clone(),
                        weight: role.weight,
                    });
                }
            }
        }

        Ok(())
    }
}
