//! Evaluation session: catalog loading, selections and the submit lifecycle.
//!
//! A session owns a [`SessionState`] behind a mutex that is only held for
//! synchronous sections, so accessors stay usable while `initialise` or
//! `submit` is awaiting the service. Each of the two async operations is
//! single-flight: a second call while the first is pending is rejected.

pub mod error;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{
    ConfigService, DetectorOption, DetectorSelection, EvaluationMode, EvaluationRequest,
    EvaluationResponse, EvaluationService, JuryRoleOption, JuryRoleSelection, ModelOption,
};

pub use error::{
    ConfigLoadError, SubmissionError, ValidationError, CONFIG_LOAD_FAILURE_MESSAGE,
    GENERIC_FAILURE_MESSAGE, MAX_COMPARE_MODELS,
};
pub use state::{SessionState, SubmissionStatus};

pub struct EvaluationSession {
    id: Uuid,
    config_service: Arc<dyn ConfigService>,
    evaluation_service: Arc<dyn EvaluationService>,
    state: Mutex<SessionState>,
}

#[derive(Clone, Copy)]
enum Flag {
    Loading,
    Submitting,
}

/// Clears a lifecycle flag when dropped, including when the owning future is
/// dropped mid-await.
struct FlagGuard<'a> {
    state: &'a Mutex<SessionState>,
    flag: Flag,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match self.flag {
            Flag::Loading => state.loading = false,
            Flag::Submitting => state.submitting = false,
        }
    }
}

impl EvaluationSession {
    pub fn new(
        config_service: Arc<dyn ConfigService>,
        evaluation_service: Arc<dyn EvaluationService>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_service,
            evaluation_service,
            state: Mutex::new(SessionState::new()),
        }
    }

    /// Build a session whose client serves both the catalog and evaluations.
    pub fn with_client<C>(client: Arc<C>) -> Self
    where
        C: ConfigService + EvaluationService + 'static,
    {
        Self::new(client.clone(), client)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set `flag` unless it is already set; the returned guard clears it.
    fn begin(&self, flag: Flag) -> Option<FlagGuard<'_>> {
        let mut state = self.lock();
        let slot = match flag {
            Flag::Loading => &mut state.loading,
            Flag::Submitting => &mut state.submitting,
        };
        if *slot {
            return None;
        }
        *slot = true;
        Some(FlagGuard {
            state: &self.state,
            flag,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the catalog and seed detector selections from it.
    pub async fn initialise(&self) -> Result<(), ConfigLoadError> {
        let _guard = self.begin(Flag::Loading).ok_or(ConfigLoadError::InFlight)?;
        debug!(session = %self.id, "loading evaluation config");

        match self.config_service.fetch_config().await {
            Ok(config) => {
                info!(
                    session = %self.id,
                    models = config.models.len(),
                    detectors = config.detectors.len(),
                    jury_roles = config.jury_roles.len(),
                    "evaluation config loaded"
                );
                self.lock().apply_config(config);
                Ok(())
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, code = err.code(), "config load failed");
                self.lock().error_message = CONFIG_LOAD_FAILURE_MESSAGE.to_string();
                Err(err.into())
            }
        }
    }

    /// Validate, build and submit the current selections.
    ///
    /// On success the response is stored and returned. On failure the error
    /// message is set and any previous result stays in place.
    pub async fn submit(&self) -> Result<EvaluationResponse, SubmissionError> {
        let _guard = self
            .begin(Flag::Submitting)
            .ok_or(SubmissionError::InFlight)?;

        let built = {
            let mut state = self.lock();
            state.error_message.clear();
            state.submission_failed = false;
            state.build_request()
        };

        let outcome = match built {
            Ok(request) => {
                debug!(
                    session = %self.id,
                    mode = %request.mode,
                    "submitting evaluation"
                );
                self.evaluation_service
                    .submit_evaluation(&request)
                    .await
                    .map_err(SubmissionError::from)
            }
            Err(err) => Err(err.into()),
        };

        let mut state = self.lock();
        match outcome {
            Ok(response) => {
                info!(session = %self.id, mode = %response.mode, "evaluation finished");
                state.result = Some(response.clone());
                Ok(response)
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, code = err.code(), "evaluation failed");
                state.error_message = err.user_message();
                state.submission_failed = true;
                Err(err)
            }
        }
    }

    /// Dismiss the current result and error message.
    pub fn reset_result(&self) {
        self.lock().reset_result();
    }

    /// Validate and build the payload `submit` would send, without sending it.
    pub fn build_request(&self) -> Result<EvaluationRequest, ValidationError> {
        self.lock().build_request()
    }

    // =========================================================================
    // Selections
    // =========================================================================

    pub fn set_mode(&self, mode: EvaluationMode) {
        self.lock().mode = mode;
    }

    pub fn set_input_text(&self, text: impl Into<String>) {
        self.lock().input_text = text.into();
    }

    pub fn set_llm_base_url(&self, url: impl Into<String>) {
        self.lock().llm_base_url = url.into();
    }

    pub fn set_llm_api_key(&self, key: impl Into<String>) {
        self.lock().llm_api_key = key.into();
    }

    pub fn select_model(&self, model_id: &str, checked: bool) {
        self.lock().select_model(model_id, checked);
    }

    pub fn set_selected_models<I, S>(&self, model_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().set_selected_models(model_ids);
    }

    pub fn toggle_detector(&self, detector_id: &str, enabled: bool) {
        self.lock().toggle_detector(detector_id, enabled);
    }

    pub fn update_detector_threshold(&self, detector_id: &str, threshold: f64) {
        self.lock().update_detector_threshold(detector_id, threshold);
    }

    pub fn update_roles(&self, role_id: &str, weight: f64, checked: bool) {
        self.lock().update_roles(role_id, weight, checked);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Copy of the whole state.
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn status(&self) -> SubmissionStatus {
        self.lock().status()
    }

    pub fn mode(&self) -> EvaluationMode {
        self.lock().mode
    }

    pub fn loading(&self) -> bool {
        self.lock().loading
    }

    pub fn submitting(&self) -> bool {
        self.lock().submitting
    }

    pub fn result(&self) -> Option<EvaluationResponse> {
        self.lock().result.clone()
    }

    pub fn error_message(&self) -> String {
        self.lock().error_message.clone()
    }

    pub fn models(&self) -> Vec<ModelOption> {
        self.lock().models.clone()
    }

    pub fn detectors(&self) -> Vec<DetectorOption> {
        self.lock().detectors.clone()
    }

    pub fn jury_roles(&self) -> Vec<JuryRoleOption> {
        self.lock().jury_roles.clone()
    }

    pub fn selected_models(&self) -> Vec<String> {
        self.lock().selected_models.clone()
    }

    pub fn selected_roles(&self) -> Vec<JuryRoleSelection> {
        self.lock().selected_roles.clone()
    }

    pub fn detector_selection(&self, detector_id: &str) -> Option<DetectorSelection> {
        self.lock().selected_detectors.get(detector_id).cloned()
    }

    pub fn active_detectors(&self) -> Vec<DetectorSelection> {
        self.lock().active_detectors()
    }
}
