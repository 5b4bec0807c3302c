use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inspection_client::api::{
    DetectorOption, DetectorSelection, EvaluationConfig, EvaluationMode, EvaluationRequest,
    EvaluationResponse, JuryRoleOption, ModelOption, ServiceError,
};
use inspection_client::session::{CONFIG_LOAD_FAILURE_MESSAGE, GENERIC_FAILURE_MESSAGE};
use inspection_client::{
    ConfigLoadError, ConfigService, EvaluationService, EvaluationSession, SubmissionError,
    SubmissionStatus, ValidationError,
};
use tokio::sync::Notify;

/// Scripted stand-in for both services.
#[derive(Default)]
struct StubService {
    config: Mutex<Option<EvaluationConfig>>,
    /// `Some((status, detail))` makes every evaluate call fail.
    fail_with: Mutex<Option<(u16, Option<String>)>>,
    /// When set, evaluate waits for a notification before answering.
    gate: Option<Arc<Notify>>,
    /// When set, config fetches wait for a notification before answering.
    config_gate: Option<Arc<Notify>>,
    config_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    last_request: Mutex<Option<EvaluationRequest>>,
}

impl StubService {
    fn with_config(config: EvaluationConfig) -> Self {
        Self {
            config: Mutex::new(Some(config)),
            ..Default::default()
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    fn gated_config(config: EvaluationConfig, gate: Arc<Notify>) -> Self {
        Self {
            config: Mutex::new(Some(config)),
            config_gate: Some(gate),
            ..Default::default()
        }
    }

    fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }

    fn fail_next(&self, status: u16, detail: Option<&str>) {
        *self.fail_with.lock().unwrap() = Some((status, detail.map(str::to_string)));
    }

    fn succeed(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> EvaluationRequest {
        self.last_request
            .lock()
            .unwrap()
            .clone()
            .expect("expected a submitted request")
    }
}

#[async_trait]
impl ConfigService for StubService {
    async fn fetch_config(&self) -> Result<EvaluationConfig, ServiceError> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.config_gate {
            gate.notified().await;
        }
        let config = self.config.lock().unwrap().clone();
        config.ok_or_else(|| ServiceError::api(503, Some("config unavailable".into())))
    }
}

#[async_trait]
impl EvaluationService for StubService {
    async fn submit_evaluation(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResponse, ServiceError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let failure = self.fail_with.lock().unwrap().clone();
        match failure {
            Some((status, detail)) => Err(ServiceError::api(status, detail)),
            None => Ok(response(request.mode, &format!("run-{n}"))),
        }
    }
}

fn response(mode: EvaluationMode, tag: &str) -> EvaluationResponse {
    serde_json::from_value(serde_json::json!({
        "mode": mode,
        "compare_result": {
            "generated_at": tag,
            "completions": {},
            "diffs": [],
            "detector_issues": []
        }
    }))
    .unwrap()
}

fn sample_config() -> EvaluationConfig {
    EvaluationConfig {
        models: vec![
            ModelOption {
                id: "gpt-4o-mini".into(),
                name: "GPT-4o Mini".into(),
                description: Some("Balanced cost and quality.".into()),
            },
            ModelOption {
                id: "gpt-4o".into(),
                name: "GPT-4o".into(),
                description: None,
            },
        ],
        detectors: vec![
            DetectorOption {
                id: "consistency".into(),
                label: "Consistency".into(),
                description: None,
                default_threshold: 0.6,
            },
            DetectorOption {
                id: "compliance".into(),
                label: "Compliance".into(),
                description: None,
                default_threshold: 0.4,
            },
        ],
        jury_roles: vec![JuryRoleOption {
            id: "legal".into(),
            name: "Legal".into(),
            description: "Risk and compliance".into(),
        }],
    }
}

fn session_over(stub: &Arc<StubService>) -> EvaluationSession {
    EvaluationSession::with_client(stub.clone())
}

#[tokio::test]
async fn initialise_seeds_every_catalog_detector_over_prior_state() {
    let stub = Arc::new(StubService::with_config(sample_config()));
    let session = session_over(&stub);

    session.toggle_detector("consistency", false);
    session.toggle_detector("retired", true);
    session.initialise().await.unwrap();

    for detector in sample_config().detectors {
        let selection = session.detector_selection(&detector.id).unwrap();
        assert!(selection.enabled);
        assert_eq!(selection.threshold, Some(detector.default_threshold));
    }
    // Ids missing from the catalog are left alone.
    assert!(session.detector_selection("retired").is_some());
    assert_eq!(session.models().len(), 2);
    assert_eq!(session.jury_roles().len(), 1);
    assert!(!session.loading());

    // Re-initialising resets thresholds for listed ids again.
    session.update_detector_threshold("compliance", 0.9);
    session.initialise().await.unwrap();
    assert_eq!(
        session.detector_selection("compliance").unwrap().threshold,
        Some(0.4)
    );
}

#[tokio::test]
async fn initialise_failure_keeps_catalog_and_sets_message() {
    let stub = Arc::new(StubService::default());
    let session = session_over(&stub);

    let err = session.initialise().await.unwrap_err();
    assert!(matches!(err, ConfigLoadError::Service(_)));
    assert_eq!(session.error_message(), CONFIG_LOAD_FAILURE_MESSAGE);
    assert!(session.models().is_empty());
    assert!(session.detectors().is_empty());
    assert!(!session.loading());
    // A catalog failure is not a submission outcome.
    assert_eq!(session.status(), SubmissionStatus::Idle);
}

#[tokio::test]
async fn toggles_do_not_leak_between_detectors() {
    let stub = Arc::new(StubService::with_config(sample_config()));
    let session = session_over(&stub);
    session.initialise().await.unwrap();

    let before = session.detector_selection("compliance");
    session.toggle_detector("x", true);
    session.toggle_detector("x", false);

    assert!(!session.detector_selection("x").unwrap().enabled);
    assert_eq!(session.detector_selection("compliance"), before);
}

#[tokio::test]
async fn compare_without_models_never_reaches_the_service() {
    let stub = Arc::new(StubService::with_config(sample_config()));
    let session = session_over(&stub);

    let err = session.submit().await.unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::Validation(ValidationError::NoModels)
    ));
    assert_eq!(
        session.error_message(),
        "at least one comparison model is required."
    );
    assert!(!session.submitting());
    assert_eq!(stub.submit_calls(), 0);
    assert_eq!(session.status(), SubmissionStatus::Failed);
}

#[tokio::test]
async fn jury_without_roles_never_reaches_the_service() {
    let stub = Arc::new(StubService::default());
    let session = session_over(&stub);
    session.set_mode(EvaluationMode::Jury);
    session.set_selected_models(["gpt-4o"]);

    let err = session.submit().await.unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::Validation(ValidationError::NoRoles)
    ));
    assert_eq!(session.error_message(), "at least one jury role is required.");
    assert_eq!(stub.submit_calls(), 0);
}

#[tokio::test]
async fn compare_payload_sends_only_enabled_detectors() {
    let stub = Arc::new(StubService::default());
    let session = session_over(&stub);

    session.set_input_text("hello");
    session.set_selected_models(["gpt-a", "gpt-b"]);
    session.set_llm_base_url("https://llm.example.com/v1");
    session.set_llm_api_key("sk-test");
    session.toggle_detector("d1", true);
    session.update_detector_threshold("d1", 0.5);
    session.toggle_detector("d2", false);

    session.submit().await.unwrap();

    let request = stub.last_request();
    assert_eq!(request.mode, EvaluationMode::Compare);
    assert!(request.jury.is_none());
    let compare = request.compare.unwrap();
    assert_eq!(compare.input_text, "hello");
    assert_eq!(compare.models, vec!["gpt-a", "gpt-b"]);
    assert_eq!(
        compare.detectors,
        vec![DetectorSelection {
            id: "d1".into(),
            enabled: true,
            threshold: Some(0.5),
        }]
    );
    let llm = request.llm.unwrap();
    assert_eq!(llm.base_url, "https://llm.example.com/v1");
    assert_eq!(llm.api_key, "sk-test");
}

#[tokio::test]
async fn jury_payload_uses_roles_in_selection_order() {
    let stub = Arc::new(StubService::with_config(sample_config()));
    let session = session_over(&stub);
    session.initialise().await.unwrap();

    session.set_mode(EvaluationMode::Jury);
    session.set_input_text("draft");
    session.update_roles("seo", 0.5, true);
    session.update_roles("legal", 1.0, true);
    session.update_roles("seo", 2.0, true);
    session.toggle_detector("compliance", false);

    session.submit().await.unwrap();

    let request = stub.last_request();
    assert!(request.compare.is_none());
    let jury = request.jury.unwrap();
    let roles: Vec<(&str, f64)> = jury.roles.iter().map(|r| (r.id.as_str(), r.weight)).collect();
    assert_eq!(roles, vec![("seo", 2.0), ("legal", 1.0)]);
    let detectors: Vec<&str> = jury.detectors.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(detectors, vec!["consistency"]);
}

#[tokio::test]
async fn submitting_flag_clears_on_success_and_failure() {
    let stub = Arc::new(StubService::default());
    let session = session_over(&stub);
    session.set_selected_models(["gpt-4o"]);

    let response = session.submit().await.unwrap();
    assert!(!session.submitting());
    assert!(!session.loading());
    assert_eq!(session.result(), Some(response));
    assert_eq!(session.status(), SubmissionStatus::Succeeded);

    stub.fail_next(500, Some("upstream exploded"));
    session.submit().await.unwrap_err();
    assert!(!session.submitting());
    assert!(!session.loading());
}

#[tokio::test]
async fn failed_submit_keeps_previous_result() {
    let stub = Arc::new(StubService::default());
    let session = session_over(&stub);
    session.set_selected_models(["gpt-4o"]);

    let first = session.submit().await.unwrap();

    stub.fail_next(400, Some("At least one model must be selected for compare mode"));
    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, SubmissionError::Service(_)));
    assert_eq!(session.result(), Some(first));
    assert_eq!(
        session.error_message(),
        "At least one model must be selected for compare mode"
    );

    // Retrying clears the message and replaces the result.
    stub.succeed();
    let second = session.submit().await.unwrap();
    assert_eq!(session.error_message(), "");
    assert_eq!(session.result(), Some(second));
}

#[tokio::test]
async fn service_error_without_detail_uses_fallback_message() {
    let stub = Arc::new(StubService::default());
    let session = session_over(&stub);
    session.set_selected_models(["gpt-4o"]);

    stub.fail_next(502, None);
    session.submit().await.unwrap_err();
    assert_eq!(session.error_message(), GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn reset_result_only_clears_result_and_message() {
    let stub = Arc::new(StubService::with_config(sample_config()));
    let session = session_over(&stub);
    session.initialise().await.unwrap();
    session.set_selected_models(["gpt-4o"]);
    session.update_roles("legal", 1.0, true);
    session.submit().await.unwrap();

    stub.fail_next(500, Some("boom"));
    session.submit().await.unwrap_err();

    session.reset_result();
    let state = session.snapshot();
    assert!(state.result.is_none());
    assert_eq!(state.error_message, "");
    assert_eq!(state.selected_models, vec!["gpt-4o"]);
    assert_eq!(state.selected_roles.len(), 1);
    assert_eq!(state.selected_detectors.len(), 2);
    assert_eq!(session.status(), SubmissionStatus::Idle);
}

#[tokio::test]
async fn overlapping_submit_is_rejected_while_first_completes() {
    let gate = Arc::new(Notify::new());
    let stub = Arc::new(StubService::gated(gate.clone()));
    let session = session_over(&stub);
    session.set_selected_models(["gpt-4o"]);

    let first = session.submit();
    let second = async {
        tokio::task::yield_now().await;
        assert!(session.submitting());
        assert_eq!(session.status(), SubmissionStatus::Submitting);
        let result = session.submit().await;
        gate.notify_one();
        result
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first.is_ok());
    assert!(matches!(second, Err(SubmissionError::InFlight)));
    assert_eq!(stub.submit_calls(), 1);
    assert!(!session.submitting());
    assert_eq!(session.error_message(), "");
}

#[tokio::test]
async fn dropped_submit_still_clears_submitting() {
    let gate = Arc::new(Notify::new());
    let stub = Arc::new(StubService::gated(gate));
    let session = session_over(&stub);
    session.set_selected_models(["gpt-4o"]);

    let timed_out = tokio::time::timeout(Duration::from_millis(20), session.submit()).await;
    assert!(timed_out.is_err());
    assert_eq!(stub.submit_calls(), 1);
    assert!(!session.submitting());
    assert!(session.result().is_none());
}

#[tokio::test]
async fn overlapping_initialise_is_rejected_while_first_completes() {
    let gate = Arc::new(Notify::new());
    let stub = Arc::new(StubService::gated_config(sample_config(), gate.clone()));
    let session = session_over(&stub);

    let first = session.initialise();
    let second = async {
        tokio::task::yield_now().await;
        assert!(session.loading());
        let result = session.initialise().await;
        gate.notify_one();
        result
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first.is_ok());
    assert!(matches!(second, Err(ConfigLoadError::InFlight)));
    assert_eq!(stub.config_calls(), 1);
    assert!(!session.loading());
    assert_eq!(session.models().len(), 2);
    assert_eq!(session.error_message(), "");
}

#[tokio::test]
async fn dropped_initialise_still_clears_loading() {
    let gate = Arc::new(Notify::new());
    let stub = Arc::new(StubService::gated_config(sample_config(), gate.clone()));
    let session = session_over(&stub);

    let timed_out = tokio::time::timeout(Duration::from_millis(20), session.initialise()).await;
    assert!(timed_out.is_err());
    assert_eq!(stub.config_calls(), 1);
    assert!(!session.loading());
    assert!(session.models().is_empty());

    // The flag is free again, so a fresh load goes through.
    gate.notify_one();
    session.initialise().await.unwrap();
    assert_eq!(stub.config_calls(), 2);
    assert_eq!(session.detectors().len(), 2);
}
