//! Wire types shared with the evaluation service.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// CATALOG
// =============================================================================

/// Candidate model offered for compare mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Analysis detector offered by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorOption {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Threshold a freshly seeded selection starts with.
    #[serde(default = "default_detector_threshold")]
    pub default_threshold: f64,
}

fn default_detector_threshold() -> f64 {
    0.5
}

/// Jury perspective offered for jury mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryRoleOption {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Response of the config endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub models: Vec<ModelOption>,
    pub detectors: Vec<DetectorOption>,
    pub jury_roles: Vec<JuryRoleOption>,
}

// =============================================================================
// REQUEST
// =============================================================================

/// Which evaluation flow a request runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Run several models on the same input and diff their outputs.
    #[default]
    Compare,
    /// Have several role perspectives score a single output.
    Jury,
}

impl EvaluationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationMode::Compare => "compare",
            EvaluationMode::Jury => "jury",
        }
    }
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User configuration for one detector.
///
/// `threshold` stays unset for detectors toggled on before the catalog seeded
/// them; the service then applies its own default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSelection {
    pub id: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// A checked jury role and the weight its opinion carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryRoleSelection {
    pub id: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareRequest {
    pub input_text: String,
    pub models: Vec<String>,
    pub detectors: Vec<DetectorSelection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryRequest {
    pub input_text: String,
    pub roles: Vec<JuryRoleSelection>,
    pub detectors: Vec<DetectorSelection>,
}

/// Connection details for the LLM endpoint the service should call.
///
/// Passed through verbatim; empty values let the service fall back to its own
/// defaults.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let api_key = if self.api_key.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &api_key)
            .finish()
    }
}

/// Body of the evaluate endpoint. Exactly one of `compare`/`jury` is set,
/// matching `mode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub mode: EvaluationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare: Option<CompareRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jury: Option<JuryRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
}

// =============================================================================
// RESPONSE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSnippet {
    pub model_id: String,
    pub content: String,
    /// Unified-diff lines against the first model's completion.
    #[serde(default)]
    pub highlighted_diff: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorIssue {
    pub detector_id: String,
    pub severity: String,
    pub summary: String,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareResult {
    /// Server timestamp, kept as sent.
    pub generated_at: String,
    /// Model id -> completion text.
    pub completions: BTreeMap<String, String>,
    pub diffs: Vec<DiffSnippet>,
    pub detector_issues: Vec<DetectorIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryRoleOpinion {
    pub role_id: String,
    pub summary: String,
    pub score: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryAggregate {
    pub overall_score: f64,
    /// Dimension -> score for radar display.
    pub radar: BTreeMap<String, f64>,
    pub consensus: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryResult {
    pub generated_at: String,
    pub opinions: Vec<JuryRoleOpinion>,
    pub aggregate: JuryAggregate,
    pub detector_issues: Vec<DetectorIssue>,
}

/// Result of an evaluation. Stored as received; nothing in this crate
/// interprets its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub mode: EvaluationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_result: Option<CompareResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jury_result: Option<JuryResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_default_threshold_applies_when_missing() {
        let detector: DetectorOption =
            serde_json::from_str(r#"{"id": "readability", "label": "Readability"}"#).unwrap();
        assert_eq!(detector.default_threshold, 0.5);
        assert!(detector.description.is_none());
    }

    #[test]
    fn unset_threshold_is_omitted_from_payload() {
        let selection = DetectorSelection {
            id: "d2".into(),
            enabled: false,
            threshold: None,
        };
        let value = serde_json::to_value(&selection).unwrap();
        assert_eq!(value, serde_json::json!({"id": "d2", "enabled": false}));
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EvaluationMode::Jury).unwrap(),
            "\"jury\""
        );
        assert_eq!(EvaluationMode::default(), EvaluationMode::Compare);
    }

    #[test]
    fn llm_config_debug_hides_api_key() {
        let llm = LlmConfig {
            base_url: "https://api.example.com/v1".into(),
            api_key: "sk-secret".into(),
        };
        let rendered = format!("{llm:?}");
        assert!(rendered.contains("https://api.example.com/v1"));
        assert!(!rendered.contains("sk-secret"));
    }
}
