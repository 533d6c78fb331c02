// crates/loangate-core/src/core/stage.rs
// ============================================================================
// Module: Loangate Stage Records
// Description: Stage names, per-stage outputs, and append-only stage records.
// Purpose: Provide serializable records for every pipeline stage execution.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each pipeline attempt appends one record per executed stage. Records carry
//! the stage name, the stage handler version, timing, and a tagged output
//! payload. Records are append-only: a retried attempt writes new records and
//! the latest attempt wins at decision time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::decision::Decision;
use crate::core::decision::LlmAnalysis;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Stage Names
// ============================================================================

/// Pipeline stage identifier, in fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Deterministic rules over the payload.
    Rules,
    /// Feature vector extraction.
    Features,
    /// External ML scoring call.
    Ml,
    /// LLM adjudication.
    Llm,
    /// Final decision assembly.
    Assembly,
}

impl StageName {
    /// Returns a stable label for persistence and telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Features => "features",
            Self::Ml => "ml",
            Self::Llm => "llm",
            Self::Assembly => "assembly",
        }
    }

    /// Parses a stage name from its stable label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rules" => Some(Self::Rules),
            "features" => Some(Self::Features),
            "ml" => Some(Self::Ml),
            "llm" => Some(Self::Llm),
            "assembly" => Some(Self::Assembly),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Rules Output
// ============================================================================

/// Output of the rules stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesOutput {
    /// Codes of triggered rules, in rule-pack order.
    pub rule_flags: Vec<String>,
    /// Additive rule score within [0, 1].
    pub rule_score: f64,
    /// True when any hard-fail rule fired.
    pub hard_fail: bool,
    /// Version of the rule pack that produced this output.
    pub rulepack_version: String,
}

// ============================================================================
// SECTION: Feature Output
// ============================================================================

/// Output of the features stage: exactly fifteen named numeric features.
///
/// # Invariants
/// - `values` has exactly the length of [`crate::features::FEATURE_NAMES`]
///   and the same ordering.
/// - Every value is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Feature values in declared order.
    pub values: Vec<f64>,
    /// Version of the feature set definition.
    pub feature_set_version: String,
}

// ============================================================================
// SECTION: ML Output
// ============================================================================

/// One entry of the model's feature importance explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFeature {
    /// Feature name.
    pub feature_name: String,
    /// Feature value the model saw.
    pub feature_value: f64,
    /// Global importance of the feature.
    pub importance: f64,
    /// Signed contribution to this prediction.
    pub contribution: f64,
}

/// Output of the ML scoring stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlOutput {
    /// Calibrated fraud confidence within [0, 1].
    pub confidence_score: f64,
    /// Ordered feature importance explanation.
    pub top_features: Vec<TopFeature>,
    /// Model version reported by the service.
    pub model_version: String,
    /// Calibration version reported by the service.
    pub calibration_version: String,
    /// Service-side inference latency in milliseconds.
    pub inference_time_ms: u64,
}

// ============================================================================
// SECTION: Adjudication Outcome
// ============================================================================

/// Result of the LLM adjudication stage.
///
/// The adjudicator may be skipped (trigger not met), unavailable (circuit
/// breaker open), forced into review (invalid JSON twice), or produce a
/// validated analysis. All four shapes persist as the stage output so the
/// assembler and the poll projection can explain what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjudicationOutcome {
    /// Trigger conditions were not met; the stage produced no analysis.
    Skipped {
        /// Why the adjudicator did not run.
        reason: String,
    },
    /// The circuit breaker was open; no outbound call was made.
    Unavailable {
        /// Why the adjudicator could not run.
        reason: String,
    },
    /// The provider failed to produce valid JSON twice; route to review.
    InvalidJson {
        /// Reason surfaced in the decision.
        reason: String,
    },
    /// A validated analysis was produced.
    Analyzed {
        /// The structured analysis.
        analysis: LlmAnalysis,
    },
}

impl AdjudicationOutcome {
    /// Returns the analysis when one was produced.
    #[must_use]
    pub const fn analysis(&self) -> Option<&LlmAnalysis> {
        match self {
            Self::Analyzed {
                analysis,
            } => Some(analysis),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Stage Records
// ============================================================================

/// Tagged output payload for a stage record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage_output", rename_all = "snake_case")]
pub enum StageOutput {
    /// Rules stage output.
    Rules(RulesOutput),
    /// Features stage output.
    Features(FeatureVector),
    /// ML stage output.
    Ml(MlOutput),
    /// LLM adjudication stage output.
    Llm(AdjudicationOutcome),
    /// Assembly stage output.
    Assembly(Decision),
}

/// Append-only record of one stage execution within one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage: StageName,
    /// Stage handler version.
    pub version: String,
    /// Stage start time.
    pub started_at: Timestamp,
    /// Stage end time.
    pub ended_at: Timestamp,
    /// Stage duration in milliseconds.
    pub duration_ms: u64,
    /// Stage output when the stage succeeded.
    pub output: Option<StageOutput>,
    /// Sanitized error message when the stage failed.
    pub error: Option<String>,
}
