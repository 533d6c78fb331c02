// crates/loangate-core/src/assemble.rs
// ============================================================================
// Module: Loangate Decision Assembly
// Description: Final routing policy over rules, ML, and adjudication outputs.
// Purpose: Combine three heterogeneous scores into one immutable decision.
// Dependencies: crate::core, crate::decide
// ============================================================================

//! ## Overview
//! The assembler consumes the rules output, the optional ML output, and the
//! optional adjudication outcome, and routes to one of four outcomes. Clauses
//! evaluate top-down; the first match wins. When the adjudicator produced no
//! analysis, routing falls back to `max(rule_score, ml_confidence)` against
//! the combine thresholds. Reasons accumulate rule-first and cap at five.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::decision::Decision;
use crate::core::decision::LlmAnalysis;
use crate::core::decision::Outcome;
use crate::core::decision::Stipulation;
use crate::core::stage::AdjudicationOutcome;
use crate::core::stage::MlOutput;
use crate::core::stage::RulesOutput;
use crate::decide::DecisionThresholds;
use crate::decide::build_stipulations;
use crate::decide::gates_pass;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Policy version recorded in every decision.
pub const POLICY_VERSION: &str = "policy-2025.06.0";

/// Maximum number of reasons surfaced on a decision.
const MAX_REASONS: usize = 5;

/// Combined-score floor for a fallback decline.
const COMBINE_DECLINE_FLOOR: f64 = 0.8;
/// Combined-score floor for a fallback review.
const COMBINE_REVIEW_FLOOR: f64 = 0.6;

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Assembles the final decision for one attempt.
///
/// Pure: depends only on the stage outputs, the thresholds, and the supplied
/// timings.
#[must_use]
pub fn assemble(
    rules: &RulesOutput,
    ml: Option<&MlOutput>,
    adjudication: Option<&AdjudicationOutcome>,
    thresholds: &DecisionThresholds,
    timings_ms: BTreeMap<String, u64>,
) -> Decision {
    let (final_decision, determining, stipulations) =
        route(rules, ml, adjudication, thresholds);
    let reasons = collect_reasons(determining, rules, ml, adjudication.and_then(AdjudicationOutcome::analysis));
    Decision {
        final_decision,
        reasons,
        stipulations,
        policy_version: POLICY_VERSION.to_string(),
        timings_ms,
    }
}

/// Routing clauses, evaluated top-down; first match wins.
fn route(
    rules: &RulesOutput,
    ml: Option<&MlOutput>,
    adjudication: Option<&AdjudicationOutcome>,
    thresholds: &DecisionThresholds,
) -> (Outcome, Option<String>, Vec<Stipulation>) {
    if rules.hard_fail {
        return (Outcome::Decline, None, Vec::new());
    }

    if let Some(AdjudicationOutcome::InvalidJson {
        reason,
    }) = adjudication
    {
        return (Outcome::Review, Some(reason.clone()), Vec::new());
    }

    if let Some(analysis) = adjudication.and_then(AdjudicationOutcome::analysis) {
        return route_with_analysis(analysis, thresholds);
    }

    // Fallback: the adjudicator was skipped or unavailable.
    let combined = rules.rule_score.max(ml.map_or(0.0, |output| output.confidence_score));
    if combined >= COMBINE_DECLINE_FLOOR {
        (Outcome::Decline, Some("Combined risk score at decline floor".to_string()), Vec::new())
    } else if combined >= COMBINE_REVIEW_FLOOR {
        (Outcome::Review, Some("Combined risk score at review floor".to_string()), Vec::new())
    } else {
        (Outcome::Approve, None, Vec::new())
    }
}

/// Routing clauses that require a validated analysis.
fn route_with_analysis(
    analysis: &LlmAnalysis,
    thresholds: &DecisionThresholds,
) -> (Outcome, Option<String>, Vec<Stipulation>) {
    if analysis.signals.fraud_hard_fail {
        return (Outcome::Decline, Some("Hard fraud signal".to_string()), Vec::new());
    }
    if analysis.confidence < thresholds.min_confidence_for_auto {
        return (
            Outcome::Review,
            Some("Confidence below auto-decision floor".to_string()),
            Vec::new(),
        );
    }
    if analysis.fraud_probability > thresholds.fraud_decline_threshold {
        return (
            Outcome::Decline,
            Some("Fraud probability above decline threshold".to_string()),
            Vec::new(),
        );
    }
    if analysis.fraud_probability > thresholds.fraud_review_threshold {
        return (
            Outcome::Review,
            Some("Fraud probability above review threshold".to_string()),
            Vec::new(),
        );
    }
    if gates_pass(&analysis.credit, thresholds) {
        return (Outcome::Approve, None, Vec::new());
    }
    let stipulations = build_stipulations(&analysis.credit, thresholds);
    if stipulations.is_empty() {
        return (
            Outcome::Review,
            Some("Credit gates failed with no mechanical remedy".to_string()),
            Vec::new(),
        );
    }
    (
        Outcome::Conditional,
        Some("Credit gates failed with mechanical remedies".to_string()),
        stipulations,
    )
}

/// Accumulates reasons: determining reason, then rule flags, then ML top
/// feature names, then LLM primary concerns, capped at five.
fn collect_reasons(
    determining: Option<String>,
    rules: &RulesOutput,
    ml: Option<&MlOutput>,
    analysis: Option<&LlmAnalysis>,
) -> Vec<String> {
    let mut reasons = Vec::new();
    if let Some(reason) = determining {
        reasons.push(reason);
    }
    for flag in &rules.rule_flags {
        reasons.push(flag.clone());
    }
    if let Some(output) = ml {
        for feature in &output.top_features {
            reasons.push(feature.feature_name.clone());
        }
    }
    if let Some(analysis) = analysis {
        for concern in &analysis.primary_concerns {
            reasons.push(concern.clone());
        }
    }
    reasons.dedup();
    reasons.truncate(MAX_REASONS);
    reasons
}
