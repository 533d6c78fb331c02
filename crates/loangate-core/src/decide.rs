// crates/loangate-core/src/decide.rs
// ============================================================================
// Module: Loangate Adjudicator Routing
// Description: Deterministic routing from a validated LLM analysis.
// Purpose: Turn an analysis into one of four outcomes with stipulations.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! `decide` is a pure function: the outcome depends only on the input
//! analysis and the configured thresholds. Branches evaluate top-down and the
//! first matching clause wins. Stipulations are generated mechanically from
//! the failed credit gates, deduplicated by kind in pti, ltv, tds order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::decision::CreditAssessment;
use crate::core::decision::LlmAnalysis;
use crate::core::decision::Outcome;
use crate::core::decision::Stipulation;
use crate::core::decision::StipulationKind;

// ============================================================================
// SECTION: Thresholds
// ============================================================================

/// Policy thresholds consumed by routing. All values come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// Minimum analysis confidence for automatic decisions.
    pub min_confidence_for_auto: f64,
    /// Fraud probability above which the outcome is decline (strict greater).
    pub fraud_decline_threshold: f64,
    /// Fraud probability above which the outcome is review (strict greater).
    pub fraud_review_threshold: f64,
    /// Maximum acceptable payment-to-income ratio.
    pub pti_cap: f64,
    /// Maximum acceptable total-debt-service ratio.
    pub tds_cap: f64,
    /// Maximum acceptable loan-to-value ratio.
    pub ltv_cap: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            min_confidence_for_auto: 0.75,
            fraud_decline_threshold: 0.8,
            fraud_review_threshold: 0.35,
            pti_cap: 0.15,
            tds_cap: 0.45,
            ltv_cap: 1.20,
        }
    }
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Routing result for one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjudicatorVerdict {
    /// Routed outcome.
    pub outcome: Outcome,
    /// Determining reason for the routed outcome.
    pub reason: String,
    /// Mechanical stipulations for conditional outcomes; empty otherwise.
    pub stipulations: Vec<Stipulation>,
    /// True when the case must land in the human review queue.
    pub queue_for_review: bool,
}

impl AdjudicatorVerdict {
    /// Builds a verdict with no stipulations.
    fn plain(outcome: Outcome, reason: &str, queue_for_review: bool) -> Self {
        Self {
            outcome,
            reason: reason.to_string(),
            stipulations: Vec::new(),
            queue_for_review,
        }
    }
}

// ============================================================================
// SECTION: Routing
// ============================================================================

/// Routes a validated analysis into an outcome.
///
/// Pure: given the same analysis and thresholds, the result is identical.
#[must_use]
pub fn decide(analysis: &LlmAnalysis, thresholds: &DecisionThresholds) -> AdjudicatorVerdict {
    if analysis.signals.fraud_hard_fail {
        return AdjudicatorVerdict::plain(Outcome::Decline, "Hard fraud signal", false);
    }
    if analysis.confidence < thresholds.min_confidence_for_auto {
        return AdjudicatorVerdict::plain(
            Outcome::Review,
            "Confidence below auto-decision floor",
            true,
        );
    }
    if analysis.fraud_probability > thresholds.fraud_decline_threshold {
        return AdjudicatorVerdict::plain(
            Outcome::Decline,
            "Fraud probability above decline threshold",
            false,
        );
    }
    if analysis.fraud_probability > thresholds.fraud_review_threshold {
        return AdjudicatorVerdict::plain(
            Outcome::Review,
            "Fraud probability above review threshold",
            false,
        );
    }

    if gates_pass(&analysis.credit, thresholds) {
        return AdjudicatorVerdict::plain(Outcome::Approve, "Credit gates pass", false);
    }

    let stipulations = build_stipulations(&analysis.credit, thresholds);
    if stipulations.is_empty() {
        return AdjudicatorVerdict::plain(
            Outcome::Review,
            "Credit gates failed with no mechanical remedy",
            false,
        );
    }
    AdjudicatorVerdict {
        outcome: Outcome::Conditional,
        reason: "Credit gates failed with mechanical remedies".to_string(),
        stipulations,
        queue_for_review: false,
    }
}

/// Returns true when every credit policy gate passes.
#[must_use]
pub fn gates_pass(credit: &CreditAssessment, thresholds: &DecisionThresholds) -> bool {
    credit.pti <= thresholds.pti_cap
        && credit.tds <= thresholds.tds_cap
        && credit.ltv <= thresholds.ltv_cap
        && credit.structure_ok
}

/// Builds mechanical stipulations from failed gates.
///
/// Generated in pti, ltv, tds order and deduplicated by kind: the first
/// stipulation of a kind wins.
#[must_use]
pub fn build_stipulations(
    credit: &CreditAssessment,
    thresholds: &DecisionThresholds,
) -> Vec<Stipulation> {
    let mut stipulations: Vec<Stipulation> = Vec::new();
    let mut push = |kind: StipulationKind, detail: String| {
        if !stipulations.iter().any(|existing| existing.kind == kind) {
            stipulations.push(Stipulation {
                kind,
                detail,
            });
        }
    };

    if credit.pti > thresholds.pti_cap {
        push(StipulationKind::ReduceTerm, "reduce term by 12 months".to_string());
        push(
            StipulationKind::IncreaseDownPayment,
            format!("until PTI ≤ {}", format_percent(thresholds.pti_cap)),
        );
    }
    if credit.ltv > thresholds.ltv_cap {
        push(
            StipulationKind::IncreaseDownPayment,
            format!("decrease LTV to ≤ {}", format_percent(thresholds.ltv_cap)),
        );
    }
    if credit.tds > thresholds.tds_cap {
        push(
            StipulationKind::AddCoBorrower,
            "qualified co-borrower to reduce TDS".to_string(),
        );
    }
    stipulations
}

/// Renders a unit-interval cap as a whole percentage.
fn format_percent(cap: f64) -> String {
    format!("{:.0}%", cap * 100.0)
}
