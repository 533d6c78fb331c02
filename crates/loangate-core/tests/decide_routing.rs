// crates/loangate-core/tests/decide_routing.rs
// ============================================================================
// Module: Adjudicator Routing Tests
// Description: Validate decide() clause ordering, boundaries, and stipulations.
// Purpose: Ensure routing is pure and matches the declared policy table.
// Dependencies: loangate-core
// ============================================================================

//! Routing behavior tests for the adjudicator decision function.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use loangate_core::CreditAssessment;
use loangate_core::DecisionThresholds;
use loangate_core::DocVerification;
use loangate_core::FraudSignals;
use loangate_core::LlmAnalysis;
use loangate_core::Outcome;
use loangate_core::RiskTier;
use loangate_core::StipulationKind;
use loangate_core::Velocity;
use loangate_core::decide;

fn clean_analysis() -> LlmAnalysis {
    LlmAnalysis {
        fraud_probability: 0.1,
        confidence: 0.9,
        risk_tier: RiskTier::Low,
        recommendation: Outcome::Approve,
        reasoning: "Profile is consistent with a low-risk applicant.".to_string(),
        primary_concerns: Vec::new(),
        red_flags: Vec::new(),
        mitigating_factors: vec!["Stable employment".to_string()],
        signals: FraudSignals {
            fraud_hard_fail: false,
            consortium_hit: false,
            doc_verification: DocVerification::Pass,
            synthetic_id: false,
            velocity: Velocity::None,
        },
        credit: CreditAssessment {
            score: 750,
            pti: 0.10,
            tds: 0.30,
            ltv: 0.80,
            structure_ok: true,
            marginal_reason: String::new(),
        },
        stipulations: Vec::new(),
        model_id: "adjudicator-model-1".to_string(),
        prompt_template_version: "pt-3".to_string(),
    }
}

#[test]
fn clean_analysis_approves() {
    let verdict = decide(&clean_analysis(), &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Approve);
    assert!(verdict.stipulations.is_empty());
    assert!(!verdict.queue_for_review);
}

#[test]
fn hard_fraud_signal_declines_first() {
    let mut analysis = clean_analysis();
    analysis.signals.fraud_hard_fail = true;
    // Even with a failing gate, the hard signal wins.
    analysis.credit.pti = 0.5;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Decline);
    assert_eq!(verdict.reason, "Hard fraud signal");
}

#[test]
fn low_confidence_routes_to_review_queue() {
    let mut analysis = clean_analysis();
    analysis.confidence = 0.74;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Review);
    assert!(verdict.queue_for_review);
}

#[test]
fn confidence_exactly_at_floor_does_not_take_low_confidence_branch() {
    let mut analysis = clean_analysis();
    analysis.confidence = 0.75;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Approve);
    assert!(!verdict.queue_for_review);
}

#[test]
fn fraud_probability_exactly_at_decline_threshold_reviews() {
    let mut analysis = clean_analysis();
    analysis.fraud_probability = 0.8;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    // Decline requires strictly greater; 0.8 still exceeds the review bound.
    assert_eq!(verdict.outcome, Outcome::Review);
}

#[test]
fn fraud_probability_above_decline_threshold_declines() {
    let mut analysis = clean_analysis();
    analysis.fraud_probability = 0.81;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Decline);
}

#[test]
fn pti_failure_generates_ordered_stipulations() {
    let mut analysis = clean_analysis();
    analysis.credit.pti = 0.18;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Conditional);
    let kinds: Vec<StipulationKind> =
        verdict.stipulations.iter().map(|stip| stip.kind).collect();
    assert_eq!(kinds, vec![
        StipulationKind::ReduceTerm,
        StipulationKind::IncreaseDownPayment
    ]);
    assert_eq!(verdict.stipulations[1].detail, "until PTI ≤ 15%");
}

#[test]
fn pti_and_ltv_failures_deduplicate_down_payment() {
    let mut analysis = clean_analysis();
    analysis.credit.pti = 0.18;
    analysis.credit.ltv = 1.5;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Conditional);
    let down_payment_count = verdict
        .stipulations
        .iter()
        .filter(|stip| stip.kind == StipulationKind::IncreaseDownPayment)
        .count();
    assert_eq!(down_payment_count, 1);
    // The pti-driven detail wins because pti is generated first.
    assert!(verdict.stipulations.iter().any(|stip| stip.detail == "until PTI ≤ 15%"));
}

#[test]
fn tds_failure_adds_co_borrower() {
    let mut analysis = clean_analysis();
    analysis.credit.tds = 0.5;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Conditional);
    assert_eq!(verdict.stipulations.len(), 1);
    assert_eq!(verdict.stipulations[0].kind, StipulationKind::AddCoBorrower);
}

#[test]
fn structure_failure_alone_has_no_mechanical_remedy() {
    let mut analysis = clean_analysis();
    analysis.credit.structure_ok = false;
    let verdict = decide(&analysis, &DecisionThresholds::default());
    assert_eq!(verdict.outcome, Outcome::Review);
    assert!(verdict.stipulations.is_empty());
}

#[test]
fn routing_is_deterministic() {
    let mut analysis = clean_analysis();
    analysis.credit.pti = 0.18;
    analysis.fraud_probability = 0.30;
    let thresholds = DecisionThresholds::default();
    let first = decide(&analysis, &thresholds);
    let second = decide(&analysis, &thresholds);
    assert_eq!(first, second);
}
