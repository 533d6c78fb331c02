// crates/loangate-core/tests/assembler_policy.rs
// ============================================================================
// Module: Decision Assembly Tests
// Description: Validate the assembler's clause ordering and fallback combine.
// Purpose: Ensure the final routing policy matches the declared table.
// Dependencies: loangate-core
// ============================================================================

//! Assembly behavior tests for the final routing policy.

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

use std::collections::BTreeMap;

use loangate_core::AdjudicationOutcome;
use loangate_core::CreditAssessment;
use loangate_core::DecisionThresholds;
use loangate_core::DocVerification;
use loangate_core::FraudSignals;
use loangate_core::LlmAnalysis;
use loangate_core::MlOutput;
use loangate_core::Outcome;
use loangate_core::RiskTier;
use loangate_core::RulesOutput;
use loangate_core::StipulationKind;
use loangate_core::TopFeature;
use loangate_core::Velocity;
use loangate_core::assemble;

fn clean_rules() -> RulesOutput {
    RulesOutput {
        rule_flags: Vec::new(),
        rule_score: 0.0,
        hard_fail: false,
        rulepack_version: "test-pack".to_string(),
    }
}

fn ml_with_confidence(confidence_score: f64) -> MlOutput {
    MlOutput {
        confidence_score,
        top_features: vec![TopFeature {
            feature_name: "loan_to_value_ratio".to_string(),
            feature_value: 0.8,
            importance: 0.4,
            contribution: 0.1,
        }],
        model_version: "m-7".to_string(),
        calibration_version: "c-2".to_string(),
        inference_time_ms: 12,
    }
}

fn analysis(confidence: f64, fraud_probability: f64, pti: f64) -> AdjudicationOutcome {
    AdjudicationOutcome::Analyzed {
        analysis: LlmAnalysis {
            fraud_probability,
            confidence,
            risk_tier: RiskTier::Medium,
            recommendation: Outcome::Review,
            reasoning: "Borderline profile.".to_string(),
            primary_concerns: vec!["income unverified".to_string()],
            red_flags: Vec::new(),
            mitigating_factors: Vec::new(),
            signals: FraudSignals {
                fraud_hard_fail: false,
                consortium_hit: false,
                doc_verification: DocVerification::NotPerformed,
                synthetic_id: false,
                velocity: Velocity::Low,
            },
            credit: CreditAssessment {
                score: 690,
                pti,
                tds: 0.30,
                ltv: 0.90,
                structure_ok: true,
                marginal_reason: "PTI above cap".to_string(),
            },
            stipulations: Vec::new(),
            model_id: "adjudicator-model-1".to_string(),
            prompt_template_version: "pt-3".to_string(),
        },
    }
}

#[test]
fn rules_hard_fail_declines_and_surfaces_flags() {
    let rules = RulesOutput {
        rule_flags: vec!["invalid_sin".to_string()],
        rule_score: 0.0,
        hard_fail: true,
        rulepack_version: "test-pack".to_string(),
    };
    let decision = assemble(
        &rules,
        None,
        None,
        &DecisionThresholds::default(),
        BTreeMap::new(),
    );
    assert_eq!(decision.final_decision, Outcome::Decline);
    assert!(decision.reasons.iter().any(|reason| reason == "invalid_sin"));
}

#[test]
fn invalid_json_routes_to_review() {
    let adjudication = AdjudicationOutcome::InvalidJson {
        reason: "LLM invalid JSON".to_string(),
    };
    let decision = assemble(
        &clean_rules(),
        Some(&ml_with_confidence(0.5)),
        Some(&adjudication),
        &DecisionThresholds::default(),
        BTreeMap::new(),
    );
    assert_eq!(decision.final_decision, Outcome::Review);
    assert!(decision.reasons.iter().any(|reason| reason == "LLM invalid JSON"));
}

#[test]
fn borderline_analysis_with_pti_failure_is_conditional() {
    let adjudication = analysis(0.82, 0.30, 0.18);
    let decision = assemble(
        &clean_rules(),
        Some(&ml_with_confidence(0.55)),
        Some(&adjudication),
        &DecisionThresholds::default(),
        BTreeMap::new(),
    );
    assert_eq!(decision.final_decision, Outcome::Conditional);
    let kinds: Vec<StipulationKind> =
        decision.stipulations.iter().map(|stip| stip.kind).collect();
    assert_eq!(kinds, vec![
        StipulationKind::ReduceTerm,
        StipulationKind::IncreaseDownPayment
    ]);
}

#[test]
fn fallback_combine_reviews_in_the_middle_band() {
    let mut rules = clean_rules();
    rules.rule_score = 0.1;
    let adjudication = AdjudicationOutcome::Unavailable {
        reason: "breaker open".to_string(),
    };
    let decision = assemble(
        &rules,
        Some(&ml_with_confidence(0.65)),
        Some(&adjudication),
        &DecisionThresholds::default(),
        BTreeMap::new(),
    );
    assert_eq!(decision.final_decision, Outcome::Review);
}

#[test]
fn fallback_combine_declines_at_the_floor() {
    let decision = assemble(
        &clean_rules(),
        Some(&ml_with_confidence(0.85)),
        None,
        &DecisionThresholds::default(),
        BTreeMap::new(),
    );
    assert_eq!(decision.final_decision, Outcome::Decline);
}

#[test]
fn fallback_combine_approves_below_the_review_floor() {
    let decision = assemble(
        &clean_rules(),
        Some(&ml_with_confidence(0.2)),
        None,
        &DecisionThresholds::default(),
        BTreeMap::new(),
    );
    assert_eq!(decision.final_decision, Outcome::Approve);
}

#[test]
fn fallback_uses_rule_score_when_ml_is_absent() {
    let mut rules = clean_rules();
    rules.rule_score = 0.75;
    let decision =
        assemble(&rules, None, None, &DecisionThresholds::default(), BTreeMap::new());
    assert_eq!(decision.final_decision, Outcome::Review);
}

#[test]
fn reasons_accumulate_rule_first_and_cap_at_five() {
    let rules = RulesOutput {
        rule_flags: vec![
            "high_ltv".to_string(),
            "low_down_payment".to_string(),
            "thin_employment".to_string(),
        ],
        rule_score: 0.6,
        hard_fail: false,
        rulepack_version: "test-pack".to_string(),
    };
    let adjudication = analysis(0.82, 0.30, 0.18);
    let decision = assemble(
        &rules,
        Some(&ml_with_confidence(0.55)),
        Some(&adjudication),
        &DecisionThresholds::default(),
        BTreeMap::new(),
    );
    assert_eq!(decision.reasons.len(), 5);
    // Determining reason first, then rule flags in pack order.
    assert_eq!(decision.reasons[1], "high_ltv");
    assert_eq!(decision.reasons[2], "low_down_payment");
}

#[test]
fn timings_are_preserved_on_the_decision() {
    let mut timings = BTreeMap::new();
    timings.insert("rules".to_string(), 3_u64);
    timings.insert("ml".to_string(), 140_u64);
    let decision = assemble(
        &clean_rules(),
        Some(&ml_with_confidence(0.2)),
        None,
        &DecisionThresholds::default(),
        timings.clone(),
    );
    assert_eq!(decision.timings_ms, timings);
}
