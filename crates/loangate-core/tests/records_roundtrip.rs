// crates/loangate-core/tests/records_roundtrip.rs
// ============================================================================
// Module: Record Round-Trip Tests
// Description: Serde round-trips for stage records plus score banding bounds.
// Purpose: Ensure persisted records deserialize to identical objects.
// Dependencies: loangate-core
// ============================================================================

//! Serialization round-trip and banding boundary tests.

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
use loangate_core::Band;
use loangate_core::CreditAssessment;
use loangate_core::Decision;
use loangate_core::DocVerification;
use loangate_core::FeatureVector;
use loangate_core::FraudSignals;
use loangate_core::LlmAnalysis;
use loangate_core::MlOutput;
use loangate_core::Outcome;
use loangate_core::RiskTier;
use loangate_core::RulesOutput;
use loangate_core::StageName;
use loangate_core::StageOutput;
use loangate_core::StageRecord;
use loangate_core::Stipulation;
use loangate_core::StipulationKind;
use loangate_core::Timestamp;
use loangate_core::TopFeature;
use loangate_core::Velocity;
use loangate_core::band;
use loangate_core::validate_score;

fn record(stage: StageName, output: StageOutput) -> StageRecord {
    StageRecord {
        stage,
        version: "v1".to_string(),
        started_at: Timestamp::from_unix_millis(1_750_000_000_000),
        ended_at: Timestamp::from_unix_millis(1_750_000_000_250),
        duration_ms: 250,
        output: Some(output),
        error: None,
    }
}

fn roundtrip(original: &StageRecord) {
    let encoded = serde_json::to_string(original).unwrap();
    let decoded: StageRecord = serde_json::from_str(&encoded).unwrap();
    assert_eq!(*original, decoded);
}

#[test]
fn rules_record_round_trips() {
    roundtrip(&record(
        StageName::Rules,
        StageOutput::Rules(RulesOutput {
            rule_flags: vec!["high_ltv".to_string()],
            rule_score: 0.3,
            hard_fail: false,
            rulepack_version: "2025.06.0".to_string(),
        }),
    ));
}

#[test]
fn features_record_round_trips() {
    roundtrip(&record(
        StageName::Features,
        StageOutput::Features(FeatureVector {
            values: vec![38.0, 1.0, 1.0, 0.0, 0.0, 0.0, 2.0, 0.5, 0.0, 1.0, 0.8, 1.25, 0.0625, 0.75, 0.0],
            feature_set_version: "fs-1.4.0".to_string(),
        }),
    ));
}

#[test]
fn ml_record_round_trips() {
    roundtrip(&record(
        StageName::Ml,
        StageOutput::Ml(MlOutput {
            confidence_score: 0.55,
            top_features: vec![TopFeature {
                feature_name: "dealer_volume_24h".to_string(),
                feature_value: 12.0,
                importance: 0.2,
                contribution: -0.05,
            }],
            model_version: "m-7".to_string(),
            calibration_version: "c-2".to_string(),
            inference_time_ms: 31,
        }),
    ));
}

#[test]
fn llm_record_round_trips() {
    roundtrip(&record(
        StageName::Llm,
        StageOutput::Llm(AdjudicationOutcome::Analyzed {
            analysis: LlmAnalysis {
                fraud_probability: 0.30,
                confidence: 0.82,
                risk_tier: RiskTier::Medium,
                recommendation: Outcome::Conditional,
                reasoning: "Income documentation is thin.".to_string(),
                primary_concerns: vec!["income unverified".to_string()],
                red_flags: Vec::new(),
                mitigating_factors: vec!["long employment".to_string()],
                signals: FraudSignals {
                    fraud_hard_fail: false,
                    consortium_hit: false,
                    doc_verification: DocVerification::NotPerformed,
                    synthetic_id: false,
                    velocity: Velocity::Low,
                },
                credit: CreditAssessment {
                    score: 690,
                    pti: 0.18,
                    tds: 0.30,
                    ltv: 0.90,
                    structure_ok: true,
                    marginal_reason: "PTI above cap".to_string(),
                },
                stipulations: vec![Stipulation {
                    kind: StipulationKind::ProvideIncomeDocs,
                    detail: "two recent pay stubs".to_string(),
                }],
                model_id: "adjudicator-model-1".to_string(),
                prompt_template_version: "pt-3".to_string(),
            },
        }),
    ));
}

#[test]
fn skipped_and_unavailable_outcomes_round_trip() {
    roundtrip(&record(
        StageName::Llm,
        StageOutput::Llm(AdjudicationOutcome::Skipped {
            reason: "ml confidence outside trigger band".to_string(),
        }),
    ));
    roundtrip(&record(
        StageName::Llm,
        StageOutput::Llm(AdjudicationOutcome::Unavailable {
            reason: "breaker open".to_string(),
        }),
    ));
}

#[test]
fn assembly_record_round_trips() {
    let mut timings = BTreeMap::new();
    timings.insert("rules".to_string(), 2_u64);
    roundtrip(&record(
        StageName::Assembly,
        StageOutput::Assembly(Decision {
            final_decision: Outcome::Approve,
            reasons: Vec::new(),
            stipulations: Vec::new(),
            policy_version: "policy-2025.06.0".to_string(),
            timings_ms: timings,
        }),
    ));
}

#[test]
fn failed_record_round_trips() {
    let failed = StageRecord {
        stage: StageName::Ml,
        version: "v1".to_string(),
        started_at: Timestamp::from_unix_millis(1_750_000_000_000),
        ended_at: Timestamp::from_unix_millis(1_750_000_030_000),
        duration_ms: 30_000,
        output: None,
        error: Some("scoring service timed out".to_string()),
    };
    roundtrip(&failed);
}

#[test]
fn banding_boundaries_are_exact() {
    assert_eq!(band(None), Band::Unknown);
    assert_eq!(band(Some(0.0)), Band::Low);
    assert_eq!(band(Some(0.299_999)), Band::Low);
    assert_eq!(band(Some(0.3)), Band::Medium);
    assert_eq!(band(Some(0.699_999)), Band::Medium);
    assert_eq!(band(Some(0.7)), Band::High);
    assert_eq!(band(Some(1.0)), Band::High);
}

#[test]
fn score_validation_rejects_non_finite_and_out_of_range() {
    assert!(validate_score("rule_score", 0.5, 1.0).is_ok());
    assert!(validate_score("rule_score", 1.0, 1.0).is_ok());
    assert!(validate_score("rule_score", -0.01, 1.0).is_err());
    assert!(validate_score("rule_score", 1.01, 1.0).is_err());
    assert!(validate_score("ltv", f64::NAN, 3.0).is_err());
    assert!(validate_score("ltv", f64::INFINITY, 3.0).is_err());
}
