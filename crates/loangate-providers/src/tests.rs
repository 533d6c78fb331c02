// crates/loangate-providers/src/tests.rs
// ============================================================================
// Module: Provider Unit Tests
// Description: Tests for the breaker, recovery parser, and response schema.
// Purpose: Validate provider-side contracts without network access.
// Dependencies: crate
// ============================================================================

//! ## Overview
//! Exercises the circuit breaker state machine, the fenced-JSON recovery
//! parser, and strict schema validation of adjudicator responses.

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

use loangate_core::Outcome;
use loangate_core::RiskTier;
use loangate_core::Timestamp;
use serde_json::Value;
use serde_json::json;

use crate::breaker::BreakerConfig;
use crate::breaker::BreakerKey;
use crate::breaker::CircuitBreaker;
use crate::schema::AnalysisParser;
use crate::schema::SchemaViolation;
use crate::schema::recover_json_object;

/// 2025-06-15T00:00:00Z.
const NOW: Timestamp = Timestamp::from_unix_seconds(1_749_945_600);

// ============================================================================
// SECTION: Breaker Tests
// ============================================================================

fn test_key() -> BreakerKey {
    BreakerKey::new("openai", "http://llm.internal/v1/chat/completions")
}

#[test]
fn breaker_opens_at_the_failure_threshold() {
    let breaker = CircuitBreaker::new(BreakerConfig::default());
    let key = test_key();
    for step in 0..4 {
        breaker.record_failure(&key, NOW.plus_seconds(step));
        assert!(breaker.allow(&key, NOW.plus_seconds(step)));
    }
    breaker.record_failure(&key, NOW.plus_seconds(4));
    assert!(!breaker.allow(&key, NOW.plus_seconds(5)));
}

#[test]
fn breaker_resets_after_the_cooldown() {
    let breaker = CircuitBreaker::new(BreakerConfig::default());
    let key = test_key();
    for step in 0..5 {
        breaker.record_failure(&key, NOW.plus_seconds(step));
    }
    assert!(!breaker.allow(&key, NOW.plus_seconds(100)));
    // Cooldown is 300 s from the opening failure.
    assert!(breaker.allow(&key, NOW.plus_seconds(4 + 301)));
}

#[test]
fn success_zeroes_the_failure_counter() {
    let breaker = CircuitBreaker::new(BreakerConfig::default());
    let key = test_key();
    for step in 0..4 {
        breaker.record_failure(&key, NOW.plus_seconds(step));
    }
    breaker.record_success(&key);
    // Four more failures stay under the threshold after the reset.
    for step in 10..14 {
        breaker.record_failure(&key, NOW.plus_seconds(step));
    }
    assert!(breaker.allow(&key, NOW.plus_seconds(15)));
}

#[test]
fn failures_outside_the_window_start_a_new_count() {
    let breaker = CircuitBreaker::new(BreakerConfig::default());
    let key = test_key();
    for step in 0..4 {
        breaker.record_failure(&key, NOW.plus_seconds(step));
    }
    // Past the 300 s window the counter restarts at one.
    breaker.record_failure(&key, NOW.plus_seconds(400));
    assert!(breaker.allow(&key, NOW.plus_seconds(401)));
}

#[test]
fn breakers_are_independent_per_key() {
    let breaker = CircuitBreaker::new(BreakerConfig::default());
    let failing = test_key();
    let healthy = BreakerKey::new("openai", "http://llm-b.internal/v1/chat/completions");
    for step in 0..5 {
        breaker.record_failure(&failing, NOW.plus_seconds(step));
    }
    assert!(!breaker.allow(&failing, NOW.plus_seconds(6)));
    assert!(breaker.allow(&healthy, NOW.plus_seconds(6)));
}

// ============================================================================
// SECTION: Recovery Parser Tests
// ============================================================================

#[test]
fn recovery_strips_markdown_fences() {
    let content = "```json\n{\"ok\": true}\n```";
    assert_eq!(recover_json_object(content), Some("{\"ok\": true}".to_string()));
}

#[test]
fn recovery_extracts_the_outermost_object() {
    let content = "The assessment follows: {\"a\": {\"b\": 1}} -- end of reply";
    assert_eq!(recover_json_object(content), Some("{\"a\": {\"b\": 1}}".to_string()));
}

#[test]
fn recovery_fails_without_braces() {
    assert_eq!(recover_json_object("no json here"), None);
}

// ============================================================================
// SECTION: Schema Tests
// ============================================================================

fn valid_response() -> Value {
    json!({
        "fraud_probability": 0.1,
        "confidence": 0.9,
        "risk_tier": "low",
        "recommendation": "approve",
        "reasoning": "Consistent low-risk profile.",
        "primary_concerns": [],
        "red_flags": [],
        "mitigating_factors": ["stable employment"],
        "signals": {
            "fraud_hard_fail": false,
            "consortium_hit": false,
            "doc_verification": "pass",
            "synthetic_id": false,
            "velocity": "none"
        },
        "credit": {
            "score": 750,
            "pti": 0.10,
            "tds": 0.30,
            "ltv": 0.80,
            "structure_ok": true,
            "marginal_reason": ""
        },
        "stipulations": []
    })
}

#[test]
fn valid_response_parses_into_an_analysis() {
    let parser = AnalysisParser::new().unwrap();
    let content = valid_response().to_string();
    let analysis = parser.parse(&content, "adjudicator-model-1", "pt-3").unwrap();
    assert_eq!(analysis.recommendation, Outcome::Approve);
    assert_eq!(analysis.risk_tier, RiskTier::Low);
    assert_eq!(analysis.model_id, "adjudicator-model-1");
    assert_eq!(analysis.prompt_template_version, "pt-3");
}

#[test]
fn fenced_response_recovers_and_parses() {
    let parser = AnalysisParser::new().unwrap();
    let content = format!("```json\n{}\n```", valid_response());
    let analysis = parser.parse(&content, "adjudicator-model-1", "pt-3").unwrap();
    assert_eq!(analysis.recommendation, Outcome::Approve);
}

#[test]
fn prose_wrapped_response_recovers_and_parses() {
    let parser = AnalysisParser::new().unwrap();
    let content = format!("Here is my assessment:\n{}\nLet me know.", valid_response());
    assert!(parser.parse(&content, "adjudicator-model-1", "pt-3").is_ok());
}

#[test]
fn unparseable_content_is_invalid_json() {
    let parser = AnalysisParser::new().unwrap();
    let outcome = parser.parse("I cannot help with that.", "m", "pt-3");
    assert!(matches!(outcome, Err(SchemaViolation::InvalidJson(_))));
}

#[test]
fn out_of_range_probability_fails_validation() {
    let parser = AnalysisParser::new().unwrap();
    let mut response = valid_response();
    response["fraud_probability"] = json!(1.4);
    let outcome = parser.parse(&response.to_string(), "m", "pt-3");
    assert!(matches!(outcome, Err(SchemaViolation::SchemaMismatch(_))));
}

#[test]
fn missing_signals_block_fails_validation() {
    let parser = AnalysisParser::new().unwrap();
    let mut response = valid_response();
    response.as_object_mut().unwrap().remove("signals");
    let outcome = parser.parse(&response.to_string(), "m", "pt-3");
    assert!(matches!(outcome, Err(SchemaViolation::SchemaMismatch(_))));
}

#[test]
fn three_valued_recommendation_vocabulary_is_rejected() {
    let parser = AnalysisParser::new().unwrap();
    let mut response = valid_response();
    response["recommendation"] = json!("manual");
    let outcome = parser.parse(&response.to_string(), "m", "pt-3");
    assert!(matches!(outcome, Err(SchemaViolation::SchemaMismatch(_))));
}

#[test]
fn credit_score_outside_band_is_rejected() {
    let parser = AnalysisParser::new().unwrap();
    let mut response = valid_response();
    response["credit"]["score"] = json!(250);
    let outcome = parser.parse(&response.to_string(), "m", "pt-3");
    assert!(matches!(outcome, Err(SchemaViolation::SchemaMismatch(_))));
}

#[test]
fn model_stipulations_deserialize_with_their_kind() {
    let parser = AnalysisParser::new().unwrap();
    let mut response = valid_response();
    response["stipulations"] = json!([
        { "type": "provide_income_docs", "detail": "two recent pay stubs" }
    ]);
    let analysis = parser.parse(&response.to_string(), "m", "pt-3").unwrap();
    assert_eq!(analysis.stipulations.len(), 1);
}
