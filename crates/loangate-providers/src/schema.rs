// crates/loangate-providers/src/schema.rs
// ============================================================================
// Module: Analysis Response Schema
// Description: Strict JSON schema and parser for adjudicator responses.
// Purpose: Enforce the response contract at the provider boundary.
// Dependencies: jsonschema, loangate-core, serde_json
// ============================================================================

//! ## Overview
//! The adjudicator response is a single JSON object validated twice: the
//! provider is asked for strict schema conformance via `response_format`, and
//! the same schema is enforced post-parse so a provider that ignores the
//! request cannot smuggle an out-of-contract response into the pipeline. The
//! parser also owns the single recovery pass for fenced or wrapped JSON.

// ============================================================================
// SECTION: Imports
// ============================================================================

use jsonschema::Validator;
use loangate_core::LlmAnalysis;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Name attached to the schema in `response_format`.
pub const SCHEMA_NAME: &str = "fraud_adjudication";

// ============================================================================
// SECTION: Schema Document
// ============================================================================

/// Builds the strict response schema document.
///
/// The recommendation enum is four-valued; a provider that omits
/// `conditional` support fails validation rather than degrading silently.
#[must_use]
pub fn analysis_response_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "fraud_probability",
            "confidence",
            "risk_tier",
            "recommendation",
            "reasoning",
            "primary_concerns",
            "red_flags",
            "mitigating_factors",
            "signals",
            "credit"
        ],
        "properties": {
            "fraud_probability": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "risk_tier": { "type": "string", "enum": ["low", "medium", "high"] },
            "recommendation": {
                "type": "string",
                "enum": ["approve", "conditional", "decline", "review"]
            },
            "reasoning": { "type": "string", "maxLength": 3000 },
            "primary_concerns": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": 10
            },
            "red_flags": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": 20
            },
            "mitigating_factors": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": 10
            },
            "signals": {
                "type": "object",
                "additionalProperties": false,
                "required": [
                    "fraud_hard_fail",
                    "consortium_hit",
                    "doc_verification",
                    "synthetic_id",
                    "velocity"
                ],
                "properties": {
                    "fraud_hard_fail": { "type": "boolean" },
                    "consortium_hit": { "type": "boolean" },
                    "doc_verification": {
                        "type": "string",
                        "enum": ["pass", "fail", "not_performed"]
                    },
                    "synthetic_id": { "type": "boolean" },
                    "velocity": {
                        "type": "string",
                        "enum": ["none", "low", "medium", "high"]
                    }
                }
            },
            "credit": {
                "type": "object",
                "additionalProperties": false,
                "required": ["score", "pti", "tds", "ltv", "structure_ok", "marginal_reason"],
                "properties": {
                    "score": { "type": "integer", "minimum": 300, "maximum": 900 },
                    "pti": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                    "tds": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                    "ltv": { "type": "number", "minimum": 0.0, "maximum": 3.0 },
                    "structure_ok": { "type": "boolean" },
                    "marginal_reason": { "type": "string", "maxLength": 200 }
                }
            },
            "stipulations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["type", "detail"],
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": [
                                "increase_down_payment",
                                "reduce_term",
                                "add_co_borrower",
                                "provide_income_docs",
                                "address_proof",
                                "employer_verification"
                            ]
                        },
                        "detail": { "type": "string", "maxLength": 500 }
                    }
                }
            }
        }
    })
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Response contract violations.
#[derive(Debug, Error)]
pub enum SchemaViolation {
    /// The content was not parseable JSON, even after recovery.
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    /// The JSON did not conform to the response schema.
    #[error("response does not match schema: {0}")]
    SchemaMismatch(String),
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Compiled parser for adjudicator responses.
pub struct AnalysisParser {
    /// Compiled schema validator.
    validator: Validator,
}

impl AnalysisParser {
    /// Compiles the response schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolation::SchemaMismatch`] when the schema document
    /// itself fails to compile.
    pub fn new() -> Result<Self, SchemaViolation> {
        let schema = analysis_response_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|err| SchemaViolation::SchemaMismatch(err.to_string()))?;
        Ok(Self {
            validator,
        })
    }

    /// Parses and validates response content into an analysis.
    ///
    /// On malformed JSON a single recovery pass strips markdown fences and
    /// extracts the substring between the first `{` and the last `}` before
    /// reparsing.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolation`] when the content is unparseable twice or
    /// fails schema validation.
    pub fn parse(
        &self,
        content: &str,
        model_id: &str,
        prompt_template_version: &str,
    ) -> Result<LlmAnalysis, SchemaViolation> {
        let mut value = match serde_json::from_str::<Value>(content) {
            Ok(value) => value,
            Err(first_error) => {
                let recovered = recover_json_object(content)
                    .ok_or_else(|| SchemaViolation::InvalidJson(first_error.to_string()))?;
                serde_json::from_str::<Value>(&recovered)
                    .map_err(|err| SchemaViolation::InvalidJson(err.to_string()))?
            }
        };

        self.validator
            .validate(&value)
            .map_err(|err| SchemaViolation::SchemaMismatch(err.to_string()))?;

        if let Value::Object(map) = &mut value {
            map.insert("model_id".to_string(), Value::String(model_id.to_string()));
            map.insert(
                "prompt_template_version".to_string(),
                Value::String(prompt_template_version.to_string()),
            );
        }
        serde_json::from_value(value)
            .map_err(|err| SchemaViolation::SchemaMismatch(err.to_string()))
    }
}

/// Extracts a JSON object candidate from fenced or wrapped content.
#[must_use]
pub fn recover_json_object(content: &str) -> Option<String> {
    let stripped: String = content
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<&str>>()
        .join("\n");
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end < start {
        return None;
    }
    Some(stripped[start..=end].to_string())
}
