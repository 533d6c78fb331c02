// crates/loangate-providers/src/lib.rs
// ============================================================================
// Module: Loangate Providers
// Description: Outbound HTTP collaborators for the decision pipeline.
// Purpose: Provide the ML scoring client, the LLM client, and the breaker.
// Dependencies: loangate-core, reqwest, jsonschema, serde
// ============================================================================

//! ## Overview
//! This crate ships the two outbound collaborators the pipeline consumes: the
//! ML scoring client and the schema-constrained LLM client, together with the
//! process-wide circuit breaker and the strict response schema. Clients
//! classify failures into the pipeline taxonomy; callers never see raw
//! transport errors.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod breaker;
pub mod clock;
pub mod llm;
pub mod ml;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use breaker::BreakerConfig;
pub use breaker::BreakerKey;
pub use breaker::CircuitBreaker;
pub use clock::wall_clock_now;
pub use llm::ChatTransport;
pub use llm::HttpLlmClient;
pub use llm::LlmClientConfig;
pub use llm::LlmError;
pub use ml::MlClient;
pub use ml::MlClientConfig;
pub use ml::Scorer;
pub use schema::AnalysisParser;
pub use schema::SchemaViolation;
pub use schema::analysis_response_schema;

#[cfg(test)]
mod tests;
