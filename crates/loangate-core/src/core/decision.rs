// crates/loangate-core/src/core/decision.rs
// ============================================================================
// Module: Loangate Decision Model
// Description: Outcomes, stipulations, LLM analysis, and the final decision.
// Purpose: Provide closed tagged variants for every adjudication result.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Adjudication results are closed enums: the four-valued outcome, the six
//! stipulation kinds, and the structured LLM analysis whose shape mirrors the
//! schema enforced at the provider boundary. The final [`Decision`] is written
//! exactly once per request and is immutable thereafter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Final routing outcome for an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Approved as submitted.
    Approve,
    /// Approvable if the generated stipulations are accepted.
    Conditional,
    /// Declined.
    Decline,
    /// Routed to a human review queue.
    Review,
}

impl Outcome {
    /// Returns a stable label for persistence and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Conditional => "conditional",
            Self::Decline => "decline",
            Self::Review => "review",
        }
    }
}

// ============================================================================
// SECTION: Stipulations
// ============================================================================

/// Mechanical loan-term modification that would move a case to approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StipulationKind {
    /// Increase the down payment.
    IncreaseDownPayment,
    /// Reduce the loan term.
    ReduceTerm,
    /// Add a qualified co-borrower.
    AddCoBorrower,
    /// Provide income documentation.
    ProvideIncomeDocs,
    /// Provide proof of address.
    AddressProof,
    /// Verify employment with the employer.
    EmployerVerification,
}

impl StipulationKind {
    /// Returns a stable label for persistence and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IncreaseDownPayment => "increase_down_payment",
            Self::ReduceTerm => "reduce_term",
            Self::AddCoBorrower => "add_co_borrower",
            Self::ProvideIncomeDocs => "provide_income_docs",
            Self::AddressProof => "address_proof",
            Self::EmployerVerification => "employer_verification",
        }
    }
}

/// A single stipulation attached to a conditional outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stipulation {
    /// Stipulation kind.
    #[serde(rename = "type")]
    pub kind: StipulationKind,
    /// Human-readable detail, at most 500 characters.
    pub detail: String,
}

// ============================================================================
// SECTION: LLM Analysis
// ============================================================================

/// Risk tier asserted by the adjudicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
}

/// Document verification status reported by the adjudicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocVerification {
    /// Documents verified.
    Pass,
    /// Documents failed verification.
    Fail,
    /// Verification not performed.
    NotPerformed,
}

/// Application velocity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Velocity {
    /// No velocity signal.
    None,
    /// Low velocity.
    Low,
    /// Medium velocity.
    Medium,
    /// High velocity.
    High,
}

/// Boolean and categorical fraud signals from the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudSignals {
    /// Hard fraud signal forcing an immediate decline.
    pub fraud_hard_fail: bool,
    /// Consortium database hit.
    pub consortium_hit: bool,
    /// Document verification status.
    pub doc_verification: DocVerification,
    /// Synthetic identity suspicion.
    pub synthetic_id: bool,
    /// Application velocity.
    pub velocity: Velocity,
}

/// Credit policy assessment from the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditAssessment {
    /// Credit score within [300, 900].
    pub score: i64,
    /// Payment-to-income ratio within [0, 1].
    pub pti: f64,
    /// Total-debt-service ratio within [0, 1].
    pub tds: f64,
    /// Loan-to-value ratio within [0, 3].
    pub ltv: f64,
    /// Whether the deal structure is acceptable as submitted.
    pub structure_ok: bool,
    /// Reason the deal is marginal, at most 200 characters.
    pub marginal_reason: String,
}

/// Validated structured analysis returned by the LLM adjudicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmAnalysis {
    /// Fraud probability within [0, 1].
    pub fraud_probability: f64,
    /// Model self-reported confidence within [0, 1].
    pub confidence: f64,
    /// Risk tier.
    pub risk_tier: RiskTier,
    /// Model recommendation.
    pub recommendation: Outcome,
    /// Free-form reasoning, at most 3000 characters.
    pub reasoning: String,
    /// Primary concerns, at most 10 entries.
    pub primary_concerns: Vec<String>,
    /// Red flags, at most 20 entries.
    pub red_flags: Vec<String>,
    /// Mitigating factors, at most 10 entries.
    pub mitigating_factors: Vec<String>,
    /// Fraud signal block.
    pub signals: FraudSignals,
    /// Credit assessment block.
    pub credit: CreditAssessment,
    /// Stipulations proposed by the model.
    #[serde(default)]
    pub stipulations: Vec<Stipulation>,
    /// Provider model identifier that produced the analysis.
    pub model_id: String,
    /// Version of the prompt template rendered for the call.
    pub prompt_template_version: String,
}

// ============================================================================
// SECTION: Final Decision
// ============================================================================

/// Final decision written exactly once per request.
///
/// # Invariants
/// - `reasons` holds at most five entries, rule reasons first.
/// - Once persisted, the decision is immutable and the request is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Final routing outcome.
    pub final_decision: Outcome,
    /// Ordered explanation reasons, capped at five.
    pub reasons: Vec<String>,
    /// Stipulations for conditional outcomes; empty otherwise.
    pub stipulations: Vec<Stipulation>,
    /// Policy version that produced the routing.
    pub policy_version: String,
    /// Stage name to duration in milliseconds.
    pub timings_ms: BTreeMap<String, u64>,
}
