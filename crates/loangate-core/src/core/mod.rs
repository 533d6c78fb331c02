// crates/loangate-core/src/core/mod.rs
// ============================================================================
// Module: Loangate Core Types
// Description: Domain model shared by every Loangate crate.
// Purpose: Group identifier, time, payload, score, and record types.
// Dependencies: crate submodules
// ============================================================================

//! ## Overview
//! The core module holds the pure domain model: identifiers, timestamps, the
//! application payload with validation, score banding, stage records, and
//! decision types. Nothing here performs I/O or reads the wall clock.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod application;
pub mod decision;
pub mod failure;
pub mod hashing;
pub mod identifiers;
pub mod scores;
pub mod stage;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use application::ApplicationPayload;
pub use application::ApplicationRequest;
pub use application::ContactBlock;
pub use application::DealerBlock;
pub use application::EmploymentType;
pub use application::FinancialBlock;
pub use application::LoanBlock;
pub use application::PayloadError;
pub use application::PersonalBlock;
pub use application::RequestMeta;
pub use application::RequestStatus;
pub use application::VehicleBlock;
pub use application::validate_payload;
pub use decision::CreditAssessment;
pub use decision::Decision;
pub use decision::DocVerification;
pub use decision::FraudSignals;
pub use decision::LlmAnalysis;
pub use decision::Outcome;
pub use decision::RiskTier;
pub use decision::Stipulation;
pub use decision::StipulationKind;
pub use decision::Velocity;
pub use failure::PipelineError;
pub use identifiers::ApiKey;
pub use identifiers::RequestId;
pub use identifiers::WorkerId;
pub use scores::Band;
pub use scores::ScoreError;
pub use scores::band;
pub use scores::validate_score;
pub use scores::validate_unit_score;
pub use stage::AdjudicationOutcome;
pub use stage::FeatureVector;
pub use stage::MlOutput;
pub use stage::RulesOutput;
pub use stage::StageName;
pub use stage::StageOutput;
pub use stage::StageRecord;
pub use stage::TopFeature;
pub use self::time::Timestamp;
