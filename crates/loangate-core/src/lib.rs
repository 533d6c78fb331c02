// crates/loangate-core/src/lib.rs
// ============================================================================
// Module: Loangate Core Library
// Description: Public API surface for the Loangate core.
// Purpose: Expose domain types, interfaces, and pure pipeline logic.
// Dependencies: crate::{core, interfaces, rules, features, decide, assemble, redact}
// ============================================================================

//! ## Overview
//! Loangate core provides the pure half of the fraud-adjudication pipeline:
//! payload validation, the data-driven rules engine, feature extraction, the
//! adjudicator routing function, decision assembly, score banding, and PII
//! redaction. It performs no I/O and never reads the wall clock; the store,
//! providers, and API crates integrate through the explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod assemble;
pub mod core;
pub mod decide;
pub mod features;
pub mod interfaces;
pub mod redact;
pub mod rules;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::*;

pub use assemble::POLICY_VERSION;
pub use assemble::assemble;
pub use decide::AdjudicatorVerdict;
pub use decide::DecisionThresholds;
pub use decide::decide;
pub use features::FEATURE_NAMES;
pub use features::FEATURE_SET_VERSION;
pub use interfaces::FinalDisposition;
pub use interfaces::JobStore;
pub use interfaces::NonceFreshness;
pub use interfaces::NonceStore;
pub use interfaces::QueueCounts;
pub use interfaces::QueueEntry;
pub use interfaces::ReuseLookup;
pub use interfaces::StoreError;
pub use redact::RedactError;
pub use redact::Redactor;
pub use rules::RuleCheck;
pub use rules::RulePack;
pub use rules::RuleSpec;
