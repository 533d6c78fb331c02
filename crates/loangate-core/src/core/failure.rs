// crates/loangate-core/src/core/failure.rs
// ============================================================================
// Module: Loangate Failure Taxonomy
// Description: Pipeline failure classification for retry and dead-letter flow.
// Purpose: Distinguish retryable attempts from permanent failures.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A pipeline attempt either succeeds, fails transiently (retried with
//! backoff until the attempt budget is exhausted), or fails permanently
//! (finalized as `failed` immediately). Stage handlers classify their own
//! errors; the dispatcher only inspects [`PipelineError::is_transient`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Pipeline Errors
// ============================================================================

/// Classified failure of one pipeline attempt.
///
/// # Invariants
/// - Messages are sanitized before construction; no PII enters a variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Retryable failure: network errors, 5xx responses, lock contention.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Non-retryable failure: malformed responses, unrecoverable store errors.
    #[error("permanent failure: {0}")]
    Permanent(String),
    /// Attempt or call deadline exceeded; treated as retryable.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl PipelineError {
    /// Returns true when the failure should be retried with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }

    /// Returns the sanitized message for finalization and logs.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(message) | Self::Permanent(message) | Self::Timeout(message) => {
                message
            }
        }
    }
}
