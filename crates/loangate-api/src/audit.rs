// crates/loangate-api/src/audit.rs
// ============================================================================
// Module: Audit Events
// Description: Structured JSON-line audit events for intake and dispatch.
// Purpose: Record security-relevant activity with mandatory PII redaction.
// Dependencies: loangate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are serialized as single JSON lines through a sink trait so
//! deployments can route them without redesign. Every emitted line passes
//! through the PII redactor first; raw applicant strings never reach a log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use loangate_core::Redactor;
use serde::Serialize;

// ============================================================================
// SECTION: Events
// ============================================================================

/// One audit event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A signed submission was accepted and enqueued.
    SubmissionAccepted {
        /// Request identifier.
        request_id: String,
        /// Submitting API key.
        api_key: String,
    },
    /// A submission was rejected before enqueue.
    SubmissionDenied {
        /// Stable failure code.
        code: String,
        /// Submitting API key when one was presented.
        api_key: Option<String>,
    },
    /// A worker reserved a queue entry and began an attempt.
    AttemptStarted {
        /// Request identifier.
        request_id: String,
        /// Attempt ordinal, 1-based.
        attempt: u32,
        /// Worker identifier.
        worker: String,
    },
    /// One pipeline stage finished.
    StageCompleted {
        /// Request identifier.
        request_id: String,
        /// Stage label.
        stage: String,
        /// Stage duration in milliseconds.
        duration_ms: u64,
        /// Stage outcome label.
        outcome: String,
    },
    /// An attempt failed and was classified.
    AttemptFailed {
        /// Request identifier.
        request_id: String,
        /// Attempt ordinal, 1-based.
        attempt: u32,
        /// True when the failure will be retried.
        transient: bool,
        /// Sanitized failure message.
        message: String,
    },
    /// A request reached a terminal state.
    Finalized {
        /// Request identifier.
        request_id: String,
        /// Terminal status label.
        status: String,
        /// Final outcome label for decided requests.
        outcome: Option<String>,
    },
    /// The adjudicator canary ran.
    CanaryResult {
        /// True when the canary passed.
        healthy: bool,
        /// Canary detail message.
        detail: String,
    },
}

// ============================================================================
// SECTION: Sink Interface
// ============================================================================

/// Audit sink for structured events.
pub trait AuditSink: Send + Sync {
    /// Records one audit event.
    fn record(&self, event: &AuditEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that writes redacted JSON lines to stderr.
pub struct StderrAuditSink {
    /// Redactor applied to every emitted line.
    redactor: Arc<Redactor>,
}

impl StderrAuditSink {
    /// Builds a stderr sink around the shared redactor.
    #[must_use]
    pub fn new(redactor: Arc<Redactor>) -> Self {
        Self {
            redactor,
        }
    }
}

impl AuditSink for StderrAuditSink {
    #[allow(clippy::print_stderr, reason = "Audit lines are emitted on stderr by design.")]
    fn record(&self, event: &AuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{}", self.redactor.redact(&line));
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}
