// crates/loangate-api/src/telemetry.rs
// ============================================================================
// Module: Service Telemetry
// Description: Observability hooks for intake and pipeline dispatch.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A thin metrics interface for request counters and latency histograms,
//! intentionally dependency-light so deployments can plug in Prometheus or
//! OpenTelemetry without redesign. Labels are fixed enum variants; no
//! user-derived strings flow through this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for pipeline histograms.
pub const LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 120_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Counted service events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MetricEvent {
    /// A submission was accepted and enqueued.
    SubmitAccepted,
    /// A submission was denied at intake.
    SubmitDenied,
    /// A pipeline attempt completed with a decision.
    PipelineDecided,
    /// A pipeline attempt was re-queued for retry.
    PipelineRetried,
    /// A request was dead-lettered.
    PipelineDeadLettered,
    /// An outbound ML scoring call completed.
    MlCall,
    /// An outbound LLM adjudication call completed.
    LlmCall,
    /// The LLM breaker fast-failed a call.
    BreakerFastFail,
}

impl MetricEvent {
    /// Returns a stable label for the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubmitAccepted => "submit_accepted",
            Self::SubmitDenied => "submit_denied",
            Self::PipelineDecided => "pipeline_decided",
            Self::PipelineRetried => "pipeline_retried",
            Self::PipelineDeadLettered => "pipeline_dead_lettered",
            Self::MlCall => "ml_call",
            Self::LlmCall => "llm_call",
            Self::BreakerFastFail => "breaker_fast_fail",
        }
    }
}

// ============================================================================
// SECTION: Metrics Interface
// ============================================================================

/// Metrics sink for counters and latency observations.
pub trait Metrics: Send + Sync {
    /// Increments a counter.
    fn incr(&self, event: MetricEvent);

    /// Observes a latency sample for an event.
    fn observe_latency(&self, event: MetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn incr(&self, _event: MetricEvent) {}

    fn observe_latency(&self, _event: MetricEvent, _latency: Duration) {}
}
