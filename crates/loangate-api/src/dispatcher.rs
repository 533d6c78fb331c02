// crates/loangate-api/src/dispatcher.rs
// ============================================================================
// Module: Dispatcher
// Description: Worker pool reserving queue entries and driving attempts.
// Purpose: Provide at-least-once execution with backoff and dead-lettering.
// Dependencies: loangate-core, loangate-config, tokio
// ============================================================================

//! ## Overview
//! Each worker loops: reserve one queue entry, run the pipeline under the
//! overall attempt deadline, then finalize or re-arm. Transient failures
//! re-queue on the configured backoff ladder until the attempt budget is
//! exhausted; permanent failures and exhausted budgets dead-letter the
//! request as `failed`. Workers observe a shutdown flag between iterations
//! so in-flight attempts run to completion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use loangate_config::DispatcherConfig;
use loangate_core::FinalDisposition;
use loangate_core::PipelineError;
use loangate_core::QueueEntry;
use loangate_core::WorkerId;
use loangate_providers::wall_clock_now;
use tokio::task::JoinHandle;

use crate::audit::AuditEvent;
use crate::audit::AuditSink;
use crate::pipeline::PipelineRunner;
use crate::pipeline::PipelineStore;
use crate::telemetry::MetricEvent;
use crate::telemetry::Metrics;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Idle sleep between reservation polls when the queue is empty.
const IDLE_POLL: Duration = Duration::from_millis(500);
/// Sleep after a store error before the next reservation poll.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);
/// Interval between nonce eviction sweeps.
const NONCE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Worker pool over the shared durable queue.
pub struct Dispatcher {
    /// Durable store.
    store: Arc<dyn PipelineStore>,
    /// Pipeline runner shared by all workers.
    runner: Arc<PipelineRunner>,
    /// Dispatcher configuration.
    config: DispatcherConfig,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn Metrics>,
    /// Cooperative shutdown flag.
    shutdown: AtomicBool,
}

impl Dispatcher {
    /// Builds a dispatcher.
    #[must_use]
    pub fn new(
        store: Arc<dyn PipelineStore>,
        runner: Arc<PipelineRunner>,
        config: DispatcherConfig,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            store,
            runner,
            config,
            audit,
            metrics,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Requests cooperative shutdown; workers exit after their current entry.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Spawns the configured worker tasks.
    #[must_use]
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|index| {
                let dispatcher = Arc::clone(self);
                tokio::spawn(async move {
                    dispatcher.worker_loop(index).await;
                })
            })
            .collect()
    }

    /// One worker's reserve-run-finalize loop.
    async fn worker_loop(&self, index: u32) {
        let worker = WorkerId::new(format!("worker-{index}"));
        let visibility_ms = to_millis(self.config.visibility_timeout_seconds);
        while !self.shutdown.load(Ordering::SeqCst) {
            let now = wall_clock_now();
            match self.store.reserve_next(&worker, now, visibility_ms) {
                Ok(Some(entry)) => {
                    self.audit.record(&AuditEvent::AttemptStarted {
                        request_id: entry.request_id.as_str().to_string(),
                        attempt: entry.attempts,
                        worker: worker.as_str().to_string(),
                    });
                    self.run_entry(&entry).await;
                }
                Ok(None) => tokio::time::sleep(IDLE_POLL).await,
                Err(_) => tokio::time::sleep(ERROR_BACKOFF).await,
            }
        }
    }

    /// Runs one reserved entry under the attempt deadline and settles it.
    async fn run_entry(&self, entry: &QueueEntry) {
        let deadline = Duration::from_secs(self.config.pipeline_deadline_seconds);
        let started = Instant::now();
        let attempt = tokio::time::timeout(deadline, self.runner.run_attempt(entry)).await;
        let result = match attempt {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout("pipeline deadline exceeded".to_string())),
        };
        self.metrics.observe_latency(MetricEvent::PipelineDecided, started.elapsed());

        match result {
            Ok(decision) => {
                let outcome = decision.final_decision;
                let disposition = FinalDisposition::Decided {
                    decision,
                };
                if self
                    .store
                    .finalize(&entry.request_id, &disposition, wall_clock_now())
                    .is_ok()
                {
                    self.metrics.incr(MetricEvent::PipelineDecided);
                    self.audit.record(&AuditEvent::Finalized {
                        request_id: entry.request_id.as_str().to_string(),
                        status: "decided".to_string(),
                        outcome: Some(outcome.as_str().to_string()),
                    });
                }
            }
            Err(error) => self.settle_failure(entry, &error),
        }
    }

    /// Re-queues or dead-letters a failed attempt.
    fn settle_failure(&self, entry: &QueueEntry, error: &PipelineError) {
        let retryable = error.is_transient() && entry.attempts < self.config.max_tries;
        self.audit.record(&AuditEvent::AttemptFailed {
            request_id: entry.request_id.as_str().to_string(),
            attempt: entry.attempts,
            transient: retryable,
            message: error.message().to_string(),
        });

        if retryable {
            let delay = self.backoff_seconds(entry.attempts);
            let available_at = wall_clock_now().plus_seconds(delay);
            if self.store.release_for_retry(&entry.request_id, available_at).is_ok() {
                self.metrics.incr(MetricEvent::PipelineRetried);
            }
            return;
        }

        let disposition = FinalDisposition::Failed {
            error_message: error.message().to_string(),
        };
        if self
            .store
            .finalize(&entry.request_id, &disposition, wall_clock_now())
            .is_ok()
        {
            self.metrics.incr(MetricEvent::PipelineDeadLettered);
            self.audit.record(&AuditEvent::Finalized {
                request_id: entry.request_id.as_str().to_string(),
                status: "failed".to_string(),
                outcome: None,
            });
        }
    }

    /// Backoff delay for the attempt that just failed, clamped to the ladder.
    fn backoff_seconds(&self, attempts: u32) -> i64 {
        let ladder = &self.config.backoff_seconds;
        let index = usize::try_from(attempts.saturating_sub(1)).unwrap_or(0);
        let step = ladder.get(index).or_else(|| ladder.last()).copied().unwrap_or(30);
        i64::try_from(step).unwrap_or(30)
    }
}

// ============================================================================
// SECTION: Queue Maintenance
// ============================================================================

/// Spawns the periodic nonce eviction sweep.
#[must_use]
pub fn spawn_nonce_eviction(
    store: Arc<dyn PipelineStore>,
    window_seconds: u64,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let window_ms = to_millis(window_seconds);
        while !shutdown.load(Ordering::SeqCst) {
            let cutoff = wall_clock_now().plus_millis(-window_ms);
            // Eviction is best-effort; a failed sweep retries next interval.
            let _ = store.evict_expired(cutoff);
            tokio::time::sleep(NONCE_SWEEP_INTERVAL).await;
        }
    })
}

/// Converts whole seconds to signed milliseconds.
fn to_millis(seconds: u64) -> i64 {
    i64::try_from(seconds.saturating_mul(1_000)).unwrap_or(i64::MAX)
}
