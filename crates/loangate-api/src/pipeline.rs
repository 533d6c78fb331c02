// crates/loangate-api/src/pipeline.rs
// ============================================================================
// Module: Pipeline Runner
// Description: Fixed-order stage execution with append-only stage records.
// Purpose: Run one attempt from rules through decision assembly.
// Dependencies: loangate-core, loangate-providers
// ============================================================================

//! ## Overview
//! One attempt executes the five stages in fixed order: rules, features, ML,
//! LLM adjudication, assembly. Every stage writes an append-only record,
//! including failed and skipped stages, so a retried attempt leaves a full
//! audit trail and the latest attempt wins at decision time. A rules hard
//! fail short-circuits straight to assembly; the remaining stages never run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use loangate_core::AdjudicationOutcome;
use loangate_core::Decision;
use loangate_core::DecisionThresholds;
use loangate_core::FeatureVector;
use loangate_core::MlOutput;
use loangate_core::PipelineError;
use loangate_core::QueueEntry;
use loangate_core::RequestId;
use loangate_core::RulePack;
use loangate_core::RulesOutput;
use loangate_core::StageName;
use loangate_core::StageOutput;
use loangate_core::StageRecord;
use loangate_core::Timestamp;
use loangate_core::assemble;
use loangate_core::features;
use loangate_core::interfaces::JobStore;
use loangate_core::interfaces::NonceStore;
use loangate_core::interfaces::ReuseLookup;
use loangate_core::interfaces::StoreError;
use loangate_core::rules;
use loangate_core::validate_unit_score;
use loangate_providers::Scorer;
use loangate_providers::wall_clock_now;

use crate::adjudicator::Adjudicator;
use crate::audit::AuditEvent;
use crate::audit::AuditSink;
use crate::telemetry::MetricEvent;
use crate::telemetry::Metrics;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Stage handler version recorded on every stage record.
const STAGE_HANDLER_VERSION: &str = "v1";

// ============================================================================
// SECTION: Store Aggregate
// ============================================================================

/// Aggregate store surface consumed by ingress and the pipeline.
pub trait PipelineStore: JobStore + NonceStore + ReuseLookup + Send + Sync {}

impl<T: JobStore + NonceStore + ReuseLookup + Send + Sync> PipelineStore for T {}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Executes pipeline attempts over the shared store and providers.
pub struct PipelineRunner {
    /// Durable store.
    store: Arc<dyn PipelineStore>,
    /// ML scoring seam.
    scorer: Arc<dyn Scorer>,
    /// LLM adjudicator.
    adjudicator: Adjudicator,
    /// Versioned rule pack.
    rule_pack: RulePack,
    /// Routing thresholds.
    thresholds: DecisionThresholds,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn Metrics>,
}

impl PipelineRunner {
    /// Builds a runner.
    #[must_use]
    pub fn new(
        store: Arc<dyn PipelineStore>,
        scorer: Arc<dyn Scorer>,
        adjudicator: Adjudicator,
        rule_pack: RulePack,
        thresholds: DecisionThresholds,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            store,
            scorer,
            adjudicator,
            rule_pack,
            thresholds,
            audit,
            metrics,
        }
    }

    /// Runs one attempt for a reserved queue entry.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] classified for the dispatcher retry policy.
    pub async fn run_attempt(&self, entry: &QueueEntry) -> Result<Decision, PipelineError> {
        let request_id = &entry.request_id;
        let request = self.store.load_request(request_id).map_err(store_failure)?;
        let mut timings: BTreeMap<String, u64> = BTreeMap::new();

        // Rules.
        let started = Instant::now();
        let started_at = wall_clock_now();
        let rules_output = rules::evaluate(&self.rule_pack, &request.payload, started_at);
        validate_unit_score("rule_score", rules_output.rule_score)
            .map_err(|err| PipelineError::Permanent(err.to_string()))?;
        self.finish_stage(
            request_id,
            StageName::Rules,
            started_at,
            started,
            Some(StageOutput::Rules(rules_output.clone())),
            &mut timings,
        )?;

        if rules_output.hard_fail {
            return self.assemble_stage(request_id, &rules_output, None, None, timings);
        }

        // Features.
        let started = Instant::now();
        let started_at = wall_clock_now();
        let lookups: &dyn ReuseLookup = self.store.as_ref();
        let feature_vector = match features::extract(
            request_id,
            &request.payload,
            &request.meta,
            &self.rule_pack.salt,
            lookups,
            started_at,
        ) {
            Ok(vector) => vector,
            Err(err) => {
                return Err(self.fail_stage(
                    request_id,
                    StageName::Features,
                    started_at,
                    started,
                    store_failure(err),
                    &mut timings,
                ));
            }
        };
        self.finish_stage(
            request_id,
            StageName::Features,
            started_at,
            started,
            Some(StageOutput::Features(feature_vector.clone())),
            &mut timings,
        )?;

        // ML scoring.
        let started = Instant::now();
        let started_at = wall_clock_now();
        let ml_output =
            match self.score_features(request_id, &feature_vector).await {
                Ok(output) => output,
                Err(err) => {
                    return Err(self.fail_stage(
                        request_id,
                        StageName::Ml,
                        started_at,
                        started,
                        err,
                        &mut timings,
                    ));
                }
            };
        self.finish_stage(
            request_id,
            StageName::Ml,
            started_at,
            started,
            Some(StageOutput::Ml(ml_output.clone())),
            &mut timings,
        )?;

        // LLM adjudication.
        let started = Instant::now();
        let started_at = wall_clock_now();
        let adjudication = match self
            .adjudicator
            .adjudicate(&request.payload, &rules_output, Some(&ml_output), started_at)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(self.fail_stage(
                    request_id,
                    StageName::Llm,
                    started_at,
                    started,
                    err,
                    &mut timings,
                ));
            }
        };
        if matches!(adjudication, AdjudicationOutcome::Unavailable { .. }) {
            self.metrics.incr(MetricEvent::BreakerFastFail);
        } else if !matches!(adjudication, AdjudicationOutcome::Skipped { .. }) {
            self.metrics.incr(MetricEvent::LlmCall);
        }
        self.finish_stage(
            request_id,
            StageName::Llm,
            started_at,
            started,
            Some(StageOutput::Llm(adjudication.clone())),
            &mut timings,
        )?;

        self.assemble_stage(
            request_id,
            &rules_output,
            Some(&ml_output),
            Some(&adjudication),
            timings,
        )
    }

    /// Scores features and counts the call.
    async fn score_features(
        &self,
        request_id: &RequestId,
        vector: &FeatureVector,
    ) -> Result<MlOutput, PipelineError> {
        let result = self.scorer.score(request_id, &vector.values).await;
        self.metrics.incr(MetricEvent::MlCall);
        result
    }

    /// Runs decision assembly and records the final stage.
    fn assemble_stage(
        &self,
        request_id: &RequestId,
        rules_output: &RulesOutput,
        ml: Option<&MlOutput>,
        adjudication: Option<&AdjudicationOutcome>,
        mut timings: BTreeMap<String, u64>,
    ) -> Result<Decision, PipelineError> {
        let started = Instant::now();
        let started_at = wall_clock_now();
        // Assembly is pure CPU; its timing entry is recorded before routing
        // so the decision's timing map covers every stage.
        let elapsed = elapsed_ms(started);
        timings.insert(StageName::Assembly.as_str().to_string(), elapsed);
        let decision = assemble(rules_output, ml, adjudication, &self.thresholds, timings);

        let record = StageRecord {
            stage: StageName::Assembly,
            version: STAGE_HANDLER_VERSION.to_string(),
            started_at,
            ended_at: wall_clock_now(),
            duration_ms: elapsed,
            output: Some(StageOutput::Assembly(decision.clone())),
            error: None,
        };
        self.store.append_stage(request_id, &record).map_err(store_failure)?;
        self.audit.record(&AuditEvent::StageCompleted {
            request_id: request_id.as_str().to_string(),
            stage: StageName::Assembly.as_str().to_string(),
            duration_ms: record.duration_ms,
            outcome: decision.final_decision.as_str().to_string(),
        });
        Ok(decision)
    }

    /// Writes a successful stage record and accumulates timing.
    fn finish_stage(
        &self,
        request_id: &RequestId,
        stage: StageName,
        started_at: Timestamp,
        started: Instant,
        output: Option<StageOutput>,
        timings: &mut BTreeMap<String, u64>,
    ) -> Result<(), PipelineError> {
        let duration_ms = elapsed_ms(started);
        timings.insert(stage.as_str().to_string(), duration_ms);
        let record = StageRecord {
            stage,
            version: STAGE_HANDLER_VERSION.to_string(),
            started_at,
            ended_at: wall_clock_now(),
            duration_ms,
            output,
            error: None,
        };
        self.store.append_stage(request_id, &record).map_err(store_failure)?;
        self.audit.record(&AuditEvent::StageCompleted {
            request_id: request_id.as_str().to_string(),
            stage: stage.as_str().to_string(),
            duration_ms,
            outcome: "ok".to_string(),
        });
        Ok(())
    }

    /// Records a failed stage and passes the failure through.
    fn fail_stage(
        &self,
        request_id: &RequestId,
        stage: StageName,
        started_at: Timestamp,
        started: Instant,
        error: PipelineError,
        timings: &mut BTreeMap<String, u64>,
    ) -> PipelineError {
        let duration_ms = elapsed_ms(started);
        timings.insert(stage.as_str().to_string(), duration_ms);
        let record = StageRecord {
            stage,
            version: STAGE_HANDLER_VERSION.to_string(),
            started_at,
            ended_at: wall_clock_now(),
            duration_ms,
            output: None,
            error: Some(error.message().to_string()),
        };
        // A failed stage record is best-effort; the attempt error wins.
        if self.store.append_stage(request_id, &record).is_err() {
            return PipelineError::Transient(format!(
                "stage record write failed after: {}",
                error.message()
            ));
        }
        self.audit.record(&AuditEvent::StageCompleted {
            request_id: request_id.as_str().to_string(),
            stage: stage.as_str().to_string(),
            duration_ms,
            outcome: "error".to_string(),
        });
        error
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a store error into the pipeline taxonomy.
fn store_failure(err: StoreError) -> PipelineError {
    match err {
        StoreError::Unavailable(message) => PipelineError::Transient(message),
        StoreError::NotFound(message) => {
            PipelineError::Permanent(format!("request missing: {message}"))
        }
        StoreError::Conflict(message) | StoreError::Corruption(message) => {
            PipelineError::Permanent(message)
        }
    }
}

/// Elapsed milliseconds since a stage started.
fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
