// crates/loangate-api/tests/pipeline_scenarios.rs
// ============================================================================
// Module: Pipeline Scenario Tests
// Description: End-to-end pipeline flows with scripted providers.
// Purpose: Validate routing outcomes, fallback, retries, and log hygiene.
// Dependencies: loangate-api, loangate-store-sqlite, tempfile
// ============================================================================

//! ## Overview
//! Drives full pipeline attempts against a real SQLite store with scripted
//! ML and LLM providers: a clean approval, the hard-fail short circuit, the
//! borderline conditional with ordered stipulations, the breaker fallback,
//! fenced-JSON recovery, dead-lettering after exhausted retries, and the
//! no-PII-in-logs property.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use loangate_api::Adjudicator;
use loangate_api::AdjudicatorConfig;
use loangate_api::AuditEvent;
use loangate_api::AuditSink;
use loangate_api::Dispatcher;
use loangate_api::NoopAuditSink;
use loangate_api::NoopMetrics;
use loangate_api::PipelineRunner;
use loangate_api::PipelineStore;
use loangate_config::DispatcherConfig;
use loangate_core::ApiKey;
use loangate_core::ApplicationPayload;
use loangate_core::ContactBlock;
use loangate_core::DealerBlock;
use loangate_core::DecisionThresholds;
use loangate_core::EmploymentType;
use loangate_core::FEATURE_NAMES;
use loangate_core::FinancialBlock;
use loangate_core::JobStore;
use loangate_core::LoanBlock;
use loangate_core::MlOutput;
use loangate_core::Outcome;
use loangate_core::PersonalBlock;
use loangate_core::PipelineError;
use loangate_core::QueueEntry;
use loangate_core::Redactor;
use loangate_core::RequestId;
use loangate_core::RequestMeta;
use loangate_core::RequestStatus;
use loangate_core::ReuseLookup;
use loangate_core::RulePack;
use loangate_core::StipulationKind;
use loangate_core::VehicleBlock;
use loangate_core::WorkerId;
use loangate_core::features;
use loangate_providers::ChatTransport;
use loangate_providers::LlmError;
use loangate_providers::Scorer;
use loangate_providers::wall_clock_now;
use loangate_store_sqlite::SqliteStore;
use loangate_store_sqlite::SqliteStoreConfig;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Scripted Providers
// ============================================================================

/// Scorer returning a fixed confidence or a scripted failure.
struct ScriptedScorer {
    /// Scripted result: confidence score or transient failure.
    confidence: Option<f64>,
    /// Calls observed.
    calls: AtomicU32,
}

impl ScriptedScorer {
    fn confident(confidence: f64) -> Self {
        Self {
            confidence: Some(confidence),
            calls: AtomicU32::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            confidence: None,
            calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(
        &self,
        _request_id: &RequestId,
        features: &[f64],
    ) -> Result<MlOutput, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(features.len(), 15);
        match self.confidence {
            Some(confidence_score) => Ok(MlOutput {
                confidence_score,
                top_features: Vec::new(),
                model_version: "m-test".to_string(),
                calibration_version: "c-test".to_string(),
                inference_time_ms: 5,
            }),
            None => Err(PipelineError::Transient("ml scoring failed: scripted".to_string())),
        }
    }

    async fn probe(&self) -> bool {
        true
    }
}

/// Scripted LLM transport step.
enum Script {
    /// Return this content.
    Content(String),
    /// Fail fast as if the breaker were open.
    BreakerOpen,
}

/// Transport replaying a scripted sequence.
struct ScriptedTransport {
    /// Remaining scripted steps.
    steps: Mutex<VecDeque<Script>>,
    /// Calls observed.
    calls: AtomicU32,
}

impl ScriptedTransport {
    fn new(steps: Vec<Script>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Script::Content(content)) => Ok(content),
            Some(Script::BreakerOpen) | None => Err(LlmError::BreakerOpen),
        }
    }

    fn model_id(&self) -> &str {
        "adjudicator-model-test"
    }
}

/// Audit sink retaining redacted lines for assertions.
struct MemorySink {
    /// Recorded redacted lines.
    lines: Mutex<Vec<String>>,
    /// Redactor applied before retention.
    redactor: Redactor,
}

impl MemorySink {
    fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            redactor: Redactor::new().unwrap(),
        }
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            self.lines.lock().unwrap().push(self.redactor.redact(&line));
        }
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn sample_payload() -> ApplicationPayload {
    ApplicationPayload {
        personal: PersonalBlock {
            first_name: "Avery".to_string(),
            last_name: "Tremblay".to_string(),
            date_of_birth: "1987-03-10".to_string(),
            sin: "130692544".to_string(),
        },
        contact: ContactBlock {
            email: "avery.tremblay@example.com".to_string(),
            phone: "416-555-0134".to_string(),
            street_address: "12 King St W".to_string(),
            city: "Toronto".to_string(),
            province: "ON".to_string(),
            postal_code: "M5V 2T6".to_string(),
        },
        financial: FinancialBlock {
            annual_income: 80_000.0,
            employment_type: EmploymentType::FullTime,
            employment_months: 48,
            credit_score: 750,
            monthly_debt_payments: 900.0,
        },
        loan: LoanBlock {
            amount: 20_000.0,
            term_months: 60,
            interest_rate: 7.5,
            down_payment: 5_000.0,
            purchase_price: 25_000.0,
        },
        vehicle: VehicleBlock {
            year: 2022,
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            vin: "2HGFE2F52NH100001".to_string(),
            value: 25_000.0,
            mileage_km: 45_000.0,
        },
        dealer: DealerBlock {
            dealer_id: "DLR-001".to_string(),
            name: "Maple Motors".to_string(),
            province: "ON".to_string(),
        },
    }
}

fn sample_meta() -> RequestMeta {
    RequestMeta {
        api_key: ApiKey::new("client-a"),
        client_ip: "203.0.113.10".to_string(),
        user_agent: Some("loangate-sdk/1.2".to_string()),
        geo_province: None,
    }
}

/// Well-formed clean analysis: high confidence, low fraud, gates pass.
fn clean_analysis_json() -> String {
    json!({
        "fraud_probability": 0.10,
        "confidence": 0.90,
        "risk_tier": "low",
        "recommendation": "approve",
        "reasoning": "Profile is consistent with a low-risk applicant.",
        "primary_concerns": [],
        "red_flags": [],
        "mitigating_factors": ["stable employment"],
        "signals": {
            "fraud_hard_fail": false,
            "consortium_hit": false,
            "doc_verification": "pass",
            "synthetic_id": false,
            "velocity": "none"
        },
        "credit": {
            "score": 750,
            "pti": 0.10,
            "tds": 0.30,
            "ltv": 0.80,
            "structure_ok": true,
            "marginal_reason": ""
        },
        "stipulations": []
    })
    .to_string()
}

/// Borderline analysis: confident, moderate fraud probability, PTI over cap.
fn borderline_analysis_json() -> String {
    json!({
        "fraud_probability": 0.30,
        "confidence": 0.82,
        "risk_tier": "medium",
        "recommendation": "conditional",
        "reasoning": "Payment burden is above policy for the declared income.",
        "primary_concerns": ["payment-to-income above cap"],
        "red_flags": [],
        "mitigating_factors": ["long employment tenure"],
        "signals": {
            "fraud_hard_fail": false,
            "consortium_hit": false,
            "doc_verification": "not_performed",
            "synthetic_id": false,
            "velocity": "low"
        },
        "credit": {
            "score": 690,
            "pti": 0.18,
            "tds": 0.30,
            "ltv": 0.90,
            "structure_ok": true,
            "marginal_reason": "PTI above cap"
        },
        "stipulations": []
    })
    .to_string()
}

struct Harness {
    store: Arc<SqliteStore>,
    runner: PipelineRunner,
    scorer: Arc<ScriptedScorer>,
    transport: Arc<ScriptedTransport>,
    _dir: TempDir,
}

fn build_harness(
    scorer: ScriptedScorer,
    transport: ScriptedTransport,
    audit: Arc<dyn AuditSink>,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        SqliteStore::new(SqliteStoreConfig::new(dir.path().join("loangate.db"), "test-salt"))
            .unwrap(),
    );
    let scorer = Arc::new(scorer);
    let transport = Arc::new(transport);
    let adjudicator = Adjudicator::new(
        Arc::clone(&transport) as Arc<dyn ChatTransport>,
        AdjudicatorConfig {
            trigger_min: 0.3,
            trigger_max: 0.7,
            thresholds: DecisionThresholds::default(),
            canary_timeout: Duration::from_secs(5),
        },
    )
    .unwrap();
    let runner = PipelineRunner::new(
        Arc::clone(&store) as Arc<dyn PipelineStore>,
        Arc::clone(&scorer) as Arc<dyn Scorer>,
        adjudicator,
        RulePack::default_pack(),
        DecisionThresholds::default(),
        audit,
        Arc::new(NoopMetrics),
    );
    Harness {
        store,
        runner,
        scorer,
        transport,
        _dir: dir,
    }
}

/// Creates a request and reserves its queue entry.
fn enqueue(harness: &Harness, payload: &ApplicationPayload) -> QueueEntry {
    let request_id = RequestId::from_bytes([7; 16]);
    harness
        .store
        .create_request(&request_id, payload, &sample_meta(), wall_clock_now())
        .unwrap();
    harness
        .store
        .reserve_next(&WorkerId::new("test-worker"), wall_clock_now(), 330_000)
        .unwrap()
        .unwrap()
}

// ============================================================================
// SECTION: Scenario Tests
// ============================================================================

#[tokio::test]
async fn clean_low_risk_applicant_is_approved() {
    let harness = build_harness(
        ScriptedScorer::confident(0.10),
        ScriptedTransport::new(vec![Script::Content(clean_analysis_json())]),
        Arc::new(NoopAuditSink),
    );
    let entry = enqueue(&harness, &sample_payload());

    let decision = harness.runner.run_attempt(&entry).await.unwrap();
    assert_eq!(decision.final_decision, Outcome::Approve);
    assert!(decision.stipulations.is_empty());
    assert_eq!(harness.scorer.call_count(), 1);
    assert_eq!(harness.transport.call_count(), 1);
}

#[tokio::test]
async fn invalid_sin_hard_fails_without_downstream_calls() {
    let harness = build_harness(
        ScriptedScorer::confident(0.10),
        ScriptedTransport::new(vec![Script::Content(clean_analysis_json())]),
        Arc::new(NoopAuditSink),
    );
    let mut payload = sample_payload();
    payload.personal.sin = "000000000".to_string();
    let entry = enqueue(&harness, &payload);

    let decision = harness.runner.run_attempt(&entry).await.unwrap();
    assert_eq!(decision.final_decision, Outcome::Decline);
    assert!(decision.reasons.iter().any(|reason| reason == "invalid_sin"));
    // Neither the scorer nor the adjudicator is consulted after a hard fail.
    assert_eq!(harness.scorer.call_count(), 0);
    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test]
async fn borderline_case_goes_conditional_with_ordered_stipulations() {
    let harness = build_harness(
        ScriptedScorer::confident(0.55),
        ScriptedTransport::new(vec![Script::Content(borderline_analysis_json())]),
        Arc::new(NoopAuditSink),
    );
    let entry = enqueue(&harness, &sample_payload());

    let decision = harness.runner.run_attempt(&entry).await.unwrap();
    assert_eq!(decision.final_decision, Outcome::Conditional);
    let kinds: Vec<StipulationKind> =
        decision.stipulations.iter().map(|stip| stip.kind).collect();
    assert_eq!(kinds, vec![
        StipulationKind::ReduceTerm,
        StipulationKind::IncreaseDownPayment
    ]);
    assert_eq!(decision.stipulations[1].detail, "until PTI ≤ 15%");
}

#[tokio::test]
async fn open_breaker_falls_back_to_rules_and_ml_combine() {
    let harness = build_harness(
        ScriptedScorer::confident(0.65),
        ScriptedTransport::new(vec![Script::BreakerOpen]),
        Arc::new(NoopAuditSink),
    );
    let entry = enqueue(&harness, &sample_payload());

    let decision = harness.runner.run_attempt(&entry).await.unwrap();
    // max(rule_score 0.0, ml 0.65) lands in the review band.
    assert_eq!(decision.final_decision, Outcome::Review);
}

#[tokio::test]
async fn fenced_json_recovers_and_continues() {
    let fenced = format!("```json\n{}\n```", clean_analysis_json());
    let harness = build_harness(
        ScriptedScorer::confident(0.55),
        ScriptedTransport::new(vec![Script::Content(fenced)]),
        Arc::new(NoopAuditSink),
    );
    let entry = enqueue(&harness, &sample_payload());

    let decision = harness.runner.run_attempt(&entry).await.unwrap();
    assert_eq!(decision.final_decision, Outcome::Approve);
}

#[tokio::test]
async fn unrecoverable_llm_output_routes_to_review() {
    let harness = build_harness(
        ScriptedScorer::confident(0.55),
        ScriptedTransport::new(vec![Script::Content("no json at all".to_string())]),
        Arc::new(NoopAuditSink),
    );
    let entry = enqueue(&harness, &sample_payload());

    let decision = harness.runner.run_attempt(&entry).await.unwrap();
    assert_eq!(decision.final_decision, Outcome::Review);
    assert!(decision.reasons.iter().any(|reason| reason == "LLM invalid JSON"));
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_dead_letter_after_max_tries() {
    let harness = build_harness(
        ScriptedScorer::failing(),
        ScriptedTransport::new(Vec::new()),
        Arc::new(NoopAuditSink),
    );
    let request_id = RequestId::from_bytes([9; 16]);
    harness
        .store
        .create_request(&request_id, &sample_payload(), &sample_meta(), wall_clock_now())
        .unwrap();

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&harness.store) as Arc<dyn PipelineStore>,
        Arc::new(build_harness_runner_for_dispatch(&harness)),
        DispatcherConfig {
            worker_count: 1,
            max_tries: 1,
            backoff_seconds: vec![1],
            visibility_timeout_seconds: 330,
            pipeline_deadline_seconds: 300,
        },
        Arc::new(NoopAuditSink),
        Arc::new(NoopMetrics),
    ));
    let handles = dispatcher.spawn_workers();

    let mut status = RequestStatus::Queued;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        status = harness.store.load_request(&request_id).unwrap().status;
        if status == RequestStatus::Failed {
            break;
        }
    }
    dispatcher.shutdown();
    for handle in handles {
        let _ = handle.await;
    }

    assert_eq!(status, RequestStatus::Failed);
    assert!(harness.store.load_failure(&request_id).unwrap().is_some());
    assert_eq!(harness.store.queue_counts().unwrap().failed, 1);
    assert_eq!(harness.store.queue_counts().unwrap().queued, 0);
}

/// Builds a second runner over the same store for the dispatcher test.
fn build_harness_runner_for_dispatch(harness: &Harness) -> PipelineRunner {
    let adjudicator = Adjudicator::new(
        Arc::clone(&harness.transport) as Arc<dyn ChatTransport>,
        AdjudicatorConfig {
            trigger_min: 0.3,
            trigger_max: 0.7,
            thresholds: DecisionThresholds::default(),
            canary_timeout: Duration::from_secs(5),
        },
    )
    .unwrap();
    PipelineRunner::new(
        Arc::clone(&harness.store) as Arc<dyn PipelineStore>,
        Arc::clone(&harness.scorer) as Arc<dyn Scorer>,
        adjudicator,
        RulePack::default_pack(),
        DecisionThresholds::default(),
        Arc::new(NoopAuditSink),
        Arc::new(NoopMetrics),
    )
}

/// Position of a feature name in the declared order.
fn feature_index(name: &str) -> usize {
    FEATURE_NAMES
        .iter()
        .position(|candidate| *candidate == name)
        .unwrap()
}

#[test]
fn fresh_application_has_no_reuse_signals() {
    let harness = build_harness(
        ScriptedScorer::confident(0.10),
        ScriptedTransport::new(Vec::new()),
        Arc::new(NoopAuditSink),
    );
    let payload = sample_payload();
    let first = RequestId::from_bytes([3; 16]);
    harness
        .store
        .create_request(&first, &payload, &sample_meta(), wall_clock_now())
        .unwrap();

    // The request's own identifier rows, written at ingress, are not reuse.
    let lookups: &dyn ReuseLookup = harness.store.as_ref();
    let vector = features::extract(
        &first,
        &payload,
        &sample_meta(),
        "test-salt",
        lookups,
        wall_clock_now(),
    )
    .unwrap();
    assert!((vector.values[feature_index("vin_reuse_flag")] - 0.0).abs() < f64::EPSILON);
    assert!((vector.values[feature_index("phone_reuse_count")] - 0.0).abs() < f64::EPSILON);
    assert!((vector.values[feature_index("email_reuse_count")] - 0.0).abs() < f64::EPSILON);
    assert!((vector.values[feature_index("dealer_volume_24h")] - 0.0).abs() < f64::EPSILON);

    // A second application carrying the same identifiers does see reuse.
    let second = RequestId::from_bytes([4; 16]);
    harness
        .store
        .create_request(&second, &payload, &sample_meta(), wall_clock_now())
        .unwrap();
    let vector = features::extract(
        &second,
        &payload,
        &sample_meta(),
        "test-salt",
        lookups,
        wall_clock_now(),
    )
    .unwrap();
    assert!((vector.values[feature_index("vin_reuse_flag")] - 1.0).abs() < f64::EPSILON);
    assert!((vector.values[feature_index("phone_reuse_count")] - 1.0).abs() < f64::EPSILON);
    assert!((vector.values[feature_index("dealer_volume_24h")] - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn audit_lines_carry_no_raw_pii() {
    let sink = Arc::new(MemorySink::new());
    let harness = build_harness(
        ScriptedScorer::confident(0.55),
        ScriptedTransport::new(vec![Script::Content(clean_analysis_json())]),
        Arc::clone(&sink) as Arc<dyn AuditSink>,
    );
    let payload = sample_payload();
    let entry = enqueue(&harness, &payload);
    let _ = harness.runner.run_attempt(&entry).await.unwrap();

    let lines = sink.lines.lock().unwrap();
    assert!(!lines.is_empty());
    for line in lines.iter() {
        assert!(!line.contains("130692544"));
        assert!(!line.contains("130-692-544"));
        assert!(!line.contains("416-555-0134"));
        assert!(!line.contains("avery.tremblay@example.com"));
        assert!(!line.contains("M5V 2T6"));
    }
}
