// crates/loangate-api/src/server.rs
// ============================================================================
// Module: HTTP Ingress
// Description: Axum routes for submission, decision polling, and health.
// Purpose: Expose the signed intake surface and the status projection.
// Dependencies: axum, loangate-core, loangate-config, rand
// ============================================================================

//! ## Overview
//! Three routes: `POST /v1/applications` accepts a signed submission and
//! enqueues a job, `GET /v1/decision/{job_id}` returns the status
//! projection, and `GET /health` reports service health. Validation runs in
//! the declared order and stops at the first failure; error bodies carry a
//! stable machine code. The poll projection never exposes stack traces or
//! PII.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use loangate_config::HealthConfig;
use loangate_core::AdjudicationOutcome;
use loangate_core::ApplicationPayload;
use loangate_core::RequestId;
use loangate_core::RequestMeta;
use loangate_core::RequestStatus;
use loangate_core::StageName;
use loangate_core::StageOutput;
use loangate_core::StageRecord;
use loangate_core::band;
use loangate_core::interfaces::NonceFreshness;
use loangate_core::interfaces::StoreError;
use loangate_core::validate_payload;
use loangate_providers::Scorer;
use loangate_providers::wall_clock_now;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::audit::AuditEvent;
use crate::audit::AuditSink;
use crate::auth::AuthError;
use crate::auth::AuthVerifier;
use crate::auth::extract_headers;
use crate::pipeline::PipelineStore;
use crate::telemetry::MetricEvent;
use crate::telemetry::Metrics;

// ============================================================================
// SECTION: Tests
// ============================================================================


// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted request body size in bytes.
const MAX_BODY_BYTES: usize = 256 * 1024;
/// Estimated pipeline completion horizon in seconds.
const ESTIMATED_COMPLETION_SECONDS: i64 = 120;
/// Submission path, part of the signed material.
const SUBMIT_PATH: &str = "/v1/applications";

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared handler state.
pub struct AppState {
    /// Durable store.
    pub store: Arc<dyn PipelineStore>,
    /// HMAC verifier.
    pub verifier: Arc<AuthVerifier>,
    /// ML scoring seam, used by the health probe.
    pub scorer: Arc<dyn Scorer>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    pub metrics: Arc<dyn Metrics>,
    /// Queue health thresholds.
    pub health: HealthConfig,
}

/// Builds the service router.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(SUBMIT_PATH, post(submit))
        .route("/v1/decision/{job_id}", get(poll))
        .route("/health", get(health))
        .with_state(state)
}

// ============================================================================
// SECTION: Error Model
// ============================================================================

/// Machine-readable API error body.
#[derive(Debug, Serialize)]
struct ApiErrorBody {
    /// Stable machine code.
    error: &'static str,
    /// Human-readable message, sanitized.
    message: String,
    /// Field error map for payload validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    field_errors: Option<BTreeMap<String, String>>,
}

/// API error with its HTTP status.
#[derive(Debug)]
struct ApiError {
    /// Response status code.
    status: StatusCode,
    /// Response body.
    body: ApiErrorBody,
}

impl ApiError {
    /// Builds an auth failure response.
    fn auth(err: AuthError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ApiErrorBody {
                error: err.code(),
                message: err.to_string(),
                field_errors: None,
            },
        }
    }

    /// Builds a payload validation failure response.
    fn invalid_payload(message: &str, field_errors: Option<BTreeMap<String, String>>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ApiErrorBody {
                error: "InvalidPayload",
                message: message.to_string(),
                field_errors,
            },
        }
    }

    /// Builds a not-found response.
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ApiErrorBody {
                error: "NotFound",
                message: "unknown job id".to_string(),
                field_errors: None,
            },
        }
    }

    /// Builds a store-outage response.
    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ApiErrorBody {
                error: "StoreUnavailable",
                message: "job store unavailable".to_string(),
                field_errors: None,
            },
        }
    }

    /// Maps a store error onto the API error model.
    fn from_store(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::not_found(),
            _ => Self::unavailable(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ============================================================================
// SECTION: Submit
// ============================================================================

/// Accepted submission response body.
#[derive(Debug, Serialize)]
struct SubmitResponse {
    /// Job identifier for polling.
    job_id: String,
    /// Initial status, always `queued`.
    status: &'static str,
    /// Polling URL for the decision.
    polling_url: String,
    /// Estimated completion as Unix seconds.
    estimated_completion: i64,
}

/// Handles `POST /v1/applications`.
async fn submit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match try_submit(&state, peer, &headers, &body) {
        Ok(response) => {
            state.metrics.incr(MetricEvent::SubmitAccepted);
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err((error, api_key)) => {
            state.metrics.incr(MetricEvent::SubmitDenied);
            state.audit.record(&AuditEvent::SubmissionDenied {
                code: error.body.error.to_string(),
                api_key,
            });
            error.into_response()
        }
    }
}

/// Validation pipeline for one submission, stopping at the first failure.
fn try_submit(
    state: &AppState,
    peer: SocketAddr,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<SubmitResponse, (ApiError, Option<String>)> {
    let now = wall_clock_now();

    // 1. All four auth headers present and well-formed.
    let auth = extract_headers(headers).map_err(|err| (ApiError::auth(err), None))?;
    let api_key_label = Some(auth.api_key.as_str().to_string());

    // 2. Timestamp within the accepted skew window.
    state
        .verifier
        .check_timestamp(&auth, now)
        .map_err(|err| (ApiError::auth(err), api_key_label.clone()))?;

    // 3. Nonce not yet seen within the replay window.
    let seen = state
        .store
        .is_seen(&auth.api_key, &auth.nonce)
        .map_err(|_| (ApiError::unavailable(), api_key_label.clone()))?;
    if seen {
        return Err((ApiError::auth(AuthError::Replay), api_key_label));
    }

    // 4. Signature over method, path, body, timestamp, and nonce.
    state
        .verifier
        .check_signature("POST", SUBMIT_PATH, body, &auth)
        .map_err(|err| (ApiError::auth(err), api_key_label.clone()))?;

    // 5. Body conforms to the application schema.
    if body.len() > MAX_BODY_BYTES {
        return Err((
            ApiError::invalid_payload("request body exceeds size limit", None),
            api_key_label,
        ));
    }
    let payload: ApplicationPayload = serde_json::from_slice(body).map_err(|err| {
        (
            ApiError::invalid_payload(&format!("malformed application json: {err}"), None),
            api_key_label.clone(),
        )
    })?;
    if let Err(violation) = validate_payload(&payload) {
        return Err((
            ApiError::invalid_payload("application failed validation", Some(violation.field_errors)),
            api_key_label,
        ));
    }

    // Atomic nonce decision closes the race left by the read-only check.
    let freshness = state
        .store
        .seen_and_remember(&auth.api_key, &auth.nonce, now)
        .map_err(|_| (ApiError::unavailable(), api_key_label.clone()))?;
    if freshness == NonceFreshness::Duplicate {
        return Err((ApiError::auth(AuthError::Replay), api_key_label));
    }

    let request_id = mint_request_id();
    let meta = RequestMeta {
        api_key: auth.api_key.clone(),
        client_ip: peer.ip().to_string(),
        user_agent: header_string(headers, "user-agent"),
        geo_province: header_string(headers, "x-geo-province"),
    };
    state
        .store
        .create_request(&request_id, &payload, &meta, now)
        .map_err(|_| (ApiError::unavailable(), api_key_label.clone()))?;

    state.audit.record(&AuditEvent::SubmissionAccepted {
        request_id: request_id.as_str().to_string(),
        api_key: auth.api_key.as_str().to_string(),
    });

    Ok(SubmitResponse {
        job_id: request_id.as_str().to_string(),
        status: "queued",
        polling_url: format!("/v1/decision/{request_id}"),
        estimated_completion: now.plus_seconds(ESTIMATED_COMPLETION_SECONDS).as_unix_seconds(),
    })
}

/// Mints a fresh 128-bit request identifier.
fn mint_request_id() -> RequestId {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    RequestId::from_bytes(bytes)
}

/// Reads an optional bounded header value.
fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 1_024)
        .map(ToString::to_string)
}

// ============================================================================
// SECTION: Poll
// ============================================================================

/// Handles `GET /v1/decision/{job_id}`.
async fn poll(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    let Some(request_id) = RequestId::parse(&job_id) else {
        return ApiError::not_found().into_response();
    };
    let request = match state.store.load_request(&request_id) {
        Ok(request) => request,
        Err(err) => return ApiError::from_store(&err).into_response(),
    };

    let mut projection = json!({
        "status": request.status.as_str(),
        "submitted_at": request.received_at.as_unix_millis(),
    });

    match request.status {
        RequestStatus::Queued | RequestStatus::Processing => {}
        RequestStatus::Failed => {
            let message = state
                .store
                .load_failure(&request_id)
                .ok()
                .flatten()
                .unwrap_or_else(|| "processing failed".to_string());
            projection["error_message"] = Value::String(message);
        }
        RequestStatus::Decided => {
            let decision = match state.store.load_decision(&request_id) {
                Ok(Some(decision)) => decision,
                Ok(None) => return ApiError::unavailable().into_response(),
                Err(err) => return ApiError::from_store(&err).into_response(),
            };
            let stages = state.store.load_stages(&request_id).unwrap_or_default();
            let latest = latest_by_stage(&stages);

            let rules = latest.get(&StageName::Rules).and_then(|record| {
                match &record.output {
                    Some(StageOutput::Rules(output)) => Some(output),
                    _ => None,
                }
            });
            let ml = latest.get(&StageName::Ml).and_then(|record| match &record.output {
                Some(StageOutput::Ml(output)) => Some(output),
                _ => None,
            });
            let analysis = latest.get(&StageName::Llm).and_then(|record| {
                match &record.output {
                    Some(StageOutput::Llm(AdjudicationOutcome::Analyzed {
                        analysis,
                    })) => Some(analysis),
                    _ => None,
                }
            });

            projection["decision"] = json!({
                "final_decision": decision.final_decision.as_str(),
                "reasons": decision.reasons,
                "stipulations": decision.stipulations,
                "policy_version": decision.policy_version,
            });
            projection["score_bands"] = json!({
                "rule_score": band_label(rules.map(|output| output.rule_score)),
                "ml_confidence": band_label(ml.map(|output| output.confidence_score)),
                "llm_fraud_probability":
                    band_label(analysis.map(|output| output.fraud_probability)),
            });
            projection["rule_flags"] =
                json!(rules.map(|output| output.rule_flags.clone()).unwrap_or_default());
            projection["top_features"] =
                json!(ml.map(|output| output.top_features.clone()).unwrap_or_default());
            projection["adjudicator_rationale"] = analysis
                .map_or(Value::Null, |output| Value::String(output.reasoning.clone()));
            let total: u64 = decision.timings_ms.values().copied().sum();
            projection["timings_ms"] = json!({
                "stages": decision.timings_ms,
                "total": total,
            });
        }
    }

    (StatusCode::OK, Json(projection)).into_response()
}

/// Picks the latest record per stage; later attempts win.
fn latest_by_stage(records: &[StageRecord]) -> BTreeMap<StageName, &StageRecord> {
    let mut latest = BTreeMap::new();
    for record in records {
        latest.insert(record.stage, record);
    }
    latest
}

/// Renders an optional score as its band label.
fn band_label(score: Option<f64>) -> &'static str {
    band(score).as_str()
}

// ============================================================================
// SECTION: Health
// ============================================================================

/// Handles `GET /health`.
async fn health(State(state): State<Arc<AppState>>) -> Response {
    let now = wall_clock_now();
    let (database, queue) = match state.store.queue_counts() {
        Ok(counts) => {
            let queue_status = if counts.queued >= state.health.max_queued {
                "overloaded"
            } else if counts.failed >= state.health.max_failed {
                "degraded"
            } else {
                "healthy"
            };
            ("healthy", queue_status)
        }
        Err(_) => ("unhealthy", "unknown"),
    };
    let ml_service = if state.scorer.probe().await { "healthy" } else { "unreachable" };

    let healthy = database == "healthy" && queue == "healthy" && ml_service == "healthy";
    let body = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "timestamp": now.as_unix_millis(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": database,
            "queue": queue,
            "ml_service": ml_service,
        },
    });
    (StatusCode::OK, Json(body)).into_response()
}
