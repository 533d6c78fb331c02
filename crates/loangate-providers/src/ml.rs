// crates/loangate-providers/src/ml.rs
// ============================================================================
// Module: ML Scoring Client
// Description: HTTP client for the external ML scoring service.
// Purpose: Fetch a calibrated confidence score with bounded retries.
// Dependencies: loangate-core, reqwest, rand, tokio
// ============================================================================

//! ## Overview
//! The ML client posts the ordered feature vector to `{ml_url}/score` with a
//! hard per-call timeout. 5xx responses and transport failures retry with
//! jittered exponential backoff up to the configured budget and classify as
//! transient; anything malformed in a 2xx response classifies as permanent
//! because retrying cannot fix a contract violation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use loangate_core::FEATURE_NAMES;
use loangate_core::MlOutput;
use loangate_core::PipelineError;
use loangate_core::RequestId;
use loangate_core::TopFeature;
use loangate_core::validate_unit_score;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Base delay for the retry ladder in milliseconds.
const RETRY_BASE_MS: u64 = 500;
/// Upper bound of the uniform retry jitter in milliseconds.
const RETRY_JITTER_MS: u64 = 100;

// ============================================================================
// SECTION: Scoring Interface
// ============================================================================

/// Scoring seam consumed by the pipeline.
///
/// The pipeline depends on this trait rather than the concrete HTTP client so
/// tests can inject scripted scorers.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Scores an ordered feature vector for the request.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] classified for the dispatcher retry policy.
    async fn score(
        &self,
        request_id: &RequestId,
        features: &[f64],
    ) -> Result<MlOutput, PipelineError>;

    /// Probes scoring service health.
    async fn probe(&self) -> bool;
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// ML client configuration.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of the scoring service.
    pub service_url: String,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retries after the initial call on 5xx or timeout.
    pub retry_attempts: u32,
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Scoring request body.
#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    /// Ordered feature values.
    features: &'a [f64],
    /// Declared feature names matching the value order.
    feature_names: [&'static str; 15],
    /// Request identifier for service-side correlation.
    request_id: &'a str,
}

/// Scoring response body.
#[derive(Debug, Deserialize)]
struct ScoreResponse {
    /// Calibrated fraud confidence.
    confidence_score: f64,
    /// Ordered feature importance explanation.
    top_features: Vec<WireTopFeature>,
    /// Model version.
    model_version: String,
    /// Calibration version.
    calibration_version: String,
    /// Service-side inference latency.
    inference_time_ms: u64,
}

/// One feature importance entry on the wire.
#[derive(Debug, Deserialize)]
struct WireTopFeature {
    /// Feature name.
    feature_name: String,
    /// Feature value the model saw.
    feature_value: f64,
    /// Global importance.
    importance: f64,
    /// Signed contribution.
    contribution: f64,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// HTTP client for the ML scoring service.
pub struct MlClient {
    /// Client configuration.
    config: MlClientConfig,
    /// Underlying HTTP client with the call timeout applied.
    http: reqwest::Client,
}

impl MlClient {
    /// Builds a scoring client.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Permanent`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: MlClientConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| PipelineError::Permanent(format!("ml client build failed: {err}")))?;
        Ok(Self {
            config,
            http,
        })
    }

    /// Scores a feature vector, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Transient`] after the retry budget is spent
    /// on 5xx or transport failures, and [`PipelineError::Permanent`] for
    /// malformed responses.
    pub async fn score_vector(
        &self,
        request_id: &RequestId,
        features: &[f64],
    ) -> Result<MlOutput, PipelineError> {
        let url = format!("{}/score", self.config.service_url.trim_end_matches('/'));
        let body = ScoreRequest {
            features,
            feature_names: FEATURE_NAMES,
            request_id: request_id.as_str(),
        };

        let mut last_error = String::new();
        let total_calls = self.config.retry_attempts.saturating_add(1);
        for attempt in 1..=total_calls {
            match self.call_once(&url, &body).await {
                Ok(output) => return Ok(output),
                Err(CallError::Retryable(message)) => {
                    last_error = message;
                    if attempt < total_calls {
                        tokio::time::sleep(retry_delay(attempt)).await;
                    }
                }
                Err(CallError::Fatal(message)) => {
                    return Err(PipelineError::Permanent(message));
                }
            }
        }
        Err(PipelineError::Transient(format!("ml scoring failed: {last_error}")))
    }

    /// Issues one scoring call.
    async fn call_once(
        &self,
        url: &str,
        body: &ScoreRequest<'_>,
    ) -> Result<MlOutput, CallError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| CallError::Retryable(classify_transport(&err)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(CallError::Retryable(format!("ml service returned {status}")));
        }
        if !status.is_success() {
            return Err(CallError::Fatal(format!("ml service rejected request: {status}")));
        }

        let wire: ScoreResponse = response
            .json()
            .await
            .map_err(|err| CallError::Fatal(format!("malformed ml response: {err}")))?;
        validate_response(wire)
    }

    /// Probes the scoring service health endpoint.
    async fn probe_healthz(&self) -> bool {
        let url = format!("{}/healthz", self.config.service_url.trim_end_matches('/'));
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Scorer for MlClient {
    async fn score(
        &self,
        request_id: &RequestId,
        features: &[f64],
    ) -> Result<MlOutput, PipelineError> {
        self.score_vector(request_id, features).await
    }

    async fn probe(&self) -> bool {
        self.probe_healthz().await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Per-call error classification.
enum CallError {
    /// Worth retrying within the budget.
    Retryable(String),
    /// Retrying cannot help.
    Fatal(String),
}

/// Labels a transport error without leaking request contents.
fn classify_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "ml call timed out".to_string()
    } else if err.is_connect() {
        "ml service unreachable".to_string()
    } else {
        "ml transport failure".to_string()
    }
}

/// Validates the wire response into a pipeline record.
fn validate_response(wire: ScoreResponse) -> Result<MlOutput, CallError> {
    let confidence = validate_unit_score("confidence_score", wire.confidence_score)
        .map_err(|err| CallError::Fatal(err.to_string()))?;
    Ok(MlOutput {
        confidence_score: confidence,
        top_features: wire
            .top_features
            .into_iter()
            .map(|feature| TopFeature {
                feature_name: feature.feature_name,
                feature_value: feature.feature_value,
                importance: feature.importance,
                contribution: feature.contribution,
            })
            .collect(),
        model_version: wire.model_version,
        calibration_version: wire.calibration_version,
        inference_time_ms: wire.inference_time_ms,
    })
}

/// Computes the jittered exponential delay for a retry.
fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(8);
    let base = RETRY_BASE_MS.saturating_mul(1_u64 << exponent);
    let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
    Duration::from_millis(base.saturating_add(jitter))
}
