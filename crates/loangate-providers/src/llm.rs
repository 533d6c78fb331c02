// crates/loangate-providers/src/llm.rs
// ============================================================================
// Module: LLM Chat Client
// Description: Schema-constrained chat-completions client with a breaker.
// Purpose: Obtain strict-JSON adjudication responses from the provider.
// Dependencies: loangate-core, reqwest, rand, tokio, async-trait
// ============================================================================

//! ## Overview
//! The LLM client speaks the OpenAI-compatible chat-completions shape with
//! `response_format` requesting strict conformance to the adjudication
//! schema. Sampling is pinned (low temperature, `top_p` 1.0, deterministic
//! seed) so reruns are as reproducible as the provider allows. Every attempt
//! passes through the circuit breaker: an open breaker fails fast without an
//! outbound call, and each transport failure feeds the breaker counter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::breaker::BreakerKey;
use crate::breaker::CircuitBreaker;
use crate::clock::wall_clock_now;
use crate::schema::SCHEMA_NAME;
use crate::schema::analysis_response_schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed nucleus sampling parameter for adjudication calls.
const TOP_P: f64 = 1.0;
/// Deterministic seed sent to providers that support it.
const SAMPLING_SEED: u64 = 20_250_601;
/// Upper bound of the uniform retry jitter in milliseconds.
const RETRY_JITTER_MS: u64 = 100;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// LLM transport errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The circuit breaker is open; no outbound call was made.
    #[error("llm breaker open")]
    BreakerOpen,
    /// Transport failed after the retry budget was spent.
    #[error("llm transport failure: {0}")]
    Transport(String),
    /// The provider answered with a non-retryable status.
    #[error("llm provider rejected request: {0}")]
    Rejected(String),
    /// The provider response envelope was malformed.
    #[error("llm response envelope malformed: {0}")]
    Envelope(String),
}

// ============================================================================
// SECTION: Transport Interface
// ============================================================================

/// Chat-completions transport consumed by the adjudicator.
///
/// The adjudicator depends on this seam rather than a concrete client so
/// tests and canaries can inject scripted transports.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Requests a completion for the prompt, returning raw message content.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when no content could be obtained.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Model identifier used by this transport.
    fn model_id(&self) -> &str;
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// LLM client configuration.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Provider label for breaker keying.
    pub provider: String,
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Model identifier.
    pub model: String,
    /// Bearer token.
    pub api_key: String,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Transport retry attempts.
    pub retry_attempts: u32,
    /// Base retry delay in milliseconds.
    pub retry_delay_ms: u64,
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Chat-completions request body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    /// Model identifier.
    model: &'a str,
    /// Conversation messages.
    messages: Vec<ChatMessage<'a>>,
    /// Completion token budget.
    max_tokens: u32,
    /// Sampling temperature.
    temperature: f64,
    /// Nucleus sampling parameter.
    top_p: f64,
    /// Strict response format request.
    response_format: Value,
    /// Deterministic sampling seed.
    seed: u64,
}

/// One chat message.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    /// Message role.
    role: &'a str,
    /// Message content.
    content: &'a str,
}

/// Chat-completions response envelope.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    /// Completion choices.
    choices: Vec<ChatChoice>,
}

/// One completion choice.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    /// Completed message.
    message: ChatResponseMessage,
}

/// Message payload of a completion choice.
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    /// Message content.
    content: Option<String>,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// HTTP chat-completions client.
pub struct HttpLlmClient {
    /// Client configuration.
    config: LlmClientConfig,
    /// Underlying HTTP client with the call timeout applied.
    http: reqwest::Client,
    /// Shared circuit breaker.
    breaker: Arc<CircuitBreaker>,
    /// Breaker key for this provider endpoint.
    breaker_key: BreakerKey,
}

impl HttpLlmClient {
    /// Builds an LLM client sharing the process-wide breaker.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: LlmClientConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::Transport(format!("llm client build failed: {err}")))?;
        let breaker_key = BreakerKey::new(config.provider.clone(), config.endpoint.clone());
        Ok(Self {
            config,
            http,
            breaker,
            breaker_key,
        })
    }

    /// Issues one chat call and extracts message content.
    async fn call_once(&self, prompt: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: TOP_P,
            response_format: serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": SCHEMA_NAME,
                    "strict": true,
                    "schema": analysis_response_schema(),
                }
            }),
            seed: SAMPLING_SEED,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Transport(classify_transport(&err)))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(LlmError::Transport(format!("llm provider returned {status}")));
        }
        if !status.is_success() {
            return Err(LlmError::Rejected(status.to_string()));
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Envelope(err.to_string()))?;
        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Envelope("response carried no content".to_string()))
    }
}

#[async_trait]
impl ChatTransport for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let mut last_error = LlmError::Transport("no attempts made".to_string());
        for attempt in 1..=self.config.retry_attempts {
            if !self.breaker.allow(&self.breaker_key, wall_clock_now()) {
                return Err(LlmError::BreakerOpen);
            }
            match self.call_once(prompt).await {
                Ok(content) => {
                    self.breaker.record_success(&self.breaker_key);
                    return Ok(content);
                }
                Err(LlmError::Transport(message)) => {
                    self.breaker.record_failure(&self.breaker_key, wall_clock_now());
                    last_error = LlmError::Transport(message);
                    if attempt < self.config.retry_attempts {
                        tokio::time::sleep(retry_delay(self.config.retry_delay_ms, attempt)).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error)
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Labels a transport error without leaking prompt contents.
fn classify_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "llm call timed out".to_string()
    } else if err.is_connect() {
        "llm provider unreachable".to_string()
    } else {
        "llm transport failure".to_string()
    }
}

/// Computes the jittered exponential delay for retry `attempt`.
fn retry_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(8);
    let base = base_ms.saturating_mul(1_u64 << exponent);
    let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
    Duration::from_millis(base.saturating_add(jitter))
}
