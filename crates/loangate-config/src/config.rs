// crates/loangate-config/src/config.rs
// ============================================================================
// Module: Loangate Configuration
// Description: Environment-driven configuration loading and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: loangate-core, serde
// ============================================================================

//! ## Overview
//! Every setting loads from an environment variable with a documented
//! default; required variables have none. Validation runs after loading and
//! fails closed: secrets must meet minimum length, thresholds must sit inside
//! their declared ranges, and the backoff ladder must be non-empty and
//! ascending. Tests inject a lookup function instead of mutating process
//! environment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use loangate_core::DecisionThresholds;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum accepted HMAC secret length in bytes.
const MIN_HMAC_SECRET_BYTES: usize = 16;
/// Maximum accepted HMAC secret length in bytes.
const MAX_HMAC_SECRET_BYTES: usize = 1024;
/// Maximum dispatcher worker count.
const MAX_WORKER_COUNT: u32 = 16;
/// Maximum pipeline attempts.
const MAX_MAX_TRIES: u32 = 10;
/// Maximum single backoff step in seconds.
const MAX_BACKOFF_STEP_SECONDS: u64 = 3_600;
/// Maximum outbound call timeout in seconds.
const MAX_CALL_TIMEOUT_SECONDS: u64 = 300;
/// Maximum provider retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Maximum LLM completion token budget.
const MAX_LLM_MAX_TOKENS: u32 = 32_768;
/// Maximum accepted LLM sampling temperature.
const MAX_LLM_TEMPERATURE: f64 = 0.2;
/// Default bind address for the API listener.
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
/// Default SQLite database path.
const DEFAULT_DATABASE_PATH: &str = "loangate.db";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// An environment variable holds an unusable value.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Server and intake configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    /// Listener bind address.
    pub bind_addr: SocketAddr,
    /// Shared HMAC secret for request signing.
    #[serde(skip)]
    pub hmac_secret: String,
    /// Replay window for nonces and timestamp skew, in seconds.
    pub nonce_window_seconds: u64,
}

/// Durable store configuration.
#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    /// SQLite database path.
    pub database_path: PathBuf,
    /// Busy timeout handed to SQLite, in milliseconds.
    pub busy_timeout_ms: u64,
}

/// Dispatcher and queue configuration.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherConfig {
    /// Worker task count.
    pub worker_count: u32,
    /// Maximum pipeline attempts per request.
    pub max_tries: u32,
    /// Retry backoff ladder in seconds, indexed by consumed attempts.
    pub backoff_seconds: Vec<u64>,
    /// Queue reservation visibility timeout in seconds.
    pub visibility_timeout_seconds: u64,
    /// Overall per-attempt pipeline deadline in seconds.
    pub pipeline_deadline_seconds: u64,
}

/// ML scoring service configuration.
#[derive(Debug, Clone, Serialize)]
pub struct MlConfig {
    /// Base URL of the scoring service.
    pub service_url: String,
    /// Per-call timeout in seconds.
    pub timeout_seconds: u64,
    /// Retries after the initial call on 5xx or timeout.
    pub retry_attempts: u32,
}

/// LLM adjudicator configuration.
#[derive(Debug, Clone, Serialize)]
pub struct LlmConfig {
    /// Provider label used for breaker keying and telemetry.
    pub provider: String,
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Model identifier sent with each call.
    pub model: String,
    /// Bearer token for the provider.
    #[serde(skip)]
    pub api_key: String,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Sampling temperature, at most 0.2.
    pub temperature: f64,
    /// Per-call timeout in seconds.
    pub timeout_seconds: u64,
    /// Transport retry attempts.
    pub retry_attempts: u32,
    /// Base retry delay in milliseconds.
    pub retry_delay_ms: u64,
    /// Lower edge of the ML-confidence trigger band.
    pub trigger_min: f64,
    /// Upper edge of the ML-confidence trigger band.
    pub trigger_max: f64,
    /// Canary probe timeout in seconds.
    pub canary_timeout_seconds: u64,
}

/// Queue health reporting thresholds.
#[derive(Debug, Clone, Serialize)]
pub struct HealthConfig {
    /// Queue depth at or above which the queue reports overloaded.
    pub max_queued: u64,
    /// Failed count at or above which the queue reports degraded.
    pub max_failed: u64,
}

/// Complete Loangate configuration.
#[derive(Debug, Clone, Serialize)]
pub struct LoangateConfig {
    /// Server and intake settings.
    pub server: ServerConfig,
    /// Durable store settings.
    pub store: StoreConfig,
    /// Dispatcher settings.
    pub dispatcher: DispatcherConfig,
    /// ML client settings.
    pub ml: MlConfig,
    /// LLM adjudicator settings.
    pub llm: LlmConfig,
    /// Routing policy thresholds.
    pub thresholds: DecisionThresholds,
    /// Queue health thresholds.
    pub health: HealthConfig,
    /// Salt for identifier hashing in deny lists and reuse lookups.
    #[serde(skip)]
    pub identifier_salt: String,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl LoangateConfig {
    /// Loads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an injected variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// value fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            server: ServerConfig {
                bind_addr: parse_var(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR)?,
                hmac_secret: required(&lookup, "HMAC_SECRET")?,
                nonce_window_seconds: parse_var(&lookup, "NONCE_WINDOW_SECONDS", "300")?,
            },
            store: StoreConfig {
                database_path: PathBuf::from(
                    lookup("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
                ),
                busy_timeout_ms: parse_var(&lookup, "DB_BUSY_TIMEOUT_MS", "5000")?,
            },
            dispatcher: DispatcherConfig {
                worker_count: parse_var(&lookup, "WORKER_COUNT", "2")?,
                max_tries: parse_var(&lookup, "MAX_TRIES", "3")?,
                backoff_seconds: parse_backoff(&lookup)?,
                visibility_timeout_seconds: parse_var(&lookup, "VISIBILITY_TIMEOUT_SECONDS", "330")?,
                pipeline_deadline_seconds: parse_var(&lookup, "PIPELINE_DEADLINE_SECONDS", "300")?,
            },
            ml: MlConfig {
                service_url: required(&lookup, "ML_SERVICE_URL")?,
                timeout_seconds: parse_var(&lookup, "ML_TIMEOUT", "30")?,
                retry_attempts: parse_var(&lookup, "ML_RETRY_ATTEMPTS", "2")?,
            },
            llm: LlmConfig {
                provider: lookup("LLM_PROVIDER").unwrap_or_else(|| "openai".to_string()),
                endpoint: required(&lookup, "LLM_ENDPOINT")?,
                model: required(&lookup, "LLM_MODEL")?,
                api_key: required(&lookup, "LLM_API_KEY")?,
                max_tokens: parse_var(&lookup, "LLM_MAX_TOKENS", "2000")?,
                temperature: parse_var(&lookup, "LLM_TEMPERATURE", "0.1")?,
                timeout_seconds: parse_var(&lookup, "LLM_TIMEOUT", "30")?,
                retry_attempts: parse_var(&lookup, "LLM_RETRY_ATTEMPTS", "3")?,
                retry_delay_ms: parse_var(&lookup, "LLM_RETRY_DELAY_MS", "200")?,
                trigger_min: parse_var(&lookup, "LLM_TRIGGER_MIN", "0.3")?,
                trigger_max: parse_var(&lookup, "LLM_TRIGGER_MAX", "0.7")?,
                canary_timeout_seconds: parse_var(&lookup, "CANARY_TIMEOUT_SECONDS", "5")?,
            },
            thresholds: DecisionThresholds {
                min_confidence_for_auto: parse_var(&lookup, "MIN_CONFIDENCE_FOR_AUTO", "0.75")?,
                fraud_decline_threshold: parse_var(&lookup, "FRAUD_DECLINE_THRESHOLD", "0.8")?,
                fraud_review_threshold: parse_var(&lookup, "FRAUD_REVIEW_THRESHOLD", "0.35")?,
                pti_cap: parse_var(&lookup, "PTI_CAP", "0.15")?,
                tds_cap: parse_var(&lookup, "TDS_CAP", "0.45")?,
                ltv_cap: parse_var(&lookup, "LTV_CAP", "1.20")?,
            },
            health: HealthConfig {
                max_queued: parse_var(&lookup, "QUEUE_HEALTHY_MAX_QUEUED", "100")?,
                max_failed: parse_var(&lookup, "QUEUE_HEALTHY_MAX_FAILED", "10")?,
            },
            identifier_salt: lookup("IDENTIFIER_SALT")
                .unwrap_or_else(|| loangate_core::rules::DEFAULT_IDENTIFIER_SALT.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates every setting against its hard limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret_len = self.server.hmac_secret.len();
        if secret_len < MIN_HMAC_SECRET_BYTES || secret_len > MAX_HMAC_SECRET_BYTES {
            return Err(invalid("HMAC_SECRET", "must be between 16 and 1024 bytes"));
        }
        if self.server.nonce_window_seconds == 0 {
            return Err(invalid("NONCE_WINDOW_SECONDS", "must be positive"));
        }
        if self.dispatcher.worker_count == 0 || self.dispatcher.worker_count > MAX_WORKER_COUNT {
            return Err(invalid("WORKER_COUNT", "must be within 1..=16"));
        }
        if self.dispatcher.max_tries == 0 || self.dispatcher.max_tries > MAX_MAX_TRIES {
            return Err(invalid("MAX_TRIES", "must be within 1..=10"));
        }
        if self.dispatcher.backoff_seconds.is_empty() {
            return Err(invalid("BACKOFF_SECONDS", "must list at least one step"));
        }
        if self
            .dispatcher
            .backoff_seconds
            .iter()
            .any(|step| *step == 0 || *step > MAX_BACKOFF_STEP_SECONDS)
        {
            return Err(invalid("BACKOFF_SECONDS", "steps must be within 1..=3600"));
        }
        if self.dispatcher.backoff_seconds.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(invalid("BACKOFF_SECONDS", "steps must be ascending"));
        }
        if self.dispatcher.pipeline_deadline_seconds == 0 {
            return Err(invalid("PIPELINE_DEADLINE_SECONDS", "must be positive"));
        }
        if self.dispatcher.visibility_timeout_seconds < self.dispatcher.pipeline_deadline_seconds {
            return Err(invalid(
                "VISIBILITY_TIMEOUT_SECONDS",
                "must cover the pipeline deadline",
            ));
        }
        check_timeout("ML_TIMEOUT", self.ml.timeout_seconds)?;
        check_timeout("LLM_TIMEOUT", self.llm.timeout_seconds)?;
        check_timeout("CANARY_TIMEOUT_SECONDS", self.llm.canary_timeout_seconds)?;
        if self.ml.service_url.trim().is_empty() {
            return Err(invalid("ML_SERVICE_URL", "must not be empty"));
        }
        if self.ml.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(invalid("ML_RETRY_ATTEMPTS", "must be at most 10"));
        }
        if self.llm.endpoint.trim().is_empty() {
            return Err(invalid("LLM_ENDPOINT", "must not be empty"));
        }
        if self.llm.retry_attempts == 0 || self.llm.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(invalid("LLM_RETRY_ATTEMPTS", "must be within 1..=10"));
        }
        if self.llm.max_tokens == 0 || self.llm.max_tokens > MAX_LLM_MAX_TOKENS {
            return Err(invalid("LLM_MAX_TOKENS", "must be within 1..=32768"));
        }
        if !self.llm.temperature.is_finite()
            || self.llm.temperature < 0.0
            || self.llm.temperature > MAX_LLM_TEMPERATURE
        {
            return Err(invalid("LLM_TEMPERATURE", "must be within 0..=0.2"));
        }
        check_unit("LLM_TRIGGER_MIN", self.llm.trigger_min)?;
        check_unit("LLM_TRIGGER_MAX", self.llm.trigger_max)?;
        if self.llm.trigger_min > self.llm.trigger_max {
            return Err(invalid("LLM_TRIGGER_MIN", "must not exceed LLM_TRIGGER_MAX"));
        }
        check_unit("MIN_CONFIDENCE_FOR_AUTO", self.thresholds.min_confidence_for_auto)?;
        check_unit("FRAUD_DECLINE_THRESHOLD", self.thresholds.fraud_decline_threshold)?;
        check_unit("FRAUD_REVIEW_THRESHOLD", self.thresholds.fraud_review_threshold)?;
        check_unit("PTI_CAP", self.thresholds.pti_cap)?;
        check_unit("TDS_CAP", self.thresholds.tds_cap)?;
        if !self.thresholds.ltv_cap.is_finite()
            || self.thresholds.ltv_cap <= 0.0
            || self.thresholds.ltv_cap > 3.0
        {
            return Err(invalid("LTV_CAP", "must be within (0, 3]"));
        }
        if self.identifier_salt.trim().is_empty() {
            return Err(invalid("IDENTIFIER_SALT", "must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an invalid-value error.
fn invalid(var: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}

/// Reads a required variable.
fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var).filter(|value| !value.is_empty()).ok_or(ConfigError::Missing(var))
}

/// Reads and parses a variable with a default.
fn parse_var<F, T>(lookup: &F, var: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(var).unwrap_or_else(|| default.to_string());
    raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
        var,
        reason: err.to_string(),
    })
}

/// Parses the comma-separated backoff ladder.
fn parse_backoff<F>(lookup: &F) -> Result<Vec<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup("BACKOFF_SECONDS").unwrap_or_else(|| "30,60,120".to_string());
    raw.split(',')
        .map(|step| {
            step.trim().parse::<u64>().map_err(|err| ConfigError::Invalid {
                var: "BACKOFF_SECONDS",
                reason: err.to_string(),
            })
        })
        .collect()
}

/// Validates an outbound call timeout.
fn check_timeout(var: &'static str, seconds: u64) -> Result<(), ConfigError> {
    if seconds == 0 || seconds > MAX_CALL_TIMEOUT_SECONDS {
        return Err(invalid(var, "must be within 1..=300 seconds"));
    }
    Ok(())
}

/// Validates a unit-interval setting.
fn check_unit(var: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 || value > 1.0 {
        return Err(invalid(var, "must be within 0..=1"));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    //! Configuration loading and validation tests.

    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use std::collections::BTreeMap;

    use super::ConfigError;
    use super::LoangateConfig;

    fn base_env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("HMAC_SECRET".to_string(), "0123456789abcdef0123".to_string());
        env.insert("ML_SERVICE_URL".to_string(), "http://ml.internal:9000".to_string());
        env.insert("LLM_ENDPOINT".to_string(), "http://llm.internal/v1/chat/completions".to_string());
        env.insert("LLM_MODEL".to_string(), "adjudicator-model-1".to_string());
        env.insert("LLM_API_KEY".to_string(), "test-key".to_string());
        env
    }

    fn load(env: &BTreeMap<String, String>) -> Result<LoangateConfig, ConfigError> {
        LoangateConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_variables_are_absent() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.dispatcher.max_tries, 3);
        assert_eq!(config.dispatcher.backoff_seconds, vec![30, 60, 120]);
        assert_eq!(config.server.nonce_window_seconds, 300);
        assert!((config.llm.trigger_min - 0.3).abs() < f64::EPSILON);
        assert!((config.llm.trigger_max - 0.7).abs() < f64::EPSILON);
        assert!((config.thresholds.pti_cap - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.health.max_queued, 100);
        assert_eq!(config.health.max_failed, 10);
        assert_eq!(config.llm.canary_timeout_seconds, 5);
    }

    #[test]
    fn missing_secret_is_rejected() {
        let mut env = base_env();
        env.remove("HMAC_SECRET");
        assert!(matches!(load(&env), Err(ConfigError::Missing("HMAC_SECRET"))));
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut env = base_env();
        env.insert("HMAC_SECRET".to_string(), "short".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn descending_backoff_is_rejected() {
        let mut env = base_env();
        env.insert("BACKOFF_SECONDS".to_string(), "120,60,30".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn custom_backoff_parses() {
        let mut env = base_env();
        env.insert("BACKOFF_SECONDS".to_string(), "10, 20, 40".to_string());
        let config = load(&env).unwrap();
        assert_eq!(config.dispatcher.backoff_seconds, vec![10, 20, 40]);
    }

    #[test]
    fn hot_temperature_is_rejected() {
        let mut env = base_env();
        env.insert("LLM_TEMPERATURE".to_string(), "0.9".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn inverted_trigger_band_is_rejected() {
        let mut env = base_env();
        env.insert("LLM_TRIGGER_MIN".to_string(), "0.8".to_string());
        env.insert("LLM_TRIGGER_MAX".to_string(), "0.4".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn oversized_worker_pool_is_rejected() {
        let mut env = base_env();
        env.insert("WORKER_COUNT".to_string(), "64".to_string());
        assert!(load(&env).is_err());
    }
}
