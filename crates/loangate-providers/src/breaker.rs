// crates/loangate-providers/src/breaker.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Per-endpoint failure counting with fail-fast open state.
// Purpose: Shed load from a failing provider without outbound calls.
// Dependencies: loangate-core
// ============================================================================

//! ## Overview
//! Breaker state is process-wide, keyed by `(provider, endpoint)`, and
//! guarded by a mutex. Five failures inside the counting window open the
//! breaker; while open, callers fail fast without an outbound call. The
//! breaker resets after the cooldown elapses, and any successful call zeroes
//! the failure counter. Callers supply timestamps so behavior is
//! deterministic under test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use loangate_core::Timestamp;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Circuit breaker tuning.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Failures within the window that open the breaker.
    pub failure_threshold: u32,
    /// Failure counting window in milliseconds.
    pub window_ms: i64,
    /// Cooldown after which an open breaker resets, in milliseconds.
    pub reset_ms: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_ms: 300_000,
            reset_ms: 300_000,
        }
    }
}

// ============================================================================
// SECTION: Keys and State
// ============================================================================

/// Breaker key: one independent breaker per provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BreakerKey {
    /// Provider label.
    pub provider: String,
    /// Endpoint URL.
    pub endpoint: String,
}

impl BreakerKey {
    /// Builds a breaker key.
    #[must_use]
    pub fn new(provider: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Mutable per-key breaker state.
#[derive(Debug, Clone, Copy, Default)]
struct BreakerState {
    /// Failures observed in the current window.
    failures: u32,
    /// Start of the current failure window.
    window_started_at: Option<Timestamp>,
    /// Time the breaker opened, when open.
    opened_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Breaker
// ============================================================================

/// Process-wide circuit breaker.
///
/// # Invariants
/// - State updates are serialized through the interior mutex.
/// - A successful call always returns the key to the closed state.
pub struct CircuitBreaker {
    /// Tuning parameters.
    config: BreakerConfig,
    /// Guarded per-key state.
    state: Mutex<BTreeMap<BreakerKey, BreakerState>>,
}

impl CircuitBreaker {
    /// Builds a breaker with the given tuning.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns true when a call to the key may proceed.
    ///
    /// An open breaker whose cooldown has elapsed resets and allows the call.
    #[must_use]
    pub fn allow(&self, key: &BreakerKey, now: Timestamp) -> bool {
        let Ok(mut guard) = self.state.lock() else {
            // A poisoned breaker fails open-state reads closed: deny calls.
            return false;
        };
        let entry = guard.entry(key.clone()).or_default();
        match entry.opened_at {
            None => true,
            Some(opened_at) => {
                if now.millis_since(opened_at) >= self.config.reset_ms {
                    *entry = BreakerState::default();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a failed call, opening the breaker at the threshold.
    pub fn record_failure(&self, key: &BreakerKey, now: Timestamp) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let entry = guard.entry(key.clone()).or_default();
        let window_expired = entry
            .window_started_at
            .is_none_or(|started| now.millis_since(started) > self.config.window_ms);
        if window_expired {
            entry.window_started_at = Some(now);
            entry.failures = 1;
        } else {
            entry.failures = entry.failures.saturating_add(1);
        }
        if entry.failures >= self.config.failure_threshold {
            entry.opened_at = Some(now);
        }
    }

    /// Records a successful call, zeroing the failure counter.
    pub fn record_success(&self, key: &BreakerKey) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        guard.insert(key.clone(), BreakerState::default());
    }

    /// Returns true when the breaker is currently open for the key.
    #[must_use]
    pub fn is_open(&self, key: &BreakerKey, now: Timestamp) -> bool {
        !self.allow(key, now)
    }
}
