// crates/loangate-core/src/core/time.rs
// ============================================================================
// Module: Loangate Time Model
// Description: Canonical timestamp representation for requests and records.
// Purpose: Provide deterministic, host-supplied time values across records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Loangate embeds explicit time values in requests, stage records, and queue
//! entries so replays and retries stay deterministic. The core crate never
//! reads wall-clock time; the ingress and dispatcher layers supply timestamps
//! through these values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in Loangate records, in Unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads the
///   wall clock.
/// - Monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from Unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from Unix epoch seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds.saturating_mul(1_000))
    }

    /// Returns the timestamp as Unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp as whole Unix epoch seconds, truncating.
    #[must_use]
    pub const fn as_unix_seconds(self) -> i64 {
        self.0.div_euclid(1_000)
    }

    /// Returns this timestamp advanced by the given number of milliseconds.
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns this timestamp advanced by the given number of seconds.
    #[must_use]
    pub const fn plus_seconds(self, seconds: i64) -> Self {
        self.plus_millis(seconds.saturating_mul(1_000))
    }

    /// Returns the signed difference `self - other` in milliseconds.
    #[must_use]
    pub const fn millis_since(self, other: Self) -> i64 {
        self.0.saturating_sub(other.0)
    }

    /// Returns the absolute difference between two timestamps in seconds.
    #[must_use]
    pub const fn abs_seconds_between(self, other: Self) -> i64 {
        self.millis_since(other).abs().div_euclid(1_000)
    }
}
