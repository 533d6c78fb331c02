// crates/loangate-core/src/core/scores.rs
// ============================================================================
// Module: Loangate Score Model
// Description: Score range validation and low/medium/high banding.
// Purpose: Keep every persisted score finite and within its declared range.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Scores flow through the pipeline as plain `f64` values. This module is the
//! single place that enforces the persisted-score invariant (finite, within
//! declared range) and derives the coarse bands surfaced by the poll
//! projection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Lower band cutoff: scores below this are `low`.
pub const BAND_LOW_CUTOFF: f64 = 0.3;
/// Upper band cutoff: scores at or above this are `high`.
pub const BAND_HIGH_CUTOFF: f64 = 0.7;

// ============================================================================
// SECTION: Banding
// ============================================================================

/// Coarse score bucket surfaced to polling clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    /// Score below 0.3.
    Low,
    /// Score within [0.3, 0.7).
    Medium,
    /// Score at or above 0.7.
    High,
    /// Score absent.
    Unknown,
}

impl Band {
    /// Returns a stable label for responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }
}

/// Maps an optional score to its band. Absent scores band as `unknown`.
#[must_use]
pub fn band(score: Option<f64>) -> Band {
    match score {
        None => Band::Unknown,
        Some(value) if value < BAND_LOW_CUTOFF => Band::Low,
        Some(value) if value < BAND_HIGH_CUTOFF => Band::Medium,
        Some(_) => Band::High,
    }
}

// ============================================================================
// SECTION: Range Validation
// ============================================================================

/// Score range violation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("score {value} outside [0, {max}] for {label}")]
pub struct ScoreError {
    /// Field label for the violating score.
    pub label: String,
    /// Offending value.
    pub value: f64,
    /// Declared inclusive maximum.
    pub max: f64,
}

/// Validates that a score is finite and within `[0, max]`.
///
/// # Errors
///
/// Returns [`ScoreError`] when the value is non-finite or out of range.
pub fn validate_score(label: &str, value: f64, max: f64) -> Result<f64, ScoreError> {
    if value.is_finite() && value >= 0.0 && value <= max {
        Ok(value)
    } else {
        Err(ScoreError {
            label: label.to_string(),
            value,
            max,
        })
    }
}

/// Validates that a score is finite and within the unit interval.
///
/// # Errors
///
/// Returns [`ScoreError`] when the value is non-finite or outside [0, 1].
pub fn validate_unit_score(label: &str, value: f64) -> Result<f64, ScoreError> {
    validate_score(label, value, 1.0)
}
