// crates/loangate-core/src/redact.rs
// ============================================================================
// Module: Loangate PII Redaction
// Description: Regex-based redaction of PII before any log emission.
// Purpose: Guarantee logs never contain raw SINs, phones, emails, or cards.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! Every string that may carry user input passes through the redactor before
//! reaching an audit sink. Matched spans are replaced with labeled tokens;
//! replacement tokens contain no digits, so redaction is idempotent. The
//! redactor is constructed explicitly at startup; there are no module-load
//! side effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Cow;

use regex::Regex;
use thiserror::Error;

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// Redaction patterns applied in order, widest first.
///
/// Card numbers redact before phones and SINs so a sixteen-digit value is
/// labeled once rather than partially consumed by a narrower pattern.
const PATTERNS: [(&str, &str); 5] = [
    (r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b", "[CARD-REDACTED]"),
    (r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b", "[EMAIL-REDACTED]"),
    (r"(?i)\b[A-Z]\d[A-Z][-\s]?\d[A-Z]\d\b", "[POSTAL-REDACTED]"),
    (r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b", "[PHONE-REDACTED]"),
    (r"\b\d{3}[-\s]?\d{3}[-\s]?\d{3}\b", "[SIN-REDACTED]"),
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Redactor construction errors.
#[derive(Debug, Error)]
pub enum RedactError {
    /// A redaction pattern failed to compile.
    #[error("redaction pattern failed to compile: {0}")]
    Pattern(String),
}

// ============================================================================
// SECTION: Redactor
// ============================================================================

/// Compiled PII redactor.
///
/// # Invariants
/// - Applying the redactor twice yields the same output as applying it once.
/// - Output never contains a span matching any configured pattern.
#[derive(Debug, Clone)]
pub struct Redactor {
    /// Compiled patterns paired with their replacement tokens.
    rules: Vec<(Regex, &'static str)>,
}

impl Redactor {
    /// Compiles the redaction patterns.
    ///
    /// # Errors
    ///
    /// Returns [`RedactError`] when a pattern fails to compile.
    pub fn new() -> Result<Self, RedactError> {
        let mut rules = Vec::with_capacity(PATTERNS.len());
        for (pattern, token) in PATTERNS {
            let compiled =
                Regex::new(pattern).map_err(|err| RedactError::Pattern(err.to_string()))?;
            rules.push((compiled, token));
        }
        Ok(Self {
            rules,
        })
    }

    /// Redacts all PII spans in the input.
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        for (pattern, token) in &self.rules {
            if let Cow::Owned(replaced) = pattern.replace_all(&output, *token) {
                output = replaced;
            }
        }
        output
    }
}
