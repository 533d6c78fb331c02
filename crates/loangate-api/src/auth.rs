// crates/loangate-api/src/auth.rs
// ============================================================================
// Module: Ingress Authentication
// Description: HMAC-signed request verification with replay defense hooks.
// Purpose: Enforce the signed-submission contract, fail-closed and in order.
// Dependencies: hmac, sha2, subtle, loangate-core
// ============================================================================

//! ## Overview
//! Every submission carries four headers: the API key, a Unix-seconds
//! timestamp, a client-unique nonce, and a hex HMAC-SHA256 signature over
//! `method ∥ path ∥ body ∥ timestamp ∥ nonce`. Checks run in a fixed order
//! and stop at the first failure: header presence, timestamp skew, nonce
//! freshness, then signature. Signature comparison is constant-time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use hmac::Hmac;
use hmac::Mac;
use loangate_core::ApiKey;
use loangate_core::Timestamp;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// HMAC-SHA256 alias.
type HmacSha256 = Hmac<Sha256>;

/// API key header name.
pub const HEADER_API_KEY: &str = "x-api-key";
/// Timestamp header name.
pub const HEADER_TIMESTAMP: &str = "x-timestamp";
/// Nonce header name.
pub const HEADER_NONCE: &str = "x-nonce";
/// Signature header name.
pub const HEADER_SIGNATURE: &str = "x-signature";

/// Maximum accepted auth header value length in bytes.
const MAX_AUTH_HEADER_BYTES: usize = 1024;
/// Maximum accepted nonce length in bytes.
const MAX_NONCE_BYTES: usize = 255;
/// Expected signature length: hex-encoded SHA-256 output.
const SIGNATURE_HEX_LEN: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ingress authentication failures, surfaced as 400 codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// One or more auth headers are absent or unusable.
    #[error("required auth headers missing")]
    Missing,
    /// The timestamp falls outside the accepted skew window.
    #[error("request timestamp outside accepted window")]
    Stale,
    /// The `(api_key, nonce)` pair was already used.
    #[error("nonce already used within the replay window")]
    Replay,
    /// The signature does not match the request.
    #[error("request signature invalid")]
    BadSignature,
}

impl AuthError {
    /// Returns the stable machine code surfaced to clients.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Missing => "AuthMissing",
            Self::Stale => "Stale",
            Self::Replay => "Replay",
            Self::BadSignature => "BadSignature",
        }
    }
}

// ============================================================================
// SECTION: Header Extraction
// ============================================================================

/// Parsed auth headers for one submission.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    /// Submitting API key.
    pub api_key: ApiKey,
    /// Client-asserted Unix-seconds timestamp.
    pub timestamp: i64,
    /// Client-unique nonce.
    pub nonce: String,
    /// Hex-encoded HMAC-SHA256 signature.
    pub signature: String,
}

/// Extracts and bounds-checks the four auth headers.
///
/// # Errors
///
/// Returns [`AuthError::Missing`] when any header is absent, non-ASCII, or
/// over its size limit.
pub fn extract_headers(headers: &HeaderMap) -> Result<AuthHeaders, AuthError> {
    let api_key = header_value(headers, HEADER_API_KEY)?;
    let timestamp_raw = header_value(headers, HEADER_TIMESTAMP)?;
    let nonce = header_value(headers, HEADER_NONCE)?;
    let signature = header_value(headers, HEADER_SIGNATURE)?;

    if nonce.len() > MAX_NONCE_BYTES {
        return Err(AuthError::Missing);
    }
    let timestamp = timestamp_raw.parse::<i64>().map_err(|_| AuthError::Missing)?;

    Ok(AuthHeaders {
        api_key: ApiKey::new(api_key),
        timestamp,
        nonce,
        signature,
    })
}

/// Reads one bounded header value.
fn header_value(headers: &HeaderMap, name: &str) -> Result<String, AuthError> {
    let value = headers.get(name).ok_or(AuthError::Missing)?;
    let value = value.to_str().map_err(|_| AuthError::Missing)?;
    if value.is_empty() || value.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Missing);
    }
    Ok(value.to_string())
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// HMAC signature verifier.
///
/// # Invariants
/// - Signature comparison is constant-time over decoded digest bytes.
/// - The skew window applies symmetrically to fast and slow client clocks.
pub struct AuthVerifier {
    /// Shared HMAC secret.
    secret: Vec<u8>,
    /// Accepted clock skew in seconds.
    skew_seconds: i64,
}

impl AuthVerifier {
    /// Builds a verifier for the shared secret and skew window.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, skew_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            skew_seconds,
        }
    }

    /// Checks the timestamp against the skew window.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Stale`] when `|now - timestamp|` exceeds the
    /// window.
    pub fn check_timestamp(&self, auth: &AuthHeaders, now: Timestamp) -> Result<(), AuthError> {
        let asserted = Timestamp::from_unix_seconds(auth.timestamp);
        if now.abs_seconds_between(asserted) > self.skew_seconds {
            return Err(AuthError::Stale);
        }
        Ok(())
    }

    /// Verifies the signature over `method ∥ path ∥ body ∥ timestamp ∥ nonce`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::BadSignature`] on any mismatch or malformed hex.
    pub fn check_signature(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        auth: &AuthHeaders,
    ) -> Result<(), AuthError> {
        if auth.signature.len() != SIGNATURE_HEX_LEN {
            return Err(AuthError::BadSignature);
        }
        let presented = decode_hex(&auth.signature).ok_or(AuthError::BadSignature)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| AuthError::BadSignature)?;
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body);
        mac.update(auth.timestamp.to_string().as_bytes());
        mac.update(auth.nonce.as_bytes());
        let expected = mac.finalize().into_bytes();

        if bool::from(expected.as_slice().ct_eq(presented.as_slice())) {
            Ok(())
        } else {
            Err(AuthError::BadSignature)
        }
    }

    /// Computes the hex signature for a request. Used by tests and canaries.
    #[must_use]
    pub fn sign(&self, method: &str, path: &str, body: &[u8], timestamp: i64, nonce: &str) -> String {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body);
        mac.update(timestamp.to_string().as_bytes());
        mac.update(nonce.as_bytes());
        encode_hex(&mac.finalize().into_bytes())
    }
}

// ============================================================================
// SECTION: Hex Helpers
// ============================================================================

/// Decodes a lowercase or uppercase hex string.
fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(value.len() / 2);
    let bytes = value.as_bytes();
    for pair in bytes.chunks_exact(2) {
        let high = hex_nibble(pair[0])?;
        let low = hex_nibble(pair[1])?;
        out.push((high << 4) | low);
    }
    Some(out)
}

/// Decodes one hex digit.
const fn hex_nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Encodes bytes as lowercase hex.
fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let high = byte >> 4;
        let low = byte & 0x0f;
        for nibble in [high, low] {
            let ch = if nibble < 10 { b'0' + nibble } else { b'a' + (nibble - 10) };
            out.push(ch as char);
        }
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
