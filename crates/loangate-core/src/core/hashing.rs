// crates/loangate-core/src/core/hashing.rs
// ============================================================================
// Module: Loangate Identifier Hashing
// Description: Salted SHA-256 hashing for sensitive identifiers.
// Purpose: Keep raw SINs, emails, phones, and VINs out of stored lookups.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Deny lists and reuse-count lookups operate on salted SHA-256 digests of
//! normalized identifiers. Raw identifier values never reach a store query or
//! a deny-list table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Hashes a normalized identifier with the pack salt, lowercase hex output.
#[must_use]
pub fn salted_identifier_hash(salt: &str, normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(normalized.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Encodes bytes as lowercase hex.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(hex_digit(byte >> 4));
        out.push(hex_digit(byte & 0x0f));
    }
    out
}

/// Renders a nibble as a lowercase hex digit.
const fn hex_digit(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => (b'a' + (nibble - 10)) as char,
    }
}
