// crates/loangate-providers/src/clock.rs
// ============================================================================
// Module: Provider Clock
// Description: Wall-clock reads for the impure provider layer.
// Purpose: Keep clock access out of the pure core while sharing one helper.
// Dependencies: loangate-core
// ============================================================================

//! ## Overview
//! The core crate never reads the wall clock; the provider and API layers do.
//! This helper is the single place wall time becomes a [`Timestamp`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use loangate_core::Timestamp;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Reads the current wall-clock time as a timestamp.
#[must_use]
pub fn wall_clock_now() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
    Timestamp::from_unix_millis(millis)
}
