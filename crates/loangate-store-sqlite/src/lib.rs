// crates/loangate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Loangate SQLite Store Library
// Description: Public API surface for the SQLite-backed job and nonce store.
// Purpose: Expose the durable store used by ingress and the dispatcher.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! This crate implements the Loangate `JobStore`, `NonceStore`, and
//! `ReuseLookup` interfaces on a single SQLite database in WAL mode. The
//! queue is a transactional table; reservation uses a conditional update so
//! exactly-once finalize survives concurrent workers and worker crashes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
