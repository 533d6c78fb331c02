// crates/loangate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Loangate Interfaces
// Description: Backend-agnostic interfaces for job and nonce storage.
// Purpose: Define the contract surfaces used by ingress and the dispatcher.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how Loangate integrates with its durable store without
//! embedding backend-specific details. Implementations must be transactional
//! where the contract says so and fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::application::ApplicationPayload;
use crate::core::application::ApplicationRequest;
use crate::core::application::RequestMeta;
use crate::core::decision::Decision;
use crate::core::identifiers::ApiKey;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::WorkerId;
use crate::core::stage::StageRecord;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Durable store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A terminal-state invariant was violated (double finalize).
    #[error("conflict: {0}")]
    Conflict(String),
    /// The store is unavailable or reported contention.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store rejected or corrupted a record.
    #[error("store corruption: {0}")]
    Corruption(String),
}

// ============================================================================
// SECTION: Queue Types
// ============================================================================

/// Queue entry reserved by a dispatcher worker.
///
/// # Invariants
/// - An entry exists iff its request is not yet terminal.
/// - While `reserved_until > now`, the entry belongs to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Job identifier, equal to the request identifier.
    pub request_id: RequestId,
    /// Attempts consumed so far, including the current one.
    pub attempts: u32,
    /// Earliest time the entry may be reserved.
    pub available_at: Timestamp,
    /// Reservation expiry for the current worker, when reserved.
    pub reserved_until: Option<Timestamp>,
}

/// Terminal disposition written by `finalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalDisposition {
    /// A decision was produced.
    Decided {
        /// The final decision.
        decision: Decision,
    },
    /// Retries were exhausted or a permanent failure occurred.
    Failed {
        /// Sanitized failure message surfaced by the poll endpoint.
        error_message: String,
    },
}

/// Aggregate queue counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Entries currently queued or reserved.
    pub queued: u64,
    /// Requests finalized as failed.
    pub failed: u64,
}

/// Freshness verdict for a nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceFreshness {
    /// First use within the replay window.
    Fresh,
    /// Already seen within the replay window.
    Duplicate,
}

// ============================================================================
// SECTION: Job Store
// ============================================================================

/// Durable record of application requests, stage outputs, and the queue.
pub trait JobStore: Send + Sync {
    /// Persists an accepted request and its queue entry atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction cannot be committed.
    fn create_request(
        &self,
        request_id: &RequestId,
        payload: &ApplicationPayload,
        meta: &RequestMeta,
        now: Timestamp,
    ) -> Result<(), StoreError>;

    /// Loads a request by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown identifiers.
    fn load_request(&self, request_id: &RequestId) -> Result<ApplicationRequest, StoreError>;

    /// Appends one stage record for the request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be written.
    fn append_stage(
        &self,
        request_id: &RequestId,
        record: &StageRecord,
    ) -> Result<(), StoreError>;

    /// Loads all stage records for a request in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when records cannot be read.
    fn load_stages(&self, request_id: &RequestId) -> Result<Vec<StageRecord>, StoreError>;

    /// Marks the request terminal, writes the disposition, and dequeues, all
    /// in one transaction. A second finalize for the same request fails.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the request is already terminal.
    fn finalize(
        &self,
        request_id: &RequestId,
        disposition: &FinalDisposition,
        now: Timestamp,
    ) -> Result<(), StoreError>;

    /// Loads the decision for a request when one was written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the decision cannot be read.
    fn load_decision(&self, request_id: &RequestId) -> Result<Option<Decision>, StoreError>;

    /// Loads the sanitized failure message for a failed request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be read.
    fn load_failure(&self, request_id: &RequestId) -> Result<Option<String>, StoreError>;

    /// Reserves the next available queue entry for a worker, extending its
    /// reservation to `now + visibility_timeout` and incrementing attempts.
    /// Must be race-free under concurrent workers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure; `Ok(None)` when no entry is
    /// available.
    fn reserve_next(
        &self,
        worker: &WorkerId,
        now: Timestamp,
        visibility_timeout_ms: i64,
    ) -> Result<Option<QueueEntry>, StoreError>;

    /// Releases a reserved entry for retry at `available_at`, clearing the
    /// reservation without consuming the entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the entry cannot be re-armed.
    fn release_for_retry(
        &self,
        request_id: &RequestId,
        available_at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Returns aggregate queue counters for health reporting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when counters cannot be read.
    fn queue_counts(&self) -> Result<QueueCounts, StoreError>;
}

// ============================================================================
// SECTION: Nonce Store
// ============================================================================

/// Replay-defense store for `(api_key, nonce)` pairs.
pub trait NonceStore: Send + Sync {
    /// Read-only freshness check used early in the validation order.
    ///
    /// The atomic word is spoken by [`NonceStore::seen_and_remember`] at
    /// commit time; this check only lets replays fail before signature work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn is_seen(&self, api_key: &ApiKey, nonce: &str) -> Result<bool, StoreError>;

    /// Atomically records the nonce and reports whether it was fresh.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot decide atomically.
    fn seen_and_remember(
        &self,
        api_key: &ApiKey,
        nonce: &str,
        now: Timestamp,
    ) -> Result<NonceFreshness, StoreError>;

    /// Evicts nonces recorded before the cutoff, returning the count dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when eviction fails.
    fn evict_expired(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Reuse Lookups
// ============================================================================

/// Historical lookups consumed by the feature extractor.
///
/// Identifiers are salted hashes; raw values never reach the store queries.
/// The request being scored is always excluded: its own identifier rows are
/// written at ingress, before the features stage runs, and must not count as
/// reuse.
pub trait ReuseLookup {
    /// Counts prior requests carrying the hashed identifier since `since`,
    /// excluding `requesting` itself.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn identifier_reuse_count(
        &self,
        identifier_hash: &str,
        requesting: &RequestId,
        since: Timestamp,
    ) -> Result<u64, StoreError>;

    /// Counts requests from the hashed dealer in the last 24 hours,
    /// excluding `requesting` itself.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn dealer_volume_24h(
        &self,
        dealer_hash: &str,
        requesting: &RequestId,
        now: Timestamp,
    ) -> Result<u64, StoreError>;

    /// Returns the dealer's historical fraud percentile within [0, 1], when
    /// known.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn dealer_fraud_percentile(&self, dealer_hash: &str) -> Result<Option<f64>, StoreError>;
}
