// crates/loangate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Job and Nonce Store
// Description: Durable JobStore, NonceStore, and ReuseLookup on SQLite WAL.
// Purpose: Persist requests, the queue, stage records, decisions, and nonces.
// Dependencies: loangate-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One SQLite database holds every durable table: `requests`, `queue`,
//! `stage_records`, `decisions`, `failures`, `replay_nonces`, and
//! `request_identifiers`. The queue is reserved through a conditional update
//! so a row is owned by at most one worker while its reservation holds, and
//! `finalize` writes the terminal disposition and dequeues in one
//! transaction. Identifier columns store salted hashes only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use loangate_core::ApplicationPayload;
use loangate_core::ApplicationRequest;
use loangate_core::Decision;
use loangate_core::FinalDisposition;
use loangate_core::QueueCounts;
use loangate_core::QueueEntry;
use loangate_core::RequestId;
use loangate_core::RequestMeta;
use loangate_core::RequestStatus;
use loangate_core::StageRecord;
use loangate_core::Timestamp;
use loangate_core::WorkerId;
use loangate_core::core::application::digits_of;
use loangate_core::core::hashing::salted_identifier_hash;
use loangate_core::core::identifiers::ApiKey;
use loangate_core::interfaces::JobStore;
use loangate_core::interfaces::NonceFreshness;
use loangate_core::interfaces::NonceStore;
use loangate_core::interfaces::ReuseLookup;
use loangate_core::interfaces::StoreError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Dealer volume lookback in milliseconds (24 hours).
const DEALER_VOLUME_WINDOW_MS: i64 = 24 * 60 * 60 * 1_000;
/// Outcome label stored for declined requests.
const OUTCOME_DECLINE: &str = "decline";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` store configuration.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Salt applied to identifier hashing on request creation.
    pub identifier_salt: String,
}

impl SqliteStoreConfig {
    /// Builds a config with defaults for the given path and salt.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, identifier_salt: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            identifier_salt: identifier_salt.into(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Database-level failure.
    #[error("sqlite error: {0}")]
    Db(String),
    /// Record serialization or deserialization failure.
    #[error("record corruption: {0}")]
    Corruption(String),
    /// Configuration or schema mismatch.
    #[error("invalid store state: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Db(message) => Self::Unavailable(message),
            SqliteStoreError::Corruption(message) | SqliteStoreError::Invalid(message) => {
                Self::Corruption(message)
            }
        }
    }
}

/// Maps a rusqlite error into a store error.
fn db_err(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable SQLite-backed store for requests, the queue, and nonces.
///
/// # Invariants
/// - The connection is opened with `FULL_MUTEX` and guarded by a process
///   mutex; every transaction observes a consistent snapshot.
/// - `finalize` is the only path that removes a queue row for a live request.
pub struct SqliteStore {
    /// Guarded database connection.
    connection: Mutex<Connection>,
    /// Salt applied to identifier hashing.
    identifier_salt: String,
}

impl SqliteStore {
    /// Opens the database, applies pragmas, and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or the
    /// schema version does not match.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            identifier_salt: config.identifier_salt,
        })
    }

    /// Acquires the connection guard.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Job Store Implementation
// ============================================================================

impl JobStore for SqliteStore {
    fn create_request(
        &self,
        request_id: &RequestId,
        payload: &ApplicationPayload,
        meta: &RequestMeta,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|err| StoreError::Corruption(err.to_string()))?;
        let dealer_hash =
            salted_identifier_hash(&self.identifier_salt, &payload.dealer.dealer_id);
        let identifier_rows = [
            ("phone", salted_identifier_hash(&self.identifier_salt, &digits_of(&payload.contact.phone))),
            ("email", salted_identifier_hash(&self.identifier_salt, &payload.contact.email.to_ascii_lowercase())),
            ("vin", salted_identifier_hash(&self.identifier_salt, &payload.vehicle.vin.to_ascii_uppercase())),
            ("dealer", dealer_hash.clone()),
        ];

        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        tx.execute(
            "INSERT INTO requests (request_id, payload_json, api_key, client_ip, user_agent,
                 geo_province, dealer_hash, received_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                request_id.as_str(),
                payload_json,
                meta.api_key.as_str(),
                meta.client_ip,
                meta.user_agent,
                meta.geo_province,
                dealer_hash,
                now.as_unix_millis(),
                RequestStatus::Queued.as_str(),
            ],
        )
        .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        tx.execute(
            "INSERT INTO queue (request_id, attempts, available_at, reserved_until, reserved_by)
             VALUES (?1, 0, ?2, NULL, NULL)",
            params![request_id.as_str(), now.as_unix_millis()],
        )
        .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        for (kind, hash) in identifier_rows {
            tx.execute(
                "INSERT INTO request_identifiers (request_id, kind, hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![request_id.as_str(), kind, hash, now.as_unix_millis()],
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        }
        tx.commit().map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    fn load_request(&self, request_id: &RequestId) -> Result<ApplicationRequest, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT payload_json, api_key, client_ip, user_agent, geo_province,
                        received_at, status
                 FROM requests WHERE request_id = ?1",
                params![request_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?
            .ok_or_else(|| StoreError::NotFound(request_id.as_str().to_string()))?;

        let (payload_json, api_key, client_ip, user_agent, geo_province, received_at, status) =
            row;
        let payload: ApplicationPayload = serde_json::from_str(&payload_json)
            .map_err(|err| StoreError::Corruption(err.to_string()))?;
        let status = RequestStatus::parse(&status)
            .ok_or_else(|| StoreError::Corruption(format!("unknown status {status}")))?;
        Ok(ApplicationRequest {
            request_id: request_id.clone(),
            payload,
            meta: RequestMeta {
                api_key: ApiKey::new(api_key),
                client_ip,
                user_agent,
                geo_province,
            },
            received_at: Timestamp::from_unix_millis(received_at),
            status,
        })
    }

    fn append_stage(
        &self,
        request_id: &RequestId,
        record: &StageRecord,
    ) -> Result<(), StoreError> {
        let record_json = serde_json::to_string(record)
            .map_err(|err| StoreError::Corruption(err.to_string()))?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO stage_records (request_id, stage, record_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    request_id.as_str(),
                    record.stage.as_str(),
                    record_json,
                    record.ended_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(())
    }

    fn load_stages(&self, request_id: &RequestId) -> Result<Vec<StageRecord>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT record_json FROM stage_records WHERE request_id = ?1 ORDER BY id ASC",
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let rows = statement
            .query_map(params![request_id.as_str()], |row| row.get::<_, String>(0))
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            let record_json = row.map_err(|err| StoreError::Unavailable(err.to_string()))?;
            let record: StageRecord = serde_json::from_str(&record_json)
                .map_err(|err| StoreError::Corruption(err.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    fn finalize(
        &self,
        request_id: &RequestId,
        disposition: &FinalDisposition,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM requests WHERE request_id = ?1",
                params![request_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let status = status.ok_or_else(|| StoreError::NotFound(request_id.as_str().to_string()))?;
        let parsed = RequestStatus::parse(&status)
            .ok_or_else(|| StoreError::Corruption(format!("unknown status {status}")))?;
        if parsed.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "request {request_id} already finalized"
            )));
        }

        match disposition {
            FinalDisposition::Decided {
                decision,
            } => {
                let decision_json = serde_json::to_string(decision)
                    .map_err(|err| StoreError::Corruption(err.to_string()))?;
                tx.execute(
                    "INSERT INTO decisions (request_id, outcome, decision_json, decided_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        request_id.as_str(),
                        decision.final_decision.as_str(),
                        decision_json,
                        now.as_unix_millis(),
                    ],
                )
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
                tx.execute(
                    "UPDATE requests SET status = ?2 WHERE request_id = ?1",
                    params![request_id.as_str(), RequestStatus::Decided.as_str()],
                )
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
            }
            FinalDisposition::Failed {
                error_message,
            } => {
                tx.execute(
                    "INSERT INTO failures (request_id, error_message, failed_at)
                     VALUES (?1, ?2, ?3)",
                    params![request_id.as_str(), error_message, now.as_unix_millis()],
                )
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
                tx.execute(
                    "UPDATE requests SET status = ?2 WHERE request_id = ?1",
                    params![request_id.as_str(), RequestStatus::Failed.as_str()],
                )
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
            }
        }

        tx.execute("DELETE FROM queue WHERE request_id = ?1", params![request_id.as_str()])
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    fn load_decision(&self, request_id: &RequestId) -> Result<Option<Decision>, StoreError> {
        let guard = self.lock()?;
        let decision_json: Option<String> = guard
            .query_row(
                "SELECT decision_json FROM decisions WHERE request_id = ?1",
                params![request_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        decision_json
            .map(|json| {
                serde_json::from_str(&json).map_err(|err| StoreError::Corruption(err.to_string()))
            })
            .transpose()
    }

    fn load_failure(&self, request_id: &RequestId) -> Result<Option<String>, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT error_message FROM failures WHERE request_id = ?1",
                params![request_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    fn reserve_next(
        &self,
        worker: &WorkerId,
        now: Timestamp,
        visibility_timeout_ms: i64,
    ) -> Result<Option<QueueEntry>, StoreError> {
        let reserved_until = now.plus_millis(visibility_timeout_ms);
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let reserved = tx
            .query_row(
                "UPDATE queue
                 SET reserved_until = ?1, reserved_by = ?2, attempts = attempts + 1
                 WHERE request_id = (
                     SELECT request_id FROM queue
                     WHERE available_at <= ?3
                       AND (reserved_until IS NULL OR reserved_until <= ?3)
                     ORDER BY available_at ASC
                     LIMIT 1
                 )
                   AND available_at <= ?3
                   AND (reserved_until IS NULL OR reserved_until <= ?3)
                 RETURNING request_id, attempts, available_at",
                params![
                    reserved_until.as_unix_millis(),
                    worker.as_str(),
                    now.as_unix_millis(),
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let Some((raw_id, attempts, available_at)) = reserved else {
            tx.commit().map_err(|err| StoreError::Unavailable(err.to_string()))?;
            return Ok(None);
        };
        tx.execute(
            "UPDATE requests SET status = ?2 WHERE request_id = ?1",
            params![raw_id, RequestStatus::Processing.as_str()],
        )
        .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let request_id = RequestId::parse(&raw_id)
            .ok_or_else(|| StoreError::Corruption(format!("malformed request id {raw_id}")))?;
        let attempts = u32::try_from(attempts)
            .map_err(|_| StoreError::Corruption("attempt counter overflow".to_string()))?;
        Ok(Some(QueueEntry {
            request_id,
            attempts,
            available_at: Timestamp::from_unix_millis(available_at),
            reserved_until: Some(reserved_until),
        }))
    }

    fn release_for_retry(
        &self,
        request_id: &RequestId,
        available_at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let changed = tx
            .execute(
                "UPDATE queue
                 SET reserved_until = NULL, reserved_by = NULL, available_at = ?2
                 WHERE request_id = ?1",
                params![request_id.as_str(), available_at.as_unix_millis()],
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(request_id.as_str().to_string()));
        }
        tx.execute(
            "UPDATE requests SET status = ?2 WHERE request_id = ?1",
            params![request_id.as_str(), RequestStatus::Queued.as_str()],
        )
        .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    fn queue_counts(&self) -> Result<QueueCounts, StoreError> {
        let guard = self.lock()?;
        let queued: i64 = guard
            .query_row("SELECT COUNT(*) FROM queue", params![], |row| row.get(0))
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let failed: i64 = guard
            .query_row("SELECT COUNT(*) FROM failures", params![], |row| row.get(0))
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(QueueCounts {
            queued: u64::try_from(queued).unwrap_or(0),
            failed: u64::try_from(failed).unwrap_or(0),
        })
    }
}

// ============================================================================
// SECTION: Nonce Store Implementation
// ============================================================================

impl NonceStore for SqliteStore {
    fn is_seen(&self, api_key: &ApiKey, nonce: &str) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let found: Option<i64> = guard
            .query_row(
                "SELECT 1 FROM replay_nonces WHERE api_key = ?1 AND nonce = ?2",
                params![api_key.as_str(), nonce],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(found.is_some())
    }

    fn seen_and_remember(
        &self,
        api_key: &ApiKey,
        nonce: &str,
        now: Timestamp,
    ) -> Result<NonceFreshness, StoreError> {
        let guard = self.lock()?;
        let inserted = guard
            .execute(
                "INSERT OR IGNORE INTO replay_nonces (api_key, nonce, created_at)
                 VALUES (?1, ?2, ?3)",
                params![api_key.as_str(), nonce, now.as_unix_millis()],
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        if inserted == 1 {
            Ok(NonceFreshness::Fresh)
        } else {
            Ok(NonceFreshness::Duplicate)
        }
    }

    fn evict_expired(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let dropped = guard
            .execute(
                "DELETE FROM replay_nonces WHERE created_at < ?1",
                params![cutoff.as_unix_millis()],
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(u64::try_from(dropped).unwrap_or(0))
    }
}

// ============================================================================
// SECTION: Reuse Lookup Implementation
// ============================================================================

impl ReuseLookup for SqliteStore {
    fn identifier_reuse_count(
        &self,
        identifier_hash: &str,
        requesting: &RequestId,
        since: Timestamp,
    ) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        // The requesting row was written at ingress; only prior requests count.
        let count: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM request_identifiers
                 WHERE hash = ?1 AND created_at >= ?2 AND request_id != ?3",
                params![identifier_hash, since.as_unix_millis(), requesting.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn dealer_volume_24h(
        &self,
        dealer_hash: &str,
        requesting: &RequestId,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        let since = now.plus_millis(-DEALER_VOLUME_WINDOW_MS);
        let guard = self.lock()?;
        let count: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM request_identifiers
                 WHERE kind = 'dealer' AND hash = ?1 AND created_at >= ?2
                   AND request_id != ?3",
                params![dealer_hash, since.as_unix_millis(), requesting.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn dealer_fraud_percentile(&self, dealer_hash: &str) -> Result<Option<f64>, StoreError> {
        let guard = self.lock()?;
        let own_rate: Option<f64> = guard
            .query_row(
                "SELECT CAST(SUM(CASE WHEN d.outcome = ?2 THEN 1 ELSE 0 END) AS REAL)
                        / COUNT(*)
                 FROM requests r JOIN decisions d ON d.request_id = r.request_id
                 WHERE r.dealer_hash = ?1",
                params![dealer_hash, OUTCOME_DECLINE],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?
            .flatten();
        let Some(own_rate) = own_rate else {
            return Ok(None);
        };

        let (below, total): (i64, i64) = guard
            .query_row(
                "WITH dealer_rates AS (
                     SELECT r.dealer_hash AS dealer_hash,
                            CAST(SUM(CASE WHEN d.outcome = ?2 THEN 1 ELSE 0 END) AS REAL)
                                / COUNT(*) AS rate
                     FROM requests r JOIN decisions d ON d.request_id = r.request_id
                     GROUP BY r.dealer_hash
                 )
                 SELECT SUM(CASE WHEN rate < ?1 THEN 1 ELSE 0 END), COUNT(*)
                 FROM dealer_rates",
                params![own_rate, OUTCOME_DECLINE],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        if total <= 1 {
            return Ok(None);
        }
        #[allow(clippy::cast_precision_loss, reason = "Dealer counts are far below 2^52.")]
        let percentile = below as f64 / total as f64;
        Ok(Some(percentile))
    }
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    validate_store_path(&config.path)?;
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_err(&err))?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_err(&err))?;
    connection.execute_batch("PRAGMA journal_mode = WAL;").map_err(|err| db_err(&err))?;
    connection.execute_batch("PRAGMA synchronous = NORMAL;").map_err(|err| db_err(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_err(&err))?;
    Ok(connection)
}

/// Rejects directory paths before opening.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_err(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_err(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_err(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS requests (
                    request_id TEXT NOT NULL PRIMARY KEY,
                    payload_json TEXT NOT NULL,
                    api_key TEXT NOT NULL,
                    client_ip TEXT NOT NULL,
                    user_agent TEXT,
                    geo_province TEXT,
                    dealer_hash TEXT NOT NULL,
                    received_at INTEGER NOT NULL,
                    status TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS queue (
                    request_id TEXT NOT NULL PRIMARY KEY
                        REFERENCES requests(request_id) ON DELETE CASCADE,
                    attempts INTEGER NOT NULL,
                    available_at INTEGER NOT NULL,
                    reserved_until INTEGER,
                    reserved_by TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_queue_available
                    ON queue (available_at, reserved_until);
                CREATE TABLE IF NOT EXISTS stage_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    request_id TEXT NOT NULL
                        REFERENCES requests(request_id) ON DELETE CASCADE,
                    stage TEXT NOT NULL,
                    record_json TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_stage_records_request
                    ON stage_records (request_id, id);
                CREATE TABLE IF NOT EXISTS decisions (
                    request_id TEXT NOT NULL PRIMARY KEY
                        REFERENCES requests(request_id) ON DELETE CASCADE,
                    outcome TEXT NOT NULL,
                    decision_json TEXT NOT NULL,
                    decided_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS failures (
                    request_id TEXT NOT NULL PRIMARY KEY
                        REFERENCES requests(request_id) ON DELETE CASCADE,
                    error_message TEXT NOT NULL,
                    failed_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS replay_nonces (
                    api_key TEXT NOT NULL,
                    nonce TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (api_key, nonce)
                );
                CREATE INDEX IF NOT EXISTS idx_replay_nonces_created
                    ON replay_nonces (created_at);
                CREATE TABLE IF NOT EXISTS request_identifiers (
                    request_id TEXT NOT NULL
                        REFERENCES requests(request_id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    hash TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_request_identifiers_hash
                    ON request_identifiers (hash, created_at);
                CREATE INDEX IF NOT EXISTS idx_request_identifiers_kind
                    ON request_identifiers (kind, hash, created_at);",
            )
            .map_err(|err| db_err(&err))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteStoreError::Invalid(format!(
                "unsupported schema version {other}"
            )));
        }
    }
    tx.commit().map_err(|err| db_err(&err))
}
