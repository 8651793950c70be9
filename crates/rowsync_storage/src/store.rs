//! Row store contract.

use crate::error::StoreResult;
use rowsync_protocol::{Hlc, PendingOp, Row};
use serde_json::Value;

/// Configuration binding a store instance to one local node.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// The namespace this store accepts rows for.
    pub namespace: String,
    /// Optional user scope, for backends shared by several accounts.
    pub user_id: Option<String>,
}

impl StoreConfig {
    /// Creates a configuration for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            user_id: None,
        }
    }

    /// Sets the user scope.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// A row lookup against one collection.
#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    /// Collection to search.
    pub collection_id: String,
    /// Restrict to a single row id.
    pub id: Option<String>,
    /// Restrict to rows grouped under a parent.
    pub parent_id: Option<String>,
    /// Whether tombstoned rows are included in the result.
    pub include_tombstones: bool,
}

impl RowQuery {
    /// Queries all live rows of a collection.
    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            ..Self::default()
        }
    }

    /// Restricts the query to a single row id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Restricts the query to rows under the given parent.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Includes tombstoned rows in the result.
    #[must_use]
    pub fn including_tombstones(mut self) -> Self {
        self.include_tombstones = true;
        self
    }
}

/// The per-row result of a bulk apply.
///
/// Outcomes are returned in input order, one per incoming row, echoing
/// the incoming row's identity and clock so callers can mirror winners
/// into the pending log and invalidation hints without re-reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    /// Whether the incoming row replaced the stored one.
    pub written: bool,
    /// Namespace of the incoming row.
    pub namespace: String,
    /// Collection of the incoming row.
    pub collection_id: String,
    /// Id of the incoming row.
    pub id: String,
    /// Parent group of the incoming row.
    pub parent_id: Option<String>,
    /// Whether the incoming row was a tombstone.
    pub tombstone: bool,
    /// Server commit time carried by the incoming row.
    pub committed_timestamp_ms: u64,
    /// The incoming row's HLC triple.
    pub hlc: Hlc,
}

impl ApplyOutcome {
    /// Builds an outcome echoing the given incoming row.
    pub fn for_row(row: &Row, written: bool) -> Self {
        Self {
            written,
            namespace: row.namespace.clone(),
            collection_id: row.collection_id.clone(),
            id: row.id.clone(),
            parent_id: row.parent_id.clone(),
            tombstone: row.tombstone,
            committed_timestamp_ms: row.committed_timestamp_ms,
            hlc: row.hlc.clone(),
        }
    }
}

/// A durable row table, pending-operation log, and metadata store.
///
/// One store instance backs one local node. Implementations arbitrate
/// last-writer-wins *inside* `apply_rows`: an incoming row replaces the
/// stored row iff its HLC triple is strictly greater (wall time, then
/// counter, then device id). Callers never re-implement the comparison.
///
/// # Invariants
///
/// - At most one row exists per `(namespace, collection_id, id)`
/// - `apply_rows` is atomic across the batch with respect to concurrent
///   `query` and `apply_rows` calls on the same instance
/// - `get_pending` returns entries in ascending sequence order; durable
///   implementations re-expose persisted entries in the same order after
///   restart
/// - Pending entries are removed only by `remove_pending_through`
///
/// # Implementors
///
/// - [`crate::MemoryStore`] — the in-memory reference and test double
pub trait RowStore: Send + Sync {
    /// Returns the namespace this store is bound to.
    fn namespace(&self) -> &str;

    /// Looks up rows matching the query, ordered by `(collection_id, id)`.
    ///
    /// Tombstoned rows are omitted unless the query asks for them.
    fn query(&self, query: &RowQuery) -> StoreResult<Vec<Row>>;

    /// Applies a batch of rows under last-writer-wins.
    ///
    /// Returns one outcome per input row, in input order. When a batch
    /// contains several rows with the same identity and identical HLC
    /// triple, the first occurrence wins and the rest report
    /// `written: false`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StoreError::NamespaceMismatch`] if any incoming
    /// row targets a different namespace than the store is bound to.
    fn apply_rows(&self, rows: &[Row]) -> StoreResult<Vec<ApplyOutcome>>;

    /// Appends entries to the pending-operation log.
    fn append_pending(&self, ops: &[PendingOp]) -> StoreResult<()>;

    /// Returns up to `limit` pending entries in ascending sequence order.
    fn get_pending(&self, limit: usize) -> StoreResult<Vec<PendingOp>>;

    /// Removes all pending entries with `sequence <= seq_inclusive`.
    fn remove_pending_through(&self, seq_inclusive: u64) -> StoreResult<()>;

    /// Returns the highest sequence ever appended, or 0 when none.
    ///
    /// Durable implementations answer from their persisted maximum so the
    /// engine can reseed its in-process counter after a restart.
    fn last_pending_sequence(&self) -> StoreResult<u64>;

    /// Stores a metadata value under the given key.
    fn put_kv(&self, key: &str, value: &Value) -> StoreResult<()>;

    /// Reads a metadata value.
    fn get_kv(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Deletes a metadata value.
    fn delete_kv(&self, key: &str) -> StoreResult<()>;
}
