//! In-memory row store for testing.

use crate::error::{StoreError, StoreResult};
use crate::store::{ApplyOutcome, RowQuery, RowStore, StoreConfig};
use parking_lot::Mutex;
use rowsync_protocol::{PendingOp, Row};
use serde_json::Value;
use std::collections::BTreeMap;

/// The complete mutable state of a memory store.
///
/// Everything lives behind one mutex so an apply batch is atomic with
/// respect to concurrent queries and applies, matching the contract a
/// durable backend meets with a transaction.
#[derive(Debug, Default)]
struct World {
    /// Rows keyed by `(collection_id, id)`; the map order doubles as the
    /// query result order.
    rows: BTreeMap<(String, String), Row>,
    /// Pending entries in append (= ascending sequence) order.
    pending: Vec<PendingOp>,
    /// Highest sequence ever appended, kept across truncation.
    last_sequence: u64,
    /// Metadata keys.
    kv: BTreeMap<String, Value>,
}

/// An in-memory row store.
///
/// This store is the reference implementation of [`RowStore`] and is
/// suitable for:
/// - Unit and integration tests
/// - Ephemeral nodes that don't need persistence
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads.
#[derive(Debug)]
pub struct MemoryStore {
    config: StoreConfig,
    world: Mutex<World>,
}

impl MemoryStore {
    /// Creates an empty store bound to the given configuration.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            world: Mutex::new(World::default()),
        }
    }

    /// Creates an empty store for the given namespace.
    #[must_use]
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self::new(StoreConfig::new(namespace))
    }

    /// Returns the number of stored rows, tombstones included.
    pub fn row_count(&self) -> usize {
        self.world.lock().rows.len()
    }

    /// Returns the number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.world.lock().pending.len()
    }
}

impl RowStore for MemoryStore {
    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn query(&self, query: &RowQuery) -> StoreResult<Vec<Row>> {
        let world = self.world.lock();
        let matches = world
            .rows
            .values()
            .filter(|row| row.collection_id == query.collection_id)
            .filter(|row| match &query.id {
                Some(id) => &row.id == id,
                None => true,
            })
            .filter(|row| match &query.parent_id {
                Some(parent) => row.parent_id.as_deref() == Some(parent.as_str()),
                None => true,
            })
            .filter(|row| query.include_tombstones || !row.tombstone)
            .cloned()
            .collect();
        Ok(matches)
    }

    fn apply_rows(&self, rows: &[Row]) -> StoreResult<Vec<ApplyOutcome>> {
        let mut world = self.world.lock();

        // Reject foreign namespaces before touching anything; the batch
        // applies all-or-nothing.
        for row in rows {
            if row.namespace != self.config.namespace {
                return Err(StoreError::namespace_mismatch(
                    &self.config.namespace,
                    &row.namespace,
                ));
            }
            row.validate()?;
        }

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let key = (row.collection_id.clone(), row.id.clone());
            let written = match world.rows.get(&key) {
                Some(existing) => row.hlc > existing.hlc,
                None => true,
            };
            if written {
                world.rows.insert(key, row.clone());
            }
            outcomes.push(ApplyOutcome::for_row(row, written));
        }
        Ok(outcomes)
    }

    fn append_pending(&self, ops: &[PendingOp]) -> StoreResult<()> {
        let mut world = self.world.lock();
        for op in ops {
            world.last_sequence = world.last_sequence.max(op.sequence());
            world.pending.push(op.clone());
        }
        Ok(())
    }

    fn get_pending(&self, limit: usize) -> StoreResult<Vec<PendingOp>> {
        let world = self.world.lock();
        Ok(world.pending.iter().take(limit).cloned().collect())
    }

    fn remove_pending_through(&self, seq_inclusive: u64) -> StoreResult<()> {
        let mut world = self.world.lock();
        world.pending.retain(|op| op.sequence() > seq_inclusive);
        Ok(())
    }

    fn last_pending_sequence(&self) -> StoreResult<u64> {
        Ok(self.world.lock().last_sequence)
    }

    fn put_kv(&self, key: &str, value: &Value) -> StoreResult<()> {
        self.world.lock().kv.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get_kv(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.world.lock().kv.get(key).cloned())
    }

    fn delete_kv(&self, key: &str) -> StoreResult<()> {
        self.world.lock().kv.remove(key);
        Ok(())
    }
}
