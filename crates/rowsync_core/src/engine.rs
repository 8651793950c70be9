//! The storage engine: the application-facing row API.

use crate::clock::{ClockSource, HlcClock, KvClockStore, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{ChangeEvent, ChangeSource, InvalidationHint, ListenerSet, Subscription};
use parking_lot::Mutex;
use rowsync_protocol::{Hlc, PendingOp, Row};
use rowsync_storage::{ApplyOutcome, RowQuery, RowStore};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Options for a `put` write.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Parent assignment. `None` preserves the row's existing parent;
    /// `Some(None)` explicitly clears it; `Some(Some(p))` sets it.
    pub parent_id: Option<Option<String>>,
    /// Optional transaction grouping label.
    pub tx_id: Option<String>,
    /// Optional schema version of the payload.
    pub schema_version: Option<u32>,
}

impl WriteOptions {
    /// Assigns (or clears, with `None`) the parent id.
    #[must_use]
    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the transaction label.
    #[must_use]
    pub fn with_tx(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn with_schema_version(mut self, schema_version: u32) -> Self {
        self.schema_version = Some(schema_version);
        self
    }
}

/// One step of an atomic local batch.
#[derive(Debug, Clone)]
pub enum AtomicOp {
    /// Upsert a row.
    Put {
        /// Target collection.
        collection_id: String,
        /// Target row id.
        id: String,
        /// Payload to write.
        data: Value,
        /// Write options.
        options: WriteOptions,
    },
    /// Tombstone a row.
    Delete {
        /// Target collection.
        collection_id: String,
        /// Target row id.
        id: String,
    },
}

/// The result of one local write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// Namespace of the written row.
    pub namespace: String,
    /// Collection of the written row.
    pub collection_id: String,
    /// Id of the written row.
    pub id: String,
    /// Parent group the row ended up with.
    pub parent_id: Option<String>,
    /// Whether the write was a tombstone.
    pub tombstone: bool,
    /// Server commit time carried by the row (0 for fresh local writes).
    pub committed_timestamp_ms: u64,
    /// The HLC stamped on the write.
    pub hlc: Hlc,
    /// Whether the write won last-writer-wins and was stored.
    pub applied: bool,
}

impl WriteResult {
    fn from_outcome(outcome: &ApplyOutcome) -> Self {
        Self {
            namespace: outcome.namespace.clone(),
            collection_id: outcome.collection_id.clone(),
            id: outcome.id.clone(),
            parent_id: outcome.parent_id.clone(),
            tombstone: outcome.tombstone,
            committed_timestamp_ms: outcome.committed_timestamp_ms,
            hlc: outcome.hlc.clone(),
            applied: outcome.written,
        }
    }
}

/// The result of applying a batch of remote rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteApplyResult {
    /// How many incoming rows won last-writer-wins.
    pub applied_count: usize,
    /// Deduplicated hints for the rows that changed.
    pub invalidation_hints: Vec<InvalidationHint>,
}

/// A fully resolved write, ready for clock allocation.
#[derive(Debug)]
struct WriteIntent {
    collection_id: String,
    id: String,
    parent_id: Option<String>,
    data: Option<Value>,
    tombstone: bool,
    tx_id: Option<String>,
    schema_version: Option<u32>,
}

/// State guarded by the engine's serial queue.
struct EngineState {
    /// Next pending-log sequence to assign.
    next_sequence: u64,
}

/// The only write path exposed to the application.
///
/// The engine resolves operation-level details the store does not know
/// (parent preservation), allocates HLCs in one batch per operation,
/// applies rows under last-writer-wins, mirrors winning writes into the
/// pending log with the identical HLC triple, and fans out invalidation
/// hints to subscribers.
///
/// # Serialization
///
/// Every public operation (reads included) runs under one internal
/// mutex, so intent resolution, clock allocation, apply, pending append,
/// and event emission never interleave with another engine operation.
/// This is what keeps the pending log an exact mirror of winning local
/// writes without requiring a cross-store transaction from the backend.
pub struct StorageEngine {
    config: EngineConfig,
    store: Arc<dyn RowStore>,
    clock: HlcClock,
    listeners: ListenerSet<ChangeEvent>,
    /// The engine's serial queue.
    state: Mutex<EngineState>,
}

impl StorageEngine {
    /// Creates an engine over the given store, reading the wall clock.
    pub fn new(config: EngineConfig, store: Arc<dyn RowStore>) -> EngineResult<Self> {
        Self::with_clock_source(config, store, Arc::new(SystemClock))
    }

    /// Creates an engine with an injected clock source.
    pub fn with_clock_source(
        config: EngineConfig,
        store: Arc<dyn RowStore>,
        source: Arc<dyn ClockSource>,
    ) -> EngineResult<Self> {
        if config.namespace.is_empty() {
            return Err(EngineError::invalid_argument("namespace must not be empty"));
        }
        if store.namespace() != config.namespace {
            return Err(EngineError::invalid_argument(format!(
                "store is bound to namespace {:?}, engine configured for {:?}",
                store.namespace(),
                config.namespace
            )));
        }

        let clock_store = Arc::new(KvClockStore::new(Arc::clone(&store)));
        let clock = HlcClock::new(config.device_id.clone(), source, clock_store)?;
        let next_sequence = store.last_pending_sequence()? + 1;

        Ok(Self {
            config,
            store,
            clock,
            listeners: ListenerSet::new(),
            state: Mutex::new(EngineState { next_sequence }),
        })
    }

    /// Returns the namespace this engine writes into.
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Returns the device id stamped on local writes.
    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    /// Reads a row. Tombstoned rows read as absent.
    pub fn get(&self, collection_id: &str, id: &str) -> EngineResult<Option<Row>> {
        let _queue = self.state.lock();
        let rows = self
            .store
            .query(&RowQuery::collection(collection_id).with_id(id))?;
        Ok(rows.into_iter().next())
    }

    /// Reads all live rows of a collection.
    pub fn get_all(&self, collection_id: &str) -> EngineResult<Vec<Row>> {
        let _queue = self.state.lock();
        self.store
            .query(&RowQuery::collection(collection_id))
            .map_err(Into::into)
    }

    /// Reads all live rows grouped under a parent.
    pub fn get_all_with_parent(
        &self,
        collection_id: &str,
        parent_id: &str,
    ) -> EngineResult<Vec<Row>> {
        let _queue = self.state.lock();
        self.store
            .query(&RowQuery::collection(collection_id).with_parent(parent_id))
            .map_err(Into::into)
    }

    /// Writes a row locally.
    ///
    /// When `options.parent_id` is absent the existing row's parent (even
    /// a tombstoned row's) is preserved. A write that loses last-writer-
    /// wins is not an error: the result carries `applied: false` and no
    /// pending entry is recorded.
    pub fn put(
        &self,
        collection_id: &str,
        id: &str,
        data: Value,
        options: WriteOptions,
    ) -> EngineResult<WriteResult> {
        let mut state = self.state.lock();
        let intent = self.resolve_put(collection_id, id, data, options)?;
        let mut results = self.commit_local(&mut state, vec![intent])?;
        Ok(results.remove(0))
    }

    /// Tombstones a row locally, preserving its parent grouping.
    pub fn delete(&self, collection_id: &str, id: &str) -> EngineResult<WriteResult> {
        let mut state = self.state.lock();
        let intent = self.resolve_delete(collection_id, id)?;
        let mut results = self.commit_local(&mut state, vec![intent])?;
        Ok(results.remove(0))
    }

    /// Tombstones every live row grouped under `parent_id`.
    pub fn delete_all_with_parent(
        &self,
        collection_id: &str,
        parent_id: &str,
    ) -> EngineResult<Vec<WriteResult>> {
        let mut state = self.state.lock();
        let live = self
            .store
            .query(&RowQuery::collection(collection_id).with_parent(parent_id))?;
        let intents = live
            .into_iter()
            .map(|row| WriteIntent {
                collection_id: row.collection_id,
                id: row.id,
                parent_id: row.parent_id,
                data: None,
                tombstone: true,
                tx_id: None,
                schema_version: None,
            })
            .collect();
        self.commit_local(&mut state, intents)
    }

    /// Applies an ordered batch of local operations atomically.
    ///
    /// All intents are resolved first (reads), then one HLC batch is
    /// allocated, then one store apply runs for the whole batch.
    pub fn batch_local(&self, ops: Vec<AtomicOp>) -> EngineResult<Vec<WriteResult>> {
        let mut state = self.state.lock();
        let intents = ops
            .into_iter()
            .map(|op| match op {
                AtomicOp::Put {
                    collection_id,
                    id,
                    data,
                    options,
                } => self.resolve_put(&collection_id, &id, data, options),
                AtomicOp::Delete { collection_id, id } => self.resolve_delete(&collection_id, &id),
            })
            .collect::<EngineResult<Vec<_>>>()?;
        self.commit_local(&mut state, intents)
    }

    /// Applies rows received from the server.
    ///
    /// The rows already carry their authoritative HLCs; no allocation
    /// happens here. The greatest incoming clock is merged into the
    /// local clock so later local writes order after everything this
    /// node has observed.
    pub fn apply_remote(&self, rows: &[Row]) -> EngineResult<RemoteApplyResult> {
        let _queue = self.state.lock();
        if rows.is_empty() {
            return Ok(RemoteApplyResult::default());
        }

        let outcomes = self.store.apply_rows(rows)?;
        if let Some(max_remote) = rows.iter().map(|row| &row.hlc).max() {
            self.clock.next_from_remote(max_remote, None)?;
        }

        let applied_count = outcomes.iter().filter(|o| o.written).count();
        let invalidation_hints = Self::hints_for(&outcomes);
        tracing::debug!(
            incoming = rows.len(),
            applied = applied_count,
            "applied remote rows"
        );
        self.emit(ChangeSource::Remote, &invalidation_hints);

        Ok(RemoteApplyResult {
            applied_count,
            invalidation_hints,
        })
    }

    /// Returns up to `limit` pending operations in sequence order.
    pub fn get_pending(&self, limit: usize) -> EngineResult<Vec<PendingOp>> {
        let _queue = self.state.lock();
        self.store.get_pending(limit).map_err(Into::into)
    }

    /// Removes pending operations acknowledged through `seq_inclusive`.
    pub fn remove_pending_through(&self, seq_inclusive: u64) -> EngineResult<()> {
        let _queue = self.state.lock();
        self.store
            .remove_pending_through(seq_inclusive)
            .map_err(Into::into)
    }

    /// Stores a metadata value in the underlying store.
    pub fn put_kv(&self, key: &str, value: &Value) -> EngineResult<()> {
        let _queue = self.state.lock();
        self.store.put_kv(key, value).map_err(Into::into)
    }

    /// Reads a metadata value from the underlying store.
    pub fn get_kv(&self, key: &str) -> EngineResult<Option<Value>> {
        let _queue = self.state.lock();
        self.store.get_kv(key).map_err(Into::into)
    }

    /// Deletes a metadata value from the underlying store.
    pub fn delete_kv(&self, key: &str) -> EngineResult<()> {
        let _queue = self.state.lock();
        self.store.delete_kv(key).map_err(Into::into)
    }

    /// Subscribes to change events; dropping the handle unsubscribes.
    ///
    /// Listeners run synchronously on the thread that performed the
    /// apply, after store work completes and before the operation
    /// returns. They must not call back into the engine.
    pub fn subscribe(
        &self,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.subscribe(listener)
    }

    fn resolve_put(
        &self,
        collection_id: &str,
        id: &str,
        data: Value,
        options: WriteOptions,
    ) -> EngineResult<WriteIntent> {
        let parent_id = match options.parent_id {
            Some(parent) => parent,
            None => self.existing_parent(collection_id, id)?,
        };
        Ok(WriteIntent {
            collection_id: collection_id.to_string(),
            id: id.to_string(),
            parent_id,
            data: Some(data),
            tombstone: false,
            tx_id: options.tx_id,
            schema_version: options.schema_version,
        })
    }

    fn resolve_delete(&self, collection_id: &str, id: &str) -> EngineResult<WriteIntent> {
        Ok(WriteIntent {
            collection_id: collection_id.to_string(),
            id: id.to_string(),
            parent_id: self.existing_parent(collection_id, id)?,
            data: None,
            tombstone: true,
            tx_id: None,
            schema_version: None,
        })
    }

    /// Reads the current parent of a row, tombstones included.
    fn existing_parent(&self, collection_id: &str, id: &str) -> EngineResult<Option<String>> {
        let rows = self.store.query(
            &RowQuery::collection(collection_id)
                .with_id(id)
                .including_tombstones(),
        )?;
        Ok(rows.into_iter().next().and_then(|row| row.parent_id))
    }

    /// Allocates clocks, applies, mirrors winners into the pending log,
    /// and emits hints. Runs entirely under the serial queue.
    fn commit_local(
        &self,
        state: &mut EngineState,
        intents: Vec<WriteIntent>,
    ) -> EngineResult<Vec<WriteResult>> {
        if intents.is_empty() {
            return Ok(Vec::new());
        }

        let hlcs = self.clock.next_batch(intents.len(), None)?;
        let rows: Vec<Row> = intents
            .into_iter()
            .zip(hlcs)
            .map(|(intent, hlc)| Row {
                namespace: self.config.namespace.clone(),
                collection_id: intent.collection_id,
                id: intent.id,
                parent_id: intent.parent_id,
                data: intent.data,
                tombstone: intent.tombstone,
                tx_id: intent.tx_id,
                schema_version: intent.schema_version,
                committed_timestamp_ms: 0,
                hlc,
            })
            .collect();

        let outcomes = self.store.apply_rows(&rows)?;

        let mut pending = Vec::new();
        let mut results = Vec::with_capacity(outcomes.len());
        for (row, outcome) in rows.iter().zip(&outcomes) {
            if outcome.written {
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                pending.push(PendingOp::from_row(row, sequence));
            }
            results.push(WriteResult::from_outcome(outcome));
        }
        if !pending.is_empty() {
            self.store.append_pending(&pending)?;
        }

        let hints = Self::hints_for(&outcomes);
        tracing::debug!(
            writes = results.len(),
            won = pending.len(),
            "committed local batch"
        );
        self.emit(ChangeSource::Local, &hints);
        Ok(results)
    }

    /// One hint per written row, deduplicated in first-seen order.
    fn hints_for(outcomes: &[ApplyOutcome]) -> Vec<InvalidationHint> {
        let mut seen = HashSet::new();
        let mut hints = Vec::new();
        for outcome in outcomes.iter().filter(|o| o.written) {
            let hint = InvalidationHint {
                collection_id: outcome.collection_id.clone(),
                id: Some(outcome.id.clone()),
                parent_id: outcome.parent_id.clone(),
            };
            if seen.insert(hint.clone()) {
                hints.push(hint);
            }
        }
        hints
    }

    fn emit(&self, source: ChangeSource, hints: &[InvalidationHint]) {
        if hints.is_empty() {
            return;
        }
        self.listeners.emit(&ChangeEvent {
            source,
            invalidation_hints: hints.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex as PlMutex;
    use rowsync_storage::MemoryStore;
    use serde_json::json;

    fn engine_at(now_ms: u64) -> (StorageEngine, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::for_namespace("app"));
        let source = Arc::new(ManualClock::new(now_ms));
        let engine = StorageEngine::with_clock_source(
            EngineConfig::new("app", "deviceA"),
            Arc::clone(&store) as Arc<dyn RowStore>,
            Arc::clone(&source) as Arc<dyn ClockSource>,
        )
        .unwrap();
        (engine, source, store)
    }

    fn remote_row(id: &str, data: Value, hlc: Hlc) -> Row {
        let mut row = Row::live("app", "books", id, data, hlc);
        row.committed_timestamp_ms = 50;
        row
    }

    #[test]
    fn put_then_get() {
        let (engine, _, _) = engine_at(1000);
        let result = engine
            .put("books", "b1", json!({"title": "Dune"}), WriteOptions::default())
            .unwrap();

        assert!(result.applied);
        assert_eq!(result.hlc, Hlc::new(1000, 0, "deviceA"));
        assert!(!result.tombstone);

        let row = engine.get("books", "b1").unwrap().unwrap();
        assert_eq!(row.data, Some(json!({"title": "Dune"})));
    }

    #[test]
    fn stale_put_loses_and_leaves_no_pending() {
        let (engine, _, store) = engine_at(1000);
        store
            .apply_rows(&[remote_row(
                "b1",
                json!({"title": "Dune"}),
                Hlc::new(9000, 0, "deviceZ"),
            )])
            .unwrap();

        let result = engine
            .put("books", "b1", json!({"title": "x"}), WriteOptions::default())
            .unwrap();
        assert!(!result.applied);

        let row = engine.get("books", "b1").unwrap().unwrap();
        assert_eq!(row.data, Some(json!({"title": "Dune"})));
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn remote_tie_break_by_device_id() {
        let (engine, _, _) = engine_at(1000);
        let applied: Vec<usize> = ["deviceA", "deviceZ", "deviceB"]
            .iter()
            .map(|device| {
                engine
                    .apply_remote(&[remote_row(
                        "b1",
                        json!({"from": device}),
                        Hlc::new(9000, 2, *device),
                    )])
                    .unwrap()
                    .applied_count
            })
            .collect();

        assert_eq!(applied, vec![1, 1, 0]);
        let row = engine.get("books", "b1").unwrap().unwrap();
        assert_eq!(row.hlc.device_id, "deviceZ");
    }

    #[test]
    fn consecutive_puts_tick_the_counter() {
        let (engine, _, _) = engine_at(3000);
        let first = engine
            .put("books", "b1", json!({"v": 1}), WriteOptions::default())
            .unwrap();
        let second = engine
            .put("books", "b1", json!({"v": 2}), WriteOptions::default())
            .unwrap();

        assert_eq!(first.hlc, Hlc::new(3000, 0, "deviceA"));
        assert_eq!(second.hlc, Hlc::new(3000, 1, "deviceA"));
        assert!(first.applied && second.applied);

        let row = engine.get("books", "b1").unwrap().unwrap();
        assert_eq!(row.data, Some(json!({"v": 2})));
    }

    #[test]
    fn delete_all_with_parent_scopes_to_parent() {
        let (engine, _, _) = engine_at(1000);
        for (id, parent) in [("h1", "b1"), ("h2", "b1"), ("h3", "b2")] {
            engine
                .put(
                    "highlights",
                    id,
                    json!({}),
                    WriteOptions::default().with_parent(Some(parent.into())),
                )
                .unwrap();
        }

        let results = engine.delete_all_with_parent("highlights", "b1").unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.applied && r.tombstone));

        assert!(engine.get("highlights", "h1").unwrap().is_none());
        assert!(engine.get("highlights", "h2").unwrap().is_none());
        assert!(engine.get("highlights", "h3").unwrap().is_some());
        assert_eq!(
            engine.get_all_with_parent("highlights", "b2").unwrap().len(),
            1
        );
    }

    #[test]
    fn put_preserves_parent_until_cleared() {
        let (engine, _, _) = engine_at(1000);
        engine
            .put(
                "books",
                "b1",
                json!({"v": 1}),
                WriteOptions::default().with_parent(Some("shelf1".into())),
            )
            .unwrap();

        // Omitted parent: preserved.
        let kept = engine
            .put("books", "b1", json!({"v": 2}), WriteOptions::default())
            .unwrap();
        assert_eq!(kept.parent_id.as_deref(), Some("shelf1"));

        // Explicit null: cleared.
        let cleared = engine
            .put(
                "books",
                "b1",
                json!({"v": 3}),
                WriteOptions::default().with_parent(None),
            )
            .unwrap();
        assert_eq!(cleared.parent_id, None);
        let row = engine.get("books", "b1").unwrap().unwrap();
        assert_eq!(row.parent_id, None);
    }

    #[test]
    fn delete_preserves_parent_and_hides_row() {
        let (engine, _, _) = engine_at(1000);
        engine
            .put(
                "books",
                "b1",
                json!({}),
                WriteOptions::default().with_parent(Some("shelf1".into())),
            )
            .unwrap();

        let result = engine.delete("books", "b1").unwrap();
        assert!(result.tombstone);
        assert_eq!(result.parent_id.as_deref(), Some("shelf1"));

        assert!(engine.get("books", "b1").unwrap().is_none());
        assert!(engine.get_all("books").unwrap().is_empty());
        assert!(engine
            .get_all_with_parent("books", "shelf1")
            .unwrap()
            .is_empty());

        // A greater-HLC put revives the row and keeps the parent.
        let revived = engine
            .put("books", "b1", json!({"back": true}), WriteOptions::default())
            .unwrap();
        assert!(revived.applied);
        assert_eq!(revived.parent_id.as_deref(), Some("shelf1"));
        assert!(engine.get("books", "b1").unwrap().is_some());
    }

    #[test]
    fn pending_mirrors_winning_writes() {
        let (engine, _, _) = engine_at(1000);
        let first = engine
            .put("books", "b1", json!({"v": 1}), WriteOptions::default())
            .unwrap();
        let second = engine.delete("books", "b1").unwrap();

        let pending = engine.get_pending(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].sequence(), 1);
        assert_eq!(pending[1].sequence(), 2);
        assert_eq!(pending[0].hlc(), &first.hlc);
        assert_eq!(pending[1].hlc(), &second.hlc);
        assert!(pending[0].is_put());
        assert!(!pending[1].is_put());

        engine.remove_pending_through(1).unwrap();
        let rest = engine.get_pending(10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].sequence(), 2);
    }

    #[test]
    fn remote_apply_is_idempotent() {
        let (engine, _, _) = engine_at(1000);
        let row = remote_row("b1", json!({}), Hlc::new(5000, 0, "deviceZ"));

        let first = engine.apply_remote(std::slice::from_ref(&row)).unwrap();
        let second = engine.apply_remote(std::slice::from_ref(&row)).unwrap();
        assert_eq!(first.applied_count, 1);
        assert_eq!(second.applied_count, 0);
        assert!(second.invalidation_hints.is_empty());
    }

    #[test]
    fn remote_apply_advances_local_clock() {
        let (engine, _, _) = engine_at(1000);
        engine
            .apply_remote(&[remote_row("b1", json!({}), Hlc::new(9000, 4, "deviceZ"))])
            .unwrap();

        // The next local write orders after the observed remote clock.
        let result = engine
            .put("books", "b1", json!({"local": true}), WriteOptions::default())
            .unwrap();
        assert!(result.applied);
        assert!(result.hlc > Hlc::new(9000, 4, "deviceZ"));
    }

    #[test]
    fn batch_local_resolves_then_applies_in_order() {
        let (engine, _, _) = engine_at(1000);
        engine
            .put(
                "books",
                "b1",
                json!({"v": 0}),
                WriteOptions::default().with_parent(Some("shelf1".into())),
            )
            .unwrap();

        let results = engine
            .batch_local(vec![
                AtomicOp::Put {
                    collection_id: "books".into(),
                    id: "b1".into(),
                    data: json!({"v": 1}),
                    options: WriteOptions::default(),
                },
                AtomicOp::Delete {
                    collection_id: "books".into(),
                    id: "b2".into(),
                },
                AtomicOp::Put {
                    collection_id: "books".into(),
                    id: "b3".into(),
                    data: json!({"v": 3}),
                    options: WriteOptions::default(),
                },
            ])
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.applied));
        // One HLC batch: strictly increasing, same wall time.
        assert!(results[0].hlc < results[1].hlc);
        assert!(results[1].hlc < results[2].hlc);
        // Intent resolution ran before the batch: parent preserved.
        assert_eq!(results[0].parent_id.as_deref(), Some("shelf1"));

        let pending = engine.get_pending(10).unwrap();
        assert_eq!(pending.len(), 4);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let (engine, _, _) = engine_at(1000);
        assert!(engine.batch_local(Vec::new()).unwrap().is_empty());
        assert!(engine.get_pending(10).unwrap().is_empty());
    }

    #[test]
    fn change_events_carry_deduplicated_hints() {
        let (engine, _, _) = engine_at(1000);
        let events: Arc<PlMutex<Vec<ChangeEvent>>> = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _sub = engine.subscribe(move |event| sink.lock().push(event.clone()));

        engine
            .batch_local(vec![
                AtomicOp::Put {
                    collection_id: "books".into(),
                    id: "b1".into(),
                    data: json!({"v": 1}),
                    options: WriteOptions::default(),
                },
                AtomicOp::Put {
                    collection_id: "books".into(),
                    id: "b1".into(),
                    data: json!({"v": 2}),
                    options: WriteOptions::default(),
                },
            ])
            .unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, ChangeSource::Local);
        // Both writes hit the same row: one hint after dedup.
        assert_eq!(events[0].invalidation_hints.len(), 1);
        assert_eq!(events[0].invalidation_hints[0].id.as_deref(), Some("b1"));
    }

    #[test]
    fn remote_events_have_remote_source() {
        let (engine, _, _) = engine_at(1000);
        let sources: Arc<PlMutex<Vec<ChangeSource>>> = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&sources);
        let _sub = engine.subscribe(move |event| sink.lock().push(event.source));

        engine
            .apply_remote(&[remote_row("b1", json!({}), Hlc::new(5000, 0, "deviceZ"))])
            .unwrap();
        // A losing batch emits nothing.
        engine
            .apply_remote(&[remote_row("b1", json!({}), Hlc::new(4000, 0, "deviceZ"))])
            .unwrap();

        assert_eq!(*sources.lock(), vec![ChangeSource::Remote]);
    }

    #[test]
    fn stale_write_emits_no_event() {
        let (engine, _, store) = engine_at(1000);
        store
            .apply_rows(&[remote_row("b1", json!({}), Hlc::new(9000, 0, "deviceZ"))])
            .unwrap();

        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let _sub = engine.subscribe(move |_| {
            sink.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        engine
            .put("books", "b1", json!({}), WriteOptions::default())
            .unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn sequence_counter_reseeds_from_store() {
        let store = Arc::new(MemoryStore::for_namespace("app"));
        {
            let engine = StorageEngine::with_clock_source(
                EngineConfig::new("app", "deviceA"),
                Arc::clone(&store) as Arc<dyn RowStore>,
                Arc::new(ManualClock::new(1000)),
            )
            .unwrap();
            engine
                .put("books", "b1", json!({}), WriteOptions::default())
                .unwrap();
        }

        let engine = StorageEngine::with_clock_source(
            EngineConfig::new("app", "deviceA"),
            Arc::clone(&store) as Arc<dyn RowStore>,
            Arc::new(ManualClock::new(1000)),
        )
        .unwrap();
        engine
            .put("books", "b2", json!({}), WriteOptions::default())
            .unwrap();

        let pending = engine.get_pending(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].sequence(), 1);
        assert_eq!(pending[1].sequence(), 2);
    }

    #[test]
    fn mismatched_store_namespace_is_rejected() {
        let store = Arc::new(MemoryStore::for_namespace("other"));
        let result = StorageEngine::with_clock_source(
            EngineConfig::new("app", "deviceA"),
            store as Arc<dyn RowStore>,
            Arc::new(ManualClock::new(0)),
        );
        assert!(matches!(result, Err(EngineError::InvalidArgument { .. })));
    }

    #[test]
    fn concurrent_puts_to_same_row_are_totally_ordered() {
        use std::thread;

        let (engine, _, _) = engine_at(1000);
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    engine
                        .put("books", "b1", json!({"writer": i}), WriteOptions::default())
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<WriteResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        // Serialized HLC issuance means every write won over its
        // predecessor and the stored row carries the greatest clock.
        assert!(results.iter().all(|r| r.applied));
        let max = results.iter().map(|r| r.hlc.clone()).max().unwrap();
        let row = engine.get("books", "b1").unwrap().unwrap();
        assert_eq!(row.hlc, max);
    }
}
