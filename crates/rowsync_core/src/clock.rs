//! The hybrid logical clock service.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use rowsync_protocol::Hlc;
use rowsync_storage::RowStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default KV key under which the last issued clock is persisted.
pub const CLOCK_KEY: &str = "hlc.last.v1";

/// A source of wall-clock milliseconds.
///
/// Injectable so tests control time; nothing below the engine reads the
/// wall clock directly.
pub trait ClockSource: Send + Sync {
    /// Returns the current wall time in milliseconds since the epoch.
    fn now_ms(&self) -> u64;
}

/// The production clock source.
#[derive(Debug, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A manually driven clock source for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at the given time.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Advances the current time.
    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Persistence for the last issued clock.
///
/// The clock survives restarts so a node never re-issues a timestamp it
/// already handed out, even when the wall clock moved backwards while
/// the process was down.
pub trait ClockStore: Send + Sync {
    /// Loads the last persisted clock, if any.
    fn load(&self) -> EngineResult<Option<Hlc>>;

    /// Persists the last issued clock.
    fn save(&self, hlc: &Hlc) -> EngineResult<()>;
}

/// An in-memory clock store for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryClockStore {
    last: Mutex<Option<Hlc>>,
}

impl MemoryClockStore {
    /// Creates an empty clock store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClockStore for MemoryClockStore {
    fn load(&self) -> EngineResult<Option<Hlc>> {
        Ok(self.last.lock().clone())
    }

    fn save(&self, hlc: &Hlc) -> EngineResult<()> {
        *self.last.lock() = Some(hlc.clone());
        Ok(())
    }
}

/// A clock store persisting into a row store's KV partition.
pub struct KvClockStore {
    store: Arc<dyn RowStore>,
    key: String,
}

impl KvClockStore {
    /// Creates a store persisting under [`CLOCK_KEY`].
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self::with_key(store, CLOCK_KEY)
    }

    /// Creates a store persisting under a custom key.
    pub fn with_key(store: Arc<dyn RowStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

impl ClockStore for KvClockStore {
    fn load(&self) -> EngineResult<Option<Hlc>> {
        match self.store.get_kv(&self.key)? {
            Some(value) => {
                let hlc: Hlc = serde_json::from_value(value).map_err(|e| {
                    rowsync_storage::StoreError::serialization(format!(
                        "persisted clock is malformed: {e}"
                    ))
                })?;
                Ok(Some(hlc))
            }
            None => Ok(None),
        }
    }

    fn save(&self, hlc: &Hlc) -> EngineResult<()> {
        let value = serde_json::to_value(hlc)
            .map_err(|e| rowsync_storage::StoreError::serialization(e.to_string()))?;
        self.store.put_kv(&self.key, &value)?;
        Ok(())
    }
}

/// The hybrid logical clock service.
///
/// Issues HLC triples that are strictly monotonic under concurrent
/// callers and merges clocks observed from remote writes. All mutating
/// calls serialize through one internal mutex so each consults the
/// latest issued value before computing and persisting the next.
pub struct HlcClock {
    device_id: String,
    source: Arc<dyn ClockSource>,
    store: Arc<dyn ClockStore>,
    /// Last issued clock. Held across compute + persist.
    last: Mutex<Option<Hlc>>,
}

impl HlcClock {
    /// Creates a clock for the given device, restoring persisted state.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidHlc` when `device_id` is empty, or with the
    /// store's error when the persisted clock cannot be read.
    pub fn new(
        device_id: impl Into<String>,
        source: Arc<dyn ClockSource>,
        store: Arc<dyn ClockStore>,
    ) -> EngineResult<Self> {
        let device_id = device_id.into();
        if device_id.is_empty() {
            return Err(rowsync_protocol::ProtocolError::invalid_hlc("empty device id").into());
        }
        let last = store.load()?;
        Ok(Self {
            device_id,
            source,
            store,
            last: Mutex::new(last),
        })
    }

    /// Returns the device id this clock issues for.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Issues the next clock value.
    ///
    /// `now_ms` overrides the clock source (tests); when absent the
    /// source is consulted.
    pub fn next(&self, now_ms: Option<u64>) -> EngineResult<Hlc> {
        let mut last = self.last.lock();
        let next = self.compute_next(last.as_ref(), now_ms);
        self.store.save(&next)?;
        *last = Some(next.clone());
        Ok(next)
    }

    /// Issues `count` strictly increasing clock values.
    ///
    /// Only the last value is persisted; intermediate values exist only
    /// in the returned batch.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` when `count` is zero.
    pub fn next_batch(&self, count: usize, now_ms: Option<u64>) -> EngineResult<Vec<Hlc>> {
        if count == 0 {
            return Err(EngineError::invalid_argument("count must be at least 1"));
        }

        let mut last = self.last.lock();
        let first = self.compute_next(last.as_ref(), now_ms);
        let batch: Vec<Hlc> = (0..count as u64)
            .map(|i| Hlc::new(first.wall_ms, first.counter + i, self.device_id.clone()))
            .collect();

        let final_hlc = batch.last().cloned().unwrap_or(first);
        self.store.save(&final_hlc)?;
        *last = Some(final_hlc);
        Ok(batch)
    }

    /// Issues the next clock value after observing a remote clock.
    ///
    /// The result is strictly greater than both the last issued value
    /// and the remote observation, keeping later local writes ordered
    /// after everything this node has seen.
    pub fn next_from_remote(&self, remote: &Hlc, now_ms: Option<u64>) -> EngineResult<Hlc> {
        remote.validate()?;

        let mut last = self.last.lock();
        let now = now_ms.unwrap_or_else(|| self.source.now_ms());
        let last_wall = last.as_ref().map(|l| l.wall_ms);
        let wall = now.max(last_wall.unwrap_or(0)).max(remote.wall_ms);

        let counter = match (last_wall == Some(wall), remote.wall_ms == wall) {
            (true, true) => {
                let local = last.as_ref().map(|l| l.counter).unwrap_or(0);
                local.max(remote.counter) + 1
            }
            (true, false) => last.as_ref().map(|l| l.counter).unwrap_or(0) + 1,
            (false, true) => remote.counter + 1,
            (false, false) => 0,
        };

        let next = Hlc::new(wall, counter, self.device_id.clone());
        self.store.save(&next)?;
        *last = Some(next.clone());
        Ok(next)
    }

    /// Returns the last issued clock, if any.
    pub fn peek(&self) -> Option<Hlc> {
        self.last.lock().clone()
    }

    fn compute_next(&self, last: Option<&Hlc>, now_ms: Option<u64>) -> Hlc {
        let now = now_ms.unwrap_or_else(|| self.source.now_ms());
        match last {
            Some(last) if now <= last.wall_ms => {
                Hlc::new(last.wall_ms, last.counter + 1, self.device_id.clone())
            }
            _ => Hlc::new(now, 0, self.device_id.clone()),
        }
    }
}
