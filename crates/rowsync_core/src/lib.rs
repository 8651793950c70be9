//! # Rowsync Core
//!
//! The node-local engine of the rowsync offline-first sync system.
//!
//! This crate provides:
//! - [`HlcClock`], the hybrid-logical-clock service issuing monotonic
//!   write timestamps and merging remote observations
//! - [`StorageEngine`], the only write path the application sees:
//!   intent resolution, batched HLC allocation, last-writer-wins apply,
//!   pending-log mirroring, and invalidation fan-out
//! - Change events with deduplicated invalidation hints
//!
//! Storage itself is pluggable through the
//! [`RowStore`](rowsync_storage::RowStore) contract.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod engine;
mod error;
mod events;

pub use clock::{
    ClockSource, ClockStore, HlcClock, KvClockStore, ManualClock, MemoryClockStore, SystemClock,
    CLOCK_KEY,
};
pub use config::EngineConfig;
pub use engine::{AtomicOp, RemoteApplyResult, StorageEngine, WriteOptions, WriteResult};
pub use error::{EngineError, EngineResult};
pub use events::{ChangeEvent, ChangeSource, InvalidationHint, ListenerSet, Subscription};
