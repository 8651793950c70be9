//! # Rowsync Storage
//!
//! Storage contract and reference implementation for rowsync.
//!
//! This crate provides:
//! - The [`RowStore`] adapter contract every backend implements
//! - Last-writer-wins arbitration, enforced inside the store
//! - The pending-operation log and key/value metadata surface
//! - [`MemoryStore`], the in-memory reference implementation
//!
//! A store instance is bound to one `(user_id, namespace)` pair and backs
//! one local node. Durable backends (embedded SQL, browser object stores)
//! implement the same contract out of tree.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{ApplyOutcome, RowQuery, RowStore, StoreConfig};
