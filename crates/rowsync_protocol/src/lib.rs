//! # Rowsync Protocol
//!
//! Protocol types for the rowsync offline-first sync engine.
//!
//! This crate provides:
//! - The uniform [`Row`] envelope shared by all logical tables
//! - [`Hlc`] hybrid logical clock values with their total order
//! - [`PendingOp`] entries for the local push log
//! - [`SyncCursor`] for incremental pulls
//! - Push/pull wire messages and server-pushed [`ServerEvent`]s
//!
//! This is a pure protocol crate with no I/O operations. All wire shapes
//! serialize to the canonical camelCase JSON field names used by every
//! transport binding.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod error;
mod hlc;
mod messages;
mod operation;
mod row;

pub use cursor::SyncCursor;
pub use error::{ProtocolError, ProtocolResult};
pub use hlc::Hlc;
pub use messages::{PullRequest, PullResponse, PushRequest, PushResponse, ServerEvent};
pub use operation::{PendingOp, PendingRecord};
pub use row::Row;
