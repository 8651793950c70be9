//! # Rowsync Sync Engine
//!
//! Background synchronization for rowsync nodes.
//!
//! This crate provides:
//! - The [`ConnectionManager`] state machine fed by a platform driver
//! - The [`SyncTransport`] contract with a scripted [`MockTransport`]
//! - [`HttpTransport`], the reference HTTP binding over a pluggable
//!   [`HttpClient`]
//! - The [`SyncLoop`] driving non-overlapping push/pull cycles and
//!   applying server-pushed changes
//!
//! The loop never fails its caller in steady state: every cycle error is
//! routed to the configured error handler and the schedule continues.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod http;
mod sync_loop;
mod transport;

pub use config::{SyncConfig, DEFAULT_CURSOR_KEY};
pub use connection::{ConnectionDriver, ConnectionManager, ConnectionState, ManualDriver};
pub use error::{SyncError, SyncResult};
pub use http::{AuthMode, HttpClient, HttpResponse, HttpTransport};
pub use sync_loop::SyncLoop;
pub use transport::{MockTransport, SyncTransport};
