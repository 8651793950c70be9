//! Hybrid logical clock values.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A hybrid logical clock triple.
///
/// An `Hlc` totally orders writes across devices: numerically by wall
/// time, then numerically by counter, then lexicographically by device
/// id. The counter is an unbounded integer, never compared as a string.
///
/// The three fields serialize to the canonical row envelope names
/// (`hlcTimestampMs`, `hlcCounter`, `hlcDeviceId`) so the value can be
/// flattened directly into rows and pending operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hlc {
    /// Milliseconds of wall time observed when the clock was issued.
    #[serde(rename = "hlcTimestampMs")]
    pub wall_ms: u64,
    /// Logical counter disambiguating writes within one millisecond.
    #[serde(rename = "hlcCounter")]
    pub counter: u64,
    /// Identifier of the device that issued the clock.
    #[serde(rename = "hlcDeviceId")]
    pub device_id: String,
}

impl Hlc {
    /// Creates a new HLC value.
    pub fn new(wall_ms: u64, counter: u64, device_id: impl Into<String>) -> Self {
        Self {
            wall_ms,
            counter,
            device_id: device_id.into(),
        }
    }

    /// Validates the clock components.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHlc`] when `device_id` is empty.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.device_id.is_empty() {
            return Err(ProtocolError::invalid_hlc("empty device id"));
        }
        Ok(())
    }

}

impl Ord for Hlc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wall_ms
            .cmp(&other.wall_ms)
            .then_with(|| self.counter.cmp(&other.counter))
            .then_with(|| self.device_id.cmp(&other.device_id))
    }
}

impl PartialOrd for Hlc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.wall_ms, self.counter, self.device_id)
    }
}
