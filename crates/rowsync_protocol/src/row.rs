//! The uniform row envelope.

use crate::error::{ProtocolError, ProtocolResult};
use crate::hlc::Hlc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A row in the replicated bag of rows.
///
/// Every logical table shares this one envelope. A row is identified by
/// `(namespace, collection_id, id)` and carries the HLC triple that
/// arbitrates last-writer-wins replacement.
///
/// A logically deleted row is a *tombstone*: `tombstone` is true and
/// `data` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    /// Partition scope this row belongs to.
    pub namespace: String,
    /// Logical table name.
    pub collection_id: String,
    /// Row identifier within the collection.
    pub id: String,
    /// Optional one-to-many grouping key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Opaque JSON payload. `None` iff `tombstone` is true.
    #[serde(default)]
    pub data: Option<Value>,
    /// Soft-delete marker.
    pub tombstone: bool,
    /// Optional transaction grouping label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    /// Optional schema version of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    /// Server-assigned commit time in milliseconds; 0 until assigned.
    pub committed_timestamp_ms: u64,
    /// The HLC triple that wrote this row.
    #[serde(flatten)]
    pub hlc: Hlc,
}

impl Row {
    /// Creates a live row carrying a payload.
    pub fn live(
        namespace: impl Into<String>,
        collection_id: impl Into<String>,
        id: impl Into<String>,
        data: Value,
        hlc: Hlc,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            collection_id: collection_id.into(),
            id: id.into(),
            parent_id: None,
            data: Some(data),
            tombstone: false,
            tx_id: None,
            schema_version: None,
            committed_timestamp_ms: 0,
            hlc,
        }
    }

    /// Creates a tombstone row.
    pub fn tombstone(
        namespace: impl Into<String>,
        collection_id: impl Into<String>,
        id: impl Into<String>,
        hlc: Hlc,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            collection_id: collection_id.into(),
            id: id.into(),
            parent_id: None,
            data: None,
            tombstone: true,
            tx_id: None,
            schema_version: None,
            committed_timestamp_ms: 0,
            hlc,
        }
    }

    /// Sets the parent id.
    #[must_use]
    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Sets the transaction label.
    #[must_use]
    pub fn with_tx(mut self, tx_id: Option<String>) -> Self {
        self.tx_id = tx_id;
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn with_schema_version(mut self, schema_version: Option<u32>) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// Validates the envelope invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidRow`] when the namespace is empty
    /// or the payload disagrees with the tombstone flag, and
    /// [`ProtocolError::InvalidHlc`] when the clock is malformed.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.namespace.is_empty() {
            return Err(ProtocolError::invalid_row("empty namespace"));
        }
        if self.tombstone && self.data.is_some() {
            return Err(ProtocolError::invalid_row("tombstone row carries data"));
        }
        if !self.tombstone && self.data.is_none() {
            return Err(ProtocolError::invalid_row("live row missing data"));
        }
        self.hlc.validate()
    }
}
