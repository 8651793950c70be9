//! Pending operations for the local push log.

use crate::hlc::Hlc;
use crate::row::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shared fields of every pending operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecord {
    /// Partition scope of the target row.
    pub namespace: String,
    /// Logical table name.
    pub collection_id: String,
    /// Row identifier within the collection.
    pub id: String,
    /// Optional one-to-many grouping key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Optional transaction grouping label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    /// Optional schema version of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    /// The HLC triple stamped on the local write.
    #[serde(flatten)]
    pub hlc: Hlc,
    /// Strictly monotonic local sequence number, starting at 1.
    pub sequence: u64,
}

/// A local write awaiting acknowledgement from the server.
///
/// Pending operations mirror the row the local apply produced: the HLC
/// triple is identical to the stored row's, and sequences are strictly
/// increasing for the lifetime of the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum PendingOp {
    /// A row upsert.
    #[serde(rename = "put")]
    Put {
        /// Identity, clock, and sequence of the write.
        #[serde(flatten)]
        record: PendingRecord,
        /// The payload that was written.
        data: Value,
    },
    /// A tombstone write.
    #[serde(rename = "delete")]
    Delete {
        /// Identity, clock, and sequence of the write.
        #[serde(flatten)]
        record: PendingRecord,
    },
}

impl PendingOp {
    /// Builds the pending entry describing an applied local row.
    pub fn from_row(row: &Row, sequence: u64) -> Self {
        let record = PendingRecord {
            namespace: row.namespace.clone(),
            collection_id: row.collection_id.clone(),
            id: row.id.clone(),
            parent_id: row.parent_id.clone(),
            tx_id: row.tx_id.clone(),
            schema_version: row.schema_version,
            hlc: row.hlc.clone(),
            sequence,
        };
        match &row.data {
            Some(data) if !row.tombstone => Self::Put {
                record,
                data: data.clone(),
            },
            _ => Self::Delete { record },
        }
    }

    /// Returns the shared record fields.
    pub fn record(&self) -> &PendingRecord {
        match self {
            Self::Put { record, .. } | Self::Delete { record } => record,
        }
    }

    /// Returns the local sequence number.
    pub fn sequence(&self) -> u64 {
        self.record().sequence
    }

    /// Returns the HLC triple of the write.
    pub fn hlc(&self) -> &Hlc {
        &self.record().hlc
    }

    /// Returns true for `Put` operations.
    pub fn is_put(&self) -> bool {
        matches!(self, Self::Put { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(seq: u64) -> PendingRecord {
        PendingRecord {
            namespace: "app".into(),
            collection_id: "books".into(),
            id: "b1".into(),
            parent_id: None,
            tx_id: None,
            schema_version: None,
            hlc: Hlc::new(1000, 0, "deviceA"),
            sequence: seq,
        }
    }

    #[test]
    fn put_wire_shape() {
        let op = PendingOp::Put {
            record: record(1),
            data: json!({"title": "Dune"}),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "put");
        assert_eq!(json["collectionId"], "books");
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["hlcDeviceId"], "deviceA");
        assert_eq!(json["data"]["title"], "Dune");

        let back: PendingOp = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn delete_wire_shape() {
        let op = PendingOp::Delete { record: record(2) };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "delete");
        assert!(json.get("data").is_none());

        let back: PendingOp = serde_json::from_value(json).unwrap();
        assert!(!back.is_put());
        assert_eq!(back.sequence(), 2);
    }

    #[test]
    fn from_live_row_is_put() {
        let row = Row::live(
            "app",
            "books",
            "b1",
            json!({"title": "Dune"}),
            Hlc::new(1000, 0, "deviceA"),
        );
        let op = PendingOp::from_row(&row, 7);
        assert!(op.is_put());
        assert_eq!(op.sequence(), 7);
        assert_eq!(op.hlc(), &row.hlc);
    }

    #[test]
    fn from_tombstone_row_is_delete() {
        let row = Row::tombstone("app", "books", "b1", Hlc::new(1000, 1, "deviceA"))
            .with_parent(Some("shelf1".into()));
        let op = PendingOp::from_row(&row, 8);
        assert!(!op.is_put());
        assert_eq!(op.record().parent_id.as_deref(), Some("shelf1"));
    }
}
