//! Pull cursors.

use serde::{Deserialize, Serialize};

/// A marker for the last committed position a client has pulled.
///
/// Cursors order lexicographically by `(committed_timestamp_ms,
/// collection_id, id)`; the derived `Ord` relies on that field order.
/// The server issues cursors and the client stores the latest one
/// verbatim, so the tuple is opaque apart from this ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    /// Server-assigned commit time of the last pulled row.
    pub committed_timestamp_ms: u64,
    /// Collection of the last pulled row.
    pub collection_id: String,
    /// Id of the last pulled row.
    pub id: String,
}

impl SyncCursor {
    /// Creates a new cursor.
    pub fn new(
        committed_timestamp_ms: u64,
        collection_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            committed_timestamp_ms,
            collection_id: collection_id.into(),
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_order() {
        let a = SyncCursor::new(100, "books", "b1");
        let b = SyncCursor::new(100, "books", "b2");
        let c = SyncCursor::new(100, "notes", "a0");
        let d = SyncCursor::new(101, "aaaa", "a0");

        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn json_shape() {
        let cursor = SyncCursor::new(100, "books", "b1");
        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(json["committedTimestampMs"], 100);
        assert_eq!(json["collectionId"], "books");
        assert_eq!(json["id"], "b1");

        let back: SyncCursor = serde_json::from_value(json).unwrap();
        assert_eq!(back, cursor);
    }

    #[test]
    fn malformed_json_rejected() {
        let missing: Result<SyncCursor, _> =
            serde_json::from_str(r#"{"committedTimestampMs": 1}"#);
        assert!(missing.is_err());

        let wrong_type: Result<SyncCursor, _> = serde_json::from_str(
            r#"{"committedTimestampMs": "1", "collectionId": "c", "id": "x"}"#,
        );
        assert!(wrong_type.is_err());
    }
}
