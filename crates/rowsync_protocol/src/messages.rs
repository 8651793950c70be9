//! Wire messages exchanged with the sync server.

use crate::cursor::SyncCursor;
use crate::operation::PendingOp;
use crate::row::Row;
use serde::{Deserialize, Serialize};

/// Request body for pushing pending operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Pending operations in ascending sequence order.
    pub operations: Vec<PendingOp>,
    /// Optional namespace scope for multi-tenant servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Server response to a push.
///
/// An absent acknowledgement means "no progress, retry later"; the
/// server acknowledges monotonically through some sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Highest local sequence the server has durably accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_through_sequence: Option<u64>,
}

impl PushResponse {
    /// A response acknowledging through the given sequence.
    pub fn acknowledged(sequence: u64) -> Self {
        Self {
            acknowledged_through_sequence: Some(sequence),
        }
    }

    /// A response acknowledging nothing.
    pub fn unacknowledged() -> Self {
        Self::default()
    }
}

/// Request parameters for an incremental pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Resume position; absent on the first pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<SyncCursor>,
    /// Maximum number of rows to return, at least 1.
    pub limit: u32,
    /// Optional filter to a single collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// Optional filter to a parent group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Optional namespace scope for multi-tenant servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl PullRequest {
    /// Creates a pull request with only a cursor and limit.
    pub fn new(cursor: Option<SyncCursor>, limit: u32) -> Self {
        Self {
            cursor,
            limit,
            collection_id: None,
            parent_id: None,
            namespace: None,
        }
    }
}

/// Server response to a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Changed rows ordered by the cursor tuple.
    pub changes: Vec<Row>,
    /// Cursor to resume from, when the server advanced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<SyncCursor>,
    /// Whether more pages are available.
    pub has_more: bool,
}

impl PullResponse {
    /// Creates a pull response.
    pub fn new(changes: Vec<Row>, next_cursor: Option<SyncCursor>, has_more: bool) -> Self {
        Self {
            changes,
            next_cursor,
            has_more,
        }
    }

    /// An empty final page.
    pub fn empty() -> Self {
        Self::new(Vec::new(), None, false)
    }
}

/// An asynchronous event pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Rows changed on the server; apply them like a pull page.
    #[serde(rename_all = "camelCase")]
    ServerChanges {
        /// The changed rows.
        changes: Vec<Row>,
    },
    /// The server requires (re-)authentication.
    NeedsAuth,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hlc::Hlc;
    use serde_json::json;

    fn row() -> Row {
        Row::live(
            "app",
            "books",
            "b1",
            json!({"title": "Dune"}),
            Hlc::new(1000, 0, "deviceA"),
        )
    }

    #[test]
    fn push_response_shapes() {
        let acked = PushResponse::acknowledged(7);
        let json = serde_json::to_value(&acked).unwrap();
        assert_eq!(json["acknowledgedThroughSequence"], 7);

        let empty = PushResponse::unacknowledged();
        let json = serde_json::to_value(&empty).unwrap();
        assert_eq!(json, json!({}));

        let back: PushResponse = serde_json::from_value(json!({})).unwrap();
        assert!(back.acknowledged_through_sequence.is_none());
    }

    #[test]
    fn pull_response_roundtrip() {
        let resp = PullResponse::new(
            vec![row()],
            Some(SyncCursor::new(50, "books", "b1")),
            true,
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["hasMore"], true);
        assert_eq!(json["nextCursor"]["committedTimestampMs"], 50);
        assert_eq!(json["changes"][0]["collectionId"], "books");

        let back: PullResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, resp);
    }

    #[test]
    fn server_event_tags() {
        let event = ServerEvent::ServerChanges {
            changes: vec![row()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "serverChanges");

        let auth = serde_json::to_value(&ServerEvent::NeedsAuth).unwrap();
        assert_eq!(auth["type"], "needsAuth");

        let back: ServerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
