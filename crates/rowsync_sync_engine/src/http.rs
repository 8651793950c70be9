//! Reference HTTP binding for the sync transport.
//!
//! The actual HTTP client is abstracted behind [`HttpClient`] so this
//! crate carries no network stack; applications plug in whichever
//! client they already ship.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use rowsync_core::{ListenerSet, Subscription};
use rowsync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse, ServerEvent};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A minimal HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait over the application's HTTP library. For cookie
/// auth the client must send credentials itself (ambient cookie jar);
/// bearer tokens are injected per request by the transport.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body.
    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<HttpResponse, String>;
}

/// How requests are authenticated.
#[derive(Clone)]
pub enum AuthMode {
    /// Credentials ride in cookies managed by the client.
    Cookie,
    /// A bearer token is fetched per request and sent in the
    /// `Authorization` header. `None` sends the request unauthenticated.
    Bearer(Arc<dyn Fn() -> Option<String> + Send + Sync>),
}

impl std::fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cookie => write!(f, "Cookie"),
            Self::Bearer(_) => write!(f, "Bearer(..)"),
        }
    }
}

/// HTTP-based sync transport.
///
/// Wire shapes:
/// - `GET {base}/sync/pull?limit=..&cursorCommittedTimestampMs=..&
///   cursorCollectionId=..&cursorId=..` returning
///   `{changes, nextCursor?, hasMore}`
/// - `POST {base}/sync/push` with `{operations, namespace?}` returning
///   `{acknowledgedThroughSequence?}`
///
/// A 401 or 403 emits [`ServerEvent::NeedsAuth`] to event subscribers
/// and fails the call with [`SyncError::Unauthorized`].
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    auth: AuthMode,
    namespace: Option<String>,
    events: ListenerSet<ServerEvent>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport with cookie auth.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            auth: AuthMode::Cookie,
            namespace: None,
            events: ListenerSet::new(),
        }
    }

    /// Sets the auth mode.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    /// Scopes all requests to a namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        match &self.auth {
            AuthMode::Cookie => Vec::new(),
            AuthMode::Bearer(token) => match token() {
                Some(token) => vec![("Authorization".to_string(), format!("Bearer {token}"))],
                None => Vec::new(),
            },
        }
    }

    /// Maps transport-level failures and decodes the body.
    fn handle_response<T: DeserializeOwned>(
        &self,
        path: &str,
        expected: &str,
        result: Result<HttpResponse, String>,
    ) -> SyncResult<T> {
        let response = result.map_err(SyncError::network)?;

        if response.status == 401 || response.status == 403 {
            self.events.emit(&ServerEvent::NeedsAuth);
            return Err(SyncError::Unauthorized);
        }
        if !response.is_success() {
            return Err(SyncError::Transport {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        serde_json::from_slice(&response.body)
            .map_err(|_| SyncError::protocol(path, expected))
    }

    fn pull_url(&self, request: &PullRequest) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("limit", &request.limit.to_string());
        if let Some(collection_id) = &request.collection_id {
            query.append_pair("collectionId", collection_id);
        }
        if let Some(parent_id) = &request.parent_id {
            query.append_pair("parentId", parent_id);
        }
        if let Some(namespace) = request.namespace.as_ref().or(self.namespace.as_ref()) {
            query.append_pair("namespace", namespace);
        }
        if let Some(cursor) = &request.cursor {
            // The three cursor parameters travel together or not at all.
            query.append_pair(
                "cursorCommittedTimestampMs",
                &cursor.committed_timestamp_ms.to_string(),
            );
            query.append_pair("cursorCollectionId", &cursor.collection_id);
            query.append_pair("cursorId", &cursor.id);
        }
        format!("{}/sync/pull?{}", self.base_url, query.finish())
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let mut request = request.clone();
        if request.namespace.is_none() {
            request.namespace = self.namespace.clone();
        }

        let body = serde_json::to_vec(&request)
            .map_err(|e| SyncError::network(format!("failed to encode push request: {e}")))?;

        let mut headers = self.auth_headers();
        headers.push(("Content-Type".to_string(), "application/json".to_string()));

        let url = format!("{}/sync/push", self.base_url);
        let result = self.client.post(&url, &headers, body);
        self.handle_response(
            "/sync/push",
            "object with optional acknowledgedThroughSequence",
            result,
        )
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let url = self.pull_url(request);
        let result = self.client.get(&url, &self.auth_headers());
        self.handle_response(
            "/sync/pull",
            "object with changes, optional nextCursor, hasMore",
            result,
        )
    }

    fn subscribe_events(
        &self,
        listener: Box<dyn Fn(&ServerEvent) + Send + Sync>,
    ) -> Subscription {
        self.events.subscribe(move |event| listener(event))
    }
}
