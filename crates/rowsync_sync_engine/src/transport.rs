//! Transport layer abstraction for sync operations.

use crate::error::SyncResult;
use parking_lot::Mutex;
use rowsync_core::{ListenerSet, Subscription};
use rowsync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse, ServerEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A sync transport handles communication with the sync server.
///
/// This trait abstracts the wire, allowing different implementations
/// (HTTP, WebSocket, loopback for testing). Implementations should set
/// reasonable upstream timeouts; the sync loop never cancels an
/// in-flight call.
pub trait SyncTransport: Send + Sync {
    /// Pushes pending operations to the server.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Pulls changed rows from the server.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Registers a listener for server-pushed events; dropping the
    /// handle unsubscribes.
    fn subscribe_events(
        &self,
        listener: Box<dyn Fn(&ServerEvent) + Send + Sync>,
    ) -> Subscription;
}

/// A scripted transport for testing.
///
/// Responses are queued per endpoint and consumed in order; when a
/// queue runs dry the mock answers with a benign default (full
/// acknowledgement, empty final page). Every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    push_responses: Mutex<VecDeque<PushResponse>>,
    pull_responses: Mutex<VecDeque<PullResponse>>,
    push_requests: Mutex<Vec<PushRequest>>,
    pull_requests: Mutex<Vec<PullRequest>>,
    pull_delay: Mutex<Option<Duration>>,
    pulls_in_flight: AtomicUsize,
    max_concurrent_pulls: AtomicUsize,
    events: ListenerSet<ServerEvent>,
}

impl MockTransport {
    /// Creates a mock with empty scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a push response.
    pub fn queue_push_response(&self, response: PushResponse) {
        self.push_responses.lock().push_back(response);
    }

    /// Queues a pull response page.
    pub fn queue_pull_response(&self, response: PullResponse) {
        self.pull_responses.lock().push_back(response);
    }

    /// Makes every pull sleep for `delay` before answering.
    pub fn set_pull_delay(&self, delay: Duration) {
        *self.pull_delay.lock() = Some(delay);
    }

    /// Returns all recorded push requests.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.push_requests.lock().clone()
    }

    /// Returns all recorded pull requests.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    /// Returns the highest number of pulls observed in flight at once.
    pub fn max_concurrent_pulls(&self) -> usize {
        self.max_concurrent_pulls.load(Ordering::SeqCst)
    }

    /// Emits a server event to all subscribers.
    pub fn emit_event(&self, event: &ServerEvent) {
        self.events.emit(event);
    }
}

impl SyncTransport for MockTransport {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.push_requests.lock().push(request.clone());
        let scripted = self.push_responses.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| {
            // Default: acknowledge everything that was sent.
            match request.operations.last() {
                Some(op) => PushResponse::acknowledged(op.sequence()),
                None => PushResponse::unacknowledged(),
            }
        }))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let in_flight = self.pulls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_pulls
            .fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = *self.pull_delay.lock() {
            std::thread::sleep(delay);
        }

        self.pull_requests.lock().push(request.clone());
        let scripted = self.pull_responses.lock().pop_front();

        self.pulls_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(scripted.unwrap_or_else(PullResponse::empty))
    }

    fn subscribe_events(
        &self,
        listener: Box<dyn Fn(&ServerEvent) + Send + Sync>,
    ) -> Subscription {
        self.events.subscribe(move |event| listener(event))
    }
}
