//! The background sync loop.

use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use parking_lot::Mutex;
use rowsync_core::{StorageEngine, Subscription};
use rowsync_protocol::{PullRequest, PushRequest, Row, ServerEvent, SyncCursor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

type ErrorHandler = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// Work items on the loop's serial queue.
enum Job {
    /// Run a push/pull cycle now.
    Cycle,
    /// Apply server-pushed rows.
    ApplyRemote(Vec<Row>),
    /// The connection manager reported a transition.
    ConnectionChanged(ConnectionState),
    /// The transport reported that authentication is required.
    AuthRequired,
    /// Shut the worker down.
    Stop,
}

struct Shared {
    config: SyncConfig,
    engine: Arc<StorageEngine>,
    transport: Arc<dyn SyncTransport>,
    connection: Arc<ConnectionManager>,
    on_error: Mutex<Option<ErrorHandler>>,
    started: AtomicBool,
    cycle_queued: AtomicBool,
}

impl Shared {
    fn report(&self, error: SyncError) {
        tracing::warn!(error = %error, "sync loop error");
        let handler = self.on_error.lock().clone();
        if let Some(handler) = handler {
            handler(&error);
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.get_state() == ConnectionState::Connected
    }
}

/// Handles owned while the loop is running.
struct Runtime {
    sender: Sender<Job>,
    worker: JoinHandle<()>,
    connection_subscription: Subscription,
    event_subscription: Subscription,
}

/// Drives non-overlapping push/pull cycles while the node is connected.
///
/// One worker thread owns all cycle work and server-event applies, so at
/// most one cycle runs at a time and event applies never interleave with
/// push or pull. Within a cycle the push phase completes before the pull
/// phase starts.
///
/// The loop never fails its caller in steady state: cycle errors are
/// reported through the error handler and the next cycle is scheduled at
/// the configured interval, which doubles as the backoff for transient
/// failures.
pub struct SyncLoop {
    shared: Arc<Shared>,
    runtime: Mutex<Option<Runtime>>,
}

impl SyncLoop {
    /// Creates a stopped loop.
    pub fn new(
        config: SyncConfig,
        engine: Arc<StorageEngine>,
        transport: Arc<dyn SyncTransport>,
        connection: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                engine,
                transport,
                connection,
                on_error: Mutex::new(None),
                started: AtomicBool::new(false),
                cycle_queued: AtomicBool::new(false),
            }),
            runtime: Mutex::new(None),
        }
    }

    /// Installs the error handler all steady-state failures flow to.
    #[must_use]
    pub fn with_error_handler(
        self,
        handler: impl Fn(&SyncError) + Send + Sync + 'static,
    ) -> Self {
        *self.shared.on_error.lock() = Some(Arc::new(handler));
        self
    }

    /// Returns true while the loop is running.
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Starts the loop.
    ///
    /// Subscribes to the connection manager and the transport's event
    /// stream; if the node is currently connected an immediate cycle is
    /// enqueued.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::AlreadyStarted`] when called twice.
    pub fn start(&self) -> SyncResult<()> {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return Err(SyncError::AlreadyStarted);
        }

        self.shared.started.store(true, Ordering::SeqCst);
        self.shared.cycle_queued.store(false, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel();

        let connection_sender = sender.clone();
        let connection_subscription = self.shared.connection.subscribe(move |state| {
            let _ = connection_sender.send(Job::ConnectionChanged(*state));
        });

        let event_sender = sender.clone();
        let event_subscription =
            self.shared
                .transport
                .subscribe_events(Box::new(move |event| {
                    let job = match event {
                        ServerEvent::ServerChanges { changes } => {
                            Job::ApplyRemote(changes.clone())
                        }
                        ServerEvent::NeedsAuth => Job::AuthRequired,
                    };
                    let _ = event_sender.send(job);
                }));

        let worker_shared = Arc::clone(&self.shared);
        let worker = match std::thread::Builder::new()
            .name("rowsync-sync-loop".to_string())
            .spawn(move || Worker::new(worker_shared, receiver).run())
        {
            Ok(worker) => worker,
            Err(e) => {
                self.shared.started.store(false, Ordering::SeqCst);
                return Err(SyncError::network(format!(
                    "failed to spawn sync worker: {e}"
                )));
            }
        };

        if self.shared.is_connected() && !self.shared.cycle_queued.swap(true, Ordering::SeqCst) {
            let _ = sender.send(Job::Cycle);
        }

        *runtime = Some(Runtime {
            sender,
            worker,
            connection_subscription,
            event_subscription,
        });
        Ok(())
    }

    /// Stops the loop.
    ///
    /// Unsubscribes from the connection manager and the event stream,
    /// lets queued work drain, and joins the worker. An in-flight cycle
    /// runs to completion.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::NotStarted`] when the loop is not running.
    pub fn stop(&self) -> SyncResult<()> {
        let mut runtime = self.runtime.lock();
        let Some(runtime) = runtime.take() else {
            return Err(SyncError::NotStarted);
        };

        self.shared.started.store(false, Ordering::SeqCst);
        let Runtime {
            sender,
            worker,
            connection_subscription,
            event_subscription,
        } = runtime;
        // Detach the feeds before shutting down so nothing re-enqueues.
        connection_subscription.unsubscribe();
        event_subscription.unsubscribe();
        let _ = sender.send(Job::Stop);
        let _ = worker.join();
        Ok(())
    }
}

impl Drop for SyncLoop {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// The loop's single worker thread.
struct Worker {
    shared: Arc<Shared>,
    receiver: Receiver<Job>,
    /// When the next timer-driven cycle fires; `None` while disconnected
    /// or blocked on authentication.
    deadline: Option<Instant>,
    /// Set when the server demanded re-authentication; cleared on the
    /// next transition into `Connected`.
    auth_blocked: bool,
}

impl Worker {
    fn new(shared: Arc<Shared>, receiver: Receiver<Job>) -> Self {
        Self {
            shared,
            receiver,
            deadline: None,
            auth_blocked: false,
        }
    }

    fn run(mut self) {
        loop {
            let Some(job) = self.next_job() else { return };
            match job {
                Job::Stop => return,
                Job::Cycle => {
                    self.shared.cycle_queued.store(false, Ordering::SeqCst);
                    self.run_cycle();
                }
                Job::ApplyRemote(rows) => {
                    if let Err(error) = self.shared.engine.apply_remote(&rows) {
                        self.shared.report(error.into());
                    }
                }
                Job::ConnectionChanged(state) => {
                    self.deadline = None;
                    if state == ConnectionState::Connected {
                        self.auth_blocked = false;
                        self.run_cycle();
                    }
                }
                Job::AuthRequired => {
                    self.auth_blocked = true;
                    self.deadline = None;
                    self.shared.report(SyncError::AuthRequired);
                }
            }
        }
    }

    /// Waits for the next job, firing the interval timer in between.
    fn next_job(&mut self) -> Option<Job> {
        loop {
            match self.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        self.deadline = None;
                        self.run_cycle();
                        continue;
                    }
                    match self.receiver.recv_timeout(deadline - now) {
                        Ok(job) => return Some(job),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => return None,
                    }
                }
                None => return self.receiver.recv().ok(),
            }
        }
    }

    /// Runs one push-then-pull cycle and schedules the next.
    fn run_cycle(&mut self) {
        if !self.shared.started.load(Ordering::SeqCst)
            || self.auth_blocked
            || !self.shared.is_connected()
        {
            return;
        }

        tracing::debug!("sync cycle starting");
        match self.push_phase() {
            Err(error) => self.shared.report(error),
            Ok(()) => {
                // Connectivity may have dropped mid-cycle.
                if self.shared.started.load(Ordering::SeqCst) && self.shared.is_connected() {
                    if let Err(error) = self.pull_phase() {
                        self.shared.report(error);
                    }
                }
            }
        }
        self.deadline = Some(Instant::now() + self.shared.config.interval);
    }

    /// Pushes pending batches until the log drains or progress stalls.
    fn push_phase(&self) -> SyncResult<()> {
        let shared = &self.shared;
        let mut last_first: Option<u64> = None;
        loop {
            let pending = shared.engine.get_pending(shared.config.push_batch_size)?;
            let Some(first) = pending.first().map(|op| op.sequence()) else {
                return Ok(());
            };
            // A batch starting at or before the previous one means the
            // server is not consuming; bail out instead of spinning.
            if last_first.is_some_and(|previous| first <= previous) {
                return Ok(());
            }
            last_first = Some(first);

            let response = shared.transport.push(&PushRequest {
                operations: pending,
                namespace: Some(shared.engine.namespace().to_string()),
            })?;

            match response.acknowledged_through_sequence {
                Some(ack) if ack >= first => {
                    tracing::debug!(ack, "push acknowledged");
                    shared.engine.remove_pending_through(ack)?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Pulls pages until the server reports no more or the cursor stalls.
    fn pull_phase(&self) -> SyncResult<()> {
        let shared = &self.shared;
        let mut cursor = self.load_cursor();
        loop {
            let response = shared.transport.pull(&PullRequest {
                cursor: cursor.clone(),
                limit: shared.config.pull_limit,
                collection_id: None,
                parent_id: None,
                namespace: Some(shared.engine.namespace().to_string()),
            })?;

            if !response.changes.is_empty() {
                shared.engine.apply_remote(&response.changes)?;
            }

            let mut advanced = false;
            if let Some(next) = response.next_cursor {
                if cursor.as_ref() != Some(&next) {
                    let value = serde_json::to_value(&next)
                        .map_err(|e| SyncError::invalid_cursor(e.to_string()))?;
                    shared.engine.put_kv(&shared.config.cursor_key, &value)?;
                    cursor = Some(next);
                    advanced = true;
                }
            }

            // A page that did not advance the cursor would repeat
            // forever against a malformed server.
            if !response.has_more || !advanced {
                return Ok(());
            }
        }
    }

    /// Reads the persisted cursor; a malformed value is reported and
    /// treated as absent (full re-sync).
    fn load_cursor(&self) -> Option<SyncCursor> {
        let shared = &self.shared;
        let value = match shared.engine.get_kv(&shared.config.cursor_key) {
            Ok(value) => value?,
            Err(error) => {
                shared.report(error.into());
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(cursor) => Some(cursor),
            Err(error) => {
                shared.report(SyncError::invalid_cursor(error.to_string()));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ManualDriver;
    use crate::transport::MockTransport;
    use rowsync_core::{EngineConfig, StorageEngine};
    use rowsync_storage::{MemoryStore, RowStore};

    fn make_loop() -> (SyncLoop, Arc<ManualDriver>) {
        let store = Arc::new(MemoryStore::for_namespace("app"));
        let engine = Arc::new(
            StorageEngine::new(
                EngineConfig::new("app", "deviceA"),
                Arc::clone(&store) as Arc<dyn RowStore>,
            )
            .unwrap(),
        );
        let driver = Arc::new(ManualDriver::default());
        let connection = Arc::new(ConnectionManager::new(driver.as_ref()));
        let transport = Arc::new(MockTransport::new());
        let sync_loop = SyncLoop::new(
            SyncConfig::default(),
            engine,
            transport as Arc<dyn SyncTransport>,
            connection,
        );
        (sync_loop, driver)
    }

    #[test]
    fn double_start_fails() {
        let (sync_loop, _driver) = make_loop();
        sync_loop.start().unwrap();
        assert!(matches!(sync_loop.start(), Err(SyncError::AlreadyStarted)));
        sync_loop.stop().unwrap();
    }

    #[test]
    fn stop_without_start_fails() {
        let (sync_loop, _driver) = make_loop();
        assert!(matches!(sync_loop.stop(), Err(SyncError::NotStarted)));
    }

    #[test]
    fn restart_after_stop() {
        let (sync_loop, _driver) = make_loop();
        sync_loop.start().unwrap();
        assert!(sync_loop.is_started());
        sync_loop.stop().unwrap();
        assert!(!sync_loop.is_started());
        sync_loop.start().unwrap();
        sync_loop.stop().unwrap();
    }
}
