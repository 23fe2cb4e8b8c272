//! Cache engine
//!
//! Generic queue -> swap -> background execute -> notify machinery shared by
//! every cache table. Callers enqueue without touching storage; `sync()`
//! detaches the queue into a snapshot and hands it to the cache's worker,
//! which owns the only storage connection.

mod entity;
mod executor;
mod queue;
mod status;
mod worker;

pub use entity::CacheEntity;
pub use queue::{PendingOperations, Snapshot};
pub use status::{PassStatus, StatusTracker};

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::config::{DatabaseConfig, TableConfig};
use crate::data::{AccountId, Database};
use crate::error::{CacheError, Result};
use crate::metrics;
use crate::storage::SideResources;
use executor::Executor;
use worker::Job;

const EVENT_CAPACITY: usize = 64;

/// Read criteria: optional group filter and row limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadQuery {
    pub group: Option<AccountId>,
    pub limit: Option<u32>,
}

impl ReadQuery {
    /// Every row in the table
    pub fn all() -> Self {
        Self::default()
    }

    pub fn group(group: AccountId) -> Self {
        Self {
            group: Some(group),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Emitted exactly once per completed pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    WriteFinished { pass: u64, status: PassStatus },
    QueryFinished { pass: u64, status: PassStatus },
}

impl CacheEvent {
    pub fn status(&self) -> PassStatus {
        match self {
            Self::WriteFinished { status, .. } | Self::QueryFinished { status, .. } => *status,
        }
    }
}

struct CacheState<E: CacheEntity> {
    pending: PendingOperations<E>,
    results: Arc<Vec<E::Record>>,
    criteria: ReadQuery,
}

/// State shared between the engine handle and its worker
pub(crate) struct Shared<E: CacheEntity> {
    name: String,
    state: Mutex<CacheState<E>>,
    write_status: StatusTracker,
    read_status: StatusTracker,
    events: broadcast::Sender<CacheEvent>,
}

impl<E: CacheEntity> Shared<E> {
    fn lock(&self) -> MutexGuard<'_, CacheState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One cache table with its queue, result set and worker
///
/// Dropping the handle waits for every submitted pass when it runs on a
/// multi-thread runtime or outside any runtime. On a current-thread runtime
/// it cannot block; the passes then finish in the background.
pub struct CacheEngine<E: CacheEntity> {
    shared: Arc<Shared<E>>,
    jobs: mpsc::UnboundedSender<Job<E>>,
    /// `None` once the worker has been told to stop
    worker: Option<JoinHandle<()>>,
}

impl<E: CacheEntity> CacheEngine<E> {
    /// Open a cache over `table` in the database at `database.path`.
    ///
    /// The connection is established lazily by the worker on the first
    /// pass, so an unreachable store shows up as a failed pass rather than
    /// an error here.
    pub async fn open(
        database: &DatabaseConfig,
        table: TableConfig,
        side_resources: Arc<dyn SideResources>,
    ) -> Result<Self> {
        table.validate()?;
        let db = Database::open_lazy(database)?;

        let name = table.table.clone();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            name: name.clone(),
            state: Mutex::new(CacheState {
                pending: PendingOperations::default(),
                results: Arc::new(Vec::new()),
                criteria: ReadQuery::default(),
            }),
            write_status: StatusTracker::new(),
            read_status: StatusTracker::new(),
            events,
        });

        let executor = Executor::new(db, table, side_resources);
        let (jobs, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(worker::run(shared.clone(), executor, receiver));

        tracing::info!(cache = %name, path = %database.path.display(), "Cache opened");

        Ok(Self {
            shared,
            jobs,
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    pub fn enqueue_insert(&self, record: E::Record) {
        let group = E::group_key(&record);
        self.with_pending(|pending| pending.insert(group, record));
    }

    pub fn enqueue_remove(&self, key: impl Into<String>) {
        let key = key.into();
        self.with_pending(|pending| pending.remove(key));
    }

    pub fn enqueue_remove_group(&self, group: AccountId) {
        self.with_pending(|pending| pending.remove_group(group));
    }

    pub fn enqueue_field_update(&self, key: impl Into<String>, field: E::Field, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.with_pending(|pending| pending.update_field(key, field, value));
    }

    /// Operations queued since the last `sync()`
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    fn with_pending(&self, f: impl FnOnce(&mut PendingOperations<E>)) {
        let mut state = self.shared.lock();
        f(&mut state.pending);
        metrics::CACHE_PENDING_OPERATIONS
            .with_label_values(&[&self.shared.name])
            .set(state.pending.len() as i64);
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Detach everything queued so far and schedule one write pass.
    ///
    /// Returns the pass number. An empty queue still produces a pass.
    pub fn sync(&self) -> u64 {
        let mut state = self.shared.lock();
        let snapshot = state.pending.take();
        let operations = snapshot.len();
        // Submitted under the lock so pass numbers follow channel order
        let pass = self.shared.write_status.submit();

        if self.jobs.send(Job::Write { pass, snapshot }).is_err() {
            tracing::error!(cache = %self.shared.name, pass, "Worker gone, dropping write pass");
            self.shared.write_status.begin();
            self.shared.write_status.finish(PassStatus::Error);
        } else {
            tracing::debug!(cache = %self.shared.name, pass, operations, "Write pass submitted");
        }

        metrics::CACHE_PENDING_OPERATIONS
            .with_label_values(&[&self.shared.name])
            .set(0);
        pass
    }

    /// Store `query` as the current criteria and schedule a read pass.
    pub fn query(&self, query: ReadQuery) -> u64 {
        let mut state = self.shared.lock();
        state.criteria = query;
        self.submit_read(query)
    }

    /// Re-run the last query.
    pub fn refresh(&self) -> u64 {
        let state = self.shared.lock();
        self.submit_read(state.criteria)
    }

    /// Caller holds the state lock.
    fn submit_read(&self, query: ReadQuery) -> u64 {
        let pass = self.shared.read_status.submit();
        if self.jobs.send(Job::Read { pass, query }).is_err() {
            tracing::error!(cache = %self.shared.name, pass, "Worker gone, dropping read pass");
            self.shared.read_status.begin();
            self.shared.read_status.finish(PassStatus::Error);
        }
        pass
    }

    /// Records from the last successful read pass
    pub fn results(&self) -> Arc<Vec<E::Record>> {
        self.shared.lock().results.clone()
    }

    /// Criteria of the last `query()`
    pub fn criteria(&self) -> ReadQuery {
        self.shared.lock().criteria
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn write_status(&self) -> PassStatus {
        self.shared.write_status.status()
    }

    pub fn read_status(&self) -> PassStatus {
        self.shared.read_status.status()
    }

    /// Read and write passes submitted but not yet terminal
    pub fn pending_passes(&self) -> u64 {
        self.shared.write_status.in_flight() + self.shared.read_status.in_flight()
    }

    /// Resolve once every read and write pass submitted before the call is
    /// terminal.
    pub async fn wait(&self) {
        self.shared.write_status.wait().await;
        self.shared.read_status.wait().await;
    }

    pub async fn wait_for_writes(&self) {
        self.shared.write_status.wait().await;
    }

    pub async fn wait_for_reads(&self) {
        self.shared.read_status.wait().await;
    }

    /// Blocking variant of [`wait`](Self::wait) for synchronous callers.
    ///
    /// Must not be called from a thread driving the cache's runtime.
    pub fn wait_blocking(&self) {
        futures::executor::block_on(self.wait());
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.shared.events.subscribe()
    }

    /// Event stream; lagged receivers skip what they missed.
    pub fn events(&self) -> impl Stream<Item = CacheEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok())
    }

    // =========================================================================
    // Direct lookups and maintenance
    // =========================================================================

    /// Run `query` on the worker and return the rows without touching the
    /// result set.
    pub async fn fetch(&self, query: ReadQuery) -> Result<Vec<E::Record>> {
        let (reply, response) = oneshot::channel();
        self.request(Job::Fetch { query, reply }, response).await
    }

    pub async fn fetch_one(&self, key: impl Into<String>) -> Result<Option<E::Record>> {
        let (reply, response) = oneshot::channel();
        let key = key.into();
        self.request(Job::FetchOne { key, reply }, response).await
    }

    /// Drop and recreate the table. Queued passes run first.
    pub async fn reset(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(Job::Reset { reply }, response).await?;
        self.shared.lock().results = Arc::new(Vec::new());
        Ok(())
    }

    async fn request<T>(&self, job: Job<E>, response: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.jobs.send(job).map_err(|_| CacheError::Closed)?;
        response.await.map_err(|_| CacheError::Closed)?
    }

    /// Finish every submitted pass, stop the worker and close the pool.
    ///
    /// Operations still queued without a `sync()` are discarded.
    pub async fn close(mut self) -> Result<()> {
        let Some(worker) = self.stop_worker() else {
            return Ok(());
        };
        worker
            .await
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("cache worker failed: {e}")))?;

        tracing::info!(cache = %self.shared.name, "Cache closed");
        Ok(())
    }

    /// Queue a shutdown behind every submitted job and hand back the worker.
    fn stop_worker(&mut self) -> Option<JoinHandle<()>> {
        let worker = self.worker.take()?;

        let discarded = self.shared.lock().pending.len();
        if discarded > 0 {
            tracing::warn!(cache = %self.shared.name, discarded, "Closing with unsynced operations");
        }

        // Fails only if the worker is already gone
        let _ = self.jobs.send(Job::Shutdown);
        Some(worker)
    }
}

impl<E: CacheEntity> Drop for CacheEngine<E> {
    fn drop(&mut self) {
        let Some(worker) = self.stop_worker() else {
            return;
        };
        if worker.is_finished() {
            return;
        }

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                let _ = tokio::task::block_in_place(|| handle.block_on(worker));
            }
            Ok(_) => {
                tracing::warn!(
                    cache = %self.shared.name,
                    pending_passes = self.pending_passes(),
                    "Cache dropped on a current-thread runtime, passes finish in the background"
                );
            }
            Err(_) => {
                let _ = futures::executor::block_on(worker);
            }
        }
    }
}
