//! Per-cache background worker
//!
//! Drains the job channel one job at a time, so read and write passes never
//! overlap and execute in submission order. A `Shutdown` job (or a closed
//! channel) ends the loop after every job queued before it, then the pool is
//! closed.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

use super::executor::Executor;
use super::queue::Snapshot;
use super::status::PassStatus;
use super::{CacheEntity, CacheEvent, ReadQuery, Shared};
use crate::error::Result;
use crate::metrics;

/// Unit of work for the worker
pub(crate) enum Job<E: CacheEntity> {
    Write {
        pass: u64,
        snapshot: Snapshot<E>,
    },
    Read {
        pass: u64,
        query: ReadQuery,
    },
    Fetch {
        query: ReadQuery,
        reply: oneshot::Sender<Result<Vec<E::Record>>>,
    },
    FetchOne {
        key: String,
        reply: oneshot::Sender<Result<Option<E::Record>>>,
    },
    Reset {
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

pub(crate) async fn run<E: CacheEntity>(
    shared: Arc<Shared<E>>,
    mut executor: Executor<E>,
    mut jobs: mpsc::UnboundedReceiver<Job<E>>,
) {
    tracing::debug!(cache = %shared.name, table = executor.table(), "Cache worker started");

    while let Some(job) = jobs.recv().await {
        match job {
            Job::Write { pass, snapshot } => write_pass(&shared, &mut executor, pass, snapshot).await,
            Job::Read { pass, query } => read_pass(&shared, &mut executor, pass, query).await,
            Job::Fetch { query, reply } => {
                let _ = reply.send(executor.read(&query).await);
            }
            Job::FetchOne { key, reply } => {
                let _ = reply.send(executor.read_one(&key).await);
            }
            Job::Reset { reply } => {
                let result = executor.reset().await;
                match &result {
                    Ok(()) => tracing::info!(cache = %shared.name, "Cache table reset"),
                    Err(e) => tracing::error!(cache = %shared.name, error = %e, "Cache reset failed"),
                }
                let _ = reply.send(result);
            }
            Job::Shutdown => break,
        }
    }

    executor.close().await;
    tracing::debug!(cache = %shared.name, "Cache worker stopped");
}

async fn write_pass<E: CacheEntity>(
    shared: &Shared<E>,
    executor: &mut Executor<E>,
    pass: u64,
    snapshot: Snapshot<E>,
) {
    shared.write_status.begin();
    let operations = snapshot.len();
    let started = Instant::now();

    let status = executor.write(snapshot).await;

    let elapsed = started.elapsed();
    metrics::observe_pass(&shared.name, "write", status.as_str(), elapsed);
    tracing::debug!(
        cache = %shared.name,
        pass,
        operations,
        status = status.as_str(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Write pass complete"
    );

    shared.write_status.finish(status);
    // No subscribers is fine
    let _ = shared.events.send(CacheEvent::WriteFinished { pass, status });
}

async fn read_pass<E: CacheEntity>(
    shared: &Shared<E>,
    executor: &mut Executor<E>,
    pass: u64,
    query: ReadQuery,
) {
    shared.read_status.begin();
    let started = Instant::now();

    let status = match executor.read(&query).await {
        Ok(records) => {
            let count = records.len();
            shared.lock().results = Arc::new(records);
            metrics::CACHE_RESULT_SIZE
                .with_label_values(&[&shared.name])
                .set(count as i64);
            tracing::debug!(cache = %shared.name, pass, ?query, count, "Query finished");
            PassStatus::Finished
        }
        Err(e) => {
            tracing::error!(cache = %shared.name, pass, ?query, error = %e, "Query failed");
            PassStatus::Error
        }
    };

    metrics::observe_pass(&shared.name, "read", status.as_str(), started.elapsed());
    shared.read_status.finish(status);
    let _ = shared.events.send(CacheEvent::QueryFinished { pass, status });
}
