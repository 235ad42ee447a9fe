//! Bounded background worker pool for cache rebuilds.
//!
//! Logical-expiration reads never wait for the store of record; they hand
//! the rebuild to this pool and return the stale value. A fixed worker
//! count caps concurrent backing-store load no matter how many keys expire
//! at once, and the bounded queue keeps a backlog from growing without
//! limit. A skipped rebuild is retried by whichever reader next observes
//! the stale entry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

type RebuildJob = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Fixed-size pool of rebuild workers.
#[derive(Debug)]
pub struct RebuildPool {
    tx: mpsc::Sender<RebuildJob>,
}

impl RebuildPool {
    /// Spawn `workers` worker tasks sharing a queue of depth `queue_depth`.
    ///
    /// Must be called from within a Tokio runtime. Workers exit once the
    /// pool is dropped and the queue drained.
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RebuildJob>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                tracing::debug!(worker, "rebuild worker stopped");
            });
        }

        Self { tx }
    }

    /// Enqueue a rebuild without blocking.
    ///
    /// Returns `false` when the queue is full (or the pool is shutting
    /// down); the caller must then release any lock it acquired for the
    /// rebuild.
    pub fn try_submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx.try_send(Box::pin(job)).is_ok()
    }
}
