//! Per-client request queues
//!
//! Every outbound request passes through its client's queue. The stdio
//! queue runs at concurrency 1 — the pipe has one reader and one writer,
//! and interleaving requests corrupts framing — while the HTTP queue runs
//! at concurrency 5 for fairness and bounded upstream pressure. Acquisition
//! is FIFO (tokio's semaphore is fair), and clearing the queue fails
//! waiters with a "client closed" error instead of dropping them.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{ClientError, ClientResult};

/// Queue concurrency for stdio clients; serialization is a correctness
/// property of the single-pipe JSON-RPC transport.
pub const STDIO_CONCURRENCY: usize = 1;

/// Queue concurrency for HTTP clients
pub const HTTP_CONCURRENCY: usize = 5;

/// A FIFO request queue with bounded concurrency
#[derive(Debug, Clone)]
pub struct RequestQueue {
    semaphore: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RequestQueue {
    pub fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run an operation under the queue's concurrency limit.
    ///
    /// The operation counts as pending from the moment it is enqueued until
    /// it finishes, whether it ran or was failed by `clear`.
    pub async fn run<F, T>(&self, operation: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let _guard = PendingGuard(self.pending.clone());

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ClientError::Closed)?;
        operation.await
    }

    /// Number of requests queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether any request is queued or running
    pub fn has_pending_requests(&self) -> bool {
        self.pending() > 0
    }

    /// Close the queue. Waiters and future callers fail with
    /// [`ClientError::Closed`]; nothing is silently dropped.
    pub fn clear(&self) {
        self.semaphore.close();
    }
}
