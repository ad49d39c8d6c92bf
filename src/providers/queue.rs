//! Bounded admission queue with a self-sustaining worker pool
//!
//! Callers enqueue a call and receive a oneshot for the outcome. Workers
//! drain the queue up to the concurrency ceiling; a full queue rejects new
//! calls outright rather than buffering without bound.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{
    error::{Result, RouterError},
    providers::executor::CallExecutor,
};

/// One pending RPC call awaiting a worker
#[derive(Debug)]
struct QueuedCall {
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value>>,
    enqueued_at: Instant,
}

/// Point-in-time queue occupancy
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub max_queue_size: usize,
    pub active_workers: usize,
    pub max_concurrency: usize,
}

/// Bounded FIFO of pending calls plus a capped worker pool
#[derive(Debug)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

#[derive(Debug)]
struct QueueInner {
    pending: Mutex<VecDeque<QueuedCall>>,
    active_workers: AtomicUsize,
    max_queue_size: usize,
    max_concurrency: usize,
    executor: Arc<dyn CallExecutor>,
}

impl RequestQueue {
    /// Create a queue draining into the given executor
    pub fn new(
        max_queue_size: usize,
        max_concurrency: usize,
        executor: Arc<dyn CallExecutor>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(VecDeque::new()),
                active_workers: AtomicUsize::new(0),
                max_queue_size,
                max_concurrency,
                executor,
            }),
        }
    }

    /// Admit a call, or reject immediately when the queue is at capacity
    pub fn enqueue(&self, method: &str, params: Value) -> Result<oneshot::Receiver<Result<Value>>> {
        let (responder, receiver) = oneshot::channel();

        {
            let mut pending = self.inner.pending.lock();
            if pending.len() >= self.inner.max_queue_size {
                warn!(
                    queue_length = pending.len(),
                    method, "request queue full, rejecting call"
                );
                return Err(RouterError::QueueFull {
                    limit: self.inner.max_queue_size,
                });
            }

            pending.push_back(QueuedCall {
                method: method.to_string(),
                params,
                responder,
                enqueued_at: Instant::now(),
            });
        }

        Self::pump(&self.inner);
        Ok(receiver)
    }

    /// Current queue occupancy and ceilings
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            queue_length: self.inner.pending.lock().len(),
            max_queue_size: self.inner.max_queue_size,
            active_workers: self.inner.active_workers.load(Ordering::Acquire),
            max_concurrency: self.inner.max_concurrency,
        }
    }

    /// Spawn workers until the concurrency ceiling is reached or the queue
    /// is drained. Each worker pumps again when it finishes, so the pool
    /// sustains itself without ever exceeding the ceiling.
    fn pump(inner: &Arc<QueueInner>) {
        loop {
            // Reserve a worker slot before taking a call
            let active = inner.active_workers.load(Ordering::Acquire);
            if active >= inner.max_concurrency {
                return;
            }
            if inner
                .active_workers
                .compare_exchange(active, active + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let Some(call) = inner.pending.lock().pop_front() else {
                inner.active_workers.fetch_sub(1, Ordering::AcqRel);
                return;
            };

            let worker_inner = Arc::clone(inner);
            tokio::spawn(async move {
                let QueuedCall {
                    method,
                    params,
                    responder,
                    enqueued_at,
                } = call;

                let outcome = worker_inner.executor.execute(&method, params).await;
                debug!(
                    method = %method,
                    queued_ms = enqueued_at.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "call completed"
                );

                // The caller may have abandoned its receiver; nothing to do then
                let _ = responder.send(outcome);

                worker_inner.active_workers.fetch_sub(1, Ordering::AcqRel);
                Self::pump(&worker_inner);
            });
        }
    }
}
