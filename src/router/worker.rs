//! Per-endpoint dispatch workers
//!
//! Every live session gets its own task fed by a bounded queue. Frames for one
//! endpoint are dispatched strictly in submission order; a slow handler only
//! backs up its own queue, never another endpoint's.
//!
//! Workers are opened when a session starts and retired when it stops. Frames
//! for an endpoint with no worker are discarded without spawning anything.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::registry::{EndpointId, FrameEvent};
use crate::stats::MetricsAggregator;

use super::dispatch::FrameRouter;

struct Worker {
    tx: mpsc::Sender<FrameEvent>,
    handle: JoinHandle<()>,
}

/// Pool of per-endpoint workers
pub struct EndpointWorkers {
    router: Arc<FrameRouter>,
    metrics: Arc<MetricsAggregator>,
    workers: Mutex<HashMap<EndpointId, Worker>>,
    queue_capacity: usize,
}

impl EndpointWorkers {
    pub fn new(
        router: Arc<FrameRouter>,
        metrics: Arc<MetricsAggregator>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            router,
            metrics,
            workers: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Spawn the worker for an endpoint
    ///
    /// Returns `false` if a live worker already exists.
    pub async fn open(&self, endpoint: EndpointId) -> bool {
        let mut workers = self.workers.lock().await;

        if workers.get(&endpoint).is_some_and(|w| !w.tx.is_closed()) {
            return false;
        }

        workers.insert(endpoint, self.spawn_worker(endpoint));
        true
    }

    /// Queue a frame on its endpoint's worker
    ///
    /// Never waits for the worker. Returns `false` if the frame was not
    /// queued, either because the endpoint has no worker or because its queue
    /// is full. Only the second case counts as a drop.
    pub async fn submit(&self, frame: FrameEvent) -> bool {
        let endpoint = frame.endpoint_id;
        let mut workers = self.workers.lock().await;

        let Some(worker) = workers.get_mut(&endpoint) else {
            tracing::debug!(
                endpoint = %endpoint,
                frame_number = frame.frame_number,
                "No worker for endpoint, discarding frame"
            );
            return false;
        };

        // A worker whose task has ended (aborted or panicked) is replaced
        if worker.tx.is_closed() {
            *worker = self.spawn_worker(endpoint);
        }

        match worker.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.metrics.record_dropped();
                tracing::warn!(
                    endpoint = %endpoint,
                    frame_number = frame.frame_number,
                    capacity = self.queue_capacity,
                    "Endpoint queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(frame)) => {
                self.metrics.record_dropped();
                tracing::warn!(
                    endpoint = %endpoint,
                    frame_number = frame.frame_number,
                    "Endpoint worker gone, dropping frame"
                );
                false
            }
        }
    }

    fn spawn_worker(&self, endpoint: EndpointId) -> Worker {
        let (tx, mut rx) = mpsc::channel::<FrameEvent>(self.queue_capacity);
        let router = Arc::clone(&self.router);

        let handle = tokio::spawn(async move {
            tracing::debug!(endpoint = %endpoint, "Endpoint worker started");

            while let Some(frame) = rx.recv().await {
                router.dispatch(frame).await;
            }

            tracing::debug!(endpoint = %endpoint, "Endpoint worker finished");
        });

        Worker { tx, handle }
    }

    /// Retire an endpoint's worker
    ///
    /// Queued frames are dropped. Returns once the task has ended, so a worker
    /// opened afterwards for the same endpoint never runs alongside it.
    pub async fn retire(&self, endpoint: EndpointId) -> bool {
        // Map lock released before waiting on the task
        let Some(worker) = self.workers.lock().await.remove(&endpoint) else {
            return false;
        };

        let pending = worker.tx.max_capacity() - worker.tx.capacity();
        worker.handle.abort();
        if let Err(e) = worker.handle.await {
            if e.is_panic() {
                tracing::warn!(endpoint = %endpoint, error = %e, "Endpoint worker panicked");
            }
        }

        tracing::debug!(endpoint = %endpoint, pending, "Endpoint worker retired");
        true
    }

    /// Number of live workers
    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }

    /// Abort every worker, dropping queued frames
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        let count = workers.len();

        for (_, worker) in workers.drain() {
            worker.handle.abort();
        }

        tracing::debug!(workers = count, "Endpoint workers shut down");
    }
}
