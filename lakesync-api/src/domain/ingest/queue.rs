use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::TransformationTask;
use crate::domain::error::{PipelineError, Result};

/// Bounded FIFO of transformation tasks with pending/completed/failed
/// counters.
///
/// `enqueue` blocks on back-pressure when the queue is at capacity. The
/// receiver is shared by the worker pool behind a mutex.
pub struct TransformationQueue {
    tx: mpsc::Sender<TransformationTask>,
    rx: Mutex<mpsc::Receiver<TransformationTask>>,
    size: AtomicUsize,
    pending: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub queue_size: usize,
}

impl TransformationQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
            size: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Enqueues a task, waiting when the queue is full.
    pub async fn enqueue(&self, task: TransformationTask) -> Result<()> {
        let source_id = task.source_id.clone();
        self.tx
            .send(task)
            .await
            .map_err(|_| PipelineError::Backend("transformation queue is closed".to_string()))?;
        self.size.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_add(1, Ordering::SeqCst);
        debug!(%source_id, "Enqueued transformation task");
        Ok(())
    }

    /// Removes the next task, waiting until one is available. Returns `None`
    /// when the queue has been closed and drained.
    pub async fn dequeue(&self) -> Option<TransformationTask> {
        let task = self.rx.lock().await.recv().await;
        if task.is_some() {
            saturating_dec(&self.size);
        }
        task
    }

    pub fn mark_completed(&self) {
        saturating_dec(&self.pending);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mark_failed(&self) {
        saturating_dec(&self.pending);
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Drops all queued tasks and resets the pending counter. Historical
    /// completed/failed counts are kept; in-flight tasks are unaffected.
    pub async fn clear(&self) {
        let mut rx = self.rx.lock().await;
        while rx.try_recv().is_ok() {}
        self.size.store(0, Ordering::SeqCst);
        self.pending.store(0, Ordering::SeqCst);
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            queue_size: self.size.load(Ordering::SeqCst),
        }
    }
}

fn saturating_dec(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
        Some(v.saturating_sub(1))
    });
}
