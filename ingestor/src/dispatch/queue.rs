use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, Notify, mpsc};

use crate::model::TaskBatch;

#[derive(Debug)]
pub enum Task {
    Batch(TaskBatch),
    /// One per worker; a worker that pops it exits.
    Shutdown,
}

/// Unbounded FIFO shared by the dispatcher (producer) and all workers.
///
/// Every `put` must be matched by exactly one `task_done` once the popped
/// task has been fully handled, including any re-queues it caused.
/// `join` resolves when nothing is queued or in progress.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Task>>>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            pending: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn put(&self, task: Task) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // The receiver lives in `self`, so the channel cannot be closed here.
        if self.tx.send(task).is_err() {
            self.task_done();
        }
    }

    /// Waits for the next task. Workers take turns on the receiver, so each
    /// task goes to exactly one of them.
    pub async fn pop(&self) -> Option<Task> {
        self.rx.lock().await.recv().await
    }

    pub fn task_done(&self) {
        let prev = self.pending.fetch_sub(1, Ordering::SeqCst);
        if prev <= 1 {
            self.idle.notify_waiters();
        }
    }

    /// Queued plus in-progress tasks.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn join(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
