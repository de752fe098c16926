use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Create the in-process work queue: a cloneable producer handle for request
/// handlers and the single receiver owned by the job worker.
pub fn job_queue(capacity: usize) -> (JobQueue, JobReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (JobQueue { sender }, JobReceiver { receiver })
}

/// Producer side of the bounded FIFO of job ids.
///
/// Enqueueing never waits: a full queue is reported as [`QueueError::Full`].
/// Entries live only in memory and are lost on restart.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Uuid>,
}

impl JobQueue {
    /// Enqueue a job id for background processing.
    pub fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.sender.try_send(job_id).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity(),
            },
            TrySendError::Closed(_) => QueueError::Closed,
        })?;
        self.record_depth();
        Ok(())
    }

    /// Claim a slot up front so the caller can persist the job first and
    /// only then hand its id over, without risking a full queue in between.
    pub fn reserve(&self) -> Result<QueueSlot<'_>, QueueError> {
        let permit = self.sender.try_reserve().map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity(),
            },
            TrySendError::Closed(_) => QueueError::Closed,
        })?;
        Ok(QueueSlot { permit, queue: self })
    }

    /// Number of ids waiting (including reserved slots).
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// True once the worker's receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn record_depth(&self) {
        metrics::gauge!("thumbnail_queue_depth").set(self.depth() as f64);
    }
}

/// A reserved queue position. Dropping it without sending releases the slot.
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, Uuid>,
    queue: &'a JobQueue,
}

impl QueueSlot<'_> {
    pub fn send(self, job_id: Uuid) {
        self.permit.send(job_id);
        self.queue.record_depth();
    }
}

/// Consumer side of the work queue. There is exactly one per process.
pub struct JobReceiver {
    receiver: mpsc::Receiver<Uuid>,
}

impl JobReceiver {
    /// Wait for the next job id.
    ///
    /// Returns `None` when `cancel` fires (no entry is consumed) or when
    /// every producer handle has been dropped.
    pub async fn dequeue(&mut self, cancel: &CancellationToken) -> Option<Uuid> {
        let job_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job_id = self.receiver.recv() => job_id,
        };

        if job_id.is_some() {
            metrics::gauge!("thumbnail_queue_depth").set(self.receiver.len() as f64);
        }
        job_id
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QueueError {
    #[error("Job queue is full ({capacity} jobs waiting)")]
    Full { capacity: usize },

    #[error("Job queue is closed")]
    Closed,
}
