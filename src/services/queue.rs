use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::measurement::MeasurementRequest;

/// Bounded in-process FIFO of measurement requests.
///
/// Any number of producers may enqueue concurrently through a shared
/// reference; the receiving half is handed to the single worker.
pub struct MeasurementQueue {
    tx: mpsc::Sender<MeasurementRequest>,
    capacity: usize,
}

impl MeasurementQueue {
    /// Create a queue holding at most `capacity` requests, returning the
    /// consumer half alongside it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MeasurementRequest>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    /// Insert without waiting. Fails immediately when the queue is full.
    pub fn try_enqueue(&self, request: MeasurementRequest) -> Result<(), QueueError> {
        self.tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(rejected) => QueueError::Full {
                execution_result_id: rejected.execution_result_id().to_string(),
            },
            TrySendError::Closed(rejected) => QueueError::Closed {
                execution_result_id: rejected.execution_result_id().to_string(),
            },
        })
    }

    /// Requests currently waiting to be dequeued.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("measurement queue is full, dropped {execution_result_id}")]
    Full { execution_result_id: String },

    #[error("measurement queue is closed, dropped {execution_result_id}")]
    Closed { execution_result_id: String },
}
