//! Error hierarchy for the queue core.
//!
//! Flow-control outcomes (full queue, empty queue, vetoed key) are never
//! errors: they travel through return values. Only misconfiguration and
//! process-level failures surface here.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Settings loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Inconsistent queue or scheduling parameters
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Log file and other local I/O failures
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue capacity must be greater than 0")]
    ZeroCapacity,

    /// Hysteresis needs a dead band between the two thresholds
    #[error("Low watermark {low} must be lower than high watermark {high}")]
    InvalidWatermarks { low: usize, high: usize },

    #[error("High watermark {high} exceeds queue capacity {capacity}")]
    HighWatermarkExceedsCapacity { high: usize, capacity: usize },

    #[error("Worker slot {thread_no} is out of range for {thread_count} worker threads")]
    InvalidWorkerSlot { thread_no: usize, thread_count: usize },

    #[error("Priority tier {0} is out of range (expected 1..=3)")]
    InvalidPriorityTier(u8),
}
