use crate::LogstoreKey;

#[cfg(test)]
use mockall::automock;

/// Capability on the other side of a queue.
///
/// A dispatcher calls `feedback` when a previously full logstore drains back
/// to its low watermark, and consults `is_valid_to_push` as an admission veto
/// before handing an item of that logstore to a consumer.
#[cfg_attr(test, automock)]
pub trait FeedbackSink: Send + Sync + 'static {
    fn feedback(
        &self,
        key: LogstoreKey,
    );

    fn is_valid_to_push(
        &self,
        key: LogstoreKey,
    ) -> bool;
}

/// Identifies one consumer among `thread_count` workers.
///
/// Exactly-once logstores are only drained by the worker whose `thread_no`
/// equals `key.shard() % thread_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    thread_no: usize,
    thread_count: usize,
}

impl WorkerSlot {
    pub fn new(
        thread_no: usize,
        thread_count: usize,
    ) -> Result<Self, crate::QueueError> {
        if thread_count == 0 || thread_no >= thread_count {
            return Err(crate::QueueError::InvalidWorkerSlot {
                thread_no,
                thread_count,
            });
        }
        Ok(Self {
            thread_no,
            thread_count,
        })
    }

    /// The only worker of a single-consumer deployment.
    pub fn single() -> Self {
        Self {
            thread_no: 0,
            thread_count: 1,
        }
    }

    pub fn thread_no(&self) -> usize {
        self.thread_no
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn owns(
        &self,
        key: LogstoreKey,
    ) -> bool {
        key.shard() % self.thread_count as u64 == self.thread_no as u64
    }
}
