//! Fixed-capacity ring buffer for a single logstore, with low/high
//! watermark hysteresis.
//!
//! A queue turns invalid when a push brings it to the high watermark and
//! turns valid again only when a pop brings it back down to the low
//! watermark. Producers use the validity flag to throttle themselves; the
//! hard capacity limit is enforced by `push` regardless of validity.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::QueueError;

/// Sizing of one queue: `low_watermark < high_watermark <= capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueParams {
    pub capacity: usize,
    pub low_watermark: usize,
    pub high_watermark: usize,
}

impl QueueParams {
    pub fn new(
        capacity: usize,
        low_watermark: usize,
        high_watermark: usize,
    ) -> Result<Self, QueueError> {
        let params = Self {
            capacity,
            low_watermark,
            high_watermark,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if self.low_watermark >= self.high_watermark {
            return Err(QueueError::InvalidWatermarks {
                low: self.low_watermark,
                high: self.high_watermark,
            });
        }
        if self.high_watermark > self.capacity {
            return Err(QueueError::HighWatermarkExceedsCapacity {
                high: self.high_watermark,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueKind {
    #[default]
    Normal,
    /// Drained by exactly one worker thread, see `WorkerSlot`.
    ExactlyOnce,
}

/// Outcome of a single pop.
#[derive(Debug, PartialEq, Eq)]
pub enum PopStatus<T> {
    Empty,
    Popped(T),
    /// The pop brought an invalid queue down to its low watermark.
    PoppedAndBecameValid(T),
}

impl<T> PopStatus<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            PopStatus::Empty => None,
            PopStatus::Popped(item) | PopStatus::PoppedAndBecameValid(item) => Some(item),
        }
    }
}

pub struct BoundedKeyQueue<T> {
    slots: Box<[Option<T>]>,
    read_cursor: u64,
    write_cursor: u64,
    low_watermark: usize,
    high_watermark: usize,
    valid: bool,
    kind: QueueKind,
}

impl<T> BoundedKeyQueue<T> {
    /// `params` must already be validated.
    pub fn new(params: QueueParams) -> Self {
        Self {
            slots: allocate(params.capacity),
            read_cursor: 0,
            write_cursor: 0,
            low_watermark: params.low_watermark,
            high_watermark: params.high_watermark,
            valid: true,
            kind: QueueKind::Normal,
        }
    }

    pub fn push(
        &mut self,
        item: T,
    ) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let index = self.slot_index(self.write_cursor);
        self.slots[index] = Some(item);
        self.write_cursor += 1;

        if self.len() == self.high_watermark && self.valid {
            debug!(
                "queue reached high watermark {}, marking invalid",
                self.high_watermark
            );
            self.valid = false;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> PopStatus<T> {
        if self.is_empty() {
            return PopStatus::Empty;
        }
        let index = self.slot_index(self.read_cursor);
        self.read_cursor += 1;
        let item = match self.slots[index].take() {
            Some(item) => item,
            // cursors only ever cover filled slots
            None => return PopStatus::Empty,
        };

        if !self.valid && self.len() == self.low_watermark {
            debug!(
                "queue drained to low watermark {}, marking valid",
                self.low_watermark
            );
            self.valid = true;
            return PopStatus::PoppedAndBecameValid(item);
        }
        PopStatus::Popped(item)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_empty(&self) -> bool {
        self.write_cursor == self.read_cursor
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn len(&self) -> usize {
        (self.write_cursor - self.read_cursor) as usize
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn set_kind(
        &mut self,
        kind: QueueKind,
    ) {
        self.kind = kind;
    }

    /// Drops every queued item and restores validity. Capacity is kept.
    pub fn reset(&mut self) -> usize {
        let discarded = self.len();
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.read_cursor = 0;
        self.write_cursor = 0;
        self.valid = true;
        discarded
    }

    /// Reallocates the buffer for new sizing. Queued items are discarded.
    pub fn reconfigure(
        &mut self,
        params: QueueParams,
    ) -> usize {
        let discarded = self.reset();
        self.slots = allocate(params.capacity);
        self.low_watermark = params.low_watermark;
        self.high_watermark = params.high_watermark;
        discarded
    }

    fn slot_index(
        &self,
        cursor: u64,
    ) -> usize {
        (cursor % self.slots.len() as u64) as usize
    }
}

fn allocate<T>(capacity: usize) -> Box<[Option<T>]> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}
