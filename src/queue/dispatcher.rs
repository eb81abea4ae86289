//! Keyed dispatcher: one bounded queue per logstore behind a single lock.
//!
//! Consumers drain it with `pop` / `pop_checked`, which serve the priority
//! tiers first (tier 1, then 2, then 3, each in insertion order) and then
//! rotate fairly over every queue in key order, resuming after the key the
//! consumer was last served from. The consumer keeps that position in its
//! own `FairnessCursor`.

use std::collections::BTreeMap;
use std::ops::Bound::Excluded;
use std::ops::Bound::Included;
use std::ops::Bound::Unbounded;
use std::ops::RangeBounds;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::BoundedKeyQueue;
use super::FeedbackSink;
use super::PopStatus;
use super::QueueKind;
use super::QueueParams;
use super::WakeSignal;
use super::WorkerSlot;
use crate::metrics::QUEUE_FEEDBACK_TOTAL;
use crate::metrics::QUEUE_PUSH_REJECTED_TOTAL;
use crate::LogstoreKey;
use crate::QueueError;
use crate::Result;

pub const PRIORITY_TIERS: usize = 3;

/// Position of the last logstore served by the rotation pass.
pub type FairnessCursor = Option<LogstoreKey>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    First = 1,
    Second = 2,
    Third = 3,
}

impl PriorityTier {
    fn index(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<u8> for PriorityTier {
    type Error = QueueError;

    fn try_from(tier: u8) -> std::result::Result<Self, Self::Error> {
        match tier {
            1 => Ok(PriorityTier::First),
            2 => Ok(PriorityTier::Second),
            3 => Ok(PriorityTier::Third),
            other => Err(QueueError::InvalidPriorityTier(other)),
        }
    }
}

/// Snapshot of backpressure across all queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub invalid_count: usize,
    pub total_count: usize,
    pub eo_invalid_count: usize,
    pub eo_total_count: usize,
}

struct DispatcherState<T> {
    params: QueueParams,
    queues: BTreeMap<LogstoreKey, BoundedKeyQueue<T>>,
    priority_tiers: [Vec<LogstoreKey>; PRIORITY_TIERS],
}

impl<T> DispatcherState<T> {
    fn get_or_create(
        &mut self,
        key: LogstoreKey,
    ) -> &mut BoundedKeyQueue<T> {
        let params = self.params;
        self.queues.entry(key).or_insert_with(|| {
            debug!("creating queue for logstore {}", key);
            BoundedKeyQueue::new(params)
        })
    }

    fn remove_priority(
        &mut self,
        key: LogstoreKey,
    ) -> bool {
        let mut removed = false;
        for tier in self.priority_tiers.iter_mut() {
            let before = tier.len();
            tier.retain(|k| *k != key);
            removed |= tier.len() != before;
        }
        removed
    }
}

/// Which keys a pop may take from.
struct Admission<'a> {
    admit: Option<&'a dyn FeedbackSink>,
    slot: Option<WorkerSlot>,
}

impl Admission<'_> {
    fn allows(
        &self,
        key: LogstoreKey,
        kind: QueueKind,
    ) -> bool {
        if kind == QueueKind::ExactlyOnce {
            if let Some(slot) = self.slot {
                if !slot.owns(key) {
                    return false;
                }
            }
        }
        match self.admit {
            Some(admit) => admit.is_valid_to_push(key),
            None => true,
        }
    }
}

pub struct KeyedDispatcher<T> {
    state: Mutex<DispatcherState<T>>,
    wake: WakeSignal,
    feedback_sink: ArcSwapOption<Arc<dyn FeedbackSink>>,
}

impl<T> KeyedDispatcher<T> {
    pub fn new(params: QueueParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            state: Mutex::new(DispatcherState {
                params,
                queues: BTreeMap::new(),
                priority_tiers: Default::default(),
            }),
            wake: WakeSignal::new(),
            feedback_sink: ArcSwapOption::empty(),
        })
    }

    pub fn params(&self) -> QueueParams {
        self.state.lock().params
    }

    /// Applies new sizing to every queue, discarding what they hold.
    /// Queues that were invalid report feedback once the lock is released.
    pub fn set_params(
        &self,
        params: QueueParams,
    ) -> Result<()> {
        params.validate()?;
        let mut released = Vec::new();
        {
            let mut state = self.state.lock();
            for (key, queue) in state.queues.iter_mut() {
                if !queue.is_valid() {
                    released.push(*key);
                }
                let discarded = queue.reconfigure(params);
                if discarded > 0 {
                    warn!(
                        "queue of logstore {} reconfigured, {} items discarded",
                        key, discarded
                    );
                }
            }
            state.params = params;
        }
        info!("queue params updated: {:?}", params);

        // Reconfigured queues are empty and valid again.
        for key in released {
            self.notify_feedback(key);
        }
        Ok(())
    }

    /// Registers the collaborator notified when a full queue drains.
    /// Replaces any previous sink.
    pub fn set_feedback_sink(
        &self,
        sink: Arc<dyn FeedbackSink>,
    ) {
        if self.feedback_sink.swap(Some(Arc::new(sink))).is_some() {
            info!("feedback sink replaced");
        }
    }

    /// Creates the queue for `key` if it does not exist yet. Returns true
    /// if it was created.
    pub fn get_or_create(
        &self,
        key: LogstoreKey,
    ) -> bool {
        let mut state = self.state.lock();
        if state.queues.contains_key(&key) {
            return false;
        }
        state.get_or_create(key);
        true
    }

    pub fn contains(
        &self,
        key: LogstoreKey,
    ) -> bool {
        self.state.lock().queues.contains_key(&key)
    }

    /// Number of queues.
    pub fn len(&self) -> usize {
        self.state.lock().queues.len()
    }

    /// True when no queue holds an item.
    pub fn is_empty(&self) -> bool {
        self.state.lock().queues.values().all(|q| q.is_empty())
    }

    pub fn queue_len(
        &self,
        key: LogstoreKey,
    ) -> Option<usize> {
        self.state.lock().queues.get(&key).map(|q| q.len())
    }

    /// Enqueues `item` for `key`, handing it back if the queue is full.
    pub fn push(
        &self,
        key: LogstoreKey,
        item: T,
    ) -> std::result::Result<(), T> {
        let result = self.state.lock().get_or_create(key).push(item);
        match result {
            Ok(()) => {
                self.wake.signal();
                Ok(())
            }
            Err(item) => {
                trace!("queue of logstore {} is full, push rejected", key);
                QUEUE_PUSH_REJECTED_TOTAL
                    .with_label_values(&[&key.to_string()])
                    .inc();
                Err(item)
            }
        }
    }

    /// Whether producers for `key` may keep writing. Unknown keys are valid
    /// and are not created by this call.
    pub fn is_valid_to_push(
        &self,
        key: LogstoreKey,
    ) -> bool {
        self.state.lock().queues.get(&key).map_or(true, |q| q.is_valid())
    }

    /// Pops the next item without admission veto or exactly-once ownership.
    /// Meant for deployments with a single consumer.
    pub fn pop(
        &self,
        cursor: &mut FairnessCursor,
    ) -> Option<(LogstoreKey, T)> {
        self.schedule(
            cursor,
            Admission {
                admit: None,
                slot: None,
            },
        )
    }

    /// Pops the next item that `admit` accepts and that `slot` may drain.
    ///
    /// `admit` is called under this dispatcher's lock and must not be the
    /// dispatcher itself.
    pub fn pop_checked(
        &self,
        cursor: &mut FairnessCursor,
        admit: &dyn FeedbackSink,
        slot: WorkerSlot,
    ) -> Option<(LogstoreKey, T)> {
        self.schedule(
            cursor,
            Admission {
                admit: Some(admit),
                slot: Some(slot),
            },
        )
    }

    /// Moves `key` into `tier`, out of any tier it held before.
    pub fn set_priority(
        &self,
        key: LogstoreKey,
        tier: PriorityTier,
    ) {
        let mut state = self.state.lock();
        state.get_or_create(key);
        state.remove_priority(key);
        state.priority_tiers[tier.index()].push(key);
        debug!("logstore {} set to priority {:?}", key, tier);
    }

    pub fn delete_priority(
        &self,
        key: LogstoreKey,
    ) -> bool {
        self.state.lock().remove_priority(key)
    }

    pub fn priority_of(
        &self,
        key: LogstoreKey,
    ) -> Option<PriorityTier> {
        let state = self.state.lock();
        [PriorityTier::First, PriorityTier::Second, PriorityTier::Third]
            .into_iter()
            .find(|tier| state.priority_tiers[tier.index()].contains(&key))
    }

    /// Removes the queue of `key` and its priority entry. Returns the number
    /// of items discarded, or `None` if there was no such queue.
    pub fn delete(
        &self,
        key: LogstoreKey,
    ) -> Option<usize> {
        let mut state = self.state.lock();
        state.remove_priority(key);
        let queue = state.queues.remove(&key)?;
        let discarded = queue.len();
        if discarded > 0 {
            warn!(
                "queue of logstore {} deleted with {} items",
                key, discarded
            );
        }
        Some(discarded)
    }

    /// Drops every queue and priority entry. Returns the number of items
    /// discarded.
    pub fn remove_all(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.queues.values().map(|q| q.len()).sum();
        state.queues.clear();
        for tier in state.priority_tiers.iter_mut() {
            tier.clear();
        }
        if discarded > 0 {
            warn!("all queues removed, {} items discarded", discarded);
        }
        discarded
    }

    pub fn convert_to_exactly_once(
        &self,
        key: LogstoreKey,
    ) {
        let mut state = self.state.lock();
        state.get_or_create(key).set_kind(QueueKind::ExactlyOnce);
        info!("logstore {} converted to exactly-once", key);
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.state.lock();
        let mut status = QueueStatus::default();
        for queue in state.queues.values() {
            status.total_count += 1;
            if !queue.is_valid() {
                status.invalid_count += 1;
            }
            if queue.kind() == QueueKind::ExactlyOnce {
                status.eo_total_count += 1;
                if !queue.is_valid() {
                    status.eo_invalid_count += 1;
                }
            }
        }
        status
    }

    /// Wakes one consumer blocked in `wait`.
    pub fn signal(&self) {
        self.wake.signal();
    }

    /// Blocks until a push or signal arrives, or `timeout` elapses.
    pub fn wait(
        &self,
        timeout: Duration,
    ) -> bool {
        self.wake.wait(timeout)
    }

    fn schedule(
        &self,
        cursor: &mut FairnessCursor,
        admission: Admission<'_>,
    ) -> Option<(LogstoreKey, T)> {
        let (key, item, became_valid) = {
            let mut state = self.state.lock();
            select(&mut state, cursor, &admission)?
        };
        if became_valid {
            self.notify_feedback(key);
        }
        Some((key, item))
    }

    fn notify_feedback(
        &self,
        key: LogstoreKey,
    ) {
        QUEUE_FEEDBACK_TOTAL
            .with_label_values(&[&key.to_string()])
            .inc();
        match self.feedback_sink.load_full() {
            Some(sink) => {
                debug!("logstore {} is valid again, sending feedback", key);
                sink.feedback(key);
            }
            None => trace!("logstore {} is valid again, no feedback sink", key),
        }
    }
}

fn select<T>(
    state: &mut DispatcherState<T>,
    cursor: &mut FairnessCursor,
    admission: &Admission<'_>,
) -> Option<(LogstoreKey, T, bool)> {
    let DispatcherState {
        queues,
        priority_tiers,
        ..
    } = state;
    if queues.is_empty() {
        return None;
    }

    for tier in priority_tiers.iter() {
        for key in tier {
            if let Some(queue) = queues.get_mut(key) {
                if let Some((item, became_valid)) = try_pop(*key, queue, admission) {
                    trace!("served priority logstore {}", key);
                    return Some((*key, item, became_valid));
                }
            }
        }
    }

    let found = match cursor.filter(|c| queues.contains_key(c)) {
        Some(last) => scan(queues, (Excluded(last), Unbounded), admission)
            .or_else(|| scan(queues, (Unbounded, Included(last)), admission)),
        None => scan(queues, .., admission),
    };
    let (key, item, became_valid) = found?;
    *cursor = Some(key);
    Some((key, item, became_valid))
}

fn scan<T, R>(
    queues: &mut BTreeMap<LogstoreKey, BoundedKeyQueue<T>>,
    range: R,
    admission: &Admission<'_>,
) -> Option<(LogstoreKey, T, bool)>
where
    R: RangeBounds<LogstoreKey>,
{
    queues
        .range_mut(range)
        .find_map(|(key, queue)| try_pop(*key, queue, admission).map(|(item, bv)| (*key, item, bv)))
}

fn try_pop<T>(
    key: LogstoreKey,
    queue: &mut BoundedKeyQueue<T>,
    admission: &Admission<'_>,
) -> Option<(T, bool)> {
    if queue.is_empty() || !admission.allows(key, queue.kind()) {
        return None;
    }
    match queue.pop() {
        PopStatus::Empty => None,
        PopStatus::Popped(item) => Some((item, false)),
        PopStatus::PoppedAndBecameValid(item) => Some((item, true)),
    }
}

impl<T: Send + 'static> FeedbackSink for KeyedDispatcher<T> {
    /// Downstream capacity freed up: wake a consumer so it retries.
    fn feedback(
        &self,
        key: LogstoreKey,
    ) {
        trace!("downstream feedback for logstore {}", key);
        self.signal();
    }

    fn is_valid_to_push(
        &self,
        key: LogstoreKey,
    ) -> bool {
        KeyedDispatcher::is_valid_to_push(self, key)
    }
}
