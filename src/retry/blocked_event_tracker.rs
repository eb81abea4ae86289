//! Deferred re-dispatch of blocked events with exponential backoff.
//!
//! A producer that cannot hand an event to a full queue parks it here. The
//! event becomes due after its timeout, which roughly doubles every time
//! the same event is parked again, up to `max_timeout`. Entries stay tracked
//! until the caller removes them after a successful re-dispatch.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::time::Duration;

use config::ConfigError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dashmap::DashSet;
use tracing::debug;
use tracing::trace;

use crate::metrics::BLOCKED_EVENTS;
use crate::BackoffConfig;
use crate::Error;
use crate::FeedbackSink;
use crate::LogstoreKey;
use crate::Result;
use crate::WakeSignal;

/// Identity of a blocked event, e.g. derived from logstore, config name and
/// file device/inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u64);

impl BlockId {
    pub fn new<H: Hash>(parts: H) -> Self {
        let mut hasher = DefaultHasher::new();
        parts.hash(&mut hasher);
        Self(hasher.finish())
    }
}

#[derive(Debug, Clone)]
pub struct BlockedEvent<E> {
    pub logstore: LogstoreKey,
    pub event: E,
    /// Seconds since epoch of the last failure.
    pub invalid_since: u64,
    /// Seconds after `invalid_since` at which the event is due.
    pub timeout: u64,
}

impl<E> BlockedEvent<E> {
    fn is_due(
        &self,
        now: u64,
    ) -> bool {
        self.invalid_since.saturating_add(self.timeout) <= now
    }
}

pub struct BlockedEventTracker<E> {
    entries: DashMap<BlockId, BlockedEvent<E>>,
    /// Logstores whose queue drained since the last poll.
    released: DashSet<LogstoreKey>,
    wake: WakeSignal,
    initial_timeout: u64,
    max_timeout: u64,
}

impl<E> BlockedEventTracker<E> {
    pub fn new(
        initial_timeout: u64,
        max_timeout: u64,
    ) -> Result<Self> {
        if initial_timeout == 0 || initial_timeout > max_timeout {
            return Err(Error::Config(ConfigError::Message(format!(
                "blocked event timeout must satisfy 0 < initial ({}) <= max ({})",
                initial_timeout, max_timeout
            ))));
        }
        Ok(Self {
            entries: DashMap::new(),
            released: DashSet::new(),
            wake: WakeSignal::new(),
            initial_timeout,
            max_timeout,
        })
    }

    pub fn from_config(config: &BackoffConfig) -> Result<Self> {
        Self::new(config.initial_timeout_secs, config.max_timeout_secs)
    }

    /// Parks `event`, replacing any older event with the same identity.
    ///
    /// A new entry waits `initial_timeout`; a replaced one waits
    /// `min(2 * (now - invalid_since) + 1, max_timeout)`.
    pub fn update_block_event(
        &self,
        id: BlockId,
        logstore: LogstoreKey,
        event: E,
        now: u64,
    ) {
        let timeout = match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let elapsed = now.saturating_sub(entry.invalid_since);
                entry.timeout = elapsed
                    .saturating_mul(2)
                    .saturating_add(1)
                    .min(self.max_timeout);
                entry.invalid_since = now;
                entry.logstore = logstore;
                entry.event = event;
                entry.timeout
            }
            Entry::Vacant(vacant) => {
                vacant.insert(BlockedEvent {
                    logstore,
                    event,
                    invalid_since: now,
                    timeout: self.initial_timeout,
                });
                self.initial_timeout
            }
        };
        trace!(
            "blocked event {:?} of logstore {} retries in {}s",
            id,
            logstore,
            timeout
        );
        BLOCKED_EVENTS.set(self.entries.len() as i64);
    }

    /// Swaps the event parked under `id`, keeping `invalid_since` and the
    /// current timeout. Hands `event` back when nothing is parked under `id`.
    pub fn replace_event(
        &self,
        id: BlockId,
        event: E,
    ) -> std::result::Result<(), E> {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.event = event;
                Ok(())
            }
            None => Err(event),
        }
    }

    /// Stops tracking `id`, typically after a successful re-dispatch.
    pub fn remove(
        &self,
        id: BlockId,
    ) -> Option<E> {
        let removed = self.entries.remove(&id).map(|(_, entry)| entry.event);
        BLOCKED_EVENTS.set(self.entries.len() as i64);
        removed
    }

    pub fn timeout_of(
        &self,
        id: BlockId,
    ) -> Option<u64> {
        self.entries.get(&id).map(|entry| entry.timeout)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wakes the poller blocked in `wait`.
    pub fn signal(&self) {
        self.wake.signal();
    }

    /// Blocks until feedback arrives or `timeout` elapses.
    pub fn wait(
        &self,
        timeout: Duration,
    ) -> bool {
        self.wake.wait(timeout)
    }
}

impl<E: Clone> BlockedEventTracker<E> {
    /// Copy of the event currently parked under `id`.
    pub fn get(
        &self,
        id: BlockId,
    ) -> Option<E> {
        self.entries.get(&id).map(|entry| entry.event.clone())
    }

    /// Events whose timeout expired at `now`, plus every event of a logstore
    /// that reported feedback since the last call. Entries are not removed.
    pub fn get_timed_out_events(
        &self,
        now: u64,
    ) -> Vec<(BlockId, E)> {
        let released: Vec<LogstoreKey> = self.released.iter().map(|k| *k).collect();
        for key in &released {
            self.released.remove(key);
        }

        let due: Vec<(BlockId, E)> = self
            .entries
            .iter()
            .filter(|entry| entry.is_due(now) || released.contains(&entry.logstore))
            .map(|entry| (*entry.key(), entry.event.clone()))
            .collect();
        if !due.is_empty() {
            debug!("{} blocked events are due for re-dispatch", due.len());
        }
        due
    }
}

impl<E: Send + Sync + 'static> FeedbackSink for BlockedEventTracker<E> {
    fn feedback(
        &self,
        key: LogstoreKey,
    ) {
        trace!("logstore {} released, waking blocked event poller", key);
        self.released.insert(key);
        self.wake.signal();
    }

    fn is_valid_to_push(
        &self,
        _key: LogstoreKey,
    ) -> bool {
        true
    }
}
