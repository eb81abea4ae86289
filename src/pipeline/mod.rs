//! Two-stage log pipeline built on the keyed dispatchers.
//!
//! Batches offered by producers enter the process stage; process workers
//! move them to the sender stage. The stages are chained through their
//! feedback sinks:
//! - the sender stage is the admission authority of the process workers,
//!   so a logstore whose sender queue is saturated is not processed;
//! - the sender stage reports drained queues to the process stage, which
//!   wakes its workers;
//! - the process stage reports drained queues to the blocked event tracker,
//!   which releases batches that were parked while that logstore was full.

mod batch;
mod worker;
pub use batch::*;


use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::BackoffConfig;
use crate::BlockedEventTracker;
use crate::Error;
use crate::FairnessCursor;
use crate::KeyedDispatcher;
use crate::LogstoreKey;
use crate::ProcessConfig;
use crate::QueueStatus;
use crate::Result;
use crate::Settings;
use crate::WorkerSlot;

/// Outcome of offering a batch to the process stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Parked in the blocked event tracker until the logstore drains.
    Blocked,
    /// The parked batch of this source is full; the producer keeps the
    /// batch and stops reading the source for now.
    Rejected(LogBatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStatus {
    pub process: QueueStatus,
    pub sender: QueueStatus,
    pub blocked_events: usize,
}

pub(crate) struct Stages {
    process_queue: Arc<KeyedDispatcher<LogBatch>>,
    sender_queue: Arc<KeyedDispatcher<LogBatch>>,
    blocked_events: Arc<BlockedEventTracker<LogBatch>>,
    max_parked_lines: usize,
    /// Serializes parking and re-dispatch so a merged batch is never lost
    redispatch_lock: Mutex<()>,
}

impl Stages {
    fn offer(
        &self,
        batch: LogBatch,
        now: u64,
    ) -> Offer {
        let key = batch.logstore;
        let id = batch.block_id();
        let _guard = self.redispatch_lock.lock();

        // Older lines of this source are still parked; keep them in order.
        // Merging is not a failed retry, so the backoff timing is kept.
        if let Some(mut parked) = self.blocked_events.get(id) {
            if parked.line_count() + batch.line_count() > self.max_parked_lines {
                trace!("parked batch of {} is full, rejecting", batch.source);
                return Offer::Rejected(batch);
            }
            parked.merge(batch);
            if let Err(parked) = self.blocked_events.replace_event(id, parked) {
                self.blocked_events.update_block_event(id, key, parked, now);
            }
            return Offer::Blocked;
        }

        let batch = if self.process_queue.is_valid_to_push(key) {
            match self.process_queue.push(key, batch) {
                Ok(()) => return Offer::Queued,
                Err(rejected) => rejected,
            }
        } else {
            batch
        };

        if batch.line_count() > self.max_parked_lines {
            return Offer::Rejected(batch);
        }
        debug!("logstore {} is saturated, parking {}", key, batch.source);
        self.blocked_events.update_block_event(id, key, batch, now);
        Offer::Blocked
    }

    fn redispatch_blocked(
        &self,
        now: u64,
    ) -> usize {
        let _guard = self.redispatch_lock.lock();
        let mut redispatched = 0;

        for (id, batch) in self.blocked_events.get_timed_out_events(now) {
            let key = batch.logstore;
            if !self.process_queue.is_valid_to_push(key) {
                self.blocked_events.update_block_event(id, key, batch, now);
                continue;
            }
            match self.process_queue.push(key, batch) {
                Ok(()) => {
                    self.blocked_events.remove(id);
                    redispatched += 1;
                }
                Err(batch) => self.blocked_events.update_block_event(id, key, batch, now),
            }
        }

        if redispatched > 0 {
            debug!("{} blocked batches re-dispatched", redispatched);
        }
        redispatched
    }
}

pub struct Pipeline {
    stages: Arc<Stages>,
    process: ProcessConfig,
    retry: BackoffConfig,
    shutdown: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Builds both stages and the tracker from `settings` and registers the
    /// configured priority and exactly-once logstores.
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let process_queue: Arc<KeyedDispatcher<LogBatch>> =
            Arc::new(KeyedDispatcher::new(settings.queue.params()?)?);
        let sender_queue: Arc<KeyedDispatcher<LogBatch>> =
            Arc::new(KeyedDispatcher::new(settings.sender_queue.params()?)?);
        let blocked_events: Arc<BlockedEventTracker<LogBatch>> =
            Arc::new(BlockedEventTracker::from_config(&settings.retry)?);

        process_queue.set_feedback_sink(blocked_events.clone());
        sender_queue.set_feedback_sink(process_queue.clone());

        for logstore in &settings.logstores {
            let key = logstore.key();
            if let Some(tier) = logstore.priority_tier()? {
                process_queue.set_priority(key, tier);
                sender_queue.set_priority(key, tier);
            }
            if logstore.exactly_once {
                process_queue.convert_to_exactly_once(key);
            }
            info!(
                "registered logstore {}/{} as {}",
                logstore.project, logstore.logstore, key
            );
        }

        Ok(Self {
            stages: Arc::new(Stages {
                process_queue,
                sender_queue,
                blocked_events,
                max_parked_lines: settings.retry.max_parked_lines,
                redispatch_lock: Mutex::new(()),
            }),
            process: settings.process,
            retry: settings.retry,
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn process_queue(&self) -> &Arc<KeyedDispatcher<LogBatch>> {
        &self.stages.process_queue
    }

    pub fn sender_queue(&self) -> &Arc<KeyedDispatcher<LogBatch>> {
        &self.stages.sender_queue
    }

    pub fn blocked_events(&self) -> &Arc<BlockedEventTracker<LogBatch>> {
        &self.stages.blocked_events
    }

    /// Producer entry point. A batch for a saturated logstore is parked and
    /// retried with backoff instead of being dropped. Once the parked batch
    /// of a source holds `max_parked_lines`, further batches are handed back
    /// as `Offer::Rejected`.
    pub fn offer(
        &self,
        batch: LogBatch,
        now: u64,
    ) -> Offer {
        self.stages.offer(batch, now)
    }

    /// Moves parked batches that are due at `now` back into the process
    /// stage. Returns how many were re-dispatched.
    pub fn redispatch_blocked(
        &self,
        now: u64,
    ) -> usize {
        self.stages.redispatch_blocked(now)
    }

    /// Next batch ready for the network, for a single sender.
    pub fn pop_sendable(
        &self,
        cursor: &mut FairnessCursor,
    ) -> Option<(LogstoreKey, LogBatch)> {
        self.stages.sender_queue.pop(cursor)
    }

    pub fn wait_sendable(
        &self,
        timeout: Duration,
    ) -> bool {
        self.stages.sender_queue.wait(timeout)
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            process: self.stages.process_queue.status(),
            sender: self.stages.sender_queue.status(),
            blocked_events: self.stages.blocked_events.len(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }

    /// Spawns the process workers and the blocked event poller.
    pub fn start(&self) -> Result<()> {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("pipeline already started");
            return Ok(());
        }
        self.shutdown.store(false, Ordering::Release);

        let thread_count = self.process.worker_threads;
        for thread_no in 0..thread_count {
            let slot = WorkerSlot::new(thread_no, thread_count)?;
            let stages = self.stages.clone();
            let shutdown = self.shutdown.clone();
            let wait_timeout = self.process.wait_timeout();
            let handle = std::thread::Builder::new()
                .name(format!("logq-process-{}", thread_no))
                .spawn(move || worker::run_process_worker(stages, slot, wait_timeout, shutdown))?;
            handles.push(handle);
        }

        let stages = self.stages.clone();
        let shutdown = self.shutdown.clone();
        let check_interval = Duration::from_secs(self.retry.check_interval_secs);
        let handle = std::thread::Builder::new()
            .name("logq-blocked-poller".to_string())
            .spawn(move || worker::run_blocked_event_poller(stages, check_interval, shutdown))?;
        handles.push(handle);

        info!("pipeline started with {} process workers", thread_count);
        Ok(())
    }

    /// Stops every thread started by `start` and waits for them.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        self.stages.process_queue.signal();
        self.stages.blocked_events.signal();

        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        let mut panicked = 0;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            error!("{} pipeline threads panicked", panicked);
            return Err(Error::Fatal(format!("{} pipeline threads panicked", panicked)));
        }

        info!("pipeline stopped");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.shutdown() {
                error!("pipeline shutdown failed: {:?}", e);
            }
        }
    }
}
