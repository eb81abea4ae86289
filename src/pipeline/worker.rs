use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use super::LogBatch;
use super::Stages;
use crate::utils::time::get_now_as_u64;
use crate::FairnessCursor;
use crate::LogstoreKey;
use crate::WorkerSlot;

pub(super) fn run_process_worker(
    stages: Arc<Stages>,
    slot: WorkerSlot,
    wait_timeout: Duration,
    shutdown: Arc<AtomicBool>,
) {
    debug!(
        "process worker {}/{} started",
        slot.thread_no(),
        slot.thread_count()
    );
    let mut cursor: FairnessCursor = None;

    while !shutdown.load(Ordering::Acquire) {
        let popped = stages
            .process_queue
            .pop_checked(&mut cursor, &*stages.sender_queue, slot);
        match popped {
            Some((key, batch)) => forward(&stages, key, batch.processed(), wait_timeout, &shutdown),
            None => {
                stages.process_queue.wait(wait_timeout);
            }
        }
    }

    debug!("process worker {} stopped", slot.thread_no());
}

/// Hands a processed batch to the sender stage, retrying while it is full.
fn forward(
    stages: &Stages,
    key: LogstoreKey,
    batch: LogBatch,
    wait_timeout: Duration,
    shutdown: &AtomicBool,
) {
    let mut batch = batch;
    loop {
        match stages.sender_queue.push(key, batch) {
            Ok(()) => return,
            Err(rejected) => {
                if shutdown.load(Ordering::Acquire) {
                    warn!(
                        "shutting down, dropping {} lines of logstore {}",
                        rejected.line_count(),
                        key
                    );
                    return;
                }
                batch = rejected;
                std::thread::sleep(wait_timeout);
            }
        }
    }
}

pub(super) fn run_blocked_event_poller(
    stages: Arc<Stages>,
    check_interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    debug!("blocked event poller started");

    while !shutdown.load(Ordering::Acquire) {
        stages.blocked_events.wait(check_interval);
        stages.redispatch_blocked(get_now_as_u64());
    }

    debug!("blocked event poller stopped");
}
