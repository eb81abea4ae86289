//! Priority tiers and fair rotation seen from a worker loop.

use std::sync::Arc;

use logstore_queue::FairnessCursor;
use logstore_queue::KeyedDispatcher;
use logstore_queue::LogstoreKey;
use logstore_queue::PriorityTier;
use logstore_queue::QueueParams;
use logstore_queue::WorkerSlot;

use crate::commons::enable_logger;
use crate::commons::AlwaysAdmit;

fn dispatcher() -> KeyedDispatcher<u64> {
    KeyedDispatcher::new(QueueParams::new(100, 20, 30).unwrap()).unwrap()
}

#[test]
fn priority_tiers_drain_before_rotation() {
    enable_logger();
    let dispatcher = dispatcher();
    let (low, high, plain_a, plain_b) = (
        LogstoreKey::new(1),
        LogstoreKey::new(2),
        LogstoreKey::new(3),
        LogstoreKey::new(4),
    );
    dispatcher.set_priority(low, PriorityTier::Third);
    dispatcher.set_priority(high, PriorityTier::First);
    for key in [low, high, plain_a, plain_b] {
        for seq in 0..2 {
            dispatcher.push(key, key.0 * 10 + seq).unwrap();
        }
    }

    let mut cursor: FairnessCursor = None;
    let order: Vec<u64> = std::iter::from_fn(|| dispatcher.pop_checked(&mut cursor, &AlwaysAdmit, WorkerSlot::single()))
        .map(|(_, item)| item)
        .collect();

    // tier 1 empties first, then tier 3, then the rotation alternates
    assert_eq!(order, vec![20, 21, 10, 11, 30, 40, 31, 41]);
}

#[test]
fn rotation_shares_pops_evenly_between_busy_logstores() {
    enable_logger();
    let dispatcher = Arc::new(dispatcher());
    let keys: Vec<LogstoreKey> = (1..=5).map(LogstoreKey::new).collect();
    for key in &keys {
        for seq in 0..20 {
            dispatcher.push(*key, seq).unwrap();
        }
    }

    let mut cursor: FairnessCursor = None;
    let mut served = std::collections::HashMap::new();
    for _ in 0..50 {
        let (key, _) = dispatcher.pop(&mut cursor).unwrap();
        *served.entry(key).or_insert(0) += 1;
    }

    for key in &keys {
        assert_eq!(served.get(key), Some(&10), "logstore {} was not served fairly", key);
    }
}

#[test]
fn two_workers_keep_independent_cursors() {
    enable_logger();
    let dispatcher = dispatcher();
    for key in 1..=3 {
        dispatcher.push(LogstoreKey::new(key), key).unwrap();
        dispatcher.push(LogstoreKey::new(key), key * 100).unwrap();
    }

    let mut first: FairnessCursor = None;
    let mut second: FairnessCursor = None;
    let (k1, _) = dispatcher.pop(&mut first).unwrap();
    let (k2, _) = dispatcher.pop(&mut second).unwrap();
    let (k3, _) = dispatcher.pop(&mut first).unwrap();

    assert_eq!(k1, LogstoreKey::new(1));
    // the second worker starts its own rotation from the beginning
    assert_eq!(k2, LogstoreKey::new(1));
    assert_eq!(k3, LogstoreKey::new(2));
    assert_eq!(first, Some(LogstoreKey::new(2)));
    assert_eq!(second, Some(LogstoreKey::new(1)));
}
