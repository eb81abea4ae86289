//! Exactly-once logstores shared by several workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use logstore_queue::FairnessCursor;
use logstore_queue::KeyedDispatcher;
use logstore_queue::LogstoreKey;
use logstore_queue::QueueParams;
use logstore_queue::WorkerSlot;

use crate::commons::enable_logger;
use crate::commons::AlwaysAdmit;

const THREADS: usize = 4;
const ITEMS_PER_KEY: u64 = 500;

/// Drains `dispatcher` from `THREADS` workers and returns what each saw.
fn drain_concurrently(dispatcher: Arc<KeyedDispatcher<(LogstoreKey, u64)>>) -> Vec<Vec<(LogstoreKey, u64)>> {
    let handles: Vec<_> = (0..THREADS)
        .map(|thread_no| {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                let slot = WorkerSlot::new(thread_no, THREADS).unwrap();
                let mut cursor: FairnessCursor = None;
                let mut popped = Vec::new();
                loop {
                    match dispatcher.pop_checked(&mut cursor, &AlwaysAdmit, slot) {
                        Some((_, item)) => popped.push(item),
                        None => {
                            if dispatcher.is_empty() {
                                break;
                            }
                            dispatcher.wait(Duration::from_millis(1));
                        }
                    }
                }
                popped
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn exactly_once_key_is_only_drained_by_its_owner() {
    enable_logger();
    let dispatcher = Arc::new(KeyedDispatcher::new(QueueParams::new(1000, 100, 900).unwrap()).unwrap());

    let eo_key = LogstoreKey::new(6);
    dispatcher.convert_to_exactly_once(eo_key);
    let normal_keys = [LogstoreKey::new(1), LogstoreKey::new(2), LogstoreKey::new(3)];
    for seq in 0..ITEMS_PER_KEY {
        dispatcher.push(eo_key, (eo_key, seq)).unwrap();
        for key in normal_keys {
            dispatcher.push(key, (key, seq)).unwrap();
        }
    }

    let per_thread = drain_concurrently(dispatcher.clone());

    let owner = (eo_key.shard() % THREADS as u64) as usize;
    for (thread_no, popped) in per_thread.iter().enumerate() {
        let eo_items: Vec<u64> = popped
            .iter()
            .filter(|(key, _)| *key == eo_key)
            .map(|(_, seq)| *seq)
            .collect();
        if thread_no == owner {
            // the single owner sees the whole key in FIFO order
            assert_eq!(eo_items, (0..ITEMS_PER_KEY).collect::<Vec<_>>());
        } else {
            assert!(eo_items.is_empty(), "thread {} drained an exactly-once key", thread_no);
        }
    }

    let total: usize = per_thread.iter().map(|p| p.len()).sum();
    assert_eq!(total, 4 * ITEMS_PER_KEY as usize);
    assert!(dispatcher.is_empty());
}

#[test]
fn every_item_is_delivered_once_under_concurrent_push_and_pop() {
    enable_logger();
    let dispatcher: Arc<KeyedDispatcher<(LogstoreKey, u64)>> =
        Arc::new(KeyedDispatcher::new(QueueParams::new(64, 8, 48).unwrap()).unwrap());
    let keys: Vec<LogstoreKey> = (0..10).map(LogstoreKey::new).collect();
    for key in keys.iter().step_by(3) {
        dispatcher.convert_to_exactly_once(*key);
    }

    let producers: Vec<_> = keys
        .iter()
        .copied()
        .map(|key| {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                for seq in 0..ITEMS_PER_KEY {
                    let mut item = (key, seq);
                    // a full queue hands the item back; retry until accepted
                    while let Err(rejected) = dispatcher.push(key, item) {
                        item = rejected;
                        std::thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..THREADS)
        .map(|thread_no| {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                let slot = WorkerSlot::new(thread_no, THREADS).unwrap();
                let mut cursor: FairnessCursor = None;
                let mut popped = Vec::new();
                let expected = 10 * ITEMS_PER_KEY as usize;
                let mut idle_rounds = 0;
                while idle_rounds < 200 {
                    match dispatcher.pop_checked(&mut cursor, &AlwaysAdmit, slot) {
                        Some((_, item)) => {
                            popped.push(item);
                            idle_rounds = 0;
                        }
                        None => {
                            idle_rounds += 1;
                            dispatcher.wait(Duration::from_millis(5));
                        }
                    }
                    if popped.len() == expected {
                        break;
                    }
                }
                popped
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let mut delivered: HashMap<LogstoreKey, Vec<u64>> = HashMap::new();
    for consumer in consumers {
        for (key, seq) in consumer.join().unwrap() {
            delivered.entry(key).or_default().push(seq);
        }
    }

    for key in keys {
        let mut seqs = delivered.remove(&key).unwrap_or_default();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..ITEMS_PER_KEY).collect::<Vec<_>>(), "logstore {}", key);
    }
}
