//! Consumers parked on the wake signal.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use logstore_queue::FairnessCursor;
use logstore_queue::FeedbackSink;
use logstore_queue::KeyedDispatcher;
use logstore_queue::LogstoreKey;
use logstore_queue::QueueParams;

use crate::commons::enable_logger;

fn dispatcher() -> Arc<KeyedDispatcher<u64>> {
    Arc::new(KeyedDispatcher::new(QueueParams::new(10, 2, 4).unwrap()).unwrap())
}

#[test]
fn wait_started_before_push_is_woken() {
    enable_logger();
    let dispatcher = dispatcher();

    let waiter = {
        let dispatcher = dispatcher.clone();
        std::thread::spawn(move || {
            let started = Instant::now();
            (dispatcher.wait(Duration::from_secs(5)), started.elapsed())
        })
    };
    std::thread::sleep(Duration::from_millis(50));
    dispatcher.push(LogstoreKey::new(1), 1).unwrap();

    let (woken, elapsed) = waiter.join().unwrap();
    assert!(woken);
    assert!(elapsed < Duration::from_secs(5));
}

#[test]
fn idle_wait_times_out() {
    enable_logger();
    let dispatcher = dispatcher();

    let started = Instant::now();
    assert!(!dispatcher.wait(Duration::from_millis(100)));
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(90), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "returned after {:?}", elapsed);
}

#[test]
fn downstream_drain_wakes_upstream_consumer() {
    enable_logger();
    let upstream = dispatcher();
    let downstream = dispatcher();
    downstream.set_feedback_sink(upstream.clone());
    let key = LogstoreKey::new(3);

    for seq in 0..4 {
        downstream.push(key, seq).unwrap();
    }
    assert!(!downstream.is_valid_to_push(key));
    assert!(!FeedbackSink::is_valid_to_push(&*downstream, key));

    let waiter = {
        let upstream = upstream.clone();
        std::thread::spawn(move || upstream.wait(Duration::from_secs(5)))
    };
    std::thread::sleep(Duration::from_millis(20));

    let mut cursor: FairnessCursor = None;
    downstream.pop(&mut cursor).unwrap();
    downstream.pop(&mut cursor).unwrap();

    assert!(downstream.is_valid_to_push(key));
    assert!(waiter.join().unwrap());
}
