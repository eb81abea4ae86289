//! End-to-end flow through both stages under sustained backpressure.

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use logstore_queue::utils::time::get_now_as_u64;
use logstore_queue::FairnessCursor;
use logstore_queue::LogBatch;
use logstore_queue::LogstoreConfig;
use logstore_queue::LogstoreKey;
use logstore_queue::Offer;
use logstore_queue::Pipeline;
use logstore_queue::QueueConfig;
use logstore_queue::Settings;

use crate::commons::enable_logger;
use crate::commons::wait_until;

const LINES_PER_LOGSTORE: usize = 40;

fn tight_settings() -> Settings {
    let mut settings = Settings::default();
    settings.queue = QueueConfig {
        capacity: 10,
        low_watermark: 2,
        high_watermark: 4,
    };
    settings.sender_queue = QueueConfig {
        capacity: 10,
        low_watermark: 1,
        high_watermark: 2,
    };
    settings.process.worker_threads = 3;
    settings.process.wait_timeout_ms = 10;
    settings.retry.initial_timeout_secs = 1;
    settings.retry.max_timeout_secs = 2;
    settings.retry.check_interval_secs = 1;
    settings.logstores = ["access", "audit", "error"]
        .iter()
        .map(|name| LogstoreConfig {
            project: "it".into(),
            logstore: name.to_string(),
            priority: None,
            exactly_once: true,
        })
        .collect();
    settings
}

#[test]
fn every_line_arrives_in_order_despite_backpressure() {
    enable_logger();
    let settings = tight_settings();
    let keys: Vec<LogstoreKey> = settings.logstores.iter().map(|l| l.key()).collect();
    let pipeline = Pipeline::new(&settings).unwrap();
    pipeline.start().unwrap();

    let mut blocked = 0;
    for seq in 0..LINES_PER_LOGSTORE {
        for key in &keys {
            let batch = LogBatch::new(*key, format!("/logs/{}.log", key), seq as u64, vec![format!("{}\n", seq)]);
            if pipeline.offer(batch, get_now_as_u64()) == Offer::Blocked {
                blocked += 1;
            }
        }
    }
    // nothing drains the sender yet, so producers must have been pushed back
    assert!(blocked > 0);

    let mut received: HashMap<LogstoreKey, Vec<usize>> = HashMap::new();
    let mut cursor: FairnessCursor = None;
    let deadline = Instant::now() + Duration::from_secs(15);
    let expected = keys.len() * LINES_PER_LOGSTORE;
    let mut total = 0;
    while total < expected && Instant::now() < deadline {
        match pipeline.pop_sendable(&mut cursor) {
            Some((key, batch)) => {
                assert_eq!(key, batch.logstore);
                for line in batch.lines {
                    received.entry(key).or_default().push(line.parse().unwrap());
                    total += 1;
                }
            }
            None => {
                pipeline.wait_sendable(Duration::from_millis(10));
            }
        }
    }

    for key in &keys {
        assert_eq!(
            received.get(key).cloned().unwrap_or_default(),
            (0..LINES_PER_LOGSTORE).collect::<Vec<_>>(),
            "logstore {}",
            key
        );
    }
    assert!(wait_until(Duration::from_secs(1), || pipeline.blocked_events().is_empty()));
    pipeline.shutdown().unwrap();

    let status = pipeline.status();
    assert_eq!(status.process.eo_total_count, 3);
    assert_eq!(status.process.invalid_count, 0);
    assert_eq!(status.blocked_events, 0);
}
