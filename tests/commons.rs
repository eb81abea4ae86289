use std::time::Duration;
use std::time::Instant;

use logstore_queue::FeedbackSink;
use logstore_queue::LogstoreKey;
use tracing_subscriber::EnvFilter;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

/// Admission authority that never vetoes.
pub struct AlwaysAdmit;

impl FeedbackSink for AlwaysAdmit {
    fn feedback(
        &self,
        _key: LogstoreKey,
    ) {
    }

    fn is_valid_to_push(
        &self,
        _key: LogstoreKey,
    ) -> bool {
        true
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
