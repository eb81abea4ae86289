//! In-process backpressure counters.
//!
//! Nothing here exports over the network; `render` produces the Prometheus
//! text format for whoever wants to log or serve it.

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;

lazy_static! {
    pub static ref QUEUE_PUSH_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "queue_push_rejected_total",
            "Pushes rejected because the logstore queue was at capacity"
        ),
        &["logstore"]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_FEEDBACK_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "queue_feedback_total",
            "Times a full logstore queue drained back to its low watermark"
        ),
        &["logstore"]
    )
    .expect("metric can not be created");

    pub static ref BLOCKED_EVENTS: IntGauge =
        IntGauge::new("blocked_events", "Events parked for delayed re-dispatch")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new_custom(Some("logq".to_string()), None)
            .expect("registry can be created");
        register_custom_metrics(&registry);
        registry
    };
}

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(QUEUE_PUSH_REJECTED_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(QUEUE_FEEDBACK_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BLOCKED_EVENTS.clone()))
        .expect("collector can be registered");
}

/// Text exposition of every metric in `REGISTRY`.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode metrics: {}", e);
        return String::default();
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
