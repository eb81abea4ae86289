//! Keyed bounded queues with hysteresis backpressure.
//!
//! - [`BoundedKeyQueue`]: fixed-capacity FIFO that stops accepting producers
//!   at its high watermark and accepts them again at its low watermark.
//! - [`KeyedDispatcher`]: one queue per logstore, drained by priority tier
//!   and then by fair rotation, with an exactly-once sharding rule.
//! - [`BlockedEventTracker`]: parks events of saturated logstores and hands
//!   them back with exponential backoff.
//! - [`Pipeline`]: a process stage and a sender stage chained through their
//!   feedback sinks.

mod config;
mod errors;
pub mod metrics;
mod pipeline;
mod queue;
mod retry;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use pipeline::*;
pub use queue::*;
pub use retry::*;
