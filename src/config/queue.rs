use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::QueueParams;
use crate::Result;

/// Sizing of every logstore queue of one stage
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Hard limit of items per logstore
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// A full queue accepts producers again once drained to this size
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,

    /// A queue stops accepting producers once it grows to this size
    #[serde(default = "default_high_watermark")]
    pub high_watermark: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            low_watermark: default_low_watermark(),
            high_watermark: default_high_watermark(),
        }
    }
}

impl QueueConfig {
    /// Sender queues drain slower and hold fewer batches.
    pub fn sender_default() -> Self {
        Self {
            capacity: 100,
            low_watermark: 10,
            high_watermark: 20,
        }
    }

    pub fn params(&self) -> Result<QueueParams> {
        Ok(QueueParams::new(
            self.capacity,
            self.low_watermark,
            self.high_watermark,
        )?)
    }

    pub fn validate(&self) -> Result<()> {
        self.params().map(|_| ())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Number of process workers; exactly-once logstores are sharded over them
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Idle wait of a worker that found nothing to pop
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl ProcessConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config(ConfigError::Message(
                "worker_threads must be greater than 0".into(),
            )));
        }
        if self.wait_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "wait_timeout_ms must be at least 1ms".into(),
            )));
        }
        Ok(())
    }
}

fn default_capacity() -> usize {
    100
}
fn default_low_watermark() -> usize {
    20
}
fn default_high_watermark() -> usize {
    30
}
fn default_worker_threads() -> usize {
    2
}
// in ms
fn default_wait_timeout_ms() -> u64 {
    100
}
