//! Configuration management for the queue core and its pipeline.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Config file (argument or `CONFIG_PATH`)
//! 3. Local overrides (`config/local.toml`, optional)
//! 4. Environment variables (`LOGQ__<SECTION>__<FIELD>`, highest priority)
//!

mod logging;
mod logstore;
mod queue;
mod retry;
pub use logging::*;
pub use logstore::*;
pub use queue::*;
pub use retry::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Process stage queues (reader -> processor)
    #[serde(default)]
    pub queue: QueueConfig,
    /// Sender stage queues (processor -> network)
    #[serde(default = "QueueConfig::sender_default")]
    pub sender_queue: QueueConfig,
    /// Process worker pool
    #[serde(default)]
    pub process: ProcessConfig,
    /// Blocked event backoff
    #[serde(default)]
    pub retry: BackoffConfig,
    /// Log output
    #[serde(default)]
    pub log: LogConfig,
    /// Logstores with a priority tier or exactly-once delivery
    #[serde(default)]
    pub logstores: Vec<LogstoreConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            sender_queue: QueueConfig::sender_default(),
            process: ProcessConfig::default(),
            retry: BackoffConfig::default(),
            log: LogConfig::default(),
            logstores: Vec::new(),
        }
    }
}

impl Settings {
    /// Load configuration from multiple sources with priority:
    /// 1. Config file given by `path`, or by `CONFIG_PATH`
    /// 2. Local overrides
    /// 3. Environment variables
    ///
    /// # Arguments
    /// * `path` - Optional path to the configuration file
    ///
    /// # Returns
    /// Merged and validated configuration
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        // 1. Main config file
        if let Some(path) = path {
            config = config.add_source(File::with_name(path).required(true));
        } else if let Ok(path) = env::var("CONFIG_PATH") {
            config = config.add_source(File::with_name(&path).required(true));
        }

        // 2. Local overrides
        config = config.add_source(File::with_name("config/local").required(false));

        // 3. Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix("LOGQ")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        self.sender_queue.validate()?;
        self.process.validate()?;
        self.retry.validate()?;
        for logstore in &self.logstores {
            logstore.validate()?;
        }
        Ok(())
    }
}
