use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Backoff applied to events parked in the blocked event tracker
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry of a newly blocked event (unit: seconds)
    #[serde(default = "default_initial_timeout_secs")]
    pub initial_timeout_secs: u64,

    /// Upper bound of the retry delay (unit: seconds)
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,

    /// How often the poller looks for due events (unit: seconds)
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Lines a single parked batch may hold before producers are pushed back
    #[serde(default = "default_max_parked_lines")]
    pub max_parked_lines: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_timeout_secs: default_initial_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            check_interval_secs: default_check_interval_secs(),
            max_parked_lines: default_max_parked_lines(),
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_timeout_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "initial_timeout_secs must be greater than 0".into(),
            )));
        }
        if self.initial_timeout_secs > self.max_timeout_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "initial_timeout_secs {} exceeds max_timeout_secs {}",
                self.initial_timeout_secs, self.max_timeout_secs
            ))));
        }
        if self.check_interval_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "check_interval_secs must be greater than 0".into(),
            )));
        }
        if self.max_parked_lines == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_parked_lines must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_initial_timeout_secs() -> u64 {
    1
}
fn default_max_timeout_secs() -> u64 {
    30
}
fn default_check_interval_secs() -> u64 {
    1
}
fn default_max_parked_lines() -> usize {
    4096
}
