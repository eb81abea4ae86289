use serde::Deserialize;
use serde::Serialize;

use crate::LogstoreKey;
use crate::PriorityTier;
use crate::Result;

/// Per-logstore scheduling options registered at startup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LogstoreConfig {
    pub project: String,
    pub logstore: String,

    /// Priority tier 1..=3; unset logstores share the fair rotation
    #[serde(default)]
    pub priority: Option<u8>,

    /// Drain this logstore from a single worker thread
    #[serde(default)]
    pub exactly_once: bool,
}

impl LogstoreConfig {
    pub fn key(&self) -> LogstoreKey {
        LogstoreKey::from_parts(&self.project, &self.logstore)
    }

    pub fn priority_tier(&self) -> Result<Option<PriorityTier>> {
        match self.priority {
            Some(tier) => Ok(Some(PriorityTier::try_from(tier)?)),
            None => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.priority_tier().map(|_| ())
    }
}
