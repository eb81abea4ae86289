use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct LogConfig {
    /// Directory of `logq.log`; logs go to stdout when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}
