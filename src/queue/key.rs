use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

/// Identifies one logstore (or one shard of it).
///
/// Keys are totally ordered; the dispatcher walks them in that order when
/// rotating between logstores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LogstoreKey(pub u64);

impl LogstoreKey {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derive a key from the project and logstore names.
    pub fn from_parts(
        project: &str,
        logstore: &str,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        project.hash(&mut hasher);
        logstore.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Integer used to assign exactly-once keys to a worker thread.
    pub fn shard(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogstoreKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LogstoreKey {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
