use crate::BlockId;
use crate::LogstoreKey;

/// Lines read from one source file, on their way to a logstore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBatch {
    pub logstore: LogstoreKey,
    /// Path of the file the lines were read from
    pub source: String,
    /// Byte offset of the first line within `source`
    pub offset: u64,
    pub lines: Vec<String>,
}

impl LogBatch {
    pub fn new(
        logstore: LogstoreKey,
        source: impl Into<String>,
        offset: u64,
        lines: Vec<String>,
    ) -> Self {
        Self {
            logstore,
            source: source.into(),
            offset,
            lines,
        }
    }

    /// Batches of the same file share one blocked-event slot.
    pub fn block_id(&self) -> BlockId {
        BlockId::new((self.logstore, &self.source))
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn byte_len(&self) -> usize {
        self.lines.iter().map(|line| line.len()).sum()
    }

    /// Appends a later batch of the same source.
    pub fn merge(
        &mut self,
        later: LogBatch,
    ) {
        self.lines.extend(later.lines);
    }

    /// Process-stage transform: strips line terminators and drops blank lines.
    pub fn processed(mut self) -> Self {
        self.lines = self
            .lines
            .into_iter()
            .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
            .filter(|line| !line.trim().is_empty())
            .collect();
        self
    }
}
