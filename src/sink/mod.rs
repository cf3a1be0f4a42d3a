//! Downstream consumers of converted records.

mod buffered;
mod sam;

pub use buffered::{BufferedSink, DEFAULT_BUFFER_SIZE};
pub use sam::SamWriter;

use auto_impl::auto_impl;

use crate::record::OutputRecord;
use crate::Result;

/// A consumer of output records
///
/// A sink may refuse further records, for example when the reader on the other end of a
/// pipe went away. Refusal is not an error; the converter simply stops.
#[auto_impl(&mut, Box)]
pub trait RecordSink {
    /// Takes one record, returning false if the sink does not want any more records
    fn accept(&mut self, record: &OutputRecord) -> Result<bool>;

    /// Flushes and releases the sink
    ///
    /// Records accepted after closing are an error.
    fn close(&mut self) -> Result<()>;
}

/// Collects records in memory
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    pub records: Vec<OutputRecord>,
    /// Refuse the record at this index and everything after it
    pub limit: Option<usize>,
    pub closed: bool,
}
impl VecSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that accepts `limit` records and refuses the next one
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}
impl RecordSink for VecSink {
    fn accept(&mut self, record: &OutputRecord) -> Result<bool> {
        if self.closed {
            return Err(crate::WriteError::SinkClosed.into());
        }
        if self.limit.is_some_and(|limit| self.records.len() >= limit) {
            return Ok(false);
        }
        self.records.push(record.clone());
        Ok(true)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
