//! Run-scoped counters and timings.

use std::fmt;
use std::time::Duration;

use log::{debug, info};

/// Aggregate counts of a conversion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatistics {
    /// Records emitted to the sink or counted
    pub records: u64,
    /// Bases of those records
    pub bases: u64,
    /// Containers fully processed
    pub containers: u64,
    /// Records rejected by the flag filter
    pub filtered: u64,
}
impl RunStatistics {
    pub(crate) fn merge(&mut self, other: &Self) {
        self.records += other.records;
        self.bases += other.bases;
        self.containers += other.containers;
        self.filtered += other.filtered;
    }
}
impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "READS: {}; BASES: {}", self.records, self.bases)
    }
}

/// Why a conversion run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The end-of-stream container was reached
    EndOfStream,
    /// The sink refused a record
    SinkClosed,
    /// The configured number of records was emitted or counted
    ResultCap,
}
impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "end of stream"),
            Self::SinkClosed => write!(f, "sink closed"),
            Self::ResultCap => write!(f, "result cap reached"),
        }
    }
}

/// Time spent in each stage of the conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTimings {
    pub io: Duration,
    pub decode: Duration,
    pub convert: Duration,
    pub write: Duration,
}
impl RunTimings {
    pub(crate) fn add(&mut self, other: &Self) {
        self.io += other.io;
        self.decode += other.decode;
        self.convert += other.convert;
        self.write += other.write;
    }

    pub(crate) fn log_container(&self, position: u64, stats: &RunStatistics) {
        debug!(
            "Container {position}: io {}ms, decode {}ms, convert {}ms, write {}ms, {} bases in {} records",
            self.io.as_millis(),
            self.decode.as_millis(),
            self.convert.as_millis(),
            self.write.as_millis(),
            stats.bases,
            stats.records,
        );
    }

    pub(crate) fn log_totals(&self) {
        info!(
            "Times: io {:.3}s, decode {:.3}s, convert {:.3}s, write {:.3}s",
            self.io.as_secs_f64(),
            self.decode.as_secs_f64(),
            self.convert.as_secs_f64(),
            self.write.as_secs_f64(),
        );
    }
}
