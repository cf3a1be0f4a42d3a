//! The container decode loop.

use std::time::Instant;

use log::info;

use crate::error::Result;
use crate::filter::FlagFilter;
use crate::mate::resolve_batch;
use crate::policy::ValidationPolicy;
use crate::record::{OutputRecord, RecordConverter};
use crate::segment::SegmentBatch;
use crate::sink::RecordSink;
use crate::source::{Container, ContainerSource};
use crate::stats::{RunStatistics, RunTimings, StopReason};

/// Where records surviving the filter go
pub enum Destination<'a> {
    /// Only count records and bases
    Count,
    /// Hand every record to a sink
    Sink(&'a mut dyn RecordSink),
}
impl Destination<'_> {
    #[must_use]
    pub fn is_count(&self) -> bool {
        matches!(self, Self::Count)
    }
}

/// Settings of a single pass over a container stream
#[derive(Debug, Clone, Copy, Default)]
pub struct ConverterOptions {
    pub filter: FlagFilter,
    /// Stop once this many records were emitted or counted
    pub max_records: Option<u64>,
    pub validation: ValidationPolicy,
}
impl ConverterOptions {
    fn cap_reached(&self, records: u64) -> bool {
        self.max_records.is_some_and(|cap| records >= cap)
    }
}

/// Drives containers from a source through mate resolution, conversion and filtering
///
/// The converter owns the per-container state: the container buffer, the segment batch
/// and the output record. All of it is reused from one container to the next.
pub struct ContainerStreamConverter<C: RecordConverter> {
    converter: C,
    container: Container,
    batch: SegmentBatch,
    record: OutputRecord,
    timings: RunTimings,
}
impl<C: RecordConverter> ContainerStreamConverter<C> {
    pub fn new(converter: C) -> Self {
        Self {
            converter,
            container: Container::new(),
            batch: SegmentBatch::new(),
            record: OutputRecord::new(),
            timings: RunTimings::default(),
        }
    }

    /// Accumulated stage timings of every run so far
    #[must_use]
    pub fn timings(&self) -> RunTimings {
        self.timings
    }

    /// Converts containers until the stream ends, the sink refuses, or the cap is hit
    ///
    /// When counting without masks or cap, containers are counted from their headers
    /// without being decoded. Otherwise every container is decoded, its templates are
    /// resolved, and each segment is converted and filtered on the converted flags.
    ///
    /// `stats` is only updated with containers that were fully handled, or with the
    /// records emitted before the run stopped inside a container.
    pub fn run<S>(
        &mut self,
        source: &mut S,
        mut destination: Destination<'_>,
        options: &ConverterOptions,
        stats: &mut RunStatistics,
    ) -> Result<StopReason>
    where
        S: ContainerSource + ?Sized,
    {
        let fast_count = destination.is_count()
            && options.filter.is_pass_through()
            && options.max_records.is_none();

        let reason = loop {
            if options.cap_reached(stats.records) {
                break StopReason::ResultCap;
            }

            let mut timings = RunTimings::default();
            let start = Instant::now();
            source.next_container(&mut self.container, options.validation)?;
            timings.io = start.elapsed();
            if self.container.is_eof() {
                break StopReason::EndOfStream;
            }

            let mut tally = RunStatistics::default();
            if fast_count {
                tally.records = u64::from(self.container.n_records());
                tally.bases = self.container.n_bases();
                tally.containers = 1;
                self.finish_container(&timings, &tally, stats);
                continue;
            }

            let start = Instant::now();
            self.batch.clear();
            source.decode(&self.container, &mut self.batch, options.validation)?;
            resolve_batch(&mut self.batch);
            timings.decode = start.elapsed();

            let mut stop = None;
            for index in 0..self.batch.len() {
                if options.cap_reached(stats.records + tally.records) {
                    stop = Some(StopReason::ResultCap);
                    break;
                }

                let start = Instant::now();
                self.converter
                    .convert(&self.batch[index], &mut self.record)?;
                timings.convert += start.elapsed();

                if !options.filter.passes(self.record.flags) {
                    tally.filtered += 1;
                    continue;
                }

                if let Destination::Sink(sink) = &mut destination {
                    let start = Instant::now();
                    let accepted = sink.accept(&self.record)?;
                    timings.write += start.elapsed();
                    if !accepted {
                        stop = Some(StopReason::SinkClosed);
                        break;
                    }
                }
                tally.records += 1;
                tally.bases += u64::from(self.batch[index].read_length);
            }

            if stop.is_none() {
                tally.containers = 1;
            }
            self.finish_container(&timings, &tally, stats);
            if let Some(reason) = stop {
                break reason;
            }
        };

        info!(
            "Stopped after {} containers ({reason}): {} records, {} bases, {} filtered",
            stats.containers, stats.records, stats.bases, stats.filtered
        );
        self.timings.log_totals();
        Ok(reason)
    }

    fn finish_container(
        &mut self,
        timings: &RunTimings,
        tally: &RunStatistics,
        stats: &mut RunStatistics,
    ) {
        timings.log_container(self.container.position(), tally);
        self.timings.add(timings);
        stats.merge(tally);
    }
}
