//! # cramconv
//!
//! Converts a stream of compressed alignment containers into SAM records, or counts its
//! records and bases.
//!
//! The pipeline pulls one container at a time from a [`ContainerSource`], decodes it into
//! a reusable [`SegmentBatch`], restores mate information and template lengths for every
//! template of the batch, converts each segment into an [`OutputRecord`], filters on the
//! converted flags and hands the survivors to a [`RecordSink`] or a counter.
//!
//! Counting without flag masks skips decoding entirely and sums the record and base
//! counts declared by the container headers.
//!
//! ```rust
//! use cramconv::container::{ContainerReader, ContainerWriterBuilder};
//! use cramconv::{AlignmentSegment, RunConfigBuilder, RunController};
//!
//! let mut writer = ContainerWriterBuilder::default().build(Vec::new()).unwrap();
//! writer.write_segment(&AlignmentSegment::new("r1").with_bases(b"ACGTACGT")).unwrap();
//! let bytes = writer.into_inner().unwrap();
//!
//! let config = RunConfigBuilder::default().count_only(true).build().unwrap();
//! let mut source = ContainerReader::new(bytes.as_slice()).unwrap();
//! let report = RunController::new(config).run(&mut source, None).unwrap();
//! assert_eq!(report.statistics.to_string(), "READS: 1; BASES: 8");
//! ```

pub mod container;
mod controller;
mod converter;
mod error;
pub mod filter;
pub mod flags;
mod mate;
mod policy;
mod record;
mod segment;
pub mod sink;
mod source;
mod stats;

pub use controller::{RunConfig, RunConfigBuilder, RunController, RunReport};
pub use converter::{ContainerStreamConverter, ConverterOptions, Destination};
pub use error::{ConfigError, DecodeError, Error, HeaderError, ReadError, Result, WriteError};
pub use filter::FlagFilter;
pub use mate::{insert_size, resolve_batch, resolve_mates};
pub use policy::{BasePolicy, ValidationPolicy};
pub use record::{OutputRecord, RecordConverter, SamRecordConverter, DEFAULT_QUALITY};
pub use segment::{AlignmentSegment, SegmentBatch, SegmentId};
pub use sink::{BufferedSink, RecordSink, SamWriter};
pub use source::{Container, ContainerSource};
pub use stats::{RunStatistics, RunTimings, StopReason};

#[cfg(test)]
mod testing {
    use super::*;
    use crate::container::{
        ContainerReader, ContainerWriterBuilder, ReferenceSequence, StreamHeader,
    };
    use crate::flags::{FIRST_SEGMENT, LAST_SEGMENT, MATE_REVERSE, PAIRED, REVERSE};

    fn stream() -> Result<Vec<u8>> {
        let header = StreamHeader::new(vec![ReferenceSequence::new("chr1", 5_000)]);
        let mut writer = ContainerWriterBuilder::default()
            .header(header)
            .build(Vec::new())?;

        let read = |name: &str, flags: u16, start: i32| {
            AlignmentSegment::new(name)
                .with_flags(flags)
                .with_alignment(0, start)
                .with_mapping_quality(60)
                .with_bases(b"ACGTACGTAC")
        };
        writer.write_segment(&read("single1", 0, 10).with_qualities(&[40; 10]))?;
        writer.write_template(&[
            read("pairA", PAIRED | FIRST_SEGMENT, 100),
            read("pairA", PAIRED | LAST_SEGMENT | REVERSE, 200),
        ])?;
        writer.write_segment(&AlignmentSegment::new("single2").with_bases(b"ACGT"))?;
        writer.write_template(&[
            read("pairB", PAIRED | FIRST_SEGMENT | REVERSE, 700),
            read("pairB", PAIRED | LAST_SEGMENT, 600),
        ])?;
        writer.into_inner()
    }

    #[test]
    fn test_sam_output() -> Result<()> {
        let bytes = stream()?;
        let mut source = ContainerReader::new(bytes.as_slice())?;
        let mut sink = SamWriter::new(Vec::new(), source.header(), true)?;

        let config = RunConfigBuilder::default().build()?;
        let report = RunController::new(config).run(&mut source, Some(&mut sink))?;
        assert_eq!(report.reason, StopReason::EndOfStream);
        assert_eq!(report.statistics.records, 6);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "@HD\tVN:1.6\tSO:unsorted",
                "@SQ\tSN:chr1\tLN:5000",
                "single1\t0\tchr1\t10\t60\t10M\t*\t0\t0\tACGTACGTAC\tIIIIIIIIII",
                "pairA\t97\tchr1\t100\t60\t10M\t=\t200\t110\tACGTACGTAC\t??????????",
                "pairA\t145\tchr1\t200\t60\t10M\t=\t100\t-110\tACGTACGTAC\t??????????",
                "single2\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t????",
                "pairB\t81\tchr1\t700\t60\t10M\t=\t600\t-110\tACGTACGTAC\t??????????",
                "pairB\t161\tchr1\t600\t60\t10M\t=\t700\t110\tACGTACGTAC\t??????????",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_count_only_agrees_with_conversion() -> Result<()> {
        let bytes = stream()?;

        let config = RunConfigBuilder::default().count_only(true).build()?;
        let mut source = ContainerReader::new(bytes.as_slice())?;
        let counted = RunController::new(config).run(&mut source, None)?;
        assert_eq!(counted.statistics.to_string(), "READS: 6; BASES: 54");

        let config = RunConfigBuilder::default().build()?;
        let mut source = ContainerReader::new(bytes.as_slice())?;
        let mut sink = sink::VecSink::new();
        let converted = RunController::new(config).run(&mut source, Some(&mut sink))?;
        assert_eq!(converted.statistics.records, counted.statistics.records);
        assert_eq!(converted.statistics.bases, counted.statistics.bases);

        let paired: Vec<_> = sink.records.iter().filter(|r| r.flags & PAIRED != 0).collect();
        assert_eq!(paired.len(), 4);
        assert!(paired.iter().all(|r| r.mate_position != 0));
        assert_eq!(paired[0].flags & MATE_REVERSE, MATE_REVERSE);
        Ok(())
    }

    #[test]
    fn test_buffered_output_matches_direct_output() -> Result<()> {
        let bytes = stream()?;
        let render = |buffered: bool| -> Result<Vec<u8>> {
            let mut source = ContainerReader::new(bytes.as_slice())?;
            let output = tempfile::NamedTempFile::new()?;
            let file = output.reopen()?;
            let writer = SamWriter::new(std::io::BufWriter::new(file), source.header(), false)?;
            let mut sink: Box<dyn RecordSink> = if buffered {
                Box::new(BufferedSink::new(writer, 2)?)
            } else {
                Box::new(writer)
            };
            let config = RunConfigBuilder::default().build()?;
            RunController::new(config).run(&mut source, Some(sink.as_mut()))?;
            drop(sink);
            Ok(std::fs::read(output.path())?)
        };
        assert_eq!(render(false)?, render(true)?);
        Ok(())
    }
}
