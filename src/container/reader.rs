//! Streaming reader for container streams.

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;
use zstd::Decoder;

use super::header::{ContainerHeader, StreamHeader, SIZE_CONTAINER_HEADER};
use crate::error::{DecodeError, ReadError, Result};
use crate::flags::{NO_ALIGNMENT_START, UNMAPPED_REFERENCE};
use crate::policy::ValidationPolicy;
use crate::segment::{AlignmentSegment, SegmentBatch};
use crate::source::{Container, ContainerSource};

/// Calculates the number of 64-bit words needed to store a nucleotide sequence of the given length
fn encoded_sequence_len(len: u32) -> usize {
    len.div_ceil(32) as usize
}

/// Reads until `buf` is full or the reader is exhausted, returning the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Sequential reader over a container stream
///
/// Works on any [`Read`], including standard input. Containers are pulled one at a time
/// with [`ContainerSource::next_container`] and decoded on demand with
/// [`ContainerSource::decode`], so that counting can skip decoding entirely.
///
/// ```rust
/// use cramconv::container::{ContainerReader, ContainerWriterBuilder};
/// use cramconv::{AlignmentSegment, Container, ContainerSource, SegmentBatch, ValidationPolicy};
///
/// let mut writer = ContainerWriterBuilder::default().build(Vec::new()).unwrap();
/// writer.write_segment(&AlignmentSegment::new("r1").with_bases(b"ACGT")).unwrap();
/// let bytes = writer.into_inner().unwrap();
///
/// let mut reader = ContainerReader::new(bytes.as_slice()).unwrap();
/// let mut container = Container::new();
/// let mut batch = SegmentBatch::new();
/// let policy = ValidationPolicy::default();
/// loop {
///     reader.next_container(&mut container, policy).unwrap();
///     if container.is_eof() {
///         break;
///     }
///     reader.decode(&container, &mut batch, policy).unwrap();
/// }
/// assert_eq!(batch.len(), 1);
/// ```
pub struct ContainerReader<R: Read> {
    inner: R,
    header: StreamHeader,

    /// Position of the next container in the stream
    position: u64,

    /// Set once the end-of-stream container has been handed out
    finished: bool,

    /// Decompressed payload
    ubuf: Vec<u8>,

    /// Packed bases of the record being decoded
    ebuf: Vec<u64>,

    /// Next-fragment links of the container being decoded
    links: Vec<(usize, i32)>,
}
impl<R: Read> ContainerReader<R> {
    /// Reads the stream header and reference dictionary
    pub fn new(mut inner: R) -> Result<Self> {
        let header = StreamHeader::from_reader(&mut inner)?;
        Ok(Self {
            inner,
            header,
            position: 0,
            finished: false,
            ubuf: Vec::new(),
            ebuf: Vec::new(),
            links: Vec::new(),
        })
    }

    /// Number of containers read so far, excluding the end-of-stream container
    #[must_use]
    pub fn n_containers(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn mark_eof(&mut self, container: &mut Container) {
        container.header = ContainerHeader::eof();
        container.position = self.position;
        self.finished = true;
    }

    fn decode_records(
        &mut self,
        container: &Container,
        batch: &mut SegmentBatch,
        policy: ValidationPolicy,
    ) -> std::result::Result<(), DecodeError> {
        let position = container.position;
        let payload: &[u8] = if self.header.compressed {
            self.ubuf.clear();
            let mut decoder = Decoder::with_buffer(container.payload.as_slice())?;
            decoder.read_to_end(&mut self.ubuf)?;
            &self.ubuf
        } else {
            &container.payload
        };

        self.links.clear();
        let mut cursor = payload;
        for index in 0..container.n_records() as usize {
            let slot = batch.push_slot();
            let next_offset = read_record(&mut cursor, slot, &mut self.ebuf)
                .map_err(|_| DecodeError::TruncatedRecord(index))?;
            if slot.read_length > 0 {
                bitnuc::decode(&self.ebuf, slot.read_length as usize, &mut slot.bases)?;
            }

            for reference_id in [slot.reference_id, slot.mate_reference_id] {
                if reference_id != UNMAPPED_REFERENCE
                    && !self.header.contains_reference(reference_id)
                {
                    return Err(DecodeError::UnknownReference {
                        record: index,
                        reference_id,
                    });
                }
            }
            if !slot.is_segment_unmapped() {
                self.check_span(slot, index, position, policy)?;
            }
            if next_offset != 0 {
                if !slot.is_paired() {
                    policy.report(position, || {
                        format!("record {index} is not paired but links to a next fragment")
                    })?;
                }
                self.links.push((index, next_offset));
            }
        }
        if !cursor.is_empty() {
            let trailing = cursor.len();
            policy.report(position, || {
                format!("{trailing} trailing bytes after the last record")
            })?;
        }

        for &(record, offset) in &self.links {
            if offset < 0 {
                return Err(DecodeError::BackwardMateLink {
                    record,
                    distance: offset,
                });
            }
            batch.link(record, record + offset as usize)?;
        }

        let found_bases = batch.n_bases();
        if batch.len() != container.n_records() as usize || found_bases != container.n_bases() {
            return Err(DecodeError::CountMismatch {
                expected: container.n_records(),
                found: batch.len() as u32,
                expected_bases: container.n_bases(),
                found_bases,
            });
        }
        Ok(())
    }

    /// Rejects alignment spans outside the `i32` coordinate range
    ///
    /// A mapped record without a start, or one running past the end of its reference,
    /// is an irregularity reported through `policy`.
    fn check_span(
        &self,
        slot: &AlignmentSegment,
        index: usize,
        position: u64,
        policy: ValidationPolicy,
    ) -> std::result::Result<(), DecodeError> {
        let start = slot.alignment_start;
        let end = slot.alignment_end();
        if start < NO_ALIGNMENT_START || end > i64::from(i32::MAX) {
            return Err(DecodeError::InvalidAlignmentSpan {
                record: index,
                start,
                end,
            });
        }
        if start == NO_ALIGNMENT_START {
            return policy.report(position, || {
                format!("record {index} is mapped but has no alignment start")
            });
        }
        let reference_length = usize::try_from(slot.reference_id)
            .ok()
            .and_then(|id| self.header.references.get(id))
            .map(|reference| reference.length);
        if let Some(length) = reference_length {
            if u64::try_from(end).is_ok_and(|end| end > length) {
                policy.report(position, || {
                    format!("record {index} ends at {end}, past the reference length {length}")
                })?;
            }
        }
        Ok(())
    }
}

/// Reads the fixed fields and packed bases of one record into `slot`
///
/// Returns the next-fragment offset of the record.
fn read_record(
    cursor: &mut &[u8],
    slot: &mut AlignmentSegment,
    ebuf: &mut Vec<u64>,
) -> io::Result<i32> {
    let name_len = cursor.read_u16::<LittleEndian>()? as usize;
    if cursor.len() < name_len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    slot.name.extend_from_slice(&cursor[..name_len]);
    *cursor = &cursor[name_len..];

    slot.flags = cursor.read_u16::<LittleEndian>()?;
    slot.reference_id = cursor.read_i32::<LittleEndian>()?;
    slot.alignment_start = cursor.read_i32::<LittleEndian>()?;
    slot.mapping_quality = cursor.read_u8()?;
    slot.read_length = cursor.read_u32::<LittleEndian>()?;
    let next_offset = cursor.read_i32::<LittleEndian>()?;
    slot.mate_reference_id = cursor.read_i32::<LittleEndian>()?;
    slot.mate_alignment_start = cursor.read_i32::<LittleEndian>()?;
    slot.template_size = cursor.read_i32::<LittleEndian>()?;
    let has_quality = cursor.read_u8()? != 0;

    let n_words = encoded_sequence_len(slot.read_length);
    if cursor.len() < n_words * 8 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    ebuf.clear();
    for _ in 0..n_words {
        ebuf.push(cursor.read_u64::<LittleEndian>()?);
    }

    if has_quality {
        let len = slot.read_length as usize;
        if cursor.len() < len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        slot.qualities.extend_from_slice(&cursor[..len]);
        *cursor = &cursor[len..];
    }
    Ok(next_offset)
}

impl<R: Read> ContainerSource for ContainerReader<R> {
    fn header(&self) -> &StreamHeader {
        &self.header
    }

    fn next_container(&mut self, container: &mut Container, policy: ValidationPolicy) -> Result<()> {
        container.clear();
        if self.finished {
            self.mark_eof(container);
            return Ok(());
        }

        let mut header_bytes = [0u8; SIZE_CONTAINER_HEADER];
        match read_full(&mut self.inner, &mut header_bytes)? {
            0 => {
                policy
                    .report(self.position, || {
                        "stream ended without an end-of-stream container".to_string()
                    })
                    .map_err(|source| ReadError::CorruptContainer {
                        position: self.position,
                        source,
                    })?;
                self.mark_eof(container);
                return Ok(());
            }
            SIZE_CONTAINER_HEADER => {}
            _ => return Err(ReadError::UnexpectedEndOfStream(self.position).into()),
        }

        let header = ContainerHeader::from_bytes(&header_bytes, self.position)?;
        if header.eof {
            self.mark_eof(container);
            return Ok(());
        }

        let size = (&mut self.inner)
            .take(header.size)
            .read_to_end(&mut container.payload)?;
        if (size as u64) < header.size {
            return Err(ReadError::UnexpectedEndOfStream(self.position).into());
        }
        container.header = header;
        container.position = self.position;
        trace!(
            "Read container {} ({} records, {} bytes)",
            self.position,
            header.records,
            size
        );
        self.position += 1;
        Ok(())
    }

    fn decode(
        &mut self,
        container: &Container,
        batch: &mut SegmentBatch,
        policy: ValidationPolicy,
    ) -> Result<()> {
        if container.is_eof() {
            return Ok(());
        }
        self.decode_records(container, batch, policy)
            .map_err(|source| {
                ReadError::CorruptContainer {
                    position: container.position,
                    source,
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::header::ReferenceSequence;
    use crate::container::writer::ContainerWriterBuilder;
    use crate::flags::{FIRST_SEGMENT, LAST_SEGMENT, PAIRED, REVERSE};
    use crate::Error;

    fn header(capacity: u32, compressed: bool) -> StreamHeader {
        StreamHeader::with_capacity(
            capacity,
            compressed,
            vec![
                ReferenceSequence::new("chr1", 10_000),
                ReferenceSequence::new("chr2", 5_000),
            ],
        )
    }

    fn read(name: &str, start: i32) -> AlignmentSegment {
        AlignmentSegment::new(name)
            .with_alignment(0, start)
            .with_mapping_quality(60)
            .with_bases(b"ACGTTGCAACGTTGCAACGTTGCAACGTTGCAACG")
            .with_qualities(&[30; 35])
    }

    fn read_all(bytes: &[u8], policy: ValidationPolicy) -> Result<Vec<Vec<AlignmentSegment>>> {
        let mut reader = ContainerReader::new(bytes)?;
        let mut container = Container::new();
        let mut batch = SegmentBatch::new();
        let mut out = Vec::new();
        loop {
            reader.next_container(&mut container, policy)?;
            if container.is_eof() {
                break;
            }
            batch.clear();
            reader.decode(&container, &mut batch, policy)?;
            out.push(batch.iter().cloned().collect());
        }
        Ok(out)
    }

    #[test]
    fn test_segments_survive_the_stream() -> Result<()> {
        for compressed in [false, true] {
            let first = read("pair", 100).with_flags(PAIRED | FIRST_SEGMENT);
            let second = read("pair", 300)
                .with_flags(PAIRED | LAST_SEGMENT | REVERSE)
                .with_alignment(0, 300);
            let detached = read("far", 50)
                .with_flags(PAIRED)
                .with_alignment(1, 50)
                .with_mate(0, 9_000)
                .with_template_size(-8_950);
            let unmapped = AlignmentSegment::new("lost").with_bases(b"ACGTAC");

            let mut writer = ContainerWriterBuilder::default()
                .header(header(2, compressed))
                .build(Vec::new())?;
            writer.write_template(&[first.clone(), second.clone()])?;
            writer.write_segment(&detached)?;
            writer.write_segment(&unmapped)?;
            let bytes = writer.into_inner()?;

            let containers = read_all(&bytes, ValidationPolicy::Silent)?;
            assert_eq!(containers.len(), 2);
            assert_eq!(containers[0].len(), 2);
            assert_eq!(containers[1].len(), 2);

            let decoded = &containers[0][0];
            assert_eq!(decoded.name, b"pair");
            assert_eq!(decoded.bases, first.bases);
            assert_eq!(decoded.qualities, first.qualities);
            assert_eq!(decoded.mapping_quality, 60);
            assert_eq!(decoded.next(), Some(1));
            assert!(containers[0][1].next().is_none());
            assert!(containers[0][1].is_negative_strand());

            let far = &containers[1][0];
            assert_eq!(far.reference_id, 1);
            assert_eq!(far.mate_reference_id, 0);
            assert_eq!(far.mate_alignment_start, 9_000);
            assert_eq!(far.template_size, -8_950);
            assert!(far.next().is_none());

            let lost = &containers[1][1];
            assert!(lost.is_segment_unmapped());
            assert_eq!(lost.bases, b"ACGTAC");
            assert!(!lost.has_quality());
        }
        Ok(())
    }

    #[test]
    fn test_counts_are_available_without_decoding() -> Result<()> {
        let mut writer = ContainerWriterBuilder::default()
            .header(header(3, true))
            .build(Vec::new())?;
        for i in 0..5 {
            writer.write_segment(&read("r", 100 + i))?;
        }
        let bytes = writer.into_inner()?;

        let mut reader = ContainerReader::new(bytes.as_slice())?;
        let mut container = Container::new();
        let mut counts = Vec::new();
        loop {
            reader.next_container(&mut container, ValidationPolicy::Strict)?;
            if container.is_eof() {
                break;
            }
            counts.push((container.position(), container.n_records(), container.n_bases()));
        }
        assert_eq!(counts, vec![(0, 3, 105), (1, 2, 70)]);

        // the end-of-stream container is sticky
        reader.next_container(&mut container, ValidationPolicy::Strict)?;
        assert!(container.is_eof());
        assert_eq!(reader.n_containers(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_eof_marker() -> Result<()> {
        let mut writer = ContainerWriterBuilder::default()
            .header(header(4, false))
            .eof_marker(false)
            .build(Vec::new())?;
        writer.write_segment(&read("r", 1))?;
        let bytes = writer.into_inner()?;

        assert_eq!(read_all(&bytes, ValidationPolicy::Silent)?.len(), 1);
        assert_eq!(read_all(&bytes, ValidationPolicy::Lenient)?.len(), 1);

        let err = read_all(&bytes, ValidationPolicy::Strict).unwrap_err();
        assert_eq!(err.corrupt_container_position(), Some(1));
        Ok(())
    }

    #[test]
    fn test_truncated_stream() -> Result<()> {
        let mut writer = ContainerWriterBuilder::default()
            .header(header(4, false))
            .build(Vec::new())?;
        writer.write_segment(&read("r", 1))?;
        let mut bytes = writer.into_inner()?;
        // drop the eof container and part of the payload
        bytes.truncate(bytes.len() - SIZE_CONTAINER_HEADER - 5);

        let err = read_all(&bytes, ValidationPolicy::Silent).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::UnexpectedEndOfStream(0))
        ));
        Ok(())
    }

    #[test]
    fn test_corrupt_container_position() -> Result<()> {
        let mut writer = ContainerWriterBuilder::default()
            .header(header(1, false))
            .build(Vec::new())?;
        writer.write_segment(&read("ok", 1))?;
        writer.flush_container()?;
        // links past the end of its container
        writer.write_linked(&read("bad", 2), 3)?;
        let bytes = writer.into_inner()?;

        let err = read_all(&bytes, ValidationPolicy::Silent).unwrap_err();
        assert_eq!(err.corrupt_container_position(), Some(1));
        assert!(matches!(
            err,
            Error::ReadError(ReadError::CorruptContainer {
                source: DecodeError::DanglingMateLink { record: 0, target: 3, records: 1 },
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_backward_and_duplicate_links() -> Result<()> {
        let mut writer = ContainerWriterBuilder::default()
            .header(header(8, true))
            .build(Vec::new())?;
        writer.write_linked(&read("a", 1), 0)?;
        writer.write_linked(&read("b", 2), -1)?;
        writer.flush_container()?;
        writer.write_linked(&read("c", 1), 2)?;
        writer.write_linked(&read("d", 2), 1)?;
        writer.write_linked(&read("e", 3), 0)?;
        let bytes = writer.into_inner()?;

        let mut reader = ContainerReader::new(bytes.as_slice())?;
        let mut container = Container::new();
        let mut batch = SegmentBatch::new();
        let policy = ValidationPolicy::Silent;

        reader.next_container(&mut container, policy)?;
        let err = reader.decode(&container, &mut batch, policy).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::CorruptContainer {
                position: 0,
                source: DecodeError::BackwardMateLink { record: 1, distance: -1 },
            })
        ));

        batch.clear();
        reader.next_container(&mut container, policy)?;
        let err = reader.decode(&container, &mut batch, policy).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::CorruptContainer {
                position: 1,
                source: DecodeError::DuplicateMateLink(2),
            })
        ));
        Ok(())
    }

    #[test]
    fn test_strict_validation() -> Result<()> {
        let mut no_start = read("r", 1);
        no_start.alignment_start = NO_ALIGNMENT_START;
        // linked without the paired flag
        let unpaired_template = vec![read("a", 1), read("b", 50)];

        for template in [vec![no_start], unpaired_template] {
            let mut writer = ContainerWriterBuilder::default()
                .header(header(4, false))
                .build(Vec::new())?;
            writer.write_template(&template)?;
            let bytes = writer.into_inner()?;

            assert!(read_all(&bytes, ValidationPolicy::Silent).is_ok());
            let err = read_all(&bytes, ValidationPolicy::Strict).unwrap_err();
            assert!(matches!(
                err,
                Error::ReadError(ReadError::CorruptContainer {
                    position: 0,
                    source: DecodeError::Validation(_),
                })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_count_mismatch() -> Result<()> {
        let mut writer = ContainerWriterBuilder::default()
            .header(header(4, false))
            .build(Vec::new())?;
        writer.write_segment(&read("r", 1))?;
        let mut bytes = writer.into_inner()?;

        // bump the declared base count of the first container
        let offset = crate::container::header::SIZE_HEADER + 2 * (4 + 4 + 8) + 20;
        bytes[offset] += 1;

        let err = read_all(&bytes, ValidationPolicy::Silent).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::CorruptContainer {
                source: DecodeError::CountMismatch {
                    expected: 1,
                    found: 1,
                    expected_bases: 36,
                    found_bases: 35,
                },
                ..
            })
        ));
        Ok(())
    }

    /// Uncompressed single-container stream whose first record is named `m`
    fn single_record_stream(segment: &AlignmentSegment) -> Result<Vec<u8>> {
        let mut writer = ContainerWriterBuilder::default()
            .header(header(4, false))
            .build(Vec::new())?;
        writer.write_segment(segment)?;
        writer.into_inner()
    }

    /// Offset of the first container header behind the two-entry dictionary
    const FIRST_CONTAINER: usize = crate::container::header::SIZE_HEADER + 2 * (4 + 4 + 8);

    #[test]
    fn test_unknown_mate_reference() -> Result<()> {
        let mut bytes = single_record_stream(&read("m", 10))?;
        // u16 name length, name, flags, reference, start, mapq, read length, next offset
        let offset = FIRST_CONTAINER + SIZE_CONTAINER_HEADER + 2 + 1 + 2 + 4 + 4 + 1 + 4 + 4;
        bytes[offset..offset + 4].copy_from_slice(&7i32.to_le_bytes());

        let err = read_all(&bytes, ValidationPolicy::Silent).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::CorruptContainer {
                position: 0,
                source: DecodeError::UnknownReference { record: 0, reference_id: 7 },
            })
        ));
        Ok(())
    }

    #[test]
    fn test_alignment_span_limits() -> Result<()> {
        let mut writer = ContainerWriterBuilder::default()
            .header(header(4, true))
            .build(Vec::new())?;
        writer.write_template(&[
            read("pair", 100).with_flags(PAIRED | FIRST_SEGMENT),
            read("pair", i32::MAX).with_flags(PAIRED | LAST_SEGMENT | REVERSE),
        ])?;
        let bytes = writer.into_inner()?;
        let err = read_all(&bytes, ValidationPolicy::Silent).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::CorruptContainer {
                source: DecodeError::InvalidAlignmentSpan { record: 1, start: i32::MAX, .. },
                ..
            })
        ));

        let bytes = single_record_stream(&read("m", -5))?;
        let err = read_all(&bytes, ValidationPolicy::Silent).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::CorruptContainer {
                source: DecodeError::InvalidAlignmentSpan { record: 0, start: -5, end: 29 },
                ..
            })
        ));

        // runs 25 bases past the end of chr1
        let bytes = single_record_stream(&read("m", 9_990))?;
        assert!(read_all(&bytes, ValidationPolicy::Silent).is_ok());
        let err = read_all(&bytes, ValidationPolicy::Strict).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::CorruptContainer {
                source: DecodeError::Validation(_),
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_corrupt_payload_size() -> Result<()> {
        let mut bytes = single_record_stream(&read("m", 10))?;
        let offset = FIRST_CONTAINER + 8;
        bytes[offset..offset + 8].copy_from_slice(&u64::MAX.to_le_bytes());

        let mut reader = ContainerReader::new(bytes.as_slice())?;
        let mut container = Container::new();
        let err = reader
            .next_container(&mut container, ValidationPolicy::Silent)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::UnexpectedEndOfStream(0))
        ));
        Ok(())
    }
}
