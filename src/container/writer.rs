//! Writing container streams.
//!
//! The writer is used to produce fixtures and demo inputs for the converter. Records are
//! buffered into a payload until the container reaches its record capacity, then the
//! payload is optionally compressed and written behind its [`ContainerHeader`].
//!
//! ## Record layout
//!
//! All integers are little-endian.
//!
//! | field | type |
//! | --- | --- |
//! | name length, name | `u16`, bytes |
//! | flags | `u16` |
//! | reference index, alignment start | `i32`, `i32` |
//! | mapping quality | `u8` |
//! | read length | `u32` |
//! | records to the next fragment (0 = none) | `i32` |
//! | mate reference index, mate alignment start, template size | `i32`, `i32`, `i32` |
//! | has quality | `u8` |
//! | bases, 2-bit packed | `u64` x ceil(read length / 32) |
//! | phred qualities, if present | bytes x read length |

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use zstd::Encoder as ZstdEncoder;

use super::header::{ContainerHeader, StreamHeader};
use crate::error::{Result, WriteError};
use crate::policy::BasePolicy;
use crate::segment::AlignmentSegment;

/// Builder for [`ContainerWriter`]
///
/// ```rust
/// use cramconv::container::{ContainerWriterBuilder, ReferenceSequence, StreamHeader};
/// use cramconv::AlignmentSegment;
///
/// let header = StreamHeader::new(vec![ReferenceSequence::new("chr1", 1000)]);
/// let mut writer = ContainerWriterBuilder::default()
///     .header(header)
///     .build(Vec::new())
///     .unwrap();
///
/// let read = AlignmentSegment::new("read1").with_alignment(0, 10).with_bases(b"ACGT");
/// writer.write_segment(&read).unwrap();
/// let bytes = writer.into_inner().unwrap();
/// assert!(!bytes.is_empty());
/// ```
#[derive(Default)]
pub struct ContainerWriterBuilder {
    /// Header of the stream
    header: Option<StreamHeader>,
    /// Optional policy for non-ACGT bases
    policy: Option<BasePolicy>,
    /// Whether to terminate the stream with an end-of-stream container
    eof_marker: Option<bool>,
}
impl ContainerWriterBuilder {
    /// Sets the stream header, including the reference dictionary
    #[must_use]
    pub fn header(mut self, header: StreamHeader) -> Self {
        self.header = Some(header);
        self
    }

    /// Sets how bases other than `ACGT` are handled
    ///
    /// Bases are stored 2-bit packed, so other symbols have to be replaced or the
    /// template dropped.
    #[must_use]
    pub fn policy(mut self, policy: BasePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets whether [`ContainerWriter::finish`] appends the end-of-stream container
    ///
    /// Disabling the marker produces a truncated-looking stream.
    #[must_use]
    pub fn eof_marker(mut self, eof_marker: bool) -> Self {
        self.eof_marker = Some(eof_marker);
        self
    }

    pub fn build<W: Write>(self, inner: W) -> Result<ContainerWriter<W>> {
        ContainerWriter::new(
            inner,
            self.header.unwrap_or_default(),
            self.policy.unwrap_or_default(),
            self.eof_marker.unwrap_or(true),
        )
    }
}

/// Writer for container streams
///
/// The writer has to be finished with [`ContainerWriter::finish`] or
/// [`ContainerWriter::into_inner`]; records still buffered in the open container are
/// lost otherwise.
pub struct ContainerWriter<W: Write> {
    /// Inner Writer
    inner: W,

    /// Header of the stream
    header: StreamHeader,

    /// Encoder for nucleotide sequences
    encoder: Encoder,

    /// Payload of the open container
    payload: PayloadWriter,

    /// Packed bases of the template being written
    staged: Vec<Vec<u64>>,

    /// Number of containers written so far
    n_containers: u64,

    eof_marker: bool,
    finished: bool,
}
impl<W: Write> ContainerWriter<W> {
    pub fn new(mut inner: W, header: StreamHeader, policy: BasePolicy, eof_marker: bool) -> Result<Self> {
        header.write_bytes(&mut inner)?;
        Ok(Self {
            inner,
            payload: PayloadWriter::new(header.compressed),
            header,
            encoder: Encoder::with_policy(policy),
            staged: Vec::new(),
            n_containers: 0,
            eof_marker,
            finished: false,
        })
    }

    #[must_use]
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Number of containers written so far, excluding the end-of-stream container
    #[must_use]
    pub fn n_containers(&self) -> u64 {
        self.n_containers
    }

    /// Writes a single segment without a next-fragment link
    ///
    /// Mate fields and template size are stored as given, the way records are stored
    /// whose mate lives in another container.
    pub fn write_segment(&mut self, segment: &AlignmentSegment) -> Result<bool> {
        self.write_template(std::slice::from_ref(segment))
    }

    /// Writes the segments of one template into the same container
    ///
    /// Each segment is linked to the one following it. If the open container cannot
    /// take the whole template it is flushed first.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the template was written
    /// * `Ok(false)` - If a segment had invalid bases and the policy dropped the template
    ///
    /// # Errors
    ///
    /// * `WriteError::TemplateExceedsContainer` - If the template is larger than a container
    /// * `WriteError::UnknownReference` - If a segment references a sequence not in the header
    /// * `WriteError::UnexpectedQualityLength` - If qualities do not match the read length
    pub fn write_template(&mut self, segments: &[AlignmentSegment]) -> Result<bool> {
        let capacity = self.header.capacity as usize;
        if segments.len() > capacity {
            return Err(WriteError::TemplateExceedsContainer(segments.len(), capacity).into());
        }
        for segment in segments {
            self.validate(segment)?;
        }
        if !self.stage(segments)? {
            return Ok(false);
        }
        if self.payload.records as usize + segments.len() > capacity {
            self.flush_container()?;
        }
        let last = segments.len().saturating_sub(1);
        for (index, segment) in segments.iter().enumerate() {
            let next_offset = i32::from(index < last);
            self.payload
                .write_record(segment, next_offset, &self.staged[index])?;
        }
        Ok(true)
    }

    /// Appends one record with an explicit next-fragment offset
    ///
    /// Used to lay out interleaved templates and malformed links.
    pub(crate) fn write_linked(
        &mut self,
        segment: &AlignmentSegment,
        next_offset: i32,
    ) -> Result<bool> {
        self.validate(segment)?;
        if !self.stage(std::slice::from_ref(segment))? {
            return Ok(false);
        }
        if self.payload.records >= self.header.capacity {
            self.flush_container()?;
        }
        self.payload
            .write_record(segment, next_offset, &self.staged[0])?;
        Ok(true)
    }

    /// Closes the open container
    ///
    /// Records written afterwards start a new container.
    pub fn flush_container(&mut self) -> Result<()> {
        if self.payload.flush(&mut self.inner)? {
            self.n_containers += 1;
        }
        Ok(())
    }

    /// Flushes the open container and terminates the stream
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_container()?;
        if self.eof_marker {
            ContainerHeader::eof().write_bytes(&mut self.inner)?;
        }
        self.inner.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Finishes the stream and returns the inner writer
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        Ok(self.inner)
    }

    fn validate(&self, segment: &AlignmentSegment) -> Result<()> {
        for reference_id in [segment.reference_id, segment.mate_reference_id] {
            if reference_id != crate::flags::UNMAPPED_REFERENCE
                && !self.header.contains_reference(reference_id)
            {
                return Err(
                    WriteError::UnknownReference(reference_id, self.header.n_references()).into(),
                );
            }
        }
        if segment.has_quality() && segment.qualities.len() != segment.bases.len() {
            return Err(WriteError::UnexpectedQualityLength {
                expected: segment.bases.len(),
                got: segment.qualities.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Packs the bases of every segment, returns false if the policy drops one of them
    fn stage(&mut self, segments: &[AlignmentSegment]) -> Result<bool> {
        if self.staged.len() < segments.len() {
            self.staged.resize_with(segments.len(), Vec::new);
        }
        for (segment, staged) in segments.iter().zip(self.staged.iter_mut()) {
            staged.clear();
            match self.encoder.encode(&segment.bases)? {
                Some(words) => staged.extend_from_slice(words),
                None => return Ok(false),
            }
        }
        Ok(true)
    }
}

/// Accumulates the records of the open container
struct PayloadWriter {
    /// Uncompressed payload
    ubuf: Vec<u8>,
    /// Compressed payload
    zbuf: Vec<u8>,
    /// Number of records in the payload
    records: u32,
    /// Total read length of the records in the payload
    bases: u64,
    /// Compression level
    level: i32,
    /// If false, the payload is written uncompressed
    compress: bool,
}
impl PayloadWriter {
    fn new(compress: bool) -> Self {
        Self {
            ubuf: Vec::new(),
            zbuf: Vec::new(),
            records: 0,
            bases: 0,
            level: 3,
            compress,
        }
    }

    fn write_record(
        &mut self,
        segment: &AlignmentSegment,
        next_offset: i32,
        packed: &[u64],
    ) -> Result<()> {
        let read_length = segment.bases.len() as u32;
        let name_len = segment.name.len().min(u16::MAX as usize);

        self.ubuf.write_u16::<LittleEndian>(name_len as u16)?;
        self.ubuf.write_all(&segment.name[..name_len])?;
        self.ubuf.write_u16::<LittleEndian>(segment.flags)?;
        self.ubuf.write_i32::<LittleEndian>(segment.reference_id)?;
        self.ubuf.write_i32::<LittleEndian>(segment.alignment_start)?;
        self.ubuf.write_u8(segment.mapping_quality)?;
        self.ubuf.write_u32::<LittleEndian>(read_length)?;
        self.ubuf.write_i32::<LittleEndian>(next_offset)?;
        self.ubuf.write_i32::<LittleEndian>(segment.mate_reference_id)?;
        self.ubuf
            .write_i32::<LittleEndian>(segment.mate_alignment_start)?;
        self.ubuf.write_i32::<LittleEndian>(segment.template_size)?;
        self.ubuf.write_u8(u8::from(segment.has_quality()))?;
        packed
            .iter()
            .try_for_each(|&x| self.ubuf.write_u64::<LittleEndian>(x))?;
        if segment.has_quality() {
            self.ubuf.write_all(&segment.qualities)?;
        }

        self.records += 1;
        self.bases += u64::from(read_length);
        Ok(())
    }

    /// Writes the container if it holds any record, returns whether it did
    fn flush<W: Write>(&mut self, inner: &mut W) -> Result<bool> {
        if self.records == 0 {
            return Ok(false);
        }

        let payload = if self.compress {
            let mut encoder = ZstdEncoder::new(&mut self.zbuf, self.level)?;
            encoder.write_all(&self.ubuf)?;
            encoder.finish()?;
            &self.zbuf
        } else {
            &self.ubuf
        };

        let header = ContainerHeader::new(payload.len() as u64, self.records, self.bases);
        header.write_bytes(inner)?;
        inner.write_all(payload)?;

        self.clear();
        Ok(true)
    }

    fn clear(&mut self) {
        self.ubuf.clear();
        self.zbuf.clear();
        self.records = 0;
        self.bases = 0;
    }
}

/// Packs bases as 2-bit, applying the invalid-base policy when needed
struct Encoder {
    /// Reusable buffer for the 2-bit representation
    ebuf: Vec<u64>,

    /// Reusable buffer for policy-corrected sequences
    ibuf: Vec<u8>,

    /// Invalid-base policy
    policy: BasePolicy,
}
impl Encoder {
    fn with_policy(policy: BasePolicy) -> Self {
        Self {
            ebuf: Vec::default(),
            ibuf: Vec::default(),
            policy,
        }
    }

    /// Will return `None` if the sequence is invalid and the policy does not allow correction.
    fn encode(&mut self, sequence: &[u8]) -> Result<Option<&[u64]>> {
        self.ebuf.clear();
        if sequence.is_empty() {
            return Ok(Some(&self.ebuf));
        }
        if bitnuc::encode(sequence, &mut self.ebuf).is_err() {
            self.ebuf.clear();
            if self.policy.handle(sequence, &mut self.ibuf)? {
                bitnuc::encode(&self.ibuf, &mut self.ebuf)?;
            } else {
                return Ok(None);
            }
        }
        Ok(Some(&self.ebuf))
    }
}
