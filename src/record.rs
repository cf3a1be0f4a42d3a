//! Conversion of decoded segments into SAM-shaped output records.

use auto_impl::auto_impl;

use crate::error::{ConfigError, Result};
use crate::segment::AlignmentSegment;

/// Quality character used when a read's quality scores were not preserved
pub const DEFAULT_QUALITY: u8 = b'?';

/// Lowest printable quality character (phred 0 in phred+33)
pub const MIN_QUALITY_CHAR: u8 = b'!';

/// Highest printable quality character
const MAX_QUALITY_CHAR: u8 = b'~';

/// A reusable output record with the fields of a SAM alignment line
///
/// Text fields hold raw bytes without SAM placeholders; empty fields are written as `*`
/// by the sinks. Qualities are phred+33 characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRecord {
    pub name: Vec<u8>,
    pub flags: u16,
    pub reference_id: i32,
    /// 1-based leftmost position, 0 when unplaced
    pub position: i32,
    pub mapping_quality: u8,
    /// CIGAR string, empty when unavailable
    pub cigar: Vec<u8>,
    pub mate_reference_id: i32,
    /// 1-based position of the mate, 0 when unplaced
    pub mate_position: i32,
    pub template_length: i32,
    pub sequence: Vec<u8>,
    pub qualities: Vec<u8>,
}
impl OutputRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn read_length(&self) -> usize {
        self.sequence.len()
    }

    /// Clears every buffer, keeping allocations
    pub fn clear(&mut self) {
        self.name.clear();
        self.cigar.clear();
        self.sequence.clear();
        self.qualities.clear();
    }
}

/// Turns decoded segments into output records
#[auto_impl(&mut, Box)]
pub trait RecordConverter {
    /// Replaces the contents of `record` with the conversion of `segment`
    fn convert(&mut self, segment: &AlignmentSegment, record: &mut OutputRecord) -> Result<()>;
}

/// Converter producing SAM records
///
/// Segments are written without read features, so a mapped segment aligns as a single
/// match block over its read length. Lost quality scores are replaced with the default
/// quality character.
#[derive(Debug, Clone, Copy)]
pub struct SamRecordConverter {
    default_quality: u8,
}
impl Default for SamRecordConverter {
    fn default() -> Self {
        Self {
            default_quality: DEFAULT_QUALITY,
        }
    }
}
impl SamRecordConverter {
    /// Creates a converter with the given default quality character
    ///
    /// # Errors
    ///
    /// * `ConfigError::InvalidDefaultQuality` - If the character is below `!` (33)
    pub fn new(default_quality: u8) -> Result<Self> {
        if default_quality < MIN_QUALITY_CHAR {
            return Err(ConfigError::InvalidDefaultQuality(default_quality).into());
        }
        Ok(Self { default_quality })
    }

    #[must_use]
    pub fn default_quality(&self) -> u8 {
        self.default_quality
    }

    fn fill_cigar(segment: &AlignmentSegment, cigar: &mut Vec<u8>) {
        if segment.is_segment_unmapped() || segment.read_length == 0 {
            return;
        }
        let mut buf = itoa::Buffer::new();
        cigar.extend_from_slice(buf.format(segment.read_length).as_bytes());
        cigar.push(b'M');
    }

    fn fill_qualities(&self, segment: &AlignmentSegment, qualities: &mut Vec<u8>) {
        if segment.has_quality() {
            qualities.extend(
                segment
                    .qualities
                    .iter()
                    .map(|q| q.saturating_add(MIN_QUALITY_CHAR).min(MAX_QUALITY_CHAR)),
            );
        } else {
            qualities.resize(segment.bases.len(), self.default_quality);
        }
    }
}
impl RecordConverter for SamRecordConverter {
    fn convert(&mut self, segment: &AlignmentSegment, record: &mut OutputRecord) -> Result<()> {
        record.clear();
        record.name.extend_from_slice(&segment.name);
        record.flags = segment.flags;
        record.reference_id = segment.reference_id;
        record.position = segment.alignment_start;
        record.mapping_quality = segment.mapping_quality;
        Self::fill_cigar(segment, &mut record.cigar);
        record.mate_reference_id = segment.mate_reference_id;
        record.mate_position = segment.mate_alignment_start;
        record.template_length = segment.template_size;
        record.sequence.extend_from_slice(&segment.bases);
        self.fill_qualities(segment, &mut record.qualities);
        Ok(())
    }
}
