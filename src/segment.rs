//! Decoded alignment segments and the per-container batch that owns them.
//!
//! Segments of one template are chained through [`AlignmentSegment::next`], an index into
//! the same [`SegmentBatch`]. Links only ever point forward inside the batch, so every
//! chain is acyclic and ends at a segment without a successor.

use std::ops::{Index, IndexMut};

use crate::error::{DecodeError, ReadError, Result};
use crate::flags::{
    self, MATE_REVERSE, MATE_UNMAPPED, NO_ALIGNMENT_START, PAIRED, REVERSE, UNMAPPED,
    UNMAPPED_REFERENCE,
};

/// One read's decoded alignment data
///
/// Positions are 1-based; [`NO_ALIGNMENT_START`] and [`UNMAPPED_REFERENCE`] mark missing
/// values. Quality scores are raw phred values and may be empty when the stream did not
/// preserve them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentSegment {
    /// Read name
    pub name: Vec<u8>,
    /// SAM flag bitfield as decoded
    pub flags: u16,
    /// Reference sequence index
    pub reference_id: i32,
    /// 1-based leftmost alignment position
    pub alignment_start: i32,
    /// Mapping quality
    pub mapping_quality: u8,
    /// Number of bases in the read
    pub read_length: u32,
    /// Reference sequence index of the mate
    pub mate_reference_id: i32,
    /// 1-based alignment position of the mate
    pub mate_alignment_start: i32,
    /// Signed template length
    pub template_size: i32,
    /// Read bases (ASCII)
    pub bases: Vec<u8>,
    /// Raw phred quality scores, empty if absent
    pub qualities: Vec<u8>,

    /// Index of the next segment of the same template within the batch
    pub(crate) next: Option<usize>,
    /// Whether another segment of the batch links to this one
    pub(crate) has_prev: bool,
}
impl Default for AlignmentSegment {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
impl AlignmentSegment {
    /// Creates an unmapped, unpaired segment with the given name
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            flags: UNMAPPED,
            reference_id: UNMAPPED_REFERENCE,
            alignment_start: NO_ALIGNMENT_START,
            mapping_quality: 0,
            read_length: 0,
            mate_reference_id: UNMAPPED_REFERENCE,
            mate_alignment_start: NO_ALIGNMENT_START,
            template_size: 0,
            bases: Vec::new(),
            qualities: Vec::new(),
            next: None,
            has_prev: false,
        }
    }

    /// Places the segment on a reference, clearing the unmapped flag
    #[must_use]
    pub fn with_alignment(mut self, reference_id: i32, alignment_start: i32) -> Self {
        self.reference_id = reference_id;
        self.alignment_start = alignment_start;
        self.set_segment_unmapped(false);
        self
    }

    /// Sets the strand of the segment
    #[must_use]
    pub fn with_reverse_strand(mut self, reverse: bool) -> Self {
        self.set_negative_strand(reverse);
        self
    }

    /// Replaces the flag bitfield
    #[must_use]
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the bases and derives the read length from them
    #[must_use]
    pub fn with_bases(mut self, bases: &[u8]) -> Self {
        self.bases.clear();
        self.bases.extend_from_slice(bases);
        self.read_length = bases.len() as u32;
        self
    }

    /// Sets the raw phred quality scores
    #[must_use]
    pub fn with_qualities(mut self, qualities: &[u8]) -> Self {
        self.qualities.clear();
        self.qualities.extend_from_slice(qualities);
        self
    }

    #[must_use]
    pub fn with_mapping_quality(mut self, mapping_quality: u8) -> Self {
        self.mapping_quality = mapping_quality;
        self
    }

    /// Sets explicit mate fields, as carried by records whose mate lives elsewhere
    #[must_use]
    pub fn with_mate(mut self, mate_reference_id: i32, mate_alignment_start: i32) -> Self {
        self.mate_reference_id = mate_reference_id;
        self.mate_alignment_start = mate_alignment_start;
        self
    }

    #[must_use]
    pub fn with_template_size(mut self, template_size: i32) -> Self {
        self.template_size = template_size;
        self
    }

    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.flags & PAIRED != 0
    }

    #[must_use]
    pub fn is_segment_unmapped(&self) -> bool {
        self.flags & UNMAPPED != 0
    }

    #[must_use]
    pub fn is_negative_strand(&self) -> bool {
        self.flags & REVERSE != 0
    }

    #[must_use]
    pub fn is_mate_unmapped(&self) -> bool {
        self.flags & MATE_UNMAPPED != 0
    }

    #[must_use]
    pub fn is_mate_negative_strand(&self) -> bool {
        self.flags & MATE_REVERSE != 0
    }

    pub fn set_segment_unmapped(&mut self, value: bool) {
        flags::assign(&mut self.flags, UNMAPPED, value);
    }

    pub fn set_negative_strand(&mut self, value: bool) {
        flags::assign(&mut self.flags, REVERSE, value);
    }

    pub fn set_mate_unmapped(&mut self, value: bool) {
        flags::assign(&mut self.flags, MATE_UNMAPPED, value);
    }

    pub fn set_mate_negative_strand(&mut self, value: bool) {
        flags::assign(&mut self.flags, MATE_REVERSE, value);
    }

    /// Returns the 1-based inclusive rightmost aligned position
    ///
    /// Segments without read features span exactly their read length on the reference.
    #[must_use]
    pub fn alignment_end(&self) -> i64 {
        i64::from(self.alignment_start) + i64::from(self.read_length) - 1
    }

    /// Returns whether the segment has quality scores
    #[must_use]
    pub fn has_quality(&self) -> bool {
        !self.qualities.is_empty()
    }

    /// Index of the next segment of the same template, if any
    #[must_use]
    pub fn next(&self) -> Option<usize> {
        self.next
    }

    /// Returns true for the first segment of a multi-segment chain
    #[must_use]
    pub fn is_chain_head(&self) -> bool {
        self.next.is_some() && !self.has_prev
    }

    /// Resets the segment to its empty state while keeping its allocations
    fn reset(&mut self) {
        self.name.clear();
        self.flags = UNMAPPED;
        self.reference_id = UNMAPPED_REFERENCE;
        self.alignment_start = NO_ALIGNMENT_START;
        self.mapping_quality = 0;
        self.read_length = 0;
        self.mate_reference_id = UNMAPPED_REFERENCE;
        self.mate_alignment_start = NO_ALIGNMENT_START;
        self.template_size = 0;
        self.bases.clear();
        self.qualities.clear();
        self.next = None;
        self.has_prev = false;
    }
}

/// Handle to a segment that remembers which fill of the batch it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentId {
    index: usize,
    generation: u64,
}
impl SegmentId {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Arena of segments decoded from one container
///
/// The batch is cleared and refilled for every container. Clearing only resets the
/// number of live segments; the slots and their buffers are reused by the next fill.
/// Every clear bumps the generation, so [`SegmentId`]s taken before a clear are
/// rejected by [`SegmentBatch::resolve`].
#[derive(Debug, Default)]
pub struct SegmentBatch {
    slots: Vec<AlignmentSegment>,
    len: usize,
    generation: u64,
}
impl SegmentBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a batch with room for `capacity` segments before reallocating
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            len: 0,
            generation: 0,
        }
    }

    /// Number of live segments
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of times the batch has been cleared
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drops all live segments, invalidating outstanding [`SegmentId`]s
    pub fn clear(&mut self) {
        self.len = 0;
        self.generation += 1;
    }

    /// Hands out the next free slot, reset to an empty segment
    pub fn push_slot(&mut self) -> &mut AlignmentSegment {
        if self.len == self.slots.len() {
            self.slots.push(AlignmentSegment::default());
        } else {
            self.slots[self.len].reset();
        }
        self.len += 1;
        &mut self.slots[self.len - 1]
    }

    /// Appends a segment and returns its index
    ///
    /// Links carried by the segment are discarded; use [`SegmentBatch::link`].
    pub fn push(&mut self, segment: AlignmentSegment) -> usize {
        let slot = self.push_slot();
        *slot = segment;
        slot.next = None;
        slot.has_prev = false;
        self.len - 1
    }

    /// Chains segment `to` after segment `from`
    ///
    /// Links must point forward and every segment may have at most one predecessor.
    pub fn link(&mut self, from: usize, to: usize) -> std::result::Result<(), DecodeError> {
        if to >= self.len {
            return Err(DecodeError::DanglingMateLink {
                record: from,
                target: to,
                records: self.len,
            });
        }
        if to <= from {
            return Err(DecodeError::BackwardMateLink {
                record: from,
                distance: to as i32 - from as i32,
            });
        }
        if self.slots[to].has_prev {
            return Err(DecodeError::DuplicateMateLink(to));
        }
        self.slots[from].next = Some(to);
        self.slots[to].has_prev = true;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&AlignmentSegment> {
        self.as_slice().get(index)
    }

    /// Returns a generation-stamped handle to the segment at `index`
    #[must_use]
    pub fn id(&self, index: usize) -> Option<SegmentId> {
        (index < self.len).then_some(SegmentId {
            index,
            generation: self.generation,
        })
    }

    /// Looks up a handle, failing if it was issued before the last clear
    pub fn resolve(&self, id: SegmentId) -> Result<&AlignmentSegment> {
        if id.generation != self.generation {
            return Err(ReadError::StaleSegment {
                found: id.generation,
                current: self.generation,
            }
            .into());
        }
        Ok(&self[id.index])
    }

    #[must_use]
    pub fn as_slice(&self) -> &[AlignmentSegment] {
        &self.slots[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AlignmentSegment> {
        self.as_slice().iter()
    }

    /// Sum of the read lengths of all live segments
    #[must_use]
    pub fn n_bases(&self) -> u64 {
        self.iter().map(|s| u64::from(s.read_length)).sum()
    }
}
impl Index<usize> for SegmentBatch {
    type Output = AlignmentSegment;

    fn index(&self, index: usize) -> &Self::Output {
        assert!(index < self.len, "segment {index} out of batch of {}", self.len);
        &self.slots[index]
    }
}
impl IndexMut<usize> for SegmentBatch {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        assert!(index < self.len, "segment {index} out of batch of {}", self.len);
        &mut self.slots[index]
    }
}
impl<'a> IntoIterator for &'a SegmentBatch {
    type Item = &'a AlignmentSegment;
    type IntoIter = std::slice::Iter<'a, AlignmentSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
