//! Mate linkage and template length for chained segments.

use crate::flags::{NO_ALIGNMENT_START, UNMAPPED_REFERENCE};
use crate::segment::{AlignmentSegment, SegmentBatch};

/// The fields of a segment that its predecessor copies as mate information
#[derive(Clone, Copy)]
struct MateView {
    reference_id: i32,
    alignment_start: i32,
    unmapped: bool,
    reverse: bool,
}
impl From<&AlignmentSegment> for MateView {
    fn from(segment: &AlignmentSegment) -> Self {
        Self {
            reference_id: segment.reference_id,
            alignment_start: segment.alignment_start,
            unmapped: segment.is_segment_unmapped(),
            reverse: segment.is_negative_strand(),
        }
    }
}

fn set_next_mate(segment: &mut AlignmentSegment, mate: MateView) {
    segment.mate_alignment_start = mate.alignment_start;
    segment.set_mate_unmapped(mate.unmapped);
    segment.set_mate_negative_strand(mate.reverse);
    segment.mate_reference_id = mate.reference_id;
    if segment.mate_reference_id == UNMAPPED_REFERENCE {
        segment.mate_alignment_start = NO_ALIGNMENT_START;
    }
}

/// Fills in mate fields and template lengths for the chain starting at `head`
///
/// Every segment points at its successor, and the last segment points back at `head`.
/// Only `head` and the last segment receive a template length, with opposite signs;
/// segments in between keep whatever template size they were decoded with.
///
/// A segment without a successor is left untouched.
pub fn resolve_mates(batch: &mut SegmentBatch, head: usize) {
    if batch[head].next().is_none() {
        return;
    }

    let mut cur = head;
    while let Some(nxt) = batch[cur].next() {
        let mate = MateView::from(&batch[nxt]);
        set_next_mate(&mut batch[cur], mate);
        cur = nxt;
    }

    // cur is the last segment now
    let last = cur;
    let mate = MateView::from(&batch[head]);
    set_next_mate(&mut batch[last], mate);

    let template_length = insert_size(&batch[head], &batch[last]);
    batch[head].template_size = template_length;
    batch[last].template_size = -template_length;
}

/// Resolves every chain of the batch exactly once
pub fn resolve_batch(batch: &mut SegmentBatch) {
    for head in 0..batch.len() {
        if batch[head].is_chain_head() {
            resolve_mates(batch, head);
        }
    }
}

/// Computes the signed insert size between two segments of a template
///
/// The span is measured between the 5' ends of the segments: the alignment start of a
/// forward segment and the alignment end of a reverse one. The result is positive when
/// `second` lies to the right of `first`, and zero when either segment is unmapped or
/// the two lie on different references. Spans beyond the `i32` range saturate.
#[must_use]
pub fn insert_size(first: &AlignmentSegment, second: &AlignmentSegment) -> i32 {
    if first.is_segment_unmapped() || second.is_segment_unmapped() {
        return 0;
    }
    if first.reference_id != second.reference_id {
        return 0;
    }

    let first_5p = five_prime_position(first);
    let second_5p = five_prime_position(second);
    let adjustment = if second_5p >= first_5p { 1 } else { -1 };
    let span = second_5p - first_5p + adjustment;
    i32::try_from(span).unwrap_or(if span < 0 { i32::MIN } else { i32::MAX })
}

fn five_prime_position(segment: &AlignmentSegment) -> i64 {
    if segment.is_negative_strand() {
        segment.alignment_end()
    } else {
        i64::from(segment.alignment_start)
    }
}
