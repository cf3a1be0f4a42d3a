//! SAM flag bits and position sentinels shared by segments and output records.

/// Template has multiple segments
pub const PAIRED: u16 = 0x1;
/// Each segment is properly aligned according to the aligner
pub const PROPER_PAIR: u16 = 0x2;
/// Segment is unmapped
pub const UNMAPPED: u16 = 0x4;
/// Next segment in the template is unmapped
pub const MATE_UNMAPPED: u16 = 0x8;
/// Sequence is reverse complemented
pub const REVERSE: u16 = 0x10;
/// Sequence of the next segment is reverse complemented
pub const MATE_REVERSE: u16 = 0x20;
/// First segment in the template
pub const FIRST_SEGMENT: u16 = 0x40;
/// Last segment in the template
pub const LAST_SEGMENT: u16 = 0x80;
/// Secondary alignment
pub const SECONDARY: u16 = 0x100;
/// Not passing quality controls
pub const QC_FAIL: u16 = 0x200;
/// PCR or optical duplicate
pub const DUPLICATE: u16 = 0x400;
/// Supplementary alignment
pub const SUPPLEMENTARY: u16 = 0x800;

/// Reference index of a segment without a reference
pub const UNMAPPED_REFERENCE: i32 = -1;

/// Alignment start of a segment without an alignment (positions are 1-based)
pub const NO_ALIGNMENT_START: i32 = 0;

/// Sets or clears `bit` in `flags`
#[inline]
pub(crate) fn assign(flags: &mut u16, bit: u16, value: bool) {
    if value {
        *flags |= bit;
    } else {
        *flags &= !bit;
    }
}
