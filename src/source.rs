//! The container-level seam between a stream codec and the converter.

use auto_impl::auto_impl;

use crate::container::{ContainerHeader, StreamHeader};
use crate::policy::ValidationPolicy;
use crate::segment::SegmentBatch;
use crate::Result;

/// One undecoded container pulled from a stream
///
/// Carries the header counts used by the counting fast path and the raw payload that
/// [`ContainerSource::decode`] turns into segments. The payload buffer is reused when the
/// container is refilled.
#[derive(Debug, Clone, Default)]
pub struct Container {
    pub(crate) header: ContainerHeader,
    pub(crate) position: u64,
    pub(crate) payload: Vec<u8>,
}
impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records the container declares
    #[must_use]
    pub fn n_records(&self) -> u32 {
        self.header.records
    }

    /// Total read length the container declares
    #[must_use]
    pub fn n_bases(&self) -> u64 {
        self.header.bases
    }

    /// Sequence position of the container in its stream (0-based)
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// True for the end-of-stream container, which carries no records
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.header.eof
    }

    /// Size of the payload as stored in the stream
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    pub(crate) fn clear(&mut self) {
        self.header = ContainerHeader::default();
        self.payload.clear();
    }
}

/// A stream of containers that can be decoded into segment batches
#[auto_impl(&mut, Box)]
pub trait ContainerSource {
    /// The stream header, including the reference dictionary
    fn header(&self) -> &StreamHeader;

    /// Refills `container` with the next container of the stream
    ///
    /// Once the stream is exhausted `container` holds the end-of-stream container. A
    /// stream that ends without an end-of-stream marker is reported through `policy`.
    fn next_container(&mut self, container: &mut Container, policy: ValidationPolicy)
        -> Result<()>;

    /// Decodes every record of `container` into `batch`
    ///
    /// `batch` is expected to be empty. Decode-format problems are returned as
    /// [`crate::ReadError::CorruptContainer`] carrying the container position.
    fn decode(
        &mut self,
        container: &Container,
        batch: &mut SegmentBatch,
        policy: ValidationPolicy,
    ) -> Result<()>;
}
