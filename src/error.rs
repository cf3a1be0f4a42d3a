/// Custom Result type for cramconv operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the cramconv library, encompassing all possible error cases
/// that can occur while reading containers, converting records, and writing output.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors related to container stream header processing
    HeaderError(#[from] HeaderError),
    /// Errors that occur while reading and decoding containers
    ReadError(#[from] ReadError),
    /// Errors that occur while writing containers or output records
    WriteError(#[from] WriteError),
    /// Errors in the run configuration
    ConfigError(#[from] ConfigError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// Errors from the bitnuc nucleotide processing library
    BitnucError(#[from] bitnuc::NucleotideError),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}
impl Error {
    /// Returns the container position if this error marks a corrupt container
    #[must_use]
    pub fn corrupt_container_position(&self) -> Option<u64> {
        match self {
            Self::ReadError(ReadError::CorruptContainer { position, .. }) => Some(*position),
            _ => None,
        }
    }
}

/// Errors specific to processing and validating container stream headers
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic number in the header does not match the expected value
    ///
    /// # Arguments
    /// * `u32` - The invalid magic number that was found
    #[error("Invalid magic number: {0:#x}")]
    InvalidMagicNumber(u32),

    /// The format version in the header is not supported
    ///
    /// # Arguments
    /// * `u8` - The unsupported version number that was found
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u8),

    /// The reserved bytes in the header contain unexpected values
    #[error("Invalid reserved bytes")]
    InvalidReservedBytes,

    /// A reference sequence entry of the dictionary could not be parsed
    ///
    /// # Arguments
    /// * `usize` - Index of the malformed entry
    #[error("Malformed reference sequence entry at index {0}")]
    InvalidReferenceEntry(usize),
}

/// Errors that can occur while reading containers from a stream
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The magic number of a container header is wrong
    ///
    /// # Arguments
    /// * `u64` - The invalid magic number that was found
    /// * `u64` - The position of the container in the stream
    #[error("Invalid container magic number {0:#x} at container {1}")]
    InvalidContainerMagicNumber(u64, u64),

    /// The stream ended inside a container
    ///
    /// # Arguments
    /// * `u64` - The position of the truncated container
    #[error("Unexpected end of stream inside container {0}")]
    UnexpectedEndOfStream(u64),

    /// The container could not be decoded
    #[error("Corrupt container at position {position}: {source}")]
    CorruptContainer {
        /// Sequence position of the container in the stream (0-based)
        position: u64,
        /// What went wrong while decoding it
        source: DecodeError,
    },

    /// A segment handle from a previous batch was used after the batch was cleared
    #[error("Stale segment handle (generation {found}, batch is at {current})")]
    StaleSegment { found: u64, current: u64 },
}

/// Decode-format errors raised inside a single container
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// A record ended before all of its fields could be read
    #[error("Record {0} is truncated")]
    TruncatedRecord(usize),

    /// The next-fragment link of a record leaves the container
    #[error("Record {record} links to record {target} outside of the {records} records")]
    DanglingMateLink {
        record: usize,
        target: usize,
        records: usize,
    },

    /// The next-fragment link points backwards, which would allow cycles
    #[error("Record {record} links backwards by {distance}")]
    BackwardMateLink { record: usize, distance: i32 },

    /// A record is placed on a sequence missing from the reference dictionary
    #[error("Record {record} references unknown sequence {reference_id}")]
    UnknownReference { record: usize, reference_id: i32 },

    /// A mapped record spans coordinates no reference can have
    #[error("Record {record} has an invalid alignment span {start}..={end}")]
    InvalidAlignmentSpan { record: usize, start: i32, end: i64 },

    /// Two records claim the same successor
    #[error("Record {0} is the next fragment of more than one record")]
    DuplicateMateLink(usize),

    /// The container header disagrees with its records
    #[error("Container declares {expected} records / {expected_bases} bases, decoded {found} / {found_bases}")]
    CountMismatch {
        expected: u32,
        found: u32,
        expected_bases: u64,
        found_bases: u64,
    },

    /// A non-fatal format irregularity escalated by the strict validation policy
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The compressed payload could not be inflated
    #[error("Failed to decompress container payload: {0}")]
    Decompression(#[from] std::io::Error),

    /// The packed bases of a record could not be unpacked
    #[error("Failed to decode bases: {0}")]
    Bases(#[from] bitnuc::NucleotideError),
}

/// Errors that can occur while writing containers or output records
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// The sequence contains invalid nucleotide characters
    ///
    /// # Arguments
    /// * `String` - Description of the invalid nucleotides found
    #[error("Invalid nucleotides found in sequence: {0}")]
    InvalidNucleotideSequence(String),

    /// The quality scores do not match the read length
    #[error("Quality length ({got}) does not match the read length ({expected})")]
    UnexpectedQualityLength { expected: usize, got: usize },

    /// A template has more segments than fit in a single container
    #[error("Template of {0} segments exceeds the container capacity of {1} records")]
    TemplateExceedsContainer(usize, usize),

    /// A record references a sequence missing from the header dictionary
    #[error("Reference index {0} is not in the dictionary of {1} sequences")]
    UnknownReference(i32, usize),

    /// The sink was used after it was closed
    #[error("Record sink is already closed")]
    SinkClosed,
}

/// Errors in the configuration of a conversion run
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The default quality score is below the printable phred+33 range
    #[error("Default quality score must be at least 33, got {0}")]
    InvalidDefaultQuality(u8),

    /// Conversion mode was requested without an output sink
    #[error("A record sink is required unless counting only")]
    MissingSink,
}
