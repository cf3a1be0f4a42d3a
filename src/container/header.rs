//! # Stream and Container Header Definitions
//!
//! A container stream starts with a fixed 32-byte [`StreamHeader`], followed by the
//! reference sequence dictionary. Every container is preceded by a fixed 32-byte
//! [`ContainerHeader`] carrying its payload size and its record and base counts, so that
//! counting does not require decoding.
//!
//! The stream is terminated by an end-of-stream container: a header with the EOF bit set
//! and an empty payload.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{HeaderError, ReadError, Result};

/// Magic number for stream identification: "CCNV" in ASCII (0x564E4343)
const MAGIC: u32 = 0x564E4343;

/// Magic number for container identification: "CONTAINR" in ASCII
const CONTAINER_MAGIC: u64 = 0x524E4941544E4F43;

/// Current format version number
const FORMAT: u8 = 1;

/// Size of the stream header in bytes
pub const SIZE_HEADER: usize = 32;

/// Size of the container header in bytes
pub const SIZE_CONTAINER_HEADER: usize = 32;

/// Default number of records per container
pub const CONTAINER_CAPACITY: u32 = 10_000;

/// Reserved bytes for future use in the stream header (18 bytes)
pub const RESERVED_BYTES: [u8; 18] = [42; 18];

/// Reserved bytes for future use in container headers (3 bytes)
pub const RESERVED_BYTES_CONTAINER: [u8; 3] = [42; 3];

/// Upper bound on reference names, guards against allocating garbage lengths
const MAX_REFERENCE_NAME: usize = 1 << 16;

/// One entry of the reference sequence dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSequence {
    pub name: String,
    pub length: u64,
}
impl ReferenceSequence {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Stream header of a container stream
///
/// # Fields
///
/// * `magic` - Magic number to validate the stream ("CCNV", 4 bytes)
/// * `format` - Version number of the format (1 byte)
/// * `compressed` - Whether container payloads are ZSTD compressed (1 byte boolean)
/// * `capacity` - Maximum number of records per container (4 bytes)
/// * `references` - Reference sequence dictionary, its size is stored in the header (4 bytes)
///   and the entries follow the fixed part
/// * `reserved` - Reserved bytes for future extensions (18 bytes)
#[derive(Clone, Debug, PartialEq)]
pub struct StreamHeader {
    /// Magic number to identify the format ("CCNV")
    pub magic: u32,

    /// Version of the format
    pub format: u8,

    /// Whether container payloads are compressed with ZSTD
    pub compressed: bool,

    /// Maximum number of records the writer puts into one container
    pub capacity: u32,

    /// Reference sequences that record reference indices point into
    pub references: Vec<ReferenceSequence>,

    /// Reserved bytes for future format extensions
    pub reserved: [u8; 18],
}
impl Default for StreamHeader {
    /// Creates a compressed header with the default capacity and no references
    fn default() -> Self {
        Self::with_capacity(CONTAINER_CAPACITY, true, Vec::new())
    }
}
impl StreamHeader {
    /// Creates a compressed header with the default container capacity
    pub fn new(references: Vec<ReferenceSequence>) -> Self {
        Self::with_capacity(CONTAINER_CAPACITY, true, references)
    }

    /// Creates a header with a custom container capacity
    ///
    /// # Parameters
    ///
    /// * `capacity` - Maximum number of records per container
    /// * `compressed` - Whether to use ZSTD compression for container payloads
    /// * `references` - The reference sequence dictionary
    pub fn with_capacity(capacity: u32, compressed: bool, references: Vec<ReferenceSequence>) -> Self {
        Self {
            magic: MAGIC,
            format: FORMAT,
            compressed,
            capacity: capacity.max(1),
            references,
            reserved: RESERVED_BYTES,
        }
    }

    /// Number of sequences in the reference dictionary
    #[must_use]
    pub fn n_references(&self) -> usize {
        self.references.len()
    }

    /// Returns whether `reference_id` is a valid index into the dictionary
    #[must_use]
    pub fn contains_reference(&self, reference_id: i32) -> bool {
        usize::try_from(reference_id).is_ok_and(|id| id < self.references.len())
    }

    /// Parses the fixed part of the header
    ///
    /// Returns the header with an empty dictionary and the number of dictionary entries
    /// that follow it.
    ///
    /// # Errors
    ///
    /// * `HeaderError::InvalidMagicNumber` - If the magic number doesn't match "CCNV"
    /// * `HeaderError::InvalidFormatVersion` - If the format version is unsupported
    /// * `HeaderError::InvalidReservedBytes` - If the reserved bytes differ from the written ones
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<(Self, u32)> {
        let magic = LittleEndian::read_u32(&buffer[0..4]);
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagicNumber(magic).into());
        }
        let format = buffer[4];
        if format != FORMAT {
            return Err(HeaderError::InvalidFormatVersion(format).into());
        }
        let compressed = buffer[5] != 0;
        let capacity = LittleEndian::read_u32(&buffer[6..10]);
        let n_references = LittleEndian::read_u32(&buffer[10..14]);
        if buffer[14..32] != RESERVED_BYTES {
            return Err(HeaderError::InvalidReservedBytes.into());
        }
        let header = Self {
            magic,
            format,
            compressed,
            capacity,
            references: Vec::new(),
            reserved: RESERVED_BYTES,
        };
        Ok((header, n_references))
    }

    /// Writes the fixed header followed by the reference dictionary
    ///
    /// Each dictionary entry is a little-endian `u32` name length, the UTF-8 name, and a
    /// little-endian `u64` sequence length.
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_HEADER];
        LittleEndian::write_u32(&mut buffer[0..4], self.magic);
        buffer[4] = self.format;
        buffer[5] = u8::from(self.compressed);
        LittleEndian::write_u32(&mut buffer[6..10], self.capacity);
        LittleEndian::write_u32(&mut buffer[10..14], self.references.len() as u32);
        buffer[14..32].copy_from_slice(&self.reserved);
        writer.write_all(&buffer)?;

        for reference in &self.references {
            writer.write_u32::<LittleEndian>(reference.name.len() as u32)?;
            writer.write_all(reference.name.as_bytes())?;
            writer.write_u64::<LittleEndian>(reference.length)?;
        }
        Ok(())
    }

    /// Reads the fixed header and the reference dictionary from a reader
    ///
    /// # Errors
    ///
    /// * IO errors if the fixed part cannot be read
    /// * Header validation errors from `from_bytes()`
    /// * `HeaderError::InvalidReferenceEntry` - If a dictionary entry is truncated or its
    ///   name is not valid UTF-8
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        reader.read_exact(&mut buffer)?;
        let (mut header, n_references) = Self::from_bytes(&buffer)?;

        for index in 0..n_references as usize {
            let entry = read_reference(reader)
                .ok_or(HeaderError::InvalidReferenceEntry(index))?;
            header.references.push(entry);
        }
        Ok(header)
    }
}

fn read_reference<R: Read>(reader: &mut R) -> Option<ReferenceSequence> {
    let name_len = reader.read_u32::<LittleEndian>().ok()? as usize;
    if name_len == 0 || name_len > MAX_REFERENCE_NAME {
        return None;
    }
    let mut name = vec![0u8; name_len];
    reader.read_exact(&mut name).ok()?;
    let name = String::from_utf8(name).ok()?;
    let length = reader.read_u64::<LittleEndian>().ok()?;
    Some(ReferenceSequence { name, length })
}

/// Container header preceding every container payload
///
/// # Fields
///
/// * `magic` - Magic number to validate container integrity ("CONTAINR", 8 bytes)
/// * `size` - Size of the payload in bytes as stored (8 bytes)
/// * `records` - Number of records in the container (4 bytes)
/// * `bases` - Total read length of the records in the container (8 bytes)
/// * `eof` - Whether this is the end-of-stream container (1 byte boolean)
/// * `reserved` - Reserved bytes for future extensions (3 bytes)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: u64,
    pub size: u64,
    pub records: u32,
    pub bases: u64,
    pub eof: bool,
    pub reserved: [u8; 3],
}
impl Default for ContainerHeader {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}
impl ContainerHeader {
    pub fn new(size: u64, records: u32, bases: u64) -> Self {
        Self {
            magic: CONTAINER_MAGIC,
            size,
            records,
            bases,
            eof: false,
            reserved: RESERVED_BYTES_CONTAINER,
        }
    }

    /// Creates the header of the end-of-stream container
    #[must_use]
    pub fn eof() -> Self {
        Self {
            eof: true,
            ..Self::new(0, 0, 0)
        }
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_CONTAINER_HEADER];
        LittleEndian::write_u64(&mut buffer[0..8], self.magic);
        LittleEndian::write_u64(&mut buffer[8..16], self.size);
        LittleEndian::write_u32(&mut buffer[16..20], self.records);
        LittleEndian::write_u64(&mut buffer[20..28], self.bases);
        buffer[28] = u8::from(self.eof);
        buffer[29..].copy_from_slice(&self.reserved);
        writer.write_all(&buffer)?;
        Ok(())
    }

    /// Creates a container header from a 32-byte buffer
    ///
    /// # Errors
    ///
    /// * `ReadError::InvalidContainerMagicNumber` - If the magic number doesn't match
    pub fn from_bytes(buffer: &[u8; SIZE_CONTAINER_HEADER], position: u64) -> Result<Self> {
        let magic = LittleEndian::read_u64(&buffer[0..8]);
        if magic != CONTAINER_MAGIC {
            return Err(ReadError::InvalidContainerMagicNumber(magic, position).into());
        }
        let size = LittleEndian::read_u64(&buffer[8..16]);
        let records = LittleEndian::read_u32(&buffer[16..20]);
        let bases = LittleEndian::read_u64(&buffer[20..28]);
        Ok(Self {
            eof: buffer[28] != 0,
            ..Self::new(size, records, bases)
        })
    }
}
