//! # Container streams
//!
//! A simple block format standing in for the CRAM codec. It carries exactly what the
//! converter needs from every record: flags, positions, next-fragment links, detached
//! mate fields, bases and qualities.
//!
//! ## Stream Structure
//!
//! ```text
//! [Stream Header][Reference Dictionary][Container 1][Container 2]...[EOF Container]
//! ```
//!
//! Each container is:
//!
//! ```text
//! [Container Header][Payload]
//! ```
//!
//! The container header declares the number of records and bases of the payload, so
//! counting can skip decoding. Payloads are ZSTD compressed when the stream header says
//! so. Records of one template are written into the same container, each linking to the
//! next by its distance in records; links only point forward.
//!
//! See [`writer`] for the record layout.

mod header;
mod reader;
pub mod writer;

pub use header::{
    ContainerHeader, ReferenceSequence, StreamHeader, CONTAINER_CAPACITY, SIZE_CONTAINER_HEADER,
    SIZE_HEADER,
};
pub use reader::ContainerReader;
pub use writer::{ContainerWriter, ContainerWriterBuilder};
