use std::io::{self, Write};

use log::debug;

use super::RecordSink;
use crate::container::StreamHeader;
use crate::error::{Result, WriteError};
use crate::record::OutputRecord;

/// SAM format version written to the `@HD` line
const SAM_VERSION: &str = "1.6";

/// Writes output records as SAM text
///
/// A broken pipe on the inner writer closes the sink instead of failing the run, so
/// piping into `head` ends the conversion quietly.
pub struct SamWriter<W: Write> {
    inner: W,
    /// Names of the reference sequences, indexed by reference id
    references: Vec<String>,
    /// Reusable line buffer
    line: Vec<u8>,
    closed: bool,
    refused: bool,
}
impl<W: Write> SamWriter<W> {
    /// Creates a writer, emitting the `@HD` and `@SQ` lines when `print_header` is set
    pub fn new(inner: W, header: &StreamHeader, print_header: bool) -> Result<Self> {
        let mut writer = Self {
            inner,
            references: header.references.iter().map(|r| r.name.clone()).collect(),
            line: Vec::new(),
            closed: false,
            refused: false,
        };
        if print_header {
            writer.line.extend_from_slice(b"@HD\tVN:");
            writer.line.extend_from_slice(SAM_VERSION.as_bytes());
            writer.line.extend_from_slice(b"\tSO:unsorted\n");
            for reference in &header.references {
                writer.line.extend_from_slice(b"@SQ\tSN:");
                writer.line.extend_from_slice(reference.name.as_bytes());
                writer.line.extend_from_slice(b"\tLN:");
                push_int(&mut writer.line, reference.length);
                writer.line.push(b'\n');
            }
            writer.write_line()?;
        }
        Ok(writer)
    }

    /// Returns the inner writer
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn push_reference(&mut self, reference_id: i32) -> Result<()> {
        if reference_id < 0 {
            self.line.push(b'*');
            return Ok(());
        }
        match self.references.get(reference_id as usize) {
            Some(name) => {
                self.line.extend_from_slice(name.as_bytes());
                Ok(())
            }
            None => Err(WriteError::UnknownReference(reference_id, self.references.len()).into()),
        }
    }

    fn format(&mut self, record: &OutputRecord) -> Result<()> {
        self.line.clear();
        push_field(&mut self.line, &record.name);
        self.line.push(b'\t');
        push_int(&mut self.line, record.flags);
        self.line.push(b'\t');
        self.push_reference(record.reference_id)?;
        self.line.push(b'\t');
        push_int(&mut self.line, record.position.max(0));
        self.line.push(b'\t');
        push_int(&mut self.line, record.mapping_quality);
        self.line.push(b'\t');
        push_field(&mut self.line, &record.cigar);
        self.line.push(b'\t');
        if record.mate_reference_id >= 0 && record.mate_reference_id == record.reference_id {
            self.line.push(b'=');
        } else {
            self.push_reference(record.mate_reference_id)?;
        }
        self.line.push(b'\t');
        push_int(&mut self.line, record.mate_position.max(0));
        self.line.push(b'\t');
        push_int(&mut self.line, record.template_length);
        self.line.push(b'\t');
        push_field(&mut self.line, &record.sequence);
        self.line.push(b'\t');
        push_field(&mut self.line, &record.qualities);
        self.line.push(b'\n');
        Ok(())
    }

    /// Writes the line buffer, returning false on a broken pipe
    fn write_line(&mut self) -> Result<bool> {
        match self.inner.write_all(&self.line) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Output closed by the reader, stopping");
                self.refused = true;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
impl<W: Write> RecordSink for SamWriter<W> {
    fn accept(&mut self, record: &OutputRecord) -> Result<bool> {
        if self.closed {
            return Err(WriteError::SinkClosed.into());
        }
        if self.refused {
            return Ok(false);
        }
        self.format(record)?;
        self.write_line()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.inner.flush() {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn push_int<I: itoa::Integer>(line: &mut Vec<u8>, value: I) {
    let mut buf = itoa::Buffer::new();
    line.extend_from_slice(buf.format(value).as_bytes());
}

fn push_field(line: &mut Vec<u8>, field: &[u8]) {
    if field.is_empty() {
        line.push(b'*');
    } else {
        line.extend_from_slice(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ReferenceSequence;
    use crate::flags::{MATE_REVERSE, PAIRED, UNMAPPED};

    fn header() -> StreamHeader {
        StreamHeader::new(vec![
            ReferenceSequence::new("chr1", 1000),
            ReferenceSequence::new("chr2", 500),
        ])
    }

    fn mapped() -> OutputRecord {
        OutputRecord {
            name: b"r1".to_vec(),
            flags: PAIRED | MATE_REVERSE,
            reference_id: 0,
            position: 100,
            mapping_quality: 60,
            cigar: b"4M".to_vec(),
            mate_reference_id: 0,
            mate_position: 200,
            template_length: 150,
            sequence: b"ACGT".to_vec(),
            qualities: b"IIII".to_vec(),
        }
    }

    fn render(records: &[OutputRecord], print_header: bool) -> Result<String> {
        let mut writer = SamWriter::new(Vec::new(), &header(), print_header)?;
        for record in records {
            assert!(writer.accept(record)?);
        }
        writer.close()?;
        Ok(String::from_utf8(writer.into_inner()).unwrap())
    }

    #[test]
    fn test_header_lines() -> Result<()> {
        let text = render(&[], true)?;
        assert_eq!(
            text,
            "@HD\tVN:1.6\tSO:unsorted\n@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:500\n"
        );
        assert!(render(&[], false)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_mapped_and_paired_record() -> Result<()> {
        let mut other = mapped();
        other.mate_reference_id = 1;
        other.template_length = 0;
        let text = render(&[mapped(), other], false)?;
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "r1\t33\tchr1\t100\t60\t4M\t=\t200\t150\tACGT\tIIII");
        assert_eq!(lines[1], "r1\t33\tchr1\t100\t60\t4M\tchr2\t200\t0\tACGT\tIIII");
        Ok(())
    }

    #[test]
    fn test_unmapped_record() -> Result<()> {
        let record = OutputRecord {
            name: b"u".to_vec(),
            flags: UNMAPPED,
            reference_id: -1,
            mate_reference_id: -1,
            sequence: b"ACGT".to_vec(),
            qualities: b"????".to_vec(),
            ..OutputRecord::default()
        };
        let text = render(&[record], false)?;
        assert_eq!(text, "u\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t????\n");
        Ok(())
    }

    #[test]
    fn test_unknown_reference() -> Result<()> {
        let mut record = mapped();
        record.reference_id = 7;
        let mut writer = SamWriter::new(Vec::new(), &header(), false)?;
        assert!(writer.accept(&record).is_err());
        Ok(())
    }

    struct BrokenPipe;
    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_broken_pipe_refuses() -> Result<()> {
        let mut writer = SamWriter::new(BrokenPipe, &header(), false)?;
        assert!(!writer.accept(&mapped())?);
        assert!(!writer.accept(&mapped())?);
        writer.close()?;
        assert!(matches!(
            writer.accept(&mapped()),
            Err(crate::Error::WriteError(WriteError::SinkClosed))
        ));
        Ok(())
    }
}
