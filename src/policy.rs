use std::str::FromStr;

use log::warn;

use crate::error::{DecodeError, WriteError};
use crate::Result;

/// How the container writer handles bases that cannot be 2-bit packed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BasePolicy {
    /// Drop the whole template
    #[default]
    SkipTemplate,
    /// Fail the write
    Reject,
    /// Substitute this base for every symbol other than `ACGT`
    Replace(u8),
}
impl BasePolicy {
    /// Writes the packable form of `sequence` into `ibuf`
    ///
    /// Returns false if the template should be dropped instead.
    ///
    /// # Errors
    ///
    /// * `WriteError::InvalidNucleotideSequence` - If rejecting, or if the replacement is
    ///   not itself one of `ACGT`
    pub fn handle(&self, sequence: &[u8], ibuf: &mut Vec<u8>) -> Result<bool> {
        ibuf.clear();
        match *self {
            Self::SkipTemplate => Ok(false),
            Self::Reject => Err(WriteError::InvalidNucleotideSequence(
                String::from_utf8_lossy(sequence).into_owned(),
            )
            .into()),
            Self::Replace(base) if is_packable(base) => {
                ibuf.extend(
                    sequence
                        .iter()
                        .map(|&n| if is_packable(n) { n } else { base }),
                );
                Ok(true)
            }
            Self::Replace(base) => Err(WriteError::InvalidNucleotideSequence(format!(
                "replacement base {:?} is not one of ACGT",
                char::from(base)
            ))
            .into()),
        }
    }
}

fn is_packable(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

/// How the decoder treats format irregularities that do not prevent decoding
///
/// Examples are a missing end-of-stream container, a mapped record without a position,
/// or a record running past the end of its reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Irregularities abort the container with a decode error
    Strict,
    /// Irregularities are logged as warnings
    Lenient,
    /// Irregularities are ignored
    #[default]
    Silent,
}
impl ValidationPolicy {
    /// Reports an irregularity found in the container at `position`
    ///
    /// The message is only rendered when it is going to be used.
    pub fn report<F>(&self, position: u64, message: F) -> std::result::Result<(), DecodeError>
    where
        F: FnOnce() -> String,
    {
        match self {
            Self::Strict => Err(DecodeError::Validation(message())),
            Self::Lenient => {
                warn!("Container {position}: {}", message());
                Ok(())
            }
            Self::Silent => Ok(()),
        }
    }
}
impl FromStr for ValidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            "silent" => Ok(Self::Silent),
            other => Err(format!(
                "unknown validation stringency '{other}' (expected strict, lenient or silent)"
            )),
        }
    }
}
