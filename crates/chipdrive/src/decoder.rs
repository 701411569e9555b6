//! Format-independent decoder interface.
use crate::bank::{BankConfig, SampleBank};
use crate::error::{Error, Result};
use crate::event::{Event, StreamInfo};
use crate::gep::{GEP_MAGIC, GepDecoder};
use crate::source::ByteSource;
use crate::vgm::{VGM_MAGIC, VgmDecoder};

/// Turns a command stream into [`Event`]s.
pub trait CommandDecoder {
    /// Decode the next event. After [`Event::End`] every call returns
    /// `End` again until the decoder is repositioned.
    fn next_event(&mut self) -> Result<Event>;

    /// Reposition at the loop point. Returns `Ok(false)` when no loop point
    /// is known yet.
    fn seek_to_loop(&mut self) -> Result<bool>;

    fn info(&self) -> &StreamInfo;

    /// Byte offset of the next command in the source.
    fn stream_position(&self) -> usize;

    fn bank(&self) -> &SampleBank;
}

impl<D: CommandDecoder + ?Sized> CommandDecoder for Box<D> {
    fn next_event(&mut self) -> Result<Event> {
        (**self).next_event()
    }

    fn seek_to_loop(&mut self) -> Result<bool> {
        (**self).seek_to_loop()
    }

    fn info(&self) -> &StreamInfo {
        (**self).info()
    }

    fn stream_position(&self) -> usize {
        (**self).stream_position()
    }

    fn bank(&self) -> &SampleBank {
        (**self).bank()
    }
}

/// Open a decoder for `source`, choosing the format by its magic bytes.
///
/// ```
/// use chipdrive::bank::BankConfig;
/// use chipdrive::decoder;
/// use chipdrive::source::FixedSource;
///
/// let bytes = b"RIFF\0\0\0\0";
/// let err = decoder::open(FixedSource::new(bytes), BankConfig::default()).err().unwrap();
/// assert!(err.to_string().starts_with("malformed header"));
/// ```
pub fn open<'a, S: ByteSource + 'a>(
    mut source: S,
    bank: BankConfig,
) -> Result<Box<dyn CommandDecoder + 'a>> {
    source.seek(0)?;
    let mut magic = [0u8; 4];
    source
        .read_exact(&mut magic, "magic")
        .map_err(|e| match e {
            Error::TruncatedStream { .. } => {
                Error::MalformedHeader("stream shorter than its magic".to_string())
            }
            other => other,
        })?;
    source.seek(0)?;
    match magic {
        VGM_MAGIC => Ok(Box::new(VgmDecoder::open(source, bank)?)),
        GEP_MAGIC => Ok(Box::new(GepDecoder::open(source, bank)?)),
        other => Err(Error::MalformedHeader(format!(
            "unrecognized magic {:02X?}",
            other
        ))),
    }
}
