//! Error type shared by every layer of the engine.
//!
//! Errors surface either while a stream header is being loaded or at the
//! offending opcode during playback. Nothing in the engine attempts to
//! resynchronize after an error.

/// Errors produced by byte sources, decoders, the sample bank and the player.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The stream header is missing, has a bad magic, or declares
    /// inconsistent fields.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The stream ended in the middle of an opcode or header block.
    ///
    /// - `offset` is the source position at which more bytes were needed.
    /// - `context` names what was being read (for example `"long wait"`).
    #[error("truncated stream at offset 0x{offset:X} while reading {context}")]
    TruncatedStream {
        offset: usize,
        context: &'static str,
    },

    /// An index or offset points outside the table or payload it addresses
    /// (dictionary index, pattern id, sample offset, loop point).
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// A sample payload does not fit the configured bank capacity and the
    /// overflow policy forbids degrading.
    #[error("sample bank capacity exceeded: {needed} bytes needed, capacity is {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// The underlying storage failed or changed underneath the source.
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[from] std::io::Error),

    /// An opcode from a reserved range was found in the command stream.
    #[error("unknown opcode 0x{opcode:02X} at offset 0x{offset:X}")]
    UnknownOpcode { opcode: u8, offset: usize },
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offset() {
        let err = Error::UnknownOpcode {
            opcode: 0xF3,
            offset: 0x20,
        };
        assert_eq!(err.to_string(), "unknown opcode 0xF3 at offset 0x20");

        let err = Error::TruncatedStream {
            offset: 0x11,
            context: "long wait",
        };
        assert_eq!(
            err.to_string(),
            "truncated stream at offset 0x11 while reading long wait"
        );
    }

    #[test]
    fn io_errors_convert_into_source_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }
}
