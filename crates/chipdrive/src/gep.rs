//! GEP, the compressed command stream format.
//!
//! A GEP stream is a 16-byte header followed by a register dictionary, an
//! optional pattern table, the DAC payload blocks and finally the command
//! stream. Commands are byte-oriented: most common operations (short waits,
//! dictionary writes, key on/off) fit in a single byte.
//!
//! - [`GepHeader`] parses the fixed header.
//! - [`GepDecoder`] turns the command stream into [`Event`](crate::Event)s.
//! - [`GepBuilder`] encodes a register-write trace into a GEP image.
pub mod builder;
pub mod decoder;
pub mod header;

pub use builder::GepBuilder;
pub use decoder::GepDecoder;
pub use header::{GepFlags, GepHeader};

/// Magic bytes and format version.
pub const GEP_MAGIC: [u8; 4] = *b"GEP\x01";

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 16;

/// Loop chunk value meaning "no loop".
pub const NO_LOOP: u16 = 0xFFFF;

/// Maximum number of patterns in the pattern table.
pub const MAX_PATTERNS: usize = 16;

/// Command stream opcodes.
pub mod opcode {
    pub const WAIT_SHORT: u8 = 0x00;
    pub const DICT_WRITE: u8 = 0x40;
    pub const PSG_BURST: u8 = 0x80;
    pub const WAIT_FRAMES: u8 = 0x90;
    pub const KEY: u8 = 0xA0;
    pub const DICT_WRITE_EXT: u8 = 0xB0;
    pub const FM_PORT0: u8 = 0xB1;
    pub const FM_PORT1: u8 = 0xB2;
    pub const PSG_WRITE: u8 = 0xB3;
    pub const WAIT_LONG: u8 = 0xB4;
    pub const LOOP_MARK: u8 = 0xB5;
    pub const DAC_WRITE: u8 = 0xB6;
    pub const DAC_SEEK: u8 = 0xB7;
    pub const DAC_BLOCK: u8 = 0xB8;
    pub const DAC_RUN: u8 = 0xB9;
    pub const DAC_WAIT: u8 = 0xC0;
    pub const PATTERN: u8 = 0xE0;
    pub const CHUNK_END: u8 = 0xFE;
    pub const END: u8 = 0xFF;
}
