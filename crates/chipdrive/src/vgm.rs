//! VGM, the verbatim register-log format.
//!
//! Only the parts of VGM that concern the YM2612 and SN76489 are acted on.
//! Commands for other chips are skipped by their documented length so that
//! multi-chip logs still play the supported parts.
pub mod decoder;
pub mod header;

pub use decoder::VgmDecoder;
pub use header::VgmHeader;

/// `"Vgm "`.
pub const VGM_MAGIC: [u8; 4] = *b"Vgm ";
