//! Little-endian readers and writers used by the header parsers and the
//! GEP builder.
use crate::error::{Error, Result};

fn check(bytes: &[u8], off: usize, needed: usize, context: &'static str) -> Result<()> {
    if off.checked_add(needed).is_none_or(|end| end > bytes.len()) {
        return Err(Error::TruncatedStream {
            offset: bytes.len().min(off),
            context,
        });
    }
    Ok(())
}

/// Read one byte from `bytes` at `off`.
pub fn read_u8_at(bytes: &[u8], off: usize, context: &'static str) -> Result<u8> {
    check(bytes, off, 1, context)?;
    Ok(bytes[off])
}

/// Read a 16-bit little-endian unsigned integer from `bytes` at `off`.
///
/// Returns `Err(Error::TruncatedStream)` when fewer than two bytes remain.
pub fn read_u16_le_at(bytes: &[u8], off: usize, context: &'static str) -> Result<u16> {
    check(bytes, off, 2, context)?;
    Ok(u16::from_le_bytes([bytes[off], bytes[off + 1]]))
}

/// Read a 32-bit little-endian unsigned integer from `bytes` at `off`.
///
/// Returns `Err(Error::TruncatedStream)` when fewer than four bytes remain.
pub fn read_u32_le_at(bytes: &[u8], off: usize, context: &'static str) -> Result<u32> {
    check(bytes, off, 4, context)?;
    let mut tmp = [0u8; 4];
    tmp.copy_from_slice(&bytes[off..off + 4]);
    Ok(u32::from_le_bytes(tmp))
}

/// Append `v` as little-endian bytes.
pub fn write_u16_le(dest: &mut Vec<u8>, v: u16) {
    dest.extend_from_slice(&v.to_le_bytes());
}

/// Append `v` as little-endian bytes.
pub fn write_u32_le(dest: &mut Vec<u8>, v: u32) {
    dest.extend_from_slice(&v.to_le_bytes());
}
