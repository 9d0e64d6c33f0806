//! Utility functions for binary parsing and string conversion.

use crate::error::{MudError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::WINDOWS_1252;

/// Byte order of every integer in a run file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

impl Endian {
    /// Reads a u16 at `offset`, bounds-checked.
    pub fn read_u16(self, data: &[u8], offset: usize) -> Result<u16> {
        let bytes = slice_at(data, offset, 2)?;
        Ok(match self {
            Endian::Little => LittleEndian::read_u16(bytes),
            Endian::Big => BigEndian::read_u16(bytes),
        })
    }

    /// Reads a u32 at `offset`, bounds-checked.
    pub fn read_u32(self, data: &[u8], offset: usize) -> Result<u32> {
        let bytes = slice_at(data, offset, 4)?;
        Ok(match self {
            Endian::Little => LittleEndian::read_u32(bytes),
            Endian::Big => BigEndian::read_u32(bytes),
        })
    }

    /// Writes a u16 at `offset`, bounds-checked.
    pub fn write_u16(self, data: &mut [u8], offset: usize, value: u16) -> Result<()> {
        let bytes = slice_at_mut(data, offset, 2)?;
        match self {
            Endian::Little => LittleEndian::write_u16(bytes, value),
            Endian::Big => BigEndian::write_u16(bytes, value),
        }
        Ok(())
    }

    /// Writes a u32 at `offset`, bounds-checked.
    pub fn write_u32(self, data: &mut [u8], offset: usize, value: u32) -> Result<()> {
        let bytes = slice_at_mut(data, offset, 4)?;
        match self {
            Endian::Little => LittleEndian::write_u32(bytes, value),
            Endian::Big => BigEndian::write_u32(bytes, value),
        }
        Ok(())
    }

    /// Appends a u32 to a buffer.
    pub fn push_u32(self, out: &mut Vec<u8>, value: u32) {
        let mut word = [0u8; 4];
        match self {
            Endian::Little => LittleEndian::write_u32(&mut word, value),
            Endian::Big => BigEndian::write_u32(&mut word, value),
        }
        out.extend_from_slice(&word);
    }
}

fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(MudError::truncated(
            offset,
            len,
            data.len().saturating_sub(offset),
        )),
    }
}

fn slice_at_mut(data: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    let available = data.len().saturating_sub(offset);
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&mut data[offset..end]),
        _ => Err(MudError::truncated(offset, len, available)),
    }
}

/// Reads a fixed-capacity Latin-1 string field.
///
/// The field ends at the first NUL; bytes after it are ignored.
pub fn read_latin1_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let (decoded, _had_errors) = WINDOWS_1252.decode_without_bom_handling(&data[..end]);
    decoded.into_owned()
}

/// Encodes `value` into a fixed-capacity string field.
///
/// At most `field.len() - 1` bytes are copied and the remainder is NUL-filled,
/// so the field is always NUL-terminated. Truncation falls on a character
/// boundary: a character that encodes to several bytes (an `&#NNNN;`
/// reference) is stored whole or not at all. Returns the number of bytes
/// stored.
pub fn write_latin1_string(field: &mut [u8], value: &str) -> usize {
    let capacity = field.len().saturating_sub(1);
    let mut stored = 0;
    let mut utf8 = [0u8; 4];
    for c in value.chars() {
        let (encoded, _encoding, _had_unmappable) = WINDOWS_1252.encode(c.encode_utf8(&mut utf8));
        if stored + encoded.len() > capacity {
            break;
        }
        field[stored..stored + encoded.len()].copy_from_slice(&encoded);
        stored += encoded.len();
    }
    field[stored..].fill(0);
    stored
}

/// Truncates a string to at most `max_chars` characters.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Hex preview of a payload, eliding everything after `max` bytes.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    if data.len() <= max {
        hex::encode(data)
    } else {
        format!("{}.. ({} bytes)", hex::encode(&data[..max]), data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_both_orders() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(Endian::Little.read_u32(&data, 0).unwrap(), 0x04030201);
        assert_eq!(Endian::Big.read_u32(&data, 0).unwrap(), 0x01020304);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0u8; 6];
        let err = Endian::Little.read_u32(&data, 4).unwrap_err();
        assert!(matches!(
            err,
            MudError::Truncated {
                offset: 4,
                expected: 4,
                actual: 2
            }
        ));
        assert!(Endian::Little.read_u16(&data, usize::MAX).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let mut data = [0u8; 8];
        Endian::Big.write_u32(&mut data, 2, 0xDEADBEEF).unwrap();
        assert_eq!(Endian::Big.read_u32(&data, 2).unwrap(), 0xDEADBEEF);
        Endian::Little.write_u16(&mut data, 6, 0x1234).unwrap();
        assert_eq!(data[6..], [0x34, 0x12]);
    }

    #[test]
    fn test_latin1_string_stops_at_nul() {
        assert_eq!(read_latin1_string(b"Hello\0junk"), "Hello");
        assert_eq!(read_latin1_string(b"Full"), "Full");
        // 0xB0 is the degree sign in Latin-1
        assert_eq!(read_latin1_string(&[b'5', 0xB0, b'K', 0]), "5\u{b0}K");
    }

    #[test]
    fn test_write_string_truncates_and_terminates() {
        let mut field = [0xFFu8; 6];
        let stored = write_latin1_string(&mut field, "LongerThanField");
        assert_eq!(stored, 5);
        assert_eq!(&field, b"Longe\0");

        let stored = write_latin1_string(&mut field, "ab");
        assert_eq!(stored, 2);
        assert_eq!(&field, b"ab\0\0\0\0");
    }

    #[test]
    fn test_write_string_keeps_references_whole() {
        // U+263A encodes as the 7-byte reference "&#9786;"
        let mut field = [0xFFu8; 8];
        let stored = write_latin1_string(&mut field, "a\u{263A}");
        assert_eq!(stored, 1);
        assert_eq!(&field, b"a\0\0\0\0\0\0\0");

        let mut field = [0xFFu8; 9];
        let stored = write_latin1_string(&mut field, "a\u{263A}b");
        assert_eq!(stored, 8);
        assert_eq!(&field, b"a&#9786;\0");
        assert_eq!(read_latin1_string(&field), "a&#9786;");
    }

    #[test]
    fn test_hex_preview() {
        assert_eq!(hex_preview(&[0xAB, 0xCD], 4), "abcd");
        assert_eq!(hex_preview(&[1, 2, 3, 4, 5], 2), "0102.. (5 bytes)");
    }
}
