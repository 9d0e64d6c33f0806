//! Section header parsing and the configurable header layout.
//!
//! Every section starts with a fixed 12-byte header made of three 32-bit
//! words: the payload length, the section type id, and the instance number.
//! Which word comes first and the byte order are codec parameters.

use crate::error::{MudError, Result};
use crate::utils::Endian;
use std::fmt;

/// Size of a section header in bytes.
pub const SECTION_HEADER_SIZE: usize = 12;

/// Size of the child-count prefix on group payloads.
pub const GROUP_COUNT_SIZE: usize = 4;

/// One of the three words in a section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderWord {
    /// Payload length in bytes (header excluded).
    Length,
    /// Section type id.
    TypeId,
    /// Instance number.
    Instance,
}

/// On-disk header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLayout {
    /// Byte order for header words and record fields.
    pub endian: Endian,

    /// Order of the header words.
    words: [HeaderWord; 3],

    /// Whether group payloads start with a u32 child count.
    pub group_count: bool,
}

impl HeaderLayout {
    /// Creates a layout, checking that `words` names each header word once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if a word is repeated or missing.
    pub fn new(endian: Endian, words: [HeaderWord; 3], group_count: bool) -> Result<Self> {
        for word in [HeaderWord::Length, HeaderWord::TypeId, HeaderWord::Instance] {
            if words.iter().filter(|&&w| w == word).count() != 1 {
                return Err(MudError::InvalidFormat(format!(
                    "Header layout must contain {:?} exactly once",
                    word
                )));
            }
        }
        Ok(Self {
            endian,
            words,
            group_count,
        })
    }

    /// Returns the header word order.
    pub fn words(&self) -> [HeaderWord; 3] {
        self.words
    }
}

impl Default for HeaderLayout {
    fn default() -> Self {
        Self {
            endian: Endian::Little,
            words: [HeaderWord::Length, HeaderWord::TypeId, HeaderWord::Instance],
            group_count: true,
        }
    }
}

/// A decoded section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// Payload length in bytes.
    pub length: u32,

    /// Section type id.
    pub type_id: u32,

    /// Instance number.
    pub instance: u32,
}

impl SectionHeader {
    /// Parses a header at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if fewer than 12 bytes remain.
    pub fn parse(data: &[u8], offset: usize, layout: &HeaderLayout) -> Result<Self> {
        let available = data.len().saturating_sub(offset);
        if available < SECTION_HEADER_SIZE {
            return Err(MudError::truncated(offset, SECTION_HEADER_SIZE, available));
        }

        let mut header = SectionHeader {
            length: 0,
            type_id: 0,
            instance: 0,
        };
        for (i, word) in layout.words.iter().enumerate() {
            let value = layout.endian.read_u32(data, offset + i * 4)?;
            match word {
                HeaderWord::Length => header.length = value,
                HeaderWord::TypeId => header.type_id = value,
                HeaderWord::Instance => header.instance = value,
            }
        }
        Ok(header)
    }

    fn word(&self, word: HeaderWord) -> u32 {
        match word {
            HeaderWord::Length => self.length,
            HeaderWord::TypeId => self.type_id,
            HeaderWord::Instance => self.instance,
        }
    }

    /// Appends the encoded header to `out`.
    pub fn write(&self, out: &mut Vec<u8>, layout: &HeaderLayout) {
        for word in layout.words {
            layout.endian.push_u32(out, self.word(word));
        }
    }

    /// Writes the encoded header over the first 12 bytes of `out`.
    pub fn write_at(&self, out: &mut [u8], layout: &HeaderLayout) -> Result<()> {
        for (i, word) in layout.words.iter().enumerate() {
            layout.endian.write_u32(out, i * 4, self.word(*word))?;
        }
        Ok(())
    }

    /// Offset of the first byte after this section.
    pub fn end(&self, offset: usize) -> usize {
        offset + SECTION_HEADER_SIZE + self.length as usize
    }
}

impl fmt::Display for SectionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "section {:#010x}/{} ({} bytes)",
            self.type_id, self.instance, self.length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(SECTION_HEADER_SIZE, 12);
    }

    #[test]
    fn test_default_layout_parse() {
        let data = [
            0x10, 0, 0, 0, // length
            0x02, 0, 0, 0x01, // type id
            0x03, 0, 0, 0, // instance
        ];
        let header = SectionHeader::parse(&data, 0, &HeaderLayout::default()).unwrap();
        assert_eq!(header.length, 0x10);
        assert_eq!(header.type_id, 0x0100_0002);
        assert_eq!(header.instance, 3);
        assert_eq!(header.end(0), 12 + 0x10);
    }

    #[test]
    fn test_custom_layout_write_parse() {
        let layout = HeaderLayout::new(
            Endian::Big,
            [HeaderWord::TypeId, HeaderWord::Instance, HeaderWord::Length],
            false,
        )
        .unwrap();
        let header = SectionHeader {
            length: 40,
            type_id: 0xCAFE,
            instance: 7,
        };
        let mut out = Vec::new();
        header.write(&mut out, &layout);
        assert_eq!(out.len(), SECTION_HEADER_SIZE);
        assert_eq!(&out[0..4], &[0, 0, 0xCA, 0xFE]);
        assert_eq!(SectionHeader::parse(&out, 0, &layout).unwrap(), header);
    }

    #[test]
    fn test_layout_rejects_duplicate_words() {
        let result = HeaderLayout::new(
            Endian::Little,
            [HeaderWord::Length, HeaderWord::Length, HeaderWord::Instance],
            true,
        );
        assert!(matches!(result, Err(MudError::InvalidFormat(_))));
    }

    #[test]
    fn test_truncated_header() {
        let data = [0u8; 8];
        let result = SectionHeader::parse(&data, 0, &HeaderLayout::default());
        assert!(matches!(result, Err(MudError::Truncated { .. })));
    }
}
