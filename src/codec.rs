//! Section tree encoding and decoding.
//!
//! Each section is a 12-byte header followed by its payload. Payload
//! interpretation is looked up in the [`TypeRegistry`]: fixed records must
//! have exactly the registered size, opaque payloads may have any length,
//! and group payloads are a (optionally counted) sequence of nested
//! sections that must exactly fill the declared length.
//!
//! Encoding is bottom-up: a section's length is computed from its encoded
//! payload, so the root's encoded size is the file size. Re-encoding a
//! decoded tree reproduces the input byte for byte.

use crate::catalog::default_registry;
use crate::error::{MudError, Result};
use crate::header::{HeaderLayout, SectionHeader, GROUP_COUNT_SIZE, SECTION_HEADER_SIZE};
use crate::registry::{PayloadShape, TypeRegistry};
use crate::section::{Payload, Section};
use crate::utils::hex_preview;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Maximum group nesting accepted while decoding.
///
/// Guards the recursive decoder against crafted input.
pub const MAX_DEPTH: usize = 64;

/// Encoder/decoder for one header layout and type registry.
#[derive(Debug, Clone)]
pub struct Codec {
    layout: HeaderLayout,
    registry: Arc<TypeRegistry>,
}

impl Default for Codec {
    /// Default header layout with the standard catalog.
    fn default() -> Self {
        Self::new(HeaderLayout::default(), default_registry())
    }
}

impl Codec {
    /// Creates a codec.
    pub fn new(layout: HeaderLayout, registry: TypeRegistry) -> Self {
        Self {
            layout,
            registry: Arc::new(registry),
        }
    }

    /// Header layout in use.
    pub fn layout(&self) -> &HeaderLayout {
        &self.layout
    }

    /// Type registry in use.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Decodes a complete byte stream into a section tree.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the stream is truncated, contains an
    /// unregistered type (without fallback), has a length that disagrees with
    /// the registry, nests deeper than [`MAX_DEPTH`], or has trailing bytes.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub fn decode(&self, data: &[u8]) -> Result<Section> {
        let (root, end) = self.decode_section(data, 0, data.len(), 0)?;
        if end != data.len() {
            return Err(MudError::InvalidFormat(format!(
                "{} trailing bytes after root section at offset {:#x}",
                data.len() - end,
                end
            )));
        }
        debug!(
            root_type = %format!("{:#010x}", root.type_id),
            sections = root.walk().count(),
            "Decoded section tree"
        );
        Ok(root)
    }

    /// Decodes one section at `offset`, not reading past `limit`.
    ///
    /// Returns the section and the offset just past it.
    fn decode_section(
        &self,
        data: &[u8],
        offset: usize,
        limit: usize,
        depth: usize,
    ) -> Result<(Section, usize)> {
        if depth > MAX_DEPTH {
            return Err(MudError::InvalidFormat(format!(
                "Groups nested deeper than {} at offset {:#x}",
                MAX_DEPTH, offset
            )));
        }

        let header = SectionHeader::parse(&data[..limit], offset, &self.layout)?;
        let start = offset + SECTION_HEADER_SIZE;
        let end = start
            .checked_add(header.length as usize)
            .filter(|&end| end <= limit)
            .ok_or_else(|| {
                MudError::truncated(
                    offset,
                    SECTION_HEADER_SIZE + header.length as usize,
                    limit - offset,
                )
            })?;

        let shape = match self.registry.shape(header.type_id) {
            Some(shape) => shape,
            None if self.registry.unknown_fallback() => &PayloadShape::OpaqueBytes,
            None => {
                return Err(MudError::UnknownSectionType {
                    type_id: header.type_id,
                    offset,
                })
            }
        };

        let payload = match shape {
            PayloadShape::FixedRecord(record) => {
                if header.length as usize != record.size() {
                    return Err(MudError::LengthMismatch {
                        type_id: header.type_id,
                        offset,
                        declared: header.length as usize,
                        expected: record.size(),
                    });
                }
                Payload::Bytes(data[start..end].to_vec())
            }
            PayloadShape::OpaqueBytes => Payload::Bytes(data[start..end].to_vec()),
            PayloadShape::GroupOfSections => {
                Payload::Group(self.decode_children(data, &header, offset, end, depth)?)
            }
        };

        Ok((
            Section {
                type_id: header.type_id,
                instance: header.instance,
                payload,
            },
            end,
        ))
    }

    fn decode_children(
        &self,
        data: &[u8],
        header: &SectionHeader,
        offset: usize,
        end: usize,
        depth: usize,
    ) -> Result<Vec<Section>> {
        let mut pos = offset + SECTION_HEADER_SIZE;
        let mut children = Vec::new();

        if self.layout.group_count {
            let count = self.layout.endian.read_u32(&data[..end], pos)? as usize;
            pos += GROUP_COUNT_SIZE;

            // Every child needs at least a header
            let max_children = (end - pos) / SECTION_HEADER_SIZE;
            if count > max_children {
                return Err(MudError::InvalidFormat(format!(
                    "Group {:#010x} at offset {:#x} claims {} children but only has room for {}",
                    header.type_id, offset, count, max_children
                )));
            }

            children.reserve(count);
            for _ in 0..count {
                let (child, next) = self.decode_section(data, pos, end, depth + 1)?;
                children.push(child);
                pos = next;
            }
        } else {
            while pos < end {
                let (child, next) = self.decode_section(data, pos, end, depth + 1)?;
                children.push(child);
                pos = next;
            }
        }

        if pos != end {
            return Err(MudError::LengthMismatch {
                type_id: header.type_id,
                offset,
                declared: header.length as usize,
                expected: pos - offset - SECTION_HEADER_SIZE,
            });
        }
        Ok(children)
    }

    /// Encodes a section tree.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if a section's payload does not fit its registered
    /// shape, or a length overflows 32 bits.
    pub fn encode(&self, root: &Section) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_section(root, &mut out)?;
        debug!(size = out.len(), "Encoded section tree");
        Ok(out)
    }

    fn encode_section(&self, section: &Section, out: &mut Vec<u8>) -> Result<()> {
        let header_pos = out.len();
        out.resize(header_pos + SECTION_HEADER_SIZE, 0);

        let shape = match self.registry.shape(section.type_id) {
            Some(shape) => shape,
            None if self.registry.unknown_fallback() => &PayloadShape::OpaqueBytes,
            None => {
                return Err(MudError::Encode(format!(
                    "Section type {:#010x} is not registered",
                    section.type_id
                )))
            }
        };

        match (&section.payload, shape) {
            (Payload::Bytes(bytes), PayloadShape::FixedRecord(record)) => {
                if bytes.len() != record.size() {
                    return Err(MudError::Encode(format!(
                        "Record {:#010x}/{} has {} bytes, layout needs {}",
                        section.type_id,
                        section.instance,
                        bytes.len(),
                        record.size()
                    )));
                }
                out.extend_from_slice(bytes);
            }
            (Payload::Bytes(bytes), PayloadShape::OpaqueBytes) => out.extend_from_slice(bytes),
            (Payload::Group(children), PayloadShape::GroupOfSections) => {
                if self.layout.group_count {
                    let count = u32::try_from(children.len())
                        .map_err(|_| MudError::Encode("Too many children in group".into()))?;
                    self.layout.endian.push_u32(out, count);
                }
                for child in children {
                    self.encode_section(child, out)?;
                }
            }
            (payload, shape) => {
                let found = match payload {
                    Payload::Bytes(_) => "bytes",
                    Payload::Group(_) => "group",
                };
                return Err(MudError::Encode(format!(
                    "Section {:#010x}/{} holds {} but is registered as {}",
                    section.type_id,
                    section.instance,
                    found,
                    shape.name()
                )));
            }
        }

        let length = out.len() - header_pos - SECTION_HEADER_SIZE;
        let header = SectionHeader {
            length: u32::try_from(length).map_err(|_| {
                MudError::Encode(format!("Section payload of {} bytes is too large", length))
            })?,
            type_id: section.type_id,
            instance: section.instance,
        };
        header.write_at(&mut out[header_pos..header_pos + SECTION_HEADER_SIZE], &self.layout)
    }

    /// Creates a blank section of a registered type.
    ///
    /// Records are zero-filled to their layout size, opaque sections are
    /// empty, and groups have no children.
    pub fn new_section(&self, type_id: u32, instance: u32) -> Result<Section> {
        match self.registry.shape(type_id) {
            Some(PayloadShape::FixedRecord(record)) => {
                Ok(Section::leaf(type_id, instance, vec![0; record.size()]))
            }
            Some(PayloadShape::OpaqueBytes) => Ok(Section::leaf(type_id, instance, Vec::new())),
            Some(PayloadShape::GroupOfSections) => Ok(Section::group(type_id, instance)),
            None => Err(MudError::InvalidFormat(format!(
                "Section type {:#010x} is not registered",
                type_id
            ))),
        }
    }

    /// Renders a tree as indented text, one section per line.
    pub fn describe(&self, root: &Section) -> String {
        let mut out = String::new();
        for (depth, section) in root.walk() {
            let _ = write!(
                out,
                "{:indent$}{} {:#010x}/{}",
                "",
                self.registry.name_of(section.type_id),
                section.type_id,
                section.instance,
                indent = depth * 2
            );
            let _ = match &section.payload {
                Payload::Group(children) => writeln!(out, " [{} members]", children.len()),
                Payload::Bytes(bytes) => match self.registry.shape(section.type_id) {
                    Some(PayloadShape::FixedRecord(_)) => {
                        writeln!(out, " ({} bytes)", bytes.len())
                    }
                    _ => writeln!(out, " {}", hex_preview(bytes, 16)),
                },
            };
        }
        out
    }
}
