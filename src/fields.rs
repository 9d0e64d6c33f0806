//! Typed field accessors over a section tree.
//!
//! Accessors find a record with [`search`], look up the field in the record
//! layout registered for the record's type, and read or write the field's
//! bytes in place. Numeric setters wrap the value to the field width; string
//! setters truncate to the field capacity and always leave a terminating NUL.
//! Nothing here re-encodes the tree.

use crate::codec::Codec;
use crate::error::{MudError, Result};
use crate::registry::{Accessor, FieldDef, FieldKind};
use crate::search::{search, search_mut, PathElem, SectionPath};
use crate::section::Section;
use crate::utils::{read_latin1_string, truncate_chars, write_latin1_string};
use std::fmt;

/// A field value read through an [`Accessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Integer field.
    Numeric(i64),
    /// String field.
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Numeric(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

fn path_with(path: &[PathElem], type_id: u32, instance: u32) -> Vec<PathElem> {
    let mut full = path.to_vec();
    full.push(PathElem::new(type_id, instance));
    full
}

fn describe_path(path: &[PathElem]) -> String {
    SectionPath::from(path.to_vec()).to_string()
}

/// Looks up the field definition for the record `section`.
fn field_def<'c>(codec: &'c Codec, section: &Section, field: &str) -> Result<&'c FieldDef> {
    let registry = codec.registry();
    let layout = registry.layout(section.type_id).ok_or_else(|| {
        MudError::type_mismatch(
            field,
            "record",
            registry
                .shape(section.type_id)
                .map(|s| s.name())
                .unwrap_or("unknown"),
        )
    })?;
    layout
        .field(field)
        .ok_or_else(|| MudError::not_found("field", field))
}

fn record<'a>(root: &'a Section, path: &[PathElem]) -> Result<&'a Section> {
    search(root, path).ok_or_else(|| MudError::SectionNotFound(describe_path(path)))
}

fn record_mut<'a>(root: &'a mut Section, path: &[PathElem]) -> Result<&'a mut Section> {
    search_mut(root, path).ok_or_else(|| MudError::SectionNotFound(describe_path(path)))
}

fn field_bytes<'a>(section: &'a Section, def: &FieldDef) -> Result<&'a [u8]> {
    let bytes = section.bytes().unwrap_or_default();
    let available = bytes.len().saturating_sub(def.offset);
    bytes
        .get(def.offset..def.offset + def.kind.size())
        .ok_or_else(|| MudError::truncated(def.offset, def.kind.size(), available))
}

fn field_bytes_mut<'a>(section: &'a mut Section, def: &FieldDef) -> Result<&'a mut [u8]> {
    let bytes = section
        .bytes_mut()
        .ok_or_else(|| MudError::type_mismatch(&def.name, "record", "group"))?;
    let available = bytes.len().saturating_sub(def.offset);
    bytes
        .get_mut(def.offset..def.offset + def.kind.size())
        .ok_or_else(|| MudError::truncated(def.offset, def.kind.size(), available))
}

/// Reads an integer field of the record at `path`.
///
/// # Errors
///
/// `SectionNotFound` if the path does not resolve, `FieldNotFound` if the
/// record has no such field, `TypeMismatch` if the field is a string or the
/// section is not a record.
pub fn get_numeric(codec: &Codec, root: &Section, path: &[PathElem], field: &str) -> Result<i64> {
    let section = record(root, path)?;
    let def = field_def(codec, section, field)?;
    let bytes = field_bytes(section, def)?;
    let endian = codec.layout().endian;
    Ok(match def.kind {
        FieldKind::U8 => i64::from(bytes[0]),
        FieldKind::U16 => i64::from(endian.read_u16(bytes, 0)?),
        FieldKind::I16 => i64::from(endian.read_u16(bytes, 0)? as i16),
        FieldKind::U32 => i64::from(endian.read_u32(bytes, 0)?),
        FieldKind::I32 => i64::from(endian.read_u32(bytes, 0)? as i32),
        FieldKind::Str(_) => return Err(MudError::type_mismatch(field, "numeric", "string")),
    })
}

/// Writes an integer field of the record at `path`.
///
/// The value is wrapped to the field width; out-of-range values are not
/// rejected.
pub fn set_numeric(
    codec: &Codec,
    root: &mut Section,
    path: &[PathElem],
    field: &str,
    value: i64,
) -> Result<()> {
    let endian = codec.layout().endian;
    let section = record_mut(root, path)?;
    let def = field_def(codec, section, field)?;
    let bytes = field_bytes_mut(section, def)?;
    match def.kind {
        FieldKind::U8 => bytes[0] = value as u8,
        FieldKind::U16 | FieldKind::I16 => endian.write_u16(bytes, 0, value as u16)?,
        FieldKind::U32 | FieldKind::I32 => endian.write_u32(bytes, 0, value as u32)?,
        FieldKind::Str(_) => return Err(MudError::type_mismatch(field, "numeric", "string")),
    }
    Ok(())
}

/// Reads a string field of the record at `path`, keeping at most `max_len`
/// characters.
pub fn get_string(
    codec: &Codec,
    root: &Section,
    path: &[PathElem],
    field: &str,
    max_len: usize,
) -> Result<String> {
    let section = record(root, path)?;
    let def = field_def(codec, section, field)?;
    if def.kind.is_numeric() {
        return Err(MudError::type_mismatch(field, "string", def.kind.name()));
    }
    let bytes = field_bytes(section, def)?;
    Ok(truncate_chars(&read_latin1_string(bytes), max_len))
}

/// Writes a string field of the record at `path`.
///
/// Stores at most capacity - 1 bytes and NUL-fills the rest. Returns the
/// number of bytes stored.
pub fn set_string(
    codec: &Codec,
    root: &mut Section,
    path: &[PathElem],
    field: &str,
    value: &str,
) -> Result<usize> {
    let section = record_mut(root, path)?;
    let def = field_def(codec, section, field)?;
    if def.kind.is_numeric() {
        return Err(MudError::type_mismatch(field, "string", def.kind.name()));
    }
    let bytes = field_bytes_mut(section, def)?;
    Ok(write_latin1_string(bytes, value))
}

/// Reads an integer field of instance `instance` of `type_id` in `group`.
pub fn get_numeric_at(
    codec: &Codec,
    root: &Section,
    group: &[PathElem],
    type_id: u32,
    instance: u32,
    field: &str,
) -> Result<i64> {
    get_numeric(codec, root, &path_with(group, type_id, instance), field)
}

/// Writes an integer field of instance `instance` of `type_id` in `group`.
pub fn set_numeric_at(
    codec: &Codec,
    root: &mut Section,
    group: &[PathElem],
    type_id: u32,
    instance: u32,
    field: &str,
    value: i64,
) -> Result<()> {
    set_numeric(codec, root, &path_with(group, type_id, instance), field, value)
}

/// Reads a string field of instance `instance` of `type_id` in `group`.
pub fn get_string_at(
    codec: &Codec,
    root: &Section,
    group: &[PathElem],
    type_id: u32,
    instance: u32,
    field: &str,
    max_len: usize,
) -> Result<String> {
    get_string(codec, root, &path_with(group, type_id, instance), field, max_len)
}

/// Writes a string field of instance `instance` of `type_id` in `group`.
pub fn set_string_at(
    codec: &Codec,
    root: &mut Section,
    group: &[PathElem],
    type_id: u32,
    instance: u32,
    field: &str,
    value: &str,
) -> Result<usize> {
    set_string(codec, root, &path_with(group, type_id, instance), field, value)
}

fn require_instance(accessor: &Accessor, instance: Option<u32>) -> Result<u32> {
    instance.ok_or_else(|| {
        MudError::rejected(format!("{} needs an instance number", accessor.kind_name()))
    })
}

/// Reads the field an accessor points at.
///
/// `instance` is required for indexed accessors and ignored otherwise.
/// String values are returned in full (up to the field capacity).
pub fn read(
    codec: &Codec,
    root: &Section,
    accessor: &Accessor,
    instance: Option<u32>,
) -> Result<FieldValue> {
    match accessor {
        Accessor::Numeric { path, field } => {
            get_numeric(codec, root, path.elems(), field).map(FieldValue::Numeric)
        }
        Accessor::String { path, field } => {
            get_string(codec, root, path.elems(), field, usize::MAX).map(FieldValue::Text)
        }
        Accessor::IndexedNumeric {
            group,
            type_id,
            field,
        } => {
            let n = require_instance(accessor, instance)?;
            get_numeric_at(codec, root, group.elems(), *type_id, n, field).map(FieldValue::Numeric)
        }
        Accessor::IndexedString {
            group,
            type_id,
            field,
        } => {
            let n = require_instance(accessor, instance)?;
            get_string_at(codec, root, group.elems(), *type_id, n, field, usize::MAX)
                .map(FieldValue::Text)
        }
    }
}

/// Writes the field an accessor points at.
///
/// # Errors
///
/// `TypeMismatch` if a text value is given for a numeric accessor or the
/// other way around.
pub fn write(
    codec: &Codec,
    root: &mut Section,
    accessor: &Accessor,
    instance: Option<u32>,
    value: &FieldValue,
) -> Result<()> {
    match (accessor, value) {
        (Accessor::Numeric { path, field }, FieldValue::Numeric(v)) => {
            set_numeric(codec, root, path.elems(), field, *v)
        }
        (Accessor::String { path, field }, FieldValue::Text(s)) => {
            set_string(codec, root, path.elems(), field, s).map(|_| ())
        }
        (
            Accessor::IndexedNumeric {
                group,
                type_id,
                field,
            },
            FieldValue::Numeric(v),
        ) => {
            let n = require_instance(accessor, instance)?;
            set_numeric_at(codec, root, group.elems(), *type_id, n, field, *v)
        }
        (
            Accessor::IndexedString {
                group,
                type_id,
                field,
            },
            FieldValue::Text(s),
        ) => {
            let n = require_instance(accessor, instance)?;
            set_string_at(codec, root, group.elems(), *type_id, n, field, s).map(|_| ())
        }
        (accessor, FieldValue::Numeric(_)) => Err(MudError::type_mismatch(
            accessor.kind_name(),
            "text value",
            "numeric value",
        )),
        (accessor, FieldValue::Text(_)) => Err(MudError::type_mismatch(
            accessor.kind_name(),
            "numeric value",
            "text value",
        )),
    }
}
