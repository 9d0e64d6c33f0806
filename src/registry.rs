//! Section type registry.
//!
//! The registry maps a section type id to its payload shape: a fixed record
//! with a known field layout, opaque bytes, or a group of child sections.
//! It also carries, per run format, the table of named field accessors used
//! by the handle API.

use crate::search::SectionPath;
use std::collections::HashMap;
use std::fmt;

/// Kind and width of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// NUL-terminated Latin-1 string in a fixed-capacity buffer.
    Str(usize),
}

impl FieldKind {
    /// Size of the field in bytes.
    pub fn size(&self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 => 4,
            FieldKind::Str(capacity) => *capacity,
        }
    }

    /// Returns true for integer fields.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldKind::Str(_))
    }

    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::U8 => "u8",
            FieldKind::U16 => "u16",
            FieldKind::U32 => "u32",
            FieldKind::I16 => "i16",
            FieldKind::I32 => "i32",
            FieldKind::Str(_) => "string",
        }
    }
}

/// A named field at a fixed offset within a record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name, unique within its record.
    pub name: String,

    /// Byte offset from the start of the payload.
    pub offset: usize,

    /// Kind and width.
    pub kind: FieldKind,
}

/// Fixed layout of a record payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordLayout {
    fields: Vec<FieldDef>,
    size: usize,
}

impl RecordLayout {
    /// Starts a layout; fields are packed in declaration order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mud_file::registry::RecordLayout;
    ///
    /// let layout = RecordLayout::builder()
    ///     .u32("nBins")
    ///     .string("title", 32)
    ///     .build();
    /// assert_eq!(layout.size(), 36);
    /// assert_eq!(layout.field("title").unwrap().offset, 4);
    /// ```
    pub fn builder() -> RecordLayoutBuilder {
        RecordLayoutBuilder::default()
    }

    /// Total payload size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All fields in layout order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }
}

/// Builder for [`RecordLayout`].
#[derive(Debug, Default)]
pub struct RecordLayoutBuilder {
    layout: RecordLayout,
}

impl RecordLayoutBuilder {
    fn push(mut self, name: &str, kind: FieldKind) -> Self {
        self.layout.fields.push(FieldDef {
            name: name.to_string(),
            offset: self.layout.size,
            kind,
        });
        self.layout.size += kind.size();
        self
    }

    /// Appends a u8 field.
    pub fn u8(self, name: &str) -> Self {
        self.push(name, FieldKind::U8)
    }

    /// Appends a u16 field.
    pub fn u16(self, name: &str) -> Self {
        self.push(name, FieldKind::U16)
    }

    /// Appends a u32 field.
    pub fn u32(self, name: &str) -> Self {
        self.push(name, FieldKind::U32)
    }

    /// Appends an i16 field.
    pub fn i16(self, name: &str) -> Self {
        self.push(name, FieldKind::I16)
    }

    /// Appends an i32 field.
    pub fn i32(self, name: &str) -> Self {
        self.push(name, FieldKind::I32)
    }

    /// Appends a string field of `capacity` bytes, terminator included.
    pub fn string(self, name: &str, capacity: usize) -> Self {
        self.push(name, FieldKind::Str(capacity))
    }

    /// Finishes the layout.
    pub fn build(self) -> RecordLayout {
        self.layout
    }
}

/// Payload shape of a section type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadShape {
    /// Fixed-size record with named fields.
    FixedRecord(RecordLayout),
    /// Bytes of any length, interpreted by callers.
    OpaqueBytes,
    /// Ordered list of child sections.
    GroupOfSections,
}

impl PayloadShape {
    /// Short name used in error messages and dumps.
    pub fn name(&self) -> &'static str {
        match self {
            PayloadShape::FixedRecord(_) => "record",
            PayloadShape::OpaqueBytes => "bytes",
            PayloadShape::GroupOfSections => "group",
        }
    }
}

/// A registered section type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Section type id.
    pub type_id: u32,

    /// Human-readable type name.
    pub name: String,

    /// Payload shape.
    pub shape: PayloadShape,
}

/// How a named field is reached from the root of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// Integer field of the section at `path`.
    Numeric {
        /// Path from the root to the record.
        path: SectionPath,
        /// Field within the record.
        field: String,
    },
    /// String field of the section at `path`.
    String {
        /// Path from the root to the record.
        path: SectionPath,
        /// Field within the record.
        field: String,
    },
    /// Integer field of instance `n` of `type_id` inside `group`.
    IndexedNumeric {
        /// Path from the root to the containing group.
        group: SectionPath,
        /// Type of the per-instance records.
        type_id: u32,
        /// Field within each record.
        field: String,
    },
    /// String field of instance `n` of `type_id` inside `group`.
    IndexedString {
        /// Path from the root to the containing group.
        group: SectionPath,
        /// Type of the per-instance records.
        type_id: u32,
        /// Field within each record.
        field: String,
    },
}

impl Accessor {
    /// Short name of the accessor kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Accessor::Numeric { .. } => "numeric field",
            Accessor::String { .. } => "string field",
            Accessor::IndexedNumeric { .. } => "indexed numeric field",
            Accessor::IndexedString { .. } => "indexed string field",
        }
    }

    /// Returns true for per-instance accessors.
    pub fn is_indexed(&self) -> bool {
        matches!(
            self,
            Accessor::IndexedNumeric { .. } | Accessor::IndexedString { .. }
        )
    }
}

/// Registry of section types and named accessors.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: HashMap<u32, RegistryEntry>,

    /// Root type id -> named accessors, in registration order.
    accessors: HashMap<u32, Vec<(String, Accessor)>>,

    /// Decode unregistered types as opaque bytes instead of failing.
    unknown_fallback: bool,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry(mut self, type_id: u32, name: &str, shape: PayloadShape) -> Self {
        self.entries.insert(
            type_id,
            RegistryEntry {
                type_id,
                name: name.to_string(),
                shape,
            },
        );
        self
    }

    /// Registers a fixed-record type.
    pub fn with_record(self, type_id: u32, name: &str, layout: RecordLayout) -> Self {
        self.with_entry(type_id, name, PayloadShape::FixedRecord(layout))
    }

    /// Registers an opaque-bytes type.
    pub fn with_opaque(self, type_id: u32, name: &str) -> Self {
        self.with_entry(type_id, name, PayloadShape::OpaqueBytes)
    }

    /// Registers a group type.
    pub fn with_group(self, type_id: u32, name: &str) -> Self {
        self.with_entry(type_id, name, PayloadShape::GroupOfSections)
    }

    /// Registers a named accessor for runs whose root has type `root_type`.
    ///
    /// Re-registering a name replaces the earlier accessor.
    pub fn with_accessor(mut self, root_type: u32, name: &str, accessor: Accessor) -> Self {
        let table = self.accessors.entry(root_type).or_default();
        match table.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = accessor,
            None => table.push((name.to_string(), accessor)),
        }
        self
    }

    /// Enables or disables decoding unknown types as opaque bytes.
    pub fn with_unknown_fallback(mut self, enabled: bool) -> Self {
        self.unknown_fallback = enabled;
        self
    }

    /// Returns the entry for a type id.
    pub fn entry(&self, type_id: u32) -> Option<&RegistryEntry> {
        self.entries.get(&type_id)
    }

    /// Returns the payload shape for a type id.
    pub fn shape(&self, type_id: u32) -> Option<&PayloadShape> {
        self.entries.get(&type_id).map(|e| &e.shape)
    }

    /// Returns the record layout for a type id, if it is a fixed record.
    pub fn layout(&self, type_id: u32) -> Option<&RecordLayout> {
        match self.shape(type_id) {
            Some(PayloadShape::FixedRecord(layout)) => Some(layout),
            _ => None,
        }
    }

    /// Returns true if the type id is registered as a group.
    pub fn is_group(&self, type_id: u32) -> bool {
        matches!(self.shape(type_id), Some(PayloadShape::GroupOfSections))
    }

    /// Human-readable name, or `"unknown"`.
    pub fn name_of(&self, type_id: u32) -> &str {
        self.entries
            .get(&type_id)
            .map(|e| e.name.as_str())
            .unwrap_or("unknown")
    }

    /// Whether unknown types decode as opaque bytes.
    pub fn unknown_fallback(&self) -> bool {
        self.unknown_fallback
    }

    /// Looks up a named accessor (case-insensitive) for a run format.
    pub fn accessor(&self, root_type: u32, name: &str) -> Option<&Accessor> {
        self.accessors
            .get(&root_type)?
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, a)| a)
    }

    /// Named accessors for a run format, in registration order.
    pub fn accessors(&self, root_type: u32) -> impl Iterator<Item = (&str, &Accessor)> {
        self.accessors
            .get(&root_type)
            .into_iter()
            .flatten()
            .map(|(n, a)| (n.as_str(), a))
    }

    /// Number of registered section types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no section types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x}, {})", self.name, self.type_id, self.shape.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::PathElem;

    #[test]
    fn test_layout_offsets() {
        let layout = RecordLayout::builder()
            .u16("a")
            .u32("b")
            .string("c", 10)
            .i32("d")
            .u8("e")
            .build();
        assert_eq!(layout.size(), 2 + 4 + 10 + 4 + 1);
        assert_eq!(layout.field("b").unwrap().offset, 2);
        assert_eq!(layout.field("c").unwrap().kind, FieldKind::Str(10));
        assert_eq!(layout.field("d").unwrap().offset, 16);
        assert_eq!(layout.field("e").unwrap().offset, 20);
        assert!(layout.field("missing").is_none());
    }

    #[test]
    fn test_shapes() {
        let registry = TypeRegistry::new()
            .with_group(1, "root")
            .with_opaque(2, "blob")
            .with_record(3, "rec", RecordLayout::builder().u32("x").build());
        assert!(registry.is_group(1));
        assert!(!registry.is_group(2));
        assert_eq!(registry.layout(3).unwrap().size(), 4);
        assert!(registry.layout(2).is_none());
        assert_eq!(registry.name_of(2), "blob");
        assert_eq!(registry.name_of(99), "unknown");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_accessor_lookup_case_insensitive() {
        let path = SectionPath::from(vec![PathElem::new(3, 1)]);
        let registry = TypeRegistry::new()
            .with_accessor(
                1,
                "RunNumber",
                Accessor::Numeric {
                    path: path.clone(),
                    field: "runNumber".into(),
                },
            )
            .with_accessor(
                1,
                "Title",
                Accessor::String {
                    path,
                    field: "title".into(),
                },
            );
        assert!(registry.accessor(1, "runnumber").is_some());
        assert!(registry.accessor(1, "TITLE").is_some());
        assert!(registry.accessor(2, "Title").is_none());
        let names: Vec<&str> = registry.accessors(1).map(|(n, _)| n).collect();
        assert_eq!(names, vec!["RunNumber", "Title"]);
    }
}
