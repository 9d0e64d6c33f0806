//! In-memory section tree.
//!
//! A section is either a leaf holding raw payload bytes or a group holding
//! an ordered list of owned child sections. A decoded run file is a single
//! root section.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Payload of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Payload {
    /// Raw bytes, interpreted through the registry entry for the section type.
    Bytes(Vec<u8>),
    /// Child sections in stored order.
    Group(Vec<Section>),
}

/// A typed node of the container tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Section {
    /// Section type id.
    pub type_id: u32,

    /// Instance number among siblings of the same type.
    pub instance: u32,

    /// Payload bytes or children.
    pub payload: Payload,
}

impl Section {
    /// Creates a leaf section.
    pub fn leaf(type_id: u32, instance: u32, bytes: Vec<u8>) -> Self {
        Self {
            type_id,
            instance,
            payload: Payload::Bytes(bytes),
        }
    }

    /// Creates an empty group section.
    pub fn group(type_id: u32, instance: u32) -> Self {
        Self {
            type_id,
            instance,
            payload: Payload::Group(Vec::new()),
        }
    }

    /// Returns true if this section is a group.
    pub fn is_group(&self) -> bool {
        matches!(self.payload, Payload::Group(_))
    }

    /// Returns true if this section has the given type and instance.
    pub fn matches(&self, type_id: u32, instance: u32) -> bool {
        self.type_id == type_id && self.instance == instance
    }

    /// Children of a group; empty for leaves.
    pub fn children(&self) -> &[Section] {
        match &self.payload {
            Payload::Group(children) => children,
            Payload::Bytes(_) => &[],
        }
    }

    /// Mutable children of a group, or `None` for leaves.
    pub fn children_mut(&mut self) -> Option<&mut Vec<Section>> {
        match &mut self.payload {
            Payload::Group(children) => Some(children),
            Payload::Bytes(_) => None,
        }
    }

    /// Payload bytes of a leaf, or `None` for groups.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Group(_) => None,
        }
    }

    /// Mutable payload bytes of a leaf, or `None` for groups.
    pub fn bytes_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.payload {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Group(_) => None,
        }
    }

    /// Appends a child to this group.
    ///
    /// Returns the child back if this section is a leaf. Duplicate
    /// `(type_id, instance)` pairs are accepted.
    pub fn add_child(&mut self, child: Section) -> std::result::Result<(), Section> {
        match &mut self.payload {
            Payload::Group(children) => {
                children.push(child);
                Ok(())
            }
            Payload::Bytes(_) => Err(child),
        }
    }

    /// Number of direct children with the given type id.
    pub fn count_children(&self, type_id: u32) -> usize {
        self.children()
            .iter()
            .filter(|c| c.type_id == type_id)
            .count()
    }

    /// Depth-first, pre-order traversal yielding `(depth, section)`.
    ///
    /// The root is yielded at depth 0.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(0, self)],
        }
    }

    /// All sections in the tree with the given type id, in depth-first order.
    pub fn find_all(&self, type_id: u32) -> Vec<&Section> {
        self.walk()
            .map(|(_, s)| s)
            .filter(|s| s.type_id == type_id)
            .collect()
    }
}

/// Depth-first iterator over a section tree.
pub struct Walk<'a> {
    stack: Vec<(usize, &'a Section)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a Section);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, section) = self.stack.pop()?;
        // Reverse so the first child is visited first
        for child in section.children().iter().rev() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, section))
    }
}
