//! Path search over a section tree.
//!
//! A path is an ordered list of `(type_id, instance)` pairs. Search descends
//! one level per element, taking the first child in stored order that matches
//! exactly. Duplicate pairs are tolerated; the first one wins.

use crate::section::Section;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One step of a section path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathElem {
    /// Section type id to match.
    pub type_id: u32,

    /// Instance number to match.
    pub instance: u32,
}

impl PathElem {
    /// Creates a path element.
    pub const fn new(type_id: u32, instance: u32) -> Self {
        Self { type_id, instance }
    }
}

/// Ordered list of path elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectionPath(Vec<PathElem>);

impl SectionPath {
    /// Creates an empty path, which addresses the starting node itself.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns a copy of this path with one more element.
    pub fn child(&self, type_id: u32, instance: u32) -> Self {
        let mut elems = self.0.clone();
        elems.push(PathElem::new(type_id, instance));
        Self(elems)
    }

    /// Path elements in order.
    pub fn elems(&self) -> &[PathElem] {
        &self.0
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<PathElem>> for SectionPath {
    fn from(elems: Vec<PathElem>) -> Self {
        Self(elems)
    }
}

impl From<&[(u32, u32)]> for SectionPath {
    fn from(pairs: &[(u32, u32)]) -> Self {
        Self(pairs.iter().map(|&(t, i)| PathElem::new(t, i)).collect())
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for elem in &self.0 {
            write!(f, "/{:#x}:{}", elem.type_id, elem.instance)?;
        }
        Ok(())
    }
}

/// Finds the section addressed by `path`, starting at `node`.
///
/// Returns `None` as soon as a step has no match or the current node is
/// not a group.
///
/// # Examples
///
/// ```rust
/// use mud_file::section::Section;
/// use mud_file::search::{search, PathElem};
///
/// let mut hists = Section::group(0x10, 1);
/// hists.add_child(Section::leaf(0x20, 1, vec![1])).unwrap();
/// hists.add_child(Section::leaf(0x20, 2, vec![2])).unwrap();
/// let mut root = Section::group(0x01, 1);
/// root.add_child(hists).unwrap();
///
/// let found = search(&root, &[PathElem::new(0x10, 1), PathElem::new(0x20, 2)]).unwrap();
/// assert_eq!(found.bytes(), Some(&[2u8][..]));
/// ```
pub fn search<'a>(node: &'a Section, path: &[PathElem]) -> Option<&'a Section> {
    let mut current = node;
    for elem in path {
        if !current.is_group() {
            return None;
        }
        current = current
            .children()
            .iter()
            .find(|c| c.matches(elem.type_id, elem.instance))?;
    }
    Some(current)
}

/// Mutable variant of [`search`].
pub fn search_mut<'a>(node: &'a mut Section, path: &[PathElem]) -> Option<&'a mut Section> {
    let mut current = node;
    for elem in path {
        current = current
            .children_mut()?
            .iter_mut()
            .find(|c| c.matches(elem.type_id, elem.instance))?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: u32 = 0x0301_0000;
    const HIST_GRP: u32 = 0x0301_0002;
    const HIST_HDR: u32 = 0x0100_0002;
    const RUN_DESC: u32 = 0x0100_0001;

    fn tree() -> Section {
        let mut hists = Section::group(HIST_GRP, 1);
        for n in 1..=3 {
            hists
                .add_child(Section::leaf(HIST_HDR, n, vec![n as u8]))
                .unwrap();
        }
        let mut root = Section::group(ROOT, 1);
        root.add_child(Section::leaf(RUN_DESC, 1, vec![0xAA]))
            .unwrap();
        root.add_child(hists).unwrap();
        root
    }

    #[test]
    fn test_empty_path_returns_start() {
        let root = tree();
        assert_eq!(search(&root, &[]).unwrap().type_id, ROOT);
    }

    #[test]
    fn test_nested_search() {
        let root = tree();
        let path = SectionPath::new().child(HIST_GRP, 1).child(HIST_HDR, 3);
        let found = search(&root, path.elems()).unwrap();
        assert_eq!(found.instance, 3);
        assert_eq!(found.bytes(), Some(&[3u8][..]));
    }

    #[test]
    fn test_search_from_inner_node() {
        let root = tree();
        let hists = &root.children()[1];
        let found = search(hists, &[PathElem::new(HIST_HDR, 2)]).unwrap();
        assert_eq!(found.instance, 2);
    }

    #[test]
    fn test_first_element_miss() {
        let root = tree();
        assert!(search(&root, &[PathElem::new(0xBAD, 1), PathElem::new(HIST_HDR, 1)]).is_none());
    }

    #[test]
    fn test_descend_into_leaf_fails() {
        let root = tree();
        assert!(search(&root, &[PathElem::new(RUN_DESC, 1), PathElem::new(HIST_HDR, 1)]).is_none());
    }

    #[test]
    fn test_duplicate_first_match_wins() {
        let mut root = tree();
        root.add_child(Section::leaf(RUN_DESC, 1, vec![0xBB]))
            .unwrap();
        let found = search(&root, &[PathElem::new(RUN_DESC, 1)]).unwrap();
        assert_eq!(found.bytes(), Some(&[0xAAu8][..]));
    }

    #[test]
    fn test_unrelated_sibling_does_not_change_result() {
        let mut root = tree();
        let path = [PathElem::new(HIST_GRP, 1), PathElem::new(HIST_HDR, 2)];
        let before = search(&root, &path).cloned();
        root.add_child(Section::leaf(0x0100_0004, 1, vec![9]))
            .unwrap();
        root.children_mut().unwrap()[1]
            .add_child(Section::leaf(HIST_HDR, 4, vec![4]))
            .unwrap();
        assert_eq!(search(&root, &path).cloned(), before);
    }

    #[test]
    fn test_search_mut_edits_in_place() {
        let mut root = tree();
        let path = [PathElem::new(HIST_GRP, 1), PathElem::new(HIST_HDR, 1)];
        search_mut(&mut root, &path).unwrap().bytes_mut().unwrap()[0] = 42;
        assert_eq!(search(&root, &path).unwrap().bytes(), Some(&[42u8][..]));
    }

    #[test]
    fn test_path_display() {
        let path = SectionPath::from(&[(0x10, 1), (0x20, 2)][..]);
        assert_eq!(path.to_string(), "/0x10:1/0x20:2");
        assert_eq!(SectionPath::new().to_string(), "/");
    }
}
