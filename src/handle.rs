//! Handle table: open run files addressed by small integers.
//!
//! `open` decodes a whole file into a section tree and issues a handle.
//! Accessor calls read and mutate the tree in place; every successful setter
//! marks the handle dirty. `close_commit` re-encodes the tree and replaces
//! the file through a temporary file and rename, so a failed write never
//! leaves a half-written run behind. `close_discard` drops the tree.
//!
//! The table does no locking of its own. One handle per file at a time.

use crate::catalog::{format_info, FormatInfo, SEC_GEN_HIST_HDR_ID};
use crate::codec::Codec;
use crate::error::{MudError, Result};
use crate::fields::{self, FieldValue};
use crate::header::SECTION_HEADER_SIZE;
use crate::registry::Accessor;
use crate::search::search;
use crate::section::Section;
use memmap2::Mmap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

/// Small-integer reference to an open run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// Numeric value of the handle.
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Access mode of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Setters and `close_commit` are refused.
    Read,
    /// Full access.
    ReadWrite,
}

/// State kept for one open run.
#[derive(Debug)]
pub struct HandleEntry {
    root: Section,
    dirty: bool,
    path: PathBuf,
    mode: OpenMode,
    format: Option<FormatInfo>,
}

impl HandleEntry {
    fn new(root: Section, path: PathBuf, mode: OpenMode, dirty: bool) -> Self {
        let format = format_info(root.type_id);
        Self {
            root,
            dirty,
            path,
            mode,
            format,
        }
    }

    /// Root section of the run.
    pub fn root(&self) -> &Section {
        &self.root
    }

    /// True once a setter has succeeded.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// File the run was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access mode.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Well-known section locations for the run format, if it is cataloged.
    pub fn format(&self) -> Option<FormatInfo> {
        self.format
    }

    fn require_format(&self) -> Result<FormatInfo> {
        self.format.ok_or_else(|| {
            MudError::rejected(format!(
                "Run format {:#010x} is not in the catalog",
                self.root.type_id
            ))
        })
    }
}

/// Table of open runs.
#[derive(Debug)]
pub struct HandleTable {
    codec: Codec,
    slots: Vec<Option<HandleEntry>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new(Codec::default())
    }
}

/// Process-wide handle table using the default codec.
///
/// # Examples
///
/// ```no_run
/// use mud_file::handle::{global, OpenMode};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut table = global().lock().expect("handle table lock poisoned");
/// let h = table.open("006663.msr", OpenMode::Read)?;
/// println!("format {:#x}", table.get_root_type(h)?);
/// table.close_discard(h)?;
/// # Ok(())
/// # }
/// ```
pub fn global() -> &'static Mutex<HandleTable> {
    static TABLE: OnceLock<Mutex<HandleTable>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HandleTable::default()))
}

impl HandleTable {
    /// Creates an empty table.
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            slots: Vec::new(),
        }
    }

    /// Codec used for every handle in this table.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns true if no handles are open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, entry: HandleEntry) -> Handle {
        let index = match self.slots.iter().position(|s| s.is_none()) {
            Some(index) => {
                self.slots[index] = Some(entry);
                index
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        Handle(index as u32)
    }

    /// Opens and fully decodes a run file.
    ///
    /// No handle is allocated on failure.
    ///
    /// # Errors
    ///
    /// `Open` if the file cannot be opened or mapped, or any decode error.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(&mut self, path: P, mode: OpenMode) -> Result<Handle> {
        let path = path.as_ref();
        info!("Opening run file");
        let open_err = |source| MudError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_err)?;

        // Validate file size BEFORE creating memory map
        let file_size = file.metadata().map_err(open_err)?.len() as usize;
        if file_size < SECTION_HEADER_SIZE {
            return Err(MudError::truncated(0, SECTION_HEADER_SIZE, file_size));
        }

        // SAFETY: the map is read-only, lives only for the duration of the
        // decode below, and every byte is copied into the owned tree before
        // it is dropped. The file is not modified by this process while
        // mapped.
        let mmap = unsafe { Mmap::map(&file).map_err(open_err)? };
        debug!(size = mmap.len(), "Memory mapped run file");

        let root = self.codec.decode(&mmap)?;
        drop(mmap);

        let handle = self.insert(HandleEntry::new(root, path.to_path_buf(), mode, false));
        debug!(handle = handle.id(), "Issued handle");
        Ok(handle)
    }

    /// Starts a new, empty run of the given format.
    ///
    /// Nothing is written until `close_commit`. The handle starts dirty.
    pub fn create<P: AsRef<Path>>(&mut self, path: P, root_type: u32) -> Result<Handle> {
        let root = self.codec.new_section(root_type, 1)?;
        if !root.is_group() {
            return Err(MudError::rejected(format!(
                "Root type {:#010x} is not a group",
                root_type
            )));
        }
        Ok(self.insert(HandleEntry::new(
            root,
            path.as_ref().to_path_buf(),
            OpenMode::ReadWrite,
            true,
        )))
    }

    /// Returns the entry for an open handle.
    pub fn entry(&self, handle: Handle) -> Result<&HandleEntry> {
        self.slots
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(MudError::InvalidHandle(handle.0))
    }

    fn writable(
        slots: &mut [Option<HandleEntry>],
        handle: Handle,
    ) -> Result<&mut HandleEntry> {
        let entry = slots
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(MudError::InvalidHandle(handle.0))?;
        if entry.mode == OpenMode::Read {
            return Err(MudError::ReadOnly(handle.0));
        }
        Ok(entry)
    }

    fn take(&mut self, handle: Handle) -> Result<HandleEntry> {
        self.slots
            .get_mut(handle.0 as usize)
            .and_then(Option::take)
            .ok_or(MudError::InvalidHandle(handle.0))
    }

    /// Root section of an open run.
    pub fn root(&self, handle: Handle) -> Result<&Section> {
        Ok(&self.entry(handle)?.root)
    }

    /// Mutable root section of a read-write run; marks the handle dirty.
    pub fn root_mut(&mut self, handle: Handle) -> Result<&mut Section> {
        let entry = Self::writable(&mut self.slots, handle)?;
        entry.dirty = true;
        Ok(&mut entry.root)
    }

    /// Runs `f` over the codec and root of a read-write run.
    ///
    /// The handle is marked dirty only if `f` succeeds.
    pub fn edit<T, F>(&mut self, handle: Handle, f: F) -> Result<T>
    where
        F: FnOnce(&Codec, &mut Section) -> Result<T>,
    {
        let entry = Self::writable(&mut self.slots, handle)?;
        let out = f(&self.codec, &mut entry.root)?;
        entry.dirty = true;
        Ok(out)
    }

    /// Type id of the root section, which identifies the run format.
    pub fn get_root_type(&self, handle: Handle) -> Result<u32> {
        Ok(self.entry(handle)?.root.type_id)
    }

    /// Returns true if the run has unsaved changes.
    pub fn is_dirty(&self, handle: Handle) -> Result<bool> {
        Ok(self.entry(handle)?.dirty)
    }

    /// Access mode of an open run.
    pub fn mode(&self, handle: Handle) -> Result<OpenMode> {
        Ok(self.entry(handle)?.mode)
    }

    /// File an open run will be written back to.
    pub fn path(&self, handle: Handle) -> Result<&Path> {
        Ok(&self.entry(handle)?.path)
    }

    /// Type id of the run descriptor section.
    ///
    /// # Errors
    ///
    /// `SectionNotFound` if the run has no descriptor.
    pub fn get_run_desc(&self, handle: Handle) -> Result<u32> {
        let entry = self.entry(handle)?;
        let format = entry.require_format()?;
        search(&entry.root, format.run_desc_path().elems())
            .map(|s| s.type_id)
            .ok_or_else(|| MudError::SectionNotFound("run description".into()))
    }

    /// Histogram group type and number of histograms.
    ///
    /// # Errors
    ///
    /// `SectionNotFound` if the run has no histogram group.
    pub fn get_hists(&self, handle: Handle) -> Result<(u32, u32)> {
        let entry = self.entry(handle)?;
        let format = entry.require_format()?;
        let group = search(&entry.root, format.hist_group_path().elems())
            .ok_or_else(|| MudError::SectionNotFound("histogram group".into()))?;
        Ok((
            group.type_id,
            group.count_children(SEC_GEN_HIST_HDR_ID) as u32,
        ))
    }

    fn accessor(&self, handle: Handle, name: &str) -> Result<Accessor> {
        let root_type = self.get_root_type(handle)?;
        self.codec
            .registry()
            .accessor(root_type, name)
            .cloned()
            .ok_or_else(|| MudError::not_found("header field", name))
    }

    fn mismatch(name: &str, expected: &'static str, accessor: &Accessor) -> MudError {
        MudError::type_mismatch(name, expected, accessor.kind_name())
    }

    /// Reads a named field; `instance` selects the histogram for indexed fields.
    pub fn get_field(
        &self,
        handle: Handle,
        name: &str,
        instance: Option<u32>,
    ) -> Result<FieldValue> {
        let accessor = self.accessor(handle, name)?;
        fields::read(&self.codec, self.root(handle)?, &accessor, instance)
    }

    /// Writes a named field and marks the handle dirty.
    pub fn set_field(
        &mut self,
        handle: Handle,
        name: &str,
        instance: Option<u32>,
        value: &FieldValue,
    ) -> Result<()> {
        let accessor = self.accessor(handle, name)?;
        let entry = Self::writable(&mut self.slots, handle)?;
        fields::write(&self.codec, &mut entry.root, &accessor, instance, value)?;
        entry.dirty = true;
        debug!(handle = handle.id(), field = name, "Field updated");
        Ok(())
    }

    /// Reads a named numeric run field.
    pub fn get_numeric(&self, handle: Handle, name: &str) -> Result<i64> {
        match self.accessor(handle, name)? {
            Accessor::Numeric { path, field } => {
                fields::get_numeric(&self.codec, self.root(handle)?, path.elems(), &field)
            }
            other => Err(Self::mismatch(name, "numeric field", &other)),
        }
    }

    /// Writes a named numeric run field.
    pub fn set_numeric(&mut self, handle: Handle, name: &str, value: i64) -> Result<()> {
        let accessor = self.accessor(handle, name)?;
        if !matches!(accessor, Accessor::Numeric { .. }) {
            return Err(Self::mismatch(name, "numeric field", &accessor));
        }
        self.set_field(handle, name, None, &FieldValue::Numeric(value))
    }

    /// Reads a named string run field, keeping at most `max_len` characters.
    pub fn get_string(&self, handle: Handle, name: &str, max_len: usize) -> Result<String> {
        match self.accessor(handle, name)? {
            Accessor::String { path, field } => {
                fields::get_string(&self.codec, self.root(handle)?, path.elems(), &field, max_len)
            }
            other => Err(Self::mismatch(name, "string field", &other)),
        }
    }

    /// Writes a named string run field.
    pub fn set_string(&mut self, handle: Handle, name: &str, value: &str) -> Result<()> {
        let accessor = self.accessor(handle, name)?;
        if !matches!(accessor, Accessor::String { .. }) {
            return Err(Self::mismatch(name, "string field", &accessor));
        }
        self.set_field(handle, name, None, &FieldValue::Text(value.to_string()))
    }

    /// Reads a named per-histogram numeric field of histogram `n` (1-based).
    pub fn get_numeric_at(&self, handle: Handle, name: &str, n: u32) -> Result<i64> {
        match self.accessor(handle, name)? {
            Accessor::IndexedNumeric {
                group,
                type_id,
                field,
            } => fields::get_numeric_at(
                &self.codec,
                self.root(handle)?,
                group.elems(),
                type_id,
                n,
                &field,
            ),
            other => Err(Self::mismatch(name, "indexed numeric field", &other)),
        }
    }

    /// Writes a named per-histogram numeric field of histogram `n`.
    pub fn set_numeric_at(&mut self, handle: Handle, name: &str, n: u32, value: i64) -> Result<()> {
        let accessor = self.accessor(handle, name)?;
        if !matches!(accessor, Accessor::IndexedNumeric { .. }) {
            return Err(Self::mismatch(name, "indexed numeric field", &accessor));
        }
        self.set_field(handle, name, Some(n), &FieldValue::Numeric(value))
    }

    /// Reads a named per-histogram string field of histogram `n`.
    pub fn get_string_at(&self, handle: Handle, name: &str, n: u32, max_len: usize) -> Result<String> {
        match self.accessor(handle, name)? {
            Accessor::IndexedString {
                group,
                type_id,
                field,
            } => fields::get_string_at(
                &self.codec,
                self.root(handle)?,
                group.elems(),
                type_id,
                n,
                &field,
                max_len,
            ),
            other => Err(Self::mismatch(name, "indexed string field", &other)),
        }
    }

    /// Writes a named per-histogram string field of histogram `n`.
    pub fn set_string_at(&mut self, handle: Handle, name: &str, n: u32, value: &str) -> Result<()> {
        let accessor = self.accessor(handle, name)?;
        if !matches!(accessor, Accessor::IndexedString { .. }) {
            return Err(Self::mismatch(name, "indexed string field", &accessor));
        }
        self.set_field(handle, name, Some(n), &FieldValue::Text(value.to_string()))
    }

    /// Discards a handle when `result` is a not-found failure.
    ///
    /// Tools abandon a run once a field they rely on is missing; this
    /// releases the handle on that path and passes `result` through.
    pub fn release_on_error<T>(&mut self, handle: Handle, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_not_found() {
                warn!(handle = handle.id(), error = %err, "Releasing handle after lookup failure");
                let _ = self.take(handle);
            }
        }
        result
    }

    /// Closes a handle without writing, whether or not it is dirty.
    pub fn close_discard(&mut self, handle: Handle) -> Result<()> {
        let entry = self.take(handle)?;
        debug!(handle = handle.id(), dirty = entry.dirty, "Discarded handle");
        Ok(())
    }

    /// Closes a handle, writing the run back to its file if it changed.
    ///
    /// The handle is invalidated whether or not the write succeeds.
    ///
    /// # Errors
    ///
    /// `ReadOnly` for read-only handles, `Encode` if the tree cannot be
    /// serialized (the file is left untouched), `Write` if the file cannot
    /// be replaced.
    #[instrument(skip(self), fields(handle = handle.id()))]
    pub fn close_commit(&mut self, handle: Handle) -> Result<()> {
        let entry = self.take(handle)?;
        if entry.mode == OpenMode::Read {
            return Err(MudError::ReadOnly(handle.0));
        }
        if !entry.dirty {
            debug!("No changes to write");
            return Ok(());
        }
        let bytes = self.codec.encode(&entry.root)?;
        write_atomic(&entry.path, &bytes)?;
        info!(path = %entry.path.display(), size = bytes.len(), "Run file written");
        Ok(())
    }

    /// Closes a handle, writing the run to `path` instead of its own file.
    ///
    /// Always writes, and works for read-only handles since the original
    /// file is not touched.
    #[instrument(skip(self, path), fields(handle = handle.id(), path = %path.as_ref().display()))]
    pub fn close_commit_to<P: AsRef<Path>>(&mut self, handle: Handle, path: P) -> Result<()> {
        let entry = self.take(handle)?;
        let bytes = self.codec.encode(&entry.root)?;
        write_atomic(path.as_ref(), &bytes)?;
        info!(size = bytes.len(), "Run file written");
        Ok(())
    }
}

/// Replaces `path` with `bytes` via a temporary file in the same directory.
///
/// The temporary file is removed on every failure path; the original is
/// only replaced by the final rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_err = |source| MudError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    // Keep the permissions of the file being replaced
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(write_err)?;
    }

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
