//! # MUD Run File Engine
//!
//! Reads, edits and rewrites muon-spin-resonance run files: single files
//! holding a tree of typed, length-delimited sections.
//!
//! ## Features
//!
//! - **Whole-file codec**: Decodes a file into an owned section tree and
//!   re-encodes it losslessly
//! - **Pluggable registry**: Section types map to fixed records, opaque
//!   bytes or groups; named run fields map to typed accessors
//! - **Path search**: Locate sections by `(type, instance)` paths
//! - **Handle API**: Open, read and write fields by name, commit atomically
//! - **Glitch correction**: Smooth a reproducible detector artifact using a
//!   reference run
//!
//! ## Architecture
//!
//! 1. **Section headers**: Three 32-bit words (length, type, instance) in a
//!    configurable order and byte order
//! 2. **Type registry**: Payload shape and record layout per type id
//! 3. **Codec**: Header + payload decoding, recursing into groups
//! 4. **Section tree** and **path search**
//! 5. **Field accessors**: Typed get/set on record fields in place
//! 6. **Handle table**: Open runs keyed by small integers
//!
//! ## Binary Layout
//!
//! With the default header layout:
//!
//! ```text
//! [Section Header - 12 bytes]
//!   - Payload length (header excluded)
//!   - Type id
//!   - Instance number
//! [Payload]
//!   - Record: fixed-size fields (u8/u16/u32/i16/i32, NUL-padded strings)
//!   - Opaque: raw bytes (histogram bins)
//!   - Group:  [Child count - 4 bytes] followed by child sections
//! ```
//!
//! A file is one root group whose type id names the run format.
//!
//! ## Examples
//!
//! ### Editing a run title
//!
//! ```no_run
//! use mud_file::{HandleTable, OpenMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut table = HandleTable::default();
//! let run = table.open("006663.msr", OpenMode::ReadWrite)?;
//!
//! println!("Title: {}", table.get_string(run, "Title", 80)?);
//! table.set_string(run, "Title", "Cu ZF 10K")?;
//! for n in 1..=table.get_hists(run)?.1 {
//!     println!("  Hist {}: {}", n, table.get_string_at(run, "HTitles", n, 32)?);
//! }
//!
//! table.close_commit(run)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Working on the tree directly
//!
//! ```no_run
//! use mud_file::catalog::{GRP_TRI_TD_HIST_ID, SEC_GEN_HIST_HDR_ID};
//! use mud_file::{fields, search, Codec, PathElem};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let codec = Codec::default();
//! let bytes = std::fs::read("006663.msr")?;
//! let root = codec.decode(&bytes)?;
//!
//! let path = [
//!     PathElem::new(GRP_TRI_TD_HIST_ID, 1),
//!     PathElem::new(SEC_GEN_HIST_HDR_ID, 2),
//! ];
//! if search(&root, &path).is_some() {
//!     let bins = fields::get_numeric(&codec, &root, &path, "nBins")?;
//!     println!("Histogram 2 has {} bins", bins);
//! }
//! print!("{}", codec.describe(&root));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod codec;
pub mod deglitch;
pub mod error;
pub mod fields;
pub mod handle;
pub mod header;
pub mod registry;
pub mod run;
pub mod search;
pub mod section;
pub mod utils;

// Re-export main types for convenience
pub use codec::Codec;
pub use error::{ErrorBudget, MudError, Result};
pub use fields::FieldValue;
pub use handle::{Handle, HandleTable, OpenMode};
pub use header::{HeaderLayout, HeaderWord, SectionHeader};
pub use registry::{Accessor, FieldKind, PayloadShape, RecordLayout, TypeRegistry};
pub use run::{Comment, HistogramHeader, RunDescription, RunSummary, Scaler};
pub use search::{search, search_mut, PathElem, SectionPath};
pub use section::{Payload, Section};
pub use utils::Endian;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
