//! Error types for run file operations.
//!
//! Covers opening files, decoding and encoding section trees, path search
//! and field access, the handle table, and the deglitch routine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for run file operations.
pub type Result<T> = std::result::Result<T, MudError>;

/// Errors that can occur while reading, editing, or writing run files.
#[derive(Error, Debug)]
pub enum MudError {
    /// The file could not be opened (missing, permission denied).
    #[error("Could not open {}: {source}", path.display())]
    Open {
        /// Path that was being opened.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Stream ended before a header or payload was complete.
    #[error("Truncated data at offset {offset:#x}: expected {expected} bytes, got {actual} bytes")]
    Truncated {
        /// Offset where the read started.
        offset: usize,
        /// Bytes needed.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Section type is not in the registry and no raw-bytes fallback is enabled.
    #[error("Unknown section type {type_id:#010x} at offset {offset:#x}")]
    UnknownSectionType {
        /// Unregistered type id.
        type_id: u32,
        /// Offset of the section header.
        offset: usize,
    },

    /// Declared payload length disagrees with the registry or the group contents.
    #[error("Length mismatch in section {type_id:#010x} at offset {offset:#x}: declared {declared}, expected {expected}")]
    LengthMismatch {
        /// Type id of the section.
        type_id: u32,
        /// Offset of the section header.
        offset: usize,
        /// Length in the header.
        declared: usize,
        /// Length the registry or the children call for.
        expected: usize,
    },

    /// Malformed stream or configuration.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Path search was exhausted without a match.
    #[error("Section not found: {0}")]
    SectionNotFound(String),

    /// Named field does not exist in the record or field table.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Accessor invoked against a field of an incompatible kind.
    #[error("Type mismatch for {field}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Field or accessor name.
        field: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind actually registered.
        found: &'static str,
    },

    /// Tree could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Serialized tree could not be written to disk.
    #[error("Could not write {}: {source}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Handle is not open.
    #[error("Invalid handle: {0}")]
    InvalidHandle(u32),

    /// Mutation attempted through a read-only handle.
    #[error("Handle {0} is open read-only")]
    ReadOnly(u32),

    /// Request violates a user-facing precondition.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Weighted fit is numerically degenerate.
    #[error("Linear regression failed: degenerate bin range")]
    RegressionFailed,
}

impl MudError {
    /// Creates a truncated data error.
    pub fn truncated(offset: usize, expected: usize, actual: usize) -> Self {
        Self::Truncated {
            offset,
            expected,
            actual,
        }
    }

    /// Creates a field-not-found error naming the field and where it was looked up.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mud_file::error::MudError;
    /// let err = MudError::not_found("field", "nBins");
    /// assert!(err.is_not_found());
    /// ```
    pub fn not_found(item_type: &str, name: &str) -> Self {
        Self::FieldNotFound(format!("{} '{}'", item_type, name))
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(field: &str, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected,
            found,
        }
    }

    /// Creates a user-facing rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Returns true for failures raised while decoding a byte stream.
    ///
    /// Callers report these as "could not read header".
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::UnknownSectionType { .. }
                | Self::LengthMismatch { .. }
                | Self::InvalidFormat(_)
        )
    }

    /// Returns true when a path search or field lookup came up empty.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SectionNotFound(_) | Self::FieldNotFound(_))
    }
}

/// Default number of errors an interactive session tolerates.
pub const DEFAULT_ERROR_LIMIT: u32 = 100;

/// Bounded error counter for interactive tools.
///
/// A session records each rejected command and stops once the count goes
/// past the limit, instead of looping forever on malformed input.
#[derive(Debug, Clone, Copy)]
pub struct ErrorBudget {
    count: u32,
    limit: u32,
}

impl ErrorBudget {
    /// Creates a budget that is exhausted after more than `limit` errors.
    pub fn new(limit: u32) -> Self {
        Self { count: 0, limit }
    }

    /// Records one error. Returns false once the budget is exhausted.
    pub fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        !self.is_exhausted()
    }

    /// Number of errors recorded so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// True once more than `limit` errors have been recorded.
    pub fn is_exhausted(&self) -> bool {
        self.count > self.limit
    }
}

impl Default for ErrorBudget {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_classification() {
        assert!(MudError::truncated(0, 12, 3).is_decode_error());
        assert!(MudError::UnknownSectionType { type_id: 7, offset: 0 }.is_decode_error());
        assert!(!MudError::not_found("field", "title").is_decode_error());
        assert!(!MudError::RegressionFailed.is_decode_error());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(MudError::SectionNotFound("hist 3".into()).is_not_found());
        assert!(MudError::not_found("field", "title").is_not_found());
        assert!(!MudError::InvalidHandle(2).is_not_found());
    }

    #[test]
    fn test_error_budget() {
        let mut budget = ErrorBudget::new(2);
        assert!(budget.record());
        assert!(budget.record());
        assert!(!budget.record());
        assert!(budget.is_exhausted());
        assert_eq!(budget.count(), 3);
    }

    #[test]
    fn test_display_mentions_offset() {
        let err = MudError::truncated(0x20, 12, 4);
        assert_eq!(
            err.to_string(),
            "Truncated data at offset 0x20: expected 12 bytes, got 4 bytes"
        );
    }
}
