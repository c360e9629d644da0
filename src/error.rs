//! Error taxonomy for bitable writers and readers.
//!
//! Every variant here is a disjoint outcome named in the interface: failures
//! are always returned as values, never recovered internally, and `close` is
//! idempotent regardless of which variant a prior call produced. `SUCCESS`
//! and `END_OF_SEQUENCE` are not represented here — callers see those as
//! `Ok(Some(..))` / `Ok(None)` from the cursor-navigation methods, since
//! running off either end of the sequence is a normal terminator, not an
//! error.

use std::io;

/// Errors produced while building or reading a bitable.
#[derive(thiserror::Error, Debug)]
pub enum BitableError {
    /// Failed to create or open one of the table's files.
    #[error("failed to open file: {0}")]
    FileOpenFailed(#[source] io::Error),

    /// An OS-level file operation (write, seek, sync) failed.
    #[error("file operation failed: {0}")]
    FileOperationFailed(#[source] io::Error),

    /// A file was too large to be mapped into the address space.
    #[error("file too large to map")]
    FileTooLarge,

    /// A base path could not be represented as the file primitives require.
    #[error("invalid path")]
    BadPath,

    /// `create`/`open` was called on a table that is already open.
    #[error("table is already open")]
    AlreadyOpen,

    /// The leaf file is smaller than the header.
    #[error("file too small to contain a bitable header")]
    FileTooSmall,

    /// The header marker or checksum did not validate.
    #[error("bitable header is corrupt")]
    HeaderCorrupt,

    /// `find(EXACT)` found no matching key.
    #[error("key not found")]
    KeyNotFound,

    /// A cursor referenced a page or item outside the table's bounds.
    #[error("cursor does not reference a valid location")]
    InvalidCursorLocation,

    /// Appending would grow the branch tree past `MAX_BRANCH_LEVELS`.
    #[error("maximum table tree depth exceeded")]
    MaximumTableTreeDepth,

    /// A key was larger than `MAX_KEY_SIZE`.
    #[error("key invalid: larger than the maximum key size")]
    KeyInvalid,

    /// `pageSize` was out of range or not a power of two.
    #[error("page size invalid: must be a power of two in [{min}, {max}]", min = crate::format::MIN_PAGE_SIZE, max = crate::format::MAX_PAGE_SIZE)]
    PagesizeInvalid,

    /// `keyAlignment`/`valueAlignment` was out of range or not a power of two.
    #[error("alignment invalid: must be a power of two in [1, {max}]", max = crate::format::MAX_ALIGNMENT)]
    AlignmentInvalid,
}

pub type Result<T> = std::result::Result<T, BitableError>;
