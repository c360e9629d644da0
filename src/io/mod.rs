//! File-system primitives (C1): a sequential writable file and a read-only
//! memory-mapped file with an access-pattern hint.
//!
//! These are the only two kinds of I/O the rest of the crate performs.
//! Writes are never partial from the caller's point of view (`write_all`
//! semantics); mapped files are immutable for as long as they're open.

mod mapped;
mod writable;

pub use mapped::MappedFile;
pub use writable::WritableFile;

/// Access-pattern hint applied to a [`MappedFile`] at open time.
///
/// Maps to `posix_fadvise`/`madvise` on POSIX platforms and to
/// `FILE_FLAG_RANDOM_ACCESS`/`FILE_FLAG_SEQUENTIAL_SCAN` on Windows (both
/// handled for us by `memmap2::Advice`). The hint applies only to the
/// mapping it was passed to at open time — branch files are always opened
/// `Random` regardless of the hint the caller passed for the leaf file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenHint {
    #[default]
    None,
    Random,
    Sequential,
}
