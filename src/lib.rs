//! An immutable, write-once/read-many on-disk sorted key/value table.
//!
//! A [`writer::BitableWriter`] consumes key/value pairs in strictly
//! ascending key order and produces a set of memory-mappable files forming
//! a static B+-tree. A [`reader::BitableReader`] opens those files and
//! performs zero-copy point lookups, range bounds, and forward/backward
//! iteration over the sorted sequence.
//!
//! No in-place updates, no deletions, no duplicate keys, no concurrent
//! writers. Readers never allocate per operation; every accessor returns a
//! reference into the mapped region.

pub mod error;
mod format;
pub mod io;
mod paths;
pub mod reader;
pub mod writer;

pub use error::{BitableError, Result};
pub use io::OpenHint;
pub use reader::{BitableReader, Cursor, FindOp, KeyComparator, LexicographicComparator};
pub use writer::{BitableWriter, CloseOption};

/// Summary statistics shared by writer and reader, per the external
/// interface's `stats` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub depth: u32,
    pub item_count: u64,
    pub leaf_pages: u64,
    pub large_value_store_size: u64,
    pub page_size: u32,
    pub key_alignment: u32,
    pub value_alignment: u32,
}
