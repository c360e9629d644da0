use super::OpenHint;
use crate::error::{BitableError, Result};
use memmap2::{Advice, Mmap};
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

/// A read-only memory mapping of a whole file, with an access-pattern hint
/// applied at open time.
///
/// The mapping is immutable for as long as this value lives: nothing in this
/// crate ever reopens a `MappedFile` for write while a reader holds one.
pub struct MappedFile {
    mmap: Mmap,
}

impl MappedFile {
    /// Maps `path` read-only and applies `hint` as an OS access-pattern
    /// advisory.
    pub fn open(path: &Path, hint: OpenHint) -> Result<Self> {
        let file = File::open(path).map_err(BitableError::FileOpenFailed)?;

        let len = file
            .metadata()
            .map_err(BitableError::FileOperationFailed)?
            .len();
        if len > usize::MAX as u64 {
            return Err(BitableError::FileTooLarge);
        }

        // Safety: the file is only ever mutated by a writer holding the
        // leaf/large-value/branch files exclusively before a table is
        // closed; once a table is open for read it is never written again.
        let mmap = unsafe { Mmap::map(&file) }.map_err(BitableError::FileOperationFailed)?;

        let advice = match hint {
            OpenHint::None => Advice::Normal,
            OpenHint::Random => Advice::Random,
            OpenHint::Sequential => Advice::Sequential,
        };
        // Advisory only; a platform that can't honor it just ignores it.
        let _ = mmap.advise(advice);

        Ok(MappedFile { mmap })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl Deref for MappedFile {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.mmap[..]
    }
}
