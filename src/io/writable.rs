use crate::error::{BitableError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// A sequential writable file: create, write, seek, sync, close.
///
/// This is the only write-side file abstraction the writer uses; it does
/// no buffering of its own beyond what `std::fs::File` already does; the
/// writer owns one page-sized buffer per level and calls `write` once per
/// flushed page.
pub struct WritableFile {
    file: File,
}

impl WritableFile {
    /// Creates (truncating any existing contents) the file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(BitableError::FileOpenFailed)?;

        Ok(WritableFile { file })
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .write_all(bytes)
            .map_err(BitableError::FileOperationFailed)
    }

    pub fn seek(&mut self, absolute_offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(absolute_offset))
            .map_err(BitableError::FileOperationFailed)?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all().map_err(BitableError::FileOperationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn create_write_seek_sync_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf");

        let mut file = WritableFile::create(&path).unwrap();
        file.write(b"hello").unwrap();
        file.write(b"world").unwrap();
        file.seek(0).unwrap();
        file.write(b"H").unwrap();
        file.sync().unwrap();

        let contents = fs::read(&path).unwrap();
        assert_eq!(contents, b"Helloworld");
    }
}
