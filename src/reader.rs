//! Cursor-based reader (C5): opens the file set, validates the header, and
//! exposes zero-copy navigation and accessors over the mapped pages.

use crate::error::{BitableError, Result};
use crate::format::{
    BranchIndex, Header, LeafIndex, BRANCH_INDEX_SIZE, BRANCH_PAGE_HEADER_SIZE, HEADER_MARKER,
    HEADER_SIZE, LEAF_INDEX_SIZE, LEAF_PAGE_HEADER_SIZE, MAX_KEY_SIZE,
};
use crate::io::{MappedFile, OpenHint};
use crate::paths::TablePaths;
use crate::Stats;
use std::cmp::Ordering;
use std::path::Path;

/// A zero-based leaf page index and item index within that page.
///
/// Cursors are plain values: they carry no reference to the reader that
/// produced them and remain valid as input to any method on that reader
/// for as long as the reader stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub page: u64,
    pub item: i32,
}

/// The three search semantics `find` supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindOp {
    Exact,
    Lower,
    Upper,
}

/// A total order over keys, consistent with the order they were appended
/// in. This is a precondition on the caller; it is not checked.
pub trait KeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// The default comparator: plain byte-lexicographic order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicComparator;

impl KeyComparator for LexicographicComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

impl<F> KeyComparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

fn leaf_page_header(page_bytes: &[u8]) -> (u64, i32) {
    let base_indice = u64::from_le_bytes(page_bytes[0..8].try_into().unwrap());
    let item_count = i32::from_le_bytes(page_bytes[8..12].try_into().unwrap());
    (base_indice, item_count)
}

fn leaf_index_at(page_bytes: &[u8], index: u32) -> LeafIndex {
    let start = LEAF_PAGE_HEADER_SIZE as usize + index as usize * LEAF_INDEX_SIZE as usize;
    LeafIndex::decode(&page_bytes[start..start + LEAF_INDEX_SIZE as usize])
}

fn branch_page_header(page_bytes: &[u8]) -> (u64, u16) {
    let first_child_page = u64::from_le_bytes(page_bytes[0..8].try_into().unwrap());
    let item_count = u16::from_le_bytes(page_bytes[8..10].try_into().unwrap());
    (first_child_page, item_count)
}

fn branch_index_at(page_bytes: &[u8], index: u32) -> BranchIndex {
    let start = BRANCH_PAGE_HEADER_SIZE as usize + index as usize * BRANCH_INDEX_SIZE as usize;
    BranchIndex::decode(&page_bytes[start..start + BRANCH_INDEX_SIZE as usize])
}

/// Opens a bitable for reading. Permits unsynchronized concurrent reads
/// from multiple threads once opened; open/close are not themselves
/// concurrency-safe with other operations on the same instance.
pub struct BitableReader<C: KeyComparator = LexicographicComparator> {
    header: Header,
    leaf: MappedFile,
    large_value: Option<MappedFile>,
    branches: Vec<MappedFile>,
    comparator: C,
}

impl<C: KeyComparator> BitableReader<C> {
    pub fn open(base_path: &Path, hint: OpenHint, comparator: C) -> Result<Self> {
        let paths = TablePaths::build(base_path);

        let leaf = MappedFile::open(&paths.leaf, hint)?;
        if leaf.len() < HEADER_SIZE {
            return Err(BitableError::FileTooSmall);
        }

        let header = Header::decode(&leaf[0..HEADER_SIZE]);
        if header.header_marker != HEADER_MARKER {
            return Err(BitableError::HeaderCorrupt);
        }
        if header.compute_checksum() != header.checksum {
            return Err(BitableError::HeaderCorrupt);
        }

        let expected_leaf_len =
            header.page_size as u64 + header.leaf_pages * header.page_size as u64;
        if (leaf.len() as u64) < expected_leaf_len {
            return Err(BitableError::HeaderCorrupt);
        }

        let large_value = if header.large_value_store_size > 0 {
            Some(MappedFile::open(&paths.large_value, hint)?)
        } else {
            None
        };

        let mut branches = Vec::with_capacity(header.depth as usize);
        for level in 0..header.depth as usize {
            let path = paths
                .branch(level)
                .ok_or(BitableError::HeaderCorrupt)?;
            branches.push(MappedFile::open(path, OpenHint::Random)?);
        }

        log::debug!(
            "bitable open: item_count={} depth={} leaf_pages={}",
            header.item_count,
            header.depth,
            header.leaf_pages
        );

        Ok(BitableReader {
            header,
            leaf,
            large_value,
            branches,
            comparator,
        })
    }

    pub fn stats(&self) -> Stats {
        Stats {
            depth: self.header.depth,
            item_count: self.header.item_count,
            leaf_pages: self.header.leaf_pages,
            large_value_store_size: self.header.large_value_store_size,
            page_size: self.header.page_size,
            key_alignment: self.header.key_alignment,
            value_alignment: self.header.value_alignment,
        }
    }

    fn leaf_page_bytes(&self, page: u64) -> &[u8] {
        let p = self.header.page_size as u64;
        let start = (p + page * p) as usize;
        &self.leaf[start..start + p as usize]
    }

    fn branch_page_bytes(&self, level: usize, page: u64) -> &[u8] {
        let p = self.header.page_size as u64;
        let start = (page * p) as usize;
        &self.branches[level][start..start + p as usize]
    }

    /// Descends from the root branch level to the leaf page that may
    /// contain `key`: at each level, the greatest separator `<= key` wins
    /// (upper bound with equality allowed).
    fn descend(&self, key: &[u8]) -> u64 {
        let mut child_page: u64 = 0;
        for level in (0..self.header.depth as usize).rev() {
            let page_bytes = self.branch_page_bytes(level, child_page);
            let (first_child_page, item_count) = branch_page_header(page_bytes);
            let separator_count = item_count as i64 - 1;

            let mut lo: i64 = 0;
            let mut hi: i64 = separator_count - 1;
            let mut best: i64 = -1;
            while lo <= hi {
                let mid = lo + (hi - lo) / 2;
                let idx = branch_index_at(page_bytes, mid as u32);
                let sep = &page_bytes
                    [idx.item_offset as usize..idx.item_offset as usize + idx.key_size as usize];
                match self.comparator.compare(sep, key) {
                    Ordering::Equal => {
                        best = mid;
                        break;
                    }
                    Ordering::Less => {
                        best = mid;
                        lo = mid + 1;
                    }
                    Ordering::Greater => hi = mid - 1,
                }
            }

            child_page = if best >= 0 {
                first_child_page + best as u64 + 1
            } else {
                first_child_page
            };
        }
        child_page
    }

    /// Locates `key` using the given search semantics. `Ok(None)` means
    /// `END_OF_SEQUENCE` (a normal terminator for `Lower`/`Upper`, never
    /// returned for `Exact`).
    pub fn find(&self, key: &[u8], op: FindOp) -> Result<Option<Cursor>> {
        let page = self.descend(key);
        let page_bytes = self.leaf_page_bytes(page);
        let (_, item_count) = leaf_page_header(page_bytes);

        if item_count == 0 {
            return match op {
                FindOp::Exact => Err(BitableError::KeyNotFound),
                FindOp::Lower | FindOp::Upper => Ok(None),
            };
        }

        let mut lo: i64 = 0;
        let mut hi: i64 = item_count as i64 - 1;
        let mut best: i64 = -1;
        let mut exact = false;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let idx = leaf_index_at(page_bytes, mid as u32);
            let k =
                &page_bytes[idx.item_offset as usize..idx.item_offset as usize + idx.key_size as usize];
            match self.comparator.compare(k, key) {
                Ordering::Equal => {
                    best = mid;
                    exact = true;
                    break;
                }
                Ordering::Greater => {
                    best = mid;
                    hi = mid - 1;
                }
                Ordering::Less => lo = mid + 1,
            }
        }

        if best >= 0 {
            let cursor = Cursor {
                page,
                item: best as i32,
            };
            if exact {
                return Ok(Some(cursor));
            }
            match op {
                FindOp::Exact => Err(BitableError::KeyNotFound),
                FindOp::Upper => Ok(self.previous(&cursor)),
                FindOp::Lower => Ok(Some(cursor)),
            }
        } else {
            let cursor = Cursor {
                page,
                item: item_count - 1,
            };
            match op {
                FindOp::Exact => Err(BitableError::KeyNotFound),
                FindOp::Upper => Ok(Some(cursor)),
                FindOp::Lower => Ok(self.next(&cursor)),
            }
        }
    }

    pub fn first(&self) -> Option<Cursor> {
        if self.header.item_count == 0 {
            None
        } else {
            Some(Cursor { page: 0, item: 0 })
        }
    }

    pub fn last(&self) -> Option<Cursor> {
        if self.header.item_count == 0 {
            return None;
        }
        let last_page = self.header.leaf_pages - 1;
        let (_, item_count) = leaf_page_header(self.leaf_page_bytes(last_page));
        Some(Cursor {
            page: last_page,
            item: item_count - 1,
        })
    }

    pub fn next(&self, cursor: &Cursor) -> Option<Cursor> {
        let (_, item_count) = leaf_page_header(self.leaf_page_bytes(cursor.page));
        if cursor.item + 1 < item_count {
            return Some(Cursor {
                page: cursor.page,
                item: cursor.item + 1,
            });
        }
        let next_page = cursor.page + 1;
        if next_page >= self.header.leaf_pages {
            return None;
        }
        Some(Cursor {
            page: next_page,
            item: 0,
        })
    }

    pub fn previous(&self, cursor: &Cursor) -> Option<Cursor> {
        if cursor.item > 0 {
            return Some(Cursor {
                page: cursor.page,
                item: cursor.item - 1,
            });
        }
        // The reference dereferences `leafPages - 1` unconditionally here;
        // page 0 with item 0 must terminate instead of stepping to a
        // nonexistent previous page.
        if cursor.page == 0 {
            return None;
        }
        let prev_page = cursor.page - 1;
        let (_, item_count) = leaf_page_header(self.leaf_page_bytes(prev_page));
        Some(Cursor {
            page: prev_page,
            item: item_count - 1,
        })
    }

    fn validate_cursor(&self, cursor: &Cursor) -> Result<(&[u8], LeafIndex)> {
        if cursor.page >= self.header.leaf_pages || cursor.item < 0 {
            return Err(BitableError::InvalidCursorLocation);
        }
        let page_bytes = self.leaf_page_bytes(cursor.page);
        let (_, item_count) = leaf_page_header(page_bytes);
        if cursor.item >= item_count {
            return Err(BitableError::InvalidCursorLocation);
        }
        let idx = leaf_index_at(page_bytes, cursor.item as u32);
        Ok((page_bytes, idx))
    }

    pub fn key(&self, cursor: &Cursor) -> Result<&[u8]> {
        let (page_bytes, idx) = self.validate_cursor(cursor)?;
        let start = idx.item_offset as usize;
        Ok(&page_bytes[start..start + idx.key_size as usize])
    }

    pub fn value(&self, cursor: &Cursor) -> Result<&[u8]> {
        let (page_bytes, idx) = self.validate_cursor(cursor)?;
        let data_from_right = self.header.page_size - idx.item_offset as u32;

        if idx.data_size as i32 <= MAX_KEY_SIZE {
            let value_total =
                crate::format::align_up(data_from_right + idx.data_size, self.header.value_alignment);
            let value_start = self.header.page_size - value_total;
            Ok(&page_bytes[value_start as usize..value_start as usize + idx.data_size as usize])
        } else {
            let offset_slot_total = crate::format::align_up(data_from_right + 8, 8);
            let offset_slot_start = (self.header.page_size - offset_slot_total) as usize;
            let raw = &page_bytes[offset_slot_start..offset_slot_start + 8];
            let lv_offset = u64::from_le_bytes(raw.try_into().unwrap());

            let lv = self
                .large_value
                .as_ref()
                .ok_or(BitableError::HeaderCorrupt)?;
            let end = lv_offset
                .checked_add(idx.data_size as u64)
                .ok_or(BitableError::HeaderCorrupt)?;
            if end > lv.len() as u64 {
                // The reference asserts this bound instead of checking it;
                // a corrupt or truncated large-value file should fail
                // cleanly rather than read out of bounds.
                return Err(BitableError::FileTooSmall);
            }
            Ok(&lv[lv_offset as usize..end as usize])
        }
    }

    pub fn key_value_pair(&self, cursor: &Cursor) -> Result<(&[u8], &[u8])> {
        Ok((self.key(cursor)?, self.value(cursor)?))
    }

    pub fn indice(&self, cursor: &Cursor) -> Result<u64> {
        let (page_bytes, _) = self.validate_cursor(cursor)?;
        let (base_indice, _) = leaf_page_header(page_bytes);
        Ok(base_indice + cursor.item as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{BitableWriter, CloseOption};

    fn key_of(k: i32) -> [u8; 4] {
        k.to_le_bytes()
    }

    fn build_table(dir: &std::path::Path, keys: &[i32]) -> std::path::PathBuf {
        let base = dir.join("t");
        let mut writer = BitableWriter::create(&base, 4096, 4, 4).unwrap();
        for &k in keys {
            writer.append(&key_of(k), &key_of(k)).unwrap();
        }
        writer.close(CloseOption::None).unwrap();
        base
    }

    #[test]
    fn find_upper_and_lower_between_keys() {
        let dir = tempfile::tempdir().unwrap();
        let keys: Vec<i32> = (0..2000).step_by(2).collect();
        let base = build_table(dir.path(), &keys);

        let reader = BitableReader::open(&base, OpenHint::None, LexicographicComparator).unwrap();

        let upper = reader.find(&key_of(41), FindOp::Upper).unwrap().unwrap();
        assert_eq!(
            i32::from_le_bytes(reader.key(&upper).unwrap().try_into().unwrap()),
            40
        );

        let lower = reader.find(&key_of(41), FindOp::Lower).unwrap().unwrap();
        assert_eq!(
            i32::from_le_bytes(reader.key(&lower).unwrap().try_into().unwrap()),
            42
        );

        assert!(matches!(
            reader.find(&key_of(41), FindOp::Exact),
            Err(BitableError::KeyNotFound)
        ));
    }

    #[test]
    fn find_past_either_end_is_end_of_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let keys: Vec<i32> = (0..100).step_by(2).collect();
        let base = build_table(dir.path(), &keys);
        let reader = BitableReader::open(&base, OpenHint::None, LexicographicComparator).unwrap();

        assert!(reader.find(&key_of(-1), FindOp::Upper).unwrap().is_none());
        assert!(reader.find(&key_of(1000), FindOp::Lower).unwrap().is_none());
    }

    #[test]
    fn next_then_previous_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let keys: Vec<i32> = (0..500).collect();
        let base = build_table(dir.path(), &keys);
        let reader = BitableReader::open(&base, OpenHint::None, LexicographicComparator).unwrap();

        let start = reader.first().unwrap();
        let forward = reader.next(&start).unwrap();
        let back = reader.previous(&forward).unwrap();
        assert_eq!(start, back);
    }

    #[test]
    fn invalid_cursor_location_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let keys: Vec<i32> = (0..10).collect();
        let base = build_table(dir.path(), &keys);
        let reader = BitableReader::open(&base, OpenHint::None, LexicographicComparator).unwrap();

        let bogus = Cursor {
            page: reader.stats().leaf_pages,
            item: 0,
        };
        assert!(matches!(
            reader.key(&bogus),
            Err(BitableError::InvalidCursorLocation)
        ));
    }
}
