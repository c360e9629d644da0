//! Single-pass bulk builder (C4): packs an ordered key/value stream into
//! leaf pages, cascades separator keys up the branch levels without
//! backtracking, spills oversized values to the large-value store, and
//! writes the header last.

use crate::error::{BitableError, Result};
use crate::format::{
    align_up, align_up_u64, BranchIndex, Header, LeafIndex, BRANCH_INDEX_SIZE,
    BRANCH_PAGE_HEADER_SIZE, HEADER_MARKER, HEADER_SIZE, LEAF_INDEX_SIZE,
    LEAF_PAGE_HEADER_SIZE, MAX_ALIGNMENT, MAX_BRANCH_LEVELS, MAX_KEY_SIZE, MAX_PAGE_SIZE,
    MIN_PAGE_SIZE,
};
use crate::io::WritableFile;
use crate::paths::TablePaths;
use crate::Stats;
use std::path::Path;

/// How a writer should finish its files on [`BitableWriter::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOption {
    /// Write buffered pages and the header, without forcing a sync.
    None,
    /// Write buffered pages and the header, syncing in the order required
    /// for crash safety (see `finish_writes` below).
    Durable,
    /// Abandon all in-progress state; leave the files as they are.
    Discard,
}

struct LeafPageState {
    buf: Vec<u8>,
    left_size: u32,
    right_size: u32,
    item_count: u32,
    base_indice: u64,
}

impl LeafPageState {
    fn new(page_size: u32, base_indice: u64) -> Self {
        LeafPageState {
            buf: vec![0u8; page_size as usize],
            left_size: LEAF_PAGE_HEADER_SIZE as u32,
            right_size: 0,
            item_count: 0,
            base_indice,
        }
    }
}

struct BranchPageState {
    buf: Vec<u8>,
    left_size: u32,
    right_size: u32,
    item_count: u32,
    first_child_page: u64,
}

impl BranchPageState {
    fn new(page_size: u32, first_child_page: u64) -> Self {
        BranchPageState {
            buf: vec![0u8; page_size as usize],
            left_size: BRANCH_PAGE_HEADER_SIZE as u32,
            right_size: 0,
            item_count: 0,
            first_child_page,
        }
    }
}

struct LargeValueState {
    file: WritableFile,
    size: u64,
}

/// The single-producer bulk builder. Appends must arrive in ascending key
/// order per the caller's comparator; the writer does not verify this.
pub struct BitableWriter {
    paths: TablePaths,
    page_size: u32,
    key_alignment: u32,
    value_alignment: u32,

    leaf_file: WritableFile,
    leaf: LeafPageState,
    leaf_pages_written: u64,
    global_item_count: u64,

    branch_files: Vec<WritableFile>,
    branch_levels: Vec<BranchPageState>,

    large_value: Option<LargeValueState>,
}

impl BitableWriter {
    /// Creates a new table at `base_path` with the given page size and
    /// key/value alignments, all of which must be powers of two within the
    /// ranges given in the format description.
    pub fn create(
        base_path: &Path,
        page_size: u32,
        key_alignment: u32,
        value_alignment: u32,
    ) -> Result<Self> {
        if !page_size.is_power_of_two() || page_size < MIN_PAGE_SIZE || page_size > MAX_PAGE_SIZE
        {
            return Err(BitableError::PagesizeInvalid);
        }
        if !Self::alignment_valid(key_alignment) || !Self::alignment_valid(value_alignment) {
            return Err(BitableError::AlignmentInvalid);
        }

        let paths = TablePaths::build(base_path);
        let mut leaf_file = WritableFile::create(&paths.leaf)?;
        // The header occupies the first page-sized slot; leaf pages start
        // right after it.
        leaf_file.seek(page_size as u64)?;

        log::debug!(
            "bitable create: page_size={page_size} key_alignment={key_alignment} value_alignment={value_alignment}"
        );

        Ok(BitableWriter {
            paths,
            page_size,
            key_alignment,
            value_alignment,
            leaf_file,
            leaf: LeafPageState::new(page_size, 0),
            leaf_pages_written: 0,
            global_item_count: 0,
            branch_files: Vec::new(),
            branch_levels: Vec::new(),
            large_value: None,
        })
    }

    fn alignment_valid(alignment: u32) -> bool {
        alignment.is_power_of_two() && alignment >= 1 && alignment <= MAX_ALIGNMENT
    }

    pub fn stats(&self) -> Stats {
        Stats {
            depth: self.branch_levels.len() as u32,
            item_count: self.global_item_count,
            leaf_pages: self.leaf_pages_written,
            large_value_store_size: self.large_value.as_ref().map(|v| v.size).unwrap_or(0),
            page_size: self.page_size,
            key_alignment: self.key_alignment,
            value_alignment: self.value_alignment,
        }
    }

    /// Appends one key/value pair. Keys must arrive in ascending order per
    /// the reader's comparator; this is a precondition the writer does not
    /// check.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() as i64 > MAX_KEY_SIZE as i64 {
            return Err(BitableError::KeyInvalid);
        }

        let is_large = value.len() as i32 > MAX_KEY_SIZE;
        let key_alloc = align_up(key.len() as u32, self.key_alignment);

        let mut new_key_alloc = self.leaf.right_size + key_alloc;
        let mut new_right = if is_large {
            align_up(new_key_alloc + 8, 8)
        } else {
            align_up(new_key_alloc + value.len() as u32, self.value_alignment)
        };
        let mut new_left = self.leaf.left_size + LEAF_INDEX_SIZE as u32;

        if new_left + new_right > self.page_size {
            self.flush_leaf()?;
            self.add_page_to_branch(key, 0)?;
            self.leaf = LeafPageState::new(self.page_size, self.global_item_count);

            new_key_alloc = key_alloc;
            new_right = if is_large {
                align_up(new_key_alloc + 8, 8)
            } else {
                align_up(new_key_alloc + value.len() as u32, self.value_alignment)
            };
            new_left = self.leaf.left_size + LEAF_INDEX_SIZE as u32;
            debug_assert!(
                new_left + new_right <= self.page_size,
                "a single item must always fit on a freshly reset page"
            );
        }

        let key_offset = self.page_size - new_key_alloc;
        let buf = &mut self.leaf.buf;
        buf[key_offset as usize..key_offset as usize + key.len()].copy_from_slice(key);

        let value_offset = self.page_size - new_right;
        if is_large {
            let lv_offset = Self::append_large_value(
                &mut self.large_value,
                &self.paths,
                self.page_size,
                self.value_alignment,
                value,
            )?;
            buf[value_offset as usize..value_offset as usize + 8]
                .copy_from_slice(&lv_offset.to_le_bytes());
        } else {
            buf[value_offset as usize..value_offset as usize + value.len()]
                .copy_from_slice(value);
        }

        let entry = LeafIndex {
            data_size: value.len() as u32,
            key_size: key.len() as u16,
            item_offset: key_offset as u16,
        };
        let entry_start = self.leaf.left_size as usize;
        entry.encode_into(&mut self.leaf.buf[entry_start..entry_start + LEAF_INDEX_SIZE as usize]);

        self.leaf.left_size = new_left;
        self.leaf.right_size = new_right;
        self.leaf.item_count += 1;
        self.global_item_count += 1;

        Ok(())
    }

    /// Flushes the current leaf page to disk. Called both on overflow and,
    /// unconditionally, once more at close so every table ends with at
    /// least one (possibly empty) leaf page.
    fn flush_leaf(&mut self) -> Result<()> {
        self.leaf.buf[0..8].copy_from_slice(&self.leaf.base_indice.to_le_bytes());
        self.leaf.buf[8..12].copy_from_slice(&(self.leaf.item_count as i32).to_le_bytes());
        self.leaf_file.write(&self.leaf.buf)?;
        self.leaf_pages_written += 1;
        Ok(())
    }

    /// Promotes `key` as a separator into the branch level `level`,
    /// creating it, appending to it, or cascading to the level above on
    /// overflow — recursively, but bounded by `MAX_BRANCH_LEVELS`.
    fn add_page_to_branch(&mut self, key: &[u8], level: usize) -> Result<()> {
        if level >= MAX_BRANCH_LEVELS {
            return Err(BitableError::MaximumTableTreeDepth);
        }

        if level == self.branch_levels.len() {
            let path = self
                .paths
                .branch(level)
                .expect("level bounded by MAX_BRANCH_LEVELS above");
            self.branch_files.push(WritableFile::create(path)?);

            let mut page = BranchPageState::new(self.page_size, 0);
            let key_alloc = align_up(key.len() as u32, self.key_alignment);
            let offset = self.page_size - key_alloc;
            page.buf[offset as usize..offset as usize + key.len()].copy_from_slice(key);

            let entry = BranchIndex {
                key_size: key.len() as u16,
                item_offset: offset as u16,
            };
            let entry_start = page.left_size as usize;
            entry.encode_into(&mut page.buf[entry_start..entry_start + BRANCH_INDEX_SIZE as usize]);

            page.left_size += BRANCH_INDEX_SIZE as u32;
            page.right_size = key_alloc;
            page.item_count = 2;

            self.branch_levels.push(page);
            log::trace!("bitable: created branch level {level}");
            return Ok(());
        }

        let key_alloc = align_up(key.len() as u32, self.key_alignment);
        let new_right = self.branch_levels[level].right_size + key_alloc;
        let new_left = self.branch_levels[level].left_size + BRANCH_INDEX_SIZE as u32;

        if new_left + new_right <= self.page_size {
            let page = &mut self.branch_levels[level];
            let offset = self.page_size - new_right;
            page.buf[offset as usize..offset as usize + key.len()].copy_from_slice(key);

            let entry = BranchIndex {
                key_size: key.len() as u16,
                item_offset: offset as u16,
            };
            let entry_start = page.left_size as usize;
            entry.encode_into(&mut page.buf[entry_start..entry_start + BRANCH_INDEX_SIZE as usize]);

            page.left_size = new_left;
            page.right_size = new_right;
            page.item_count += 1;
        } else {
            self.flush_branch_page(level)?;
            self.add_page_to_branch(key, level + 1)?;

            let next_first_child =
                self.branch_levels[level].first_child_page + self.branch_levels[level].item_count as u64;
            let mut page = BranchPageState::new(self.page_size, next_first_child);
            page.item_count = 1;
            self.branch_levels[level] = page;
        }

        Ok(())
    }

    fn flush_branch_page(&mut self, level: usize) -> Result<()> {
        let page = &mut self.branch_levels[level];
        page.buf[0..8].copy_from_slice(&page.first_child_page.to_le_bytes());
        page.buf[8..10].copy_from_slice(&(page.item_count as u16).to_le_bytes());
        self.branch_files[level].write(&page.buf)?;
        Ok(())
    }

    fn append_large_value(
        large_value: &mut Option<LargeValueState>,
        paths: &TablePaths,
        page_size: u32,
        value_alignment: u32,
        value: &[u8],
    ) -> Result<u64> {
        if large_value.is_none() {
            *large_value = Some(LargeValueState {
                file: WritableFile::create(&paths.large_value)?,
                size: 0,
            });
            log::debug!("bitable: created large-value store");
        }
        let lv = large_value.as_mut().unwrap();

        let s = value.len() as u64;
        let padded_offset = align_up_u64(lv.size, value_alignment as u64);

        let offset = if (padded_offset % page_size as u64) + s > page_size as u64 {
            let target = align_up_u64(lv.size, page_size as u64);
            let pad = target - lv.size;
            if pad > 0 {
                lv.file.write(&vec![0u8; pad as usize])?;
            }
            lv.size = target;
            lv.size
        } else {
            if padded_offset > lv.size {
                let pad = padded_offset - lv.size;
                lv.file.write(&vec![0u8; pad as usize])?;
                lv.size = padded_offset;
            }
            lv.size
        };

        lv.file.write(value)?;
        lv.size += s;
        Ok(offset)
    }

    /// Finishes the table: flushes every buffered branch page, the final
    /// (possibly empty) leaf page, and the header, in the order required
    /// for crash-safe detection of partial writes. `Discard` abandons all
    /// buffered state and leaves the files as they are.
    pub fn close(mut self, options: CloseOption) -> Result<()> {
        if options == CloseOption::Discard {
            log::debug!("bitable: discarding writer without finishing writes");
            return Ok(());
        }
        let durable = options == CloseOption::Durable;

        for level in 0..self.branch_levels.len() {
            self.flush_branch_page(level)?;
        }
        if durable {
            for file in self.branch_files.iter_mut() {
                file.sync()?;
            }
        }

        if durable {
            if let Some(lv) = self.large_value.as_mut() {
                lv.file.sync()?;
            }
        }

        self.flush_leaf()?;
        if durable {
            self.leaf_file.sync()?;
        }

        let mut header = Header {
            header_marker: HEADER_MARKER,
            item_count: self.global_item_count,
            checksum: 0,
            large_value_store_size: self.large_value.as_ref().map(|v| v.size).unwrap_or(0),
            depth: self.branch_levels.len() as u32,
            key_alignment: self.key_alignment,
            value_alignment: self.value_alignment,
            page_size: self.page_size,
            leaf_pages: self.leaf_pages_written,
        };
        header.checksum = header.compute_checksum();
        debug_assert_eq!(header.encode().len(), HEADER_SIZE);

        self.leaf_file.seek(0)?;
        self.leaf_file.write(&header.encode())?;
        if durable {
            self.leaf_file.sync()?;
        }

        log::debug!(
            "bitable close: item_count={} depth={} leaf_pages={}",
            self.global_item_count,
            header.depth,
            header.leaf_pages
        );
        Ok(())
    }
}
