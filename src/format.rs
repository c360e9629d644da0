//! On-disk constants and the fixed-width structures that sit at the left
//! (header/index) end of every page. Field layout, byte order and the
//! checksum formula are all part of the wire format — two independent
//! implementations of this spec must produce byte-identical files.

/// Maximum size in bytes of a key.
pub const MAX_KEY_SIZE: i32 = 768;
/// Smallest permitted page size.
pub const MIN_PAGE_SIZE: u32 = 2048;
/// Largest permitted page size. Also the tightest bound on any in-page
/// offset, since offsets are stored as `u16`.
pub const MAX_PAGE_SIZE: u32 = 65536;
/// Largest permitted key/value alignment.
pub const MAX_ALIGNMENT: u32 = 512;
/// Hard cap on the number of branch levels a table may grow.
///
/// The upstream C headers disagree with themselves here (one declares 32,
/// another 64); this crate follows the spec's normative value of 32.
pub const MAX_BRANCH_LEVELS: usize = 32;

/// Magic value identifying a bitable leaf file.
pub const HEADER_MARKER: u64 = 0xD47A_682C_F7E6_14BA;

/// Encoded size of [`Header`] on disk.
pub const HEADER_SIZE: usize = 56;
/// Encoded size of a `LeafIndex` entry.
pub const LEAF_INDEX_SIZE: u16 = 8;
/// Encoded size of a `BranchIndex` entry.
pub const BRANCH_INDEX_SIZE: u16 = 4;
/// Size of the leaf page header (`baseIndice` + `itemCount`).
pub const LEAF_PAGE_HEADER_SIZE: u16 = 12;
/// Size of the branch page header (`firstChildPage` + `itemCount`).
pub const BRANCH_PAGE_HEADER_SIZE: u16 = 10;

/// Rounds `n` up to the next multiple of the power-of-two `alignment`.
#[inline]
pub fn align_up(n: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (n + (alignment - 1)) & !(alignment - 1)
}

/// Rounds `n` up to the next multiple of the power-of-two `alignment`.
#[inline]
pub fn align_up_u64(n: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (n + (alignment - 1)) & !(alignment - 1)
}

/// The file-set header, stored at byte 0 of the leaf file, overwriting the
/// first leaf page slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub header_marker: u64,
    pub item_count: u64,
    pub checksum: u64,
    pub large_value_store_size: u64,
    pub depth: u32,
    pub key_alignment: u32,
    pub value_alignment: u32,
    pub page_size: u32,
    pub leaf_pages: u64,
}

impl Header {
    /// Positional rolling hash over every field except `checksum` itself,
    /// computed with wrapping 64-bit arithmetic.
    pub fn compute_checksum(&self) -> u64 {
        let mut checksum: u64 = self.header_marker;
        checksum = checksum.wrapping_mul(37).wrapping_add(self.item_count);
        checksum = checksum
            .wrapping_mul(37)
            .wrapping_add(self.large_value_store_size);
        checksum = checksum.wrapping_mul(37).wrapping_add(self.depth as u64);
        checksum = checksum
            .wrapping_mul(37)
            .wrapping_add(self.key_alignment as u64);
        checksum = checksum
            .wrapping_mul(37)
            .wrapping_add(self.value_alignment as u64);
        checksum = checksum.wrapping_mul(37).wrapping_add(self.page_size as u64);
        checksum.wrapping_mul(37).wrapping_add(self.leaf_pages)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.header_marker.to_le_bytes());
        buf[8..16].copy_from_slice(&self.item_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf[24..32].copy_from_slice(&self.large_value_store_size.to_le_bytes());
        buf[32..36].copy_from_slice(&self.depth.to_le_bytes());
        buf[36..40].copy_from_slice(&self.key_alignment.to_le_bytes());
        buf[40..44].copy_from_slice(&self.value_alignment.to_le_bytes());
        buf[44..48].copy_from_slice(&self.page_size.to_le_bytes());
        buf[48..56].copy_from_slice(&self.leaf_pages.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Self {
        Header {
            header_marker: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            item_count: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            checksum: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            large_value_store_size: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            depth: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
            key_alignment: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
            value_alignment: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
            page_size: u32::from_le_bytes(buf[44..48].try_into().unwrap()),
            leaf_pages: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
        }
    }
}

/// An index entry for one key/value pair on a leaf page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeafIndex {
    pub data_size: u32,
    pub key_size: u16,
    pub item_offset: u16,
}

impl LeafIndex {
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.data_size.to_le_bytes());
        buf[4..6].copy_from_slice(&self.key_size.to_le_bytes());
        buf[6..8].copy_from_slice(&self.item_offset.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        LeafIndex {
            data_size: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            key_size: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
            item_offset: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
        }
    }
}

/// An index entry for one separator key on a branch page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BranchIndex {
    pub key_size: u16,
    pub item_offset: u16,
}

impl BranchIndex {
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.key_size.to_le_bytes());
        buf[2..4].copy_from_slice(&self.item_offset.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        BranchIndex {
            key_size: u16::from_le_bytes(buf[0..2].try_into().unwrap()),
            item_offset: u16::from_le_bytes(buf[2..4].try_into().unwrap()),
        }
    }
}
