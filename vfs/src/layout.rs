//! On-disk structures of the virtual file system.
//!
//! Every fixed-width structure here derives `Serialize`/`Deserialize` and is
//! written through `bincode`, whose default configuration (fixed-width
//! integers, little-endian) is exactly the wire format the design calls for
//! — using `bincode` is not just convenience, the struct definitions below
//! *are* the on-disk layout.
//!
//! Variable-length data (entry names) has no single struct to describe it;
//! those fields are written and read directly as raw length-prefixed bytes
//! by [`crate::storage::StorageEngine`].

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Sentinel block index, used both as "no such block" and "no such region".
/// Never a valid index into the block array.
pub const INVALID: u16 = 0xFFFF;

/// Default block payload size used when formatting a new backing file.
pub const DEFAULT_BLOCK_SIZE: u16 = 10;
/// Default block count used when formatting a new backing file.
pub const DEFAULT_BLOCK_COUNT: u16 = 128;

/// Header of the backing file: the two fields needed to make sense of the
/// rest of the bytes in it.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Size, in bytes, of a single block's payload (excludes the block header).
    pub block_size: u16,
    /// Total number of blocks the backing file is formatted to hold.
    pub block_count: u16,
}

lazy_static! {
    /// Size of the file header in bytes. Only knowable at runtime since it
    /// depends on how `bincode` lays out the struct above.
    pub static ref FILE_HEADER_SIZE: u64 =
        bincode::serialize(&FileHeader::default()).unwrap().len() as u64;
}

/// Header prefixing every block's payload.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// `0` if this block is free, `1` if it belongs to a live region.
    pub in_use: u8,
    /// Index of the previous block in this region's chain, or [`INVALID`]
    /// if this is the head block.
    pub prev: u16,
    /// Index of the next block in this region's chain, or [`INVALID`] if
    /// this is the tail block.
    pub next: u16,
}

lazy_static! {
    /// Size of a block header in bytes (5, per the design: 1 + 2 + 2).
    pub static ref BLOCK_HEADER_SIZE: u64 =
        bincode::serialize(&BlockHeader::default()).unwrap().len() as u64;
}

impl BlockHeader {
    /// Header for a freshly freed (or never-allocated) block.
    pub fn free() -> BlockHeader {
        BlockHeader {
            in_use: 0,
            prev: INVALID,
            next: INVALID,
        }
    }

    /// Header for a newly allocated block, linked after `prev`.
    pub fn allocated(prev: u16) -> BlockHeader {
        BlockHeader {
            in_use: 1,
            prev,
            next: INVALID,
        }
    }

    /// Whether this block currently belongs to a live region.
    pub fn is_in_use(&self) -> bool {
        self.in_use != 0
    }
}

/// Type codes for a directory entry's 1-byte discriminant.
/// Kept as a plain Rust enum rather than derived through `serde`, since
/// `bincode` would otherwise widen an enum discriminant to 4 bytes; the
/// on-disk representation always goes through [`RawDirEntry::type_code`]
/// (a bare `u8` field) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// End-of-directory marker. Implicit in a freshly zeroed block.
    End = 0,
    /// Tombstone left behind by `unlink`/`rmdir`; reusable by later creates.
    Unused = 1,
    /// A regular file entry.
    File = 2,
    /// A subdirectory entry.
    Directory = 3,
}

impl EntryType {
    /// Decode a type code read from disk. `None` for any value other than
    /// 0..=3, which should never occur on a consistent file system.
    pub fn from_code(code: u8) -> Option<EntryType> {
        match code {
            0 => Some(EntryType::End),
            1 => Some(EntryType::Unused),
            2 => Some(EntryType::File),
            3 => Some(EntryType::Directory),
            _ => None,
        }
    }
}

/// Fixed-width directory entry as stored in a directory's content region:
/// a 1-byte type code followed by two region ids. Always exactly 5 bytes.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawDirEntry {
    /// [`EntryType`] discriminant.
    pub type_code: u8,
    /// Region id of the entry's metadata region (name, and for files, length).
    pub metadata: u16,
    /// Region id of the entry's content region (file bytes, or directory entries).
    pub content: u16,
}

lazy_static! {
    /// Size of a directory entry in bytes (5, per the design).
    pub static ref DIR_ENTRY_SIZE: u64 =
        bincode::serialize(&RawDirEntry::default()).unwrap().len() as u64;
}

impl RawDirEntry {
    /// Build an entry for a newly created file or directory.
    pub fn new(entry_type: EntryType, metadata: u16, content: u16) -> RawDirEntry {
        RawDirEntry {
            type_code: entry_type as u8,
            metadata,
            content,
        }
    }

    /// A tombstone entry: preserves the byte width of the slot, but is
    /// skipped by directory scans and reusable by later creates.
    pub fn unused() -> RawDirEntry {
        RawDirEntry {
            type_code: EntryType::Unused as u8,
            metadata: INVALID,
            content: INVALID,
        }
    }
}

/// Maximum length, in bytes, of a file or directory name.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_the_design() {
        assert_eq!(*FILE_HEADER_SIZE, 4);
        assert_eq!(*BLOCK_HEADER_SIZE, 5);
        assert_eq!(*DIR_ENTRY_SIZE, 5);
    }

    #[test]
    fn entry_type_round_trips() {
        for t in [
            EntryType::End,
            EntryType::Unused,
            EntryType::File,
            EntryType::Directory,
        ] {
            assert_eq!(EntryType::from_code(t as u8), Some(t));
        }
        assert_eq!(EntryType::from_code(4), None);
    }

    #[test]
    fn block_header_bincode_layout_is_little_endian() {
        let h = BlockHeader {
            in_use: 1,
            prev: 0x0102,
            next: 0x0304,
        };
        let bytes = bincode::serialize(&h).unwrap();
        assert_eq!(bytes, vec![1, 0x02, 0x01, 0x04, 0x03]);
    }
}
