//! Implementation of the block storage engine.
//!
//! Carves the backing file into fixed-size blocks, links them into
//! per-region singly-linked chains with a free-block allocator, and exposes
//! each chain as a seekable byte-stream region. This layer has no notion of
//! files, directories, paths or descriptors — that is the job of
//! [`crate::fs`].
//!
//! *EXTRA*: a free-list cache of unallocated blocks would make
//! [`StorageEngine::allocate_region`] sublinear, but the design explicitly
//! leaves this as an implementation freedom rather than a contract, so the
//! simple linear scan from block 0 is kept.

use crate::error::{FsError, Result};
use crate::layout::{BlockHeader, FileHeader, BLOCK_HEADER_SIZE, FILE_HEADER_SIZE, INVALID};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use vstore::Device;

/// The block storage engine: owns the backing [`Device`] and the single
/// process-wide cursor (current block, in-block offset, in-region offset)
/// used by every region operation.
#[derive(Debug)]
pub struct StorageEngine {
    device: Device,
    block_size: u16,
    block_count: u16,
    current_block: u16,
    current_header: BlockHeader,
    block_offset: u64,
    region_offset: u64,
}

impl StorageEngine {
    /// Format a brand new backing file at `path`, with `block_count` blocks
    /// of `block_size` bytes each. Block 0 is written already allocated,
    /// with a zeroed payload: the initial empty root directory region. All
    /// other blocks start out free.
    pub fn format<P: AsRef<Path>>(
        path: P,
        block_size: u16,
        block_count: u16,
    ) -> Result<StorageEngine> {
        create_storage_file(path.as_ref(), block_size, block_count)?;

        let size = device_size(block_size, block_count);
        let device = Device::load(path, size)?;

        let mut engine = StorageEngine {
            device,
            block_size,
            block_count,
            current_block: INVALID,
            current_header: BlockHeader::free(),
            block_offset: 0,
            region_offset: 0,
        };
        engine.jump_to_region(0)?;
        Ok(engine)
    }

    /// Open an existing backing file at `path`, reading `block_size` and
    /// `block_count` from its file header.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<StorageEngine> {
        let header = read_file_header(path.as_ref())?;
        let size = device_size(header.block_size, header.block_count);
        let device = Device::load(path, size)?;

        let mut engine = StorageEngine {
            device,
            block_size: header.block_size,
            block_count: header.block_count,
            current_block: INVALID,
            current_header: BlockHeader::free(),
            block_offset: 0,
            region_offset: 0,
        };
        engine.jump_to_region(0)?;
        Ok(engine)
    }

    /// Payload size of a single block, in bytes.
    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    /// Total number of blocks the backing file was formatted with.
    pub fn block_count(&self) -> u16 {
        self.block_count
    }

    fn block_addr(&self, index: u16) -> u64 {
        *FILE_HEADER_SIZE + index as u64 * (*BLOCK_HEADER_SIZE + self.block_size as u64)
    }

    fn read_block_header(&self, index: u16) -> Result<BlockHeader> {
        let addr = self.block_addr(index);
        let bytes = self.device.read(addr, *BLOCK_HEADER_SIZE)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn write_block_header(&mut self, index: u16, header: BlockHeader) -> Result<()> {
        let addr = self.block_addr(index);
        let bytes = bincode::serialize(&header)?;
        self.device.write(addr, &bytes)?;
        if index == self.current_block {
            self.current_header = header;
        }
        Ok(())
    }

    /// Move the physical cursor to the start of `block`'s payload, caching
    /// its header.
    fn jump_to_block(&mut self, block: u16) -> Result<()> {
        let header = self.read_block_header(block)?;
        self.current_block = block;
        self.current_header = header;
        self.block_offset = 0;
        Ok(())
    }

    /// Allocate the first free block, linking it after `prev_block` (pass
    /// [`INVALID`] to start a new, unlinked region head).
    ///
    /// Returns [`INVALID`] if every block is in use.
    pub fn allocate_region(&mut self, prev_block: u16) -> Result<u16> {
        for index in 0..self.block_count {
            let header = self.read_block_header(index)?;
            if !header.is_in_use() {
                self.write_block_header(index, BlockHeader::allocated(prev_block))?;
                return Ok(index);
            }
        }
        Ok(INVALID)
    }

    /// Free every block in the region headed by `region`. Payload bytes are
    /// left untouched; only the headers are reset.
    pub fn free_region(&mut self, region: u16) -> Result<()> {
        let mut next = region;
        while next != INVALID {
            let header = self.read_block_header(next)?;
            let following = header.next;
            self.write_block_header(next, BlockHeader::free())?;
            next = following;
        }
        Ok(())
    }

    /// Position the cursor at the head of `region`, offset 0.
    pub fn jump_to_region(&mut self, region: u16) -> Result<()> {
        self.jump_to_block(region)?;
        self.region_offset = 0;
        Ok(())
    }

    /// Current offset, in bytes, from the start of the region the cursor is
    /// positioned in.
    pub fn region_offset(&self) -> u64 {
        self.region_offset
    }

    /// Read up to `buf.len()` bytes from the cursor forward, crossing block
    /// boundaries as needed. Returns the number of bytes actually read,
    /// which is short only if the region's chain ends before `buf` is full.
    pub fn read_in_region(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len();
        let mut read = 0;

        while self.block_offset + (n - read) as u64 >= self.block_size as u64 {
            let to_read = (self.block_size as u64 - self.block_offset) as usize;
            let addr = self.block_addr(self.current_block) + *BLOCK_HEADER_SIZE + self.block_offset;
            self.device.read_into(addr, &mut buf[read..read + to_read])?;
            read += to_read;

            if self.current_header.next == INVALID {
                self.block_offset += to_read as u64;
                self.region_offset += read as u64;
                return Ok(read);
            }
            self.jump_to_block(self.current_header.next)?;
        }

        let remaining = n - read;
        let addr = self.block_addr(self.current_block) + *BLOCK_HEADER_SIZE + self.block_offset;
        self.device.read_into(addr, &mut buf[read..read + remaining])?;
        self.block_offset += remaining as u64;
        self.region_offset += n as u64;
        Ok(n)
    }

    /// Write `buf` into the region from the cursor forward, allocating new
    /// tail blocks as needed. Returns the number of bytes actually written,
    /// which is short only if the allocator runs out of space.
    pub fn write_in_region(&mut self, buf: &[u8]) -> Result<usize> {
        let n = buf.len();
        let mut written = 0;

        while self.block_offset + (n - written) as u64 >= self.block_size as u64 {
            let to_write = (self.block_size as u64 - self.block_offset) as usize;
            let addr = self.block_addr(self.current_block) + *BLOCK_HEADER_SIZE + self.block_offset;
            self.device.write(addr, &buf[written..written + to_write])?;
            written += to_write;

            if self.current_header.next != INVALID {
                self.jump_to_block(self.current_header.next)?;
            } else {
                let current_block = self.current_block;
                let new_block = self.allocate_region(current_block)?;
                if new_block == INVALID {
                    self.block_offset = self.block_size as u64;
                    self.region_offset += written as u64;
                    return Ok(written);
                }

                let mut header = self.current_header;
                header.next = new_block;
                self.write_block_header(current_block, header)?;

                self.jump_to_block(new_block)?;
            }
        }

        let remaining = n - written;
        let addr = self.block_addr(self.current_block) + *BLOCK_HEADER_SIZE + self.block_offset;
        self.device.write(addr, &buf[written..written + remaining])?;
        self.block_offset += remaining as u64;
        self.region_offset += n as u64;
        Ok(n)
    }

    /// Seek relative to the cursor's current position within the region.
    /// Positive offsets follow `next`; negative offsets follow `prev`,
    /// landing on the last byte of the predecessor block when stepping
    /// back across a block boundary (mirroring the original design so that
    /// subsequent relative reads/writes land on the correct byte). Returns
    /// the new in-region offset.
    ///
    /// Seeking forward past the end of an allocated chain is undefined
    /// behaviour: callers must not do it.
    pub fn seek_in_region(&mut self, offset: i64) -> Result<u64> {
        if offset > 0 {
            let mut remaining = offset as u64;
            while self.block_offset + remaining >= self.block_size as u64 {
                remaining -= self.block_size as u64 - self.block_offset;
                self.jump_to_block(self.current_header.next)?;
            }
            self.block_offset += remaining;
        } else if offset < 0 {
            let mut remaining = (-offset) as u64;
            while remaining > self.block_offset {
                remaining -= self.block_offset + 1;
                self.jump_to_block(self.current_header.prev)?;
                self.block_offset = self.block_size as u64 - 1;
            }
            self.block_offset -= remaining;
        }

        self.region_offset = (self.region_offset as i64 + offset) as u64;
        Ok(self.region_offset)
    }
}

fn device_size(block_size: u16, block_count: u16) -> u64 {
    *FILE_HEADER_SIZE + block_count as u64 * (*BLOCK_HEADER_SIZE + block_size as u64)
}

fn read_file_header(path: &Path) -> Result<FileHeader> {
    let mut f = File::open(path).map_err(vstore::StoreError::Io)?;
    let mut bytes = vec![0u8; *FILE_HEADER_SIZE as usize];
    f.read_exact(&mut bytes).map_err(vstore::StoreError::Io)?;
    Ok(bincode::deserialize(&bytes)?)
}

fn create_storage_file(path: &Path, block_size: u16, block_count: u16) -> Result<()> {
    if path.exists() {
        return Err(FsError::Store(vstore::StoreError::DeviceInput(
            "Tried to format a pre-existing file path",
        )));
    }

    let mut f = File::create(path).map_err(vstore::StoreError::Io)?;

    let header = FileHeader {
        block_size,
        block_count,
    };
    f.write_all(&bincode::serialize(&header)?)
        .map_err(vstore::StoreError::Io)?;

    let zero_payload = vec![0u8; block_size as usize];

    let root_header = BlockHeader::allocated(INVALID);
    f.write_all(&bincode::serialize(&root_header)?)
        .map_err(vstore::StoreError::Io)?;
    f.write_all(&zero_payload).map_err(vstore::StoreError::Io)?;

    let free_header = BlockHeader::free();
    let free_header_bytes = bincode::serialize(&free_header)?;
    for _ in 1..block_count {
        f.write_all(&free_header_bytes)
            .map_err(vstore::StoreError::Io)?;
        f.write_all(&zero_payload).map_err(vstore::StoreError::Io)?;
    }

    Ok(())
}
