//! Implementation of the backing-file abstraction that the virtual file
//! system is persisted inside.
//! The device is a single host file, opened once and memory-mapped for the
//! remainder of its lifetime. Unlike a typical disk controller, this device
//! has no notion of blocks: it is simply a byte-addressable region of a
//! fixed, caller-chosen size. Layering fixed-size blocks, headers and
//! regions on top of it is the job of the `vfs` crate.
//!
//! No provisions have been made to properly lock and unlock the file backing
//! the device, so do not open the same backing file from two processes at
//! once, as this leads to undefined behavior.

use super::error::{Result, StoreError};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Struct representing a memory-mapped backing file.
/// Provides raw byte-range reads and writes over its contents; all higher
/// level structure (blocks, regions, directories) is imposed by callers.
#[derive(Debug)]
pub struct Device {
    /// Path to the file in the host file system backing this device.
    path: PathBuf,
    /// Memory-mapped contents of the above file.
    contents: MmapMut,
}

/// Small enum used to specify whether we expect to open a new backing file
/// or load an existing one.
#[derive(PartialEq, Eq, Copy, Clone)]
pub enum DiskState {
    /// Creating a new backing file.
    New,
    /// Loading an existing backing file.
    Load,
}

use self::DiskState::*;
impl DiskState {
    /// Convert a boolean (does the path already exist?) to a `DiskState`.
    pub fn new(exists: bool) -> DiskState {
        match exists {
            true => Load,
            false => New,
        }
    }
}

impl Drop for Device {
    /// Makes sure all writes are persisted before we release ownership of
    /// the device. Only needed if the file backing it still exists.
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = self.contents.flush();
        }
    }
}

impl Device {
    /// Core function handling both `new` and `load`, based on the value of
    /// the switch `ds`.
    fn create_device<P: AsRef<Path>>(path: P, size: u64, ds: DiskState) -> Result<Device> {
        let path_buf = path.as_ref().to_path_buf();
        let contents = mmap_path(path, size, ds)?;
        Ok(Device {
            path: path_buf,
            contents,
        })
    }

    /// Create a *new* backing file at `path`, of exactly `size` bytes, all
    /// zero. Fails if `path` already exists.
    pub fn new<P: AsRef<Path>>(path: P, size: u64) -> Result<Device> {
        Device::create_device(path, size, New)
    }

    /// Load an *existing* backing file at `path`, which must be exactly
    /// `size` bytes long. Fails if `path` does not exist or its size
    /// disagrees.
    pub fn load<P: AsRef<Path>>(path: P, size: u64) -> Result<Device> {
        Device::create_device(path, size, Load)
    }

    /// End the lifetime of this device and remove the file backing it.
    /// Assumes there are no other links to the backing file. Panics if
    /// removing the file fails.
    pub fn destruct(self) {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path).unwrap();
    }

    /// Size of this device in bytes.
    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    /// Path of the file backing this device.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `nb` bytes from the device starting at address `addr`.
    /// Errors if a read past the end of the device is attempted.
    pub fn read(&self, addr: u64, nb: u64) -> Result<Box<[u8]>> {
        if addr + nb > self.size() {
            return Err(StoreError::DeviceInput("Read past the end of the device"));
        }
        let start = addr as usize;
        let end = (addr + nb) as usize;
        Ok(self.contents[start..end].into())
    }

    /// Read exactly `data.len()` bytes from the device starting at `addr`
    /// into `data`. Errors if the read would run past the end of the device.
    pub fn read_into(&self, addr: u64, data: &mut [u8]) -> Result<()> {
        if addr + data.len() as u64 > self.size() {
            return Err(StoreError::DeviceInput("Read past the end of the device"));
        }
        let start = addr as usize;
        data.copy_from_slice(&self.contents[start..start + data.len()]);
        Ok(())
    }

    /// Write the given buffer into the device at address `addr`.
    /// Errors if a write past the end of the device is attempted.
    pub fn write(&mut self, addr: u64, b: &[u8]) -> Result<()> {
        if addr + b.len() as u64 > self.size() {
            return Err(StoreError::DeviceInput("Write past the end of the device"));
        }
        let start = addr as usize;
        let end = start + b.len();
        self.contents[start..end].copy_from_slice(b);
        Ok(())
    }
}

/// Either open or create the specified file path, depending on `ex`.
/// If the path already exists, check that it has the expected size.
fn mmap_path<P: AsRef<Path>>(path: P, size: u64, ex: DiskState) -> Result<MmapMut> {
    let exists = DiskState::new(path.as_ref().exists());
    if exists != ex {
        if ex == Load {
            return Err(StoreError::DeviceInput(
                "Tried to load a non-existing file path",
            ));
        } else {
            return Err(StoreError::DeviceInput(
                "Tried to create a pre-existing file path",
            ));
        }
    }

    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;

    if ex == Load {
        if f.metadata()?.len() != size {
            return Err(StoreError::DeviceInput(
                "Device size does not match provided size",
            ));
        }
    } else {
        f.set_len(size)?;
    }

    let data = unsafe { MmapMut::map_mut(&f)? };
    Ok(data)
}
