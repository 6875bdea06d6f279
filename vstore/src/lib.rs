//! `vstore` is the generic, block-agnostic backing-file abstraction used by
//! the `vfs` crate. It knows nothing about blocks, regions, directories or
//! files: it only maps a single host file into memory and exposes raw
//! byte-range reads and writes over it.
//!
//! Splitting this out from `vfs` mirrors a device driver sitting underneath
//! a file system: the driver has no notion of the structure callers impose
//! on top of the bytes it reads and writes.

#![deny(missing_docs)]

pub mod device;
pub mod error;

pub use device::{Device, DiskState};
pub use error::{Result, StoreError};
