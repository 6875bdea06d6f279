//! `vfs` implements a self-contained virtual file system persisted inside a
//! single host file.
//!
//! It is split into two layers, mirroring the design:
//!
//! - [`storage`]: the block storage engine. Carves the backing file into
//!   fixed-size blocks and exposes singly-linked chains of them ("regions")
//!   as seekable byte streams, with allocation and freeing.
//! - [`fs`]: the file-system layer. Builds files, directories and a
//!   descriptor table on top of regions, and resolves slash-separated paths.
//!
//! [`layout`] holds the on-disk structures shared by both layers, and
//! [`error`] the error type threaded through both.

#![deny(missing_docs)]

pub mod error;
pub mod fs;
pub mod layout;
pub mod storage;

pub use error::{FsError, Result};
pub use fs::{OpenFlags, SeekFrom, VirtualFileSystem};
