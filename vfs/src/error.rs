//! The error type used throughout the storage engine and file-system layer.
//!
//! As in [`vstore::error`], each variant corresponds to one of the failure
//! categories enumerated in the design: a missing path, an exhausted
//! descriptor table, an `EXCLUSIVE` create against an existing file, and so
//! on, rather than a single catch-all.

use thiserror::Error;
use vstore::StoreError;

/// Error type returned by [`crate::storage::StorageEngine`] and
/// [`crate::fs::VirtualFileSystem`].
#[derive(Error, Debug)]
pub enum FsError {
    /// Propagated failure from the backing-file layer.
    #[error("Error in the backing-file layer")]
    Store(#[from] StoreError),

    /// Propagated failure from (de)serializing a fixed-width on-disk struct.
    #[error("Error (de)serializing an on-disk structure")]
    Serialize(#[from] bincode::Error),

    /// The storage engine ran out of free blocks.
    #[error("No free blocks available to allocate a region")]
    OutOfSpace,

    /// A path did not resolve to an existing directory entry.
    #[error("No such path: {0}")]
    NoSuchPath(String),

    /// `EXCLUSIVE` was given together with `CREATE`, and the file already existed.
    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    /// `rmdir` was called on a directory that still has live entries.
    #[error("Directory is not empty: {0}")]
    NotEmpty(String),

    /// The descriptor table has no free slots left.
    #[error("Descriptor table is full")]
    OutOfDescriptors,

    /// The given descriptor does not refer to a currently open file.
    #[error("Invalid or closed file descriptor")]
    InvalidDescriptor,

    /// A path was malformed: empty, containing an empty component, or using
    /// an unsupported component such as `.`/`..`.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A directory entry name was empty or longer than 255 bytes.
    #[error("Invalid entry name: {0}")]
    InvalidName(String),
}

/// Generic alias for a `Result` with the error type [`FsError`].
pub type Result<T> = std::result::Result<T, FsError>;
