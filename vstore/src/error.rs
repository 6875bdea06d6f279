//! The error type used by the backing-file abstraction.
//!
//! Note the two "supertraits" any error type must implement:
//! * `Debug`: a `toString`-like method for debugging that can be derived
//!   automatically using `#[derive(Debug, ...)]`.
//! * `Display`: a `toString`-like method that will be used to show errors
//!   to users. [`thiserror`](https://docs.rs/thiserror) derives both from
//!   the `#[error(...)]` annotations below.

use std::io;
use thiserror::Error;

/// Error type returned by the [`Device`](crate::device::Device) abstraction.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O failure while creating, opening, or memory-mapping the backing file.
    #[error("I/O error accessing the backing file")]
    Io(#[from] io::Error),
    /// Invalid input to the device layer, e.g. a read or write past the end
    /// of the mapped region, or an unexpected file size on load.
    #[error("Invalid device input: {0}")]
    DeviceInput(&'static str),
}

/// Generic alias for a `Result` with the error type [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
