// src/error.rs

//! Typed errors raised by the safety layer, plus access to the engine's
//! process-wide "last error" message collaborator.
//!
//! Every public operation either returns a fully valid result or exactly one
//! of these errors; nothing is retried. The last-error message is purely
//! informational: the engine may signal failure without setting it, and any
//! native call may overwrite it, so it is never cached here.

use thiserror::Error;

use crate::pixels::PixelEncoding;
use crate::sys;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A native creation or lookup call returned a null handle.
    #[error("native resource acquisition failed: {0}")]
    Resource(String),

    /// The requested encoding or conversion pair is not supported.
    #[error("unsupported pixel encoding: {0}")]
    UnsupportedFormat(PixelEncoding),

    /// Malformed input while decoding an image stream.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The underlying write failed while encoding an image stream.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// Pixel coordinates (or a clip rectangle origin) outside the buffer.
    #[error("({x}, {y}) is outside the {width}x{height} surface")]
    OutOfRange {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },

    /// Palette access on a non-indexed pixel format.
    #[error("palette access on non-indexed format {0}")]
    NotIndexed(PixelEncoding),

    /// A native call signalled failure through its own return convention.
    #[error("native call failed: {0}")]
    NativeOperation(String),

    /// A released resource was used again. Guards the explicit-release path;
    /// the finalizer path cannot reach it.
    #[error("native resource used after release")]
    UseAfterRelease,
}

impl Error {
    /// Builds a [`Error::NativeOperation`] from the engine's current
    /// last-error message.
    pub(crate) fn native() -> Self {
        Error::NativeOperation(sys::error::last_error())
    }
}

/// Returns the engine's last error message for the current thread.
///
/// May be empty even when an operation just failed: the engine does not
/// guarantee a message for every failure.
pub fn last_error_message() -> String {
    sys::error::last_error()
}

/// Clears the engine's last error message for the current thread.
pub fn clear_last_error() {
    sys::error::clear_error();
}
