// src/lib.rs

//! surfkit: safe, reference-counted pixel surfaces over a compact C-style
//! software blitter.
//!
//! The crate has two layers. The `sys` module is the native engine: C-layout
//! structs allocated through `libc`, manual reference counts, ad-hoc flag
//! words, raw-pointer functions with sentinel returns, and a per-thread last
//! error. Everything public sits above it and reconciles that protocol with
//! Rust ownership: every native handle is held through a
//! [`resource::RefCountedResource`], which drops exactly one counted claim
//! exactly once, at drop time or on explicit release, whichever comes first.
//! The per-kind [`resource::ResourceKind`] policy decides whether dropping
//! the claim may also deallocate.
//!
//! [`surface::Surface`] is the pixel-buffer resource built on that core:
//! creation, BMP load/save, format conversion, fills and blits, per-pixel
//! reads bracketed by a scoped lock, and a per-surface cached
//! [`format::PixelFormat`] for pack/unpack between raw pixel values and
//! structured colors.
//!
//! Native resources are not thread-safe; the wrapper types are deliberately
//! neither `Send` nor `Sync`, so access to a given resource stays on one
//! thread unless callers build their own synchronization. Logging goes
//! through the `log` facade; initializing a logger is the application's
//! business.

pub mod color;
pub mod cursor;
pub mod error;
pub mod format;
pub mod pixels;
pub mod rect;
pub mod resource;
pub mod surface;

mod sys;

pub use color::{Color, TRANSPARENT};
pub use cursor::Cursor;
pub use error::{clear_last_error, last_error_message, Error, Result};
pub use format::PixelFormat;
pub use pixels::{ChannelMasks, PixelEncoding};
pub use rect::Rect;
pub use resource::{NativeHandle, RefCountedResource, ResourceKind};
pub use surface::{BlendMode, Surface};
