// src/sys.rs

//! The native surface engine.
//!
//! Everything under `sys` is the "native library" side of the crate: C-layout
//! structs allocated with `libc`, raw-pointer functions with C return
//! conventions (null / negative on failure), manual reference counts, and a
//! per-thread last-error string. Nothing here knows about the safety layer;
//! the safety layer owns every pointer handed out of this module through a
//! `crate::resource::RefCountedResource`.
//!
//! Layout rules the wrapper relies on:
//! - `NativeSurface.flags` is the first field; the release policy reads the
//!   flag word at byte offset 0 of the struct.
//! - `NativeSurface.refcount` is located with `mem::offset_of!` when the
//!   wrapper has to decrement a claim without freeing (`DONT_FREE`).

use bitflags::bitflags;
use libc::{c_int, c_void};

pub(crate) mod bmp;
pub(crate) mod cursor;
pub(crate) mod error;
pub(crate) mod format;
pub(crate) mod surface;

bitflags! {
    /// The surface flag word. Lives at byte offset 0 of `NativeSurface`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct SurfaceFlags: u32 {
        /// Pixel memory belongs to the caller; the engine must not free it.
        const PREALLOCATED = 0x0000_0001;
        /// Run-length acceleration requested; raw pixel access needs a lock.
        const RLE_ACCEL    = 0x0000_0002;
        /// Another entity owns this surface; `free_surface` is a no-op on it.
        const DONT_FREE    = 0x0000_0004;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct NativeRect {
    pub x: c_int,
    pub y: c_int,
    pub w: c_int,
    pub h: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub(crate) struct NativePalette {
    pub ncolors: c_int,
    /// `ncolors * 4` RGBA bytes.
    pub colors: *mut u8,
    pub refcount: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub(crate) struct NativePixelFormat {
    /// Encoding tag, see `crate::pixels::PixelEncoding::tag`.
    pub tag: u32,
    /// Owned palette for indexed encodings, null otherwise.
    pub palette: *mut NativePalette,
    pub bits_per_pixel: u8,
    pub bytes_per_pixel: u8,
    pub r_mask: u32,
    pub g_mask: u32,
    pub b_mask: u32,
    pub a_mask: u32,
    pub r_shift: u8,
    pub g_shift: u8,
    pub b_shift: u8,
    pub a_shift: u8,
    pub r_loss: u8,
    pub g_loss: u8,
    pub b_loss: u8,
    pub a_loss: u8,
    pub refcount: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub(crate) struct NativeSurface {
    /// MUST stay the first field; read at offset 0 by the release policy.
    pub flags: u32,
    pub format: *mut NativePixelFormat,
    pub w: c_int,
    pub h: c_int,
    /// Bytes per scan line, rounded up to a 4-byte boundary at creation.
    pub pitch: c_int,
    pub pixels: *mut u8,
    /// Lock counter; raw pixel access is only coherent while non-zero.
    pub locked: c_int,
    pub clip_rect: NativeRect,
    pub has_color_key: c_int,
    pub color_key: u32,
    pub color_mod: [u8; 3],
    pub alpha_mod: u8,
    pub blend_mode: u32,
    pub refcount: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub(crate) struct NativeCursor {
    pub hot_x: c_int,
    pub hot_y: c_int,
    pub w: c_int,
    pub h: c_int,
    /// `w * h * 4` bytes, one ARGB word per pixel, copied at creation.
    pub argb: *mut u8,
}

/// Blend mode tags stored in `NativeSurface.blend_mode`.
pub(crate) const BLEND_NONE: u32 = 0x0000_0000;
pub(crate) const BLEND_ALPHA: u32 = 0x0000_0001;
pub(crate) const BLEND_ADD: u32 = 0x0000_0002;
pub(crate) const BLEND_MOD: u32 = 0x0000_0004;

/// Zero-initialized single-struct allocation through the C allocator.
///
/// # Safety
/// The caller owns the returned memory and must release it with [`free`].
pub(crate) unsafe fn calloc_one<T>() -> *mut T {
    libc::calloc(1, std::mem::size_of::<T>()) as *mut T
}

/// Zero-initialized byte buffer through the C allocator.
///
/// # Safety
/// The caller owns the returned memory and must release it with [`free`].
pub(crate) unsafe fn calloc_bytes(len: usize) -> *mut u8 {
    // calloc(len, 1) keeps the overflow check on the C side
    libc::calloc(len.max(1), 1) as *mut u8
}

/// Releases memory obtained from [`calloc_one`] / [`calloc_bytes`].
///
/// # Safety
/// `ptr` must come from this module's allocators and not be freed twice.
pub(crate) unsafe fn free<T>(ptr: *mut T) {
    libc::free(ptr as *mut c_void);
}
