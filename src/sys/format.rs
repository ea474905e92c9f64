// src/sys/format.rs

//! Pixel-format allocation and the process-wide format cache.
//!
//! Non-indexed formats are shared: repeated allocations of the same encoding
//! return the same struct with its refcount bumped, so several surfaces (and
//! wrapper instances) may alias one native format address. Indexed formats
//! always get a dedicated allocation carrying an owned palette.

use std::collections::HashMap;
use std::sync::Mutex;

use libc::c_void;
use log::trace;
use once_cell::sync::Lazy;

use super::error::set_error;
use super::{calloc_bytes, calloc_one, free, NativePalette, NativePixelFormat};
use crate::pixels::{mask_shift_loss, PixelEncoding};

/// Encoding tag -> address of the shared format struct. Refcounts of cached
/// formats are only mutated while this lock is held.
static FORMAT_CACHE: Lazy<Mutex<HashMap<u32, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Allocates (or retrieves from the cache) the format struct for `enc`.
///
/// Returns null with the last error set for FOURCC encodings, which have no
/// per-pixel layout to describe.
///
/// # Safety
/// The returned pointer carries one refcount claim; balance it with
/// [`free_format`].
pub(crate) unsafe fn alloc_format(enc: PixelEncoding) -> *mut NativePixelFormat {
    if enc.is_fourcc() {
        set_error(format!("no pixel layout for FOURCC encoding {enc}"));
        return std::ptr::null_mut();
    }

    if !enc.is_indexed() {
        let mut cache = FORMAT_CACHE.lock().unwrap();
        if let Some(&addr) = cache.get(&enc.tag()) {
            let p = addr as *mut NativePixelFormat;
            (*p).refcount += 1;
            trace!("format cache hit for {enc} ({p:p})");
            return p;
        }
        let p = init_format(enc, std::ptr::null_mut());
        if !p.is_null() {
            cache.insert(enc.tag(), p as usize);
        }
        return p;
    }

    let palette = alloc_palette(256);
    if palette.is_null() {
        return std::ptr::null_mut();
    }
    init_format(enc, palette)
}

/// Adds one refcount claim to an existing format struct.
///
/// # Safety
/// `p` must be a live format struct from [`alloc_format`].
pub(crate) unsafe fn retain_format(p: *mut NativePixelFormat) {
    if p.is_null() {
        return;
    }
    if (*p).palette.is_null() {
        let _cache = FORMAT_CACHE.lock().unwrap();
        (*p).refcount += 1;
    } else {
        (*p).refcount += 1;
    }
}

/// Drops one refcount claim; frees the struct (and evicts it from the cache)
/// when the count reaches zero.
///
/// # Safety
/// `p` must be null or a live format struct with an outstanding claim.
pub(crate) unsafe fn free_format(p: *mut NativePixelFormat) {
    if p.is_null() {
        return;
    }
    if (*p).palette.is_null() {
        let mut cache = FORMAT_CACHE.lock().unwrap();
        (*p).refcount -= 1;
        if (*p).refcount > 0 {
            return;
        }
        cache.remove(&(*p).tag);
        drop(cache);
        trace!("freeing shared format {:p}", p);
        free(p);
    } else {
        (*p).refcount -= 1;
        if (*p).refcount > 0 {
            return;
        }
        trace!("freeing dedicated format {:p}", p);
        free_palette((*p).palette);
        free(p);
    }
}

/// Type-erased [`free_format`], the release routine handed to the generic
/// ownership policy.
///
/// # Safety
/// Same contract as [`free_format`].
pub(crate) unsafe fn free_format_erased(p: *mut c_void) {
    free_format(p as *mut NativePixelFormat);
}

unsafe fn init_format(enc: PixelEncoding, palette: *mut NativePalette) -> *mut NativePixelFormat {
    let p = calloc_one::<NativePixelFormat>();
    if p.is_null() {
        free_palette(palette);
        set_error("out of memory allocating pixel format");
        return p;
    }
    let masks = enc.masks();
    let (r_shift, r_loss) = mask_shift_loss(masks.r);
    let (g_shift, g_loss) = mask_shift_loss(masks.g);
    let (b_shift, b_loss) = mask_shift_loss(masks.b);
    let (a_shift, a_loss) = mask_shift_loss(masks.a);
    p.write(NativePixelFormat {
        tag: enc.tag(),
        palette,
        bits_per_pixel: enc.bits_per_pixel(),
        bytes_per_pixel: enc.bytes_per_pixel(),
        r_mask: masks.r,
        g_mask: masks.g,
        b_mask: masks.b,
        a_mask: masks.a,
        r_shift,
        g_shift,
        b_shift,
        a_shift,
        r_loss,
        g_loss,
        b_loss,
        a_loss,
        refcount: 1,
    });
    trace!("allocated format {enc} ({p:p})");
    p
}

/// Allocates a palette with `ncolors` entries, all opaque white (the engine's
/// convention for a fresh palette).
unsafe fn alloc_palette(ncolors: usize) -> *mut NativePalette {
    let colors = calloc_bytes(ncolors * 4);
    if colors.is_null() {
        set_error("out of memory allocating palette");
        return std::ptr::null_mut();
    }
    for i in 0..ncolors * 4 {
        *colors.add(i) = 0xFF;
    }
    let p = calloc_one::<NativePalette>();
    if p.is_null() {
        free(colors);
        set_error("out of memory allocating palette");
        return p;
    }
    p.write(NativePalette {
        ncolors: ncolors as libc::c_int,
        colors,
        refcount: 1,
    });
    p
}

unsafe fn free_palette(p: *mut NativePalette) {
    if p.is_null() {
        return;
    }
    (*p).refcount -= 1;
    if (*p).refcount > 0 {
        return;
    }
    free((*p).colors);
    free(p);
}

/// Unpacks a raw pixel value through `fmt` into full-range RGBA channels.
/// Palette formats look the index up; out-of-range indexes read opaque black.
///
/// # Safety
/// `fmt` must be a live format struct.
pub(crate) unsafe fn unpack(fmt: *const NativePixelFormat, value: u32) -> (u8, u8, u8, u8) {
    let palette = (*fmt).palette;
    if !palette.is_null() {
        let idx = value as usize;
        if idx >= (*palette).ncolors as usize {
            return (0, 0, 0, 255);
        }
        let c = (*palette).colors.add(idx * 4);
        return (*c, *c.add(1), *c.add(2), *c.add(3));
    }
    let masks = crate::pixels::ChannelMasks {
        r: (*fmt).r_mask,
        g: (*fmt).g_mask,
        b: (*fmt).b_mask,
        a: (*fmt).a_mask,
    };
    crate::pixels::unpack_channels(masks, value)
}

/// Packs full-range RGBA channels through `fmt` into a raw pixel value.
/// Palette formats map to the nearest palette entry by squared RGB distance.
///
/// # Safety
/// `fmt` must be a live format struct.
pub(crate) unsafe fn pack(fmt: *const NativePixelFormat, r: u8, g: u8, b: u8, a: u8) -> u32 {
    let palette = (*fmt).palette;
    if !palette.is_null() {
        let mut best = 0u32;
        let mut best_dist = u32::MAX;
        for idx in 0..(*palette).ncolors as usize {
            let c = (*palette).colors.add(idx * 4);
            let dr = *c as i32 - r as i32;
            let dg = *c.add(1) as i32 - g as i32;
            let db = *c.add(2) as i32 - b as i32;
            let dist = (dr * dr + dg * dg + db * db) as u32;
            if dist < best_dist {
                best_dist = dist;
                best = idx as u32;
                if dist == 0 {
                    break;
                }
            }
        }
        return best;
    }
    let masks = crate::pixels::ChannelMasks {
        r: (*fmt).r_mask,
        g: (*fmt).g_mask,
        b: (*fmt).b_mask,
        a: (*fmt).a_mask,
    };
    crate::pixels::pack_channels(masks, r, g, b, a)
}
