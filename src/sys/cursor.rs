// src/sys/cursor.rs

//! Color cursors and the process-wide active-cursor slot.
//!
//! The engine guarantees that the active cursor is never freed through
//! [`free_cursor`]; replacing or deactivating it first is the only way its
//! memory is ever released.

use libc::c_int;
use log::trace;
use once_cell::sync::Lazy;
use std::sync::Mutex;

use super::error::set_error;
use super::surface::read_pixel;
use super::{calloc_bytes, calloc_one, format, free, NativeCursor, NativeSurface};

/// Address of the active cursor, 0 when none.
static ACTIVE_CURSOR: Lazy<Mutex<usize>> = Lazy::new(|| Mutex::new(0));

/// Creates a cursor from an ARGB snapshot of `surf` with the given hot spot.
/// Null with the last error set when `surf` is null or memory runs out.
///
/// # Safety
/// `surf` must be null or a live surface.
pub(crate) unsafe fn create_color_cursor(
    surf: *mut NativeSurface,
    hot_x: c_int,
    hot_y: c_int,
) -> *mut NativeCursor {
    if surf.is_null() {
        set_error("cursor from null surface");
        return std::ptr::null_mut();
    }
    let w = (*surf).w;
    let h = (*surf).h;
    let argb = calloc_bytes(w as usize * h as usize * 4);
    if argb.is_null() {
        set_error("out of memory allocating cursor image");
        return std::ptr::null_mut();
    }
    let bytes_pp = (*(*surf).format).bytes_per_pixel;
    for y in 0..h {
        let row = super::surface::pixel_ptr_for_io(surf, y);
        for x in 0..w {
            let v = read_pixel(row.add(x as usize * bytes_pp as usize), bytes_pp);
            let (r, g, b, a) = format::unpack((*surf).format, v);
            let out = argb.add(((y * w + x) * 4) as usize);
            *out = b;
            *out.add(1) = g;
            *out.add(2) = r;
            *out.add(3) = a;
        }
    }
    let cur = calloc_one::<NativeCursor>();
    if cur.is_null() {
        free(argb);
        set_error("out of memory allocating cursor");
        return cur;
    }
    cur.write(NativeCursor {
        hot_x,
        hot_y,
        w,
        h,
        argb,
    });
    trace!("created {w}x{h} cursor {cur:p} (hot spot {hot_x},{hot_y})");
    cur
}

/// Makes `cur` the active cursor.
///
/// # Safety
/// `cur` must be a live cursor.
pub(crate) unsafe fn set_cursor(cur: *mut NativeCursor) {
    *ACTIVE_CURSOR.lock().unwrap() = cur as usize;
}

/// Clears the active-cursor slot.
pub(crate) fn clear_cursor() {
    *ACTIVE_CURSOR.lock().unwrap() = 0;
}

/// The active cursor's address, null when none.
pub(crate) fn active_cursor() -> *mut NativeCursor {
    *ACTIVE_CURSOR.lock().unwrap() as *mut NativeCursor
}

/// Frees a cursor. Freeing the active cursor is silently skipped: the
/// active cursor is never released through this call.
///
/// # Safety
/// `cur` must be null or a live cursor with no other user.
pub(crate) unsafe fn free_cursor(cur: *mut NativeCursor) {
    if cur.is_null() {
        return;
    }
    if cur as usize == *ACTIVE_CURSOR.lock().unwrap() {
        trace!("free_cursor({cur:p}) skipped: cursor is active");
        return;
    }
    trace!("freeing cursor {cur:p}");
    free((*cur).argb);
    free(cur);
}
