// src/sys/surface.rs

//! Surface creation, destruction, locking, and the pixel operations
//! (fill / blit / convert / clip / key / modulation / RLE).
//!
//! All functions follow the engine's C conventions: raw pointers in, null or
//! a negative `c_int` out on failure, with the per-thread last error set.

use libc::c_int;
use log::{debug, trace};

use super::error::set_error;
use super::{
    calloc_bytes, calloc_one, format, free, NativeRect, NativeSurface, SurfaceFlags, BLEND_ADD,
    BLEND_ALPHA, BLEND_MOD, BLEND_NONE,
};
use crate::pixels::PixelEncoding;

/// Creates a zero-filled surface. Null with the last error set when the
/// dimensions are not positive, the encoding is FOURCC, or memory runs out.
///
/// # Safety
/// The returned surface carries one refcount claim; balance it with
/// [`free_surface`].
pub(crate) unsafe fn create_surface(w: c_int, h: c_int, enc: PixelEncoding) -> *mut NativeSurface {
    if w <= 0 || h <= 0 {
        set_error(format!("surface dimensions must be positive, got {w}x{h}"));
        return std::ptr::null_mut();
    }
    if enc.is_fourcc() {
        set_error(format!("cannot create a surface with FOURCC encoding {enc}"));
        return std::ptr::null_mut();
    }
    let fmt = format::alloc_format(enc);
    if fmt.is_null() {
        return std::ptr::null_mut();
    }

    let bytes_pp = (*fmt).bytes_per_pixel as c_int;
    let pitch = (w * bytes_pp + 3) & !3;
    let pixels = calloc_bytes(pitch as usize * h as usize);
    if pixels.is_null() {
        format::free_format(fmt);
        set_error("out of memory allocating pixel memory");
        return std::ptr::null_mut();
    }

    let surf = calloc_one::<NativeSurface>();
    if surf.is_null() {
        free(pixels);
        format::free_format(fmt);
        set_error("out of memory allocating surface");
        return surf;
    }
    surf.write(NativeSurface {
        flags: SurfaceFlags::empty().bits(),
        format: fmt,
        w,
        h,
        pitch,
        pixels,
        locked: 0,
        clip_rect: NativeRect { x: 0, y: 0, w, h },
        has_color_key: 0,
        color_key: 0,
        color_mod: [255, 255, 255],
        alpha_mod: 255,
        // alpha-capable surfaces composite by default, opaque ones copy
        blend_mode: if enc.has_alpha() { BLEND_ALPHA } else { BLEND_NONE },
        refcount: 1,
    });
    debug!("created {w}x{h} {enc} surface {surf:p} (pitch {pitch})");
    surf
}

/// Drops one refcount claim and deallocates at zero.
///
/// A surface flagged `DONT_FREE` is owned by another entity: the call returns
/// immediately and does NOT touch the refcount; callers holding a counted
/// claim on such a surface must decrement it themselves.
///
/// # Safety
/// `p` must be null or a live surface with an outstanding claim.
pub(crate) unsafe fn free_surface(p: *mut NativeSurface) {
    if p.is_null() {
        return;
    }
    if SurfaceFlags::from_bits_retain((*p).flags).contains(SurfaceFlags::DONT_FREE) {
        trace!("free_surface({p:p}) skipped: DONT_FREE is set");
        return;
    }
    (*p).refcount -= 1;
    if (*p).refcount > 0 {
        return;
    }
    trace!("freeing surface {p:p}");
    format::free_format((*p).format);
    if !SurfaceFlags::from_bits_retain((*p).flags).contains(SurfaceFlags::PREALLOCATED) {
        free((*p).pixels);
    }
    free(p);
}

/// Adds one refcount claim to an existing surface.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn retain_surface(p: *mut NativeSurface) {
    if !p.is_null() {
        (*p).refcount += 1;
    }
}

/// Locks the surface for raw pixel access. Locks nest by counting.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn lock_surface(p: *mut NativeSurface) -> c_int {
    if p.is_null() {
        set_error("lock on null surface");
        return -1;
    }
    (*p).locked += 1;
    0
}

/// Releases one lock claim; never underflows.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn unlock_surface(p: *mut NativeSurface) {
    if !p.is_null() && (*p).locked > 0 {
        (*p).locked -= 1;
    }
}

/// Address of the pixel at (`x`, `y`). No bounds check.
unsafe fn pixel_ptr(s: *const NativeSurface, x: c_int, y: c_int) -> *mut u8 {
    let bytes_pp = (*(*s).format).bytes_per_pixel as c_int;
    (*s).pixels.offset(((*s).pitch * y + bytes_pp * x) as isize)
}

/// Address of the first pixel of row `y`, for codec row I/O. No bounds check.
///
/// # Safety
/// `s` must be a live surface and `y` a valid row.
pub(crate) unsafe fn pixel_ptr_for_io(s: *const NativeSurface, y: c_int) -> *mut u8 {
    (*s).pixels.offset(((*s).pitch * y) as isize)
}

/// Reads a raw pixel value of `bytes_pp` bytes, little-endian. Three-byte
/// pixels are assembled into the low bytes of the word.
///
/// # Safety
/// `ptr` must be readable for `bytes_pp` bytes.
pub(crate) unsafe fn read_pixel(ptr: *const u8, bytes_pp: u8) -> u32 {
    match bytes_pp {
        1 => *ptr as u32,
        2 => u16::from_le_bytes([*ptr, *ptr.add(1)]) as u32,
        3 => u32::from_le_bytes([*ptr, *ptr.add(1), *ptr.add(2), 0]),
        _ => u32::from_le_bytes([*ptr, *ptr.add(1), *ptr.add(2), *ptr.add(3)]),
    }
}

/// Writes a raw pixel value of `bytes_pp` bytes, little-endian.
///
/// # Safety
/// `ptr` must be writable for `bytes_pp` bytes.
pub(crate) unsafe fn write_pixel(ptr: *mut u8, bytes_pp: u8, value: u32) {
    let bytes = value.to_le_bytes();
    for (i, b) in bytes.iter().enumerate().take(bytes_pp as usize) {
        *ptr.add(i) = *b;
    }
}

fn full_rect(w: c_int, h: c_int) -> NativeRect {
    NativeRect { x: 0, y: 0, w, h }
}

fn intersect(a: NativeRect, b: NativeRect) -> Option<NativeRect> {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.w).min(b.x + b.w);
    let y2 = (a.y + a.h).min(b.y + b.h);
    if x1 < x2 && y1 < y2 {
        Some(NativeRect {
            x: x1,
            y: y1,
            w: x2 - x1,
            h: y2 - y1,
        })
    } else {
        None
    }
}

/// Fills `rect` (default: the clip rectangle) with a raw pixel value. The
/// rectangle is clipped against the clip rectangle; an empty intersection is
/// a successful no-op.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn fill_rect(p: *mut NativeSurface, rect: Option<NativeRect>, value: u32) -> c_int {
    if p.is_null() {
        set_error("fill on null surface");
        return -1;
    }
    let clip = (*p).clip_rect;
    let rect = match intersect(rect.unwrap_or(clip), clip) {
        Some(r) => r,
        None => return 0,
    };
    let bytes_pp = (*(*p).format).bytes_per_pixel;
    for y in rect.y..rect.y + rect.h {
        let mut ptr = pixel_ptr(p, rect.x, y);
        for _ in 0..rect.w {
            write_pixel(ptr, bytes_pp, value);
            ptr = ptr.add(bytes_pp as usize);
        }
    }
    0
}

/// One source pixel pushed through color key, modulation, and the source
/// surface's blend mode onto the destination pixel.
unsafe fn composite_pixel(
    src: *const NativeSurface,
    dst: *const NativeSurface,
    sval: u32,
    dptr: *mut u8,
) {
    let sfmt = (*src).format;
    let dfmt = (*dst).format;
    let (mut r, mut g, mut b, mut a) = format::unpack(sfmt, sval);
    let [mr, mg, mb] = (*src).color_mod;
    let ma = (*src).alpha_mod;
    r = ((r as u32 * mr as u32) / 255) as u8;
    g = ((g as u32 * mg as u32) / 255) as u8;
    b = ((b as u32 * mb as u32) / 255) as u8;
    a = ((a as u32 * ma as u32) / 255) as u8;

    let dbytes = (*dfmt).bytes_per_pixel;
    let out = match (*src).blend_mode {
        BLEND_ALPHA => {
            let (dr, dg, db, da) = format::unpack(dfmt, read_pixel(dptr, dbytes));
            let sa = a as u32;
            let blend = |s: u8, d: u8| -> u8 {
                ((s as u32 * sa + d as u32 * (255 - sa)) / 255) as u8
            };
            let oa = (sa + da as u32 * (255 - sa) / 255).min(255) as u8;
            (blend(r, dr), blend(g, dg), blend(b, db), oa)
        }
        BLEND_ADD => {
            let (dr, dg, db, da) = format::unpack(dfmt, read_pixel(dptr, dbytes));
            let add = |s: u8, d: u8| -> u8 {
                (d as u32 + s as u32 * a as u32 / 255).min(255) as u8
            };
            (add(r, dr), add(g, dg), add(b, db), da)
        }
        BLEND_MOD => {
            let (dr, dg, db, da) = format::unpack(dfmt, read_pixel(dptr, dbytes));
            let md = |s: u8, d: u8| -> u8 { ((s as u32 * d as u32) / 255) as u8 };
            (md(r, dr), md(g, dg), md(b, db), da)
        }
        _ => (r, g, b, a),
    };
    write_pixel(dptr, dbytes, format::pack(dfmt, out.0, out.1, out.2, out.3));
}

unsafe fn check_blit_pair(src: *const NativeSurface, dst: *const NativeSurface) -> c_int {
    if src.is_null() || dst.is_null() {
        set_error("blit with null surface");
        return -1;
    }
    if src == dst {
        set_error("blit source and destination must differ");
        return -1;
    }
    if (*src).locked != 0 || (*dst).locked != 0 {
        set_error("surfaces must not be locked during blit");
        return -1;
    }
    0
}

/// Copies `src_rect` (default: all of `src`) to `dst` at `dst_rect`'s origin
/// (default: the destination origin), clipped against the destination clip
/// rectangle. Fails when either surface is locked.
///
/// # Safety
/// Both surfaces must be live; they may not alias.
pub(crate) unsafe fn blit(
    src: *mut NativeSurface,
    src_rect: Option<NativeRect>,
    dst: *mut NativeSurface,
    dst_rect: Option<NativeRect>,
) -> c_int {
    if check_blit_pair(src, dst) < 0 {
        return -1;
    }
    let sb = full_rect((*src).w, (*src).h);
    let sr = match intersect(src_rect.unwrap_or(sb), sb) {
        Some(r) => r,
        None => return 0,
    };
    let (ox, oy) = dst_rect.map_or((0, 0), |r| (r.x, r.y));
    let sbytes = (*(*src).format).bytes_per_pixel;
    let keyed = (*src).has_color_key != 0;
    for row in 0..sr.h {
        for col in 0..sr.w {
            let dx = ox + col;
            let dy = oy + row;
            if intersect(
                NativeRect { x: dx, y: dy, w: 1, h: 1 },
                (*dst).clip_rect,
            )
            .is_none()
            {
                continue;
            }
            let sval = read_pixel(pixel_ptr(src, sr.x + col, sr.y + row), sbytes);
            if keyed && sval == (*src).color_key {
                continue;
            }
            composite_pixel(src, dst, sval, pixel_ptr(dst, dx, dy));
        }
    }
    0
}

/// Scaled copy from `src_rect` (default: all of `src`) onto `dst_rect`
/// (default: all of `dst`), nearest-neighbor. Fails when either surface is
/// locked.
///
/// # Safety
/// Both surfaces must be live; they may not alias.
pub(crate) unsafe fn blit_scaled(
    src: *mut NativeSurface,
    src_rect: Option<NativeRect>,
    dst: *mut NativeSurface,
    dst_rect: Option<NativeRect>,
) -> c_int {
    if check_blit_pair(src, dst) < 0 {
        return -1;
    }
    let sb = full_rect((*src).w, (*src).h);
    let sr = match intersect(src_rect.unwrap_or(sb), sb) {
        Some(r) => r,
        None => return 0,
    };
    let dr = dst_rect.unwrap_or_else(|| full_rect((*dst).w, (*dst).h));
    if dr.w <= 0 || dr.h <= 0 {
        return 0;
    }
    let sbytes = (*(*src).format).bytes_per_pixel;
    let keyed = (*src).has_color_key != 0;
    for row in 0..dr.h {
        for col in 0..dr.w {
            let dx = dr.x + col;
            let dy = dr.y + row;
            if intersect(
                NativeRect { x: dx, y: dy, w: 1, h: 1 },
                (*dst).clip_rect,
            )
            .is_none()
            {
                continue;
            }
            let sx = sr.x + (col * sr.w) / dr.w;
            let sy = sr.y + (row * sr.h) / dr.h;
            let sval = read_pixel(pixel_ptr(src, sx, sy), sbytes);
            if keyed && sval == (*src).color_key {
                continue;
            }
            composite_pixel(src, dst, sval, pixel_ptr(dst, dx, dy));
        }
    }
    0
}

/// Allocates a new surface in `enc` and translates every pixel of `src` into
/// it. Sub-byte indexed encodings, the 10-10-10-2 packing, and FOURCC
/// encodings are rejected on either side. A conversion *to* the 8-bit indexed
/// encoding allocates the surface and leaves every pixel at index 0.
///
/// # Safety
/// `src` must be a live surface.
pub(crate) unsafe fn convert_surface(src: *mut NativeSurface, enc: PixelEncoding) -> *mut NativeSurface {
    if src.is_null() {
        set_error("convert of null surface");
        return std::ptr::null_mut();
    }
    let src_enc = match PixelEncoding::from_tag((*(*src).format).tag) {
        Some(e) => e,
        None => {
            set_error("source surface carries an unknown format tag");
            return std::ptr::null_mut();
        }
    };
    if !src_enc.is_convertible() || !enc.is_convertible() {
        set_error(format!("cannot convert {src_enc} to {enc}"));
        return std::ptr::null_mut();
    }
    let dst = create_surface((*src).w, (*src).h, enc);
    if dst.is_null() {
        return dst;
    }
    if enc == PixelEncoding::Index8 {
        // no color mapping onto a fresh palette: the output stays at index 0
        debug!("convert {src:p} -> {enc}: non-semantic conversion, output left at index 0");
        return dst;
    }
    let sbytes = (*(*src).format).bytes_per_pixel;
    let dbytes = (*(*dst).format).bytes_per_pixel;
    for y in 0..(*src).h {
        for x in 0..(*src).w {
            let sval = read_pixel(pixel_ptr(src, x, y), sbytes);
            let (r, g, b, a) = format::unpack((*src).format, sval);
            let dval = format::pack((*dst).format, r, g, b, a);
            write_pixel(pixel_ptr(dst, x, y), dbytes, dval);
        }
    }
    dst
}

/// Replaces the clip rectangle. A null rectangle restores the full bounds.
/// Stores the intersection with the bounds and reports whether it is
/// non-empty.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn set_clip_rect(p: *mut NativeSurface, rect: Option<NativeRect>) -> bool {
    let bounds = full_rect((*p).w, (*p).h);
    match rect {
        None => {
            (*p).clip_rect = bounds;
            true
        }
        Some(r) => match intersect(r, bounds) {
            Some(i) => {
                (*p).clip_rect = i;
                true
            }
            None => {
                (*p).clip_rect = NativeRect::default();
                false
            }
        },
    }
}

/// Sets or clears the color key (a raw pixel value excluded from blits).
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn set_color_key(p: *mut NativeSurface, enable: bool, value: u32) -> c_int {
    if p.is_null() {
        set_error("color key on null surface");
        return -1;
    }
    (*p).has_color_key = enable as c_int;
    (*p).color_key = if enable { value } else { 0 };
    0
}

/// Sets the per-blit alpha modulation.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn set_alpha_mod(p: *mut NativeSurface, alpha: u8) -> c_int {
    if p.is_null() {
        set_error("alpha mod on null surface");
        return -1;
    }
    (*p).alpha_mod = alpha;
    0
}

/// Sets the per-blit color modulation.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn set_color_mod(p: *mut NativeSurface, r: u8, g: u8, b: u8) -> c_int {
    if p.is_null() {
        set_error("color mod on null surface");
        return -1;
    }
    (*p).color_mod = [r, g, b];
    0
}

/// Sets the blend mode applied when this surface is the blit source.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn set_blend_mode(p: *mut NativeSurface, mode: u32) -> c_int {
    if p.is_null() {
        set_error("blend mode on null surface");
        return -1;
    }
    match mode {
        BLEND_NONE | BLEND_ALPHA | BLEND_ADD | BLEND_MOD => {
            (*p).blend_mode = mode;
            0
        }
        _ => {
            set_error(format!("unknown blend mode {mode:#x}"));
            -1
        }
    }
}

/// Sets or clears the run-length-acceleration flag.
///
/// # Safety
/// `p` must be a live surface.
pub(crate) unsafe fn set_rle(p: *mut NativeSurface, enable: bool) -> c_int {
    if p.is_null() {
        set_error("RLE flag on null surface");
        return -1;
    }
    let mut flags = SurfaceFlags::from_bits_retain((*p).flags);
    flags.set(SurfaceFlags::RLE_ACCEL, enable);
    (*p).flags = flags.bits();
    0
}
