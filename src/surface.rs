// src/surface.rs

//! The pixel-buffer resource: a 2D image with a native pixel encoding.
//!
//! A `Surface` owns one counted claim on a native surface struct and funnels
//! every lifetime-ending operation through the ownership core in
//! `crate::resource`. The derived `PixelFormat` is cached per surface and
//! identity-stable for the surface's lifetime.
//!
//! The native engine is not thread-safe: callers must serialize access to a
//! given surface (the type is neither `Send` nor `Sync`, which enforces the
//! single-thread case for free).

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use libc::{c_int, c_void};
use log::debug;
use once_cell::unsync::OnceCell;

use crate::color::{Color, TRANSPARENT};
use crate::error::{Error, Result};
use crate::format::PixelFormat;
use crate::pixels::PixelEncoding;
use crate::rect::Rect;
use crate::resource::{NativeHandle, RefCountedResource, ResourceKind};
use crate::sys::{self, NativeRect, NativeSurface, SurfaceFlags};

mod lock;
#[cfg(test)]
mod tests;

/// How a surface's pixels combine with the destination when it is the blit
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Copy source over destination, alpha included.
    None,
    /// Alpha-composite source over destination.
    Blend,
    /// Add alpha-weighted source channels, saturating.
    Add,
    /// Multiply source and destination channels.
    Mod,
}

impl BlendMode {
    /// Readable name of the mode.
    pub fn name(self) -> &'static str {
        match self {
            BlendMode::None => "none",
            BlendMode::Blend => "blend",
            BlendMode::Add => "add",
            BlendMode::Mod => "mod",
        }
    }

    fn to_native(self) -> u32 {
        match self {
            BlendMode::None => sys::BLEND_NONE,
            BlendMode::Blend => sys::BLEND_ALPHA,
            BlendMode::Add => sys::BLEND_ADD,
            BlendMode::Mod => sys::BLEND_MOD,
        }
    }

    fn from_native(v: u32) -> Option<Self> {
        match v {
            sys::BLEND_NONE => Some(BlendMode::None),
            sys::BLEND_ALPHA => Some(BlendMode::Blend),
            sys::BLEND_ADD => Some(BlendMode::Add),
            sys::BLEND_MOD => Some(BlendMode::Mod),
            _ => None,
        }
    }
}

/// A 2D pixel buffer with a fixed encoding, dimensions, and pitch.
#[derive(Debug)]
pub struct Surface {
    resource: RefCountedResource,
    /// Lazily-created wrapper around the native struct's format member.
    /// Identity-stable: repeated access returns the same instance until the
    /// surface itself dies.
    format: OnceCell<PixelFormat>,
}

impl Surface {
    /// Creates a surface with zeroed pixels.
    ///
    /// FOURCC encodings cannot back a surface and fail with
    /// [`Error::UnsupportedFormat`]; a zero dimension is rejected by the
    /// engine and surfaces as [`Error::Resource`].
    pub fn new(width: u32, height: u32, encoding: PixelEncoding) -> Result<Self> {
        if encoding.is_fourcc() {
            return Err(Error::UnsupportedFormat(encoding));
        }
        // SAFETY: create_surface hands over one refcount claim (or null).
        let ptr = unsafe { sys::surface::create_surface(width as c_int, height as c_int, encoding) };
        Self::from_claimed(ptr)
    }

    /// Reads a BMP image from `stream`, which is left open: the caller
    /// supplied it, the caller closes it. Indexed images of depth < 8 are
    /// widened to the 8-bit indexed encoding.
    pub fn load<R: Read + Seek>(stream: &mut R) -> Result<Self> {
        // SAFETY: load_bmp hands over one refcount claim (or null).
        let ptr = unsafe { sys::bmp::load_bmp(stream) };
        if ptr.is_null() {
            return Err(Error::Decode(sys::error::last_error()));
        }
        Self::from_claimed(ptr)
    }

    /// Opens `path` and reads a BMP image from it. The file is owned here
    /// and closed before returning, whatever the outcome.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| Error::Decode(e.to_string()))?;
        Self::load(&mut file)
    }

    /// Writes the surface to `stream` as a BMP. The stream stays open; it
    /// must be seekable because the encoder patches the file length last.
    pub fn save<W: Write + Seek>(&self, stream: &mut W) -> Result<()> {
        // SAFETY: the resource keeps the surface alive for the call.
        let rc = unsafe { sys::bmp::save_bmp(self.raw(), stream) };
        if rc < 0 {
            return Err(Error::Encode(sys::error::last_error()));
        }
        Ok(())
    }

    /// Creates (truncating) `path` and writes the surface to it as a BMP.
    /// The file is owned here and closed before returning.
    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path).map_err(|e| Error::Encode(e.to_string()))?;
        self.save(&mut file)
    }

    /// Wraps a native surface pointer obtained elsewhere, taking a counted
    /// claim of its own (the engine-side count must cover it).
    ///
    /// # Safety
    /// `ptr` must be null or a live native surface; the engine's refcount
    /// for it must account for the claim this wrapper will drop.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Result<Self> {
        sys::surface::retain_surface(ptr as *mut NativeSurface);
        Self::from_claimed(ptr as *mut NativeSurface)
    }

    fn from_claimed(ptr: *mut NativeSurface) -> Result<Self> {
        let handle = NativeHandle::new(ptr.cast(), ResourceKind::Surface);
        Ok(Self {
            resource: RefCountedResource::acquire(handle)?,
            format: OnceCell::new(),
        })
    }

    pub(crate) fn raw(&self) -> *mut NativeSurface {
        self.resource.as_ptr().cast()
    }

    /// Width in pixels, fixed at creation.
    pub fn width(&self) -> u32 {
        unsafe { (*self.raw()).w as u32 }
    }

    /// Height in pixels, fixed at creation.
    pub fn height(&self) -> u32 {
        unsafe { (*self.raw()).h as u32 }
    }

    /// Bytes per scan line, engine-computed, fixed at creation.
    pub fn pitch(&self) -> u32 {
        unsafe { (*self.raw()).pitch as u32 }
    }

    /// `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// The full-surface rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    /// Total pixel-memory size, `pitch * height`.
    pub fn byte_size(&self) -> usize {
        self.pitch() as usize * self.height() as usize
    }

    /// The surface's pixel encoding.
    pub fn encoding(&self) -> PixelEncoding {
        let tag = unsafe { (*(*self.raw()).format).tag };
        PixelEncoding::from_tag(tag).expect("native surface carries an unknown format tag")
    }

    /// The surface's pixel format. Cached: repeated calls return the same
    /// instance for as long as the surface is alive.
    pub fn pixel_format(&self) -> Result<&PixelFormat> {
        self.format
            .get_or_try_init(|| PixelFormat::from_raw(unsafe { (*self.raw()).format }))
    }

    /// Allocates a new surface in `encoding` and translates every pixel into
    /// it.
    ///
    /// 1-/4-bit indexed encodings, the 10-10-10-2 packing, and FOURCC
    /// encodings are unsupported on either side. Converting *to* the 8-bit
    /// indexed encoding succeeds but fills the output with index 0; it is
    /// not a color-accurate conversion.
    pub fn convert(&self, encoding: PixelEncoding) -> Result<Surface> {
        let own = self.encoding();
        if !own.is_convertible() {
            return Err(Error::UnsupportedFormat(own));
        }
        if !encoding.is_convertible() {
            return Err(Error::UnsupportedFormat(encoding));
        }
        // SAFETY: the resource keeps the source alive; convert_surface hands
        // over one claim on the result (or null).
        let ptr = unsafe { sys::surface::convert_surface(self.raw(), encoding) };
        Self::from_claimed(ptr)
    }

    /// Copies the surface through a conversion to its own encoding.
    pub fn convert_to_own_format(&self) -> Result<Surface> {
        self.convert(self.encoding())
    }

    /// Reads the raw pixel value at (`x`, `y`).
    ///
    /// Bounds-checked; runs inside the scoped lock because RLE-accelerated
    /// surfaces keep a decode cache that is only coherent while locked.
    pub fn pixel(&self, x: i32, y: i32) -> Result<u32> {
        let (width, height) = self.size();
        if x < 0 || x as u32 >= width || y < 0 || y as u32 >= height {
            return Err(Error::OutOfRange {
                x,
                y,
                width,
                height,
            });
        }
        self.with_lock(|s| {
            let raw = s.raw();
            // SAFETY: the coordinates were bounds-checked above and the lock
            // guarantees a coherent view of pixel memory; 1/2/4-byte pixels
            // read directly, 3-byte pixels assemble a little-endian word.
            unsafe {
                let bytes_pp = (*(*raw).format).bytes_per_pixel;
                let ptr = (*raw)
                    .pixels
                    .offset(((*raw).pitch * y + bytes_pp as c_int * x) as isize);
                Ok(sys::surface::read_pixel(ptr, bytes_pp))
            }
        })
    }

    /// Reads the pixel at (`x`, `y`) as a structured color, unpacked through
    /// the surface's format.
    pub fn pixel_color(&self, x: i32, y: i32) -> Result<Color> {
        let value = self.pixel(x, y)?;
        Ok(self.pixel_format()?.unpack_pixel(value))
    }

    /// Fills `rect` (default: the clip rectangle) with `color` (default:
    /// transparent black). The color is packed through the surface's format
    /// before the native fill.
    pub fn fill(&mut self, rect: Option<Rect>, color: Option<Color>) -> Result<()> {
        let value = self
            .pixel_format()?
            .pack_color(color.unwrap_or(TRANSPARENT));
        // SAFETY: the resource keeps the surface alive for the call.
        let rc = unsafe { sys::surface::fill_rect(self.raw(), rect.map(to_native), value) };
        if rc < 0 {
            return Err(Error::native());
        }
        Ok(())
    }

    /// Fills the full-bounds rectangle with transparent black. Like every
    /// fill, the engine still clips it against the clip rectangle.
    pub fn clear(&mut self) -> Result<()> {
        self.fill(Some(self.bounds()), Some(TRANSPARENT))
    }

    /// Copies a region of `source` into this surface.
    ///
    /// `from` defaults to all of `source`; `to` defaults to the origin (or,
    /// when `scale` is set, to the entire destination, with nearest-neighbor
    /// scaling). Fails with [`Error::NativeOperation`] when the engine
    /// refuses, e.g. while either surface is locked.
    pub fn blit(
        &mut self,
        source: &Surface,
        from: Option<Rect>,
        to: Option<Rect>,
        scale: bool,
    ) -> Result<()> {
        let from = from.map(to_native);
        let to = to.map(to_native);
        // SAFETY: both resources keep their surfaces alive for the call.
        let rc = unsafe {
            if scale {
                sys::surface::blit_scaled(source.raw(), from, self.raw(), to)
            } else {
                sys::surface::blit(source.raw(), from, self.raw(), to)
            }
        };
        if rc < 0 {
            return Err(Error::native());
        }
        Ok(())
    }

    /// The current clip rectangle.
    pub fn clip(&self) -> Rect {
        let r = unsafe { (*self.raw()).clip_rect };
        Rect::new(r.x, r.y, r.w.max(0) as u32, r.h.max(0) as u32)
    }

    /// Replaces the clip rectangle; `None` restores the full bounds. Fails
    /// with [`Error::OutOfRange`] when the rectangle does not intersect the
    /// surface at all.
    pub fn set_clip(&mut self, rect: Option<Rect>) -> Result<()> {
        // SAFETY: the resource keeps the surface alive for the call.
        let accepted = unsafe { sys::surface::set_clip_rect(self.raw(), rect.map(to_native)) };
        if !accepted {
            let r = rect.unwrap_or_default();
            return Err(Error::OutOfRange {
                x: r.x,
                y: r.y,
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(())
    }

    /// The color key as a structured color, `None` when unset.
    pub fn color_key(&self) -> Result<Option<Color>> {
        if !self.has_color_key() {
            return Ok(None);
        }
        let value = unsafe { (*self.raw()).color_key };
        Ok(Some(self.pixel_format()?.unpack_pixel(value)))
    }

    /// Sets (`Some`) or clears (`None`) the color key, the pixel value
    /// excluded from blits out of this surface.
    pub fn set_color_key(&mut self, color: Option<Color>) -> Result<()> {
        let rc = match color {
            Some(c) => {
                let value = self.pixel_format()?.pack_color(c);
                // SAFETY: the resource keeps the surface alive for the call.
                unsafe { sys::surface::set_color_key(self.raw(), true, value) }
            }
            None => unsafe { sys::surface::set_color_key(self.raw(), false, 0) },
        };
        if rc < 0 {
            return Err(Error::native());
        }
        Ok(())
    }

    /// Whether a color key is set.
    pub fn has_color_key(&self) -> bool {
        unsafe { (*self.raw()).has_color_key != 0 }
    }

    /// The per-blit alpha modulation, 0–255.
    pub fn alpha_mod(&self) -> u8 {
        unsafe { (*self.raw()).alpha_mod }
    }

    pub fn set_alpha_mod(&mut self, alpha: u8) -> Result<()> {
        let rc = unsafe { sys::surface::set_alpha_mod(self.raw(), alpha) };
        if rc < 0 {
            return Err(Error::native());
        }
        Ok(())
    }

    /// The per-blit color modulation, one factor per channel.
    pub fn color_mod(&self) -> (u8, u8, u8) {
        let m = unsafe { (*self.raw()).color_mod };
        (m[0], m[1], m[2])
    }

    pub fn set_color_mod(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        let rc = unsafe { sys::surface::set_color_mod(self.raw(), r, g, b) };
        if rc < 0 {
            return Err(Error::native());
        }
        Ok(())
    }

    /// The blend mode applied when this surface is the blit source.
    pub fn blend_mode(&self) -> BlendMode {
        let mode = unsafe { (*self.raw()).blend_mode };
        BlendMode::from_native(mode).expect("engine stored an unknown blend mode")
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) -> Result<()> {
        let rc = unsafe { sys::surface::set_blend_mode(self.raw(), mode.to_native()) };
        if rc < 0 {
            return Err(Error::native());
        }
        Ok(())
    }

    /// Whether run-length acceleration is requested for this surface.
    pub fn rle(&self) -> bool {
        let flags = unsafe { SurfaceFlags::from_bits_retain((*self.raw()).flags) };
        flags.contains(SurfaceFlags::RLE_ACCEL)
    }

    /// Requests or clears run-length acceleration. While set, raw pixel
    /// access is only valid inside [`with_lock`](Self::with_lock).
    pub fn set_rle(&mut self, enable: bool) -> Result<()> {
        let rc = unsafe { sys::surface::set_rle(self.raw(), enable) };
        if rc < 0 {
            return Err(Error::native());
        }
        debug!("surface {:p} RLE acceleration set to {enable}", self.raw());
        Ok(())
    }
}

/// Wrapper identity is native identity: two surfaces are equal when they
/// alias the same native struct.
impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.raw(), other.raw())
    }
}

fn to_native(r: Rect) -> NativeRect {
    NativeRect {
        x: r.x,
        y: r.y,
        w: r.w as c_int,
        h: r.h as c_int,
    }
}
