// src/format.rs

//! The `PixelFormat` wrapper: memory layout of one pixel, pack/unpack between
//! raw pixel values and structured colors, and palette access for indexed
//! encodings.
//!
//! A format is itself a refcounted native resource: the engine serves
//! non-indexed formats from a shared cache, so several surfaces (and their
//! wrappers) may alias one native format struct. Each wrapper holds its own
//! counted claim; the struct is treated as immutable apart from the palette
//! colors.

use crate::color::Color;
use crate::error::{Error, Result};
use crate::pixels::{pack_channels, unpack_channels, ChannelMasks, PixelEncoding};
use crate::resource::{NativeHandle, RefCountedResource, ResourceKind};
use crate::sys::{self, NativePixelFormat};

/// Describes the memory layout of one pixel and converts between raw pixel
/// values and [`Color`]s.
#[derive(Debug)]
pub struct PixelFormat {
    resource: RefCountedResource,
}

impl PixelFormat {
    /// Allocates (or retrieves from the engine's cache) the format for
    /// `encoding`. FOURCC encodings have no per-pixel layout and fail with
    /// [`Error::UnsupportedFormat`].
    pub fn new(encoding: PixelEncoding) -> Result<Self> {
        if encoding.is_fourcc() {
            return Err(Error::UnsupportedFormat(encoding));
        }
        // SAFETY: alloc_format returns either null or a struct carrying one
        // claim, which the resource below takes over.
        let ptr = unsafe { sys::format::alloc_format(encoding) };
        Self::from_claimed(ptr)
    }

    /// Wraps a format struct some other entity already points at (e.g. a
    /// surface's format member), taking a claim of its own so the struct
    /// outlives whichever of the two dies first.
    pub(crate) fn from_raw(ptr: *mut NativePixelFormat) -> Result<Self> {
        // SAFETY: retain is a no-op on null; a non-null ptr is a live struct
        // owned by the caller's aliasing entity.
        unsafe { sys::format::retain_format(ptr) };
        Self::from_claimed(ptr)
    }

    fn from_claimed(ptr: *mut NativePixelFormat) -> Result<Self> {
        let handle = NativeHandle::new(
            ptr.cast(),
            ResourceKind::Other(sys::format::free_format_erased),
        );
        Ok(Self {
            resource: RefCountedResource::acquire(handle)?,
        })
    }

    fn raw(&self) -> *mut NativePixelFormat {
        self.resource.as_ptr().cast()
    }

    /// The encoding this format describes.
    pub fn encoding(&self) -> PixelEncoding {
        // SAFETY: the resource keeps the struct alive; the tag is written
        // once at allocation.
        let tag = unsafe { (*self.raw()).tag };
        PixelEncoding::from_tag(tag).expect("native format carries an unknown tag")
    }

    pub fn bits_per_pixel(&self) -> u8 {
        unsafe { (*self.raw()).bits_per_pixel }
    }

    pub fn bytes_per_pixel(&self) -> u8 {
        unsafe { (*self.raw()).bytes_per_pixel }
    }

    /// The four channel masks. All zero for indexed encodings.
    pub fn masks(&self) -> ChannelMasks {
        let f = self.raw();
        // SAFETY: the resource keeps the struct alive; masks are immutable.
        unsafe {
            ChannelMasks {
                r: (*f).r_mask,
                g: (*f).g_mask,
                b: (*f).b_mask,
                a: (*f).a_mask,
            }
        }
    }

    pub fn has_alpha(&self) -> bool {
        self.masks().a != 0
    }

    /// Whether pixel values are palette indexes.
    pub fn is_indexed(&self) -> bool {
        unsafe { !(*self.raw()).palette.is_null() }
    }

    /// Packs a color into a raw pixel value. Pure bit arithmetic on the
    /// stored masks; indexed formats map to the nearest palette entry by
    /// squared RGB distance.
    pub fn pack_color(&self, color: Color) -> u32 {
        if self.is_indexed() {
            return self.nearest_index(color);
        }
        pack_channels(self.masks(), color.r, color.g, color.b, color.a)
    }

    /// Unpacks a raw pixel value into a color. Channels narrower than 8 bits
    /// widen by bit replication, so packing the result again restores the
    /// exact pixel value; a missing alpha channel reads 255. Indexed formats
    /// look the palette up (out-of-range indexes read opaque black).
    pub fn unpack_pixel(&self, value: u32) -> Color {
        if self.is_indexed() {
            return self.palette_entry(value as usize).unwrap_or(Color::rgb(0, 0, 0));
        }
        let (r, g, b, a) = unpack_channels(self.masks(), value);
        Color::new(r, g, b, a)
    }

    /// The palette colors. Fails with [`Error::NotIndexed`] on non-indexed
    /// formats.
    pub fn palette(&self) -> Result<Vec<Color>> {
        let pal = self.palette_ptr()?;
        // SAFETY: the palette is owned by the format struct and sized
        // ncolors * 4.
        unsafe {
            let n = (*pal).ncolors as usize;
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                let c = (*pal).colors.add(i * 4);
                out.push(Color::new(*c, *c.add(1), *c.add(2), *c.add(3)));
            }
            Ok(out)
        }
    }

    /// Replaces the leading palette entries with `colors`. Fails with
    /// [`Error::NotIndexed`] on non-indexed formats; entries beyond the
    /// palette length are ignored.
    pub fn set_palette(&self, colors: &[Color]) -> Result<()> {
        let pal = self.palette_ptr()?;
        // SAFETY: as above; palette colors are the one mutable part of a
        // format struct.
        unsafe {
            let n = ((*pal).ncolors as usize).min(colors.len());
            for (i, color) in colors.iter().take(n).enumerate() {
                let c = (*pal).colors.add(i * 4);
                *c = color.r;
                *c.add(1) = color.g;
                *c.add(2) = color.b;
                *c.add(3) = color.a;
            }
        }
        Ok(())
    }

    fn palette_ptr(&self) -> Result<*mut sys::NativePalette> {
        let pal = unsafe { (*self.raw()).palette };
        if pal.is_null() {
            return Err(Error::NotIndexed(self.encoding()));
        }
        Ok(pal)
    }

    fn palette_entry(&self, index: usize) -> Option<Color> {
        let pal = self.palette_ptr().ok()?;
        unsafe {
            if index >= (*pal).ncolors as usize {
                return None;
            }
            let c = (*pal).colors.add(index * 4);
            Some(Color::new(*c, *c.add(1), *c.add(2), *c.add(3)))
        }
    }

    fn nearest_index(&self, color: Color) -> u32 {
        let Ok(palette) = self.palette() else {
            return 0;
        };
        let mut best = 0;
        let mut best_dist = u32::MAX;
        for (i, entry) in palette.iter().enumerate() {
            let dr = entry.r as i32 - color.r as i32;
            let dg = entry.g as i32 - color.g as i32;
            let db = entry.b as i32 - color.b as i32;
            let dist = (dr * dr + dg * dg + db * db) as u32;
            if dist < best_dist {
                best_dist = dist;
                best = i as u32;
                if dist == 0 {
                    break;
                }
            }
        }
        best
    }
}

/// Wrapper identity is native identity: two formats are equal when they alias
/// the same native struct.
impl PartialEq for PixelFormat {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.raw(), other.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_all(encoding: PixelEncoding, values: impl Iterator<Item = u32>) {
        let fmt = PixelFormat::new(encoding).unwrap();
        for v in values {
            let packed = fmt.pack_color(fmt.unpack_pixel(v));
            assert_eq!(packed, v, "{encoding} round trip failed for {v:#010x}");
        }
    }

    #[test]
    fn it_should_round_trip_every_one_byte_pixel() {
        round_trip_all(PixelEncoding::Rgb332, 0..=0xFFu32);
    }

    #[test]
    fn it_should_round_trip_every_two_byte_pixel() {
        round_trip_all(PixelEncoding::Rgb565, 0..=0xFFFFu32);
    }

    #[test]
    fn it_should_round_trip_three_byte_pixels() {
        let samples = (0..=0xFF_FFFFu32).step_by(4099).chain([0, 0xFF_FFFF]);
        round_trip_all(PixelEncoding::Bgr24, samples);
    }

    #[test]
    fn it_should_round_trip_four_byte_pixels() {
        let samples = [
            0x0000_0000,
            0xFFFF_FFFF,
            0x8040_20FF,
            0x0102_0304,
            0xDEAD_BEEF,
        ];
        round_trip_all(PixelEncoding::Argb8888, samples.into_iter());
    }

    #[test]
    fn it_should_pack_saturated_channels_into_their_masks() {
        let fmt = PixelFormat::new(PixelEncoding::Rgb565).unwrap();
        assert_eq!(fmt.pack_color(Color::rgb(255, 0, 0)), 0xF800);
        assert_eq!(fmt.pack_color(Color::rgb(0, 255, 0)), 0x07E0);
        assert_eq!(fmt.pack_color(Color::rgb(0, 0, 255)), 0x001F);
    }

    #[test]
    fn it_should_read_a_missing_alpha_channel_as_opaque() {
        let fmt = PixelFormat::new(PixelEncoding::Rgb565).unwrap();
        assert_eq!(fmt.unpack_pixel(0).a, 255);
    }

    #[test]
    fn it_should_refuse_palette_access_on_non_indexed_formats() {
        let fmt = PixelFormat::new(PixelEncoding::Argb8888).unwrap();
        assert!(matches!(
            fmt.palette(),
            Err(Error::NotIndexed(PixelEncoding::Argb8888))
        ));
        assert!(matches!(fmt.set_palette(&[]), Err(Error::NotIndexed(_))));
    }

    #[test]
    fn it_should_map_colors_onto_the_palette() {
        let fmt = PixelFormat::new(PixelEncoding::Index8).unwrap();
        fmt.set_palette(&[
            Color::rgb(0, 0, 0),
            Color::rgb(255, 0, 0),
            Color::rgb(0, 255, 0),
        ])
        .unwrap();
        assert_eq!(fmt.pack_color(Color::rgb(250, 10, 4)), 1);
        assert_eq!(fmt.unpack_pixel(2), Color::rgb(0, 255, 0));
    }

    #[test]
    fn it_should_alias_cached_formats_across_instances() {
        let a = PixelFormat::new(PixelEncoding::Abgr8888).unwrap();
        let b = PixelFormat::new(PixelEncoding::Abgr8888).unwrap();
        // non-indexed formats come from the engine cache: same native struct
        assert_eq!(a, b);

        let ia = PixelFormat::new(PixelEncoding::Index8).unwrap();
        let ib = PixelFormat::new(PixelEncoding::Index8).unwrap();
        // indexed formats own their palette and are never shared
        assert_ne!(ia, ib);
    }

    #[test]
    fn it_should_refuse_fourcc_formats() {
        assert!(matches!(
            PixelFormat::new(PixelEncoding::Yv12),
            Err(Error::UnsupportedFormat(PixelEncoding::Yv12))
        ));
    }
}
