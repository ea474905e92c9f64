// src/surface/tests.rs

use std::io::{self, Cursor as MemStream, Seek, SeekFrom, Write};

use libc::c_void;
use test_log::test; // route log output from surface ops into test captures

use super::{BlendMode, Surface};
use crate::color::Color;
use crate::error::Error;
use crate::pixels::PixelEncoding;
use crate::rect::Rect;

const RED: Color = Color::new(255, 0, 0, 255);
const GREEN: Color = Color::new(0, 255, 0, 255);
const BLUE: Color = Color::new(0, 0, 255, 255);

#[test]
fn it_should_fill_and_read_back_a_structured_color() {
    let mut s = Surface::new(4, 4, PixelEncoding::Rgba8888).unwrap();
    s.fill(None, Some(RED)).unwrap();
    assert_eq!(s.pixel_color(0, 0).unwrap(), RED);
    assert_eq!(s.pixel_color(3, 3).unwrap(), RED);
}

#[test]
fn it_should_reject_out_of_range_pixel_coordinates() {
    let s = Surface::new(4, 4, PixelEncoding::Rgba8888).unwrap();
    for (x, y) in [(4, 0), (0, 4), (-1, 0), (0, -1)] {
        match s.pixel(x, y) {
            Err(Error::OutOfRange {
                x: ex,
                y: ey,
                width: 4,
                height: 4,
            }) => {
                assert_eq!((ex, ey), (x, y));
            }
            other => panic!("expected OutOfRange for ({x}, {y}), got {other:?}"),
        }
    }
}

#[test]
fn it_should_read_pixels_of_every_byte_width() {
    // 1 byte
    let mut s = Surface::new(3, 1, PixelEncoding::Rgb332).unwrap();
    s.fill(None, Some(RED)).unwrap();
    assert_eq!(s.pixel(0, 0).unwrap(), 0xE0);
    assert_eq!(s.pixel_color(0, 0).unwrap(), RED);

    // 2 bytes
    let mut s = Surface::new(3, 1, PixelEncoding::Rgb565).unwrap();
    s.fill(None, Some(GREEN)).unwrap();
    assert_eq!(s.pixel(1, 0).unwrap(), 0x07E0);

    // 3 bytes, including the last pixel of the last row
    let mut s = Surface::new(3, 1, PixelEncoding::Bgr24).unwrap();
    s.fill(None, Some(RED)).unwrap();
    assert_eq!(s.pixel(2, 0).unwrap(), 0xFF0000);
    assert_eq!(s.pixel_color(2, 0).unwrap(), RED);

    // 4 bytes
    let mut s = Surface::new(3, 1, PixelEncoding::Argb8888).unwrap();
    s.fill(None, Some(BLUE)).unwrap();
    assert_eq!(s.pixel(2, 0).unwrap(), 0xFF00_00FF);
}

#[test]
fn it_should_produce_index_zero_when_converting_to_indexed() {
    let mut src = Surface::new(4, 4, PixelEncoding::Rgb565).unwrap();
    src.fill(None, Some(BLUE)).unwrap();
    let indexed = src.convert(PixelEncoding::Index8).unwrap();
    assert_eq!(indexed.encoding(), PixelEncoding::Index8);
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(indexed.pixel(x, y).unwrap(), 0);
        }
    }
}

#[test]
fn it_should_preserve_colors_across_convertible_encodings() {
    let mut src = Surface::new(2, 2, PixelEncoding::Rgb565).unwrap();
    src.fill(None, Some(RED)).unwrap();
    let dst = src.convert(PixelEncoding::Argb8888).unwrap();
    assert_eq!(dst.pixel_color(1, 1).unwrap(), RED);
}

#[test]
fn it_should_refuse_unsupported_conversion_targets() {
    let src = Surface::new(2, 2, PixelEncoding::Argb8888).unwrap();
    for enc in [
        PixelEncoding::Index1,
        PixelEncoding::Index4,
        PixelEncoding::Argb2101010,
        PixelEncoding::Yv12,
    ] {
        assert!(
            matches!(src.convert(enc), Err(Error::UnsupportedFormat(e)) if e == enc),
            "{enc} must be rejected"
        );
    }
}

#[test]
fn it_should_refuse_fourcc_encodings_at_creation() {
    assert!(matches!(
        Surface::new(4, 4, PixelEncoding::Nv12),
        Err(Error::UnsupportedFormat(PixelEncoding::Nv12))
    ));
}

#[test]
fn it_should_report_creation_failure_for_zero_dimensions() {
    assert!(matches!(
        Surface::new(0, 4, PixelEncoding::Argb8888),
        Err(Error::Resource(_))
    ));
}

#[test]
fn it_should_unlock_even_when_the_body_fails() {
    let s = Surface::new(4, 4, PixelEncoding::Argb8888).unwrap();
    let failed: crate::error::Result<()> =
        s.with_lock(|_| Err(Error::NativeOperation("simulated failure".into())));
    assert!(failed.is_err());
    unsafe {
        assert_eq!((*s.raw()).locked, 0, "the failing body must not leak the lock");
    }
    // a subsequent lock must succeed, no stuck-lock state
    s.with_lock(|_| Ok(())).unwrap();
}

#[test]
fn it_should_cache_the_pixel_format_per_surface() {
    let s = Surface::new(4, 4, PixelEncoding::Argb8888).unwrap();
    let a = s.pixel_format().unwrap() as *const _;
    let b = s.pixel_format().unwrap() as *const _;
    assert!(std::ptr::eq(a, b), "pixel_format must be identity-stable");
}

#[test]
fn it_should_blit_into_the_destination_at_the_given_origin() {
    let mut src = Surface::new(2, 2, PixelEncoding::Argb8888).unwrap();
    src.fill(None, Some(RED)).unwrap();
    src.set_blend_mode(BlendMode::None).unwrap();

    let mut dst = Surface::new(4, 4, PixelEncoding::Argb8888).unwrap();
    dst.fill(None, Some(BLUE)).unwrap();
    dst.blit(&src, None, Some(Rect::new(1, 1, 2, 2)), false).unwrap();

    assert_eq!(dst.pixel_color(0, 0).unwrap(), BLUE);
    assert_eq!(dst.pixel_color(1, 1).unwrap(), RED);
    assert_eq!(dst.pixel_color(2, 2).unwrap(), RED);
    assert_eq!(dst.pixel_color(3, 3).unwrap(), BLUE);
}

#[test]
fn it_should_scale_blits_over_the_whole_destination() {
    let mut src = Surface::new(2, 2, PixelEncoding::Argb8888).unwrap();
    src.fill(None, Some(GREEN)).unwrap();
    src.set_blend_mode(BlendMode::None).unwrap();

    let mut dst = Surface::new(8, 8, PixelEncoding::Argb8888).unwrap();
    dst.blit(&src, None, None, true).unwrap();
    assert_eq!(dst.pixel_color(0, 0).unwrap(), GREEN);
    assert_eq!(dst.pixel_color(7, 7).unwrap(), GREEN);
}

#[test]
fn it_should_exclude_color_keyed_pixels_from_blits() {
    let mut src = Surface::new(2, 1, PixelEncoding::Argb8888).unwrap();
    src.fill(Some(Rect::new(0, 0, 1, 1)), Some(RED)).unwrap();
    src.fill(Some(Rect::new(1, 0, 1, 1)), Some(GREEN)).unwrap();
    src.set_blend_mode(BlendMode::None).unwrap();
    src.set_color_key(Some(RED)).unwrap();
    assert_eq!(src.color_key().unwrap(), Some(RED));

    let mut dst = Surface::new(2, 1, PixelEncoding::Argb8888).unwrap();
    dst.fill(None, Some(BLUE)).unwrap();
    dst.blit(&src, None, None, false).unwrap();

    // the keyed red pixel is skipped, the green one lands
    assert_eq!(dst.pixel_color(0, 0).unwrap(), BLUE);
    assert_eq!(dst.pixel_color(1, 0).unwrap(), GREEN);

    src.set_color_key(None).unwrap();
    assert_eq!(src.color_key().unwrap(), None);
    assert!(!src.has_color_key());
}

#[test]
fn it_should_refuse_to_blit_locked_surfaces() {
    let mut src = Surface::new(2, 2, PixelEncoding::Argb8888).unwrap();
    src.fill(None, Some(RED)).unwrap();
    let mut dst = Surface::new(2, 2, PixelEncoding::Argb8888).unwrap();

    let result = src.with_lock(|locked| dst.blit(locked, None, None, false));
    assert!(matches!(result, Err(Error::NativeOperation(_))));

    // unlocked again, the same blit goes through
    dst.blit(&src, None, None, false).unwrap();
}

#[test]
fn it_should_clip_fills_to_the_clip_rectangle() {
    let mut s = Surface::new(8, 8, PixelEncoding::Argb8888).unwrap();
    assert_eq!(s.clip(), s.bounds());

    s.set_clip(Some(Rect::new(2, 2, 4, 4))).unwrap();
    assert_eq!(s.clip(), Rect::new(2, 2, 4, 4));

    // the default fill rectangle is the clip rectangle
    s.fill(None, Some(RED)).unwrap();
    assert_eq!(s.pixel(1, 1).unwrap(), 0);
    assert_eq!(s.pixel_color(2, 2).unwrap(), RED);
    assert_eq!(s.pixel_color(5, 5).unwrap(), RED);
    assert_eq!(s.pixel(6, 6).unwrap(), 0);

    s.set_clip(None).unwrap();
    assert_eq!(s.clip(), s.bounds());
}

#[test]
fn it_should_reject_a_clip_rectangle_outside_the_bounds() {
    let mut s = Surface::new(4, 4, PixelEncoding::Argb8888).unwrap();
    assert!(matches!(
        s.set_clip(Some(Rect::new(10, 10, 2, 2))),
        Err(Error::OutOfRange { x: 10, y: 10, .. })
    ));
}

#[test]
fn it_should_clear_back_to_transparent_black() {
    let mut s = Surface::new(4, 4, PixelEncoding::Argb8888).unwrap();
    s.fill(None, Some(RED)).unwrap();
    s.clear().unwrap();
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(s.pixel(x, y).unwrap(), 0);
        }
    }
}

#[test]
fn it_should_default_and_update_modulation_state() {
    let mut s = Surface::new(2, 2, PixelEncoding::Argb8888).unwrap();
    assert_eq!(s.alpha_mod(), 255);
    assert_eq!(s.color_mod(), (255, 255, 255));
    assert_eq!(s.blend_mode(), BlendMode::Blend);
    assert_eq!(s.blend_mode().name(), "blend");

    s.set_alpha_mod(128).unwrap();
    s.set_color_mod(10, 20, 30).unwrap();
    s.set_blend_mode(BlendMode::Add).unwrap();
    assert_eq!(s.alpha_mod(), 128);
    assert_eq!(s.color_mod(), (10, 20, 30));
    assert_eq!(s.blend_mode(), BlendMode::Add);
}

#[test]
fn it_should_track_the_rle_flag_and_still_read_pixels() {
    let mut s = Surface::new(2, 2, PixelEncoding::Rgb565).unwrap();
    assert!(!s.rle());
    s.set_rle(true).unwrap();
    assert!(s.rle());
    s.fill(None, Some(RED)).unwrap();
    // pixel reads bracket themselves with the scoped lock
    assert_eq!(s.pixel_color(0, 0).unwrap(), RED);
    s.set_rle(false).unwrap();
    assert!(!s.rle());
}

#[test]
fn it_should_share_the_native_surface_between_aliasing_wrappers() {
    let a = Surface::new(2, 2, PixelEncoding::Argb8888).unwrap();
    let b = unsafe { Surface::from_raw(a.raw() as *mut c_void) }.unwrap();
    assert_eq!(a, b);
    unsafe {
        assert_eq!((*a.raw()).refcount, 2);
    }
    drop(a);
    // b's claim keeps the surface alive
    assert_eq!(b.size(), (2, 2));
}

#[test]
fn it_should_report_geometry_accessors_consistently() {
    let s = Surface::new(5, 3, PixelEncoding::Bgr24).unwrap();
    assert_eq!(s.size(), (5, 3));
    assert_eq!(s.bounds(), Rect::new(0, 0, 5, 3));
    // 5 * 3 bytes rounded up to the 4-byte pitch boundary
    assert_eq!(s.pitch(), 16);
    assert_eq!(s.byte_size(), 48);
    assert!(s.pixel_format().unwrap().bytes_per_pixel() as u32 * s.width() <= s.pitch());
}

#[test]
fn it_should_round_trip_a_true_color_surface_through_bmp() {
    let mut s = Surface::new(4, 4, PixelEncoding::Argb8888).unwrap();
    s.fill(None, Some(RED)).unwrap();
    s.fill(Some(Rect::new(0, 0, 2, 2)), Some(GREEN)).unwrap();

    let mut stream = MemStream::new(Vec::new());
    s.save(&mut stream).unwrap();
    stream.seek(SeekFrom::Start(0)).unwrap();

    let loaded = Surface::load(&mut stream).unwrap();
    assert_eq!(loaded.size(), (4, 4));
    assert_eq!(loaded.encoding(), PixelEncoding::Argb8888);
    assert_eq!(loaded.pixel_color(0, 0).unwrap(), GREEN);
    assert_eq!(loaded.pixel_color(1, 1).unwrap(), GREEN);
    assert_eq!(loaded.pixel_color(2, 2).unwrap(), RED);
    assert_eq!(loaded.pixel_color(3, 0).unwrap(), RED);
}

#[test]
fn it_should_round_trip_an_indexed_surface_through_bmp() {
    let mut s = Surface::new(3, 2, PixelEncoding::Index8).unwrap();
    s.pixel_format()
        .unwrap()
        .set_palette(&[Color::rgb(0, 0, 0), RED, GREEN])
        .unwrap();
    s.fill(None, Some(RED)).unwrap(); // maps to index 1

    let mut stream = MemStream::new(Vec::new());
    s.save(&mut stream).unwrap();
    stream.seek(SeekFrom::Start(0)).unwrap();

    let loaded = Surface::load(&mut stream).unwrap();
    assert_eq!(loaded.encoding(), PixelEncoding::Index8);
    assert_eq!(loaded.pixel(0, 0).unwrap(), 1);
    assert_eq!(loaded.pixel_color(2, 1).unwrap(), RED);
}

#[test]
fn it_should_widen_sub_byte_indexed_bmp_input() {
    // hand-built 4x1 BMP at 4 bits per pixel, palette [black, red]
    let mut bmp = Vec::new();
    bmp.extend_from_slice(b"BM");
    bmp.extend_from_slice(&0u32.to_le_bytes()); // length, unused on load
    bmp.extend_from_slice(&[0; 4]);
    bmp.extend_from_slice(&(14u32 + 40 + 16 * 4).to_le_bytes()); // data offset
    bmp.extend_from_slice(&40u32.to_le_bytes());
    bmp.extend_from_slice(&4i32.to_le_bytes()); // width
    bmp.extend_from_slice(&1i32.to_le_bytes()); // height
    bmp.extend_from_slice(&1u16.to_le_bytes());
    bmp.extend_from_slice(&4u16.to_le_bytes()); // depth
    bmp.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    bmp.extend_from_slice(&4u32.to_le_bytes());
    bmp.extend_from_slice(&[0; 8]); // resolution
    bmp.extend_from_slice(&16u32.to_le_bytes()); // palette entries
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.extend_from_slice(&[0, 0, 0, 0]); // entry 0: black (B,G,R,x)
    bmp.extend_from_slice(&[0, 0, 255, 0]); // entry 1: red
    bmp.extend_from_slice(&[0; 14 * 4]); // remaining entries
    bmp.extend_from_slice(&[0x01, 0x01, 0, 0]); // pixels 0,1,0,1 + padding

    let mut stream = MemStream::new(bmp);
    let s = Surface::load(&mut stream).unwrap();
    assert_eq!(s.encoding(), PixelEncoding::Index8);
    assert_eq!(s.size(), (4, 1));
    assert_eq!(
        (0..4).map(|x| s.pixel(x, 0).unwrap()).collect::<Vec<_>>(),
        vec![0, 1, 0, 1]
    );
    assert_eq!(s.pixel_color(1, 0).unwrap(), RED);
}

#[test]
fn it_should_report_malformed_bmp_input_as_decode_errors() {
    let mut not_bmp = MemStream::new(b"PNG rather than BMP".to_vec());
    assert!(matches!(Surface::load(&mut not_bmp), Err(Error::Decode(_))));

    let mut truncated = MemStream::new(b"BM\x00\x00".to_vec());
    assert!(matches!(Surface::load(&mut truncated), Err(Error::Decode(_))));
}

/// A sink that accepts writes but cannot seek, like a pipe.
struct NoSeekSink(Vec<u8>);

impl Write for NoSeekSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for NoSeekSink {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "sink is a pipe"))
    }
}

#[test]
fn it_should_report_a_non_seekable_sink_as_an_encode_error() {
    let s = Surface::new(2, 2, PixelEncoding::Argb8888).unwrap();
    let mut sink = NoSeekSink(Vec::new());
    assert!(matches!(s.save(&mut sink), Err(Error::Encode(_))));
}

#[test]
fn it_should_copy_a_surface_through_its_own_format() {
    let mut s = Surface::new(2, 2, PixelEncoding::Rgb565).unwrap();
    s.fill(None, Some(GREEN)).unwrap();
    let copy = s.convert_to_own_format().unwrap();
    assert_ne!(s, copy, "conversion allocates a distinct surface");
    assert_eq!(copy.encoding(), PixelEncoding::Rgb565);
    assert_eq!(copy.pixel_color(0, 0).unwrap(), GREEN);
}
