// src/sys/bmp.rs

//! Windows-bitmap decode/encode over `std::io` streams.
//!
//! Decode accepts uncompressed BITMAPINFOHEADER files at 1/4/8/24/32 bits;
//! sub-8-bit indexed input is widened to the 8-bit indexed encoding. Encode
//! writes 8-bit indexed surfaces with their palette, alpha-capable formats at
//! 32 bits, and everything else converted per-pixel to 24-bit BGR. The
//! encoder patches the file length after the fact, so a non-seekable sink
//! fails the save.

use std::io::{Read, Seek, SeekFrom, Write};

use libc::c_int;
use log::debug;

use super::error::set_error;
use super::surface::{create_surface, free_surface, pixel_ptr_for_io, read_pixel};
use super::{format, NativeSurface};
use crate::pixels::PixelEncoding;

const FILE_HEADER_LEN: u32 = 14;
const INFO_HEADER_LEN: u32 = 40;

/// Decodes a BMP stream into a fresh surface. Null with the last error set on
/// malformed or unsupported input.
///
/// The stream is read from its current position and is never closed here;
/// stream ownership is the caller's concern.
///
/// # Safety
/// The returned surface carries one refcount claim.
pub(crate) unsafe fn load_bmp<R: Read + Seek>(r: &mut R) -> *mut NativeSurface {
    match load_bmp_inner(r) {
        Ok(p) => p,
        Err(msg) => {
            set_error(msg);
            std::ptr::null_mut()
        }
    }
}

unsafe fn load_bmp_inner<R: Read + Seek>(r: &mut R) -> Result<*mut NativeSurface, String> {
    let start = r
        .stream_position()
        .map_err(|e| format!("BMP stream is not seekable: {e}"))?;

    let mut file_header = [0u8; 14];
    read_all(r, &mut file_header)?;
    if &file_header[0..2] != b"BM" {
        return Err("not a BMP stream (missing BM magic)".into());
    }
    let data_offset = u32::from_le_bytes(file_header[10..14].try_into().unwrap());

    let mut info = [0u8; 40];
    read_all(r, &mut info[..4])?;
    let header_len = u32::from_le_bytes(info[0..4].try_into().unwrap());
    if header_len < INFO_HEADER_LEN {
        return Err(format!("unsupported BMP header length {header_len}"));
    }
    read_all(r, &mut info[4..40])?;
    if header_len > INFO_HEADER_LEN {
        r.seek(SeekFrom::Current((header_len - INFO_HEADER_LEN) as i64))
            .map_err(|e| format!("truncated BMP header: {e}"))?;
    }

    let width = i32::from_le_bytes(info[4..8].try_into().unwrap());
    let height_raw = i32::from_le_bytes(info[8..12].try_into().unwrap());
    let depth = u16::from_le_bytes(info[14..16].try_into().unwrap());
    let compression = u32::from_le_bytes(info[16..20].try_into().unwrap());
    let clr_used = u32::from_le_bytes(info[32..36].try_into().unwrap());

    if compression != 0 {
        return Err(format!("unsupported BMP compression {compression}"));
    }
    if width <= 0 || height_raw == 0 {
        return Err(format!("invalid BMP dimensions {width}x{height_raw}"));
    }
    let top_down = height_raw < 0;
    let height = height_raw.unsigned_abs() as i32;

    let enc = match depth {
        1 | 4 | 8 => PixelEncoding::Index8,
        24 => PixelEncoding::Bgr24,
        32 => PixelEncoding::Argb8888,
        other => return Err(format!("unsupported BMP depth {other}")),
    };

    // palette sits between the headers and the pixel data
    let mut palette = Vec::new();
    if depth <= 8 {
        let n = if clr_used != 0 {
            clr_used as usize
        } else {
            1usize << depth
        };
        if n > 256 {
            return Err(format!("BMP palette has {n} entries"));
        }
        palette = vec![0u8; n * 4];
        read_all(r, &mut palette)?;
    }

    r.seek(SeekFrom::Start(start + data_offset as u64))
        .map_err(|e| format!("cannot seek to BMP pixel data: {e}"))?;

    let surf = create_surface(width, height, enc);
    if surf.is_null() {
        return Err(super::error::last_error());
    }
    if !palette.is_empty() {
        // BMP entries are B,G,R,x; the native palette is R,G,B,A
        let native = (*(*surf).format).palette;
        for (i, entry) in palette.chunks_exact(4).enumerate() {
            let c = (*native).colors.add(i * 4);
            *c = entry[2];
            *c.add(1) = entry[1];
            *c.add(2) = entry[0];
            *c.add(3) = 255;
        }
    }

    let row_size = ((width as usize * depth as usize) + 31) / 32 * 4;
    let mut row = vec![0u8; row_size];
    for i in 0..height {
        if let Err(msg) = read_all(r, &mut row) {
            free_surface(surf);
            return Err(msg);
        }
        let y = if top_down { i } else { height - 1 - i };
        let dst = pixel_ptr_for_io(surf, y);
        match depth {
            1 => {
                for x in 0..width as usize {
                    *dst.add(x) = (row[x / 8] >> (7 - (x % 8) as u32)) & 1;
                }
            }
            4 => {
                for x in 0..width as usize {
                    let byte = row[x / 2];
                    *dst.add(x) = if x % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                }
            }
            8 => std::ptr::copy_nonoverlapping(row.as_ptr(), dst, width as usize),
            // 24-bit rows are B,G,R which is exactly the BGR24 byte layout;
            // 32-bit rows are B,G,R,A which is the ARGB8888 little-endian layout
            24 => std::ptr::copy_nonoverlapping(row.as_ptr(), dst, width as usize * 3),
            _ => std::ptr::copy_nonoverlapping(row.as_ptr(), dst, width as usize * 4),
        }
    }

    debug!("loaded {width}x{height} depth-{depth} BMP as {enc}");
    Ok(surf)
}

fn read_all<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), String> {
    r.read_exact(buf)
        .map_err(|e| format!("truncated BMP stream: {e}"))
}

/// Encodes `surf` as a BMP onto `w`. Returns −1 with the last error set when
/// a write or the final length fix-up seek fails.
///
/// # Safety
/// `surf` must be a live surface.
pub(crate) unsafe fn save_bmp<W: Write + Seek>(surf: *mut NativeSurface, w: &mut W) -> c_int {
    if surf.is_null() {
        set_error("save of null surface");
        return -1;
    }
    match save_bmp_inner(surf, w) {
        Ok(()) => 0,
        Err(msg) => {
            set_error(msg);
            -1
        }
    }
}

unsafe fn save_bmp_inner<W: Write + Seek>(surf: *mut NativeSurface, w: &mut W) -> Result<(), String> {
    let fmt = (*surf).format;
    let indexed = !(*fmt).palette.is_null();
    let depth: u16 = if indexed {
        8
    } else if (*fmt).a_mask != 0 {
        32
    } else {
        24
    };
    let width = (*surf).w;
    let height = (*surf).h;
    let row_size = ((width as usize * depth as usize) + 31) / 32 * 4;
    let palette_len: u32 = if indexed { 256 * 4 } else { 0 };
    let data_offset = FILE_HEADER_LEN + INFO_HEADER_LEN + palette_len;

    let start = w
        .stream_position()
        .map_err(|e| format!("BMP sink is not seekable: {e}"))?;

    let wr = |w: &mut W, bytes: &[u8]| -> Result<(), String> {
        w.write_all(bytes).map_err(|e| format!("BMP write failed: {e}"))
    };

    // file header with a placeholder length, patched after the pixel data
    wr(w, b"BM")?;
    wr(w, &0u32.to_le_bytes())?;
    wr(w, &[0u8; 4])?;
    wr(w, &data_offset.to_le_bytes())?;

    wr(w, &INFO_HEADER_LEN.to_le_bytes())?;
    wr(w, &width.to_le_bytes())?;
    wr(w, &height.to_le_bytes())?;
    wr(w, &1u16.to_le_bytes())?;
    wr(w, &depth.to_le_bytes())?;
    wr(w, &0u32.to_le_bytes())?; // BI_RGB
    wr(w, &((row_size * height as usize) as u32).to_le_bytes())?;
    wr(w, &2835i32.to_le_bytes())?; // 72 dpi
    wr(w, &2835i32.to_le_bytes())?;
    let clr_used: u32 = if indexed { 256 } else { 0 };
    wr(w, &clr_used.to_le_bytes())?;
    wr(w, &0u32.to_le_bytes())?;

    if indexed {
        let native = (*fmt).palette;
        for i in 0..256usize {
            if i < (*native).ncolors as usize {
                let c = (*native).colors.add(i * 4);
                wr(w, &[*c.add(2), *c.add(1), *c, 0])?;
            } else {
                wr(w, &[0, 0, 0, 0])?;
            }
        }
    }

    let bytes_pp = (*fmt).bytes_per_pixel;
    let mut row = vec![0u8; row_size];
    for i in 0..height {
        let y = height - 1 - i;
        let src = pixel_ptr_for_io(surf, y);
        match depth {
            8 => {
                std::ptr::copy_nonoverlapping(src, row.as_mut_ptr(), width as usize);
                row[width as usize..].fill(0);
            }
            24 => {
                for x in 0..width as usize {
                    let v = read_pixel(src.add(x * bytes_pp as usize), bytes_pp);
                    let (r, g, b, _a) = format::unpack(fmt, v);
                    row[x * 3] = b;
                    row[x * 3 + 1] = g;
                    row[x * 3 + 2] = r;
                }
                row[width as usize * 3..].fill(0);
            }
            _ => {
                for x in 0..width as usize {
                    let v = read_pixel(src.add(x * bytes_pp as usize), bytes_pp);
                    let (r, g, b, a) = format::unpack(fmt, v);
                    row[x * 4] = b;
                    row[x * 4 + 1] = g;
                    row[x * 4 + 2] = r;
                    row[x * 4 + 3] = a;
                }
            }
        }
        wr(w, &row)?;
    }

    let end = w
        .stream_position()
        .map_err(|e| format!("BMP sink lost its position: {e}"))?;
    let file_len = (end - start) as u32;
    w.seek(SeekFrom::Start(start + 2))
        .map_err(|e| format!("BMP length fix-up seek failed: {e}"))?;
    wr(w, &file_len.to_le_bytes())?;
    w.seek(SeekFrom::Start(end))
        .map_err(|e| format!("BMP length fix-up seek failed: {e}"))?;
    debug!("saved {width}x{height} surface as depth-{depth} BMP ({file_len} bytes)");
    Ok(())
}
