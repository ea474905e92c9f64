// src/color.rs

//! Defines the structured `Color` value exchanged with pixel formats.
//!
//! A `Color` is always 8 bits per channel; pixel formats with narrower
//! channels widen on unpack and narrow on pack (see `crate::format`).

/// An RGBA color with 8 bits per channel.
///
/// Channel values are full-range: `0` is absent, `255` is saturated. For
/// pixel encodings without an alpha channel, `a` is `255` after unpacking
/// and ignored when packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Fully transparent black, the default fill color.
pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);

impl Color {
    /// Creates a color from the four channel values.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque color (`a = 255`).
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl From<(u8, u8, u8, u8)> for Color {
    fn from((r, g, b, a): (u8, u8, u8, u8)) -> Self {
        Self { r, g, b, a }
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::rgb(r, g, b)
    }
}

impl From<Color> for (u8, u8, u8, u8) {
    fn from(c: Color) -> Self {
        (c.r, c.g, c.b, c.a)
    }
}
