//! Core value types shared by the kernels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Alpha bits of a fully opaque ARGB word
pub const OPAQUE: u32 = 0xFF00_0000;

/// Pixel layouts a surface can report.
///
/// Only [`PixelFormat::Argb8888`] is accepted by the kernels; the others exist
/// so that a surface can describe itself honestly and be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit word, alpha in the top byte: `A<<24 | R<<16 | G<<8 | B`
    Argb8888,
    Rgb565,
    Alpha8,
}

impl PixelFormat {
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Argb8888 => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Alpha8 => 1,
        }
    }
}

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub const fn gray(v: u8) -> Self {
        Self { r: v, g: v, b: v }
    }

    /// Opaque ARGB word for this color
    #[inline]
    #[must_use]
    pub const fn to_argb(self) -> u32 {
        OPAQUE | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

/// Split an ARGB word into `(a, r, g, b)`.
#[inline]
#[must_use]
pub const fn unpack_argb(px: u32) -> (u8, u8, u8, u8) {
    ((px >> 24) as u8, (px >> 16) as u8, (px >> 8) as u8, px as u8)
}

/// Colors indexed by channel number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Palette {
    colors: Vec<Rgb>,
}

impl Palette {
    #[must_use]
    pub fn new(colors: Vec<Rgb>) -> Self {
        Self { colors }
    }

    /// The 40-class palette used by the segmentation view.
    #[must_use]
    pub fn segmentation() -> Self {
        Self::new(SEGMENTATION_COLORS.iter().copied().map(Rgb::from).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[must_use]
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    /// Fails unless every channel in `0..channels` has a color.
    pub fn ensure_covers(&self, channels: usize) -> Result<(), KernelError> {
        if self.colors.len() < channels {
            return Err(KernelError::PaletteTooShort {
                colors: self.colors.len(),
                channels,
            });
        }
        Ok(())
    }
}

impl From<Vec<[u8; 3]>> for Palette {
    fn from(triples: Vec<[u8; 3]>) -> Self {
        Self::new(triples.into_iter().map(Rgb::from).collect())
    }
}

const SEGMENTATION_COLORS: [[u8; 3]; 40] = [
    [53, 13, 51],
    [160, 22, 50],
    [122, 53, 68],
    [221, 80, 51],
    [136, 142, 48],
    [78, 34, 68],
    [224, 164, 230],
    [167, 178, 127],
    [152, 213, 44],
    [125, 122, 149],
    [47, 146, 30],
    [177, 86, 183],
    [62, 42, 251],
    [139, 202, 160],
    [180, 136, 48],
    [176, 140, 195],
    [96, 180, 188],
    [250, 229, 244],
    [123, 209, 21],
    [161, 56, 207],
    [11, 124, 56],
    [202, 177, 144],
    [22, 109, 244],
    [197, 35, 16],
    [57, 98, 84],
    [20, 20, 198],
    [146, 17, 147],
    [94, 190, 155],
    [228, 89, 199],
    [191, 53, 182],
    [24, 188, 15],
    [235, 218, 18],
    [202, 16, 163],
    [106, 239, 196],
    [70, 110, 27],
    [7, 136, 154],
    [232, 32, 56],
    [228, 233, 202],
    [237, 0, 35],
    [203, 233, 240],
];

/// Solid background used when flattening translucent pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundColor(pub Rgb);

impl BackgroundColor {
    pub const WHITE: Self = Self(Rgb::new(0xFF, 0xFF, 0xFF));

    /// Decompose a packed `0xRRGGBB` value; any bits above 24 are ignored.
    #[must_use]
    pub const fn from_packed(rgb: u32) -> Self {
        Self(Rgb::new((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8))
    }

    #[must_use]
    pub const fn packed(self) -> u32 {
        (self.0.r as u32) << 16 | (self.0.g as u32) << 8 | self.0.b as u32
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.packed())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid color {0:?}, expected six hex digits RRGGBB")]
pub struct ParseColorError(String);

impl FromStr for BackgroundColor {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        if digits.len() != 6 {
            return Err(ParseColorError(s.to_string()));
        }
        u32::from_str_radix(digits, 16)
            .map(Self::from_packed)
            .map_err(|_| ParseColorError(s.to_string()))
    }
}

/// Borrowed channel-major f32 tensor shaped `[channels][height][width]`.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    data: &'a [f32],
    channels: usize,
    height: usize,
    width: usize,
}

impl<'a> TensorView<'a> {
    /// Validates that `data` holds exactly `channels * height * width` values.
    pub fn new(
        data: &'a [f32],
        channels: usize,
        height: usize,
        width: usize,
    ) -> Result<Self, KernelError> {
        if channels == 0 {
            return Err(KernelError::NoChannels);
        }
        let expected = channels
            .checked_mul(height)
            .and_then(|n| n.checked_mul(width))
            .ok_or(KernelError::DimensionOverflow { width, height })?;
        if data.len() != expected {
            return Err(KernelError::TensorShape {
                channels,
                height,
                width,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            channels,
            height,
            width,
        })
    }

    /// View over a buffer whose first `height * width` plane is the scalar
    /// field. Any further whole planes are accepted and ignored by scalar
    /// kernels.
    pub fn scalar(data: &'a [f32], height: usize, width: usize) -> Result<Self, KernelError> {
        let plane = height
            .checked_mul(width)
            .ok_or(KernelError::DimensionOverflow { width, height })?;
        let channels = if plane == 0 {
            1
        } else {
            (data.len() / plane).max(1)
        };
        Self::new(data, channels, height, width)
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn data(&self) -> &'a [f32] {
        self.data
    }

    /// Contiguous `height * width` plane of channel `c`.
    #[must_use]
    pub fn plane(&self, c: usize) -> &'a [f32] {
        let len = self.height * self.width;
        &self.data[c * len..(c + 1) * len]
    }

    /// Row `y` of channel `c`.
    #[inline]
    #[must_use]
    pub fn row(&self, c: usize, y: usize) -> &'a [f32] {
        let start = c * self.height * self.width + y * self.width;
        &self.data[start..start + self.width]
    }
}
