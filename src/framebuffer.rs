//! Stride-aware views over ARGB_8888 pixel memory

use rayon::prelude::*;

use crate::error::KernelError;
use crate::types::PixelFormat;

/// Bytes in one ARGB_8888 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// How rows are located inside a locked pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAddressing {
    /// Row `y` starts at byte `y * stride`
    #[default]
    Stride,
    /// Row `y` starts at pixel `y * width`, ignoring any row padding.
    /// Matches bitmaps written by older pipelines; corrupts padded bitmaps.
    Packed,
}

/// Geometry reported by a pixel surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapInfo {
    pub width: usize,
    pub height: usize,
    /// Bytes between the starts of consecutive rows
    pub stride: usize,
    pub format: PixelFormat,
}

impl BitmapInfo {
    /// Unpadded ARGB_8888 geometry
    pub fn packed(width: usize, height: usize) -> Result<Self, KernelError> {
        let info = Self {
            width,
            height,
            stride: 0,
            format: PixelFormat::Argb8888,
        };
        let stride = info.row_bytes()?;
        Ok(Self { stride, ..info })
    }

    pub fn ensure_argb(&self) -> Result<(), KernelError> {
        if self.format != PixelFormat::Argb8888 {
            return Err(KernelError::UnsupportedFormat(self.format));
        }
        Ok(())
    }

    pub fn ensure_size(&self, width: usize, height: usize) -> Result<(), KernelError> {
        if self.width != width || self.height != height {
            return Err(KernelError::BitmapSize {
                width,
                height,
                actual_width: self.width,
                actual_height: self.height,
            });
        }
        Ok(())
    }

    pub(crate) fn row_bytes(&self) -> Result<usize, KernelError> {
        self.width
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or(KernelError::DimensionOverflow {
                width: self.width,
                height: self.height,
            })
    }

    /// Row pitch for `addressing`, after checking that a buffer of `len`
    /// bytes holds every addressed pixel.
    pub fn row_pitch(&self, len: usize, addressing: RowAddressing) -> Result<usize, KernelError> {
        self.ensure_argb()?;
        let row_bytes = self.row_bytes()?;
        let pitch = match addressing {
            RowAddressing::Stride => self.stride,
            RowAddressing::Packed => row_bytes,
        };
        if pitch < row_bytes {
            return Err(KernelError::StrideTooSmall {
                stride: pitch,
                width: self.width,
            });
        }
        let required = self.required_bytes(pitch)?;
        if len < required {
            return Err(KernelError::PixelBufferTooSmall {
                required,
                actual: len,
            });
        }
        Ok(pitch)
    }

    /// Bytes from the first pixel through the last addressed pixel. The last
    /// row does not need trailing padding.
    fn required_bytes(&self, pitch: usize) -> Result<usize, KernelError> {
        if self.width == 0 || self.height == 0 {
            return Ok(0);
        }
        let overflow = KernelError::DimensionOverflow {
            width: self.width,
            height: self.height,
        };
        (self.height - 1)
            .checked_mul(pitch)
            .and_then(|n| n.checked_add(self.width * BYTES_PER_PIXEL))
            .ok_or(overflow)
    }
}

#[inline]
pub(crate) fn read_word(px: &[u8]) -> u32 {
    u32::from_ne_bytes([px[0], px[1], px[2], px[3]])
}

#[inline]
pub(crate) fn write_word(px: &mut [u8], word: u32) {
    px.copy_from_slice(&word.to_ne_bytes());
}

/// Read-only ARGB_8888 pixels
#[derive(Debug, Clone, Copy)]
pub struct Framebuffer<'a> {
    data: &'a [u8],
    info: BitmapInfo,
    pitch: usize,
}

impl<'a> Framebuffer<'a> {
    pub fn new(data: &'a [u8], info: BitmapInfo) -> Result<Self, KernelError> {
        let pitch = info.row_pitch(data.len(), RowAddressing::Stride)?;
        Ok(Self { data, info, pitch })
    }

    #[must_use]
    pub fn info(&self) -> BitmapInfo {
        self.info
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.info.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.info.height
    }

    /// Pixel bytes of row `y`, without padding
    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.pitch;
        &self.data[start..start + self.info.width * BYTES_PER_PIXEL]
    }

    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        let start = x * BYTES_PER_PIXEL;
        read_word(&self.row(y)[start..start + BYTES_PER_PIXEL])
    }
}

/// Writable ARGB_8888 pixels, exclusively borrowed for one kernel call
#[derive(Debug)]
pub struct FramebufferMut<'a> {
    data: &'a mut [u8],
    info: BitmapInfo,
}

impl<'a> FramebufferMut<'a> {
    /// Checks format and stride geometry; packed addressing is checked again
    /// by the sweep that uses it.
    pub fn new(data: &'a mut [u8], info: BitmapInfo) -> Result<Self, KernelError> {
        info.row_pitch(data.len(), RowAddressing::Stride)?;
        Ok(Self { data, info })
    }

    #[must_use]
    pub fn info(&self) -> BitmapInfo {
        self.info
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.info.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.info.height
    }

    #[must_use]
    pub fn as_framebuffer(&self) -> Framebuffer<'_> {
        Framebuffer {
            data: &*self.data,
            info: self.info,
            pitch: self.info.stride,
        }
    }

    /// Validates geometry for `addressing`. Kernels call this before any
    /// other work so that a rejected frame leaves the pixels untouched.
    pub fn check(&self, addressing: RowAddressing) -> Result<(), KernelError> {
        self.info.row_pitch(self.data.len(), addressing).map(|_| ())
    }

    /// Hands every row, trimmed to `width * 4` bytes, to `f` exactly once.
    pub fn for_each_row<F>(
        &mut self,
        addressing: RowAddressing,
        parallel: bool,
        f: F,
    ) -> Result<(), KernelError>
    where
        F: Fn(usize, &mut [u8]) + Sync + Send,
    {
        let pitch = self.info.row_pitch(self.data.len(), addressing)?;
        let row_bytes = self.info.width * BYTES_PER_PIXEL;
        if row_bytes == 0 || self.info.height == 0 {
            return Ok(());
        }
        let required = (self.info.height - 1) * pitch + row_bytes;
        let buf = &mut self.data[..required];

        if parallel {
            buf.par_chunks_mut(pitch)
                .enumerate()
                .for_each(|(y, row)| f(y, &mut row[..row_bytes]));
        } else {
            for (y, row) in buf.chunks_mut(pitch).enumerate() {
                f(y, &mut row[..row_bytes]);
            }
        }
        Ok(())
    }
}
