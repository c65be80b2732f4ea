//! Scoped access to caller-owned pixel memory

use std::ops::{Deref, DerefMut};

use crate::error::KernelError;
use crate::framebuffer::{
    BYTES_PER_PIXEL, BitmapInfo, Framebuffer, FramebufferMut, read_word, write_word,
};
use crate::types::PixelFormat;

/// A bitmap whose pixels must be locked before they can be addressed.
///
/// The lease returned by [`PixelSurface::lock_pixels`] owns the mapping and
/// releases it on drop, so the pixels are unlocked on every exit path,
/// including errors raised after the lock was taken.
pub trait PixelSurface {
    type Lease<'a>: DerefMut<Target = [u8]>
    where
        Self: 'a;

    fn info(&self) -> BitmapInfo;

    fn lock_pixels(&mut self) -> Result<Self::Lease<'_>, KernelError>;
}

/// Locks `surface`, runs `f` over the writable pixels, then releases the lock.
///
/// The format is checked before locking, so an unsupported surface is never
/// mapped.
pub fn with_locked<S, R, F>(surface: &mut S, f: F) -> Result<R, KernelError>
where
    S: PixelSurface + ?Sized,
    F: FnOnce(FramebufferMut<'_>) -> Result<R, KernelError>,
{
    let info = surface.info();
    info.ensure_argb()?;
    let mut lease = surface.lock_pixels().inspect_err(|e| {
        log::warn!("{}x{} surface not locked: {e}", info.width, info.height);
    })?;
    let fb = FramebufferMut::new(&mut *lease, info)?;
    f(fb)
}

/// Heap-backed ARGB bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    info: BitmapInfo,
    pixels: Vec<u8>,
    releases: usize,
}

impl Bitmap {
    /// Fully transparent, unpadded ARGB_8888 bitmap
    pub fn new(width: usize, height: usize) -> Result<Self, KernelError> {
        Self::allocate(BitmapInfo::packed(width, height)?)
    }

    /// Bitmap whose rows are `stride` bytes apart.
    pub fn with_stride(width: usize, height: usize, stride: usize) -> Result<Self, KernelError> {
        let info = BitmapInfo {
            width,
            height,
            stride,
            format: PixelFormat::Argb8888,
        };
        if stride < info.row_bytes()? {
            return Err(KernelError::StrideTooSmall { stride, width });
        }
        Self::allocate(info)
    }

    /// Bitmap in an arbitrary format. Kernels reject anything but ARGB_8888.
    pub fn with_format(
        width: usize,
        height: usize,
        format: PixelFormat,
    ) -> Result<Self, KernelError> {
        let stride = width
            .checked_mul(format.bytes_per_pixel())
            .ok_or(KernelError::DimensionOverflow { width, height })?;
        Self::allocate(BitmapInfo {
            width,
            height,
            stride,
            format,
        })
    }

    fn allocate(info: BitmapInfo) -> Result<Self, KernelError> {
        let len = info
            .stride
            .checked_mul(info.height)
            .filter(|&len| len <= isize::MAX as usize)
            .ok_or(KernelError::DimensionOverflow {
                width: info.width,
                height: info.height,
            })?;
        Ok(Self {
            info,
            pixels: vec![0; len],
            releases: 0,
        })
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
    pub fn stride(&self) -> usize {
        self.info.stride
    }

    /// Raw bytes, padding included
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of locks that have been released so far
    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases
    }

    /// ARGB word at `(x, y)`; ARGB_8888 only
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        let start = y * self.info.stride + x * BYTES_PER_PIXEL;
        read_word(&self.pixels[start..start + BYTES_PER_PIXEL])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, argb: u32) {
        let start = y * self.info.stride + x * BYTES_PER_PIXEL;
        write_word(&mut self.pixels[start..start + BYTES_PER_PIXEL], argb);
    }

    /// Fill every pixel, leaving row padding alone.
    pub fn fill(&mut self, argb: u32) {
        for y in 0..self.info.height {
            for x in 0..self.info.width {
                self.set_pixel(x, y, argb);
            }
        }
    }

    /// All pixels in row-major order, padding skipped
    #[must_use]
    pub fn to_argb_vec(&self) -> Vec<u32> {
        (0..self.info.height)
            .flat_map(|y| (0..self.info.width).map(move |x| (x, y)))
            .map(|(x, y)| self.pixel(x, y))
            .collect()
    }

    pub fn as_framebuffer(&self) -> Result<Framebuffer<'_>, KernelError> {
        Framebuffer::new(&self.pixels, self.info)
    }
}

/// Lock on a pixel buffer; bumps the owner's release counter when dropped.
#[derive(Debug)]
pub struct PixelLease<'a> {
    pixels: &'a mut [u8],
    releases: &'a mut usize,
}

impl<'a> PixelLease<'a> {
    pub fn new(pixels: &'a mut [u8], releases: &'a mut usize) -> Self {
        Self { pixels, releases }
    }
}

impl Deref for PixelLease<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &*self.pixels
    }
}

impl DerefMut for PixelLease<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut *self.pixels
    }
}

impl Drop for PixelLease<'_> {
    fn drop(&mut self) {
        *self.releases += 1;
        log::trace!("released pixel lease #{}", self.releases);
    }
}

impl PixelSurface for Bitmap {
    type Lease<'a> = PixelLease<'a>;

    fn info(&self) -> BitmapInfo {
        self.info
    }

    fn lock_pixels(&mut self) -> Result<PixelLease<'_>, KernelError> {
        Ok(PixelLease::new(self.pixels.as_mut_slice(), &mut self.releases))
    }
}
