//! Per-channel mean/std normalization between ARGB bitmaps and planar floats

use log::debug;
use serde::{Deserialize, Serialize};

use crate::composite::ensure_planes;
use crate::error::KernelError;
use crate::framebuffer::{BYTES_PER_PIXEL, Framebuffer, FramebufferMut, RowAddressing, read_word, write_word};
use crate::sweep::{DEFAULT_PARALLEL_THRESHOLD, for_each_plane_row, use_parallel};
use crate::types::{Rgb, unpack_argb};

/// Per-channel statistics in R, G, B order. Defaults to the ImageNet values
/// most pretrained vision backbones expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self::IMAGENET
    }
}

impl Normalization {
    pub const IMAGENET: Self = Self {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    #[inline]
    fn forward(&self, channel: usize, v: u8) -> f32 {
        (f32::from(v) / 255.0 - self.mean[channel]) / self.std[channel]
    }

    /// Clamped to `[0, 255]` and truncated; NaN becomes 0.
    #[inline]
    fn inverse(&self, channel: usize, x: f32) -> u8 {
        ((x * self.std[channel] + self.mean[channel]) * 255.0).clamp(0.0, 255.0) as u8
    }

    /// Normalizes `src` into `[3][height][width]` planes. Alpha is ignored.
    pub fn normalize(&self, src: &Framebuffer<'_>, planes: &mut [f32]) -> Result<(), KernelError> {
        self.normalize_with(src, planes, DEFAULT_PARALLEL_THRESHOLD)
    }

    pub fn normalize_with(
        &self,
        src: &Framebuffer<'_>,
        planes: &mut [f32],
        parallel_threshold: usize,
    ) -> Result<(), KernelError> {
        let (width, height) = (src.width(), src.height());
        src.info().ensure_argb()?;
        ensure_planes(planes.len(), width, height)?;
        let parallel = use_parallel(height, width, parallel_threshold);
        debug!("normalize {width}x{height} (parallel={parallel})");

        for_each_plane_row(planes, height, width, parallel, |y, r, g, b| {
            for (x, px) in src.row(y).chunks_exact(BYTES_PER_PIXEL).enumerate() {
                let (_, pr, pg, pb) = unpack_argb(read_word(px));
                r[x] = self.forward(0, pr);
                g[x] = self.forward(1, pg);
                b[x] = self.forward(2, pb);
            }
        });
        Ok(())
    }

    /// Inverse of [`Normalization::normalize`], writing opaque pixels.
    pub fn denormalize(&self, planes: &[f32], out: &mut FramebufferMut<'_>) -> Result<(), KernelError> {
        self.denormalize_with(planes, out, DEFAULT_PARALLEL_THRESHOLD)
    }

    pub fn denormalize_with(
        &self,
        planes: &[f32],
        out: &mut FramebufferMut<'_>,
        parallel_threshold: usize,
    ) -> Result<(), KernelError> {
        let (width, height) = (out.width(), out.height());
        ensure_planes(planes.len(), width, height)?;
        out.check(RowAddressing::Stride)?;
        let parallel = use_parallel(height, width, parallel_threshold);
        debug!("denormalize {width}x{height} (parallel={parallel})");

        let plane_len = width * height;
        let (red, rest) = planes.split_at(plane_len);
        let (green, blue) = rest.split_at(plane_len);
        out.for_each_row(RowAddressing::Stride, parallel, |y, row| {
            let start = y * width;
            let rows = (
                &red[start..start + width],
                &green[start..start + width],
                &blue[start..start + width],
            );
            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let color = Rgb::new(
                    self.inverse(0, rows.0[x]),
                    self.inverse(1, rows.1[x]),
                    self.inverse(2, rows.2[x]),
                );
                write_word(px, color.to_argb());
            }
        })
    }
}
