//! Argmax segmentation rendering
//!
//! Each pixel takes the color of the channel with the largest activation.
//! Ties go to the lowest channel index.

use log::debug;

use crate::colormap;
use crate::error::KernelError;
use crate::framebuffer::{BYTES_PER_PIXEL, FramebufferMut, RowAddressing, write_word};
use crate::surface::{PixelSurface, with_locked};
use crate::sweep::{DEFAULT_PARALLEL_THRESHOLD, use_parallel};
use crate::types::{Palette, TensorView};

/// Channel indices are carried in f32 lanes, which are exact up to 2^24.
const MAX_SIMD_CHANNELS: usize = 1 << 24;

/// How the winning channel becomes a color
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgmaxPolicy {
    /// `palette[channel]`
    Palette(Palette),
    /// Rainbow at `channel / channels`
    Gradient,
    /// Gray at `channel / (channels - 1)`
    ClassGray,
}

#[derive(Debug, Clone)]
pub struct ArgmaxColorMapper {
    policy: ArgmaxPolicy,
    addressing: RowAddressing,
    parallel_threshold: usize,
}

impl ArgmaxColorMapper {
    #[must_use]
    pub fn new(policy: ArgmaxPolicy) -> Self {
        Self {
            policy,
            addressing: RowAddressing::default(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_palette(palette: Palette) -> Self {
        Self::new(ArgmaxPolicy::Palette(palette))
    }

    #[must_use]
    pub fn gradient() -> Self {
        Self::new(ArgmaxPolicy::Gradient)
    }

    #[must_use]
    pub fn class_gray() -> Self {
        Self::new(ArgmaxPolicy::ClassGray)
    }

    #[must_use]
    pub fn addressing(mut self, addressing: RowAddressing) -> Self {
        self.addressing = addressing;
        self
    }

    #[must_use]
    pub fn parallel_threshold(mut self, pixels: usize) -> Self {
        self.parallel_threshold = pixels;
        self
    }

    /// Opaque ARGB word for every channel, built once per frame.
    fn color_table(&self, channels: usize) -> Result<Vec<u32>, KernelError> {
        let table = match &self.policy {
            ArgmaxPolicy::Palette(palette) => {
                palette.ensure_covers(channels)?;
                palette.colors()[..channels]
                    .iter()
                    .map(|c| c.to_argb())
                    .collect()
            }
            ArgmaxPolicy::Gradient => (0..channels)
                .map(|c| colormap::class_rainbow(c, channels).to_argb())
                .collect(),
            ArgmaxPolicy::ClassGray => (0..channels)
                .map(|c| colormap::class_gray(c, channels).to_argb())
                .collect(),
        };
        Ok(table)
    }

    /// Renders `tensor` into `out`, which must match its height and width.
    pub fn map(
        &self,
        tensor: &TensorView<'_>,
        out: &mut FramebufferMut<'_>,
    ) -> Result<(), KernelError> {
        let table = self.color_table(tensor.channels())?;
        self.map_with_table(tensor, out, &table)
    }

    fn map_with_table(
        &self,
        tensor: &TensorView<'_>,
        out: &mut FramebufferMut<'_>,
        table: &[u32],
    ) -> Result<(), KernelError> {
        let (channels, height, width) = (tensor.channels(), tensor.height(), tensor.width());
        out.info().ensure_size(width, height)?;
        out.check(self.addressing)?;

        let parallel = use_parallel(height, width, self.parallel_threshold);
        debug!(
            "argmax {}x{}x{} ({:?}, {:?}, parallel={})",
            channels, height, width, self.policy_name(), self.addressing, parallel
        );

        out.for_each_row(self.addressing, parallel, |y, row| {
            map_row(tensor, y, table, row);
        })
    }

    /// Locks `surface`, renders, and releases the lock on every path.
    pub fn render<S>(&self, tensor: &TensorView<'_>, surface: &mut S) -> Result<(), KernelError>
    where
        S: PixelSurface + ?Sized,
    {
        let info = surface.info();
        info.ensure_argb()?;
        info.ensure_size(tensor.width(), tensor.height())?;
        let table = self.color_table(tensor.channels())?;
        with_locked(surface, |mut fb| self.map_with_table(tensor, &mut fb, &table))
    }

    fn policy_name(&self) -> &'static str {
        match self.policy {
            ArgmaxPolicy::Palette(_) => "palette",
            ArgmaxPolicy::Gradient => "gradient",
            ArgmaxPolicy::ClassGray => "class-gray",
        }
    }
}

/// Fills output row `y`.
fn map_row(tensor: &TensorView<'_>, y: usize, table: &[u32], row: &mut [u8]) {
    let width = row.len() / BYTES_PER_PIXEL;
    let simd_width = if tensor.channels() <= MAX_SIMD_CHANNELS {
        width / 8 * 8
    } else {
        0
    };
    let (simd_part, remainder) = row.split_at_mut(simd_width * BYTES_PER_PIXEL);

    for (chunk_idx, chunk) in simd_part.chunks_exact_mut(8 * BYTES_PER_PIXEL).enumerate() {
        let winners = simd_argmax::argmax8(tensor, y, chunk_idx * 8);
        for (px, c) in chunk.chunks_exact_mut(BYTES_PER_PIXEL).zip(winners) {
            write_word(px, table[c as usize]);
        }
    }

    for (i, px) in remainder.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
        write_word(px, table[argmax_at(tensor, y, simd_width + i)]);
    }
}

#[inline]
fn argmax_at(tensor: &TensorView<'_>, y: usize, x: usize) -> usize {
    let mut chosen = 0;
    let mut max = tensor.row(0, y)[x];
    for c in 1..tensor.channels() {
        let v = tensor.row(c, y)[x];
        if v > max {
            max = v;
            chosen = c;
        }
    }
    chosen
}

mod simd_argmax {
    use wide::{CmpGt, f32x8};

    use crate::types::TensorView;

    #[inline]
    fn load(plane: &[f32], x: usize) -> f32x8 {
        let mut lanes = [0.0f32; 8];
        lanes.copy_from_slice(&plane[x..x + 8]);
        f32x8::from(lanes)
    }

    /// Winning channel for the eight pixels starting at `x`. A lane only
    /// switches on a strict `>`, matching the scalar scan for ties and NaN.
    #[inline]
    pub fn argmax8(tensor: &TensorView<'_>, y: usize, x: usize) -> [u32; 8] {
        let mut best = load(tensor.row(0, y), x);
        let mut best_idx = f32x8::splat(0.0);
        for c in 1..tensor.channels() {
            let v = load(tensor.row(c, y), x);
            let greater = v.cmp_gt(best);
            best = greater.blend(v, best);
            best_idx = greater.blend(f32x8::splat(c as f32), best_idx);
        }
        best_idx.to_array().map(|i| i as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::BitmapInfo;
    use crate::surface::Bitmap;
    use crate::surface::testing::BusySurface;
    use crate::types::{PixelFormat, Rgb};

    fn red_green() -> Palette {
        Palette::new(vec![Rgb::new(255, 0, 0), Rgb::new(0, 255, 0)])
    }

    /// Deterministic values with plenty of exact ties
    fn sample_tensor(channels: usize, height: usize, width: usize) -> Vec<f32> {
        (0..channels * height * width)
            .map(|i| ((i * 7919 + 13) % 11) as f32 * 0.25)
            .collect()
    }

    fn scalar_reference(tensor: &TensorView<'_>, table: &[u32]) -> Vec<u32> {
        let mut out = Vec::new();
        for y in 0..tensor.height() {
            for x in 0..tensor.width() {
                out.push(table[argmax_at(tensor, y, x)]);
            }
        }
        out
    }

    #[test]
    fn palette_picks_highest_channel() {
        let data = [0.2f32, 0.9];
        let tensor = TensorView::new(&data, 2, 1, 1).unwrap();
        let mut bitmap = Bitmap::new(1, 1).unwrap();
        ArgmaxColorMapper::with_palette(red_green())
            .render(&tensor, &mut bitmap)
            .unwrap();
        assert_eq!(bitmap.pixel(0, 0), 0xFF00_FF00);
    }

    #[test]
    fn ties_go_to_lowest_channel() {
        let data = [1.0f32, 1.0];
        let tensor = TensorView::new(&data, 2, 1, 1).unwrap();
        let mut bitmap = Bitmap::new(1, 1).unwrap();
        ArgmaxColorMapper::with_palette(red_green())
            .render(&tensor, &mut bitmap)
            .unwrap();
        assert_eq!(bitmap.pixel(0, 0), 0xFFFF_0000);
    }

    #[test]
    fn ties_go_to_lowest_channel_in_simd_lanes() {
        // 16 pixels so every pixel goes through the vector path
        let data = vec![1.0f32; 2 * 16];
        let tensor = TensorView::new(&data, 2, 1, 16).unwrap();
        let mut bitmap = Bitmap::new(16, 1).unwrap();
        ArgmaxColorMapper::with_palette(red_green())
            .render(&tensor, &mut bitmap)
            .unwrap();
        assert!(bitmap.to_argb_vec().iter().all(|&px| px == 0xFFFF_0000));
    }

    #[test]
    fn simd_matches_scalar() {
        let widths = [1, 7, 8, 9, 15, 16, 17, 33, 64];
        for &width in &widths {
            for channels in [1, 2, 5, 21] {
                let height = 3;
                let data = sample_tensor(channels, height, width);
                let tensor = TensorView::new(&data, channels, height, width).unwrap();
                let table: Vec<u32> = (0..channels as u32).collect();

                let mut bitmap = Bitmap::new(width, height).unwrap();
                let mapper = ArgmaxColorMapper::with_palette(Palette::segmentation());
                let mut lease = bitmap.lock_pixels().unwrap();
                let info = BitmapInfo::packed(width, height).unwrap();
                let mut fb = FramebufferMut::new(&mut lease, info).unwrap();
                fb.for_each_row(RowAddressing::Stride, false, |y, row| {
                    map_row(&tensor, y, &table, row);
                })
                .unwrap();
                drop(lease);

                assert_eq!(
                    bitmap.to_argb_vec(),
                    scalar_reference(&tensor, &table),
                    "SIMD and scalar mismatch for width={width}, channels={channels}"
                );
                // mapper itself agrees with the reference through its palette
                let mut via_mapper = Bitmap::new(width, height).unwrap();
                mapper.render(&tensor, &mut via_mapper).unwrap();
                let palette_table = mapper.color_table(channels).unwrap();
                assert_eq!(via_mapper.to_argb_vec(), scalar_reference(&tensor, &palette_table));
            }
        }
    }

    #[test]
    fn nan_never_wins() {
        let mut data = vec![0.5f32; 3 * 9];
        // pixel 0: NaN in channel 0 keeps channel 0
        data[0] = f32::NAN;
        data[9] = 0.9;
        // pixel 1: NaN in a later channel is skipped
        data[9 + 1] = f32::NAN;
        data[18 + 1] = 0.7;
        let tensor = TensorView::new(&data, 3, 1, 9).unwrap();
        assert_eq!(argmax_at(&tensor, 0, 0), 0);
        assert_eq!(argmax_at(&tensor, 0, 1), 2);
        let simd = simd_argmax::argmax8(&tensor, 0, 0);
        assert_eq!(simd[0], 0);
        assert_eq!(simd[1], 2);
    }

    #[test]
    fn every_pixel_is_written_opaque() {
        let (channels, height, width) = (4, 5, 11);
        let data = sample_tensor(channels, height, width);
        let tensor = TensorView::new(&data, channels, height, width).unwrap();
        for mapper in [
            ArgmaxColorMapper::gradient(),
            ArgmaxColorMapper::class_gray(),
            ArgmaxColorMapper::with_palette(Palette::segmentation()),
        ] {
            let mut bitmap = Bitmap::new(width, height).unwrap();
            mapper.render(&tensor, &mut bitmap).unwrap();
            let pixels = bitmap.to_argb_vec();
            assert_eq!(pixels.len(), height * width);
            assert!(pixels.iter().all(|px| px >> 24 == 0xFF));
        }
    }

    #[test]
    fn gradient_uses_channel_count_as_denominator() {
        // channel 3 of 4 wins
        let data = [0.0f32, 0.1, 0.2, 0.3];
        let tensor = TensorView::new(&data, 4, 1, 1).unwrap();
        let mut bitmap = Bitmap::new(1, 1).unwrap();
        ArgmaxColorMapper::gradient()
            .render(&tensor, &mut bitmap)
            .unwrap();
        assert_eq!(bitmap.pixel(0, 0), colormap::rainbow(0.75).to_argb());
    }

    #[test]
    fn class_gray_spreads_indices() {
        let data = [0.0f32, 0.0, 1.0];
        let tensor = TensorView::new(&data, 3, 1, 1).unwrap();
        let mut bitmap = Bitmap::new(1, 1).unwrap();
        ArgmaxColorMapper::class_gray()
            .render(&tensor, &mut bitmap)
            .unwrap();
        assert_eq!(bitmap.pixel(0, 0), 0xFFFF_FFFF);
    }

    #[test]
    fn short_palette_fails_before_touching_pixels() {
        let data = [0.1f32, 0.2, 0.3];
        let tensor = TensorView::new(&data, 3, 1, 1).unwrap();
        let mut bitmap = Bitmap::new(1, 1).unwrap();
        bitmap.fill(0x1234_5678);
        let err = ArgmaxColorMapper::with_palette(red_green())
            .render(&tensor, &mut bitmap)
            .unwrap_err();
        assert!(matches!(
            err,
            KernelError::PaletteTooShort {
                colors: 2,
                channels: 3
            }
        ));
        assert_eq!(bitmap.pixel(0, 0), 0x1234_5678);
        assert_eq!(bitmap.releases(), 0);
    }

    #[test]
    fn mismatched_bitmap_is_rejected() {
        let data = [0.0f32; 4];
        let tensor = TensorView::new(&data, 1, 2, 2).unwrap();
        let mut bitmap = Bitmap::new(3, 2).unwrap();
        assert!(matches!(
            ArgmaxColorMapper::gradient().render(&tensor, &mut bitmap),
            Err(KernelError::BitmapSize { .. })
        ));
        let mut wrong_format = Bitmap::with_format(2, 2, PixelFormat::Rgb565).unwrap();
        assert!(matches!(
            ArgmaxColorMapper::gradient().render(&tensor, &mut wrong_format),
            Err(KernelError::UnsupportedFormat(PixelFormat::Rgb565))
        ));
    }

    #[test]
    fn stride_addressing_respects_padding() {
        let data = [0.0f32, 1.0, 1.0, 0.0];
        let tensor = TensorView::new(&data, 2, 2, 1).unwrap();
        let mut bitmap = Bitmap::with_stride(1, 2, 16).unwrap();
        ArgmaxColorMapper::with_palette(red_green())
            .render(&tensor, &mut bitmap)
            .unwrap();
        assert_eq!(bitmap.pixel(0, 0), 0xFF00_FF00);
        assert_eq!(bitmap.pixel(0, 1), 0xFFFF_0000);
    }

    #[test]
    fn packed_addressing_ignores_padding() {
        let data = [0.0f32, 1.0, 1.0, 0.0];
        let tensor = TensorView::new(&data, 2, 2, 1).unwrap();
        let mut bitmap = Bitmap::with_stride(1, 2, 16).unwrap();
        ArgmaxColorMapper::with_palette(red_green())
            .addressing(RowAddressing::Packed)
            .render(&tensor, &mut bitmap)
            .unwrap();
        // the second row lands in the first row's padding
        assert_eq!(bitmap.pixel(0, 0), 0xFF00_FF00);
        assert_eq!(bitmap.pixel(1, 0), 0xFFFF_0000);
        assert_eq!(bitmap.pixel(0, 1), 0);
    }

    #[test]
    fn parallel_sweep_matches_sequential() {
        let (channels, height, width) = (6, 17, 23);
        let data = sample_tensor(channels, height, width);
        let tensor = TensorView::new(&data, channels, height, width).unwrap();
        let mut sequential = Bitmap::new(width, height).unwrap();
        let mut parallel = Bitmap::new(width, height).unwrap();
        ArgmaxColorMapper::gradient()
            .parallel_threshold(usize::MAX)
            .render(&tensor, &mut sequential)
            .unwrap();
        ArgmaxColorMapper::gradient()
            .parallel_threshold(0)
            .render(&tensor, &mut parallel)
            .unwrap();
        assert_eq!(sequential.to_argb_vec(), parallel.to_argb_vec());
    }

    #[test]
    fn lock_failure_leaves_surface_untouched() {
        let data = [0.5f32];
        let tensor = TensorView::new(&data, 1, 1, 1).unwrap();
        let mut surface = BusySurface {
            bitmap: Bitmap::new(1, 1).unwrap(),
        };
        let err = ArgmaxColorMapper::gradient()
            .render(&tensor, &mut surface)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(surface.bitmap.pixel(0, 0), 0);
    }
}
