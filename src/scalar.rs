//! Single-channel rendering: grayscale intensity or rainbow gradient

use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::colormap;
use crate::error::KernelError;
use crate::framebuffer::{BYTES_PER_PIXEL, FramebufferMut, RowAddressing, write_word};
use crate::surface::{PixelSurface, with_locked};
use crate::sweep::{DEFAULT_PARALLEL_THRESHOLD, use_parallel};
use crate::types::TensorView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarMode {
    #[default]
    Grayscale,
    Gradient,
}

impl FromStr for ScalarMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grayscale" | "gray" => Ok(Self::Grayscale),
            "gradient" => Ok(Self::Gradient),
            other => Err(format!(
                "unknown scalar mode {other:?}, expected grayscale or gradient"
            )),
        }
    }
}

/// Renders the first plane of a tensor. Rows are always located by stride.
#[derive(Debug, Clone, Copy)]
pub struct ScalarColorMapper {
    mode: ScalarMode,
    parallel_threshold: usize,
}

impl ScalarColorMapper {
    #[must_use]
    pub fn new(mode: ScalarMode) -> Self {
        Self {
            mode,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    #[must_use]
    pub fn parallel_threshold(mut self, pixels: usize) -> Self {
        self.parallel_threshold = pixels;
        self
    }

    pub fn map(
        &self,
        tensor: &TensorView<'_>,
        out: &mut FramebufferMut<'_>,
    ) -> Result<(), KernelError> {
        let (height, width) = (tensor.height(), tensor.width());
        out.info().ensure_size(width, height)?;
        out.check(RowAddressing::Stride)?;

        let parallel = use_parallel(height, width, self.parallel_threshold);
        debug!(
            "scalar {}x{} ({:?}, parallel={}, ignored planes={})",
            height,
            width,
            self.mode,
            parallel,
            tensor.channels() - 1
        );

        let mode = self.mode;
        out.for_each_row(RowAddressing::Stride, parallel, |y, row| {
            map_row(tensor.row(0, y), mode, row);
        })
    }

    pub fn render<S>(&self, tensor: &TensorView<'_>, surface: &mut S) -> Result<(), KernelError>
    where
        S: PixelSurface + ?Sized,
    {
        let info = surface.info();
        info.ensure_argb()?;
        info.ensure_size(tensor.width(), tensor.height())?;
        with_locked(surface, |mut fb| self.map(tensor, &mut fb))
    }
}

#[inline]
fn map_row(values: &[f32], mode: ScalarMode, row: &mut [u8]) {
    let pixels = row.chunks_exact_mut(BYTES_PER_PIXEL);
    match mode {
        ScalarMode::Grayscale => {
            for (px, &v) in pixels.zip(values) {
                write_word(px, colormap::grayscale(v).to_argb());
            }
        }
        ScalarMode::Gradient => {
            for (px, &v) in pixels.zip(values) {
                write_word(px, colormap::rainbow(v).to_argb());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Bitmap;
    use crate::types::PixelFormat;

    fn render(mode: ScalarMode, data: &[f32], height: usize, width: usize) -> Bitmap {
        let tensor = TensorView::scalar(data, height, width).unwrap();
        let mut bitmap = Bitmap::new(width, height).unwrap();
        ScalarColorMapper::new(mode)
            .render(&tensor, &mut bitmap)
            .unwrap();
        bitmap
    }

    #[test]
    fn grayscale_levels() {
        let bitmap = render(ScalarMode::Grayscale, &[0.0, 1.0, 0.5], 1, 3);
        assert_eq!(
            bitmap.to_argb_vec(),
            vec![0xFF00_0000, 0xFFFF_FFFF, 0xFF7F_7F7F]
        );
    }

    #[test]
    fn gradient_zero_is_black() {
        let bitmap = render(ScalarMode::Gradient, &[0.0], 1, 1);
        assert_eq!(bitmap.pixel(0, 0), 0xFF00_0000);
    }

    #[test]
    fn gradient_midpoint_is_green() {
        let bitmap = render(ScalarMode::Gradient, &[0.5, 1.0], 1, 2);
        assert_eq!(bitmap.to_argb_vec(), vec![0xFF00_FF00, 0xFF00_00FF]);
    }

    #[test]
    fn only_first_plane_is_read() {
        // second plane would render white if it were read
        let bitmap = render(ScalarMode::Grayscale, &[0.0, 0.0, 1.0, 1.0], 1, 2);
        assert_eq!(bitmap.to_argb_vec(), vec![0xFF00_0000, 0xFF00_0000]);
    }

    #[test]
    fn padded_rows_land_on_stride() {
        let data = [0.0f32, 1.0];
        let tensor = TensorView::scalar(&data, 2, 1).unwrap();
        let mut bitmap = Bitmap::with_stride(1, 2, 12).unwrap();
        ScalarColorMapper::new(ScalarMode::Grayscale)
            .render(&tensor, &mut bitmap)
            .unwrap();
        assert_eq!(bitmap.pixel(0, 0), 0xFF00_0000);
        assert_eq!(bitmap.pixel(0, 1), 0xFFFF_FFFF);
        assert_eq!(&bitmap.bytes()[4..12], &[0; 8]);
    }

    #[test]
    fn out_of_range_values_wrap() {
        let bitmap = render(ScalarMode::Grayscale, &[1.2], 1, 1);
        assert_eq!(bitmap.pixel(0, 0), 0xFF32_3232);
    }

    #[test]
    fn parallel_sweep_matches_sequential() {
        let (height, width) = (9, 13);
        let data: Vec<f32> = (0..height * width)
            .map(|i| i as f32 / (height * width) as f32)
            .collect();
        let tensor = TensorView::scalar(&data, height, width).unwrap();
        for mode in [ScalarMode::Grayscale, ScalarMode::Gradient] {
            let mut sequential = Bitmap::new(width, height).unwrap();
            let mut parallel = Bitmap::new(width, height).unwrap();
            ScalarColorMapper::new(mode)
                .parallel_threshold(usize::MAX)
                .render(&tensor, &mut sequential)
                .unwrap();
            ScalarColorMapper::new(mode)
                .parallel_threshold(0)
                .render(&tensor, &mut parallel)
                .unwrap();
            assert_eq!(sequential.to_argb_vec(), parallel.to_argb_vec());
        }
    }

    #[test]
    fn rejects_non_argb_bitmaps() {
        let data = [0.0f32];
        let tensor = TensorView::scalar(&data, 1, 1).unwrap();
        let mut bitmap = Bitmap::with_format(1, 1, PixelFormat::Rgb565).unwrap();
        assert!(matches!(
            ScalarColorMapper::new(ScalarMode::Gradient).render(&tensor, &mut bitmap),
            Err(KernelError::UnsupportedFormat(PixelFormat::Rgb565))
        ));
    }

    #[test]
    fn mode_parses_from_cli_names() {
        assert_eq!("gray".parse::<ScalarMode>().unwrap(), ScalarMode::Grayscale);
        assert_eq!(
            "gradient".parse::<ScalarMode>().unwrap(),
            ScalarMode::Gradient
        );
        assert!("rainbow".parse::<ScalarMode>().is_err());
    }
}
