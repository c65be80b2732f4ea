//! Flattens a translucent ARGB bitmap over a solid background into the
//! planar `[3][height][width]` floats a model takes as input.

use log::debug;

use crate::error::KernelError;
use crate::framebuffer::{BYTES_PER_PIXEL, Framebuffer, read_word};
use crate::surface::PixelSurface;
use crate::sweep::{DEFAULT_PARALLEL_THRESHOLD, for_each_plane_row, use_parallel};
use crate::types::{BackgroundColor, unpack_argb};

/// 255 for the alpha weight times 255 for the channel scale
const BLEND_SCALE: f32 = 255.0 * 255.0;

/// `(fg * a + bg * (255 - a)) / 255²`, already scaled to `[0, 1]`.
#[inline]
#[must_use]
pub fn blend(fg: u8, alpha: u8, bg: u8) -> f32 {
    let a = u32::from(alpha);
    (u32::from(fg) * a + u32::from(bg) * (255 - a)) as f32 / BLEND_SCALE
}

/// Checks that `planes` holds exactly three `width * height` planes.
pub fn ensure_planes(planes: usize, width: usize, height: usize) -> Result<(), KernelError> {
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(3))
        .ok_or(KernelError::DimensionOverflow { width, height })?;
    if planes != expected {
        return Err(KernelError::PlaneLength {
            expected,
            actual: planes,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct AlphaCompositor {
    background: BackgroundColor,
    parallel_threshold: usize,
}

impl Default for AlphaCompositor {
    fn default() -> Self {
        Self::new(BackgroundColor::WHITE)
    }
}

impl AlphaCompositor {
    #[must_use]
    pub fn new(background: BackgroundColor) -> Self {
        Self {
            background,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    #[must_use]
    pub fn parallel_threshold(mut self, pixels: usize) -> Self {
        self.parallel_threshold = pixels;
        self
    }

    /// Writes R, G and B planes for `src` into `planes`.
    pub fn composite(&self, src: &Framebuffer<'_>, planes: &mut [f32]) -> Result<(), KernelError> {
        let (width, height) = (src.width(), src.height());
        src.info().ensure_argb()?;
        ensure_planes(planes.len(), width, height)?;

        let parallel = use_parallel(height, width, self.parallel_threshold);
        debug!(
            "composite {}x{} over #{} (parallel={})",
            width, height, self.background, parallel
        );

        let bg = self.background.0;
        for_each_plane_row(planes, height, width, parallel, |y, r, g, b| {
            let pixels = src.row(y).chunks_exact(BYTES_PER_PIXEL);
            for (x, px) in pixels.enumerate() {
                let (a, pr, pg, pb) = unpack_argb(read_word(px));
                r[x] = blend(pr, a, bg.r);
                g[x] = blend(pg, a, bg.g);
                b[x] = blend(pb, a, bg.b);
            }
        });
        Ok(())
    }

    /// Locks `surface` for reading and composites it. The lock is released
    /// before returning.
    pub fn composite_surface<S>(&self, surface: &mut S, planes: &mut [f32]) -> Result<(), KernelError>
    where
        S: PixelSurface + ?Sized,
    {
        let info = surface.info();
        info.ensure_argb()?;
        ensure_planes(planes.len(), info.width, info.height)?;
        let lease = surface.lock_pixels().inspect_err(|e| {
            log::warn!(
                "{}x{} surface not locked for compositing: {e}",
                info.width,
                info.height
            );
        })?;
        let src = Framebuffer::new(&*lease, info)?;
        self.composite(&src, planes)
    }
}
