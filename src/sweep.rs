//! Row sharding shared by the kernels

use rayon::prelude::*;

/// Frames at or above this many pixels are split across the rayon pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 200_000;

#[inline]
pub(crate) fn use_parallel(height: usize, width: usize, threshold: usize) -> bool {
    height >= 4 && height.saturating_mul(width) >= threshold
}

/// Hands row `y` of each of the three `[3][height][width]` planes to `f`.
/// `planes` must hold exactly `3 * height * width` values.
pub(crate) fn for_each_plane_row<F>(
    planes: &mut [f32],
    height: usize,
    width: usize,
    parallel: bool,
    f: F,
) where
    F: Fn(usize, &mut [f32], &mut [f32], &mut [f32]) + Sync + Send,
{
    let plane_len = height * width;
    if plane_len == 0 {
        return;
    }
    let (red, rest) = planes.split_at_mut(plane_len);
    let (green, blue) = rest.split_at_mut(plane_len);

    if parallel {
        red.par_chunks_mut(width)
            .zip(green.par_chunks_mut(width))
            .zip(blue.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, ((r, g), b))| f(y, r, g, b));
    } else {
        for (y, ((r, g), b)) in red
            .chunks_mut(width)
            .zip(green.chunks_mut(width))
            .zip(blue.chunks_mut(width))
            .enumerate()
        {
            f(y, r, g, b);
        }
    }
}
