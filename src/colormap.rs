//! Scalar-to-color rules shared by the mappers
//!
//! Channel values are computed in `i32` and stored as their low 8 bits, so
//! inputs outside `[0, 1]` alias instead of saturating. Callers that want
//! clamped output clamp the tensor first.

use crate::types::Rgb;

#[inline]
fn round_channel(v: f32) -> i32 {
    v.round() as i32
}

/// Two-stage rainbow: `t = 0` is black, `0.5` pure green, `1.0` pure blue.
///
/// Below the midpoint red is `255 - round(2 * (0.5 - t) * 255)`, which is why
/// the low end starts at black and brightens toward yellow-green.
#[inline]
#[must_use]
pub fn rainbow(t: f32) -> Rgb {
    if t < 0.5 {
        let red = 255 - round_channel(2.0 * (0.5 - t) * 255.0);
        let green = round_channel(2.0 * t * 255.0);
        Rgb::new(red as u8, green as u8, 0)
    } else {
        let green = round_channel((-2.0 * t + 2.0) * 255.0);
        let blue = round_channel(2.0 * (t - 0.5) * 255.0);
        Rgb::new(0, green as u8, blue as u8)
    }
}

/// `trunc(v * 255)` stored in 8 bits, so `0.5` is 127.
#[inline]
#[must_use]
pub fn grayscale(v: f32) -> Rgb {
    Rgb::gray((v * 255.0) as i32 as u8)
}

/// Rainbow color for class `index` out of `classes`. The ratio divides by the
/// class count, so the last class stays short of pure blue.
#[must_use]
pub fn class_rainbow(index: usize, classes: usize) -> Rgb {
    rainbow(index as f32 / classes as f32)
}

/// Gray level spreading class indices over `0..=255`; a single class is black.
#[must_use]
pub fn class_gray(index: usize, classes: usize) -> Rgb {
    if classes <= 1 {
        return Rgb::gray(0);
    }
    let level = (index as f32 / (classes - 1) as f32 * 255.0) as i32;
    Rgb::gray(level as u8)
}
