//! File bridges for the command-line tool: raw little-endian f32 tensors and
//! PNG images.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use image::{Rgba, RgbaImage};

use crate::error::KernelError;
use crate::surface::Bitmap;
use crate::types::unpack_argb;

/// Reads a headerless little-endian f32 file.
pub fn read_f32_le(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).with_context(|| format!("reading tensor {}", path.display()))?;
    if bytes.len() % 4 != 0 {
        bail!(
            "{} is {} bytes, not a whole number of f32 values",
            path.display(),
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

pub fn write_f32_le(path: &Path, values: &[f32]) -> Result<()> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, bytes).with_context(|| format!("writing tensor {}", path.display()))
}

#[must_use]
pub fn bitmap_to_rgba(bitmap: &Bitmap) -> RgbaImage {
    RgbaImage::from_fn(bitmap.width() as u32, bitmap.height() as u32, |x, y| {
        let (a, r, g, b) = unpack_argb(bitmap.pixel(x as usize, y as usize));
        Rgba([r, g, b, a])
    })
}

pub fn rgba_to_bitmap(img: &RgbaImage) -> Result<Bitmap, KernelError> {
    let mut bitmap = Bitmap::new(img.width() as usize, img.height() as usize)?;
    for (x, y, Rgba([r, g, b, a])) in img.enumerate_pixels() {
        let argb = u32::from(*a) << 24 | u32::from(*r) << 16 | u32::from(*g) << 8 | u32::from(*b);
        bitmap.set_pixel(x as usize, y as usize, argb);
    }
    Ok(bitmap)
}

pub fn load_png(path: &Path) -> Result<Bitmap> {
    let img = image::open(path)
        .with_context(|| format!("opening image {}", path.display()))?
        .to_rgba8();
    Ok(rgba_to_bitmap(&img)?)
}

pub fn save_png(bitmap: &Bitmap, path: &Path) -> Result<()> {
    bitmap_to_rgba(bitmap)
        .save(path)
        .with_context(|| format!("saving image {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn raw_tensor_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.f32");
        let values = [0.0f32, -1.5, 3.25, f32::MAX];
        write_f32_le(&path, &values).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 16);
        assert_eq!(read_f32_le(&path).unwrap(), values);
    }

    #[test]
    fn truncated_tensor_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.f32");
        fs::write(&path, [0u8; 7]).unwrap();
        let err = read_f32_le(&path).unwrap_err();
        assert!(err.to_string().contains("not a whole number"));
    }

    #[test]
    fn png_keeps_argb_channels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        let mut bitmap = Bitmap::new(2, 1).unwrap();
        bitmap.set_pixel(0, 0, 0xFF10_2030);
        bitmap.set_pixel(1, 0, 0x80FF_0000);
        save_png(&bitmap, &path).unwrap();
        let loaded = load_png(&path).unwrap();
        assert_eq!(loaded.to_argb_vec(), bitmap.to_argb_vec());
    }
}
