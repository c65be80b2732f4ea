//! Errors reported by the pixel kernels

use crate::types::PixelFormat;

/// Errors from kernel invocations.
///
/// Everything except [`KernelError::Lock`] is a precondition violation and is
/// reported before any output memory is touched.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("tensor must have at least one channel")]
    NoChannels,

    #[error(
        "tensor holds {actual} values, expected {expected} ({channels}x{height}x{width})"
    )]
    TensorShape {
        channels: usize,
        height: usize,
        width: usize,
        expected: usize,
        actual: usize,
    },

    #[error("palette has {colors} colors but the tensor has {channels} channels")]
    PaletteTooShort { colors: usize, channels: usize },

    #[error("unsupported pixel format {0:?}, expected ARGB_8888")]
    UnsupportedFormat(PixelFormat),

    #[error("bitmap is {actual_width}x{actual_height}, expected {width}x{height}")]
    BitmapSize {
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("row stride of {stride} bytes is smaller than a {width} pixel row")]
    StrideTooSmall { stride: usize, width: usize },

    #[error("pixel buffer holds {actual} bytes, needs {required}")]
    PixelBufferTooSmall { required: usize, actual: usize },

    #[error("plane buffer holds {actual} floats, expected {expected}")]
    PlaneLength { expected: usize, actual: usize },

    #[error("image dimensions {width}x{height} overflow addressable memory")]
    DimensionOverflow { width: usize, height: usize },

    #[error("failed to lock pixels: {detail}")]
    Lock { detail: String },
}

impl KernelError {
    pub fn lock(msg: impl Into<String>) -> Self {
        Self::Lock { detail: msg.into() }
    }

    /// Lock failures belong to the surface owner and may succeed on the next
    /// frame; every other variant is a caller bug.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Lock { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lock_failures_are_recoverable() {
        assert!(KernelError::lock("surface busy").is_recoverable());
        assert!(!KernelError::NoChannels.is_recoverable());
        assert!(
            !KernelError::UnsupportedFormat(PixelFormat::Rgb565).is_recoverable()
        );
    }

    #[test]
    fn messages_name_the_offending_sizes() {
        let err = KernelError::PaletteTooShort {
            colors: 2,
            channels: 21,
        };
        assert_eq!(
            err.to_string(),
            "palette has 2 colors but the tensor has 21 channels"
        );

        let err = KernelError::TensorShape {
            channels: 3,
            height: 2,
            width: 2,
            expected: 12,
            actual: 11,
        };
        assert_eq!(
            err.to_string(),
            "tensor holds 11 values, expected 12 (3x2x2)"
        );
    }
}
