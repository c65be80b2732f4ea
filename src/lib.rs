//! Pixel kernels for on-device vision inference: argmax segmentation
//! rendering, scalar heatmaps, alpha compositing into planar model input,
//! and mean/std normalization.

pub mod argmax;
pub mod colormap;
pub mod composite;
pub mod error;
pub mod framebuffer;
pub mod imageio;
pub mod normalize;
pub mod panic_handler;
pub mod scalar;
pub mod settings;
pub mod surface;
pub mod sweep;
pub mod types;

pub use argmax::{ArgmaxColorMapper, ArgmaxPolicy};
pub use composite::AlphaCompositor;
pub use error::KernelError;
pub use framebuffer::{BitmapInfo, Framebuffer, FramebufferMut, RowAddressing};
pub use normalize::Normalization;
pub use scalar::{ScalarColorMapper, ScalarMode};
pub use surface::{Bitmap, PixelLease, PixelSurface, with_locked};
pub use types::{BackgroundColor, Palette, PixelFormat, Rgb, TensorView};
