#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the image module.
pub mod error;

/// Image representation for rendered and captured frames.
pub mod image;

/// Binary segmentation masks.
pub mod mask;

/// Pixel-wise operations on images and masks.
pub mod ops;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize, Rgb8Image};
pub use crate::mask::Mask;
