/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when the data length does not match the image size.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when the mask flags do not cover the mask size.
    #[error("Mask has {0} values but its size needs {1}")]
    InvalidMaskLength(usize, usize),

    /// Error when two images or an image and a mask have different sizes.
    #[error("Image size mismatch: ({0}x{1}) != ({2}x{3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when the pixel coordinates are out of bounds.
    #[error("Pixel coordinate ({0}, {1}) is out of bounds ({2}x{3})")]
    PixelIndexOutOfBounds(usize, usize, usize, usize),

    /// Error when a single-channel image holds more than two distinct values.
    #[error("Image has {0} distinct values, a mask must have at most two")]
    NotAMask(usize),
}
