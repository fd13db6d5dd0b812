use crate::error::ImageError;
use crate::image::{Image, ImageSize};

/// A binary foreground/background mask with the same layout as an [`Image`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    size: ImageSize,
    data: Vec<bool>,
}

impl Mask {
    /// Create a mask from row-major foreground flags.
    pub fn new(size: ImageSize, data: Vec<bool>) -> Result<Self, ImageError> {
        if data.len() != size.width * size.height {
            return Err(ImageError::InvalidMaskLength(
                data.len(),
                size.width * size.height,
            ));
        }
        Ok(Self { size, data })
    }

    /// Create a mask where every pixel has the same value.
    pub fn from_size_val(size: ImageSize, val: bool) -> Self {
        Self {
            size,
            data: vec![val; size.width * size.height],
        }
    }

    /// Classify a single-channel image as a mask.
    ///
    /// The image must hold at most two distinct values. With two values the larger one is
    /// foreground; with a single value the whole image is foreground unless that value is zero.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::NotAMask`] when the image looks like a grayscale photo.
    pub fn from_gray(image: &Image<u8, 1>) -> Result<Self, ImageError> {
        let mut seen = [false; 256];
        for &v in image.as_slice() {
            seen[v as usize] = true;
        }
        let distinct: Vec<u8> = (0..=255u8).filter(|&v| seen[v as usize]).collect();
        let foreground = match distinct.as_slice() {
            [] => return Ok(Self::from_size_val(image.size(), false)),
            [only] if *only == 0 => return Ok(Self::from_size_val(image.size(), false)),
            [only] => *only,
            [_, high] => *high,
            many => return Err(ImageError::NotAMask(many.len())),
        };
        let data = image.as_slice().iter().map(|&v| v == foreground).collect();
        Ok(Self {
            size: image.size(),
            data,
        })
    }

    /// Binarize a single-channel image with a strict `> threshold` test.
    ///
    /// Use this for masks that went through interpolation (e.g. resized), where the
    /// two-value test no longer holds.
    pub fn from_gray_threshold(image: &Image<f32, 1>, threshold: f32) -> Self {
        Self {
            size: image.size(),
            data: image.as_slice().iter().map(|&v| v > threshold).collect(),
        }
    }

    /// Get the size of the mask in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Get the width of the mask in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Get the height of the mask in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Get the raw row-major flags.
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Whether the pixel at column `x` and row `y` is foreground. Out of bounds is background.
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.size.width && y < self.size.height && self.data[y * self.size.width + x]
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Pixel-wise AND of two masks of the same size.
    pub fn intersect(&self, other: &Mask) -> Result<Mask, ImageError> {
        if self.size != other.size {
            return Err(ImageError::InvalidImageSize(
                self.size.width,
                self.size.height,
                other.size.width,
                other.size.height,
            ));
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| a && b)
            .collect();
        Ok(Mask {
            size: self.size,
            data,
        })
    }
}
