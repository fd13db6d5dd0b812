use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision6d_3d::TriMesh;
use vision6d_image::{ops, ImageError, Mask, Rgb8Image};

use crate::color_code::ColorCode;

/// Error types for correspondence extraction.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    /// The color table and the mesh disagree on the vertex count.
    #[error("Color code has {colors} entries but the mesh has {vertices} vertices")]
    ColorCodeMismatch {
        /// Entries in the color code.
        colors: usize,
        /// Vertices in the mesh.
        vertices: usize,
    },

    /// Image and mask sizes differ.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Parameters of [`CorrespondenceExtractor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Color of background pixels.
    pub background: [u8; 3],
    /// Largest per-channel difference still treated as background.
    pub tolerance: u8,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            background: [0, 0, 0],
            tolerance: 0,
        }
    }
}

/// Paired pixel and vertex coordinates, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correspondences {
    /// Pixel `(x, y)` of each foreground pixel.
    pub pixels: Vec<[f64; 2]>,
    /// Decoded vertex position in the object frame.
    pub points: Vec<[f64; 3]>,
    /// Decoded vertex index.
    pub vertex_indices: Vec<usize>,
}

impl Correspondences {
    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Whether no pair was found.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Turns a color-coded render into 2D-3D correspondences.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceExtractor {
    config: ExtractorConfig,
}

impl CorrespondenceExtractor {
    /// Create an extractor.
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// The extractor parameters.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Whether `rgb` differs from the background beyond the tolerance.
    pub fn is_foreground(&self, rgb: [u8; 3]) -> bool {
        rgb.iter()
            .zip(self.config.background.iter())
            .any(|(&c, &b)| c.abs_diff(b) > self.config.tolerance)
    }

    /// Binary mask of the non-background pixels.
    pub fn foreground_mask(&self, image: &Rgb8Image) -> Result<Mask, ImageError> {
        let data = image
            .as_slice()
            .chunks_exact(3)
            .map(|px| self.is_foreground([px[0], px[1], px[2]]))
            .collect();
        Mask::new(image.size(), data)
    }

    /// Copy of `image` with everything outside `mask` set to the background color.
    pub fn masked_render(&self, image: &Rgb8Image, mask: &Mask) -> Result<Rgb8Image, ImageError> {
        ops::apply_mask(image, mask, self.config.background)
    }

    /// Decode every foreground pixel, optionally restricted to `mask`.
    ///
    /// A render without foreground gives an empty set, not an error.
    pub fn extract(
        &self,
        image: &Rgb8Image,
        mask: Option<&Mask>,
        code: &ColorCode,
        mesh: &TriMesh,
    ) -> Result<Correspondences, ExtractError> {
        if code.len() != mesh.num_vertices() {
            return Err(ExtractError::ColorCodeMismatch {
                colors: code.len(),
                vertices: mesh.num_vertices(),
            });
        }

        let mut foreground = self.foreground_mask(image)?;
        if let Some(mask) = mask {
            foreground = foreground.intersect(mask)?;
        }

        let mut out = Correspondences::default();
        let mut cache: HashMap<[u8; 3], Option<usize>> = HashMap::new();
        for (x, y, px) in image.pixels() {
            if !foreground.get(x, y) {
                continue;
            }
            let rgb = [px[0], px[1], px[2]];
            let decoded = *cache.entry(rgb).or_insert_with(|| code.decode(rgb));
            let Some(idx) = decoded else {
                continue;
            };
            let Some(vertex) = mesh.vertices().get(idx) else {
                continue;
            };
            out.pixels.push([x as f64, y as f64]);
            out.points.push(*vertex);
            out.vertex_indices.push(idx);
        }

        log::debug!(
            "extracted {} correspondences from {} foreground pixels",
            out.len(),
            foreground.count()
        );
        Ok(out)
    }
}
