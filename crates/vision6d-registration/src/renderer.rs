use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision6d_3d::{CameraError, CameraModel, Pose, TriMesh};
use vision6d_image::{ImageSize, Rgb8Image};

/// Error types for renderers.
#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    /// One color per vertex is required.
    #[error("Got {colors} vertex colors for a mesh with {vertices} vertices")]
    ColorCountMismatch {
        /// Number of colors given.
        colors: usize,
        /// Number of mesh vertices.
        vertices: usize,
    },

    /// The camera is degenerate.
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Turns a posed, per-vertex colored mesh into an RGB image.
///
/// Pixel `(0, 0)` is the top-left corner and the projection must match
/// [`CameraModel::project_world`], otherwise decoded correspondences are wrong.
pub trait Renderer {
    /// Color of pixels no surface covers.
    fn background(&self) -> [u8; 3];

    /// Render `mesh` at the scene-frame `pose` with one color per vertex.
    fn render(
        &self,
        mesh: &TriMesh,
        pose: &Pose,
        colors: &[[u8; 3]],
        camera: &CameraModel,
    ) -> Result<Rgb8Image, RenderError>;
}

/// Parameters of [`VertexSplatRenderer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Half side of the square drawn per vertex, in pixels. `0` draws single pixels.
    pub splat_radius: usize,
    /// Clear color.
    pub background: [u8; 3],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            splat_radius: 0,
            background: [0, 0, 0],
        }
    }
}

/// Draws every vertex as a flat square at its projected pixel, nearest vertex wins.
///
/// Vertex colors are never blended, so every covered pixel carries an exact color code.
#[derive(Debug, Clone, Default)]
pub struct VertexSplatRenderer {
    config: RendererConfig,
}

impl VertexSplatRenderer {
    /// Create a renderer.
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }
}

impl Renderer for VertexSplatRenderer {
    fn background(&self) -> [u8; 3] {
        self.config.background
    }

    fn render(
        &self,
        mesh: &TriMesh,
        pose: &Pose,
        colors: &[[u8; 3]],
        camera: &CameraModel,
    ) -> Result<Rgb8Image, RenderError> {
        if colors.len() != mesh.num_vertices() {
            return Err(RenderError::ColorCountMismatch {
                colors: colors.len(),
                vertices: mesh.num_vertices(),
            });
        }
        camera.validate()?;

        let width = camera.intrinsics.width;
        let height = camera.intrinsics.height;
        let mut image = Rgb8Image::from_size_pixel(
            ImageSize { width, height },
            self.config.background,
        );
        let mut depth = vec![f64::INFINITY; width * height];

        let view = camera.extrinsics.view_matrix();
        let r = self.config.splat_radius as i64;
        let data = image.as_slice_mut();
        for (v, color) in mesh.vertices().iter().zip(colors.iter()) {
            let p_cam = view.transform_point3(pose.transform_point(DVec3::from_array(*v)));
            let Some(uv) = camera.intrinsics.project(p_cam) else {
                continue;
            };
            let (cu, cv) = (uv.x.round() as i64, uv.y.round() as i64);
            for y in (cv - r)..=(cv + r) {
                for x in (cu - r)..=(cu + r) {
                    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                        continue;
                    }
                    let idx = y as usize * width + x as usize;
                    if p_cam.z < depth[idx] {
                        depth[idx] = p_cam.z;
                        data[idx * 3..idx * 3 + 3].copy_from_slice(color);
                    }
                }
            }
        }
        Ok(image)
    }
}
