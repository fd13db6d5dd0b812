use thiserror::Error;
use vision6d_3d::io::PoseIoError;
use vision6d_3d::{CameraError, MeshError};
use vision6d_image::ImageError;

use crate::color_code::ColorCodeError;
use crate::config::ConfigError;
use crate::correspondence::ExtractError;
use crate::pose_state::PoseStateError;
use crate::renderer::RenderError;

/// Any error raised by a [`crate::RegistrationSession`].
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// No mesh with this name was added.
    #[error("Unknown mesh '{0}'")]
    UnknownMesh(String),

    /// Vertex color encoding failed.
    #[error(transparent)]
    ColorCode(#[from] ColorCodeError),

    /// Correspondence extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Pose bookkeeping failed.
    #[error(transparent)]
    PoseState(#[from] PoseStateError),

    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Loading the configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An image or mask was malformed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The camera is degenerate.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// The mesh is malformed.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// Reading or writing a pose file failed.
    #[error(transparent)]
    PoseIo(#[from] PoseIoError),
}
