#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pinhole camera model: intrinsics, extrinsics and the derived renderer view parameters.
pub mod camera;

/// Reading and writing persisted poses.
pub mod io;

/// Triangle meshes.
pub mod mesh;

/// 4x4 poses and mirror composition.
pub mod pose;

/// Rigid alignment of point sets (Kabsch / Umeyama).
pub mod rigid;

/// Rotation group helpers.
pub mod so3;

pub use camera::{CameraError, CameraExtrinsics, CameraIntrinsics, CameraModel, ViewParams};
pub use mesh::{MeshError, TriMesh};
pub use pose::{MirrorAxis, MirrorState, Pose};
