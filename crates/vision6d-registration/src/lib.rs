#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The pipeline: color every mesh vertex with a unique code ([`ColorCode`]), render the mesh,
//! decode the render back into 2D-3D pairs ([`CorrespondenceExtractor`]), solve for the pose
//! with RANSAC + EPnP ([`RobustPoseSolver`]) and commit it to the undoable [`PoseState`].
//!
//! ```rust
//! use vision6d_3d::{Pose, TriMesh};
//! use vision6d_registration::{RegistrationConfig, RegistrationSession};
//!
//! let mut vertices = Vec::new();
//! for i in 0..5 {
//!     for j in 0..5 {
//!         for k in 0..3 {
//!             vertices.push([i as f64 - 2.0, j as f64 - 2.0, k as f64 - 1.0]);
//!         }
//!     }
//! }
//! let mut session = RegistrationSession::new(&RegistrationConfig::default())?;
//! session.add_mesh("ossicles", TriMesh::from_points(vertices)?)?;
//!
//! let truth = Pose::from_rows([
//!     [0.8, 0.0, 0.6, 9.0],
//!     [0.0, 1.0, 0.0, 5.0],
//!     [-0.6, 0.0, 0.8, 10.0],
//!     [0.0, 0.0, 0.0, 1.0],
//! ]);
//! session.pose_state_mut().commit(truth)?;
//! let registration = session.register_rendered("ossicles", None)?;
//! assert!(registration.committed);
//! assert!(registration.pose.abs_diff_eq(&truth, 4.0));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Per-vertex color codes (NOCS and LatLon).
pub mod color_code;

/// Session configuration files.
pub mod config;

/// Decoding color-coded renders into correspondences.
pub mod correspondence;

/// The session-level error type.
pub mod error;

/// Entity poses, mirror flags and the undo history.
pub mod pose_state;

/// The renderer contract and a vertex-splat reference renderer.
pub mod renderer;

/// Per-document registration context.
pub mod session;

/// RANSAC pose solving that never fails across its boundary.
pub mod solver;

pub use color_code::{ColorCode, ColorCodeError, ColorScheme};
pub use config::{CameraConfig, ConfigError, RegistrationConfig};
pub use correspondence::{CorrespondenceExtractor, Correspondences, ExtractError, ExtractorConfig};
pub use error::RegistrationError;
pub use pose_state::{PoseHistory, PoseState, PoseStateConfig, PoseStateError};
pub use renderer::{RenderError, Renderer, RendererConfig, VertexSplatRenderer};
pub use session::{Registration, RegistrationSession};
pub use solver::{PoseEstimate, RobustPoseSolver};
