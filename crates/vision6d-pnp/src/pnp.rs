//! Common data types shared across Perspective-n-Point (PnP) solvers.

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision6d_3d::Pose;

/// Error types for PnP solvers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PnPError {
    /// Invalid input data - insufficient correspondences for the specific solver
    #[error("PnP solver requires at least {required} 2D-3D correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required by the solver
        required: usize,
        /// Actual number of correspondences provided
        actual: usize,
    },

    /// Invalid input data - mismatched array lengths with descriptive labels.
    #[error("Mismatched array lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedArrayLengths {
        /// Label for the left-hand slice
        left_name: &'static str,
        /// Length of the left-hand slice
        left_len: usize,
        /// Label for the right-hand slice
        right_name: &'static str,
        /// Length of the right-hand slice
        right_len: usize,
    },

    /// The linear system was singular or produced a non-finite pose, e.g. for coplanar or
    /// collinear point configurations.
    #[error("PnP solver diverged on {num_points} correspondences: {reason}")]
    SolverDiverged {
        /// Number of correspondences fed to the solver
        num_points: usize,
        /// What went wrong
        reason: String,
    },

    /// No RANSAC candidate gathered enough inliers.
    #[error("No inlier consensus: best candidate had {actual} inliers, {required} required ({num_points} correspondences)")]
    NoInlierConsensus {
        /// Minimum inlier count
        required: usize,
        /// Best inlier count seen
        actual: usize,
        /// Number of correspondences
        num_points: usize,
    },
}

impl PnPError {
    /// A stable, machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            PnPError::InsufficientCorrespondences { .. } => "insufficient_correspondences",
            PnPError::MismatchedArrayLengths { .. } => "mismatched_array_lengths",
            PnPError::SolverDiverged { .. } => "solver_diverged",
            PnPError::NoInlierConsensus { .. } => "no_inlier_consensus",
        }
    }

    pub(crate) fn diverged(num_points: usize, reason: impl Into<String>) -> Self {
        PnPError::SolverDiverged {
            num_points,
            reason: reason.into(),
        }
    }
}

/// Numeric tolerances used by linear algebra routines throughout the PnP pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericTol {
    /// Tolerance for singular-value decomposition.
    pub svd: f64,
    /// Epsilon threshold for determinant / singular-value checks when deciding whether to fall back to a pseudo-inverse.
    pub eps: f64,
}

impl Default for NumericTol {
    fn default() -> Self {
        Self {
            svd: 1e-12,
            eps: 1e-12,
        }
    }
}

/// Result returned by any PnP solver.
///
/// The rotation matrix maps coordinates from the **object** frame to the
/// **camera** frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PnPResult {
    /// Estimated rotation matrix, row-major.
    pub rotation: [[f64; 3]; 3],
    /// Estimated translation vector.
    pub translation: [f64; 3],
    /// Rodrigues axis-angle representation (log-map) of `rotation`.
    pub rvec: [f64; 3],
    /// Optional root-mean-square reprojection error in pixels.
    pub reproj_rmse: Option<f64>,
    /// Optional number of iterations taken by an iterative solver.
    pub num_iterations: Option<usize>,
    /// Indicates whether an iterative solver reported convergence.
    pub converged: Option<bool>,
}

impl PnPResult {
    /// The rotation as a glam matrix.
    pub fn rotation_matrix(&self) -> DMat3 {
        DMat3::from_cols_array_2d(&self.rotation).transpose()
    }

    /// The translation as a glam vector.
    pub fn translation_vector(&self) -> DVec3 {
        DVec3::from_array(self.translation)
    }

    /// The camera-frame pose `[R | t; 0 0 0 1]`.
    pub fn pose(&self) -> Pose {
        Pose::from_rotation_translation(self.rotation_matrix(), self.translation_vector())
    }
}

/// Trait implemented by every PnP solver available in this crate.
pub trait PnPSolver {
    /// Parameter object specific to the solver.
    type Param;

    /// Runs the solver.
    ///
    /// # Arguments
    /// * `world` – 3-D coordinates in the object frame.
    /// * `image` – Corresponding pixel coordinates.
    /// * `k` – Camera intrinsics matrix.
    /// * `params` – Solver-specific parameters.
    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        k: &[[f64; 3]; 3],
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError>;
}

/// Fail unless both slices have the same length.
pub(crate) fn check_lengths(world: &[[f64; 3]], image: &[[f64; 2]]) -> Result<(), PnPError> {
    if world.len() != image.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: world.len(),
            right_name: "image points",
            right_len: image.len(),
        });
    }
    Ok(())
}
