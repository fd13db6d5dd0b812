#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # PnP (Perspective-n-Point)
//!
//! Object pose estimation from 2D-3D point correspondences, in double precision.
//!
//! ## Example: Robust PnP with RANSAC
//!
//! ```rust
//! use vision6d_pnp::{solve_pnp_ransac, PnPMethod, RansacParams};
//!
//! let world_points = vec![
//!     [0.0, 0.0, 5.0],
//!     [1.0, 0.0, 5.0],
//!     [0.0, 1.0, 5.0],
//!     [0.0, 0.0, 6.0],
//!     [1.0, 1.0, 6.5],
//!     [-1.0, 0.5, 5.5],
//! ];
//! let k = [[800.0, 0.0, 320.0], [0.0, 800.0, 240.0], [0.0, 0.0, 1.0]];
//! // Identity pose: project straight through the intrinsics.
//! let image_points: Vec<[f64; 2]> = world_points
//!     .iter()
//!     .map(|p| [800.0 * p[0] / p[2] + 320.0, 800.0 * p[1] / p[2] + 240.0])
//!     .collect();
//!
//! let params = RansacParams {
//!     random_seed: Some(0),
//!     ..Default::default()
//! };
//! let result = solve_pnp_ransac(&world_points, &image_points, &k, &PnPMethod::EPnPDefault, &params)?;
//!
//! assert_eq!(result.inliers.len(), world_points.len());
//! assert!(result.pose.translation_vector().length() < 1e-6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Efficient Perspective-n-Point (EPnP) solver implementation.
pub mod epnp;

/// Common data types and traits for PnP solvers.
pub mod pnp;

/// RANSAC-based robust PnP pose estimation.
///
/// Handles outliers in point correspondences through random sampling consensus.
pub mod ransac;

/// Levenberg–Marquardt refinement of a pose estimate.
pub mod refine;

mod ops;

pub use epnp::{EPnP, EPnPParams};
pub use pnp::{NumericTol, PnPError, PnPResult, PnPSolver};
pub use ransac::{solve_pnp_ransac, PnPRansacResult, RansacParams};
pub use refine::{refine_pose_lm, LMParams, LMSummary};

/// Enumeration of the Perspective-n-Point algorithms available in this crate.
#[derive(Debug, Clone, Default)]
pub enum PnPMethod {
    /// Efficient PnP solver with a user-supplied parameter object.
    EPnP(EPnPParams),
    /// Efficient PnP solver with the crate's default parameters.
    #[default]
    EPnPDefault,
}

/// Dispatch function that routes to the chosen PnP solver.
pub fn solve_pnp(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    k: &[[f64; 3]; 3],
    method: &PnPMethod,
) -> Result<PnPResult, PnPError> {
    match method {
        PnPMethod::EPnP(params) => EPnP::solve(world, image, k, params),
        PnPMethod::EPnPDefault => EPnP::solve(world, image, k, &EPnPParams::default()),
    }
}
