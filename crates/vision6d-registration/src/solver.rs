use vision6d_3d::{CameraIntrinsics, Pose};
use vision6d_pnp::{solve_pnp_ransac, PnPError, PnPMethod, RansacParams};

use crate::correspondence::Correspondences;

/// Outcome of one robust solve.
///
/// Solver failures do not cross this boundary as errors: a failed solve carries the identity
/// pose, no inliers and the reason in [`PoseEstimate::failure`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEstimate {
    /// Camera-frame object pose.
    pub pose: Pose,
    /// Indices of the inlier correspondences.
    pub inliers: Vec<usize>,
    /// Number of correspondences fed to the solver.
    pub num_correspondences: usize,
    /// RMS reprojection error over the inliers, in pixels.
    pub reproj_rmse: Option<f64>,
    /// Number of RANSAC hypotheses drawn.
    pub num_iterations: usize,
    /// Why the solve failed, if it did.
    pub failure: Option<PnPError>,
}

impl PoseEstimate {
    fn failed(num_correspondences: usize, err: PnPError) -> Self {
        Self {
            pose: Pose::IDENTITY,
            inliers: Vec::new(),
            num_correspondences,
            reproj_rmse: None,
            num_iterations: 0,
            failure: Some(err),
        }
    }

    /// Whether a pose was found.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Number of inliers.
    pub fn num_inliers(&self) -> usize {
        self.inliers.len()
    }
}

/// RANSAC + EPnP pose solver that reports failures instead of returning them.
#[derive(Debug, Clone, Default)]
pub struct RobustPoseSolver {
    params: RansacParams,
    method: PnPMethod,
}

impl RobustPoseSolver {
    /// Create a solver with the default EPnP base method.
    pub fn new(params: RansacParams) -> Self {
        Self {
            params,
            method: PnPMethod::default(),
        }
    }

    /// Use another base method.
    pub fn with_method(mut self, method: PnPMethod) -> Self {
        self.method = method;
        self
    }

    /// The RANSAC parameters.
    pub fn params(&self) -> &RansacParams {
        &self.params
    }

    /// Solve for the camera-frame pose of the decoded correspondences.
    pub fn solve(
        &self,
        correspondences: &Correspondences,
        intrinsics: &CameraIntrinsics,
    ) -> PoseEstimate {
        self.solve_points(
            &correspondences.points,
            &correspondences.pixels,
            intrinsics,
        )
    }

    /// Solve from raw object points and pixels.
    pub fn solve_points(
        &self,
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        intrinsics: &CameraIntrinsics,
    ) -> PoseEstimate {
        let n = world.len().min(image.len());
        let k = intrinsics.to_array();
        match solve_pnp_ransac(world, image, &k, &self.method, &self.params) {
            Ok(result) => {
                log::debug!(
                    "pose solved: {} of {} correspondences are inliers after {} iterations, rmse {:?}",
                    result.inliers.len(),
                    n,
                    result.num_iterations,
                    result.pose.reproj_rmse
                );
                PoseEstimate {
                    pose: result.pose.pose(),
                    reproj_rmse: result.pose.reproj_rmse,
                    inliers: result.inliers,
                    num_correspondences: n,
                    num_iterations: result.num_iterations,
                    failure: None,
                }
            }
            Err(err) => {
                log::warn!(
                    "pose solve failed ({}): {err}; falling back to identity with 0 inliers of {n} correspondences",
                    err.reason_code()
                );
                PoseEstimate::failed(n, err)
            }
        }
    }
}
