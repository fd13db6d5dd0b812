//! Levenberg–Marquardt pose refinement for PnP solutions.

use crate::ops::Projector;
use crate::pnp::{check_lengths, PnPError};
use glam::{DMat3, DVec2, DVec3};
use nalgebra::{Matrix6, Vector6};
use serde::{Deserialize, Serialize};
use vision6d_3d::so3::SO3;

/// Parameters controlling the LM pose refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LMParams {
    /// Maximum number of LM iterations.
    pub max_iters: usize,
    /// Convergence threshold on squared reprojection error decrease.
    pub eps: f64,
    /// Initial damping factor (lambda).
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_mul: f64,
}

impl Default for LMParams {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-9,
            lambda_init: 1e-3,
            lambda_mul: 10.0,
        }
    }
}

/// Outcome of [`refine_pose_lm`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LMSummary {
    /// Pixel RMSE after refinement.
    pub rmse: f64,
    /// Iterations run.
    pub num_iterations: usize,
    /// Whether the error decrease fell below `eps`.
    pub converged: bool,
}

/// Sum of squared pixel errors, infinite when a point is at or behind the camera.
fn total_cost(
    proj: &Projector,
    r: &DMat3,
    t: DVec3,
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
) -> f64 {
    points_world
        .iter()
        .zip(points_image)
        .map(|(pw, uv)| proj.sq_error(r, t, pw, uv).unwrap_or(f64::INFINITY))
        .sum()
}

/// Gauss-Newton normal equations `(J^T J, J^T r)` for a left perturbation
/// `R <- exp(dw) R`, `t <- t + dt`, with the unknowns ordered `[dw, dt]`.
fn normal_equations(
    proj: &Projector,
    r: &DMat3,
    t: DVec3,
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
) -> (Matrix6<f64>, Vector6<f64>) {
    let (fx, fy) = proj.focal();
    let mut jtj = Matrix6::zeros();
    let mut jtr = Vector6::zeros();
    for (pw, uv) in points_world.iter().zip(points_image) {
        let p_rot = *r * DVec3::from(*pw);
        let pc = p_rot + t;
        let inv_z = 1.0 / pc.z;
        let residual = proj.pixel(pc) - DVec2::from(*uv);
        // d(pixel)/d(pc) per image axis
        let grad_u = DVec3::new(fx * inv_z, 0.0, -fx * pc.x * inv_z * inv_z);
        let grad_v = DVec3::new(0.0, fy * inv_z, -fy * pc.y * inv_z * inv_z);
        for (g, res) in [(grad_u, residual.x), (grad_v, residual.y)] {
            // d(pc)/d(dw) = -[p_rot]x, so the rotation part is p_rot x g
            let w = p_rot.cross(g);
            let row = Vector6::new(w.x, w.y, w.z, g.x, g.y, g.z);
            jtj += row * row.transpose();
            jtr += row * res;
        }
    }
    (jtj, jtr)
}

/// Refine a pose (rvec, t) with Levenberg–Marquardt to minimize pixel reprojection error.
///
/// - `points_world`: Object points (N,3)
/// - `points_image`: Pixel points (N,2)
/// - `k`: Intrinsics 3x3
/// - `rvec`: Initial axis-angle rotation (input/output)
/// - `t`: Initial translation (input/output)
///
/// The rotation is updated on the manifold with an analytic Jacobian. A step whose damped
/// system is not positive definite, or which moves a point behind the camera, is rejected
/// and the damping grows. The refined `rvec` and `t` are written in place.
pub fn refine_pose_lm(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    k: &[[f64; 3]; 3],
    rvec: &mut [f64; 3],
    t: &mut [f64; 3],
    params: &LMParams,
) -> Result<LMSummary, PnPError> {
    check_lengths(points_world, points_image)?;

    let n = points_world.len();
    if n < 3 {
        return Err(PnPError::InsufficientCorrespondences {
            required: 3,
            actual: n,
        });
    }

    let proj = Projector::new(k);
    let mut r_mat = SO3::exp(DVec3::from_array(*rvec)).matrix();
    let mut t_vec = DVec3::from_array(*t);

    let mut cost = total_cost(&proj, &r_mat, t_vec, points_world, points_image);
    if !cost.is_finite() {
        return Err(PnPError::diverged(
            n,
            "initial pose puts points behind the camera or at non-finite pixels",
        ));
    }

    let mut lambda = params.lambda_init;
    let mut iters = 0usize;
    let mut converged = false;

    while iters < params.max_iters {
        iters += 1;
        let (jtj, jtr) = normal_equations(&proj, &r_mat, t_vec, points_world, points_image);
        let damped = jtj + Matrix6::identity() * lambda;
        let Some(chol) = damped.cholesky() else {
            lambda *= params.lambda_mul;
            continue;
        };
        let delta = chol.solve(&(-jtr));

        let r_new = SO3::exp(DVec3::new(delta[0], delta[1], delta[2])).matrix() * r_mat;
        let t_new = t_vec + DVec3::new(delta[3], delta[4], delta[5]);
        let cost_new = total_cost(&proj, &r_new, t_new, points_world, points_image);
        if cost_new < cost {
            let decrease = cost - cost_new;
            r_mat = r_new;
            t_vec = t_new;
            cost = cost_new;
            if decrease < params.eps {
                converged = true;
                break;
            }
            lambda = (lambda / params.lambda_mul).max(1e-12);
        } else {
            lambda *= params.lambda_mul;
        }
    }

    *rvec = SO3::from_matrix(&r_mat).log().to_array();
    *t = t_vec.to_array();

    Ok(LMSummary {
        rmse: (cost / n as f64).sqrt(),
        num_iterations: iters,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scene() -> (Vec<[f64; 3]>, Vec<[f64; 2]>, [[f64; 3]; 3], DVec3, DVec3) {
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];
        let rvec = DVec3::new(0.1, -0.3, 0.2);
        let t = DVec3::new(0.05, -0.02, 2.0);
        let r = SO3::exp(rvec).matrix();
        let world: Vec<[f64; 3]> = (0..12)
            .map(|i| {
                let f = i as f64;
                [(f * 0.37).sin() * 0.3, (f * 0.91).cos() * 0.2, (f * 0.53).sin() * 0.25]
            })
            .collect();
        let image = world
            .iter()
            .map(|p| {
                let pc = r * DVec3::from(*p) + t;
                [800.0 * pc.x / pc.z + 640.0, 800.0 * pc.y / pc.z + 480.0]
            })
            .collect();
        (world, image, k, rvec, t)
    }

    #[test]
    fn test_refine_lm_recovers_perturbed_pose() -> Result<(), PnPError> {
        let (world, image, k, rvec_true, t_true) = scene();
        let mut rvec = (rvec_true + DVec3::new(0.02, -0.01, 0.015)).to_array();
        let mut t = (t_true + DVec3::new(0.01, 0.02, -0.05)).to_array();

        let summary = refine_pose_lm(&world, &image, &k, &mut rvec, &mut t, &LMParams::default())?;
        assert!(summary.rmse < 1e-3, "rmse {}", summary.rmse);
        for i in 0..3 {
            assert_relative_eq!(rvec[i], rvec_true[i], epsilon = 1e-5);
            assert_relative_eq!(t[i], t_true[i], epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_refine_lm_rejects_bad_input() {
        let (world, image, k, _, _) = scene();
        let mut rvec = [0.0; 3];
        let mut t = [0.0, 0.0, 2.0];
        let res = refine_pose_lm(
            &world[..2],
            &image[..2],
            &k,
            &mut rvec,
            &mut t,
            &LMParams::default(),
        );
        assert!(matches!(
            res,
            Err(PnPError::InsufficientCorrespondences { required: 3, actual: 2 })
        ));
        let res = refine_pose_lm(&world, &image[..5], &k, &mut rvec, &mut t, &LMParams::default());
        assert!(matches!(res, Err(PnPError::MismatchedArrayLengths { .. })));
    }

    #[test]
    fn test_normal_equations_match_numeric_gradient() {
        let (world, image, k, rvec, t) = scene();
        let proj = Projector::new(&k);
        let r = SO3::exp(rvec + DVec3::new(0.03, 0.02, -0.01)).matrix();
        let t = t + DVec3::new(0.02, -0.01, 0.1);
        let (_, jtr) = normal_equations(&proj, &r, t, &world, &image);

        // J^T r is half the gradient of the summed squared error.
        let h = 1e-6;
        for i in 0..6 {
            let mut step = [0.0; 6];
            step[i] = h;
            let cost_at = |sign: f64| {
                let dw = DVec3::new(step[0], step[1], step[2]) * sign;
                let dt = DVec3::new(step[3], step[4], step[5]) * sign;
                total_cost(&proj, &(SO3::exp(dw).matrix() * r), t + dt, &world, &image)
            };
            let numeric = (cost_at(1.0) - cost_at(-1.0)) / (4.0 * h);
            assert_relative_eq!(numeric, jtr[i], epsilon = 1e-3, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_refine_lm_rejects_point_behind_camera() {
        let (world, image, k, _, _) = scene();
        let mut rvec = [0.0; 3];
        // the scene spans z in [-0.25, 0.25], so the camera sits inside it
        let mut t = [0.0, 0.0, 0.1];
        let res = refine_pose_lm(&world, &image, &k, &mut rvec, &mut t, &LMParams::default());
        assert!(matches!(res, Err(PnPError::SolverDiverged { num_points: 12, .. })));
        assert_eq!(t, [0.0, 0.0, 0.1]);
    }
}
