//! Efficient Perspective-n-Point (EPnP) solver
//! Paper: https://www.tugraz.at/fileadmin/user_upload/Institute/ICG/Images/team_lepetit/publications/lepetit_ijcv08.pdf
//! Reference: https://github.com/opencv/opencv/blob/4.x/modules/calib3d/src/epnp.cpp

use crate::ops::{compute_centroid, gauss_newton, mat3_to_rows, Projector, PAIRS};
use crate::pnp::{check_lengths, NumericTol, PnPError, PnPResult, PnPSolver};
use glam::{DMat3, DVec3};
use nalgebra::{DMatrix, DVector, Matrix3, Vector4};
use serde::{Deserialize, Serialize};
use vision6d_3d::rigid::umeyama;
use vision6d_3d::so3::SO3;

/// Marker type representing the Efficient PnP algorithm.
pub struct EPnP;

impl PnPSolver for EPnP {
    type Param = EPnPParams;

    fn solve(
        points_world: &[[f64; 3]],
        points_image: &[[f64; 2]],
        k: &[[f64; 3]; 3],
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_epnp(points_world, points_image, k, params)
    }
}

/// Parameters controlling the EPnP solver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EPnPParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
}

/// Solve Perspective-n-Point (EPnP).
///
/// # Arguments
/// * `points_world` – 3-D coordinates in the object frame, shape *(N,3)* with `N≥4`.
/// * `points_image` – Corresponding pixel coordinates, shape *(N,2)*.
/// * `k` – Camera intrinsics matrix.
///
/// # Returns
/// A [`PnPResult`] whose rotation maps **object → camera**, with the pixel RMSE over all
/// input points.
///
/// # Errors
/// * [`PnPError::InsufficientCorrespondences`] for fewer than 4 points.
/// * [`PnPError::SolverDiverged`] for collinear or coincident points, a failed decomposition
///   or a non-finite pose.
pub fn solve_epnp(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    k: &[[f64; 3]; 3],
    params: &EPnPParams,
) -> Result<PnPResult, PnPError> {
    check_lengths(points_world, points_image)?;
    let n = points_world.len();
    if n < 4 {
        return Err(PnPError::InsufficientCorrespondences {
            required: 4,
            actual: n,
        });
    }
    if k[0][0] <= 0.0 || k[1][1] <= 0.0 {
        return Err(PnPError::diverged(n, "focal length must be positive"));
    }

    let cw = select_control_points(points_world)?;
    let alphas = compute_barycentric(points_world, &cw, params.tol.eps)?;

    let m_mat = build_m(&alphas, points_image, k);

    // Null-space of M: the 4 right-singular vectors with the smallest singular values.
    let svd = m_mat.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| PnPError::diverged(n, "failed to compute V^T"))?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));
    let mut null4 = DMatrix::<f64>::zeros(12, 4);
    for (c, &row) in order.iter().take(4).enumerate() {
        null4.set_column(c, &v_t.row(row).transpose());
    }

    let l = build_l6x10(&null4);
    let rho = rho_ctrlpts(&cw);
    let rho_vec = DVector::<f64>::from_column_slice(&rho);

    let betas: Vec<[f64; 4]> = [
        estimate_beta([0, 1, 3, 6], &l, &rho_vec, params.tol.svd),
        estimate_beta([0, 1, 2], &l, &rho_vec, params.tol.svd),
        estimate_beta([0, 1, 2, 3, 4], &l, &rho_vec, params.tol.svd),
    ]
    .into_iter()
    .flatten()
    .map(|b| gauss_newton(b, &null4, &rho))
    .collect();

    let proj = Projector::new(k);
    let mut best: Option<(f64, DMat3, DVec3)> = None;
    for bet in &betas {
        let Some((r, t)) = pose_from_betas(bet, &null4, &alphas, points_world) else {
            continue;
        };
        let err = rmse_px(&proj, points_world, points_image, &r, t);
        if !err.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |(best_err, _, _)| err < *best_err) {
            best = Some((err, r, t));
        }
    }

    let (best_err, best_r, best_t) =
        best.ok_or_else(|| PnPError::diverged(n, "no finite pose candidate"))?;

    let rvec = SO3::from_matrix(&best_r).log();

    Ok(PnPResult {
        rotation: mat3_to_rows(&best_r),
        translation: best_t.to_array(),
        rvec: rvec.to_array(),
        reproj_rmse: Some(best_err),
        num_iterations: None,
        converged: Some(true),
    })
}

/// Compute pose (R, t) from a set of betas using the null-space vectors.
fn pose_from_betas(
    betas: &[f64; 4],
    null4: &DMatrix<f64>,
    alphas: &[[f64; 4]],
    points_world: &[[f64; 3]],
) -> Option<(DMat3, DVec3)> {
    let cc_flat = null4 * Vector4::from_column_slice(betas);
    let mut cc = [DVec3::ZERO; 4];
    for (i, c) in cc.iter_mut().enumerate() {
        *c = DVec3::new(cc_flat[3 * i], cc_flat[3 * i + 1], cc_flat[3 * i + 2]);
    }

    let mut pcs: Vec<DVec3> = alphas
        .iter()
        .map(|a| a.iter().zip(cc.iter()).map(|(&w, &c)| w * c).sum())
        .collect();

    // The null-space solution is defined up to sign; the scene must be in front of the camera.
    if pcs.first().map_or(false, |p| p.z < 0.0) {
        for p in &mut pcs {
            *p = -*p;
        }
    }

    let pws: Vec<DVec3> = points_world.iter().map(|&p| DVec3::from(p)).collect();
    let (r, t) = umeyama(&pws, &pcs).ok()?;
    (r.is_finite() && t.is_finite()).then_some((r, t))
}

/// Root-mean-square reprojection error in pixels. Points behind the camera give infinity.
fn rmse_px(
    proj: &Projector,
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    r: &DMat3,
    t: DVec3,
) -> f64 {
    let mut sum_sq = 0.0;
    for (pw, uv) in points_world.iter().zip(points_image.iter()) {
        match proj.sq_error(r, t, pw, uv) {
            Some(e) => sum_sq += e,
            None => return f64::INFINITY,
        }
    }
    (sum_sq / points_world.len() as f64).sqrt()
}

/// Centroid plus the centroid displaced along each principal axis by its standard deviation.
fn select_control_points(points_world: &[[f64; 3]]) -> Result<[DVec3; 4], PnPError> {
    let n = points_world.len();
    let c = compute_centroid(points_world);

    let mut cov = Matrix3::<f64>::zeros();
    for p in points_world {
        let d = DVec3::from(*p) - c;
        for r in 0..3 {
            for col in 0..3 {
                cov[(r, col)] += d[r] * d[col];
            }
        }
    }
    cov /= n as f64;

    let eig = cov.symmetric_eigen();
    let mut axes: Vec<(f64, DVec3)> = (0..3)
        .map(|i| {
            let v = eig.eigenvectors.column(i);
            (
                eig.eigenvalues[i].max(0.0).sqrt(),
                DVec3::new(v[0], v[1], v[2]),
            )
        })
        .collect();
    axes.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (sigma_max, sigma_mid) = (axes[0].0, axes[1].0);
    if !sigma_max.is_finite() || sigma_max <= f64::EPSILON * c.length().max(1.0) {
        return Err(PnPError::diverged(n, "all points coincide"));
    }
    if sigma_mid <= 1e-9 * sigma_max {
        return Err(PnPError::diverged(n, "points are collinear"));
    }

    let mut cw = [c; 4];
    for (i, (sigma, axis)) in axes.iter().enumerate() {
        cw[i + 1] = c + *sigma * *axis;
    }
    Ok(cw)
}

/// Compute barycentric coordinates of object-space points with respect to the
/// 4 control points returned by `select_control_points`.
///
/// When the control-point tetrahedron is flat (planar input), the Moore–Penrose
/// pseudo-inverse replaces the exact inverse.
///
/// Each element is `[α0, α1, α2, α3]` such that `Σ αj = 1` and `pw_i = Σ αj Cw_j`.
fn compute_barycentric(
    points_world: &[[f64; 3]],
    cw: &[DVec3; 4],
    eps: f64,
) -> Result<Vec<[f64; 4]>, PnPError> {
    let b = DMat3::from_cols(cw[1] - cw[0], cw[2] - cw[0], cw[3] - cw[0]);

    let scale = b.x_axis.length() * b.y_axis.length() * b.z_axis.length();
    let b_inv = if b.determinant().abs() > eps * scale.max(f64::MIN_POSITIVE) {
        b.inverse()
    } else {
        let b_na = Matrix3::from_column_slice(&b.to_cols_array());
        let pinv = b_na
            .pseudo_inverse(eps)
            .map_err(|e| PnPError::diverged(points_world.len(), e))?;
        DMat3::from_cols_slice(pinv.as_slice())
    };

    Ok(points_world
        .iter()
        .map(|p| {
            let lamb = b_inv * (DVec3::from(*p) - cw[0]);
            [1.0 - (lamb.x + lamb.y + lamb.z), lamb.x, lamb.y, lamb.z]
        })
        .collect())
}

/// Construct the design matrix **M** used by EPnP, in normalized image coordinates.
///
/// Every correspondence contributes two rows. The matrix is padded with zero rows to at
/// least 12 rows so the SVD always yields the full 12×12 right-singular basis.
fn build_m(alphas: &[[f64; 4]], points_image: &[[f64; 2]], k: &[[f64; 3]; 3]) -> DMatrix<f64> {
    let n = alphas.len();
    let (fu, fv, uc, vc) = (k[0][0], k[1][1], k[0][2], k[1][2]);

    let mut m = DMatrix::<f64>::zeros((2 * n).max(12), 12);
    for (i, (a, uv)) in alphas.iter().zip(points_image.iter()).enumerate() {
        // Rows are scaled by 1/f; this leaves the null space unchanged.
        let un = (uc - uv[0]) / fu;
        let vn = (vc - uv[1]) / fv;
        for (j, &alpha) in a.iter().enumerate() {
            let base = 3 * j;
            m[(2 * i, base)] = alpha;
            m[(2 * i, base + 2)] = alpha * un;
            m[(2 * i + 1, base + 1)] = alpha;
            m[(2 * i + 1, base + 2)] = alpha * vn;
        }
    }
    m
}

/// Build the 6×10 matrix **L** from the null-space basis (12×4, smallest singular value first).
fn build_l6x10(null4: &DMatrix<f64>) -> [[f64; 10]; 6] {
    let mut dv = [[DVec3::ZERO; 6]; 4];
    for (i, dvi) in dv.iter_mut().enumerate() {
        let col = null4.column(i);
        let cp: [DVec3; 4] =
            std::array::from_fn(|k| DVec3::new(col[3 * k], col[3 * k + 1], col[3 * k + 2]));
        for (j, &(a, b)) in PAIRS.iter().enumerate() {
            dvi[j] = cp[a] - cp[b];
        }
    }

    let mut l = [[0.0; 10]; 6];
    for (j, row) in l.iter_mut().enumerate() {
        row[0] = dv[0][j].dot(dv[0][j]);
        row[1] = 2.0 * dv[0][j].dot(dv[1][j]);
        row[2] = dv[1][j].dot(dv[1][j]);
        row[3] = 2.0 * dv[0][j].dot(dv[2][j]);
        row[4] = 2.0 * dv[1][j].dot(dv[2][j]);
        row[5] = dv[2][j].dot(dv[2][j]);
        row[6] = 2.0 * dv[0][j].dot(dv[3][j]);
        row[7] = 2.0 * dv[1][j].dot(dv[3][j]);
        row[8] = 2.0 * dv[2][j].dot(dv[3][j]);
        row[9] = dv[3][j].dot(dv[3][j]);
    }
    l
}

/// Extracts a 6×k `DMatrix` by picking the specified columns from the 6×10 `L` matrix.
fn l_submatrix(l: &[[f64; 10]; 6], cols: &[usize]) -> DMatrix<f64> {
    let data: Vec<f64> = cols
        .iter()
        .flat_map(|&c| (0..6).map(move |r| l[r][c]))
        .collect();
    DMatrix::<f64>::from_column_slice(6, cols.len(), &data)
}

/// Initial betas from a column subset of `L` (the three EPnP approximations).
/// Returns `None` if the least-squares solve fails or the result is unusable.
fn estimate_beta<const K: usize>(
    cols: [usize; K],
    l: &[[f64; 10]; 6],
    rho: &DVector<f64>,
    tol_svd: f64,
) -> Option<[f64; 4]> {
    let l_sub = l_submatrix(l, &cols);
    let sol = l_sub.svd(true, true).solve(rho, tol_svd).ok()?;
    let x = sol.column(0);

    let beta = match K {
        // B11 B12 B13 B14
        4 => {
            let b0 = x[0].abs().sqrt();
            if b0 <= 0.0 {
                return None;
            }
            let sign = if x[0] < 0.0 { -1.0 } else { 1.0 };
            [b0, sign * x[1] / b0, sign * x[2] / b0, sign * x[3] / b0]
        }
        // B11 B12 B22
        3 => {
            let (mut b0, b1) = if x[0] < 0.0 {
                ((-x[0]).sqrt(), if x[2] < 0.0 { (-x[2]).sqrt() } else { 0.0 })
            } else {
                (x[0].sqrt(), if x[2] > 0.0 { x[2].sqrt() } else { 0.0 })
            };
            if x[1] < 0.0 {
                b0 = -b0;
            }
            [b0, b1, 0.0, 0.0]
        }
        // B11 B12 B22 B13 B23
        5 => {
            let (mut b0, b1) = if x[0] < 0.0 {
                ((-x[0]).sqrt(), if x[2] < 0.0 { (-x[2]).sqrt() } else { 0.0 })
            } else {
                (x[0].sqrt(), if x[2] > 0.0 { x[2].sqrt() } else { 0.0 })
            };
            if x[1] < 0.0 {
                b0 = -b0;
            }
            if b0 == 0.0 {
                return None;
            }
            [b0, b1, x[3] / b0, 0.0]
        }
        _ => return None,
    };
    beta.iter().all(|b| b.is_finite()).then_some(beta)
}

/// Compute the six squared distances (ρ vector) between the 4 control points.
fn rho_ctrlpts(cw: &[DVec3; 4]) -> [f64; 6] {
    PAIRS.map(|(i, j)| cw[i].distance_squared(cw[j]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn project(world: &[[f64; 3]], r: &DMat3, t: DVec3, k: &[[f64; 3]; 3]) -> Vec<[f64; 2]> {
        world
            .iter()
            .map(|p| {
                let pc = *r * DVec3::from(*p) + t;
                [
                    k[0][0] * pc.x / pc.z + k[0][2],
                    k[1][1] * pc.y / pc.z + k[1][2],
                ]
            })
            .collect()
    }

    fn box_points() -> Vec<[f64; 3]> {
        vec![
            [0.0315, 0.03333, -0.10409],
            [-0.0315, 0.03333, -0.10409],
            [0.0, -0.00102, -0.12977],
            [0.02646, -0.03167, -0.1053],
            [-0.02646, -0.031667, -0.1053],
            [0.0, 0.04515, -0.11033],
            [0.01, 0.0, -0.08],
            [-0.02, 0.01, -0.14],
        ]
    }

    #[test]
    fn test_barycentric_reconstructs_points() -> Result<(), PnPError> {
        let points_world = box_points();
        let cw = select_control_points(&points_world)?;
        let alphas = compute_barycentric(&points_world, &cw, EPnPParams::default().tol.eps)?;

        for (p, alpha) in points_world.iter().zip(alphas.iter()) {
            let recon: DVec3 = alpha.iter().zip(cw.iter()).map(|(&a, &c)| a * c).sum();
            assert_relative_eq!(recon.x, p[0], epsilon = 1e-12);
            assert_relative_eq!(recon.y, p[1], epsilon = 1e-12);
            assert_relative_eq!(recon.z, p[2], epsilon = 1e-12);
            assert_relative_eq!(alpha.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_build_m_layout() {
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];
        let alphas = [[0.25, 0.25, 0.25, 0.25]];
        let m = build_m(&alphas, &[[720.0, 400.0]], &k);
        assert_eq!(m.shape(), (12, 12));
        assert_relative_eq!(m[(0, 0)], 0.25);
        assert_relative_eq!(m[(0, 2)], 0.25 * (640.0 - 720.0) / 800.0);
        assert_relative_eq!(m[(1, 1)], 0.25);
        assert_relative_eq!(m[(1, 2)], 0.25 * (480.0 - 400.0) / 800.0);
        assert_eq!(m[(2, 0)], 0.0);
    }

    #[test]
    fn test_solve_epnp_exact() -> Result<(), PnPError> {
        let points_world = box_points();
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];
        let r_true = SO3::exp(DVec3::new(-0.39, -0.8, 0.09)).matrix();
        let t_true = DVec3::new(-0.0086, 0.0267, 1.015);
        let points_image = project(&points_world, &r_true, t_true, &k);

        let result = EPnP::solve(&points_world, &points_image, &k, &EPnPParams::default())?;
        let r = result.rotation_matrix();
        assert!(r.abs_diff_eq(r_true, 1e-6));
        assert!(result.translation_vector().abs_diff_eq(t_true, 1e-6));
        assert!(result.reproj_rmse.is_some_and(|e| e < 1e-4));

        let rvec = DVec3::from_array(result.rvec);
        assert!(rvec.abs_diff_eq(DVec3::new(-0.39, -0.8, 0.09), 1e-5));
        Ok(())
    }

    #[test]
    fn test_solve_epnp_long_focal_length() -> Result<(), PnPError> {
        // Narrow field of view: f = 5e4 px, object of a few units at 500 units depth.
        let k = [[5e4, 0.0, 960.0], [0.0, 5e4, 540.0], [0.0, 0.0, 1.0]];
        let mut points_world = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                for l in 0..3 {
                    points_world.push([i as f64 * 1.5 - 2.0, j as f64 - 1.5, l as f64 * 2.0]);
                }
            }
        }
        let r_true = SO3::exp(DVec3::new(0.3, -0.2, 0.5)).matrix();
        let t_true = DVec3::new(-7.6, -2.4, 510.0);
        let points_image = project(&points_world, &r_true, t_true, &k);

        let result = solve_epnp(&points_world, &points_image, &k, &EPnPParams::default())?;
        assert!(result.rotation_matrix().abs_diff_eq(r_true, 1e-5));
        assert!(result.translation_vector().abs_diff_eq(t_true, 1e-2));
        Ok(())
    }

    #[test]
    fn test_solve_epnp_errors() {
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];
        let world = [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]];
        let image = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert_eq!(
            solve_epnp(&world, &image, &k, &EPnPParams::default()),
            Err(PnPError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            })
        );
        assert!(matches!(
            solve_epnp(&world, &image[..2], &k, &EPnPParams::default()),
            Err(PnPError::MismatchedArrayLengths { .. })
        ));

        // Collinear points cannot constrain the rotation about their line.
        let line: Vec<[f64; 3]> = (0..6).map(|i| [i as f64, 0.0, 5.0]).collect();
        let image: Vec<[f64; 2]> = (0..6).map(|i| [640.0 + i as f64 * 100.0, 480.0]).collect();
        let res = solve_epnp(&line, &image, &k, &EPnPParams::default());
        assert!(matches!(res, Err(PnPError::SolverDiverged { .. })));
    }
}
