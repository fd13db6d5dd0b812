//! RANSAC-based robust wrapper for PnP solvers.

use crate::ops::{mat3_to_rows, pose_to_rt, Projector};
use crate::pnp::{check_lengths, PnPError, PnPResult};
use crate::refine::{refine_pose_lm, LMParams};
use crate::{solve_pnp, PnPMethod};
use glam::{DMat3, DVec3};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use vision6d_3d::so3::SO3;

/// Parameters for RANSAC over PnP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Pixel error threshold to classify an observation as an inlier.
    pub reproj_threshold_px: f64,
    /// Desired probability that at least one sample set is outlier-free.
    pub confidence: f64,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
    /// Whether to refit on all inliers using the base solver.
    pub refine: bool,
    /// Smallest inlier count accepted as a consensus. Never less than 4.
    pub min_inliers: usize,
    /// Optional Levenberg–Marquardt polish on the inliers after the refit.
    pub lm: Option<LMParams>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            reproj_threshold_px: 8.0,
            confidence: 0.999,
            random_seed: None,
            refine: true,
            min_inliers: 4,
            lm: Some(LMParams::default()),
        }
    }
}

/// RANSAC result for PnP.
#[derive(Debug, Clone)]
pub struct PnPRansacResult {
    /// Best pose found by RANSAC, its RMSE measured over the inliers.
    pub pose: PnPResult,
    /// Indices of inlier correspondences, ascending.
    pub inliers: Vec<usize>,
    /// Number of hypotheses drawn.
    pub num_iterations: usize,
}

/// Solve PnP robustly using a RANSAC loop around a base PnP method (e.g., EPnP).
///
/// - Minimal sample size is 5 for EPnP (4 when only 4 points available).
/// - Scoring uses Euclidean pixel reprojection error; points behind the camera never count.
/// - Iterations adapt from the current inlier ratio and desired confidence.
pub fn solve_pnp_ransac(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    k: &[[f64; 3]; 3],
    base: &PnPMethod,
    params: &RansacParams,
) -> Result<PnPRansacResult, PnPError> {
    check_lengths(world, image)?;
    let n = world.len();
    if n < 4 {
        return Err(PnPError::InsufficientCorrespondences {
            required: 4,
            actual: n,
        });
    }

    let sample_size: usize = if n == 4 { 4 } else { 5 };
    let min_inliers = params.min_inliers.max(4);
    let proj = Projector::new(k);

    let mut rng: StdRng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut w_min: Vec<[f64; 3]> = Vec::with_capacity(sample_size);
    let mut i_min: Vec<[f64; 2]> = Vec::with_capacity(sample_size);
    let mut best_inliers: Vec<usize> = Vec::new();
    let mut best_pose: Option<PnPResult> = None;

    let mut iter: usize = 0;
    let mut required_iters = params.max_iterations.max(1);

    while iter < required_iters {
        iter += 1;

        w_min.clear();
        i_min.clear();
        for idx in rand::seq::index::sample(&mut rng, n, sample_size).iter() {
            w_min.push(world[idx]);
            i_min.push(image[idx]);
        }

        let pose_min = match solve_pnp(&w_min, &i_min, k, base) {
            Ok(p) => p,
            Err(e) => {
                log::trace!("RANSAC iteration {iter}: minimal solve failed: {e}");
                continue;
            }
        };

        let (r_mat, t_vec) = pose_to_rt(&pose_min.rotation, &pose_min.translation);
        if !all_positive_depths(&r_mat, t_vec, &w_min) {
            continue;
        }

        let inliers = classify_inliers(
            &proj,
            world,
            image,
            &r_mat,
            t_vec,
            params.reproj_threshold_px,
        );

        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
            best_pose = Some(pose_min);

            let ratio = best_inliers.len() as f64 / n as f64;
            required_iters = required_iters.min(adaptive_iterations(
                params.confidence,
                ratio,
                sample_size,
                params.max_iterations.max(1),
            ));
        }
    }

    log::debug!(
        "RANSAC: {iter} iterations, best consensus {}/{n}",
        best_inliers.len()
    );

    let consensus_failed = PnPError::NoInlierConsensus {
        required: min_inliers,
        actual: best_inliers.len(),
        num_points: n,
    };
    if best_inliers.len() < min_inliers {
        return Err(consensus_failed);
    }
    let mut final_pose = best_pose.ok_or(consensus_failed)?;

    let w_in: Vec<[f64; 3]> = best_inliers.iter().map(|&i| world[i]).collect();
    let i_in: Vec<[f64; 2]> = best_inliers.iter().map(|&i| image[i]).collect();

    if params.refine {
        match solve_pnp(&w_in, &i_in, k, base) {
            Ok(p) if in_front(&p, &w_in) => final_pose = p,
            Ok(_) => log::debug!("RANSAC: inlier refit puts points behind the camera, keeping sample pose"),
            Err(e) => log::debug!("RANSAC: inlier refit failed ({e}), keeping sample pose"),
        }
    }

    let (r_mat, t_vec) = pose_to_rt(&final_pose.rotation, &final_pose.translation);
    let mut rmse = subset_rmse(&proj, &w_in, &i_in, &r_mat, t_vec);

    if let Some(lm) = &params.lm {
        let mut rvec = SO3::from_matrix(&r_mat).log().to_array();
        let mut t = final_pose.translation;
        match refine_pose_lm(&w_in, &i_in, k, &mut rvec, &mut t, lm) {
            Ok(summary) if summary.rmse < rmse => {
                let r = SO3::exp(DVec3::from_array(rvec)).matrix();
                final_pose.rotation = mat3_to_rows(&r);
                final_pose.translation = t;
                final_pose.num_iterations = Some(summary.num_iterations);
                final_pose.converged = Some(summary.converged);
                rmse = summary.rmse;
            }
            Ok(_) => {}
            Err(e) => log::debug!("RANSAC: LM refinement skipped: {e}"),
        }
    }

    let (r_mat, _) = pose_to_rt(&final_pose.rotation, &final_pose.translation);
    final_pose.rvec = SO3::from_matrix(&r_mat).log().to_array();
    final_pose.reproj_rmse = Some(rmse);

    Ok(PnPRansacResult {
        pose: final_pose,
        inliers: best_inliers,
        num_iterations: iter,
    })
}

/// Iterations needed to draw one all-inlier sample with probability `confidence`.
fn adaptive_iterations(confidence: f64, inlier_ratio: f64, sample_size: usize, max: usize) -> usize {
    if inlier_ratio >= 1.0 {
        return 1;
    }
    let ws = inlier_ratio.powi(sample_size as i32);
    if ws.is_nan() || ws <= 1e-12 || confidence.is_nan() || confidence <= 0.0 || confidence >= 1.0 {
        return max;
    }
    let est = ((1.0 - confidence).ln() / (1.0 - ws).ln()).ceil();
    if est.is_finite() && est >= 1.0 {
        (est as usize).min(max)
    } else {
        max
    }
}

fn in_front(pose: &PnPResult, world: &[[f64; 3]]) -> bool {
    let (r, t) = pose_to_rt(&pose.rotation, &pose.translation);
    all_positive_depths(&r, t, world)
}

fn all_positive_depths(r: &DMat3, t: DVec3, world: &[[f64; 3]]) -> bool {
    world.iter().all(|pw| (*r * DVec3::from(*pw) + t).z > 0.0)
}

fn classify_inliers(
    proj: &Projector,
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    r: &DMat3,
    t: DVec3,
    thresh_px: f64,
) -> Vec<usize> {
    let thresh_sq = thresh_px * thresh_px;
    world
        .iter()
        .zip(image.iter())
        .enumerate()
        .filter_map(|(idx, (pw, uv))| {
            proj.sq_error(r, t, pw, uv)
                .filter(|&e| e < thresh_sq)
                .map(|_| idx)
        })
        .collect()
}

fn subset_rmse(
    proj: &Projector,
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    r: &DMat3,
    t: DVec3,
) -> f64 {
    let sum_sq: f64 = world
        .iter()
        .zip(image.iter())
        .map(|(pw, uv)| proj.sq_error(r, t, pw, uv).unwrap_or(f64::INFINITY))
        .sum();
    (sum_sq / world.len().max(1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epnp::EPnPParams;
    use rand::Rng;

    type Dataset = (Vec<[f64; 3]>, Vec<[f64; 2]>, [[f64; 3]; 3], DMat3, DVec3);

    fn cube_dataset(num_points: usize, seed: u64) -> Dataset {
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(seed);
        let world: Vec<[f64; 3]> = (0..num_points)
            .map(|_| {
                [
                    rng.random_range(-0.5..0.5),
                    rng.random_range(-0.5..0.5),
                    rng.random_range(3.0..6.0),
                ]
            })
            .collect();
        let r = SO3::exp(DVec3::new(0.05, 0.25, 0.1)).matrix();
        let t = DVec3::new(0.2, -0.1, 0.3);
        let image = world
            .iter()
            .map(|p| {
                let pc = r * DVec3::from(*p) + t;
                [800.0 * pc.x / pc.z + 640.0, 800.0 * pc.y / pc.z + 480.0]
            })
            .collect();
        (world, image, k, r, t)
    }

    #[test]
    fn test_ransac_rejects_outliers() -> Result<(), PnPError> {
        let (world, mut image, k, r_true, t_true) = cube_dataset(60, 7);
        // Every fifth observation becomes a gross outlier.
        for (j, uv) in image.iter_mut().enumerate().filter(|(j, _)| j % 5 == 0) {
            uv[0] += 300.0 + j as f64;
            uv[1] -= 250.0;
        }

        let params = RansacParams {
            random_seed: Some(42),
            ..Default::default()
        };
        let res = solve_pnp_ransac(&world, &image, &k, &PnPMethod::EPnPDefault, &params)?;
        assert_eq!(res.inliers.len(), 48);
        assert!(res.inliers.iter().all(|i| i % 5 != 0));
        assert!(res.pose.rotation_matrix().abs_diff_eq(r_true, 1e-6));
        assert!(res.pose.translation_vector().abs_diff_eq(t_true, 1e-6));
        assert!(res.pose.reproj_rmse.is_some_and(|e| e < 1e-4));
        Ok(())
    }

    #[test]
    fn test_ransac_perfect_data_stops_early() -> Result<(), PnPError> {
        let (world, image, k, _, t_true) = cube_dataset(30, 1);
        let params = RansacParams {
            random_seed: Some(3),
            lm: None,
            ..Default::default()
        };
        let base = PnPMethod::EPnP(EPnPParams::default());
        let res = solve_pnp_ransac(&world, &image, &k, &base, &params)?;
        assert_eq!(res.inliers, (0..30).collect::<Vec<_>>());
        assert_eq!(res.num_iterations, 1);
        assert!(res.pose.translation_vector().abs_diff_eq(t_true, 1e-6));
        Ok(())
    }

    #[test]
    fn test_ransac_is_deterministic_with_seed() -> Result<(), PnPError> {
        let (world, mut image, k, _, _) = cube_dataset(40, 11);
        for uv in image.iter_mut().step_by(3) {
            uv[1] += 120.0;
        }
        let params = RansacParams {
            random_seed: Some(5),
            ..Default::default()
        };
        let a = solve_pnp_ransac(&world, &image, &k, &PnPMethod::EPnPDefault, &params)?;
        let b = solve_pnp_ransac(&world, &image, &k, &PnPMethod::EPnPDefault, &params)?;
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.pose, b.pose);
        assert_eq!(a.num_iterations, b.num_iterations);
        Ok(())
    }

    #[test]
    fn test_ransac_minimum_points() -> Result<(), PnPError> {
        let (world, image, k, _, _) = cube_dataset(4, 2);
        let params = RansacParams {
            max_iterations: 5,
            random_seed: Some(42),
            ..Default::default()
        };
        let res = solve_pnp_ransac(&world, &image, &k, &PnPMethod::EPnPDefault, &params)?;
        assert_eq!(res.inliers.len(), 4);
        Ok(())
    }

    #[test]
    fn test_ransac_no_consensus() {
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(99);
        let world: Vec<[f64; 3]> = (0..20)
            .map(|_| {
                [
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(4.0..8.0),
                ]
            })
            .collect();
        let image: Vec<[f64; 2]> = (0..20)
            .map(|_| [rng.random_range(0.0..1280.0), rng.random_range(0.0..960.0)])
            .collect();
        let params = RansacParams {
            reproj_threshold_px: 1e-3,
            random_seed: Some(1),
            ..Default::default()
        };
        let res = solve_pnp_ransac(&world, &image, &k, &PnPMethod::EPnPDefault, &params);
        match res {
            Err(PnPError::NoInlierConsensus {
                required,
                actual,
                num_points,
            }) => {
                assert_eq!(required, 4);
                assert!(actual < 4);
                assert_eq!(num_points, 20);
            }
            other => panic!("expected NoInlierConsensus, got {other:?}"),
        }
    }

    #[test]
    fn test_ransac_error_cases() {
        let world = [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]];
        let image = [[100.0, 100.0], [200.0, 100.0], [100.0, 200.0]];
        let k = [[800.0, 0.0, 400.0], [0.0, 800.0, 300.0], [0.0, 0.0, 1.0]];

        let result = solve_pnp_ransac(
            &world,
            &image,
            &k,
            &PnPMethod::EPnPDefault,
            &RansacParams::default(),
        );
        assert!(matches!(
            result,
            Err(PnPError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_adaptive_iterations() {
        assert_eq!(adaptive_iterations(0.999, 1.0, 5, 100), 1);
        assert_eq!(adaptive_iterations(0.999, 0.0, 5, 100), 100);
        // 0.8^5 = 0.32768 -> ln(0.001) / ln(0.67232) = 17.4
        assert_eq!(adaptive_iterations(0.999, 0.8, 5, 100), 18);
        assert_eq!(adaptive_iterations(0.999, 0.2, 5, 100), 100);
    }
}
