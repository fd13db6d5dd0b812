use glam::{DMat3, DVec2, DVec3};
use nalgebra::{DMatrix, Matrix3x4, Matrix4, SMatrix, SVector, Vector3, Vector4};

/// Compute the centroid of a set of points.
pub(crate) fn compute_centroid(pts: &[[f64; 3]]) -> DVec3 {
    let n = pts.len() as f64;
    let sum = pts.iter().fold(DVec3::ZERO, |acc, &p| acc + DVec3::from(p));
    sum / n
}

/// Pinhole projection with precomputed intrinsics rows.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Projector {
    intr_x: DVec3,
    intr_y: DVec3,
}

impl Projector {
    pub(crate) fn new(k: &[[f64; 3]; 3]) -> Self {
        Self {
            intr_x: DVec3::new(k[0][0], 0.0, k[0][2]),
            intr_y: DVec3::new(0.0, k[1][1], k[1][2]),
        }
    }

    /// Focal lengths `(fx, fy)`.
    pub(crate) fn focal(&self) -> (f64, f64) {
        (self.intr_x.x, self.intr_y.y)
    }

    /// Pixel of a camera-frame point. The caller checks the depth.
    pub(crate) fn pixel(&self, pc: DVec3) -> DVec2 {
        DVec2::new(self.intr_x.dot(pc), self.intr_y.dot(pc)) / pc.z
    }

    /// Squared pixel error of one correspondence, `None` for points at or behind the camera.
    pub(crate) fn sq_error(
        &self,
        r: &DMat3,
        t: DVec3,
        world_point: &[f64; 3],
        image_point: &[f64; 2],
    ) -> Option<f64> {
        let pc = *r * DVec3::from(*world_point) + t;
        if pc.z <= 0.0 {
            return None;
        }
        Some((self.pixel(pc) - DVec2::from(*image_point)).length_squared())
    }
}

/// Convert array-form pose to glam matrices/vectors.
pub(crate) fn pose_to_rt(r: &[[f64; 3]; 3], t: &[f64; 3]) -> (DMat3, DVec3) {
    (
        DMat3::from_cols_array_2d(r).transpose(),
        DVec3::from_array(*t),
    )
}

/// Row-major array form of a glam matrix.
pub(crate) fn mat3_to_rows(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

const EPSILON: f64 = 1e-18;
const NUM_CONTROL_POINTS: usize = 4;
const MAX_ITERATIONS: usize = 10;
pub(crate) const PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
const NUM_PAIRS: usize = PAIRS.len();

/// Solves the linear system A * x = b for a 4x4 symmetric positive-definite matrix A
/// using an unrolled Cholesky decomposition.
///
/// Returns `None` if `A` is not positive-definite.
#[inline(always)]
pub(crate) fn solve_4x4_cholesky(a: &Matrix4<f64>, b: &Vector4<f64>) -> Option<Vector4<f64>> {
    // L * L^T = A, column by column
    let l_11 = a.m11.sqrt();
    if l_11.is_nan() || l_11 < EPSILON {
        return None;
    }
    let l_21 = a.m21 / l_11;
    let l_31 = a.m31 / l_11;
    let l_41 = a.m41 / l_11;

    let l_22_sq = a.m22 - l_21 * l_21;
    if l_22_sq < EPSILON {
        return None;
    }
    let l_22 = l_22_sq.sqrt();
    let l_32 = (a.m32 - l_31 * l_21) / l_22;
    let l_42 = (a.m42 - l_41 * l_21) / l_22;

    let l_33_sq = a.m33 - l_31 * l_31 - l_32 * l_32;
    if l_33_sq < EPSILON {
        return None;
    }
    let l_33 = l_33_sq.sqrt();
    let l_43 = (a.m43 - l_41 * l_31 - l_42 * l_32) / l_33;

    let l_44_sq = a.m44 - l_41 * l_41 - l_42 * l_42 - l_43 * l_43;
    if l_44_sq < EPSILON {
        return None;
    }
    let l_44 = l_44_sq.sqrt();

    // L * y = b
    let y1 = b[0] / l_11;
    let y2 = (b[1] - l_21 * y1) / l_22;
    let y3 = (b[2] - (l_31 * y1 + l_32 * y2)) / l_33;
    let y4 = (b[3] - (l_41 * y1 + l_42 * y2 + l_43 * y3)) / l_44;

    // L^T * x = y
    let x4 = y4 / l_44;
    let x3 = (y3 - l_43 * x4) / l_33;
    let x2 = (y2 - (l_32 * x3 + l_42 * x4)) / l_22;
    let x1 = (y1 - (l_21 * x2 + l_31 * x3 + l_41 * x4)) / l_11;
    Some(Vector4::new(x1, x2, x3, x4))
}

/// Refine the betas with Gauss-Newton so the control-point distances match `rho`.
pub(crate) fn gauss_newton(beta_init: [f64; 4], null4: &DMatrix<f64>, rho: &[f64; 6]) -> [f64; 4] {
    const STOP_EPS: f64 = 1e-12;

    let mut bet = Vector4::from(beta_init);
    let rho_vec = SVector::<f64, NUM_PAIRS>::from_row_slice(rho);
    // Relative damping keeps the normal equations solvable at any object scale.
    let damping = 1e-12 * rho_vec.amax().max(f64::MIN_POSITIVE);

    for _ in 0..MAX_ITERATIONS {
        let mut vs = [Vector3::zeros(); NUM_CONTROL_POINTS];
        for (i, v) in vs.iter_mut().enumerate() {
            let m: Matrix3x4<f64> = null4.fixed_view::<3, 4>(i * 3, 0).into();
            *v = m * bet;
        }

        let mut f = SVector::<f64, NUM_PAIRS>::zeros();
        let mut j = SMatrix::<f64, NUM_PAIRS, NUM_CONTROL_POINTS>::zeros();

        for (r, &(i, jj)) in PAIRS.iter().enumerate() {
            let diff = vs[i] - vs[jj];
            f[r] = diff.norm_squared();

            let rows_i = null4.fixed_rows::<3>(i * 3);
            let rows_jj = null4.fixed_rows::<3>(jj * 3);
            for k in 0..NUM_CONTROL_POINTS {
                let d_col = rows_i.column(k) - rows_jj.column(k);
                j[(r, k)] = 2.0 * diff.dot(&d_col);
            }
        }

        f -= rho_vec;

        let mut a: Matrix4<f64> = j.transpose() * j;
        let b: Vector4<f64> = j.transpose() * f;
        for d in 0..4 {
            a[(d, d)] += damping;
        }

        match solve_4x4_cholesky(&a, &b) {
            Some(delta) => {
                bet -= delta;
                if delta.norm() < STOP_EPS * bet.norm().max(1.0) {
                    break;
                }
            }
            None => break,
        }
    }

    bet.into()
}
