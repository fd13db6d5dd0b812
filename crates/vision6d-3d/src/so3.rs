use std::ops::Mul;

use glam::{DMat3, DQuat, DVec3};

/// A 3D rotation stored as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SO3 {
    /// Unit quaternion.
    pub q: DQuat,
}

impl SO3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { q: DQuat::IDENTITY };

    /// Build from a rotation matrix. The matrix must be a proper rotation.
    pub fn from_matrix(mat: &DMat3) -> Self {
        Self {
            q: DQuat::from_mat3(mat).normalize(),
        }
    }

    /// The rotation matrix.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.q)
    }

    /// The inverse rotation.
    pub fn inverse(&self) -> Self {
        Self {
            q: self.q.conjugate(),
        }
    }

    /// Lie algebra -> Lie group (Rodrigues).
    pub fn exp(v: DVec3) -> Self {
        let theta = v.length();
        let theta_half = theta / 2.0;

        let (w, b) = if theta > 0.0 {
            (theta_half.cos(), theta_half.sin() / theta)
        } else {
            (1.0, 0.5)
        };
        let xyz = b * v;

        Self {
            q: DQuat::from_xyzw(xyz.x, xyz.y, xyz.z, w),
        }
    }

    /// Lie group -> Lie algebra (axis-angle vector).
    pub fn log(&self) -> DVec3 {
        // Pick the hemisphere with w >= 0 so the angle lands in [0, pi].
        let q = if self.q.w < 0.0 { -self.q } else { self.q };
        let vec = DVec3::new(q.x, q.y, q.z);
        let sin_half = vec.length();
        if sin_half < 1e-12 {
            return vec * 2.0;
        }
        let theta = 2.0 * sin_half.atan2(q.w);
        vec * (theta / sin_half)
    }

    /// Vector space -> Lie algebra.
    pub fn hat(v: DVec3) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(0.0, v.z, -v.y),
            DVec3::new(-v.z, 0.0, v.x),
            DVec3::new(v.y, -v.x, 0.0),
        )
    }

    /// Geodesic distance to `other` in radians.
    pub fn angle_to(&self, other: &SO3) -> f64 {
        (self.inverse() * *other).log().length()
    }
}

impl Mul for SO3 {
    type Output = SO3;

    fn mul(self, rhs: Self) -> Self::Output {
        SO3 { q: self.q * rhs.q }
    }
}
