use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

use glam::{DMat3, DMat4, DVec3, DVec4};
use serde::{Deserialize, Serialize};

/// A 4x4 homogeneous object transform, rigid or mirror-augmented.
///
/// Rows and columns follow the usual math convention: `pose.to_rows()[r][c]`, with the
/// translation in the last column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose(DMat4);

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    /// The identity pose.
    pub const IDENTITY: Self = Self(DMat4::IDENTITY);

    /// Wrap a matrix.
    pub fn from_matrix(m: DMat4) -> Self {
        Self(m)
    }

    /// Build from row-major rows.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self(DMat4::from_cols_array_2d(&rows).transpose())
    }

    /// Build `[R | t; 0 0 0 1]`.
    pub fn from_rotation_translation(r: DMat3, t: DVec3) -> Self {
        let mut m = DMat4::from_mat3(r);
        m.w_axis = DVec4::new(t.x, t.y, t.z, 1.0);
        Self(m)
    }

    /// The underlying matrix.
    pub fn matrix(&self) -> DMat4 {
        self.0
    }

    /// Row-major rows.
    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        self.0.transpose().to_cols_array_2d()
    }

    /// The upper-left 3x3 block.
    pub fn rotation(&self) -> DMat3 {
        DMat3::from_mat4(self.0)
    }

    /// The translation column.
    pub fn translation(&self) -> DVec3 {
        self.0.w_axis.truncate()
    }

    /// Apply the pose to a point.
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.0.transform_point3(p)
    }

    /// Matrix inverse.
    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Left-multiply by the reflection for `axis`.
    pub fn mirrored(&self, axis: MirrorAxis) -> Self {
        Self(axis.reflection() * self.0)
    }

    /// Whether the 3x3 block is orthonormal with determinant ±1 and the last row is `0 0 0 1`.
    pub fn is_orthonormal_up_to_reflection(&self, eps: f64) -> bool {
        let r = self.rotation();
        let rtr = r.transpose() * r;
        rtr.abs_diff_eq(DMat3::IDENTITY, eps)
            && (r.determinant().abs() - 1.0).abs() <= eps
            && self.0.row(3).abs_diff_eq(DVec4::W, eps)
    }

    /// Element-wise comparison with an absolute tolerance.
    pub fn abs_diff_eq(&self, other: &Pose, max_abs_diff: f64) -> bool {
        self.0.abs_diff_eq(other.0, max_abs_diff)
    }

    /// Largest absolute element-wise difference.
    pub fn max_abs_diff(&self, other: &Pose) -> f64 {
        self.0
            .to_cols_array()
            .iter()
            .zip(other.0.to_cols_array().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        Pose(self.0 * rhs.0)
    }
}

impl From<DMat4> for Pose {
    fn from(m: DMat4) -> Self {
        Self(m)
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.to_rows() {
            writeln!(
                f,
                "[{:>12.8} {:>12.8} {:>12.8} {:>12.8}]",
                row[0], row[1], row[2], row[3]
            )?;
        }
        Ok(())
    }
}

/// Axis of a mirror flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorAxis {
    /// Flip x: `diag(-1, 1, 1, 1)`.
    X,
    /// Flip y: `diag(1, -1, 1, 1)`.
    Y,
}

impl MirrorAxis {
    /// The fixed reflection matrix for this axis.
    pub fn reflection(self) -> DMat4 {
        match self {
            MirrorAxis::X => DMat4::from_diagonal(DVec4::new(-1.0, 1.0, 1.0, 1.0)),
            MirrorAxis::Y => DMat4::from_diagonal(DVec4::new(1.0, -1.0, 1.0, 1.0)),
        }
    }
}

impl FromStr for MirrorAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" | "X" => Ok(MirrorAxis::X),
            "y" | "Y" => Ok(MirrorAxis::Y),
            other => Err(format!("unknown mirror axis '{other}', expected 'x' or 'y'")),
        }
    }
}

/// Independent mirror flags of one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorState {
    /// Mirrored along x.
    pub x: bool,
    /// Mirrored along y.
    pub y: bool,
}

impl MirrorState {
    /// Flip the flag for `axis`.
    pub fn toggle(&mut self, axis: MirrorAxis) {
        match axis {
            MirrorAxis::X => self.x = !self.x,
            MirrorAxis::Y => self.y = !self.y,
        }
    }

    /// Whether no flag is set.
    pub fn is_identity(&self) -> bool {
        !self.x && !self.y
    }

    /// The composed reflection. Reflections are diagonal, so the order does not matter and
    /// the matrix is its own inverse.
    pub fn matrix(&self) -> DMat4 {
        let mut m = DMat4::IDENTITY;
        if self.x {
            m = MirrorAxis::X.reflection() * m;
        }
        if self.y {
            m = MirrorAxis::Y.reflection() * m;
        }
        m
    }

    /// Compose this mirror state on top of `pose`.
    pub fn apply(&self, pose: &Pose) -> Pose {
        Pose(self.matrix() * pose.0)
    }
}
