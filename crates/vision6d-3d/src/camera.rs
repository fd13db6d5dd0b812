use glam::{DMat3, DMat4, DVec2, DVec3, DVec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::Pose;

/// Error types for the camera model.
#[derive(Debug, Error, PartialEq)]
pub enum CameraError {
    /// Focal length or image size is not strictly positive, or the principal point is outside the image.
    #[error(
        "Degenerate camera: focal length {focal_length}, image {width}x{height}, principal point ({cx}, {cy})"
    )]
    Degenerate {
        /// Focal length in pixels.
        focal_length: f64,
        /// Image width in pixels.
        width: usize,
        /// Image height in pixels.
        height: usize,
        /// Principal point x.
        cx: f64,
        /// Principal point y.
        cy: f64,
    },

    /// The view-up vector is zero or parallel to the viewing direction.
    #[error("View-up {view_up:?} is parallel to the viewing direction {direction:?}")]
    ParallelViewUp {
        /// The requested view-up vector.
        view_up: [f64; 3],
        /// `focal_point - position`.
        direction: [f64; 3],
    },
}

/// Pinhole intrinsics with square pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in pixels.
    pub focal_length: f64,
    /// Principal point x in pixels.
    pub cx: f64,
    /// Principal point y in pixels.
    pub cy: f64,
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
}

/// Virtual-camera parameters a window-based renderer needs to reproduce [`CameraIntrinsics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    /// Window center x in normalized device coordinates.
    pub window_center_x: f64,
    /// Window center y in normalized device coordinates.
    pub window_center_y: f64,
    /// Vertical view angle in degrees.
    pub view_angle_deg: f64,
}

impl CameraIntrinsics {
    /// Build intrinsics with the principal point at the image center.
    ///
    /// # Errors
    ///
    /// [`CameraError::Degenerate`] when `focal_length <= 0` or either image side is zero.
    pub fn new(width: usize, height: usize, focal_length: f64) -> Result<Self, CameraError> {
        Self::with_principal_point(
            width,
            height,
            focal_length,
            width as f64 / 2.0,
            height as f64 / 2.0,
        )
    }

    /// Build intrinsics with an explicit principal point.
    pub fn with_principal_point(
        width: usize,
        height: usize,
        focal_length: f64,
        cx: f64,
        cy: f64,
    ) -> Result<Self, CameraError> {
        let intrinsics = Self {
            focal_length,
            cx,
            cy,
            width,
            height,
        };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Check the invariants `f > 0`, `0 <= cx <= width`, `0 <= cy <= height`.
    ///
    /// Deserialized intrinsics bypass the constructors, so loaders call this explicitly.
    pub fn validate(&self) -> Result<(), CameraError> {
        let ok = self.focal_length.is_finite()
            && self.focal_length > 0.0
            && self.width > 0
            && self.height > 0
            && (0.0..=self.width as f64).contains(&self.cx)
            && (0.0..=self.height as f64).contains(&self.cy);
        if ok {
            Ok(())
        } else {
            Err(CameraError::Degenerate {
                focal_length: self.focal_length,
                width: self.width,
                height: self.height,
                cx: self.cx,
                cy: self.cy,
            })
        }
    }

    /// The 3x3 intrinsics matrix `K`.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.focal_length, 0.0, 0.0),
            DVec3::new(0.0, self.focal_length, 0.0),
            DVec3::new(self.cx, self.cy, 1.0),
        )
    }

    /// `K` as row-major arrays, the layout the PnP solvers take.
    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.focal_length, 0.0, self.cx],
            [0.0, self.focal_length, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Window center and view angle for a renderer's virtual camera.
    pub fn view_params(&self) -> ViewParams {
        let w = self.width as f64;
        let h = self.height as f64;
        ViewParams {
            window_center_x: -2.0 * (self.cx - w / 2.0) / w,
            window_center_y: 2.0 * (self.cy - h / 2.0) / h,
            view_angle_deg: (2.0 * (h / 2.0).atan2(self.focal_length)).to_degrees(),
        }
    }

    /// Recover intrinsics from renderer view parameters; inverse of [`Self::view_params`].
    pub fn from_view_params(
        width: usize,
        height: usize,
        view: &ViewParams,
    ) -> Result<Self, CameraError> {
        let w = width as f64;
        let h = height as f64;
        let focal_length = (h / 2.0) / (view.view_angle_deg.to_radians() / 2.0).tan();
        let cx = w / 2.0 - view.window_center_x * w / 2.0;
        let cy = h / 2.0 + view.window_center_y * h / 2.0;
        Self::with_principal_point(width, height, focal_length, cx, cy)
    }

    /// Project a camera-frame point to pixels. Points at or behind the camera give `None`.
    pub fn project(&self, p_cam: DVec3) -> Option<DVec2> {
        if p_cam.z <= 0.0 {
            return None;
        }
        let inv_z = 1.0 / p_cam.z;
        Some(DVec2::new(
            self.focal_length * p_cam.x * inv_z + self.cx,
            self.focal_length * p_cam.y * inv_z + self.cy,
        ))
    }
}

/// Camera placement in the scene, stored as given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraExtrinsics {
    /// Camera center.
    pub position: DVec3,
    /// Point the camera looks at.
    pub focal_point: DVec3,
    /// Screen-up direction.
    pub view_up: DVec3,
}

impl CameraExtrinsics {
    /// Store a camera placement. The view-up is kept verbatim; only parallelism is rejected.
    pub fn new(position: DVec3, focal_point: DVec3, view_up: DVec3) -> Result<Self, CameraError> {
        let extrinsics = Self {
            position,
            focal_point,
            view_up,
        };
        extrinsics.validate()?;
        Ok(extrinsics)
    }

    /// Reject a zero viewing direction or a view-up parallel to it.
    pub fn validate(&self) -> Result<(), CameraError> {
        let direction = self.focal_point - self.position;
        let cross = direction.cross(self.view_up);
        let scale = direction.length() * self.view_up.length();
        if scale <= f64::EPSILON || cross.length() <= 1e-12 * scale {
            return Err(CameraError::ParallelViewUp {
                view_up: self.view_up.to_array(),
                direction: direction.to_array(),
            });
        }
        Ok(())
    }

    /// World-to-camera rotation. Rows are the camera axes: x right, y down, z forward.
    pub fn rotation(&self) -> DMat3 {
        let z = (self.focal_point - self.position).normalize();
        let up = (self.view_up - z * self.view_up.dot(z)).normalize();
        let y = -up;
        let x = y.cross(z);
        DMat3::from_cols(x, y, z).transpose()
    }

    /// The 4x4 world-to-camera matrix `[R | -R c; 0 0 0 1]`.
    pub fn view_matrix(&self) -> DMat4 {
        let r = self.rotation();
        let t = -(r * self.position);
        let mut m = DMat4::from_mat3(r);
        m.w_axis = DVec4::new(t.x, t.y, t.z, 1.0);
        m
    }
}

/// A calibrated camera: intrinsics plus placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Pinhole intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Camera placement.
    pub extrinsics: CameraExtrinsics,
}

impl CameraModel {
    /// Combine validated intrinsics and extrinsics.
    pub fn new(intrinsics: CameraIntrinsics, extrinsics: CameraExtrinsics) -> Self {
        Self {
            intrinsics,
            extrinsics,
        }
    }

    /// Validate both parts, e.g. after deserialization.
    pub fn validate(&self) -> Result<(), CameraError> {
        self.intrinsics.validate()?;
        self.extrinsics.validate()
    }

    /// Project a world point to pixels.
    pub fn project_world(&self, p_world: DVec3) -> Option<DVec2> {
        let p_cam = self.extrinsics.view_matrix().transform_point3(p_world);
        self.intrinsics.project(p_cam)
    }

    /// Express a scene-frame object pose in the camera frame.
    pub fn world_to_camera(&self, pose_world: &Pose) -> Pose {
        Pose::from_matrix(self.extrinsics.view_matrix() * pose_world.matrix())
    }

    /// Express a camera-frame object pose (what PnP returns) in the scene frame.
    ///
    /// For a camera with identity view rotation this only adds the camera position to the
    /// translation.
    pub fn camera_to_world(&self, pose_cam: &Pose) -> Pose {
        Pose::from_matrix(self.extrinsics.view_matrix().inverse() * pose_cam.matrix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference_camera() -> Result<CameraModel, CameraError> {
        Ok(CameraModel::new(
            CameraIntrinsics::new(1920, 1080, 5e4)?,
            CameraExtrinsics::new(
                DVec3::new(9.6, 5.4, -500.0),
                DVec3::new(9.6, 5.4, 0.0),
                DVec3::new(0.0, -1.0, 0.0),
            )?,
        ))
    }

    #[test]
    fn test_intrinsics_matrix() -> Result<(), CameraError> {
        let k = CameraIntrinsics::new(1920, 1080, 5e4)?;
        assert_eq!(
            k.to_array(),
            [[5e4, 0.0, 960.0], [0.0, 5e4, 540.0], [0.0, 0.0, 1.0]]
        );
        assert_eq!(k.matrix().row(0), DVec3::new(5e4, 0.0, 960.0));
        Ok(())
    }

    #[test]
    fn test_degenerate_intrinsics() {
        assert!(matches!(
            CameraIntrinsics::new(1920, 1080, 0.0),
            Err(CameraError::Degenerate { .. })
        ));
        assert!(matches!(
            CameraIntrinsics::new(0, 1080, 100.0),
            Err(CameraError::Degenerate { .. })
        ));
        assert!(matches!(
            CameraIntrinsics::with_principal_point(100, 100, 10.0, 101.0, 50.0),
            Err(CameraError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_view_params() -> Result<(), CameraError> {
        let k = CameraIntrinsics::new(1920, 1080, 5e4)?;
        let view = k.view_params();
        assert_eq!(view.window_center_x, 0.0);
        assert_eq!(view.window_center_y, 0.0);
        assert_relative_eq!(
            view.view_angle_deg,
            (2.0 * 540.0f64.atan2(5e4)).to_degrees(),
            epsilon = 1e-12
        );

        let off = CameraIntrinsics::with_principal_point(200, 100, 150.0, 120.0, 40.0)?;
        let view = off.view_params();
        assert_relative_eq!(view.window_center_x, -0.2, epsilon = 1e-12);
        assert_relative_eq!(view.window_center_y, -0.2, epsilon = 1e-12);
        let back = CameraIntrinsics::from_view_params(200, 100, &view)?;
        assert_relative_eq!(back.focal_length, 150.0, epsilon = 1e-9);
        assert_relative_eq!(back.cx, 120.0, epsilon = 1e-9);
        assert_relative_eq!(back.cy, 40.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_parallel_view_up() {
        let res = CameraExtrinsics::new(
            DVec3::new(0.0, 0.0, -10.0),
            DVec3::ZERO,
            DVec3::new(0.0, 0.0, 2.0),
        );
        assert!(matches!(res, Err(CameraError::ParallelViewUp { .. })));
    }

    #[test]
    fn test_reference_view_matrix() -> Result<(), CameraError> {
        let cam = reference_camera()?;
        let r = cam.extrinsics.rotation();
        assert!(r.abs_diff_eq(DMat3::IDENTITY, 1e-12));

        // The focal point projects onto the principal point.
        let px = cam
            .project_world(DVec3::new(9.6, 5.4, 0.0))
            .ok_or(CameraError::ParallelViewUp {
                view_up: [0.0; 3],
                direction: [0.0; 3],
            })?;
        assert_relative_eq!(px.x, 960.0, epsilon = 1e-9);
        assert_relative_eq!(px.y, 540.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_camera_to_world_adds_position() -> Result<(), CameraError> {
        let cam = reference_camera()?;
        let pose_cam = Pose::from_rotation_translation(DMat3::IDENTITY, DVec3::new(1.0, 2.0, 3.0));
        let pose_world = cam.camera_to_world(&pose_cam);
        let t = pose_world.translation();
        assert_relative_eq!(t.x, 10.6, epsilon = 1e-9);
        assert_relative_eq!(t.y, 7.4, epsilon = 1e-9);
        assert_relative_eq!(t.z, -497.0, epsilon = 1e-9);

        let again = cam.world_to_camera(&pose_world);
        assert!(again.abs_diff_eq(&pose_cam, 1e-9));
        Ok(())
    }
}
