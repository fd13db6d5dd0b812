use approx::assert_relative_eq;
use glam::DVec3;
use vision6d_3d::io::{load_pose, save_pose};
use vision6d_3d::so3::SO3;
use vision6d_3d::{CameraExtrinsics, CameraIntrinsics, CameraModel, MirrorAxis, Pose};

#[test]
fn tilted_camera_projection_is_consistent() -> Result<(), Box<dyn std::error::Error>> {
    let camera = CameraModel::new(
        CameraIntrinsics::new(640, 480, 600.0)?,
        CameraExtrinsics::new(
            DVec3::new(3.0, -2.0, -20.0),
            DVec3::new(0.5, 0.5, 0.0),
            DVec3::new(0.1, -1.0, 0.0),
        )?,
    );
    let r = camera.extrinsics.rotation();
    assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);

    let object = Pose::from_rotation_translation(
        SO3::exp(DVec3::new(0.3, 0.1, -0.2)).matrix(),
        DVec3::new(0.2, 0.4, 1.0),
    );
    let in_camera = camera.world_to_camera(&object);
    for p in [DVec3::ZERO, DVec3::X, DVec3::new(-0.5, 0.3, 0.7)] {
        let direct = camera.project_world(object.transform_point(p));
        let via_camera = camera.intrinsics.project(in_camera.transform_point(p));
        let (Some(a), Some(b)) = (direct, via_camera) else {
            panic!("point {p} should be visible");
        };
        assert!(a.abs_diff_eq(b, 1e-9));
    }
    assert!(camera.camera_to_world(&in_camera).abs_diff_eq(&object, 1e-9));
    Ok(())
}

#[test]
fn mirrored_pose_survives_pose_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("facial_nerve.bin");
    let pose = Pose::from_rotation_translation(
        SO3::exp(DVec3::new(-0.4, 0.2, 0.9)).matrix(),
        DVec3::new(9.6, 5.4, 12.0),
    )
    .mirrored(MirrorAxis::Y);

    save_pose(&path, &pose)?;
    let loaded = load_pose(&path)?;
    assert_eq!(loaded, pose);
    assert!(loaded.is_orthonormal_up_to_reflection(1e-9));
    assert_relative_eq!(loaded.rotation().determinant(), -1.0, epsilon = 1e-9);
    Ok(())
}
