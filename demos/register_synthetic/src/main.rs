use argh::FromArgs;
use glam::DVec3;
use std::path::PathBuf;

use vision6d::k3d::{so3::SO3, MirrorAxis, Pose, TriMesh};
use vision6d::registration::{ColorScheme, RegistrationConfig, RegistrationSession};

#[derive(FromArgs)]
/// Render a synthetic color-coded mesh and register it back
struct Args {
    /// optional JSON session config
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// color scheme, `nocs` or `latlon`
    #[argh(option, default = "ColorScheme::Nocs")]
    scheme: ColorScheme,

    /// mirror the mesh along `x` or `y` before registering
    #[argh(option)]
    mirror: Option<MirrorAxis>,

    /// lattice points per side
    #[argh(option, default = "9")]
    points_per_side: usize,

    /// write the recovered pose to this file
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => RegistrationConfig::from_json_file(path)?,
        None => RegistrationConfig::default(),
    };
    config.color_scheme = args.scheme;

    let mut session = RegistrationSession::new(&config)?;
    let camera = *session.camera();

    // ground truth: rotated and placed in front of the camera, on the optical axis
    let rotation = SO3::exp(DVec3::new(0.4, -0.3, 0.6)).matrix();
    let target = camera.extrinsics.focal_point + DVec3::new(0.0, 0.0, 5.0);
    // a mirrored object must still land on the target
    let placement = match args.mirror {
        Some(axis) => axis.reflection().transform_point3(target),
        None => target,
    };
    let mut truth = Pose::from_rotation_translation(rotation, placement);

    // a lattice of side 4 centered on the object origin
    let n = args.points_per_side.max(2);
    let step = 4.0 / (n - 1) as f64;
    let mut vertices = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                vertices.push([
                    i as f64 * step - 2.0,
                    j as f64 * step - 2.0,
                    k as f64 * step - 2.0,
                ]);
            }
        }
    }
    session.add_mesh("object", TriMesh::from_points(vertices)?)?;

    if let Some(axis) = args.mirror {
        session.mirror("object", axis)?;
        truth = truth.mirrored(axis);
    }
    session.pose_state_mut().commit(truth)?;

    let image = session.render("object")?;
    session.pose_state_mut().commit(Pose::IDENTITY)?;

    let registration = session.register("object", &image, None)?;
    let estimate = &registration.estimate;
    match &estimate.failure {
        Some(err) => log::error!("registration failed ({}): {err}", err.reason_code()),
        None => log::info!(
            "{} inliers of {} correspondences, rmse {:.3} px",
            estimate.num_inliers(),
            estimate.num_correspondences,
            estimate.reproj_rmse.unwrap_or(f64::NAN)
        ),
    }

    println!("ground truth:\n{truth}");
    println!("recovered:\n{}", registration.pose);
    println!(
        "max abs difference: {:.6}",
        registration.pose.max_abs_diff(&truth)
    );

    if let Some(path) = args.output {
        session.save_pose("object", &path)?;
        println!("pose written to {}", path.display());
    }

    Ok(())
}
