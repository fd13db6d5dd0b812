use std::collections::btree_map::{BTreeMap, Entry};
use std::path::Path;

use glam::DVec3;
use vision6d_3d::io::{load_pose, save_pose};
use vision6d_3d::{CameraModel, MirrorAxis, Pose, TriMesh};
use vision6d_image::{ops, Mask, Rgb8Image};

use crate::color_code::{ColorCode, ColorScheme};
use crate::config::RegistrationConfig;
use crate::correspondence::{CorrespondenceExtractor, Correspondences};
use crate::error::RegistrationError;
use crate::pose_state::PoseState;
use crate::renderer::{Renderer, VertexSplatRenderer};
use crate::solver::{PoseEstimate, RobustPoseSolver};

#[derive(Debug, Clone)]
struct MeshEntry {
    mesh: TriMesh,
    code: ColorCode,
}

/// Result of one registration attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// What the solver found, in the camera frame.
    pub estimate: PoseEstimate,
    /// The scene-frame pose of the entity, mirror included. Identity when the solve failed.
    pub pose: Pose,
    /// Whether `pose` was committed to the pose state.
    pub committed: bool,
}

/// One open document: camera, meshes, poses and the registration pipeline.
#[derive(Debug)]
pub struct RegistrationSession<R = VertexSplatRenderer> {
    camera: CameraModel,
    color_scheme: ColorScheme,
    meshes: BTreeMap<String, MeshEntry>,
    state: PoseState,
    extractor: CorrespondenceExtractor,
    solver: RobustPoseSolver,
    renderer: R,
}

impl RegistrationSession<VertexSplatRenderer> {
    /// Create a session with the vertex-splat reference renderer.
    pub fn new(config: &RegistrationConfig) -> Result<Self, RegistrationError> {
        let renderer = VertexSplatRenderer::new(config.renderer.clone());
        Self::with_renderer(config, renderer)
    }
}

impl<R: Renderer> RegistrationSession<R> {
    /// Create a session around `renderer`.
    pub fn with_renderer(config: &RegistrationConfig, renderer: R) -> Result<Self, RegistrationError> {
        Ok(Self {
            camera: config.camera.to_camera_model()?,
            color_scheme: config.color_scheme,
            meshes: BTreeMap::new(),
            state: PoseState::new(config.pose_state.clone()),
            extractor: CorrespondenceExtractor::new(config.extractor.clone()),
            solver: RobustPoseSolver::new(config.seeded_ransac()),
            renderer,
        })
    }

    /// The camera.
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// Pose bookkeeping.
    pub fn pose_state(&self) -> &PoseState {
        &self.state
    }

    /// Mutable pose bookkeeping, for commits, undo and mirroring.
    pub fn pose_state_mut(&mut self) -> &mut PoseState {
        &mut self.state
    }

    /// The correspondence extractor.
    pub fn extractor(&self) -> &CorrespondenceExtractor {
        &self.extractor
    }

    /// The robust solver.
    pub fn solver(&self) -> &RobustPoseSolver {
        &self.solver
    }

    /// The renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Add a mesh coupled to the reference. A mesh that cannot be color coded gets uniform gray.
    pub fn add_mesh(&mut self, name: &str, mesh: TriMesh) -> Result<&ColorCode, RegistrationError> {
        self.state.track(name)?;
        Ok(self.insert_mesh(name, mesh))
    }

    /// Add a mesh that keeps its own pose.
    pub fn add_mesh_uncoupled(
        &mut self,
        name: &str,
        mesh: TriMesh,
        pose: Pose,
    ) -> Result<&ColorCode, RegistrationError> {
        self.state.track_uncoupled(name, pose)?;
        Ok(self.insert_mesh(name, mesh))
    }

    fn insert_mesh(&mut self, name: &str, mesh: TriMesh) -> &ColorCode {
        let code = ColorCode::encode_or_gray(&mesh, self.color_scheme);
        log::debug!("added mesh '{name}' with {} vertices", mesh.num_vertices());
        let entry = MeshEntry { mesh, code };
        match self.meshes.entry(name.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(entry);
                &slot.into_mut().code
            }
            Entry::Vacant(slot) => &slot.insert(entry).code,
        }
    }

    /// Remove a mesh and its pose.
    pub fn remove_mesh(&mut self, name: &str) -> Result<(), RegistrationError> {
        self.meshes
            .remove(name)
            .ok_or_else(|| RegistrationError::UnknownMesh(name.to_string()))?;
        self.state.untrack(name)?;
        Ok(())
    }

    /// The mesh registered under `name`.
    pub fn mesh(&self, name: &str) -> Result<&TriMesh, RegistrationError> {
        Ok(&self.entry(name)?.mesh)
    }

    /// The vertex colors of `name`.
    pub fn color_code(&self, name: &str) -> Result<&ColorCode, RegistrationError> {
        Ok(&self.entry(name)?.code)
    }

    /// Names of the loaded meshes.
    pub fn mesh_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.meshes.keys().map(String::as_str)
    }

    /// Toggle a mirror flag of `name`.
    pub fn mirror(&mut self, name: &str, axis: MirrorAxis) -> Result<Pose, RegistrationError> {
        Ok(self.state.apply_mirror(name, axis)?)
    }

    /// Render the color-coded mesh at its current pose, with the background set to the
    /// extractor's sentinel.
    pub fn render(&self, name: &str) -> Result<Rgb8Image, RegistrationError> {
        let entry = self.entry(name)?;
        let pose = self.state.pose(name)?;
        let mut image =
            self.renderer
                .render(&entry.mesh, &pose, entry.code.colors(), &self.camera)?;
        let sentinel = self.extractor.config().background;
        if self.renderer.background() != sentinel {
            ops::replace_background(&mut image, self.renderer.background(), sentinel);
        }
        Ok(image)
    }

    /// Decode the correspondences of `name` from a color-coded render.
    pub fn extract(
        &self,
        name: &str,
        image: &Rgb8Image,
        mask: Option<&Mask>,
    ) -> Result<Correspondences, RegistrationError> {
        let entry = self.entry(name)?;
        Ok(self.extractor.extract(image, mask, &entry.code, &entry.mesh)?)
    }

    /// Estimate the pose of `name` from a color-coded render and commit it on success.
    ///
    /// A failed solve leaves the pose state untouched and reports the identity pose.
    pub fn register(
        &mut self,
        name: &str,
        image: &Rgb8Image,
        mask: Option<&Mask>,
    ) -> Result<Registration, RegistrationError> {
        let correspondences = self.extract(name, image, mask)?;
        let mirror = self.state.mirror_state(name)?.matrix();

        // A mirrored entity renders as a rigid motion of its mirrored vertices.
        let points: Vec<[f64; 3]> = correspondences
            .points
            .iter()
            .map(|p| mirror.transform_point3(DVec3::from_array(*p)).to_array())
            .collect();
        let estimate =
            self.solver
                .solve_points(&points, &correspondences.pixels, &self.camera.intrinsics);

        if !estimate.is_success() {
            return Ok(Registration {
                estimate,
                pose: Pose::IDENTITY,
                committed: false,
            });
        }

        let pose = self.camera.camera_to_world(&estimate.pose) * Pose::from_matrix(mirror);
        self.state.commit_entity(name, pose)?;
        log::debug!(
            "registered '{name}' with {} inliers of {}",
            estimate.num_inliers(),
            estimate.num_correspondences
        );
        Ok(Registration {
            estimate,
            pose,
            committed: true,
        })
    }

    /// Render `name` at its current pose and register it against that render.
    pub fn register_rendered(
        &mut self,
        name: &str,
        mask: Option<&Mask>,
    ) -> Result<Registration, RegistrationError> {
        let image = self.render(name)?;
        self.register(name, &image, mask)
    }

    /// Write the current pose of `name` to a pose file.
    pub fn save_pose(&self, name: &str, path: impl AsRef<Path>) -> Result<(), RegistrationError> {
        let pose = self.state.pose(name)?;
        save_pose(path, &pose)?;
        Ok(())
    }

    /// Load a pose file and commit it for `name`.
    pub fn load_pose(&mut self, name: &str, path: impl AsRef<Path>) -> Result<Pose, RegistrationError> {
        let pose = load_pose(path)?;
        self.state.commit_entity(name, pose)?;
        Ok(pose)
    }

    fn entry(&self, name: &str) -> Result<&MeshEntry, RegistrationError> {
        self.meshes
            .get(name)
            .ok_or_else(|| RegistrationError::UnknownMesh(name.to_string()))
    }
}
