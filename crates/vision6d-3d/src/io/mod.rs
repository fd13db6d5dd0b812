/// Pose file reading and writing.
pub mod pose;

pub use pose::{load_pose, save_pose, PoseIoError, RIGIDITY_TOLERANCE};
