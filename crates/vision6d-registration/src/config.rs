use std::fs;
use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision6d_3d::{CameraError, CameraExtrinsics, CameraIntrinsics, CameraModel};
use vision6d_pnp::RansacParams;

use crate::color_code::ColorScheme;
use crate::correspondence::ExtractorConfig;
use crate::pose_state::PoseStateConfig;
use crate::renderer::RendererConfig;

/// Error types for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The JSON is malformed or has wrongly typed fields.
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The camera parameters are degenerate.
    #[error("invalid camera: {0}")]
    Camera(#[from] CameraError),
}

/// Camera parameters as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Focal length in pixels.
    pub focal_length: f64,
    /// Principal point x, the image center when absent.
    pub cx: Option<f64>,
    /// Principal point y, the image center when absent.
    pub cy: Option<f64>,
    /// Camera center.
    pub position: [f64; 3],
    /// Point the camera looks at.
    pub focal_point: [f64; 3],
    /// Screen-up direction.
    pub view_up: [f64; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            focal_length: 5e4,
            cx: None,
            cy: None,
            position: [9.6, 5.4, -500.0],
            focal_point: [9.6, 5.4, 0.0],
            view_up: [0.0, -1.0, 0.0],
        }
    }
}

impl CameraConfig {
    /// Build and validate the camera.
    pub fn to_camera_model(&self) -> Result<CameraModel, CameraError> {
        let intrinsics = CameraIntrinsics::with_principal_point(
            self.width,
            self.height,
            self.focal_length,
            self.cx.unwrap_or(self.width as f64 / 2.0),
            self.cy.unwrap_or(self.height as f64 / 2.0),
        )?;
        let extrinsics = CameraExtrinsics::new(
            DVec3::from_array(self.position),
            DVec3::from_array(self.focal_point),
            DVec3::from_array(self.view_up),
        )?;
        Ok(CameraModel::new(intrinsics, extrinsics))
    }
}

/// Everything a [`crate::RegistrationSession`] needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// The camera.
    pub camera: CameraConfig,
    /// Vertex color scheme used for new meshes.
    pub color_scheme: ColorScheme,
    /// Robust solver parameters. The session overrides a missing seed with [`Self::seed`].
    pub ransac: RansacParams,
    /// Background detection.
    pub extractor: ExtractorConfig,
    /// History bounds and redo switch.
    pub pose_state: PoseStateConfig,
    /// Reference renderer parameters.
    pub renderer: RendererConfig,
    /// RANSAC seed used when `ransac.random_seed` is unset.
    pub seed: u64,
}

impl RegistrationConfig {
    /// Parse a JSON config and validate the camera.
    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: RegistrationConfig = serde_json::from_str(payload)?;
        config.camera.to_camera_model()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let payload = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&payload)
    }

    /// Pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// RANSAC parameters with the session seed filled in.
    pub fn seeded_ransac(&self) -> RansacParams {
        RansacParams {
            random_seed: Some(self.ransac.random_seed.unwrap_or(self.seed)),
            ..self.ransac.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_setup() -> Result<(), Box<dyn std::error::Error>> {
        let config = RegistrationConfig::default();
        let camera = config.camera.to_camera_model()?;
        assert_eq!(camera.intrinsics.to_array()[0], [5e4, 0.0, 960.0]);
        assert_eq!(camera.extrinsics.position, DVec3::new(9.6, 5.4, -500.0));
        assert_eq!(config.ransac.confidence, 0.999);
        assert_eq!(config.ransac.reproj_threshold_px, 8.0);
        assert_eq!(config.ransac.max_iterations, 100);
        assert!(!config.pose_state.enable_redo);
        assert_eq!(config.seeded_ransac().random_seed, Some(0));
        Ok(())
    }

    #[test]
    fn test_partial_json_fills_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config = RegistrationConfig::from_json_str(
            r#"{"camera": {"focal_length": 1000.0, "cx": 100.0}, "color_scheme": "latlon", "seed": 3}"#,
        )?;
        assert_eq!(config.camera.focal_length, 1000.0);
        assert_eq!(config.camera.width, 1920);
        assert_eq!(config.camera.cx, Some(100.0));
        assert_eq!(config.color_scheme, ColorScheme::LatLon);
        assert_eq!(config.seeded_ransac().random_seed, Some(3));

        let back = RegistrationConfig::from_json_str(&config.to_json_string()?)?;
        assert_eq!(back, config);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_configs() {
        assert!(matches!(
            RegistrationConfig::from_json_str(r#"{"camera": {"focal_length": 0.0}}"#),
            Err(ConfigError::Camera(CameraError::Degenerate { .. }))
        ));
        assert!(matches!(
            RegistrationConfig::from_json_str(r#"{"camera": {"view_up": [0.0, 0.0, 1.0]}}"#),
            Err(ConfigError::Camera(CameraError::ParallelViewUp { .. }))
        ));
        assert!(matches!(
            RegistrationConfig::from_json_str(r#"{"camera": {"width": "wide"}}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RegistrationConfig::from_json_file("/nonexistent/registration.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
