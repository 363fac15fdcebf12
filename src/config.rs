use crate::defaults;
use crate::error::ViewerError;
use crate::resources::load_string;
use serde::{Deserialize, Serialize};

/// Viewer configuration. Every field falls back to the compiled-in value
/// from [`defaults`], so a config file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub models: Vec<String>,
    pub camera: CameraConfig,
    pub orbit: OrbitConfig,
    /// Radians per frame
    pub idle_rotation: f32,
    pub background_color: [f32; 4],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            models: defaults::MODEL_PATHS.iter().map(|p| p.to_string()).collect(),
            camera: CameraConfig::default(),
            orbit: OrbitConfig::default(),
            idle_rotation: defaults::IDLE_ROTATION,
            background_color: defaults::BACKGROUND_COLOR,
        }
    }
}

/// Camera position and projection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub fovy_deg: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: defaults::CAMERA_POSITION,
            fovy_deg: defaults::CAMERA_FOVY_DEG,
            znear: defaults::CAMERA_ZNEAR,
            zfar: defaults::CAMERA_ZFAR,
        }
    }
}

/// Orbit control tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub enable_zoom: bool,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            damping_factor: defaults::ORBIT_DAMPING_FACTOR,
            rotate_speed: defaults::ORBIT_ROTATE_SPEED,
            zoom_speed: defaults::ORBIT_ZOOM_SPEED,
            enable_zoom: true,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self, ViewerError> {
        let config: ViewerConfig =
            serde_json::from_str(json).map_err(|e| ViewerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        if self.models.is_empty() {
            return Err(ViewerError::Config("model list is empty".into()));
        }
        if !(self.camera.fovy_deg > 0.0 && self.camera.fovy_deg < 180.0) {
            return Err(ViewerError::Config(format!(
                "camera fovy_deg must be in (0, 180), got {}",
                self.camera.fovy_deg
            )));
        }
        if !(self.camera.znear > 0.0 && self.camera.zfar > self.camera.znear) {
            return Err(ViewerError::Config(format!(
                "camera clip planes need 0 < znear < zfar, got znear {} and zfar {}",
                self.camera.znear, self.camera.zfar
            )));
        }
        if !(0.0..=1.0).contains(&self.orbit.damping_factor) {
            return Err(ViewerError::Config(format!(
                "orbit damping_factor must be in [0, 1], got {}",
                self.orbit.damping_factor
            )));
        }
        Ok(())
    }

    /// Reads [`defaults::CONFIG_PATH`] from the resource directory. A missing
    /// file means "use the defaults"; a present but invalid one is an error.
    pub async fn load() -> Result<Self, ViewerError> {
        match load_string(defaults::CONFIG_PATH).await {
            Ok(json) => {
                log::info!("Using configuration from {}", defaults::CONFIG_PATH);
                Self::from_json(&json)
            }
            Err(e) => {
                log::info!(
                    "No {} found ({:#}), using built-in defaults",
                    defaults::CONFIG_PATH,
                    e
                );
                Ok(Self::default())
            }
        }
    }
}
