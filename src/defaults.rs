/// Centralized default values for the viewer
/// Every one of these can be overridden from `viewer.json`

/// Models cycled through by the Previous/Next buttons, in navigation order
pub const MODEL_PATHS: [&str; 3] = ["models/1.glb", "models/2.glb", "models/3.glb"];

/// Optional configuration file, looked up next to the other resources
pub const CONFIG_PATH: &str = "viewer.json";

/// Shader used for every model
pub const SHADER_PATH: &str = "shader.wgsl";

/// Initial camera placement; fitting keeps this viewing direction
pub const CAMERA_POSITION: [f32; 3] = [0.0, 1.5, 3.0];
pub const CAMERA_FOVY_DEG: f32 = 75.0;
pub const CAMERA_ZNEAR: f32 = 0.1;
pub const CAMERA_ZFAR: f32 = 1000.0;

/// Fraction of the pending orbit motion applied per frame
pub const ORBIT_DAMPING_FACTOR: f32 = 0.25;

/// Radians of orbit per pixel dragged
pub const ORBIT_ROTATE_SPEED: f32 = 0.005;

/// Radius multiplier per wheel notch
pub const ORBIT_ZOOM_SPEED: f32 = 0.95;

/// Radians about the vertical axis added to the model every frame
pub const IDLE_ROTATION: f32 = 0.005;

pub const BACKGROUND_COLOR: [f32; 4] = [0.1, 0.1, 0.12, 1.0];
