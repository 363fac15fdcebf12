use crate::bounds::Aabb;
use crate::config::{CameraConfig, OrbitConfig};
use cgmath::*;
use std::f32::consts::PI;
use winit::event::MouseScrollDelta;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

// Keeps the orbit off the poles, where the view's up vector degenerates
const MIN_POLAR: f32 = 1e-6;

// Pixel scroll deltas (touchpads, browsers) per line of wheel scrolling
const PIXELS_PER_LINE: f32 = 100.0;

// A minimized window or a canvas not laid out yet reports zero pixels
fn aspect_ratio(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>>(position: P, target: P) -> Self {
        Self {
            position: position.into(),
            target: target.into(),
            up: Vector3::unit_y(),
        }
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        // A camera collapsed onto its target (degenerate model) has no
        // viewing direction; keep the matrix finite by looking down -Z.
        if self.position.distance2(self.target) == 0.0 {
            return Matrix4::look_to_rh(self.position, -Vector3::unit_z(), self.up);
        }
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }
}

pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: aspect_ratio(width, height),
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn from_config(width: u32, height: u32, config: &CameraConfig) -> Self {
        Self::new(
            width,
            height,
            Deg(config.fovy_deg),
            config.znear,
            config.zfar,
        )
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = aspect_ratio(width, height);
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fovy(&self) -> Rad<f32> {
        self.fovy
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Orbits the camera around a target point.
///
/// Drag and wheel input accumulate into pending deltas; every `update`
/// applies `damping_factor` of what is pending and keeps the rest for the
/// following frames, so motion eases out instead of stopping dead. A
/// damping factor of zero applies all pending motion at once.
#[derive(Debug)]
pub struct OrbitController {
    target: Point3<f32>,
    radius: f32,
    azimuth: f32,
    polar: f32,
    pending_azimuth: f32,
    pending_polar: f32,
    pending_scale: f32,
    damping_factor: f32,
    rotate_speed: f32,
    zoom_speed: f32,
    enable_zoom: bool,
}

impl OrbitController {
    pub fn new(camera: &Camera, config: &OrbitConfig) -> Self {
        let mut controller = Self {
            target: camera.target,
            radius: 0.0,
            azimuth: 0.0,
            polar: 0.0,
            pending_azimuth: 0.0,
            pending_polar: 0.0,
            pending_scale: 1.0,
            damping_factor: config.damping_factor,
            rotate_speed: config.rotate_speed,
            zoom_speed: config.zoom_speed,
            enable_zoom: config.enable_zoom,
        };
        controller.set_target(camera.target, camera);
        controller
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Pivots around `target` from wherever the camera currently is.
    /// Pending motion is dropped.
    pub fn set_target(&mut self, target: Point3<f32>, camera: &Camera) {
        self.target = target;
        let (radius, azimuth, polar) = spherical_from_offset(camera.position - target);
        self.radius = radius;
        self.azimuth = azimuth;
        self.polar = polar;
        self.pending_azimuth = 0.0;
        self.pending_polar = 0.0;
        self.pending_scale = 1.0;
    }

    /// Pointer drag, in pixels.
    pub fn handle_mouse(&mut self, dx: f64, dy: f64) {
        self.pending_azimuth -= dx as f32 * self.rotate_speed;
        self.pending_polar -= dy as f32 * self.rotate_speed;
    }

    pub fn handle_mouse_scroll(&mut self, delta: &MouseScrollDelta) {
        if !self.enable_zoom {
            return;
        }
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => *y,
            MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
        };
        // Scrolling up (positive) moves closer
        self.pending_scale *= self.zoom_speed.powf(lines);
    }

    pub fn update(&mut self, camera: &mut Camera) {
        let step = if self.damping_factor > 0.0 {
            self.damping_factor
        } else {
            1.0
        };

        self.azimuth += self.pending_azimuth * step;
        self.polar = (self.polar + self.pending_polar * step).clamp(MIN_POLAR, PI - MIN_POLAR);
        self.radius = (self.radius * self.pending_scale).max(0.0);

        self.pending_azimuth *= 1.0 - step;
        self.pending_polar *= 1.0 - step;
        self.pending_scale = 1.0;

        camera.position = self.target + offset_from_spherical(self.radius, self.azimuth, self.polar);
        camera.target = self.target;
    }
}

// Azimuth is measured around +Y starting from +Z, polar angle down from +Y
fn spherical_from_offset(offset: Vector3<f32>) -> (f32, f32, f32) {
    let radius = offset.magnitude();
    if radius == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let azimuth = offset.x.atan2(offset.z);
    let polar = (offset.y / radius).clamp(-1.0, 1.0).acos();
    (radius, azimuth, polar)
}

fn offset_from_spherical(radius: f32, azimuth: f32, polar: f32) -> Vector3<f32> {
    let (sin_polar, cos_polar) = polar.sin_cos();
    let (sin_azimuth, cos_azimuth) = azimuth.sin_cos();
    Vector3::new(
        radius * sin_polar * sin_azimuth,
        radius * cos_polar,
        radius * sin_polar * cos_azimuth,
    )
}

/// Moves the camera along its current viewing direction until the whole of
/// `bounds` fits the vertical field of view, aims it at the box center and
/// makes the orbit controller pivot there. Returns the fitting distance.
///
/// A degenerate box gives a distance of zero, which puts the camera on the
/// box center.
pub fn fit_camera(
    camera: &mut Camera,
    projection: &Projection,
    controller: &mut OrbitController,
    bounds: &Aabb,
) -> f32 {
    let center = bounds.center();
    let half_size = bounds.size() * 0.5;
    let half_fovy = projection.fovy() * 0.5;
    let distance = half_size / half_fovy.tan();

    let offset = camera.position - center;
    let direction = if offset.magnitude2() > 0.0 {
        offset.normalize()
    } else {
        Vector3::zero()
    };

    camera.position = center + direction * distance;
    camera.target = center;
    controller.set_target(center, camera);

    distance
}
