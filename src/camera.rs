// camera.rs - perspective camera state, scroll zoom and drag orbit

use crate::config::ViewerSettings;
use crate::scene::Ray;
use crate::tiles::camera_forward;
use glam::{Mat4, Quat, Vec2, Vec3};

pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, 0.0, 2.0);
const NEAR: f32 = 0.1;
const FAR: f32 = 1000.0;
const MAX_PITCH_DEG: f32 = 89.9;

/// Owns field of view (degrees), orientation and position. After any change
/// `apply_projection_update` must run before the next frame is drawn; the
/// mutators here do that themselves.
#[derive(Debug, Clone)]
pub struct CameraRig {
    fov: f32,
    default_fov: f32,
    min_fov: f32,
    max_fov: f32,
    aspect: f32,
    orientation: Quat,
    position: Vec3,
    projection: Mat4,
    scroll_zoom_factor: f32,
    drag_sensitivity: f32,
}

impl CameraRig {
    pub fn new(settings: &ViewerSettings, aspect: f32) -> Self {
        let mut rig = Self {
            fov: settings.initial_fov,
            default_fov: settings.initial_fov,
            min_fov: settings.min_fov,
            max_fov: settings.max_fov,
            aspect: if aspect > 0.0 { aspect } else { 1.0 },
            orientation: Quat::IDENTITY,
            position: DEFAULT_POSITION,
            projection: Mat4::IDENTITY,
            scroll_zoom_factor: settings.scroll_zoom_factor,
            drag_sensitivity: settings.drag_sensitivity,
        };
        rig.apply_projection_update();
        rig
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn forward(&self) -> Vec3 {
        camera_forward(self.orientation)
    }

    /// Initial field of view, position `(0, 0, 2)`, identity rotation.
    pub fn reset_to_default(&mut self) {
        self.fov = self.default_fov;
        self.position = DEFAULT_POSITION;
        self.orientation = Quat::IDENTITY;
        self.apply_projection_update();
    }

    pub fn apply_projection_update(&mut self) {
        self.projection = Mat4::perspective_rh(self.fov.to_radians(), self.aspect, NEAR, FAR);
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
        self.apply_projection_update();
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation.normalize();
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
            self.apply_projection_update();
        }
    }

    /// Wheel zoom with a browser-style `deltaY` (positive zooms out).
    /// Returns whether the field of view changed.
    pub fn on_scroll(&mut self, delta_y: f32) -> bool {
        let before = self.fov;
        self.fov = (self.fov + delta_y * self.scroll_zoom_factor).clamp(self.min_fov, self.max_fov);
        self.apply_projection_update();
        self.fov != before
    }

    /// Orbit by a pointer drag of `(dx, dy)` pixels. One pixel turns the view
    /// by the angle it spans at the current field of view.
    pub fn on_drag(&mut self, dx: f32, dy: f32, viewport: (u32, u32)) {
        let (width, height) = (viewport.0 as f32, viewport.1 as f32);
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let v_f = self.fov.to_radians();
        let h_f = 2.0 * ((v_f / 2.0).tan() * (width / height)).atan();
        let yaw_per_px = h_f / width;
        let pitch_per_px = v_f / height;

        let (yaw, pitch) = yaw_pitch(self.forward());
        let yaw = yaw - dx * yaw_per_px * self.drag_sensitivity;
        let pitch = pitch - dy * pitch_per_px * self.drag_sensitivity;
        self.orientation = from_yaw_pitch(yaw, pitch);
    }

    /// Roll-free rotation pointing the camera from its position at `target`.
    pub fn look_at_rotation(&self, target: Vec3) -> Quat {
        match (target - self.position).try_normalize() {
            Some(dir) => {
                let (yaw, pitch) = yaw_pitch(dir);
                from_yaw_pitch(yaw, pitch)
            }
            None => self.orientation,
        }
    }

    /// Ray from the camera through a point in normalised device coordinates.
    pub fn ray_from_ndc(&self, ndc: Vec2) -> Ray {
        let view_point = self.projection.inverse().project_point3(ndc.extend(0.5));
        Ray::new(self.position, self.orientation * view_point.normalize_or_zero())
    }
}

/// Pixel position (origin top-left) to normalised device coordinates.
pub fn screen_to_ndc(pos: Vec2, viewport: (u32, u32)) -> Vec2 {
    let (w, h) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
    Vec2::new(pos.x / w * 2.0 - 1.0, -(pos.y / h) * 2.0 + 1.0)
}

fn yaw_pitch(dir: Vec3) -> (f32, f32) {
    let yaw = (-dir.x).atan2(-dir.z);
    let pitch = dir.y.clamp(-1.0, 1.0).asin();
    (yaw, pitch)
}

fn from_yaw_pitch(yaw: f32, pitch: f32) -> Quat {
    let max = MAX_PITCH_DEG.to_radians();
    Quat::from_rotation_y(yaw) * Quat::from_rotation_x(pitch.clamp(-max, max))
}
