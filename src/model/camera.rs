use glam::{EulerRot, Quat, Vec3};
use std::f32::consts::FRAC_PI_2;

/// First-person camera. Yaw 0 looks down -Z; positive yaw turns left.
#[derive(Debug, Clone)]
pub struct Camera {
    pub eye: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            eye: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            up: Vec3::Y,
            fov_y: 75f32.to_radians(),
            aspect: width as f32 / height.max(1) as f32,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }

    /// View direction including pitch.
    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp).normalize()
    }

    /// Yaw-only forward, used for walking directions.
    pub fn flat_forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        Vec3::new(-sy, 0.0, -cy)
    }

    /// Strafe direction: flat forward x up.
    pub fn right(&self) -> Vec3 {
        self.flat_forward().cross(self.up).normalize()
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Rotate by a screen-space delta in pixels. Pitch stays within ±π/2.
    pub fn apply_look_delta(&mut self, dx: f32, dy: f32, sensitivity: f32) {
        self.yaw -= dx * sensitivity;
        self.pitch = (self.pitch - dy * sensitivity).clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_axes_at_zero_yaw() {
        let cam = Camera::new(800, 600);
        assert!(approx(cam.forward(), Vec3::NEG_Z));
        assert!(approx(cam.right(), Vec3::X));
        assert!(approx(cam.orientation() * Vec3::NEG_Z, cam.forward()));
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut cam = Camera::new(800, 600);
        cam.apply_look_delta(0.0, -100_000.0, 0.002);
        assert_eq!(cam.pitch, FRAC_PI_2);
        cam.apply_look_delta(0.0, 200_000.0, 0.002);
        assert_eq!(cam.pitch, -FRAC_PI_2);
    }

    #[test]
    fn test_orientation_matches_forward_when_pitched() {
        let mut cam = Camera::new(800, 600);
        cam.yaw = 0.7;
        cam.pitch = -0.4;
        assert!(approx(cam.orientation() * Vec3::NEG_Z, cam.forward()));
        assert_eq!(cam.flat_forward().y, 0.0);
    }
}
