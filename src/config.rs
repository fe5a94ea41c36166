//! Tuning values for the viewer. `Config::default()` is the shipped setup.

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::error::PhysicsError;

#[derive(Debug, Clone)]
pub struct Config {
    pub enable_physics: bool,
    pub enable_audio: bool,
    /// Fly speed in world units per second.
    pub move_speed: f32,
    /// Upper bound on a single frame delta, in seconds.
    pub max_frame_dt: f32,
    pub splat: SplatConfig,
    pub env: EnvConfig,
    pub physics: PhysicsConfig,
    pub look: LookConfig,
    pub joystick: JoystickConfig,
    pub shot: ShotConfig,
    pub start_pose: StartPose,
    pub ambience: AmbienceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_physics: true,
            enable_audio: true,
            move_speed: 6.5,
            max_frame_dt: 1.0 / 30.0,
            splat: SplatConfig::default(),
            env: EnvConfig::default(),
            physics: PhysicsConfig::default(),
            look: LookConfig::default(),
            joystick: JoystickConfig::default(),
            shot: ShotConfig::default(),
            start_pose: StartPose::default(),
            ambience: AmbienceConfig::default(),
        }
    }
}

/// Placement of the splat scene. Angles in radians.
#[derive(Debug, Clone)]
pub struct SplatConfig {
    pub url: String,
    pub scale: f32,
    pub position: Vec3,
    pub rotation_euler: Vec3,
}

impl Default for SplatConfig {
    fn default() -> Self {
        Self {
            url: "https://japanese-room.s3.ap-northeast-1.amazonaws.com/JapaneseRoom.spz".to_string(),
            scale: 3.0,
            position: Vec3::new(0.0, 0.0, -6.0),
            rotation_euler: Vec3::ZERO,
        }
    }
}

fn euler_xyz(angles: Vec3) -> Quat {
    Quat::from_euler(EulerRot::XYZ, angles.x, angles.y, angles.z)
}

/// Optional collision mesh aligned to the splat.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub glb_url: Option<String>,
    pub apply_splat_space: bool,
    pub fixed_rot_euler: Vec3,
    pub fixed_offset: Vec3,
    pub visible_in_debug: bool,
    pub restitution: f32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            glb_url: None,
            apply_splat_space: true,
            fixed_rot_euler: Vec3::new(0.0, std::f32::consts::PI, 0.0),
            fixed_offset: Vec3::ZERO,
            visible_in_debug: false,
            restitution: 0.6,
        }
    }
}

impl EnvConfig {
    /// Mesh-local to world transform for the collision mesh. In splat space
    /// the mesh takes the splat placement with `fixed_rot_euler` added to the
    /// angles and `fixed_offset` to the position; otherwise it is left as is.
    pub fn collision_transform(&self, splat: &SplatConfig) -> Mat4 {
        if !self.apply_splat_space {
            return Mat4::IDENTITY;
        }
        Mat4::from_scale_rotation_translation(
            Vec3::splat(splat.scale),
            euler_xyz(splat.rotation_euler + self.fixed_rot_euler),
            splat.position + self.fixed_offset,
        )
    }
}

#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    pub fixed_fps: u32,
    pub max_steps_per_frame: u32,
    pub solver_iterations: usize,
    pub friction_iterations: usize,
    pub prediction_distance: f32,
    pub player_radius: f32,
    pub player_half_height: f32,
    /// Capsule center sits this far below the camera eye.
    pub eye_offset: f32,
    pub kcc_offset: f32,
    pub max_slope_climb_deg: f32,
    pub min_slope_slide_deg: f32,
    pub autostep_max_height: f32,
    pub autostep_min_width: f32,
    pub snap_to_ground: f32,
    pub character_mass: f32,
    pub push_dynamic_bodies: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -30.0, 0.0),
            fixed_fps: 60,
            max_steps_per_frame: 3,
            solver_iterations: 2,
            friction_iterations: 2,
            prediction_distance: 0.01,
            player_radius: 0.3,
            player_half_height: 0.9,
            eye_offset: 0.7,
            kcc_offset: 0.08,
            max_slope_climb_deg: 50.0,
            min_slope_slide_deg: 55.0,
            autostep_max_height: 0.6,
            autostep_min_width: 0.25,
            snap_to_ground: 0.6,
            character_mass: 90.0,
            push_dynamic_bodies: true,
        }
    }
}

impl PhysicsConfig {
    pub fn fixed_step(&self) -> f32 {
        1.0 / self.fixed_fps.max(1) as f32
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.fixed_fps == 0 {
            return Err(PhysicsError::InvalidRate(self.fixed_fps));
        }
        if self.max_steps_per_frame == 0 {
            return Err(PhysicsError::NoStepsAllowed);
        }
        if self.solver_iterations == 0 {
            return Err(PhysicsError::NoSolverIterations);
        }
        let capsule_ok = self.player_radius.is_finite()
            && self.player_half_height.is_finite()
            && self.player_radius > 0.0
            && self.player_half_height > 0.0;
        if !capsule_ok {
            return Err(PhysicsError::InvalidCapsule {
                radius: self.player_radius,
                half_height: self.player_half_height,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LookConfig {
    /// Radians per pixel of relative mouse movement.
    pub mouse_sensitivity: f32,
    /// Radians per pixel of touch drag.
    pub touch_sensitivity: f32,
    pub relock_retry_ms: u32,
}

impl Default for LookConfig {
    fn default() -> Self {
        Self {
            mouse_sensitivity: 0.002,
            touch_sensitivity: 0.005,
            relock_retry_ms: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoystickConfig {
    /// Knob travel in pixels.
    pub max_distance: f32,
    pub dead_zone: f32,
    /// Scale applied to the joystick before it is blended into movement.
    pub sensitivity: f32,
    /// Per-frame factor while the released knob springs back.
    pub return_decay: f32,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            max_distance: 50.0,
            dead_zone: 0.15,
            sensitivity: 0.15,
            return_decay: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShotConfig {
    pub cooldown_s: f64,
    pub speed: f32,
    pub radius: f32,
    pub ttl: f32,
    /// Distance in front of the eye where the ball appears.
    pub muzzle_offset: f32,
    pub color: u32,
}

impl Default for ShotConfig {
    fn default() -> Self {
        Self {
            cooldown_s: crate::controller::projectile::SHOOT_COOLDOWN_S,
            speed: 22.0,
            radius: 0.12,
            ttl: 6.0,
            muzzle_offset: 0.8,
            color: 0xffaa00,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartPose {
    pub eye: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for StartPose {
    fn default() -> Self {
        Self {
            eye: Vec3::new(-2.81, 1.04, -17.14),
            yaw: -0.598,
            pitch: 0.14,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AmbienceConfig {
    pub name: String,
    pub url: String,
    pub volume: f32,
}

impl Default for AmbienceConfig {
    fn default() -> Self {
        Self {
            name: "ambience".to_string(),
            url: "https://play.rosebud.ai/assets/big-room-ambience.mp3?j4Fn".to_string(),
            volume: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_physics_is_valid() {
        let physics = PhysicsConfig::default();
        assert!(physics.validate().is_ok());
        assert!((physics.fixed_step() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut physics = PhysicsConfig::default();
        physics.fixed_fps = 0;
        assert_eq!(physics.validate(), Err(PhysicsError::InvalidRate(0)));

        let mut physics = PhysicsConfig::default();
        physics.solver_iterations = 0;
        assert_eq!(physics.validate(), Err(PhysicsError::NoSolverIterations));

        let mut physics = PhysicsConfig::default();
        physics.player_radius = -1.0;
        assert!(matches!(physics.validate(), Err(PhysicsError::InvalidCapsule { .. })));
    }

    #[test]
    fn test_collision_mesh_follows_splat_placement() {
        let config = Config::default();
        let m = config.env.collision_transform(&config.splat);

        assert!((m.transform_point3(Vec3::ZERO) - Vec3::new(0.0, 0.0, -6.0)).length() < 1e-5);
        // scaled by 3 and turned half a circle around Y
        let p = m.transform_point3(Vec3::X);
        assert!((p - Vec3::new(-3.0, 0.0, -6.0)).length() < 1e-4, "got {p:?}");

        let mut env = config.env.clone();
        env.fixed_offset = Vec3::new(0.0, 1.0, 0.0);
        let p = env.collision_transform(&config.splat).transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.0, 1.0, -6.0)).length() < 1e-5);

        env.apply_splat_space = false;
        assert_eq!(env.collision_transform(&config.splat), Mat4::IDENTITY);
    }
}
