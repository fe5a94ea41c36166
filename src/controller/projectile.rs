use glam::Vec3;
use rapier3d::prelude::RigidBodyHandle;
use tracing::{debug, warn};

use crate::config::ShotConfig;
use crate::controller::physics::{Material, PhysicsWorld};
use crate::model::Camera;
use crate::view::{SceneGraph, VisualId};

/// Minimum wall-clock gap between accepted shots, in seconds.
pub const SHOOT_COOLDOWN_S: f64 = 0.25;

/// Projectiles leaving this volume are culled.
const BOUNDS_XZ: f32 = 500.0;
const BOUNDS_MIN_Y: f32 = -50.0;

const BALL_MATERIAL: Material = Material {
    restitution: 0.6,
    friction: 0.8,
    density: 1.0,
};

/// Rate limit on shooting, driven by wall-clock seconds rather than frames.
#[derive(Debug, Clone)]
pub struct ShootCooldown {
    cooldown: f64,
    last_shot: Option<f64>,
}

impl ShootCooldown {
    pub fn new(cooldown: f64) -> Self {
        Self {
            cooldown,
            last_shot: None,
        }
    }

    /// Accept a shot at `now` if the cooldown has elapsed since the last one.
    pub fn try_fire(&mut self, now: f64) -> bool {
        match self.last_shot {
            Some(last) if now - last < self.cooldown => false,
            _ => {
                self.last_shot = Some(now);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectileStyle {
    pub color: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjectileId(u64);

#[derive(Debug)]
struct Projectile {
    id: ProjectileId,
    body: RigidBodyHandle,
    visual: VisualId,
    ttl: f32,
}

fn out_of_bounds(p: Vec3) -> bool {
    p.x.abs() > BOUNDS_XZ || p.z.abs() > BOUNDS_XZ || p.y < BOUNDS_MIN_Y
}

/// Live set of body/visual pairs.
#[derive(Debug, Default)]
pub struct ProjectileSystem {
    live: Vec<Projectile>,
    next_id: u64,
}

impl ProjectileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(
        &mut self,
        world: &mut PhysicsWorld,
        scene: &mut dyn SceneGraph,
        origin: Vec3,
        velocity: Vec3,
        radius: f32,
        ttl: f32,
        style: ProjectileStyle,
    ) -> ProjectileId {
        let body = world.spawn_ball(origin, velocity, radius, BALL_MATERIAL);
        let visual = scene.add_projectile_visual(origin, radius, style.color);
        let id = ProjectileId(self.next_id);
        self.next_id += 1;
        self.live.push(Projectile { id, body, visual, ttl });
        debug!(id = id.0, ?origin, ?velocity, "projectile spawned");
        id
    }

    /// Fire along the camera's view direction from just in front of the eye.
    pub fn spawn_from_camera(
        &mut self,
        world: &mut PhysicsWorld,
        scene: &mut dyn SceneGraph,
        camera: &Camera,
        shot: &ShotConfig,
    ) -> ProjectileId {
        let forward = camera.forward();
        self.spawn(
            world,
            scene,
            camera.eye + forward * shot.muzzle_offset,
            forward * shot.speed,
            shot.radius,
            shot.ttl,
            ProjectileStyle { color: shot.color },
        )
    }

    /// Once per rendered frame: count down, sync visuals, cull.
    pub fn tick(&mut self, world: &mut PhysicsWorld, scene: &mut dyn SceneGraph, frame_dt: f32) {
        self.live.retain_mut(|p| {
            p.ttl -= frame_dt;
            let pose = world.body_pose(p.body);
            if let Some((position, rotation)) = pose {
                scene.set_visual_transform(p.visual, position, rotation);
            }
            let expired = p.ttl <= 0.0;
            let escaped = pose.map_or(true, |(position, _)| out_of_bounds(position));
            if !(expired || escaped) {
                return true;
            }
            if !world.remove_body(p.body) {
                warn!(id = p.id.0, "projectile body already gone");
            }
            scene.dispose_visual(p.visual);
            debug!(id = p.id.0, expired, escaped, "projectile removed");
            false
        });
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn contains(&self, id: ProjectileId) -> bool {
        self.live.iter().any(|p| p.id == id)
    }

    pub fn ttl(&self, id: ProjectileId) -> Option<f32> {
        self.live.iter().find(|p| p.id == id).map(|p| p.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use glam::Quat;

    #[derive(Default)]
    struct RecordingScene {
        next: u32,
        live: Vec<VisualId>,
        moves: usize,
    }

    impl SceneGraph for RecordingScene {
        fn add_projectile_visual(&mut self, _position: Vec3, _radius: f32, _color: u32) -> VisualId {
            let id = VisualId(self.next);
            self.next += 1;
            self.live.push(id);
            id
        }

        fn set_visual_transform(&mut self, _id: VisualId, _position: Vec3, _rotation: Quat) {
            self.moves += 1;
        }

        fn dispose_visual(&mut self, id: VisualId) {
            self.live.retain(|v| *v != id);
        }

        fn render(&mut self, _camera: &Camera) {}
    }

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(&PhysicsConfig::default()).unwrap()
    }

    fn style() -> ProjectileStyle {
        ProjectileStyle { color: 0xffaa00 }
    }

    #[test]
    fn test_ttl_expiry_after_two_ticks() {
        let mut world = world();
        let mut scene = RecordingScene::default();
        let mut projectiles = ProjectileSystem::new();
        let id = projectiles.spawn(&mut world, &mut scene, Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, 0.12, 6.0, style());

        projectiles.tick(&mut world, &mut scene, 3.0);
        assert!(projectiles.contains(id));
        assert_eq!(projectiles.ttl(id), Some(3.0));

        projectiles.tick(&mut world, &mut scene, 3.0);
        assert!(!projectiles.contains(id));
        assert!(scene.live.is_empty());
        assert_eq!(world.body_count(), 0);

        projectiles.tick(&mut world, &mut scene, 3.0);
        assert!(projectiles.is_empty());
    }

    #[test]
    fn test_countdown_strictly_decreases() {
        let mut world = world();
        let mut scene = RecordingScene::default();
        let mut projectiles = ProjectileSystem::new();
        let id = projectiles.spawn(&mut world, &mut scene, Vec3::ZERO, Vec3::ZERO, 0.12, 1.0, style());
        let mut last = projectiles.ttl(id).unwrap();
        for _ in 0..5 {
            projectiles.tick(&mut world, &mut scene, 0.1);
            let ttl = projectiles.ttl(id).unwrap();
            assert!(ttl < last);
            last = ttl;
        }
        assert_eq!(scene.moves, 5);
    }

    #[test]
    fn test_out_of_bounds_is_culled() {
        let mut world = world();
        let mut scene = RecordingScene::default();
        let mut projectiles = ProjectileSystem::new();
        projectiles.spawn(&mut world, &mut scene, Vec3::new(600.0, 0.0, 0.0), Vec3::ZERO, 0.12, 6.0, style());
        projectiles.spawn(&mut world, &mut scene, Vec3::new(0.0, -60.0, 0.0), Vec3::ZERO, 0.12, 6.0, style());
        let kept = projectiles.spawn(&mut world, &mut scene, Vec3::new(0.0, 1.0, 499.0), Vec3::ZERO, 0.12, 6.0, style());

        projectiles.tick(&mut world, &mut scene, 0.016);
        assert_eq!(projectiles.len(), 1);
        assert!(projectiles.contains(kept));
        assert_eq!(scene.live.len(), 1);
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn test_spawn_from_camera_uses_muzzle_offset() {
        let mut world = world();
        let mut scene = RecordingScene::default();
        let mut projectiles = ProjectileSystem::new();
        let mut camera = Camera::new(800, 600);
        camera.eye = Vec3::new(1.0, 2.0, 3.0);
        let id = projectiles.spawn_from_camera(&mut world, &mut scene, &camera, &ShotConfig::default());

        projectiles.tick(&mut world, &mut scene, 0.0);
        assert!(projectiles.contains(id));
        let body = projectiles.live[0].body;
        let (position, _) = world.body_pose(body).unwrap();
        assert!((position - Vec3::new(1.0, 2.0, 2.2)).length() < 1e-5);
    }

    #[test]
    fn test_cooldown_uses_wall_clock() {
        let mut cooldown = ShootCooldown::new(SHOOT_COOLDOWN_S);
        assert!(cooldown.try_fire(10.0));
        assert!(!cooldown.try_fire(10.1));
        assert!(!cooldown.try_fire(10.249));
        assert!(cooldown.try_fire(10.25));
        assert!(!cooldown.try_fire(10.3));
        assert!(cooldown.try_fire(11.0));
    }
}
