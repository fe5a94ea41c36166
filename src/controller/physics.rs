use std::num::NonZeroUsize;

use glam::{Quat, Vec3};
use rapier3d::control::{CharacterAutostep, CharacterCollision, CharacterLength, KinematicCharacterController};
use rapier3d::prelude::*;
use tracing::{debug, info};

use crate::config::{Config, PhysicsConfig};
use crate::error::PhysicsError;
use crate::model::Camera;

pub(crate) fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

pub(crate) fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// Banks frame time and releases it in whole fixed steps.
///
/// At most `max_steps` are released per frame. Time beyond that stays in the
/// accumulator and is drained by later frames, so after a long stall the
/// simulation runs behind wall time until it catches up.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: f32,
    max_steps: u32,
    accumulator: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    pub steps: u32,
    /// The step cap stopped the loop with a full step still banked.
    pub capped: bool,
}

impl FixedStep {
    pub fn new(step: f32, max_steps: u32) -> Self {
        Self {
            step,
            max_steps,
            accumulator: 0.0,
        }
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Add `frame_dt` and run `on_step` once per released step.
    pub fn advance(&mut self, frame_dt: f32, mut on_step: impl FnMut(f32)) -> StepReport {
        if frame_dt.is_finite() && frame_dt > 0.0 {
            self.accumulator += frame_dt;
        }
        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            on_step(self.step);
            self.accumulator -= self.step;
            steps += 1;
        }
        StepReport {
            steps,
            capped: self.accumulator >= self.step,
        }
    }
}

/// Surface response of a collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub restitution: f32,
    pub friction: f32,
    pub density: f32,
}

/// Owns the rapier pipeline and every body/collider set.
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    queries: QueryPipeline,
}

impl PhysicsWorld {
    pub fn new(config: &PhysicsConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        let mut params = IntegrationParameters::default();
        params.dt = config.fixed_step();
        params.num_solver_iterations =
            NonZeroUsize::new(config.solver_iterations).ok_or(PhysicsError::NoSolverIterations)?;
        params.num_additional_friction_iterations = config.friction_iterations;
        params.normalized_prediction_distance = config.prediction_distance;

        Ok(Self {
            gravity: to_vector(config.gravity),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            queries: QueryPipeline::new(),
        })
    }

    pub fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.queries),
            &(),
            &(),
        );
    }

    /// Dynamic sphere with an initial velocity.
    pub fn spawn_ball(&mut self, origin: Vec3, velocity: Vec3, radius: f32, material: Material) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(origin))
            .linvel(to_vector(velocity))
            .linear_damping(0.05)
            .can_sleep(true)
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::ball(radius)
            .restitution(material.restitution)
            .friction(material.friction)
            .density(material.density)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Fixed box, e.g. floors and pressure plates.
    pub fn add_fixed_box(&mut self, position: Vec3, half_extents: Vec3, restitution: f32, friction: f32) -> RigidBodyHandle {
        let handle = self
            .bodies
            .insert(RigidBodyBuilder::fixed().translation(to_vector(position)).build());
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .restitution(restitution)
            .friction(friction)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Fixed triangle mesh in world space. `indices` is a flat triangle list.
    pub fn add_static_trimesh(&mut self, vertices: &[Vec3], indices: &[u32], restitution: f32) -> Result<RigidBodyHandle, PhysicsError> {
        let in_range = indices.iter().all(|i| (*i as usize) < vertices.len());
        if indices.is_empty() || indices.len() % 3 != 0 || !in_range {
            return Err(PhysicsError::InvalidMesh {
                vertices: vertices.len(),
                indices: indices.len(),
            });
        }
        let points: Vec<Point<Real>> = vertices.iter().map(|v| point![v.x, v.y, v.z]).collect();
        let triangles: Vec<[u32; 3]> = indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect();
        let handle = self.bodies.insert(RigidBodyBuilder::fixed().build());
        let collider = ColliderBuilder::trimesh(points, triangles).restitution(restitution).build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        debug!(triangles = indices.len() / 3, "added static trimesh");
        Ok(handle)
    }

    pub fn body_pose(&self, handle: RigidBodyHandle) -> Option<(Vec3, Quat)> {
        let body = self.bodies.get(handle)?;
        let r = body.rotation();
        Some((from_vector(body.translation()), Quat::from_xyzw(r.i, r.j, r.k, r.w)))
    }

    /// Remove a body and its colliders. Returns false for stale handles.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        self.bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }
}

/// Player capsule moved by the kinematic character controller.
struct PlayerCapsule {
    collider: ColliderHandle,
    controller: KinematicCharacterController,
    mass: f32,
    push_bodies: bool,
}

impl PlayerCapsule {
    fn new(world: &mut PhysicsWorld, config: &PhysicsConfig, center: Vec3) -> Self {
        let collider = ColliderBuilder::capsule_y(config.player_half_height, config.player_radius)
            .translation(to_vector(center))
            .build();
        let collider = world.colliders.insert(collider);

        let controller = KinematicCharacterController {
            offset: CharacterLength::Absolute(config.kcc_offset),
            max_slope_climb_angle: config.max_slope_climb_deg.to_radians(),
            min_slope_slide_angle: config.min_slope_slide_deg.to_radians(),
            autostep: Some(CharacterAutostep {
                max_height: CharacterLength::Absolute(config.autostep_max_height),
                min_width: CharacterLength::Absolute(config.autostep_min_width),
                include_dynamic_bodies: true,
            }),
            snap_to_ground: Some(CharacterLength::Absolute(config.snap_to_ground)),
            ..KinematicCharacterController::default()
        };

        Self {
            collider,
            controller,
            mass: config.character_mass,
            push_bodies: config.push_dynamic_bodies,
        }
    }

    /// Move by `desired`, corrected for collisions. Returns the new center.
    fn move_by(&self, world: &mut PhysicsWorld, desired: Vec3, dt: f32) -> Vec3 {
        let Some(collider) = world.colliders.get(self.collider) else {
            return Vec3::ZERO;
        };
        let shape = collider.shared_shape().clone();
        let position = *collider.position();
        let filter = QueryFilter::default().exclude_collider(self.collider);

        let mut collisions: Vec<CharacterCollision> = Vec::new();
        let movement = self.controller.move_shape(
            dt,
            &world.bodies,
            &world.colliders,
            &world.queries,
            &*shape,
            &position,
            to_vector(desired),
            filter,
            |collision| collisions.push(collision),
        );

        if self.push_bodies && !collisions.is_empty() {
            self.controller.solve_character_collision_impulses(
                dt,
                &mut world.bodies,
                &world.colliders,
                &world.queries,
                &*shape,
                self.mass,
                &collisions[..],
                filter,
            );
        }

        let center = position.translation.vector + movement.translation;
        if let Some(collider) = world.colliders.get_mut(self.collider) {
            collider.set_translation(center);
        }
        from_vector(&center)
    }

    fn center(&self, world: &PhysicsWorld) -> Vec3 {
        world
            .colliders
            .get(self.collider)
            .map(|c| from_vector(&c.position().translation.vector))
            .unwrap_or(Vec3::ZERO)
    }
}

/// Fixed-step driver: player fly movement plus the dynamic world.
pub struct PhysicsSystem {
    world: PhysicsWorld,
    player: PlayerCapsule,
    clock: FixedStep,
    move_speed: f32,
    eye_offset: f32,
}

impl PhysicsSystem {
    /// Build the world with the player capsule under `eye`.
    pub fn new(config: &Config, eye: Vec3) -> Result<Self, PhysicsError> {
        if !config.enable_physics {
            return Err(PhysicsError::Disabled);
        }
        let physics = &config.physics;
        let mut world = PhysicsWorld::new(physics)?;
        let player = PlayerCapsule::new(&mut world, physics, eye - Vec3::Y * physics.eye_offset);
        info!(
            fixed_fps = physics.fixed_fps,
            max_steps = physics.max_steps_per_frame,
            "physics initialized"
        );
        Ok(Self {
            world,
            player,
            clock: FixedStep::new(physics.fixed_step(), physics.max_steps_per_frame),
            move_speed: config.move_speed,
            eye_offset: physics.eye_offset,
        })
    }

    /// Advance by one rendered frame. `direction` is the unit movement intent;
    /// the camera eye follows the capsule afterwards.
    pub fn advance(&mut self, frame_dt: f32, direction: Vec3, camera: &mut Camera) -> StepReport {
        let world = &mut self.world;
        let player = &self.player;
        let speed = self.move_speed;
        let report = self.clock.advance(frame_dt, |step| {
            if direction != Vec3::ZERO {
                player.move_by(world, direction * speed * step, step);
            }
            world.step();
        });
        if report.capped {
            debug!(backlog = self.clock.accumulator(), "physics step cap reached");
        }
        camera.eye = self.player_position() + Vec3::Y * self.eye_offset;
        report
    }

    pub fn player_position(&self) -> Vec3 {
        self.player.center(&self.world)
    }

    /// Fly mode has no ground contact.
    pub fn is_grounded(&self) -> bool {
        false
    }

    pub fn accumulator(&self) -> f32 {
        self.clock.accumulator()
    }

    pub fn fixed_step(&self) -> f32 {
        self.clock.step()
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }
}
