use std::collections::VecDeque;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, AudioManager};
use crate::config::Config;
use crate::controller::chat::ChatOverlay;
use crate::controller::input::{movement_intent, InputEvent, InputState, KeyAction, MovementIntent};
use crate::controller::interaction::{InteractionTracker, ATTENTION_SOUND, ATTENTION_VOLUME};
use crate::controller::joystick::VirtualJoystick;
use crate::controller::look::{LockError, LockFailure, LockRequest, LookController, LookMode, ScreenRect, TouchPoint};
use crate::controller::physics::PhysicsSystem;
use crate::controller::projectile::{ProjectileSystem, ShootCooldown};
use crate::error::PhysicsError;
use crate::events::{AppEvent, EventBus};
use crate::model::{character, Camera, CharacterRoster};
use crate::persistence::{load_mute, save_mute, KeyValueStore};
use crate::view::SceneGraph;

pub const DEFAULT_LEVEL: &str = "default";

/// What happened during one `update`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    pub dt: f32,
    pub steps: u32,
    pub capped: bool,
    pub shot: bool,
}

/// Owns every subsystem and runs them in frame order.
pub struct FrameLoopContext<S: SceneGraph, A: AudioBackend> {
    pub config: Config,
    pub camera: Camera,
    pub input: InputState,
    pub look: LookController,
    pub joystick: VirtualJoystick,
    pub physics: Option<PhysicsSystem>,
    pub projectiles: ProjectileSystem,
    pub roster: CharacterRoster,
    pub interaction: InteractionTracker,
    pub chat: ChatOverlay,
    pub audio: AudioManager<A>,
    pub events: EventBus<AppEvent>,
    pub scene: S,
    cooldown: ShootCooldown,
    store: Box<dyn KeyValueStore>,
    ui_visible: bool,
    /// Chat released an engaged look; it is taken back once chat closes.
    reengage_after_chat: bool,
    last_time: Option<f64>,
}

impl<S: SceneGraph, A: AudioBackend> FrameLoopContext<S, A> {
    pub fn new(config: Config, scene: S, store: Box<dyn KeyValueStore>, mode: LookMode) -> Self {
        let mut camera = Camera::new(800, 600);
        camera.eye = config.start_pose.eye;
        camera.yaw = config.start_pose.yaw;
        camera.pitch = config.start_pose.pitch;

        let physics = match PhysicsSystem::new(&config, camera.eye) {
            Ok(physics) => Some(physics),
            Err(PhysicsError::Disabled) => {
                info!("physics disabled, using free camera movement");
                None
            }
            Err(e) => {
                warn!("physics unavailable, using free camera movement: {e}");
                None
            }
        };

        let mut roster = CharacterRoster::new();
        roster.register_level(DEFAULT_LEVEL, character::default_level());

        let muted = load_mute(store.as_ref());
        Self {
            input: InputState::default(),
            look: LookController::new(mode, config.look.clone()),
            joystick: VirtualJoystick::new(config.joystick.clone()),
            physics,
            projectiles: ProjectileSystem::new(),
            roster,
            interaction: InteractionTracker::new(),
            chat: ChatOverlay::new(),
            audio: AudioManager::new(muted),
            events: EventBus::new(),
            scene,
            cooldown: ShootCooldown::new(config.shot.cooldown_s),
            store,
            ui_visible: true,
            reengage_after_chat: false,
            last_time: None,
            camera,
            config,
        }
    }

    /// One frame. `now` is wall-clock seconds.
    pub fn update(&mut self, now: f64) -> FrameReport {
        let dt = match self.last_time.replace(now) {
            Some(last) => ((now - last) as f32).clamp(0.0, self.config.max_frame_dt),
            None => 0.0,
        };
        let mut report = FrameReport { dt, ..FrameReport::default() };

        let intent = if self.look.is_locked() {
            movement_intent(&self.camera, &mut self.input, Some(&self.joystick), self.config.joystick.sensitivity)
        } else {
            MovementIntent {
                jump: self.input.consume_trigger(),
                ..MovementIntent::IDLE
            }
        };

        match self.physics.as_mut() {
            Some(physics) => {
                let steps = physics.advance(dt, intent.direction, &mut self.camera);
                report.steps = steps.steps;
                report.capped = steps.capped;
            }
            None => self.camera.eye += intent.direction * self.config.move_speed * dt,
        }

        if intent.jump {
            if let Some(physics) = self.physics.as_mut() {
                if self.cooldown.try_fire(now) {
                    self.projectiles
                        .spawn_from_camera(physics.world_mut(), &mut self.scene, &self.camera, &self.config.shot);
                    report.shot = true;
                }
            }
        }

        if let Some(physics) = self.physics.as_mut() {
            self.projectiles.tick(physics.world_mut(), &mut self.scene, dt);
        }

        self.joystick.tick_return();
        self.roster.update(dt);
        let mut out = Vec::new();
        self.interaction
            .update(&mut self.roster, self.camera.eye, self.look.is_locked(), now, &mut out);
        self.publish(out);

        self.scene.render(&self.camera);
        report
    }

    /// Keyboard, vertical buttons, focus changes.
    pub fn handle_input(&mut self, event: &InputEvent) -> KeyAction {
        let action = self.input.process_event(event);
        let mut out = Vec::new();
        match action {
            KeyAction::Interact => {
                self.interaction.try_interact(&mut out);
            }
            KeyAction::ToggleUi => self.toggle_ui(),
            KeyAction::Escape => self.close_chat(),
            _ => {}
        }
        self.publish(out);
        action
    }

    pub fn spawn_level(&mut self, level: &str) -> Vec<String> {
        for (id, _) in self.roster.iter() {
            self.interaction.forget(id);
            self.chat.forget(id);
        }
        self.roster.spawn_level(level)
    }

    /// Tap on the interaction hint.
    pub fn interact(&mut self) {
        let mut out = Vec::new();
        self.interaction.try_interact(&mut out);
        self.publish(out);
    }

    pub fn send_chat(&mut self, message: &str) -> Option<String> {
        self.chat.send(message)
    }

    pub fn close_chat(&mut self) {
        if self.chat.close() {
            self.input.set_chat_open(false);
            self.publish(vec![AppEvent::ChatClosed]);
            // touch look needs no platform gesture, pointer lock waits for one
            if self.reengage_after_chat && self.look.mode() == LookMode::Touch {
                self.request_lock();
            }
        }
    }

    /// Next click after chat closed. Re-requests look if chat released it;
    /// `None` when there is nothing to take back.
    pub fn take_reengage(&mut self) -> Option<LockRequest> {
        if !self.reengage_after_chat || self.chat.is_open() || self.look.is_locked() {
            return None;
        }
        Some(self.request_lock())
    }

    pub fn toggle_ui(&mut self) {
        self.ui_visible = !self.ui_visible;
        self.publish(vec![AppEvent::UiVisibilityChanged { visible: self.ui_visible }]);
    }

    pub fn ui_visible(&self) -> bool {
        self.ui_visible
    }

    /// Flip mute, persist it, and apply it to running loops.
    pub fn set_muted(&mut self, muted: bool) {
        self.audio.set_muted(muted);
        save_mute(self.store.as_mut(), muted);
        self.publish(vec![AppEvent::MuteChanged { muted }]);
    }

    pub fn toggle_mute(&mut self) -> bool {
        let muted = !self.audio.is_muted();
        self.set_muted(muted);
        muted
    }

    /// Hand over the audio backend after a user gesture. Returns whether this
    /// call did the initialization.
    pub fn init_audio(&mut self, backend: A) -> bool {
        if !self.config.enable_audio || !self.audio.initialize(backend) {
            return false;
        }
        self.publish(vec![AppEvent::AudioInitialized]);
        true
    }

    /// Start the ambience loop once its sound is decoded.
    pub fn start_ambience(&mut self) {
        let ambience = &self.config.ambience;
        if let Err(e) = self.audio.start_ambience(&ambience.name, ambience.volume) {
            warn!("ambience not started: {e}");
        }
    }

    pub fn request_lock(&mut self) -> LockRequest {
        self.reengage_after_chat = false;
        let request = self.look.lock();
        self.sync_look();
        request
    }

    pub fn retry_lock(&mut self) -> LockRequest {
        let request = self.look.retry_lock();
        self.sync_look();
        request
    }

    pub fn lock_rejected(&mut self, error: LockError) -> LockFailure {
        self.look.on_lock_rejected(error)
    }

    pub fn pointer_lock_changed(&mut self, locked_to_canvas: bool) {
        self.look.on_pointer_lock_change(locked_to_canvas);
        self.sync_look();
    }

    /// Returns true when the platform must exit pointer lock.
    pub fn release_lock(&mut self) -> bool {
        self.reengage_after_chat = false;
        let exit = self.look.unlock();
        self.sync_look();
        exit
    }

    pub fn mouse_moved(&mut self, dx: f32, dy: f32) -> bool {
        self.look.on_mouse_move(&mut self.camera, dx, dy)
    }

    pub fn touch_started(&mut self, touches: &[TouchPoint], reserved: &[ScreenRect]) -> bool {
        self.look.on_touch_start(touches, reserved)
    }

    pub fn touch_moved(&mut self, touches: &[TouchPoint], reserved: &[ScreenRect]) -> bool {
        self.look.on_touch_move(&mut self.camera, touches, reserved)
    }

    pub fn touch_ended(&mut self, ended: &[i32]) {
        self.look.on_touch_end(ended);
    }

    fn sync_look(&mut self) {
        let notifications = self.look.drain_notifications();
        self.publish(notifications);
    }

    /// Deliver events to subscribers after the core has reacted to them.
    /// Reactions may raise more events; those are delivered in turn.
    fn publish(&mut self, events: Vec<AppEvent>) {
        let mut queue = VecDeque::from(events);
        while let Some(event) = queue.pop_front() {
            let follow_up = self.react(&event);
            self.events.emit(event);
            queue.extend(follow_up);
        }
    }

    fn react(&mut self, event: &AppEvent) -> Vec<AppEvent> {
        match event {
            AppEvent::CharacterAttention { character_id } => {
                if let Err(e) = self.audio.play_one_shot(ATTENTION_SOUND, ATTENTION_VOLUME, 1.0) {
                    debug!(character_id = %character_id, "attention sound skipped: {e}");
                }
                Vec::new()
            }
            AppEvent::StartChat { character_id } => self.open_chat(character_id),
            _ => Vec::new(),
        }
    }

    fn open_chat(&mut self, id: &str) -> Vec<AppEvent> {
        let Some(character) = self.roster.get(id) else {
            warn!("chat requested for unknown character {id}");
            return Vec::new();
        };
        let name = character.def.name.clone();
        let transcript = self.chat.open(id, character);
        self.input.set_chat_open(true);
        self.reengage_after_chat = self.look.is_locked();
        self.look.unlock();

        let mut out = vec![AppEvent::ChatOpened {
            character_id: id.to_string(),
            name,
            transcript,
        }];
        out.extend(self.look.drain_notifications());
        out
    }

    /// Static collision from the environment mesh, given in mesh-local space.
    /// Returns false when physics is off.
    pub fn add_environment_mesh(&mut self, vertices: &[Vec3], indices: &[u32]) -> Result<bool, PhysicsError> {
        let Some(physics) = self.physics.as_mut() else {
            return Ok(false);
        };
        let env = &self.config.env;
        let transform = env.collision_transform(&self.config.splat);
        let world: Vec<Vec3> = vertices.iter().map(|v| transform.transform_point3(*v)).collect();
        physics.world_mut().add_static_trimesh(&world, indices, env.restitution)?;
        info!(triangles = indices.len() / 3, "environment collision ready");
        Ok(true)
    }

    pub fn player_position(&self) -> Vec3 {
        match &self.physics {
            Some(physics) => physics.player_position(),
            None => self.camera.eye,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SilentBackend;
    use crate::model::ModelState;
    use crate::persistence::MemoryStore;
    use crate::view::TracingScene;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Ctx = FrameLoopContext<TracingScene, SilentBackend>;

    fn config_at_origin() -> Config {
        let mut config = Config::default();
        config.start_pose.eye = Vec3::new(0.0, 1.0, 0.0);
        config.start_pose.yaw = 0.0;
        config.start_pose.pitch = 0.0;
        config
    }

    fn context(config: Config) -> Ctx {
        FrameLoopContext::new(config, TracingScene::new(), Box::new(MemoryStore::new()), LookMode::Desktop)
    }

    fn locked(mut ctx: Ctx) -> Ctx {
        assert_eq!(ctx.request_lock(), LockRequest::RequestPointerLock);
        ctx.pointer_lock_changed(true);
        assert!(ctx.look.is_locked());
        ctx
    }

    fn key(ctx: &mut Ctx, code: &str) -> KeyAction {
        ctx.handle_input(&InputEvent::KeyDown {
            code: code.to_string(),
            ctrl: false,
        })
    }

    fn record(ctx: &mut Ctx) -> Rc<RefCell<Vec<AppEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ctx.events.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        seen
    }

    #[test]
    fn test_forward_frame_moves_camera() {
        let mut ctx = locked(context(config_at_origin()));
        key(&mut ctx, "KeyW");

        ctx.update(10.0);
        let report = ctx.update(10.02);
        assert_eq!(report.steps, 1);
        assert!((ctx.camera.eye.z + 0.108_333).abs() < 1e-3, "eye {:?}", ctx.camera.eye);
    }

    #[test]
    fn test_no_movement_while_unlocked() {
        let mut ctx = context(config_at_origin());
        key(&mut ctx, "KeyW");
        ctx.update(0.0);
        ctx.update(0.03);
        assert!((ctx.camera.eye - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_frame_dt_is_clamped() {
        let mut ctx = context(config_at_origin());
        assert_eq!(ctx.update(1.0).dt, 0.0);
        let report = ctx.update(6.0);
        assert!((report.dt - 1.0 / 30.0).abs() < 1e-6);
        assert!(report.steps >= 1 && report.steps <= 2);
    }

    #[test]
    fn test_shooting_respects_cooldown() {
        let mut ctx = locked(context(config_at_origin()));
        ctx.update(0.0);

        key(&mut ctx, "Space");
        assert!(ctx.update(1.0).shot);
        ctx.handle_input(&InputEvent::KeyUp { code: "Space".into() });
        key(&mut ctx, "Space");
        assert!(!ctx.update(1.1).shot);
        ctx.handle_input(&InputEvent::KeyUp { code: "Space".into() });
        key(&mut ctx, "Space");
        assert!(ctx.update(1.3).shot);

        assert_eq!(ctx.projectiles.len(), 2);
        assert_eq!(ctx.scene.live_visuals(), 2);
    }

    #[test]
    fn test_free_fly_without_physics() {
        let mut config = config_at_origin();
        config.enable_physics = false;
        let mut ctx = locked(context(config));
        assert!(ctx.physics.is_none());

        key(&mut ctx, "KeyW");
        key(&mut ctx, "Space");
        ctx.update(0.0);
        let report = ctx.update(0.02);
        assert!(!report.shot);
        assert!((ctx.camera.eye.z + 6.5 * 0.02).abs() < 1e-5);
    }

    #[test]
    fn test_talking_to_a_character_opens_chat() {
        let mut config = config_at_origin();
        config.enable_physics = false;
        let mut ctx = locked(context(config));
        let ids = ctx.spawn_level(DEFAULT_LEVEL);
        assert_eq!(ids.len(), 2);
        ctx.roster.set_model_state("character_1", ModelState::Loaded);
        let target = ctx.roster.get("character_1").unwrap().def.position;
        ctx.camera.eye = target + Vec3::new(1.0, 0.0, 0.0);
        let seen = record(&mut ctx);

        ctx.update(0.0);
        assert!(ctx.interaction.has_character_in_range());

        assert_eq!(key(&mut ctx, "KeyT"), KeyAction::Interact);
        assert!(ctx.chat.is_open());
        assert!(!ctx.look.is_locked());
        assert!(ctx.input.ui_owns_keyboard());
        {
            let seen = seen.borrow();
            assert!(seen.iter().any(|e| matches!(e, AppEvent::ChatOpened { transcript, .. } if transcript.len() == 1)));
            assert!(seen.contains(&AppEvent::LookDisengaged));
        }

        assert_eq!(key(&mut ctx, "Space"), KeyAction::PassThrough);
        assert_eq!(key(&mut ctx, "Escape"), KeyAction::Escape);
        assert!(!ctx.chat.is_open());
        assert_eq!(seen.borrow().last(), Some(&AppEvent::ChatClosed));
    }

    #[test]
    fn test_mute_is_persisted() {
        let mut ctx = context(config_at_origin());
        let seen = record(&mut ctx);
        ctx.set_muted(true);
        assert!(ctx.audio.is_muted());
        assert!(load_mute(ctx.store.as_ref()));
        assert_eq!(*seen.borrow(), vec![AppEvent::MuteChanged { muted: true }]);
    }

    #[test]
    fn test_audio_initializes_once() {
        let mut ctx = context(config_at_origin());
        let seen = record(&mut ctx);
        assert!(ctx.init_audio(SilentBackend));
        assert!(!ctx.init_audio(SilentBackend));
        assert_eq!(*seen.borrow(), vec![AppEvent::AudioInitialized]);
    }

    #[test]
    fn test_ctrl_h_toggles_ui() {
        let mut ctx = context(config_at_origin());
        ctx.handle_input(&InputEvent::KeyDown {
            code: "KeyH".into(),
            ctrl: true,
        });
        assert!(!ctx.ui_visible());
    }

    /// Free-flying context in `mode`, standing next to a loaded character.
    fn beside_character(mode: LookMode) -> Ctx {
        let mut config = config_at_origin();
        config.enable_physics = false;
        let mut ctx = FrameLoopContext::new(config, TracingScene::new(), Box::new(MemoryStore::new()), mode);
        ctx.spawn_level(DEFAULT_LEVEL);
        ctx.roster.set_model_state("character_1", ModelState::Loaded);
        let target = ctx.roster.get("character_1").unwrap().def.position;
        ctx.camera.eye = target + Vec3::new(1.0, 0.0, 0.0);
        ctx
    }

    #[test]
    fn test_touch_look_returns_when_chat_closes() {
        let mut ctx = beside_character(LookMode::Touch);
        assert_eq!(ctx.request_lock(), LockRequest::Engaged);
        ctx.update(0.0);
        ctx.interact();
        assert!(ctx.chat.is_open());
        assert!(!ctx.look.is_locked());

        ctx.close_chat();
        assert!(ctx.look.is_locked());

        key(&mut ctx, "KeyW");
        let before = ctx.camera.eye;
        ctx.update(0.02);
        assert!((ctx.camera.eye - before).length() > 0.1, "eye {:?}", ctx.camera.eye);
    }

    #[test]
    fn test_pointer_lock_waits_for_click_after_chat() {
        let mut ctx = locked(beside_character(LookMode::Desktop));
        ctx.update(0.0);
        assert_eq!(key(&mut ctx, "KeyT"), KeyAction::Interact);
        assert_eq!(ctx.take_reengage(), None);

        assert_eq!(key(&mut ctx, "Escape"), KeyAction::Escape);
        assert!(!ctx.look.is_locked());
        assert_eq!(ctx.take_reengage(), Some(LockRequest::RequestPointerLock));
        ctx.pointer_lock_changed(true);
        assert!(ctx.look.is_locked());

        // only once per chat
        ctx.release_lock();
        assert_eq!(ctx.take_reengage(), None);

        // an explicit unlock after chat cancels the pending re-lock
        ctx = locked(ctx);
        ctx.interact();
        assert!(ctx.chat.is_open());
        ctx.close_chat();
        ctx.release_lock();
        assert_eq!(ctx.take_reengage(), None);
    }

    #[test]
    fn test_environment_mesh_is_placed_in_splat_space() {
        let vertices = [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ];
        let indices = [0, 1, 2, 0, 2, 3];

        let mut ctx = context(config_at_origin());
        let colliders = ctx.physics.as_ref().unwrap().world().collider_count();
        assert_eq!(ctx.add_environment_mesh(&vertices, &indices), Ok(true));
        assert_eq!(ctx.physics.as_ref().unwrap().world().collider_count(), colliders + 1);
        assert!(matches!(
            ctx.add_environment_mesh(&vertices, &[0, 1, 9]),
            Err(PhysicsError::InvalidMesh { .. })
        ));

        let mut config = config_at_origin();
        config.enable_physics = false;
        let mut ctx = context(config);
        assert_eq!(ctx.add_environment_mesh(&vertices, &indices), Ok(false));
    }
}
