//! Camera look: desktop pointer lock and multi-touch drag.
//!
//! The controller never talks to the platform directly. It answers with what
//! the platform should do (request pointer lock, retry later, prevent the
//! default touch action) and queues engaged/disengaged notifications for the
//! frame loop to publish.

use std::collections::HashMap;

use glam::Vec2;
use tracing::{debug, info};

use crate::config::LookConfig;
use crate::events::AppEvent;
use crate::model::Camera;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookMode {
    Desktop,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked(LookMode),
}

/// Answer to [`LookController::lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRequest {
    /// Platform must call `requestPointerLock` and report back.
    RequestPointerLock,
    /// Look is engaged immediately (touch mode).
    Engaged,
    /// Controller disabled; nothing to do.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// Re-lock attempted too soon after leaving lock.
    Security,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFailure {
    /// Call [`LookController::retry_lock`] after this many milliseconds.
    RetryAfter(u32),
    TornDown,
}

/// Axis-aligned screen rectangle in client pixels, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl ScreenRect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: i32,
    pub x: f32,
    pub y: f32,
}

impl TouchPoint {
    pub fn new(id: i32, x: f32, y: f32) -> Self {
        Self { id, x, y }
    }

    fn in_any(&self, regions: &[ScreenRect]) -> bool {
        regions.iter().any(|r| r.contains(self.x, self.y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchRole {
    CameraLook,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEntry {
    pub role: TouchRole,
    pub start: Vec2,
    pub last: Vec2,
}

/// Live touches by identifier. At most one holds [`TouchRole::CameraLook`].
#[derive(Debug, Default)]
pub struct TouchRegistry {
    entries: HashMap<i32, TouchEntry>,
    camera_touch: Option<i32>,
}

impl TouchRegistry {
    /// Register touches not seen before. The first one outside every reserved
    /// region claims camera look if the role is free. Returns whether a touch
    /// claimed it.
    pub fn begin(&mut self, touches: &[TouchPoint], reserved: &[ScreenRect]) -> bool {
        let mut claimed = false;
        for touch in touches {
            if self.entries.contains_key(&touch.id) {
                continue;
            }
            let pos = Vec2::new(touch.x, touch.y);
            let role = if self.camera_touch.is_none() && !touch.in_any(reserved) {
                self.camera_touch = Some(touch.id);
                claimed = true;
                TouchRole::CameraLook
            } else {
                TouchRole::Ignored
            };
            self.entries.insert(touch.id, TouchEntry { role, start: pos, last: pos });
        }
        claimed
    }

    /// Delta of the camera touch since its last position, if it moved. The
    /// role is released when the touch slides into a reserved region.
    pub fn moved(&mut self, touches: &[TouchPoint], reserved: &[ScreenRect]) -> Option<Vec2> {
        let id = self.camera_touch?;
        let touch = touches.iter().find(|t| t.id == id)?;
        if touch.in_any(reserved) {
            debug!(touch = id, "camera touch entered a reserved region");
            self.end(id);
            return None;
        }
        let entry = self.entries.get_mut(&id)?;
        let pos = Vec2::new(touch.x, touch.y);
        let delta = pos - entry.last;
        entry.last = pos;
        Some(delta)
    }

    pub fn end(&mut self, id: i32) {
        if self.camera_touch == Some(id) {
            self.camera_touch = None;
        }
        self.entries.remove(&id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.camera_touch = None;
    }

    pub fn camera_touch(&self) -> Option<i32> {
        self.camera_touch
    }

    pub fn get(&self, id: i32) -> Option<&TouchEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct LookController {
    mode: LookMode,
    state: LockState,
    enabled: bool,
    /// Desktop pointer-lock listeners are armed.
    listening: bool,
    retry_used: bool,
    touches: TouchRegistry,
    config: LookConfig,
    outbox: Vec<AppEvent>,
}

impl LookController {
    pub fn new(mode: LookMode, config: LookConfig) -> Self {
        Self {
            mode,
            state: LockState::Unlocked,
            enabled: true,
            listening: false,
            retry_used: false,
            touches: TouchRegistry::default(),
            config,
            outbox: Vec::new(),
        }
    }

    pub fn mode(&self) -> LookMode {
        self.mode
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, LockState::Locked(_))
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn touches(&self) -> &TouchRegistry {
        &self.touches
    }

    /// User asked for look control (click on canvas, start button).
    pub fn lock(&mut self) -> LockRequest {
        self.retry_used = false;
        self.begin_lock()
    }

    /// Second attempt after a [`LockFailure::RetryAfter`].
    pub fn retry_lock(&mut self) -> LockRequest {
        if self.is_locked() {
            return LockRequest::Ignored;
        }
        self.begin_lock()
    }

    fn begin_lock(&mut self) -> LockRequest {
        if !self.enabled {
            return LockRequest::Ignored;
        }
        match self.mode {
            LookMode::Touch => {
                self.touches.clear();
                self.state = LockState::Locked(LookMode::Touch);
                self.outbox.push(AppEvent::LookEngaged);
                LockRequest::Engaged
            }
            LookMode::Desktop => {
                self.listening = true;
                LockRequest::RequestPointerLock
            }
        }
    }

    /// Leave look mode. Returns true when the platform must exit pointer lock.
    pub fn unlock(&mut self) -> bool {
        let was_locked = self.is_locked();
        self.touches.clear();
        self.listening = false;
        self.state = LockState::Unlocked;
        if was_locked {
            self.outbox.push(AppEvent::LookDisengaged);
        }
        self.mode == LookMode::Desktop
    }

    /// Platform `pointerlockchange`.
    pub fn on_pointer_lock_change(&mut self, locked_to_canvas: bool) {
        if self.mode != LookMode::Desktop || !self.listening {
            return;
        }
        if locked_to_canvas {
            self.retry_used = false;
            if !self.is_locked() {
                self.state = LockState::Locked(LookMode::Desktop);
                info!("pointer lock engaged");
                self.outbox.push(AppEvent::LookEngaged);
            }
        } else {
            self.listening = false;
            if self.is_locked() {
                self.state = LockState::Unlocked;
                info!("pointer lock released");
                self.outbox.push(AppEvent::LookDisengaged);
            }
        }
    }

    /// `requestPointerLock` was rejected. A security rejection gets one retry;
    /// anything else quietly tears down without an unlock notification.
    pub fn on_lock_rejected(&mut self, error: LockError) -> LockFailure {
        let can_retry = error == LockError::Security && !self.is_locked() && self.enabled && !self.retry_used;
        if can_retry {
            self.retry_used = true;
            debug!("pointer lock refused by security policy, retrying");
            return LockFailure::RetryAfter(self.config.relock_retry_ms);
        }
        self.listening = false;
        LockFailure::TornDown
    }

    /// Platform `pointerlockerror`.
    pub fn on_pointer_lock_error(&mut self) {
        self.listening = false;
    }

    /// Relative mouse movement. Returns whether the camera rotated.
    pub fn on_mouse_move(&mut self, camera: &mut Camera, dx: f32, dy: f32) -> bool {
        if !self.enabled || self.state != LockState::Locked(LookMode::Desktop) {
            return false;
        }
        camera.apply_look_delta(dx, dy, self.config.mouse_sensitivity);
        true
    }

    /// Returns true when a touch claimed camera look (platform should
    /// prevent the default action).
    pub fn on_touch_start(&mut self, touches: &[TouchPoint], reserved: &[ScreenRect]) -> bool {
        if !self.touch_active() {
            return false;
        }
        self.touches.begin(touches, reserved)
    }

    pub fn on_touch_move(&mut self, camera: &mut Camera, touches: &[TouchPoint], reserved: &[ScreenRect]) -> bool {
        if !self.touch_active() {
            return false;
        }
        match self.touches.moved(touches, reserved) {
            Some(delta) => {
                camera.apply_look_delta(delta.x, delta.y, self.config.touch_sensitivity);
                true
            }
            None => false,
        }
    }

    /// Touch end or cancel for the listed identifiers.
    pub fn on_touch_end(&mut self, ended: &[i32]) {
        for id in ended {
            self.touches.end(*id);
        }
    }

    fn touch_active(&self) -> bool {
        self.enabled && self.state == LockState::Locked(LookMode::Touch)
    }

    pub fn drain_notifications(&mut self) -> Vec<AppEvent> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn joystick_region() -> Vec<ScreenRect> {
        vec![
            ScreenRect::new(20.0, 500.0, 140.0, 620.0),
            ScreenRect::new(700.0, 500.0, 760.0, 560.0),
        ]
    }

    fn touch_controller() -> LookController {
        let mut look = LookController::new(LookMode::Touch, LookConfig::default());
        assert_eq!(look.lock(), LockRequest::Engaged);
        look
    }

    #[test]
    fn test_touch_in_joystick_does_not_claim() {
        let mut look = touch_controller();
        let reserved = joystick_region();

        assert!(!look.on_touch_start(&[TouchPoint::new(1, 80.0, 560.0)], &reserved));
        assert_eq!(look.touches().camera_touch(), None);

        let both = [TouchPoint::new(1, 80.0, 560.0), TouchPoint::new(2, 400.0, 300.0)];
        assert!(look.on_touch_start(&both, &reserved));
        assert_eq!(look.touches().camera_touch(), Some(2));
        assert_eq!(look.touches().get(1).unwrap().role, TouchRole::Ignored);
    }

    #[test]
    fn test_single_camera_touch_and_reclaim() {
        let mut look = touch_controller();
        let reserved = joystick_region();

        look.on_touch_start(&[TouchPoint::new(1, 300.0, 300.0)], &reserved);
        look.on_touch_start(&[TouchPoint::new(1, 300.0, 300.0), TouchPoint::new(2, 400.0, 300.0)], &reserved);
        assert_eq!(look.touches().camera_touch(), Some(1));

        look.on_touch_end(&[1]);
        assert_eq!(look.touches().camera_touch(), None);
        // touch 2 was already down; only a later touch may claim
        look.on_touch_start(&[TouchPoint::new(2, 400.0, 300.0)], &reserved);
        assert_eq!(look.touches().camera_touch(), None);
        look.on_touch_start(&[TouchPoint::new(3, 420.0, 200.0)], &reserved);
        assert_eq!(look.touches().camera_touch(), Some(3));
    }

    #[test]
    fn test_touch_move_uses_last_position() {
        let mut look = touch_controller();
        let mut cam = Camera::new(800, 600);
        look.on_touch_start(&[TouchPoint::new(7, 300.0, 300.0)], &[]);

        assert!(look.on_touch_move(&mut cam, &[TouchPoint::new(7, 310.0, 300.0)], &[]));
        assert!((cam.yaw + 0.05).abs() < 1e-6);
        assert!(look.on_touch_move(&mut cam, &[TouchPoint::new(7, 320.0, 300.0)], &[]));
        assert!((cam.yaw + 0.10).abs() < 1e-6);
        assert_eq!(look.touches().get(7).unwrap().start, Vec2::new(300.0, 300.0));
    }

    #[test]
    fn test_sliding_into_reserved_region_releases() {
        let mut look = touch_controller();
        let reserved = joystick_region();
        let mut cam = Camera::new(800, 600);
        look.on_touch_start(&[TouchPoint::new(4, 300.0, 500.0)], &reserved);

        assert!(!look.on_touch_move(&mut cam, &[TouchPoint::new(4, 100.0, 550.0)], &reserved));
        assert_eq!(look.touches().camera_touch(), None);
        assert_eq!(cam.yaw, 0.0);

        assert!(look.on_touch_start(&[TouchPoint::new(5, 300.0, 300.0)], &reserved));
        assert_eq!(look.touches().camera_touch(), Some(5));
    }

    #[test]
    fn test_pitch_stays_clamped_under_any_deltas() {
        let mut look = LookController::new(LookMode::Desktop, LookConfig::default());
        assert_eq!(look.lock(), LockRequest::RequestPointerLock);
        look.on_pointer_lock_change(true);
        let mut cam = Camera::new(800, 600);
        for (i, dy) in [-5000.0, 120.0, 9000.0, -3.0, -40000.0, 77.0].iter().enumerate() {
            look.on_mouse_move(&mut cam, i as f32 * 13.0, *dy);
            assert!(cam.pitch >= -FRAC_PI_2 && cam.pitch <= FRAC_PI_2);
        }
    }

    #[test]
    fn test_mouse_ignored_until_locked() {
        let mut look = LookController::new(LookMode::Desktop, LookConfig::default());
        let mut cam = Camera::new(800, 600);
        look.lock();
        assert!(!look.on_mouse_move(&mut cam, 10.0, 0.0));
        look.on_pointer_lock_change(true);
        assert!(look.on_mouse_move(&mut cam, 10.0, 0.0));
        assert!((cam.yaw + 0.02).abs() < 1e-6);
        assert_eq!(look.drain_notifications(), vec![AppEvent::LookEngaged]);
    }

    #[test]
    fn test_security_error_retries_once() {
        let mut look = LookController::new(LookMode::Desktop, LookConfig::default());
        look.lock();
        assert_eq!(look.on_lock_rejected(LockError::Security), LockFailure::RetryAfter(100));
        assert_eq!(look.retry_lock(), LockRequest::RequestPointerLock);
        assert_eq!(look.on_lock_rejected(LockError::Security), LockFailure::TornDown);
        assert!(look.drain_notifications().is_empty());

        // a fresh user request gets its own retry
        look.lock();
        assert_eq!(look.on_lock_rejected(LockError::Security), LockFailure::RetryAfter(100));
    }

    #[test]
    fn test_other_rejection_tears_down_silently() {
        let mut look = LookController::new(LookMode::Desktop, LookConfig::default());
        look.lock();
        assert_eq!(look.on_lock_rejected(LockError::Other), LockFailure::TornDown);
        // listeners gone: a stray change event is ignored
        look.on_pointer_lock_change(true);
        assert!(!look.is_locked());
        assert!(look.drain_notifications().is_empty());
    }

    #[test]
    fn test_unlock_notifies_once() {
        let mut look = LookController::new(LookMode::Desktop, LookConfig::default());
        look.lock();
        look.on_pointer_lock_change(true);
        look.drain_notifications();

        assert!(look.unlock());
        look.on_pointer_lock_change(false);
        assert_eq!(look.drain_notifications(), vec![AppEvent::LookDisengaged]);
    }
}
