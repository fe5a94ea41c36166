use glam::Vec2;

use crate::config::JoystickConfig;

/// On-screen movement stick. Positions are client pixels; the output vector
/// is in [-1, 1] per axis with +y pointing down the screen.
#[derive(Debug, Clone)]
pub struct VirtualJoystick {
    config: JoystickConfig,
    active: bool,
    center: Vec2,
    delta: Vec2,
    normalized: Vec2,
}

impl VirtualJoystick {
    pub fn new(config: JoystickConfig) -> Self {
        Self {
            config,
            active: false,
            center: Vec2::ZERO,
            delta: Vec2::ZERO,
            normalized: Vec2::ZERO,
        }
    }

    /// Start a drag. `center` is the middle of the stick's container.
    pub fn press(&mut self, center_x: f32, center_y: f32, x: f32, y: f32) {
        self.active = true;
        self.center = Vec2::new(center_x, center_y);
        self.set_knob(Vec2::new(x, y) - self.center);
    }

    pub fn drag(&mut self, x: f32, y: f32) {
        if self.active {
            self.set_knob(Vec2::new(x, y) - self.center);
        }
    }

    pub fn release(&mut self) {
        self.active = false;
    }

    /// Spring the released knob back toward the center; call once per frame.
    pub fn tick_return(&mut self) {
        if self.active || self.delta == Vec2::ZERO {
            return;
        }
        let delta = self.delta * self.config.return_decay;
        if delta.x.abs() > 1.0 || delta.y.abs() > 1.0 {
            self.set_knob(delta);
        } else {
            self.delta = Vec2::ZERO;
            self.normalized = Vec2::ZERO;
        }
    }

    fn set_knob(&mut self, offset: Vec2) {
        let max = self.config.max_distance;
        self.delta = offset.clamp_length_max(max);
        let mut n = self.delta / max;
        if n.x.abs() < self.config.dead_zone {
            n.x = 0.0;
        }
        if n.y.abs() < self.config.dead_zone {
            n.y = 0.0;
        }
        self.normalized = n;
    }

    pub fn is_pressed(&self) -> bool {
        self.active || self.normalized != Vec2::ZERO
    }

    pub fn vector(&self) -> Vec2 {
        self.normalized
    }

    /// Knob offset from the center in pixels, for drawing.
    pub fn knob_offset(&self) -> Vec2 {
        self.delta
    }
}
