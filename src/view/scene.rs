use glam::{Quat, Vec3};
use tracing::{debug, trace};

use crate::model::Camera;

/// Opaque handle to a visual owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualId(pub u32);

/// What the core needs from the renderer. The renderer owns everything else
/// in the scene (splat, environment, character models).
pub trait SceneGraph {
    fn add_projectile_visual(&mut self, position: Vec3, radius: f32, color: u32) -> VisualId;
    fn set_visual_transform(&mut self, id: VisualId, position: Vec3, rotation: Quat);
    fn dispose_visual(&mut self, id: VisualId);
    fn render(&mut self, camera: &Camera);
}

/// Renderer stand-in that only logs. Used by the native shell.
#[derive(Debug, Default)]
pub struct TracingScene {
    next_id: u32,
    live: usize,
    frames: u64,
}

impl TracingScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_visuals(&self) -> usize {
        self.live
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl SceneGraph for TracingScene {
    fn add_projectile_visual(&mut self, position: Vec3, radius: f32, color: u32) -> VisualId {
        let id = VisualId(self.next_id);
        self.next_id += 1;
        self.live += 1;
        debug!(id = id.0, ?position, radius, color = format!("{color:06x}"), "projectile visual added");
        id
    }

    fn set_visual_transform(&mut self, id: VisualId, position: Vec3, _rotation: Quat) {
        trace!(id = id.0, ?position, "visual moved");
    }

    fn dispose_visual(&mut self, id: VisualId) {
        self.live = self.live.saturating_sub(1);
        debug!(id = id.0, "projectile visual disposed");
    }

    fn render(&mut self, camera: &Camera) {
        self.frames += 1;
        if self.frames % 600 == 0 {
            debug!(frame = self.frames, eye = ?camera.eye, yaw = camera.yaw, pitch = camera.pitch, "frame");
        }
    }
}
