//! JavaScript renderer reached over wasm-bindgen. The page constructs a
//! `SceneBridge` object (three.js scene, splat mesh, character models) and
//! hands it to `launch`.

use glam::{Quat, Vec3};
use wasm_bindgen::prelude::*;

use super::scene::{SceneGraph, VisualId};
use crate::model::Camera;

#[wasm_bindgen]
extern "C" {
    #[derive(Clone)]
    pub type SceneBridge;

    #[wasm_bindgen(method, js_name = addProjectile)]
    fn add_projectile(this: &SceneBridge, x: f32, y: f32, z: f32, radius: f32, color: u32) -> u32;

    #[wasm_bindgen(method, js_name = setTransform)]
    fn set_transform(this: &SceneBridge, id: u32, x: f32, y: f32, z: f32, qx: f32, qy: f32, qz: f32, qw: f32);

    #[wasm_bindgen(method, js_name = disposeVisual)]
    fn dispose(this: &SceneBridge, id: u32);

    #[wasm_bindgen(method, js_name = renderFrame)]
    fn render_frame(this: &SceneBridge, x: f32, y: f32, z: f32, yaw: f32, pitch: f32);

    /// Resolves to `true` once the model is in the scene, `false` on failure.
    #[wasm_bindgen(method, js_name = loadCharacter)]
    pub fn load_character(this: &SceneBridge, id: &str, url: &str, x: f32, y: f32, z: f32, rot_y: f32) -> js_sys::Promise;

    #[wasm_bindgen(method, js_name = playCharacterWave)]
    pub fn play_character_wave(this: &SceneBridge, id: &str);

    /// Place the splat scene. Euler angles in radians, XYZ order. Resolves
    /// once the splat is visible.
    #[wasm_bindgen(method, js_name = loadSplat)]
    pub fn load_splat(this: &SceneBridge, url: &str, scale: f32, x: f32, y: f32, z: f32, rx: f32, ry: f32, rz: f32) -> js_sys::Promise;

    /// Resolves to `{ vertices: Float32Array, indices: Uint32Array }` in the
    /// mesh's own space. `matrix` is the column-major world transform used to
    /// draw it when `visible` is set.
    #[wasm_bindgen(method, js_name = loadCollisionMesh)]
    pub fn load_collision_mesh(this: &SceneBridge, url: &str, matrix: &[f32], visible: bool) -> js_sys::Promise;

    #[wasm_bindgen(method, js_name = setInteractionHint)]
    pub fn set_interaction_hint(this: &SceneBridge, text: Option<String>);

    #[wasm_bindgen(method, js_name = setUiVisible)]
    pub fn set_ui_visible(this: &SceneBridge, visible: bool);

    #[wasm_bindgen(method, js_name = showChat)]
    pub fn show_chat(this: &SceneBridge, name: &str, lines: &js_sys::Array);

    #[wasm_bindgen(method, js_name = appendChatLine)]
    pub fn append_chat_line(this: &SceneBridge, line: &str);

    #[wasm_bindgen(method, js_name = hideChat)]
    pub fn hide_chat(this: &SceneBridge);

    #[wasm_bindgen(method, js_name = setCrosshair)]
    pub fn set_crosshair(this: &SceneBridge, visible: bool);

    #[wasm_bindgen(method, js_name = setJoystickKnob)]
    pub fn set_joystick_knob(this: &SceneBridge, dx: f32, dy: f32);
}

impl SceneGraph for SceneBridge {
    fn add_projectile_visual(&mut self, position: Vec3, radius: f32, color: u32) -> VisualId {
        VisualId(self.add_projectile(position.x, position.y, position.z, radius, color))
    }

    fn set_visual_transform(&mut self, id: VisualId, position: Vec3, rotation: Quat) {
        self.set_transform(
            id.0, position.x, position.y, position.z, rotation.x, rotation.y, rotation.z, rotation.w,
        );
    }

    fn dispose_visual(&mut self, id: VisualId) {
        self.dispose(id.0);
    }

    fn render(&mut self, camera: &Camera) {
        self.render_frame(camera.eye.x, camera.eye.y, camera.eye.z, camera.yaw, camera.pitch);
    }
}
