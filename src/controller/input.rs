/// Platform-agnostic input handling: raw key/button state and the movement
/// intent derived from it.
use std::collections::HashSet;

use glam::Vec3;

use crate::controller::joystick::VirtualJoystick;
use crate::model::Camera;

/// Platform-independent input events. Keys are physical codes (`KeyW`, `Space`).
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown { code: String, ctrl: bool },
    KeyUp { code: String },
    VerticalButton { button: VerticalButton, pressed: bool },
    /// A text field gained (`true`) or lost focus.
    TextFocus(bool),
    FocusLost,
    VisibilityChanged { visible: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalButton {
    Up,
    Down,
}

/// What a key press means to the rest of the app, beyond held-key state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Space was claimed as a shoot trigger; the platform should prevent default.
    Trigger,
    Interact,
    ToggleUi,
    Escape,
    /// The key belongs to a focused text field or the open chat.
    PassThrough,
    None,
}

/// Key mapping configuration
#[derive(Clone, Debug)]
pub struct KeyBindings {
    pub forward: String,
    pub backward: String,
    pub left: String,
    pub right: String,
    pub up: String,
    pub down: String,
    pub trigger: String,
    pub interact: String,
    pub toggle_ui: String,
    pub escape: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: "KeyW".to_string(),
            backward: "KeyS".to_string(),
            left: "KeyA".to_string(),
            right: "KeyD".to_string(),
            up: "KeyR".to_string(),
            down: "KeyF".to_string(),
            trigger: "Space".to_string(),
            interact: "KeyT".to_string(),
            toggle_ui: "KeyH".to_string(),
            escape: "Escape".to_string(),
        }
    }
}

/// Held keys, held vertical buttons and the pending shoot trigger.
pub struct InputState {
    pub bindings: KeyBindings,
    pressed_keys: HashSet<String>,
    trigger_pending: bool,
    up_held: bool,
    down_held: bool,
    text_focused: bool,
    chat_open: bool,
}

impl InputState {
    pub fn new(bindings: KeyBindings) -> Self {
        Self {
            bindings,
            pressed_keys: HashSet::new(),
            trigger_pending: false,
            up_held: false,
            down_held: false,
            text_focused: false,
            chat_open: false,
        }
    }

    /// Process an input event and update state
    pub fn process_event(&mut self, event: &InputEvent) -> KeyAction {
        match event {
            InputEvent::KeyDown { code, ctrl } => self.key_down(code, *ctrl),
            InputEvent::KeyUp { code } => {
                self.pressed_keys.remove(code.as_str());
                KeyAction::None
            }
            InputEvent::VerticalButton { button, pressed } => {
                match button {
                    VerticalButton::Up => self.up_held = *pressed,
                    VerticalButton::Down => self.down_held = *pressed,
                }
                KeyAction::None
            }
            InputEvent::TextFocus(focused) => {
                self.text_focused = *focused;
                KeyAction::None
            }
            InputEvent::FocusLost | InputEvent::VisibilityChanged { .. } => {
                self.clear();
                KeyAction::None
            }
        }
    }

    fn key_down(&mut self, code: &str, ctrl: bool) -> KeyAction {
        // repeats of a held key are not new presses
        let fresh = self.pressed_keys.insert(code.to_string());
        let b = &self.bindings;

        if code == b.escape {
            return KeyAction::Escape;
        }
        if self.ui_owns_keyboard() {
            return KeyAction::PassThrough;
        }
        if code == b.trigger {
            if fresh {
                self.trigger_pending = true;
            }
            return KeyAction::Trigger;
        }
        if code == b.interact && fresh {
            return KeyAction::Interact;
        }
        if ctrl && code == b.toggle_ui && fresh {
            return KeyAction::ToggleUi;
        }
        KeyAction::None
    }

    /// True while typing or chatting; the trigger key then belongs to the UI.
    pub fn ui_owns_keyboard(&self) -> bool {
        self.text_focused || self.chat_open
    }

    pub fn set_chat_open(&mut self, open: bool) {
        self.chat_open = open;
        if open {
            self.trigger_pending = false;
        }
    }

    /// Returns the pending shoot trigger once, then clears it.
    pub fn consume_trigger(&mut self) -> bool {
        std::mem::take(&mut self.trigger_pending)
    }

    pub fn is_key_pressed(&self, code: &str) -> bool {
        self.pressed_keys.contains(code)
    }

    /// Read-only view for key-highlight widgets.
    pub fn pressed_keys(&self) -> &HashSet<String> {
        &self.pressed_keys
    }

    pub fn vertical_held(&self) -> (bool, bool) {
        (self.up_held, self.down_held)
    }

    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.up_held = false;
        self.down_held = false;
        self.trigger_pending = false;
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new(KeyBindings::default())
    }
}

/// World-space movement direction for this frame plus the shoot trigger.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementIntent {
    pub direction: Vec3,
    pub jump: bool,
}

impl MovementIntent {
    pub const IDLE: MovementIntent = MovementIntent {
        direction: Vec3::ZERO,
        jump: false,
    };

    pub fn is_idle(&self) -> bool {
        self.direction == Vec3::ZERO
    }
}

fn axis(input: &InputState, positive: &str, negative: &str) -> f32 {
    let mut v = 0.0;
    if input.is_key_pressed(positive) {
        v += 1.0;
    }
    if input.is_key_pressed(negative) {
        v -= 1.0;
    }
    v
}

/// Combine keyboard, joystick and vertical buttons into one direction.
///
/// Horizontal movement comes from the keyboard whenever any of the four
/// walking keys is held and from the joystick otherwise. Vertical keys and
/// buttons always add. The result is unit length or zero.
pub fn movement_direction(
    camera: &Camera,
    input: &InputState,
    joystick: Option<&VirtualJoystick>,
    joystick_sensitivity: f32,
) -> Vec3 {
    let b = &input.bindings;
    let forward = camera.flat_forward();
    let right = camera.right();

    let walk_z = axis(input, &b.forward, &b.backward);
    let walk_x = axis(input, &b.right, &b.left);
    let walking_key_held = [&b.forward, &b.backward, &b.left, &b.right]
        .iter()
        .any(|code| input.is_key_pressed(code));

    let mut vertical = axis(input, &b.up, &b.down);
    let (up_held, down_held) = input.vertical_held();
    if up_held {
        vertical += 1.0;
    }
    if down_held {
        vertical -= 1.0;
    }

    let horizontal = if walking_key_held {
        let flat = Vec3::new(walk_x, 0.0, walk_z);
        let flat = if flat.length_squared() > 0.0 { flat.normalize() } else { flat };
        forward * flat.z + right * flat.x
    } else if let Some(stick) = joystick.filter(|j| j.is_pressed()) {
        let v = stick.vector();
        // screen y grows downwards
        forward * (-v.y * joystick_sensitivity) + right * (v.x * joystick_sensitivity)
    } else {
        Vec3::ZERO
    };

    (horizontal + Vec3::Y * vertical).normalize_or_zero()
}

/// Full intent for one frame: direction plus the consumed trigger.
pub fn movement_intent(
    camera: &Camera,
    input: &mut InputState,
    joystick: Option<&VirtualJoystick>,
    joystick_sensitivity: f32,
) -> MovementIntent {
    MovementIntent {
        direction: movement_direction(camera, input, joystick, joystick_sensitivity),
        jump: input.consume_trigger(),
    }
}

#[cfg(target_arch = "wasm32")]
pub mod wasm {
    use super::*;
    use web_sys::KeyboardEvent;

    pub fn keyboard_event_to_input(e: &KeyboardEvent, is_down: bool) -> InputEvent {
        if is_down {
            InputEvent::KeyDown {
                code: e.code(),
                ctrl: e.ctrl_key(),
            }
        } else {
            InputEvent::KeyUp { code: e.code() }
        }
    }

    /// Whether the focused element takes typed text.
    pub fn is_text_target(element: &web_sys::Element) -> bool {
        let tag = element.tag_name();
        tag.eq_ignore_ascii_case("INPUT")
            || tag.eq_ignore_ascii_case("TEXTAREA")
            || element.get_attribute("contenteditable").as_deref() == Some("true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JoystickConfig;

    fn down(code: &str) -> InputEvent {
        InputEvent::KeyDown {
            code: code.to_string(),
            ctrl: false,
        }
    }

    fn up(code: &str) -> InputEvent {
        InputEvent::KeyUp { code: code.to_string() }
    }

    fn camera() -> Camera {
        Camera::new(800, 600)
    }

    #[test]
    fn test_idle_is_zero() {
        let input = InputState::default();
        assert_eq!(movement_direction(&camera(), &input, None, 0.15), Vec3::ZERO);
    }

    #[test]
    fn test_any_key_combination_is_unit_or_zero() {
        let keys = ["KeyW", "KeyS", "KeyA", "KeyD", "KeyR", "KeyF"];
        let mut cam = camera();
        cam.yaw = 1.1;
        for mask in 0u32..(1 << keys.len()) {
            let mut input = InputState::default();
            for (i, key) in keys.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    input.process_event(&down(key));
                }
            }
            let dir = movement_direction(&cam, &input, None, 0.15);
            let len = dir.length();
            assert!(len == 0.0 || (len - 1.0).abs() < 1e-5, "mask {mask:#b} gave length {len}");
        }
    }

    #[test]
    fn test_forward_and_strafe_are_camera_relative() {
        let mut input = InputState::default();
        input.process_event(&down("KeyW"));
        let dir = movement_direction(&camera(), &input, None, 0.15);
        assert!((dir - Vec3::NEG_Z).length() < 1e-5);

        input.process_event(&up("KeyW"));
        input.process_event(&down("KeyD"));
        let dir = movement_direction(&camera(), &input, None, 0.15);
        assert!((dir - Vec3::X).length() < 1e-5);

        let mut turned = camera();
        turned.yaw = std::f32::consts::FRAC_PI_2;
        input.process_event(&up("KeyD"));
        input.process_event(&down("KeyW"));
        let dir = movement_direction(&turned, &input, None, 0.15);
        assert!((dir - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn test_vertical_button_adds_world_y() {
        let mut input = InputState::default();
        input.process_event(&InputEvent::VerticalButton {
            button: VerticalButton::Up,
            pressed: true,
        });
        let mut cam = camera();
        cam.pitch = -1.0;
        assert_eq!(movement_direction(&cam, &input, None, 0.15), Vec3::Y);

        input.process_event(&InputEvent::VerticalButton {
            button: VerticalButton::Down,
            pressed: true,
        });
        assert_eq!(movement_direction(&cam, &input, None, 0.15), Vec3::ZERO);
    }

    #[test]
    fn test_joystick_used_only_without_walking_keys() {
        let mut stick = VirtualJoystick::new(JoystickConfig::default());
        stick.press(100.0, 100.0, 100.0, 50.0); // pushed fully up
        let mut input = InputState::default();

        let dir = movement_direction(&camera(), &input, Some(&stick), 0.15);
        assert!((dir - Vec3::NEG_Z).length() < 1e-5);

        input.process_event(&down("KeyD"));
        let dir = movement_direction(&camera(), &input, Some(&stick), 0.15);
        assert!((dir - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_trigger_is_edge_triggered() {
        let mut input = InputState::default();
        assert_eq!(input.process_event(&down("Space")), KeyAction::Trigger);
        // key repeat while held
        input.process_event(&down("Space"));
        input.process_event(&down("Space"));
        assert!(input.consume_trigger());
        assert!(!input.consume_trigger());

        input.process_event(&up("Space"));
        input.process_event(&down("Space"));
        assert!(input.consume_trigger());
    }

    #[test]
    fn test_trigger_passes_through_to_ui() {
        let mut input = InputState::default();
        input.process_event(&InputEvent::TextFocus(true));
        assert_eq!(input.process_event(&down("Space")), KeyAction::PassThrough);
        assert!(!input.consume_trigger());

        input.process_event(&up("Space"));
        input.process_event(&InputEvent::TextFocus(false));
        input.set_chat_open(true);
        assert_eq!(input.process_event(&down("Space")), KeyAction::PassThrough);
        assert_eq!(input.process_event(&down("KeyT")), KeyAction::PassThrough);
        assert!(!input.consume_trigger());
        assert_eq!(input.process_event(&down("Escape")), KeyAction::Escape);
    }

    #[test]
    fn test_focus_loss_clears_state() {
        let mut input = InputState::default();
        input.process_event(&down("KeyW"));
        input.process_event(&down("Space"));
        input.process_event(&InputEvent::FocusLost);
        assert!(input.pressed_keys().is_empty());
        assert!(!input.consume_trigger());
    }

    #[test]
    fn test_ctrl_h_toggles_ui() {
        let mut input = InputState::default();
        assert_eq!(
            input.process_event(&InputEvent::KeyDown {
                code: "KeyH".to_string(),
                ctrl: true
            }),
            KeyAction::ToggleUi
        );
        assert_eq!(input.process_event(&up("KeyH")), KeyAction::None);
        assert_eq!(input.process_event(&down("KeyH")), KeyAction::None);
    }
}
