// CONTROLLER: input, look, simulation and the frame loop
pub mod chat;
pub mod frame_loop;
pub mod input;
pub mod interaction;
pub mod joystick;
pub mod look;
pub mod physics;
pub mod projectile;

pub use chat::{ChatOverlay, ChatSession};
pub use frame_loop::{FrameLoopContext, FrameReport};
pub use input::{InputEvent, InputState, KeyAction, MovementIntent};
pub use interaction::InteractionTracker;
pub use joystick::VirtualJoystick;
pub use look::{LookController, LookMode};
pub use physics::{FixedStep, PhysicsSystem, PhysicsWorld, StepReport};
pub use projectile::{ProjectileSystem, ShootCooldown};
