// VIEW: the renderer seam
pub mod scene;
#[cfg(target_arch = "wasm32")]
pub mod bridge;

pub use scene::{SceneGraph, TracingScene, VisualId};
#[cfg(target_arch = "wasm32")]
pub use bridge::SceneBridge;
