// MODEL: camera and character data
pub mod camera;
pub mod character;

pub use camera::Camera;
pub use character::{Character, CharacterDef, CharacterRoster, CharacterTemplate, ModelState};
