//! NPC roster: templates, validated definitions and spawned instances.

use std::collections::HashMap;

use glam::Vec3;
use tracing::{info, warn};

use crate::error::CharacterError;

/// How long a wave plays after an attention trigger, in seconds.
pub const WAVE_DURATION_S: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterTemplate {
    SpacesuitMale,
    ScifiFemale,
    SwatMale,
    SoldierFemale,
}

impl CharacterTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            CharacterTemplate::SpacesuitMale => "Commander Torres",
            CharacterTemplate::ScifiFemale => "Dr. Chen",
            CharacterTemplate::SwatMale => "Security Chief Morrison",
            CharacterTemplate::SoldierFemale => "Lieutenant Rodriguez",
        }
    }

    pub fn model_url(&self) -> &'static str {
        match self {
            CharacterTemplate::SpacesuitMale => "https://play.rosebud.ai/assets/Male_Spacesuit.gltf?L3DT",
            CharacterTemplate::ScifiFemale => "https://play.rosebud.ai/assets/Female_SciFi.gltf?5wuu",
            CharacterTemplate::SwatMale => "https://play.rosebud.ai/assets/Male_Swat.gltf?iWf8",
            CharacterTemplate::SoldierFemale => "https://play.rosebud.ai/assets/Female_Soldier.gltf?f8a3",
        }
    }

    /// Personality notes for the character. Scripted replies do not read it.
    pub fn persona(&self) -> &'static str {
        match self {
            CharacterTemplate::SpacesuitMale => {
                "Gruff but fair station commander, fifteen years in deep space. Short, clipped military speech."
            }
            CharacterTemplate::ScifiFemale => {
                "Brilliant, scattered scientist. Talks fast, gets excited, trails off mid-sentence."
            }
            CharacterTemplate::SwatMale => {
                "Suspicious security chief with a dry sense of humour. Speaks in short bursts."
            }
            CharacterTemplate::SoldierFemale => {
                "Direct, confident soldier who earned her rank. Crisp and matter-of-fact."
            }
        }
    }
}

/// A character placement, checked by [`CharacterDef::validate`] before use.
#[derive(Debug, Clone)]
pub struct CharacterDef {
    pub id: String,
    pub name: String,
    pub model_url: String,
    pub persona: String,
    pub position: Vec3,
    pub rotation: Vec3,
}

impl CharacterDef {
    pub fn from_template(id: impl Into<String>, template: CharacterTemplate, position: Vec3, rotation: Vec3) -> Self {
        Self {
            id: id.into(),
            name: template.name().to_string(),
            model_url: template.model_url().to_string(),
            persona: template.persona().to_string(),
            position,
            rotation,
        }
    }

    pub fn validate(&self) -> Result<(), CharacterError> {
        if self.id.trim().is_empty() {
            return Err(CharacterError::MissingId);
        }
        if self.name.trim().is_empty() {
            return Err(CharacterError::MissingName(self.id.clone()));
        }
        if self.model_url.trim().is_empty() {
            return Err(CharacterError::MissingModel(self.id.clone()));
        }
        if !self.position.is_finite() || !self.rotation.is_finite() {
            return Err(CharacterError::InvalidPose(self.id.clone()));
        }
        Ok(())
    }
}

/// The two characters placed in the default level.
pub fn default_level() -> Vec<CharacterDef> {
    use std::f32::consts::PI;
    vec![
        CharacterDef::from_template(
            "character_1",
            CharacterTemplate::SpacesuitMale,
            Vec3::new(-1.5, 2.0, -25.0),
            Vec3::new(0.0, PI * 0.25, 0.0),
        ),
        CharacterDef::from_template(
            "character_2",
            CharacterTemplate::ScifiFemale,
            Vec3::new(3.2, 2.0, -22.5),
            Vec3::new(0.0, PI * -0.15, 0.0),
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Character {
    pub def: CharacterDef,
    pub model: ModelState,
    pub interactable: bool,
    wave_remaining: f32,
}

impl Character {
    fn new(def: CharacterDef) -> Self {
        Self {
            def,
            model: ModelState::Loading,
            interactable: true,
            wave_remaining: 0.0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model == ModelState::Loaded
    }

    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.def.position.distance(point)
    }

    pub fn trigger_wave(&mut self) {
        if self.is_loaded() {
            self.wave_remaining = WAVE_DURATION_S;
        }
    }

    pub fn is_waving(&self) -> bool {
        self.wave_remaining > 0.0
    }

    fn update(&mut self, dt: f32) {
        if self.wave_remaining > 0.0 {
            self.wave_remaining = (self.wave_remaining - dt).max(0.0);
        }
    }
}

/// Character definitions per level and the characters currently spawned.
#[derive(Debug, Default)]
pub struct CharacterRoster {
    levels: HashMap<String, Vec<CharacterDef>>,
    characters: HashMap<String, Character>,
}

impl CharacterRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register definitions for a level. Invalid entries are dropped with a warning.
    pub fn register_level(&mut self, level: &str, defs: Vec<CharacterDef>) -> usize {
        let valid: Vec<CharacterDef> = defs
            .into_iter()
            .filter(|def| match def.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("skipping character definition: {e}");
                    false
                }
            })
            .collect();
        let count = valid.len();
        self.levels.insert(level.to_string(), valid);
        count
    }

    /// Replace the spawned set with the characters of `level`.
    pub fn spawn_level(&mut self, level: &str) -> Vec<String> {
        self.clear();
        let Some(defs) = self.levels.get(level).cloned() else {
            info!("no characters defined for level {level}");
            return Vec::new();
        };
        info!("spawning {} characters for level {level}", defs.len());
        defs.into_iter()
            .filter_map(|def| match self.spawn(def) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("{e}");
                    None
                }
            })
            .collect()
    }

    pub fn spawn(&mut self, def: CharacterDef) -> Result<String, CharacterError> {
        def.validate()?;
        if self.characters.contains_key(&def.id) {
            return Err(CharacterError::Duplicate(def.id));
        }
        let id = def.id.clone();
        info!("spawned character {} ({id})", def.name);
        self.characters.insert(id.clone(), Character::new(def));
        Ok(id)
    }

    /// Record the outcome of the model load for `id`.
    pub fn set_model_state(&mut self, id: &str, state: ModelState) {
        if let Some(character) = self.characters.get_mut(id) {
            if state == ModelState::Failed {
                warn!("model for character {id} failed to load");
            }
            character.model = state;
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Character> {
        let removed = self.characters.remove(id);
        if removed.is_some() {
            info!("removed character {id}");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.characters.clear();
    }

    pub fn get(&self, id: &str) -> Option<&Character> {
        self.characters.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Character> {
        self.characters.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.characters.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Character)> {
        self.characters.iter()
    }

    pub fn update(&mut self, dt: f32) {
        for character in self.characters.values_mut() {
            character.update(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_catches_missing_fields() {
        let mut def = CharacterDef::from_template("a", CharacterTemplate::SwatMale, Vec3::ZERO, Vec3::ZERO);
        assert!(def.validate().is_ok());

        def.model_url.clear();
        assert_eq!(def.validate(), Err(CharacterError::MissingModel("a".to_string())));

        def.model_url = "m.gltf".to_string();
        def.position.x = f32::NAN;
        assert_eq!(def.validate(), Err(CharacterError::InvalidPose("a".to_string())));
    }

    #[test]
    fn test_spawn_level_replaces_and_skips_duplicates() {
        let mut roster = CharacterRoster::new();
        let mut defs = default_level();
        defs.push(defs[0].clone());
        assert_eq!(roster.register_level("default", defs), 3);

        let spawned = roster.spawn_level("default");
        assert_eq!(spawned.len(), 2);
        assert_eq!(roster.len(), 2);

        assert!(roster.spawn_level("missing").is_empty());
        assert!(roster.is_empty());
    }

    #[test]
    fn test_wave_needs_loaded_model_and_expires() {
        let mut roster = CharacterRoster::new();
        let id = roster
            .spawn(CharacterDef::from_template("c", CharacterTemplate::ScifiFemale, Vec3::ZERO, Vec3::ZERO))
            .unwrap();

        roster.get_mut(&id).unwrap().trigger_wave();
        assert!(!roster.get(&id).unwrap().is_waving());

        roster.set_model_state(&id, ModelState::Loaded);
        roster.get_mut(&id).unwrap().trigger_wave();
        assert!(roster.get(&id).unwrap().is_waving());

        roster.update(1.0);
        assert!(roster.get(&id).unwrap().is_waving());
        roster.update(0.6);
        assert!(!roster.get(&id).unwrap().is_waving());
    }
}
