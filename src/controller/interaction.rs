use std::collections::HashMap;

use glam::Vec3;
use tracing::{debug, info};

use crate::events::AppEvent;
use crate::model::CharacterRoster;

pub const INTERACTION_RANGE: f32 = 3.2;
/// Wider radius used to rank candidates before the range check.
pub const DETECTION_FACTOR: f32 = 1.8;
pub const ATTENTION_COOLDOWN_S: f64 = 10.0;
pub const ATTENTION_SOUND: &str = "character_attention";
pub const ATTENTION_VOLUME: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
struct NearbyCharacter {
    id: String,
    name: String,
}

/// Tracks which character the player can talk to.
#[derive(Debug, Default)]
pub struct InteractionTracker {
    nearest: Option<NearbyCharacter>,
    last_attention: HashMap<String, f64>,
    hint_visible: bool,
}

impl InteractionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate proximity. `now` is wall-clock seconds. Events are pushed
    /// into `out`; waving is started on the roster directly.
    pub fn update(
        &mut self,
        roster: &mut CharacterRoster,
        player: Vec3,
        look_engaged: bool,
        now: f64,
        out: &mut Vec<AppEvent>,
    ) {
        if !look_engaged || roster.is_empty() {
            self.nearest = None;
            self.hide_hint(out);
            return;
        }

        let detection = INTERACTION_RANGE * DETECTION_FACTOR;
        let nearest = roster
            .iter()
            .filter(|(_, c)| c.is_loaded() && c.interactable)
            .map(|(id, c)| (id, c, c.distance_to(player)))
            .filter(|(_, _, d)| *d <= detection)
            .min_by(|a, b| a.2.total_cmp(&b.2));

        match nearest {
            Some((id, character, distance)) if distance <= INTERACTION_RANGE => {
                if self.nearest.as_ref().map(|n| n.id.as_str()) == Some(id.as_str()) {
                    return;
                }
                let target = NearbyCharacter {
                    id: id.clone(),
                    name: character.def.name.clone(),
                };
                debug!(id = %target.id, distance, "character in range");
                out.push(AppEvent::InteractionHint(Some(format!("Talk to {}", target.name))));
                self.hint_visible = true;
                self.trigger_attention(roster, &target.id, now, out);
                self.nearest = Some(target);
            }
            _ => {
                if self.nearest.take().is_some() {
                    self.hide_hint(out);
                }
            }
        }
    }

    fn trigger_attention(&mut self, roster: &mut CharacterRoster, id: &str, now: f64, out: &mut Vec<AppEvent>) {
        let recent = self
            .last_attention
            .get(id)
            .is_some_and(|last| now - last <= ATTENTION_COOLDOWN_S);
        if recent {
            return;
        }
        if let Some(character) = roster.get_mut(id) {
            character.trigger_wave();
        }
        self.last_attention.insert(id.to_string(), now);
        out.push(AppEvent::CharacterAttention {
            character_id: id.to_string(),
        });
    }

    fn hide_hint(&mut self, out: &mut Vec<AppEvent>) {
        if self.hint_visible {
            self.hint_visible = false;
            out.push(AppEvent::InteractionHint(None));
        }
    }

    /// `T` or a tap on the hint. Starts a chat with the current target.
    pub fn try_interact(&mut self, out: &mut Vec<AppEvent>) -> bool {
        let Some(target) = &self.nearest else {
            return false;
        };
        info!("starting chat with {}", target.name);
        out.push(AppEvent::StartChat {
            character_id: target.id.clone(),
        });
        self.hide_hint(out);
        true
    }

    /// Forget a character that left the roster.
    pub fn forget(&mut self, id: &str) {
        self.last_attention.remove(id);
        if self.nearest.as_ref().is_some_and(|n| n.id == id) {
            self.nearest = None;
        }
    }

    pub fn has_character_in_range(&self) -> bool {
        self.nearest.is_some()
    }

    pub fn hint_visible(&self) -> bool {
        self.hint_visible
    }
}
