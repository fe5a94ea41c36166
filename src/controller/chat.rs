use std::collections::HashMap;

use tracing::info;

use crate::model::Character;

const MAX_REPLY_CHARS: usize = 120;
const TRUNCATED_CHARS: usize = 117;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Scripted conversation with one character.
#[derive(Debug, Clone)]
pub struct ChatSession {
    name: String,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            history: Vec::new(),
        }
    }

    pub fn greeting(&self) -> String {
        format!("Hi, I'm {}. What would you like to talk about?", self.name)
    }

    pub fn respond(&mut self, message: &str) -> String {
        self.history.push(ChatTurn {
            role: Role::User,
            content: message.to_string(),
        });
        let reply = format!("{}: {}", self.name, shorten(message));
        self.history.push(ChatTurn {
            role: Role::Assistant,
            content: reply.clone(),
        });
        reply
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }
}

fn shorten(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "Okay.".to_string();
    }
    if text.chars().count() > MAX_REPLY_CHARS {
        let mut cut: String = text.chars().take(TRUNCATED_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}

/// Chat window state. Sessions are kept per character so reopening a chat
/// continues the earlier conversation.
#[derive(Debug, Default)]
pub struct ChatOverlay {
    sessions: HashMap<String, ChatSession>,
    active: Option<String>,
}

impl ChatOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the overlay for `character`. Returns the transcript to show; a new
    /// session starts with the greeting.
    pub fn open(&mut self, id: &str, character: &Character) -> Vec<String> {
        let session = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| ChatSession::new(character.def.name.clone()));
        self.active = Some(id.to_string());
        info!("chat opened with {}", session.name());

        let mut lines = vec![session.greeting()];
        lines.extend(session.history().iter().map(|t| t.content.clone()));
        lines
    }

    pub fn send(&mut self, message: &str) -> Option<String> {
        let id = self.active.as_ref()?;
        self.sessions.get_mut(id).map(|s| s.respond(message))
    }

    /// Returns false when nothing was open.
    pub fn close(&mut self) -> bool {
        self.active.take().is_some()
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ChatSession> {
        self.active.as_ref().and_then(|id| self.sessions.get(id))
    }

    /// Drop a character's history, e.g. when it despawns.
    pub fn forget(&mut self, id: &str) {
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        self.sessions.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CharacterDef, CharacterRoster, CharacterTemplate};
    use glam::Vec3;

    #[test]
    fn test_greeting_and_reply_format() {
        let mut session = ChatSession::new("Dr. Chen");
        assert_eq!(session.greeting(), "Hi, I'm Dr. Chen. What would you like to talk about?");
        assert_eq!(session.respond("  hello  "), "Dr. Chen: hello");
        assert_eq!(session.respond(""), "Dr. Chen: Okay.");
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history()[0].role, Role::User);
    }

    #[test]
    fn test_replies_ignore_persona() {
        let mut roster = CharacterRoster::new();
        for (id, persona) in [("quiet", ""), ("chatty", "Talks about nothing but the weather.")] {
            let mut def = CharacterDef::from_template(id, CharacterTemplate::SwatMale, Vec3::ZERO, Vec3::ZERO);
            def.persona = persona.to_string();
            roster.spawn(def).unwrap();
        }

        let mut overlay = ChatOverlay::new();
        overlay.open("quiet", roster.get("quiet").unwrap());
        let quiet = overlay.send("hello").unwrap();
        overlay.close();
        overlay.open("chatty", roster.get("chatty").unwrap());
        let chatty = overlay.send("hello").unwrap();
        assert_eq!(quiet, chatty);
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let mut session = ChatSession::new("X");
        let reply = session.respond(&"a".repeat(121));
        assert_eq!(reply, format!("X: {}...", "a".repeat(117)));
        let reply = session.respond(&"b".repeat(120));
        assert_eq!(reply, format!("X: {}", "b".repeat(120)));
    }

    #[test]
    fn test_history_survives_reopen() {
        let mut roster = CharacterRoster::new();
        roster
            .spawn(CharacterDef::from_template("c1", CharacterTemplate::ScifiFemale, Vec3::ZERO, Vec3::ZERO))
            .unwrap();
        let character = roster.get("c1").unwrap();

        let mut overlay = ChatOverlay::new();
        assert_eq!(overlay.send("ignored"), None);
        assert_eq!(overlay.open("c1", character).len(), 1);
        assert!(overlay.send("status?").is_some());
        assert!(overlay.close());
        assert!(!overlay.close());

        let lines = overlay.open("c1", character);
        assert_eq!(lines.len(), 3);
        assert!(overlay.is_open());
    }
}
