//! Synchronous observer used between components.
//!
//! Subscribers run in registration order, on the emitting call stack, so the
//! order in which the frame loop sees side effects is reproducible.

/// Notifications crossing component boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    LookEngaged,
    LookDisengaged,
    /// A nearby character can be talked to; `None` hides the hint.
    InteractionHint(Option<String>),
    CharacterAttention { character_id: String },
    StartChat { character_id: String },
    /// Chat overlay opened; `transcript` starts with the greeting.
    ChatOpened {
        character_id: String,
        name: String,
        transcript: Vec<String>,
    },
    ChatClosed,
    AudioInitialized,
    UiVisibilityChanged { visible: bool },
    MuteChanged { muted: bool },
}

type Subscriber<E> = Box<dyn FnMut(&E)>;

pub struct EventBus<E> {
    subscribers: Vec<Subscriber<E>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, f: impl FnMut(&E) + 'static) {
        self.subscribers.push(Box::new(f));
    }

    pub fn emit(&mut self, event: E) {
        for subscriber in self.subscribers.iter_mut() {
            subscriber(&event);
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_delivery_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["first", "second", "third"] {
            let log = log.clone();
            bus.subscribe(move |e: &AppEvent| log.borrow_mut().push((tag, e.clone())));
        }

        bus.emit(AppEvent::LookEngaged);

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].0, "first");
        assert_eq!(log[2].0, "third");
        assert!(log.iter().all(|(_, e)| *e == AppEvent::LookEngaged));
    }
}
