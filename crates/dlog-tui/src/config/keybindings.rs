use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

use dlog_types::Direction;

use crate::app::Action;

/// A key combination
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    pub fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }

    pub fn ctrl(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::CONTROL,
        }
    }

    pub fn shift(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::SHIFT,
        }
    }

    pub fn from_event(event: &KeyEvent) -> Self {
        Self {
            code: event.code,
            modifiers: event.modifiers,
        }
    }
}

/// Pager keybindings (less-like)
pub struct KeyBindings {
    bindings: HashMap<KeyBinding, Action>,
}

impl KeyBindings {
    pub fn new() -> Self {
        let mut bindings = HashMap::new();

        // Containers
        bindings.insert(
            KeyBinding::new(KeyCode::Left),
            Action::SwitchContainer(Direction::Previous),
        );
        bindings.insert(
            KeyBinding::new(KeyCode::Right),
            Action::SwitchContainer(Direction::Next),
        );

        // Line navigation
        bindings.insert(KeyBinding::new(KeyCode::Char('j')), Action::ScrollDown(1));
        bindings.insert(KeyBinding::new(KeyCode::Down), Action::ScrollDown(1));
        bindings.insert(KeyBinding::new(KeyCode::Enter), Action::ScrollDown(1));
        bindings.insert(KeyBinding::new(KeyCode::Char('k')), Action::ScrollUp(1));
        bindings.insert(KeyBinding::new(KeyCode::Up), Action::ScrollUp(1));

        // Page navigation
        bindings.insert(KeyBinding::new(KeyCode::PageDown), Action::PageDown);
        bindings.insert(KeyBinding::new(KeyCode::PageUp), Action::PageUp);
        bindings.insert(KeyBinding::ctrl(KeyCode::Char('d')), Action::PageDown);
        bindings.insert(KeyBinding::ctrl(KeyCode::Char('u')), Action::PageUp);
        bindings.insert(KeyBinding::new(KeyCode::Char(' ')), Action::PageDown);

        // Top/bottom
        bindings.insert(KeyBinding::new(KeyCode::Home), Action::ScrollToTop);
        bindings.insert(KeyBinding::new(KeyCode::End), Action::ScrollToBottom);
        bindings.insert(KeyBinding::new(KeyCode::Char('g')), Action::ScrollToTop);
        bindings.insert(KeyBinding::shift(KeyCode::Char('G')), Action::ScrollToBottom);

        // Toggles
        bindings.insert(KeyBinding::new(KeyCode::Char('f')), Action::ToggleFollow);
        bindings.insert(KeyBinding::new(KeyCode::Char('?')), Action::ToggleHelp);
        bindings.insert(KeyBinding::new(KeyCode::Esc), Action::DismissError);

        bindings.insert(KeyBinding::new(KeyCode::Char('q')), Action::Quit);
        bindings.insert(KeyBinding::ctrl(KeyCode::Char('c')), Action::Quit);

        Self { bindings }
    }

    /// Look up the action for a key event
    pub fn get_action(&self, key: &KeyEvent) -> Option<Action> {
        self.bindings.get(&KeyBinding::from_event(key)).cloned()
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new()
    }
}
