use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

use crate::config::BindingsSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputMode {
    /// Conversation list has focus.
    List,
    /// Message pane has focus; j/k move the message cursor.
    Messages,
    /// Typing a reply.
    Compose,
    Search,
    /// One-line prompt (alias, attachment path).
    Prompt,
    /// Yes/no question before a destructive action.
    Confirm,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // Navigation
    MoveDown,
    MoveUp,
    JumpTop,
    JumpBottom,
    HalfPageDown,
    HalfPageUp,
    ScrollDown,
    ScrollUp,

    // Panes
    OpenConversation,
    FocusMessages,
    FocusList,

    // Replying
    Compose,
    AttachFile,
    SendAttachment,
    RemoveAttachment,

    // Conversation management
    DeleteMessage,
    DeleteConversation,
    SetAlias,
    Refresh,

    // Search
    EnterSearch,

    // Clipboard & media
    YankMessage,
    OpenMedia,

    ShowHelp,

    // Text input (shared across input modes)
    InputChar(char),
    InputBackspace,
    InputSubmit,
    InputCancel,
    /// Key goes to the reply editor unchanged.
    Passthrough(KeyEvent),

    ConfirmYes,
    ConfirmNo,

    // System
    Quit,
    Noop,
}

impl Action {
    /// Action for a `[bindings]` value like `"delete-message"`.
    pub fn from_name(name: &str) -> Option<Action> {
        Some(match name {
            "move-down" => Action::MoveDown,
            "move-up" => Action::MoveUp,
            "jump-top" => Action::JumpTop,
            "jump-bottom" => Action::JumpBottom,
            "half-page-down" => Action::HalfPageDown,
            "half-page-up" => Action::HalfPageUp,
            "open" => Action::OpenConversation,
            "focus-messages" => Action::FocusMessages,
            "focus-list" => Action::FocusList,
            "compose" => Action::Compose,
            "attach" => Action::AttachFile,
            "send-attachment" => Action::SendAttachment,
            "remove-attachment" => Action::RemoveAttachment,
            "delete-message" => Action::DeleteMessage,
            "delete-conversation" => Action::DeleteConversation,
            "set-alias" => Action::SetAlias,
            "refresh" => Action::Refresh,
            "search" => Action::EnterSearch,
            "yank" => Action::YankMessage,
            "open-media" => Action::OpenMedia,
            "help" => Action::ShowHelp,
            "quit" => Action::Quit,
            _ => return None,
        })
    }
}

type Chord = (KeyCode, KeyModifiers);

/// Parse `"ctrl+r"`, `"F5"`, `"G"`, `"space"` into a key chord.
pub fn parse_key(spec: &str) -> Option<Chord> {
    let mut modifiers = KeyModifiers::NONE;
    let parts: Vec<&str> = spec.split('+').collect();
    let (key, mods) = parts.split_last()?;
    for m in mods {
        match m.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "alt" | "meta" => modifiers |= KeyModifiers::ALT,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            _ => return None,
        }
    }
    let code = match key.to_ascii_lowercase().as_str() {
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backtab" => KeyCode::BackTab,
        "backspace" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "space" => KeyCode::Char(' '),
        lower => {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => {
                    let n = lower.strip_prefix('f')?.parse::<u8>().ok()?;
                    if !(1..=12).contains(&n) {
                        return None;
                    }
                    KeyCode::F(n)
                }
            }
        }
    };
    Some(normalize(code, modifiers))
}

/// Terminals disagree on whether an uppercase letter carries SHIFT; the
/// character already says it, so drop the flag.
fn normalize(code: KeyCode, modifiers: KeyModifiers) -> Chord {
    match code {
        KeyCode::Char(c) if modifiers.contains(KeyModifiers::SHIFT) => {
            let c = if c.is_ascii_lowercase() {
                c.to_ascii_uppercase()
            } else {
                c
            };
            (KeyCode::Char(c), modifiers.difference(KeyModifiers::SHIFT))
        }
        _ => (code, modifiers),
    }
}

/// Tracks multi-key sequences (`g g`) and user bindings.
pub struct KeyMapper {
    pending: Option<KeyCode>,
    custom: HashMap<InputMode, HashMap<Chord, Action>>,
}

impl Default for KeyMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMapper {
    pub fn new() -> Self {
        Self {
            pending: None,
            custom: HashMap::new(),
        }
    }

    /// Install `[bindings]` overrides. Returns one message per entry that
    /// could not be understood; those entries are skipped.
    pub fn load_bindings(&mut self, bindings: &BindingsSection) -> Vec<String> {
        let mut problems = Vec::new();
        let sections: [(&HashMap<String, String>, &[InputMode]); 3] = [
            (&bindings.global, &[InputMode::List, InputMode::Messages]),
            (&bindings.list, &[InputMode::List]),
            (&bindings.messages, &[InputMode::Messages]),
        ];
        // Per-pane sections come later so they win over global ones.
        for (table, modes) in sections {
            let mut entries: Vec<(&String, &String)> = table.iter().collect();
            entries.sort();
            for (key, name) in entries {
                let Some(chord) = parse_key(key) else {
                    problems.push(format!("unknown key {:?}", key));
                    continue;
                };
                let Some(action) = Action::from_name(name) else {
                    problems.push(format!("unknown action {:?} for key {:?}", name, key));
                    continue;
                };
                for mode in modes {
                    self.custom
                        .entry(*mode)
                        .or_default()
                        .insert(chord, action.clone());
                }
            }
        }
        problems
    }

    /// Process a key event and return an action, considering current input mode.
    pub fn handle(&mut self, key: KeyEvent, mode: InputMode) -> Action {
        let chord = normalize(key.code, key.modifiers);
        match mode {
            InputMode::List | InputMode::Messages => {
                if self.pending.is_none() {
                    if let Some(action) = self.custom.get(&mode).and_then(|m| m.get(&chord)) {
                        return action.clone();
                    }
                }
                if mode == InputMode::List {
                    self.handle_list(chord)
                } else {
                    self.handle_messages(chord)
                }
            }
            InputMode::Compose => self.handle_compose(key, chord),
            InputMode::Search => match chord.0 {
                KeyCode::Down => Action::MoveDown,
                KeyCode::Up => Action::MoveUp,
                _ => self.handle_input(chord),
            },
            InputMode::Prompt => self.handle_input(chord),
            InputMode::Confirm => match chord {
                (KeyCode::Char('y'), _) | (KeyCode::Char('Y'), _) | (KeyCode::Enter, _) => {
                    Action::ConfirmYes
                }
                (KeyCode::Char('c'), KeyModifiers::CONTROL) => Action::Quit,
                (KeyCode::Char('n'), _)
                | (KeyCode::Char('N'), _)
                | (KeyCode::Char('q'), _)
                | (KeyCode::Esc, _) => Action::ConfirmNo,
                _ => Action::Noop,
            },
            InputMode::Help => match chord {
                (KeyCode::Esc, _) | (KeyCode::Char('q'), _) | (KeyCode::Char('?'), _) => {
                    Action::InputCancel
                }
                (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => {
                    Action::ScrollDown
                }
                (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => Action::ScrollUp,
                (KeyCode::Char('c'), KeyModifiers::CONTROL) => Action::Quit,
                _ => Action::Noop,
            },
        }
    }

    /// Keys that mean the same thing in both panes.
    fn handle_common(&mut self, chord: Chord) -> Action {
        match chord {
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => Action::MoveDown,
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => Action::MoveUp,
            (KeyCode::Char('g'), KeyModifiers::NONE) => {
                self.pending = Some(KeyCode::Char('g'));
                Action::Noop
            }
            (KeyCode::Char('G'), KeyModifiers::NONE) => Action::JumpBottom,
            (KeyCode::Char('d'), KeyModifiers::CONTROL) => Action::HalfPageDown,
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => Action::HalfPageUp,

            (KeyCode::Char('r'), KeyModifiers::NONE) | (KeyCode::Char('i'), KeyModifiers::NONE) => {
                Action::Compose
            }
            (KeyCode::Char('a'), KeyModifiers::NONE) => Action::AttachFile,
            (KeyCode::Char('A'), KeyModifiers::NONE) => Action::SendAttachment,
            (KeyCode::Char('X'), KeyModifiers::NONE) => Action::RemoveAttachment,

            (KeyCode::Char('D'), KeyModifiers::NONE) => Action::DeleteConversation,
            (KeyCode::Char('n'), KeyModifiers::NONE) => Action::SetAlias,
            (KeyCode::Char('r'), KeyModifiers::CONTROL) => Action::Refresh,

            (KeyCode::Char('/'), _) => Action::EnterSearch,
            (KeyCode::Char('?'), _) => Action::ShowHelp,
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Action::Quit,
            _ => Action::Noop,
        }
    }

    fn handle_list(&mut self, chord: Chord) -> Action {
        if let Some(first) = self.pending.take() {
            return self.handle_sequence(first, chord);
        }
        match chord {
            (KeyCode::Enter, _)
            | (KeyCode::Char('l'), KeyModifiers::NONE)
            | (KeyCode::Right, _) => Action::OpenConversation,
            (KeyCode::Tab, _) => Action::FocusMessages,
            (KeyCode::Char('q'), KeyModifiers::NONE) => Action::Quit,
            _ => self.handle_common(chord),
        }
    }

    fn handle_messages(&mut self, chord: Chord) -> Action {
        if let Some(first) = self.pending.take() {
            return self.handle_sequence(first, chord);
        }
        match chord {
            (KeyCode::Esc, _)
            | (KeyCode::Tab, _)
            | (KeyCode::Char('h'), KeyModifiers::NONE)
            | (KeyCode::Left, _)
            | (KeyCode::Char('q'), KeyModifiers::NONE) => Action::FocusList,
            (KeyCode::Char(' '), KeyModifiers::NONE) => Action::ScrollDown,
            (KeyCode::Backspace, _) => Action::ScrollUp,
            (KeyCode::Char('d'), KeyModifiers::NONE) => Action::DeleteMessage,
            (KeyCode::Char('y'), KeyModifiers::NONE) => Action::YankMessage,
            (KeyCode::Char('o'), KeyModifiers::NONE) | (KeyCode::Enter, _) => Action::OpenMedia,
            _ => self.handle_common(chord),
        }
    }

    fn handle_sequence(&mut self, first: KeyCode, chord: Chord) -> Action {
        match (first, chord.0) {
            (KeyCode::Char('g'), KeyCode::Char('g')) => Action::JumpTop,
            _ => Action::Noop,
        }
    }

    fn handle_compose(&mut self, key: KeyEvent, chord: Chord) -> Action {
        match chord {
            (KeyCode::Esc, _) => Action::InputCancel,
            (KeyCode::Enter, KeyModifiers::NONE) => Action::InputSubmit,
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Action::Quit,
            _ => Action::Passthrough(key),
        }
    }

    fn handle_input(&mut self, chord: Chord) -> Action {
        match chord {
            (KeyCode::Esc, _) => Action::InputCancel,
            (KeyCode::Enter, _) => Action::InputSubmit,
            (KeyCode::Backspace, _) => Action::InputBackspace,
            // Allow Ctrl+C to quit even in input mode
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Action::Quit,
            (KeyCode::Char(c), m) if !m.contains(KeyModifiers::CONTROL) => Action::InputChar(c),
            _ => Action::Noop,
        }
    }

    /// Cancel any pending sequence (e.g., on timeout).
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_display(&self) -> Option<&str> {
        match self.pending {
            Some(KeyCode::Char('g')) => Some("g"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn list_navigation() {
        let mut km = KeyMapper::new();
        assert_eq!(km.handle(key(KeyCode::Char('j')), InputMode::List), Action::MoveDown);
        assert_eq!(km.handle(key(KeyCode::Up), InputMode::List), Action::MoveUp);
        assert_eq!(
            km.handle(key(KeyCode::Enter), InputMode::List),
            Action::OpenConversation
        );
        assert_eq!(km.handle(key(KeyCode::Char('q')), InputMode::List), Action::Quit);
    }

    #[test]
    fn gg_sequence() {
        let mut km = KeyMapper::new();
        assert_eq!(km.handle(key(KeyCode::Char('g')), InputMode::List), Action::Noop);
        assert!(km.has_pending());
        assert_eq!(km.pending_display(), Some("g"));
        assert_eq!(km.handle(key(KeyCode::Char('g')), InputMode::List), Action::JumpTop);
        assert!(!km.has_pending());
    }

    #[test]
    fn uppercase_with_or_without_shift() {
        let mut km = KeyMapper::new();
        let shifted = KeyEvent::new(KeyCode::Char('G'), KeyModifiers::SHIFT);
        assert_eq!(km.handle(shifted, InputMode::List), Action::JumpBottom);
        assert_eq!(km.handle(key(KeyCode::Char('G')), InputMode::List), Action::JumpBottom);
        let shifted_d = KeyEvent::new(KeyCode::Char('D'), KeyModifiers::SHIFT);
        assert_eq!(
            km.handle(shifted_d, InputMode::Messages),
            Action::DeleteConversation
        );
    }

    #[test]
    fn message_pane_keys() {
        let mut km = KeyMapper::new();
        assert_eq!(
            km.handle(key(KeyCode::Char('d')), InputMode::Messages),
            Action::DeleteMessage
        );
        assert_eq!(
            km.handle(key(KeyCode::Char('y')), InputMode::Messages),
            Action::YankMessage
        );
        assert_eq!(km.handle(key(KeyCode::Esc), InputMode::Messages), Action::FocusList);
        // 'd' does nothing destructive in the list.
        assert_eq!(km.handle(key(KeyCode::Char('d')), InputMode::List), Action::Noop);
    }

    #[test]
    fn compose_passes_keys_through() {
        let mut km = KeyMapper::new();
        let a = key(KeyCode::Char('a'));
        assert_eq!(km.handle(a, InputMode::Compose), Action::Passthrough(a));
        assert_eq!(km.handle(key(KeyCode::Enter), InputMode::Compose), Action::InputSubmit);
        let alt_enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT);
        assert_eq!(
            km.handle(alt_enter, InputMode::Compose),
            Action::Passthrough(alt_enter)
        );
        assert_eq!(km.handle(key(KeyCode::Esc), InputMode::Compose), Action::InputCancel);
    }

    #[test]
    fn text_input_modes() {
        let mut km = KeyMapper::new();
        assert_eq!(
            km.handle(key(KeyCode::Char('q')), InputMode::Search),
            Action::InputChar('q')
        );
        assert_eq!(km.handle(key(KeyCode::Down), InputMode::Search), Action::MoveDown);
        assert_eq!(
            km.handle(key(KeyCode::Backspace), InputMode::Prompt),
            Action::InputBackspace
        );
        assert_eq!(km.handle(ctrl('c'), InputMode::Prompt), Action::Quit);
    }

    #[test]
    fn confirm_answers() {
        let mut km = KeyMapper::new();
        assert_eq!(km.handle(key(KeyCode::Char('y')), InputMode::Confirm), Action::ConfirmYes);
        assert_eq!(km.handle(key(KeyCode::Esc), InputMode::Confirm), Action::ConfirmNo);
        assert_eq!(km.handle(key(KeyCode::Char('x')), InputMode::Confirm), Action::Noop);
    }

    #[test]
    fn parse_key_forms() {
        assert_eq!(
            parse_key("ctrl+r"),
            Some((KeyCode::Char('r'), KeyModifiers::CONTROL))
        );
        assert_eq!(parse_key("F5"), Some((KeyCode::F(5), KeyModifiers::NONE)));
        assert_eq!(parse_key("space"), Some((KeyCode::Char(' '), KeyModifiers::NONE)));
        assert_eq!(parse_key("shift+x"), Some((KeyCode::Char('X'), KeyModifiers::NONE)));
        assert_eq!(parse_key("F13"), None);
        assert_eq!(parse_key("hyper+x"), None);
        assert_eq!(parse_key("wat"), None);
    }

    #[test]
    fn custom_bindings_global_and_per_pane() {
        let mut bindings = BindingsSection::default();
        bindings.global.insert("F5".into(), "refresh".into());
        bindings.messages.insert("x".into(), "delete-message".into());
        bindings.list.insert("F5".into(), "search".into());

        let mut km = KeyMapper::new();
        assert!(km.load_bindings(&bindings).is_empty());
        assert_eq!(km.handle(key(KeyCode::F(5)), InputMode::Messages), Action::Refresh);
        assert_eq!(km.handle(key(KeyCode::F(5)), InputMode::List), Action::EnterSearch);
        assert_eq!(
            km.handle(key(KeyCode::Char('x')), InputMode::Messages),
            Action::DeleteMessage
        );
        assert_eq!(km.handle(key(KeyCode::Char('x')), InputMode::List), Action::Noop);
    }

    #[test]
    fn bad_bindings_reported() {
        let mut bindings = BindingsSection::default();
        bindings.global.insert("F5".into(), "explode".into());
        bindings.global.insert("wat".into(), "refresh".into());
        let mut km = KeyMapper::new();
        let problems = km.load_bindings(&bindings);
        assert_eq!(problems.len(), 2);
        assert_eq!(km.handle(key(KeyCode::F(5)), InputMode::List), Action::Noop);
    }
}
