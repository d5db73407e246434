//! Keyboard contract
//!
//! | Key              | Action                    |
//! |------------------|---------------------------|
//! | Space, K         | toggle play/pause         |
//! | M                | toggle mute               |
//! | F                | toggle fullscreen         |
//! | ArrowLeft/Right  | seek -/+ one seek step    |
//! | ArrowUp/Down     | volume +/- one volume step|
//!
//! Shortcuts are ignored while a text input has focus.

use serde::{Deserialize, Serialize};

/// Keys the controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Space,
    K,
    M,
    F,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value
    pub fn from_dom_key(key: &str) -> Option<Self> {
        match key {
            " " | "Spacebar" | "Space" => Some(Key::Space),
            "k" | "K" => Some(Key::K),
            "m" | "M" => Some(Key::M),
            "f" | "F" => Some(Key::F),
            "ArrowLeft" | "Left" => Some(Key::ArrowLeft),
            "ArrowRight" | "Right" => Some(Key::ArrowRight),
            "ArrowUp" | "Up" => Some(Key::ArrowUp),
            "ArrowDown" | "Down" => Some(Key::ArrowDown),
            _ => None,
        }
    }
}

/// A key press plus the focus context it happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    /// True when an `<input>`/`<textarea>` owns the keyboard
    pub text_input_focused: bool,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            text_input_focused: false,
        }
    }

    pub fn in_text_field(key: Key) -> Self {
        Self {
            key,
            text_input_focused: true,
        }
    }
}

/// What a key press asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    TogglePlay,
    ToggleMute,
    ToggleFullscreen,
    /// Relative seek in seconds
    SeekBy(f64),
    /// Relative volume change
    VolumeBy(f64),
}

/// Resolve a key press, `None` when it must be ignored
pub fn key_action(input: KeyInput, seek_step: f64, volume_step: f64) -> Option<KeyAction> {
    if input.text_input_focused {
        return None;
    }
    let action = match input.key {
        Key::Space | Key::K => KeyAction::TogglePlay,
        Key::M => KeyAction::ToggleMute,
        Key::F => KeyAction::ToggleFullscreen,
        Key::ArrowLeft => KeyAction::SeekBy(-seek_step),
        Key::ArrowRight => KeyAction::SeekBy(seek_step),
        Key::ArrowUp => KeyAction::VolumeBy(volume_step),
        Key::ArrowDown => KeyAction::VolumeBy(-volume_step),
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_keys() {
        assert_eq!(Key::from_dom_key(" "), Some(Key::Space));
        assert_eq!(Key::from_dom_key("K"), Some(Key::K));
        assert_eq!(Key::from_dom_key("ArrowDown"), Some(Key::ArrowDown));
        assert_eq!(Key::from_dom_key("Enter"), None);
    }

    #[test]
    fn test_actions() {
        assert_eq!(
            key_action(KeyInput::new(Key::ArrowLeft), 10.0, 0.1),
            Some(KeyAction::SeekBy(-10.0))
        );
        assert_eq!(
            key_action(KeyInput::new(Key::ArrowUp), 10.0, 0.1),
            Some(KeyAction::VolumeBy(0.1))
        );
        assert_eq!(key_action(KeyInput::new(Key::K), 10.0, 0.1), Some(KeyAction::TogglePlay));
    }

    #[test]
    fn test_suppressed_in_text_field() {
        assert_eq!(key_action(KeyInput::in_text_field(Key::Space), 10.0, 0.1), None);
        assert_eq!(key_action(KeyInput::in_text_field(Key::F), 10.0, 0.1), None);
    }
}
