//! Subtitle style presets
//!
//! A fixed set of overlay styles. The selected preset id is persisted with
//! the player preferences and rendered as an inline style on the cue overlay.
//!
//! # Usage
//!
//! ```rust
//! use anistream_core::presets::SubtitlePreset;
//!
//! let preset = SubtitlePreset::by_id("yellow");
//! assert!(preset.to_inline_style().contains("color: #ffd400"));
//! ```

use serde::Serialize;

/// Preset used when nothing (or an unknown id) is stored
pub const DEFAULT_PRESET_ID: &str = "classic";

/// Overlay style preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitlePreset {
    pub id: &'static str,
    pub name: &'static str,
    pub font_color: &'static str,
    /// `transparent` for outline-only styles
    pub background_color: &'static str,
    pub font_weight: u16,
    /// `none` when the preset has no shadow
    pub text_shadow: &'static str,
}

const PRESETS: &[SubtitlePreset] = &[
    SubtitlePreset {
        id: "classic",
        name: "Classic",
        font_color: "#ffffff",
        background_color: "rgba(0, 0, 0, 0.75)",
        font_weight: 500,
        text_shadow: "none",
    },
    SubtitlePreset {
        id: "yellow",
        name: "Yellow",
        font_color: "#ffd400",
        background_color: "rgba(0, 0, 0, 0.6)",
        font_weight: 600,
        text_shadow: "0 1px 2px rgba(0, 0, 0, 0.9)",
    },
    SubtitlePreset {
        id: "outline",
        name: "Outline",
        font_color: "#ffffff",
        background_color: "transparent",
        font_weight: 700,
        text_shadow: "-1px -1px 0 #000, 1px -1px 0 #000, -1px 1px 0 #000, 1px 1px 0 #000",
    },
    SubtitlePreset {
        id: "soft",
        name: "Soft",
        font_color: "#f6f2ff",
        background_color: "rgba(12, 10, 18, 0.55)",
        font_weight: 400,
        text_shadow: "0 0 6px rgba(0, 0, 0, 0.8)",
    },
    SubtitlePreset {
        id: "high-contrast",
        name: "High contrast",
        font_color: "#000000",
        background_color: "#ffffff",
        font_weight: 700,
        text_shadow: "none",
    },
];

impl SubtitlePreset {
    /// Every available preset, default first
    pub fn all() -> &'static [SubtitlePreset] {
        PRESETS
    }

    /// Look up a preset, falling back to the default for unknown ids
    pub fn by_id(id: &str) -> &'static SubtitlePreset {
        PRESETS
            .iter()
            .find(|p| p.id == id)
            .unwrap_or(&PRESETS[0])
    }

    pub fn is_known(id: &str) -> bool {
        PRESETS.iter().any(|p| p.id == id)
    }

    /// Inline style for the cue overlay element
    pub fn to_inline_style(&self) -> String {
        format!(
            "color: {}; background-color: {}; font-weight: {}; text-shadow: {};",
            self.font_color, self.background_color, self.font_weight, self.text_shadow
        )
    }
}

impl Default for SubtitlePreset {
    fn default() -> Self {
        Self::by_id(DEFAULT_PRESET_ID).clone()
    }
}
