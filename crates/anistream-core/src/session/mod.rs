//! Playback session control and keyboard input

mod controller;
mod input;

pub use controller::{Episode, MediaEvent, NextEpisodeHandler, PlaybackController, SessionEvent};
pub use input::{key_action, Key, KeyAction, KeyInput};
