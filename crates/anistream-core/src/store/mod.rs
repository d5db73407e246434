//! Position and preference persistence

mod position;
mod preferences;

pub use position::{PositionStore, SessionPositionStore};
pub use preferences::{JsonFilePreferences, MemoryPreferences, PreferencesStore};
