//! Durable player preferences
//!
//! Stored as JSON at `<config dir>/anistream/preferences.json`.

use crate::error::{Error, Result};
use crate::types::{PlayerPreferences, PreferencesPatch};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// Cross-session preference storage
pub trait PreferencesStore: Send + Sync {
    /// Stored preferences, defaults when nothing usable is stored
    fn load(&self) -> PlayerPreferences;

    /// Merge `patch` into the stored preferences and persist them
    fn save(&self, patch: PreferencesPatch) -> Result<PlayerPreferences>;
}

/// JSON file backend
#[derive(Debug, Clone)]
pub struct JsonFilePreferences {
    path: PathBuf,
}

impl JsonFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location (~/.config/anistream/preferences.json)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("anistream").join("preferences.json"))
    }

    /// Open the store at the default location
    pub fn open_default() -> Result<Self> {
        Self::default_path()
            .map(Self::new)
            .ok_or_else(|| Error::Preferences("Could not determine config directory".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferencesStore for JsonFilePreferences {
    fn load(&self) -> PlayerPreferences {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return PlayerPreferences::default(),
        };
        match serde_json::from_str(&content) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable preferences");
                PlayerPreferences::default()
            }
        }
    }

    fn save(&self, patch: PreferencesPatch) -> Result<PlayerPreferences> {
        let mut prefs = self.load();
        prefs.apply(patch);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Preferences(format!("{}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(&prefs)?;
        std::fs::write(&self.path, json)
            .map_err(|e| Error::Preferences(format!("{}: {}", self.path.display(), e)))?;

        debug!(path = %self.path.display(), "Preferences saved");
        Ok(prefs)
    }
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    prefs: RwLock<PlayerPreferences>,
}

impl MemoryPreferences {
    pub fn new(prefs: PlayerPreferences) -> Self {
        Self {
            prefs: RwLock::new(prefs),
        }
    }
}

impl PreferencesStore for MemoryPreferences {
    fn load(&self) -> PlayerPreferences {
        self.prefs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, patch: PreferencesPatch) -> Result<PlayerPreferences> {
        let mut prefs = self.prefs.write().unwrap_or_else(PoisonError::into_inner);
        prefs.apply(patch);
        Ok(prefs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::DEFAULT_PRESET_ID;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePreferences::new(dir.path().join("nested").join("prefs.json"));

        assert_eq!(store.load(), PlayerPreferences::default());

        let saved = store
            .save(PreferencesPatch {
                volume: Some(0.4),
                subtitle_preset_id: Some("yellow".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(saved.volume, 0.4);

        let reopened = JsonFilePreferences::new(store.path());
        let loaded = reopened.load();
        assert_eq!(loaded.volume, 0.4);
        assert_eq!(loaded.subtitle_preset_id, "yellow");
        assert!(!loaded.muted);

        reopened
            .save(PreferencesPatch {
                muted: Some(true),
                ..Default::default()
            })
            .unwrap();
        let loaded = store.load();
        assert!(loaded.muted);
        assert_eq!(loaded.volume, 0.4);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{ not json").unwrap();

        let prefs = JsonFilePreferences::new(&path).load();
        assert_eq!(prefs.subtitle_preset_id, DEFAULT_PRESET_ID);
        assert_eq!(prefs.volume, 1.0);
    }

    #[test]
    fn test_memory_store_clamps_volume() {
        let store = MemoryPreferences::default();
        let prefs = store
            .save(PreferencesPatch {
                volume: Some(1.7),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(prefs.volume, 1.0);
        assert_eq!(store.load().volume, 1.0);
    }
}
