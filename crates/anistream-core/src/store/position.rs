//! Session-scoped playback positions
//!
//! Offsets live for the session only (the browser build keeps them in
//! session storage). Restoring and clearing policy belongs to the session
//! controller; the store only keeps numbers.

use crate::types::{EpisodeId, PersistedPosition};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Per-episode playback offsets
pub trait PositionStore: Send + Sync {
    fn save(&self, episode: &EpisodeId, offset_seconds: f64);

    /// Saved entry, if any
    fn entry(&self, episode: &EpisodeId) -> Option<PersistedPosition>;

    fn clear(&self, episode: &EpisodeId);

    /// Saved offset in seconds, `0.0` when nothing is stored
    fn get(&self, episode: &EpisodeId) -> f64 {
        self.entry(episode).map(|p| p.offset_seconds).unwrap_or(0.0)
    }
}

/// In-memory store living as long as the session
#[derive(Debug, Default)]
pub struct SessionPositionStore {
    positions: RwLock<HashMap<EpisodeId, PersistedPosition>>,
}

impl SessionPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PositionStore for SessionPositionStore {
    fn save(&self, episode: &EpisodeId, offset_seconds: f64) {
        if !offset_seconds.is_finite() || offset_seconds < 0.0 {
            return;
        }
        debug!(episode = %episode, offset = offset_seconds, "Position saved");
        self.positions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                episode.clone(),
                PersistedPosition {
                    episode_id: episode.clone(),
                    offset_seconds,
                    saved_at: Utc::now(),
                },
            );
    }

    fn entry(&self, episode: &EpisodeId) -> Option<PersistedPosition> {
        self.positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(episode)
            .cloned()
    }

    fn clear(&self, episode: &EpisodeId) {
        if self
            .positions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(episode)
            .is_some()
        {
            debug!(episode = %episode, "Position cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_get_clear() {
        let store = SessionPositionStore::new();
        let episode = EpisodeId::from("frieren-3");

        assert_eq!(store.get(&episode), 0.0);
        store.save(&episode, 734.5);
        assert_eq!(store.get(&episode), 734.5);
        assert_eq!(store.entry(&episode).unwrap().episode_id, episode);

        store.save(&episode, 800.0);
        assert_eq!(store.get(&episode), 800.0);
        assert_eq!(store.len(), 1);

        store.clear(&episode);
        assert_eq!(store.get(&episode), 0.0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_rejects_invalid_offsets() {
        let store = SessionPositionStore::new();
        let episode = EpisodeId::from("frieren-3");
        store.save(&episode, f64::NAN);
        store.save(&episode, -1.0);
        assert!(store.entry(&episode).is_none());
    }
}
