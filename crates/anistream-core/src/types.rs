//! Core types for Anistream

use crate::engine::{BufferConfig, RecoveryLimits};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an episode, as handed over by the source resolver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpisodeId(pub String);

impl EpisodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EpisodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A playable stream handed to the adaptive stream engine.
///
/// Immutable once assigned to an engine instance: switching streams means
/// destroying the engine and initializing a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    /// Manifest or progressive file URL
    pub url: String,
    /// True for HLS manifests
    pub is_adaptive_manifest: bool,
    /// Referer the upstream host expects; requests go through the proxy gateway
    pub referer_override: Option<String>,
}

impl StreamSource {
    /// Adaptive (HLS) source
    pub fn adaptive(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_adaptive_manifest: true,
            referer_override: None,
        }
    }

    /// Progressive (single file) source
    pub fn progressive(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_adaptive_manifest: false,
            referer_override: None,
        }
    }

    /// Set the referer override
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer_override = Some(referer.into());
        self
    }
}

/// One server of an embed provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedServer {
    pub name: String,
    pub url: String,
}

/// Source exposed only as an opaque third-party frame
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmbedSource {
    pub servers: Vec<EmbedServer>,
}

impl EmbedSource {
    /// Frame URL for the given server, falling back to the first one
    pub fn frame_url(&self, server_index: usize) -> Option<&str> {
        self.servers
            .get(server_index)
            .or_else(|| self.servers.first())
            .map(|s| s.url.as_str())
    }
}

/// Where a subtitle track came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleOrigin {
    /// Shipped with the stream descriptor
    Native,
    /// Found through the external subtitle search
    External,
}

impl std::fmt::Display for SubtitleOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtitleOrigin::Native => write!(f, "native"),
            SubtitleOrigin::External => write!(f, "external"),
        }
    }
}

/// Subtitle track available for the current episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Unique within a merged track list
    pub id: String,
    /// Language label as provided by the source ("English", "Spanish (Latin America)")
    pub lang: String,
    /// URL of the subtitle file
    pub url: String,
    /// Display label
    pub label: Option<String>,
    pub origin: SubtitleOrigin,
    /// Provider of an external track
    pub source: Option<String>,
}

impl SubtitleTrack {
    /// Create a native track
    pub fn native(lang: impl Into<String>, url: impl Into<String>) -> Self {
        let lang = lang.into();
        Self {
            id: format!("native:{}", lang),
            lang,
            url: url.into(),
            label: None,
            origin: SubtitleOrigin::Native,
            source: None,
        }
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label shown to the user
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.lang)
    }

    /// Thumbnail sprite tracks are shipped alongside subtitles by some providers
    pub fn is_thumbnail(&self) -> bool {
        let lang = self.lang.to_lowercase();
        let label = self.label.as_deref().unwrap_or("").to_lowercase();
        lang.contains("thumbnail") || label.contains("thumbnail")
    }
}

/// Timed subtitle text block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Plain text, markup stripped
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Inclusive on both ends
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time <= self.end
    }
}

/// One adaptive-bitrate rendition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityLevel {
    /// Rendition index as known by the demuxer
    pub index: i32,
    pub height: u32,
    pub width: u32,
    /// Bits per second
    pub bitrate: u64,
}

impl QualityLevel {
    pub fn new(index: i32, width: u32, height: u32, bitrate: u64) -> Self {
        Self {
            index,
            height,
            width,
            bitrate,
        }
    }

    /// Returns quality tier name
    pub fn quality_name(&self) -> &'static str {
        match self.height {
            0 => "audio",
            1..=240 => "240p",
            241..=360 => "360p",
            361..=480 => "480p",
            481..=720 => "720p",
            721..=1080 => "1080p",
            1081..=1440 => "1440p",
            _ => "4K",
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}x{}, {} kbps)",
            self.quality_name(),
            self.width,
            self.height,
            self.bitrate / 1000
        )
    }
}

/// Error counters scoped to one engine instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounters {
    pub media_error_count: u32,
    pub codec_error_count: u32,
    /// Periodic counter, reset whenever a level switch mitigation runs
    pub frag_parsing_error_count: u32,
    /// Cumulative fragment parsing errors since `init`
    pub frag_parsing_total: u32,
}

impl ErrorCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Why an engine gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FatalReason {
    /// Stream format or codec incompatible with this runtime
    #[serde(rename = "codecError")]
    CodecError,
    /// Media pipeline could not be recovered
    #[serde(rename = "playerError")]
    PlayerError,
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalReason::CodecError => write!(f, "codecError"),
            FatalReason::PlayerError => write!(f, "playerError"),
        }
    }
}

/// Playback session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerState {
    /// No source assigned
    Idle,
    /// Engine initialized, waiting for quality levels
    Loading,
    /// Levels known, ready to play
    Ready,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Stalled on buffer underrun
    Buffering,
    /// Playback reached the end
    Ended,
    /// Engine reported a fatal error
    Error,
}

impl PlayerState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlayerState) -> bool {
        use PlayerState::*;
        if target == Error {
            return true;
        }
        matches!(
            (self, target),
            // From Idle
            (Idle, Loading) |
            // From Loading
            (Loading, Ready) |
            // From Ready
            (Ready, Playing) |
            // From Playing
            (Playing, Paused) | (Playing, Buffering) | (Playing, Ended) |
            // From Paused
            (Paused, Playing) |
            // From Buffering
            (Buffering, Playing) | (Buffering, Paused) |
            // From Ended
            (Ended, Playing) |
            // From Error (explicit retry)
            (Error, Loading)
        )
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Loading => write!(f, "loading"),
            PlayerState::Ready => write!(f, "ready"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::Ended => write!(f, "ended"),
            PlayerState::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of playback as exposed to the UI chrome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_time: f64,
    pub duration: f64,
    pub is_playing: bool,
    pub is_buffering: bool,
    /// 0.0 - 1.0
    pub volume: f64,
    pub muted: bool,
    pub fullscreen: bool,
    /// -1 = automatic selection
    pub selected_level: i32,
    /// Id of the selected subtitle track
    pub selected_subtitle: Option<String>,
    /// Text of the cue active at `current_time`
    pub active_cue_text: String,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: 0.0,
            is_playing: false,
            is_buffering: false,
            volume: 1.0,
            muted: false,
            fullscreen: false,
            selected_level: -1,
            selected_subtitle: None,
            active_cue_text: String::new(),
        }
    }
}

/// Saved playback offset for one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPosition {
    pub episode_id: EpisodeId,
    pub offset_seconds: f64,
    pub saved_at: DateTime<Utc>,
}

/// Durable player preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerPreferences {
    pub volume: f64,
    pub muted: bool,
    pub subtitle_preset_id: String,
    /// Label of the subtitle track the user picked last
    pub subtitle_language: Option<String>,
}

impl Default for PlayerPreferences {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            subtitle_preset_id: crate::presets::DEFAULT_PRESET_ID.to_string(),
            subtitle_language: None,
        }
    }
}

impl PlayerPreferences {
    /// Apply a partial update
    pub fn apply(&mut self, patch: PreferencesPatch) {
        if let Some(volume) = patch.volume {
            self.volume = volume.clamp(0.0, 1.0);
        }
        if let Some(muted) = patch.muted {
            self.muted = muted;
        }
        if let Some(preset) = patch.subtitle_preset_id {
            self.subtitle_preset_id = preset;
        }
        if let Some(language) = patch.subtitle_language {
            self.subtitle_language = Some(language);
        }
    }
}

/// Partial preferences update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferencesPatch {
    pub volume: Option<f64>,
    pub muted: Option<bool>,
    pub subtitle_preset_id: Option<String>,
    pub subtitle_language: Option<String>,
}

/// Intro or outro range flagged by the source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }

    /// Providers send `{0, 0}` when there is no window
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Demuxer buffer tuning
    pub buffer: BufferConfig,
    /// Error recovery bounds
    pub recovery: RecoveryLimits,
    /// Keyboard seek step (seconds)
    pub seek_step: f64,
    /// Keyboard volume step
    pub volume_step: f64,
    /// Saved offsets at or below this are not restored (seconds)
    pub resume_threshold: f64,
    /// Remaining time under which an episode counts as completed (seconds)
    pub completion_window: f64,
    /// Minimum wall time between position snapshots
    #[serde(with = "duration_secs")]
    pub snapshot_interval: Duration,
    /// Minimum playback progress between position snapshots (seconds)
    pub snapshot_min_progress: f64,
    /// Buffer sampling period
    #[serde(with = "duration_secs")]
    pub sample_interval: Duration,
    /// Base URL of the CORS proxy gateway
    pub proxy_base: Option<Url>,
    /// Base URL of the external subtitle search service
    pub subtitle_search_base: Option<Url>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            recovery: RecoveryLimits::default(),
            seek_step: 10.0,
            volume_step: 0.1,
            resume_threshold: 5.0,
            completion_window: 10.0,
            snapshot_interval: Duration::from_secs(5),
            snapshot_min_progress: 5.0,
            sample_interval: Duration::from_secs(1),
            proxy_base: None,
            subtitle_search_base: None,
            request_timeout_ms: 15_000,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlayerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.seek_step <= 0.0 {
            return Err(Error::InvalidConfig("seek_step must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.volume_step) || self.volume_step == 0.0 {
            return Err(Error::InvalidConfig(
                "volume_step must be within (0, 1]".to_string(),
            ));
        }
        if self.buffer.max_buffer_length > self.buffer.max_max_buffer_length {
            return Err(Error::InvalidConfig(
                "buffer target exceeds buffer ceiling".to_string(),
            ));
        }
        if self.sample_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "sample_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
