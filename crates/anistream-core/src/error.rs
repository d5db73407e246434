//! Error types for Anistream Core

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    // Source errors
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Embed sources are rendered externally and cannot be bound to an engine")]
    EmbedSource,

    #[error("Render surface {surface} already has a bound engine")]
    SurfaceBusy { surface: String },

    #[error("Engine has been destroyed")]
    EngineDestroyed,

    // Quality errors
    #[error("Invalid quality level {index} ({available} levels available)")]
    InvalidLevel { index: i32, available: usize },

    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    // Subtitle errors
    #[error("Failed to load subtitles from {url}: {reason}")]
    SubtitleLoad { url: String, reason: String },

    #[error("Subtitle search failed: {0}")]
    SubtitleSearch(String),

    // Playback errors
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("No source loaded")]
    NoSource,

    // Preferences errors
    #[error("Preferences storage error: {0}")]
    Preferences(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Host capability errors (demuxer, render surface)
    #[error("Host error: {0}")]
    Host(#[from] anyhow::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a subtitle load error
    pub fn subtitle_load(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::SubtitleLoad {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error is recoverable without a fresh `init`
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::SubtitleLoad { .. }
                | Error::SubtitleSearch(_)
                | Error::Network(_)
                | Error::InvalidLevel { .. }
                | Error::Preferences(_)
        )
    }

    /// Returns the error code surfaced to the UI chrome
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            Error::EmbedSource => "EMBED_SOURCE",
            Error::SurfaceBusy { .. } => "SURFACE_BUSY",
            Error::EngineDestroyed => "ENGINE_DESTROYED",
            Error::InvalidLevel { .. } => "INVALID_LEVEL",
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::SubtitleLoad { .. } => "SUBTITLE_LOAD",
            Error::SubtitleSearch(_) => "SUBTITLE_SEARCH",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::NoSource => "NO_SOURCE",
            Error::Preferences(_) => "PREFERENCES",
            Error::Network(_) => "NETWORK",
            Error::Url(_) => "INVALID_URL",
            Error::Host(_) => "HOST",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtitle_errors_are_recoverable() {
        let err = Error::subtitle_load("https://cdn.example.com/ep1.vtt", "404");
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "SUBTITLE_LOAD");
    }

    #[test]
    fn test_source_errors_are_not_recoverable() {
        let err = Error::SourceUnavailable("empty url".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
    }
}
