//! Stream descriptors and playback plans
//!
//! The source resolver hands over one of two JSON shapes:
//!
//! ```json
//! { "sources": [{"url": "...", "isM3U8": true, "quality": "auto"}],
//!   "subtitles": [{"url": "...", "lang": "English"}],
//!   "intro": {"start": 90, "end": 180}, "headers": {"Referer": "..."} }
//!
//! { "type": "embed", "servers": [{"name": "vidstream", "url": "..."}] }
//! ```
//!
//! Embeds are rendered in an opaque frame and never reach the engine.

use crate::error::{Error, Result};
use crate::types::{EmbedServer, EmbedSource, StreamSource, SubtitleTrack, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EmbedTag {
    Embed,
}

/// Embed provider descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedDescriptor {
    #[serde(rename = "type")]
    kind: EmbedTag,
    pub servers: Vec<EmbedServer>,
}

/// One candidate stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    #[serde(rename = "isM3U8", default)]
    pub is_m3u8: bool,
    #[serde(default)]
    pub quality: Option<String>,
}

/// One native subtitle file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    pub url: String,
    pub lang: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Directly playable descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectDescriptor {
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub subtitles: Vec<SubtitleEntry>,
    #[serde(default)]
    pub intro: Option<TimeWindow>,
    #[serde(default)]
    pub outro: Option<TimeWindow>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl DirectDescriptor {
    fn referer(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("referer"))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Preferred source: `default`/`auto` quality, else first adaptive, else first
    fn preferred_source(&self) -> Option<&SourceEntry> {
        self.sources
            .iter()
            .find(|s| {
                s.quality
                    .as_deref()
                    .map(|q| q.eq_ignore_ascii_case("default") || q.eq_ignore_ascii_case("auto"))
                    .unwrap_or(false)
            })
            .or_else(|| self.sources.iter().find(|s| s.is_m3u8))
            .or_else(|| self.sources.first())
    }
}

/// Descriptor as delivered by the source resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamDescriptor {
    Embed(EmbedDescriptor),
    Direct(DirectDescriptor),
}

impl StreamDescriptor {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decide how the episode is played
    pub fn plan(&self) -> Result<PlaybackPlan> {
        match self {
            StreamDescriptor::Embed(embed) => {
                if embed.servers.is_empty() {
                    return Err(Error::SourceUnavailable(
                        "embed descriptor lists no servers".to_string(),
                    ));
                }
                Ok(PlaybackPlan::Embed(EmbedSource {
                    servers: embed.servers.clone(),
                }))
            }
            StreamDescriptor::Direct(direct) => {
                let entry = direct.preferred_source().ok_or(Error::NoSource)?;

                let mut source = if entry.is_m3u8 {
                    StreamSource::adaptive(&entry.url)
                } else {
                    StreamSource::progressive(&entry.url)
                };
                if let Some(referer) = direct.referer() {
                    source = source.with_referer(referer);
                }

                let subtitles: Vec<SubtitleTrack> = direct
                    .subtitles
                    .iter()
                    .map(|entry| {
                        let track = SubtitleTrack::native(&entry.lang, &entry.url);
                        match &entry.label {
                            Some(label) => track.with_label(label),
                            None => track,
                        }
                    })
                    .filter(|track| !track.is_thumbnail())
                    .collect();

                debug!(
                    url = %source.url,
                    adaptive = source.is_adaptive_manifest,
                    subtitles = subtitles.len(),
                    "Direct playback planned"
                );

                Ok(PlaybackPlan::Engine(DirectPlan {
                    source,
                    subtitles,
                    intro: direct.intro.filter(|w| !w.is_empty()),
                    outro: direct.outro.filter(|w| !w.is_empty()),
                }))
            }
        }
    }
}

/// Everything the controller needs for engine playback
#[derive(Debug, Clone, PartialEq)]
pub struct DirectPlan {
    pub source: StreamSource,
    /// Native tracks, thumbnails excluded
    pub subtitles: Vec<SubtitleTrack>,
    pub intro: Option<TimeWindow>,
    pub outro: Option<TimeWindow>,
}

/// Playback strategy; the two are mutually exclusive
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackPlan {
    /// Opaque third-party frame; no engine, subtitles or persistence
    Embed(EmbedSource),
    /// Adaptive stream engine
    Engine(DirectPlan),
}

impl PlaybackPlan {
    pub fn is_embed(&self) -> bool {
        matches!(self, PlaybackPlan::Embed(_))
    }
}
