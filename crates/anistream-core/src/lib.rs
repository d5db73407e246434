//! Anistream Core - Episode Playback Engine
//!
//! This crate provides the core functionality for episode playback:
//! - Adaptive stream engine with bounded error recovery
//! - Subtitle fetch, parsing, synchronization and external search
//! - Playback session state machine with keyboard control
//! - Resume positions and durable player preferences
//!
//! The render surface and the adaptive demuxer are host capabilities
//! ([`engine::MediaElement`], [`engine::Demuxer`]); this crate drives them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Anistream Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │  Descriptor  │  │   Subtitle   │  │   Adaptive   │           │
//! │  │   (plan)     │  │   Pipeline   │  │    Engine    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │ Controller  │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │   Position   │  │    Event    │  │ Preferences  │            │
//! │  │    Store     │  │  Channels   │  │    Store     │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod descriptor;
pub mod engine;
pub mod error;
pub mod presets;
pub mod proxy;
pub mod session;
pub mod store;
pub mod subtitles;
pub mod types;

pub use descriptor::{DirectPlan, PlaybackPlan, StreamDescriptor};
pub use engine::{
    Demuxer, DemuxerError, DemuxerErrorKind, DemuxerEvent, DemuxerFactory, EngineEvent,
    MediaElement, PlaybackMode, RenderSurface, StreamEngine,
};
pub use error::{Error, Result};
pub use presets::SubtitlePreset;
pub use proxy::ProxyGateway;
pub use session::{Episode, MediaEvent, PlaybackController, SessionEvent};
pub use store::{JsonFilePreferences, MemoryPreferences, PositionStore, PreferencesStore, SessionPositionStore};
pub use subtitles::{SubtitlePipeline, SubtitleSearch};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library
pub fn init() {
    tracing::info!(version = VERSION, "Anistream Core initialized");
}
