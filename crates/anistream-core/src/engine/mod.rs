//! Adaptive Stream Engine
//!
//! Wraps the host's adaptive demuxer (hls.js in the browser build), binds it
//! to a render surface, surfaces quality levels and runs the bounded error
//! recovery state machine.
//!
//! The demuxer is an opaque capability: the engine only drives it through
//! [`Demuxer`] and learns about it through [`DemuxerEvent`]s fed by the host.

mod buffer;
mod classify;
mod levels;
#[cfg(feature = "hls")]
pub mod probe;
mod recovery;
mod surface;

pub use buffer::{BufferConfig, BufferSampler};
pub use classify::{classify, ErrorClass};
pub use levels::{adjacent_level, alternate_level, sort_levels};
pub use recovery::{RecoveryAction, RecoveryLimits, RecoveryPolicy};
pub use surface::{MediaElement, RenderSurface};

use crate::error::{Error, Result};
use crate::proxy::ProxyGateway;
use crate::types::{ErrorCounters, FatalReason, PlayerConfig, QualityLevel, SessionId, StreamSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surface::SurfaceBinding;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Adaptive demuxer session (host implemented)
pub trait Demuxer: Send {
    /// Start loading a manifest
    fn load_source(&mut self, url: &str);

    /// Restart manifest/fragment loading after a network failure
    fn start_load(&mut self);

    /// Re-initialize the media pipeline
    fn recover_media_error(&mut self);

    /// Switch to the alternate audio codec path
    fn swap_audio_codec(&mut self);

    /// Pin a rendition; -1 re-enables bandwidth-adaptive selection
    fn set_level(&mut self, index: i32);

    /// Release every resource, including in-flight fragment requests
    fn destroy(&mut self);
}

/// Creates demuxer sessions bound to a media element (host implemented)
pub trait DemuxerFactory: Send + Sync {
    /// False when the runtime has no usable adaptive demuxer
    fn is_supported(&self) -> bool;

    fn create(
        &self,
        element: Arc<dyn MediaElement>,
        config: &BufferConfig,
    ) -> anyhow::Result<Box<dyn Demuxer>>;
}

/// How the bound source is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Through the adaptive demuxer
    Adaptive,
    /// Manifest URL assigned directly to a natively capable surface
    Native,
    /// Single file assigned directly to the surface
    Progressive,
}

/// Fragment metadata reported by the demuxer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentMeta {
    /// Media sequence number
    pub sn: u64,
    /// Rendition the fragment belongs to
    pub level: i32,
    pub url: String,
    /// Seconds
    pub duration: f64,
}

/// Raw demuxer error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemuxerErrorKind {
    Network,
    Media,
    Mux,
    Other,
}

/// Raw demuxer error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemuxerError {
    pub kind: DemuxerErrorKind,
    /// Demuxer-specific detail code, e.g. `fragParsingError`
    pub details: String,
    pub fatal: bool,
    pub fragment: Option<FragmentMeta>,
}

/// Events the host forwards from its demuxer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DemuxerEvent {
    ManifestParsed { levels: Vec<QualityLevel> },
    LevelSwitched { index: i32 },
    FragmentLoaded(FragmentMeta),
    Error(DemuxerError),
}

/// Fragment failure surfaced to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentErrorMeta {
    pub details: String,
    pub fragment: Option<FragmentMeta>,
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Levels sorted by descending resolution
    LevelsAvailable(Vec<QualityLevel>),
    LevelSwitched(i32),
    FragmentLoaded(FragmentMeta),
    FragmentError(FragmentErrorMeta),
    /// The engine destroyed itself; a fresh `init` is required
    Fatal(FatalReason),
}

/// One engine instance bound to one render surface
pub struct StreamEngine {
    id: SessionId,
    source: StreamSource,
    mode: PlaybackMode,
    binding: Option<SurfaceBinding>,
    demuxer: Option<Box<dyn Demuxer>>,
    levels: Vec<QualityLevel>,
    /// User/recovery pin, -1 = auto
    selected_level: i32,
    /// Rendition the demuxer reports as playing
    current_level: i32,
    recovery: RecoveryPolicy,
    events: broadcast::Sender<EngineEvent>,
    sampler: Option<BufferSampler>,
    fatal: Option<FatalReason>,
}

impl StreamEngine {
    /// Classify `source` and bind it to `surface`
    #[instrument(skip_all, fields(url = %source.url, adaptive = source.is_adaptive_manifest))]
    pub fn init(
        source: StreamSource,
        surface: &Arc<RenderSurface>,
        factory: &dyn DemuxerFactory,
        config: &PlayerConfig,
    ) -> Result<Self> {
        let url = Self::effective_url(&source, config)?;
        let element = Arc::clone(surface.element());

        let mode = if !source.is_adaptive_manifest {
            PlaybackMode::Progressive
        } else if factory.is_supported() {
            PlaybackMode::Adaptive
        } else if element.can_play_adaptive_natively() {
            PlaybackMode::Native
        } else {
            return Err(Error::SourceUnavailable(
                "runtime cannot play adaptive manifests".to_string(),
            ));
        };

        let binding = surface.claim()?;

        let demuxer = match mode {
            PlaybackMode::Adaptive => {
                let mut demuxer = factory.create(Arc::clone(&element), &config.buffer)?;
                demuxer.load_source(&url);
                Some(demuxer)
            }
            PlaybackMode::Native | PlaybackMode::Progressive => {
                element.set_source(&url);
                None
            }
        };

        let (events, _) = broadcast::channel(64);
        let sampler = BufferSampler::spawn(Arc::clone(binding.element()), config.sample_interval);

        let engine = Self {
            id: SessionId::new(),
            source,
            mode,
            binding: Some(binding),
            demuxer,
            levels: Vec::new(),
            selected_level: -1,
            current_level: -1,
            recovery: RecoveryPolicy::new(config.recovery.clone()),
            events,
            sampler,
            fatal: None,
        };

        info!(engine = %engine.id, mode = ?mode, surface = %surface.id(), "Engine initialized");
        Ok(engine)
    }

    /// URL actually handed to the demuxer or surface
    fn effective_url(source: &StreamSource, config: &PlayerConfig) -> Result<String> {
        let trimmed = source.url.trim();
        if trimmed.is_empty() {
            return Err(Error::SourceUnavailable("empty source url".to_string()));
        }
        if Url::parse(trimmed).is_err() && !trimmed.starts_with('/') {
            return Err(Error::SourceUnavailable(format!(
                "unparsable source url: {}",
                trimmed
            )));
        }

        match (&config.proxy_base, source.referer_override.as_deref()) {
            (Some(base), Some(referer)) => {
                let proxy = ProxyGateway::new(base)?;
                Ok(proxy.route(trimmed, Some(referer)))
            }
            _ => Ok(trimmed.to_string()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Buffer-length samples, while the sampler runs
    pub fn buffer_samples(&self) -> Option<watch::Receiver<f64>> {
        self.sampler.as_ref().map(|s| s.subscribe())
    }

    /// Levels sorted by descending resolution
    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    /// Pinned level, -1 when automatic
    pub fn selected_level(&self) -> i32 {
        self.selected_level
    }

    /// Level the demuxer reports as playing
    pub fn current_level(&self) -> i32 {
        self.current_level
    }

    pub fn counters(&self) -> ErrorCounters {
        self.recovery.counters()
    }

    pub fn fatal_reason(&self) -> Option<FatalReason> {
        self.fatal
    }

    pub fn is_destroyed(&self) -> bool {
        self.binding.is_none()
    }

    /// Pin rendition `index`, or -1 for automatic selection
    pub fn set_level(&mut self, index: i32) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::EngineDestroyed);
        }
        if index != -1 && !self.levels.iter().any(|l| l.index == index) {
            return Err(Error::InvalidLevel {
                index,
                available: self.levels.len(),
            });
        }

        self.selected_level = index;
        if index != -1 {
            self.current_level = index;
        }
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.set_level(index);
        }
        info!(level = index, "Quality level set");
        Ok(())
    }

    /// Process one demuxer event, returning what subscribers were sent
    pub fn handle_event(&mut self, event: DemuxerEvent) -> Vec<EngineEvent> {
        if self.is_destroyed() {
            debug!(event = ?event, "Event after destroy ignored");
            return Vec::new();
        }

        let emitted = match event {
            DemuxerEvent::ManifestParsed { mut levels } => {
                sort_levels(&mut levels);
                info!(levels = levels.len(), "Quality levels available");
                self.levels = levels.clone();
                if self.selected_level != -1
                    && !self.levels.iter().any(|l| l.index == self.selected_level)
                {
                    self.selected_level = -1;
                }
                vec![EngineEvent::LevelsAvailable(levels)]
            }
            DemuxerEvent::LevelSwitched { index } => {
                self.current_level = index;
                debug!(level = index, "Level switched");
                vec![EngineEvent::LevelSwitched(index)]
            }
            DemuxerEvent::FragmentLoaded(meta) => {
                debug!(sn = meta.sn, level = meta.level, "Fragment loaded");
                vec![EngineEvent::FragmentLoaded(meta)]
            }
            DemuxerEvent::Error(error) => self.handle_error(error),
        };

        for event in &emitted {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
        }
        emitted
    }

    fn handle_error(&mut self, error: DemuxerError) -> Vec<EngineEvent> {
        let mut emitted = Vec::new();
        if error.fragment.is_some() || error.details.to_ascii_lowercase().contains("frag") {
            emitted.push(EngineEvent::FragmentError(FragmentErrorMeta {
                details: error.details.clone(),
                fragment: error.fragment.clone(),
            }));
        }

        let Some(class) = classify(&error) else {
            debug!(details = %error.details, "Non-fatal demuxer error left to demuxer");
            return emitted;
        };

        let action = self
            .recovery
            .on_error(class, &self.levels, self.current_level);

        match action {
            RecoveryAction::Ignore => {}
            RecoveryAction::RestartLoad => {
                warn!(details = %error.details, "Network error, restarting load");
                if let Some(demuxer) = self.demuxer.as_mut() {
                    demuxer.start_load();
                }
            }
            RecoveryAction::RecoverMedia => {
                warn!(details = %error.details, "Media error, recovering pipeline");
                if let Some(demuxer) = self.demuxer.as_mut() {
                    demuxer.recover_media_error();
                }
            }
            RecoveryAction::SwitchLevelAndRecover(target) => {
                warn!(details = %error.details, level = target, "Codec errors, switching level");
                self.pin_level(target);
                if let Some(demuxer) = self.demuxer.as_mut() {
                    demuxer.recover_media_error();
                }
            }
            RecoveryAction::SwapAudioCodecAndRecover => {
                warn!(details = %error.details, "Media error persists, swapping audio codec");
                if let Some(demuxer) = self.demuxer.as_mut() {
                    demuxer.swap_audio_codec();
                    demuxer.recover_media_error();
                }
            }
            RecoveryAction::SwitchLevel(target) => {
                warn!(details = %error.details, level = target, "Fragment parsing errors, toggling level");
                self.pin_level(target);
            }
            RecoveryAction::Fatal(reason) => {
                warn!(reason = %reason, details = %error.details, "Unrecoverable playback error");
                self.fatal = Some(reason);
                self.destroy();
                emitted.push(EngineEvent::Fatal(reason));
            }
        }

        emitted
    }

    fn pin_level(&mut self, index: i32) {
        self.selected_level = index;
        self.current_level = index;
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.set_level(index);
        }
    }

    /// Tear down the demuxer, sampler and surface binding. Idempotent.
    pub fn destroy(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };

        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
        }
        if let Some(mut demuxer) = self.demuxer.take() {
            demuxer.destroy();
        } else {
            binding.element().clear_source();
        }
        drop(binding);

        info!(engine = %self.id, "Engine destroyed");
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEngine")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("mode", &self.mode)
            .field("levels", &self.levels.len())
            .field("selected_level", &self.selected_level)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
