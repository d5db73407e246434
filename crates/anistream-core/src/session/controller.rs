//! Playback session controller - main orchestrator for one render surface
//!
//! Coordinates:
//! - Engine lifecycle (init, retry, destroy) and quality selection
//! - The playback state machine
//! - Resume/clear of saved positions and throttled snapshots
//! - Subtitle selection and cue tracking
//! - Keyboard shortcuts, intro skip and next-episode hand-off

use super::input::{key_action, KeyAction, KeyInput};
use crate::descriptor::{DirectPlan, PlaybackPlan};
use crate::engine::{DemuxerEvent, DemuxerFactory, EngineEvent, PlaybackMode, RenderSurface, StreamEngine};
use crate::error::{Error, Result};
use crate::presets::SubtitlePreset;
use crate::proxy::ProxyGateway;
use crate::store::{PositionStore, PreferencesStore};
use crate::subtitles::{SubtitleFetcher, SubtitleOutcome, SubtitlePipeline};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Events for the UI chrome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    StateChanged { from: PlayerState, to: PlayerState },
    LevelsAvailable(Vec<QualityLevel>),
    /// Non-blocking "resumed from" notice
    ResumeNotice { offset: f64 },
    PositionSnapshot { episode: EpisodeId, offset: f64 },
    SubtitlesLoaded { track_id: String, cue_count: usize },
    /// Non-fatal notice; playback continues
    SubtitleUnavailable { track_id: String, reason: String },
    Fatal(FatalReason),
    Ended,
    /// The next-episode handler was invoked
    AutoAdvance { from: EpisodeId },
}

/// Events the host forwards from the render surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MediaEvent {
    LoadedMetadata { duration: f64 },
    DurationChange(f64),
    TimeUpdate(f64),
    /// Buffer underrun
    Waiting,
    /// Playback (re)started after a stall
    Playing,
    Ended,
}

/// An episode ready for engine playback
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub id: EpisodeId,
    pub plan: DirectPlan,
    pub has_next_episode: bool,
}

impl Episode {
    /// Wrap a plan; embed plans never reach the controller
    pub fn from_plan(id: EpisodeId, plan: PlaybackPlan, has_next_episode: bool) -> Result<Self> {
        match plan {
            PlaybackPlan::Engine(plan) => Ok(Self {
                id,
                plan,
                has_next_episode,
            }),
            PlaybackPlan::Embed(_) => Err(Error::EmbedSource),
        }
    }
}

/// Invoked when an episode ends and a next one exists
pub type NextEpisodeHandler = Box<dyn FnMut(&EpisodeId) + Send>;

struct Snapshot {
    at: Instant,
    offset: f64,
}

/// Playback session bound to one render surface
pub struct PlaybackController {
    id: SessionId,
    config: PlayerConfig,
    surface: Arc<RenderSurface>,
    factory: Arc<dyn DemuxerFactory>,
    positions: Arc<dyn PositionStore>,
    preferences: Arc<dyn PreferencesStore>,
    subtitles: SubtitlePipeline,
    engine: Option<StreamEngine>,
    episode: Option<Episode>,
    state: PlayerState,
    state_tx: watch::Sender<PlayerState>,
    playback: PlaybackState,
    playback_tx: watch::Sender<PlaybackState>,
    events: broadcast::Sender<SessionEvent>,
    /// Restore already attempted for the current engine instance
    restored: bool,
    last_snapshot: Option<Snapshot>,
    next_episode: Option<NextEpisodeHandler>,
}

impl PlaybackController {
    /// Create a controller; stored preferences seed volume and mute
    pub fn new(
        config: PlayerConfig,
        surface: Arc<RenderSurface>,
        factory: Arc<dyn DemuxerFactory>,
        positions: Arc<dyn PositionStore>,
        preferences: Arc<dyn PreferencesStore>,
        fetcher: Arc<dyn SubtitleFetcher>,
    ) -> Self {
        let prefs = preferences.load();
        let playback = PlaybackState {
            volume: prefs.volume.clamp(0.0, 1.0),
            muted: prefs.muted,
            ..Default::default()
        };

        let (state_tx, _) = watch::channel(PlayerState::Idle);
        let (playback_tx, _) = watch::channel(playback.clone());
        let (events, _) = broadcast::channel(64);

        Self {
            id: SessionId::new(),
            config,
            surface,
            factory,
            positions,
            preferences,
            subtitles: SubtitlePipeline::new(fetcher),
            engine: None,
            episode: None,
            state: PlayerState::Idle,
            state_tx,
            playback,
            playback_tx,
            events,
            restored: false,
            last_snapshot: None,
            next_episode: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn episode(&self) -> Option<&Episode> {
        self.episode.as_ref()
    }

    pub fn engine(&self) -> Option<&StreamEngine> {
        self.engine.as_ref()
    }

    pub fn subtitles(&self) -> &SubtitlePipeline {
        &self.subtitles
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<PlayerState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to playback snapshots
    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackState> {
        self.playback_tx.subscribe()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Register the next-episode handler
    pub fn on_next_episode(&mut self, handler: impl FnMut(&EpisodeId) + Send + 'static) {
        self.next_episode = Some(Box::new(handler));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.playback_tx.send_replace(self.playback.clone());
    }

    /// Transition to new state
    fn set_state(&mut self, new_state: PlayerState) -> Result<()> {
        let current = self.state;
        if current == new_state {
            return Ok(());
        }
        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }
        self.apply_state(new_state);
        Ok(())
    }

    fn apply_state(&mut self, new_state: PlayerState) {
        let current = self.state;
        self.state = new_state;
        self.playback.is_playing = new_state == PlayerState::Playing;
        self.playback.is_buffering = new_state == PlayerState::Buffering;
        self.state_tx.send_replace(new_state);
        self.publish();
        self.emit(SessionEvent::StateChanged {
            from: current,
            to: new_state,
        });
        info!(from = %current, to = %new_state, "State transition");
    }

    /// Load an episode, replacing whatever is playing
    #[instrument(skip(self, episode), fields(episode = %episode.id))]
    pub fn load(&mut self, episode: Episode) -> Result<()> {
        self.stop();

        let mut episode = episode;
        self.route_native_subtitles(&mut episode);
        info!(session_id = %self.id, url = %episode.plan.source.url, "Loading episode");

        self.subtitles.set_native_tracks(episode.plan.subtitles.clone());
        self.episode = Some(episode);
        self.start_engine()?;

        let preferred = self.preferences.load().subtitle_language;
        match self.subtitles.auto_select(preferred.as_deref()) {
            Ok(selected) => self.playback.selected_subtitle = selected,
            Err(e) => warn!(error = %e, "Subtitle auto-selection failed"),
        }
        self.publish();
        Ok(())
    }

    /// Native subtitle hosts want the same referer as the stream
    fn route_native_subtitles(&self, episode: &mut Episode) {
        let (Some(base), Some(referer)) = (
            self.config.proxy_base.as_ref(),
            episode.plan.source.referer_override.clone(),
        ) else {
            return;
        };
        match ProxyGateway::new(base) {
            Ok(proxy) => {
                for track in &mut episode.plan.subtitles {
                    track.url = proxy.route(&track.url, Some(&referer));
                }
            }
            Err(e) => warn!(error = %e, "Invalid proxy base, fetching subtitles directly"),
        }
    }

    /// Fresh engine init for the current episode; state goes to Loading
    fn start_engine(&mut self) -> Result<()> {
        let episode = self.episode.as_ref().ok_or(Error::NoSource)?;
        let source = episode.plan.source.clone();

        self.set_state(PlayerState::Loading)?;
        self.restored = false;
        self.last_snapshot = Some(Snapshot {
            at: Instant::now(),
            offset: 0.0,
        });

        match StreamEngine::init(source, &self.surface, self.factory.as_ref(), &self.config) {
            Ok(engine) => {
                let element = self.surface.element();
                element.set_volume(self.playback.volume);
                element.set_muted(self.playback.muted);
                self.engine = Some(engine);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Engine init failed");
                self.apply_state(PlayerState::Error);
                Err(e)
            }
        }
    }

    /// Re-initialize after a fatal error
    #[instrument(skip(self))]
    pub fn retry(&mut self) -> Result<()> {
        if self.state != PlayerState::Error {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: PlayerState::Loading.to_string(),
            });
        }
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        info!("Retrying playback");
        self.start_engine()
    }

    /// Tear down the engine and subtitle fetches; state returns to Idle
    pub fn stop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        self.subtitles.clear();
        self.episode = None;
        self.restored = false;
        self.last_snapshot = None;
        self.playback = PlaybackState {
            volume: self.playback.volume,
            muted: self.playback.muted,
            fullscreen: self.playback.fullscreen,
            ..Default::default()
        };
        if self.state != PlayerState::Idle {
            self.apply_state(PlayerState::Idle);
        } else {
            self.publish();
        }
    }

    /// Feed a demuxer event through the engine
    pub fn handle_demuxer_event(&mut self, event: DemuxerEvent) {
        let Some(engine) = self.engine.as_mut() else {
            debug!("Demuxer event without engine ignored");
            return;
        };
        let emitted = engine.handle_event(event);
        self.playback.selected_level = engine.selected_level();

        for event in emitted {
            match event {
                EngineEvent::LevelsAvailable(levels) => {
                    self.emit(SessionEvent::LevelsAvailable(levels));
                    if self.state == PlayerState::Loading {
                        let _ = self.set_state(PlayerState::Ready);
                    }
                    self.restore_position();
                }
                EngineEvent::Fatal(reason) => {
                    warn!(reason = %reason, "Playback halted");
                    self.apply_state(PlayerState::Error);
                    self.emit(SessionEvent::Fatal(reason));
                }
                EngineEvent::LevelSwitched(_)
                | EngineEvent::FragmentLoaded(_)
                | EngineEvent::FragmentError(_) => {}
            }
        }
        self.publish();
    }

    /// Feed a render surface event
    pub fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LoadedMetadata { duration } => {
                self.set_duration(duration);
                let direct = self
                    .engine
                    .as_ref()
                    .map(|e| e.mode() != PlaybackMode::Adaptive)
                    .unwrap_or(false);
                if direct && self.state == PlayerState::Loading {
                    let _ = self.set_state(PlayerState::Ready);
                    self.restore_position();
                }
            }
            MediaEvent::DurationChange(duration) => self.set_duration(duration),
            MediaEvent::TimeUpdate(time) => self.on_time_update(time),
            MediaEvent::Waiting => {
                if self.state == PlayerState::Playing {
                    let _ = self.set_state(PlayerState::Buffering);
                }
            }
            MediaEvent::Playing => {
                if self.state == PlayerState::Buffering {
                    let _ = self.set_state(PlayerState::Playing);
                }
            }
            MediaEvent::Ended => self.on_ended(),
        }
        self.publish();
    }

    fn set_duration(&mut self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.playback.duration = duration;
        }
    }

    fn on_time_update(&mut self, time: f64) {
        if !time.is_finite() {
            return;
        }
        self.playback.current_time = time;
        self.refresh_cue_text();

        let duration = self.playback.duration;
        if self.state == PlayerState::Playing && duration > 0.0 && time >= duration {
            self.on_ended();
            return;
        }
        self.track_position(time);
    }

    fn track_position(&mut self, time: f64) {
        if matches!(self.state, PlayerState::Ended | PlayerState::Error | PlayerState::Idle) {
            return;
        }
        let Some(episode) = self.episode.as_ref() else {
            return;
        };

        let duration = self.playback.duration;
        if duration > 0.0 && duration - time < self.config.completion_window {
            if self.positions.entry(&episode.id).is_some() {
                self.positions.clear(&episode.id);
            }
            return;
        }

        let now = Instant::now();
        let due = match &self.last_snapshot {
            Some(last) => {
                now.duration_since(last.at) >= self.config.snapshot_interval
                    && (time - last.offset).abs() >= self.config.snapshot_min_progress
            }
            None => true,
        };
        if !due {
            return;
        }

        self.positions.save(&episode.id, time);
        self.emit(SessionEvent::PositionSnapshot {
            episode: episode.id.clone(),
            offset: time,
        });
        self.last_snapshot = Some(Snapshot { at: now, offset: time });
    }

    fn on_ended(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        if self.set_state(PlayerState::Ended).is_err() {
            return;
        }
        self.emit(SessionEvent::Ended);

        let Some(episode) = self.episode.as_ref() else {
            return;
        };
        self.positions.clear(&episode.id);

        if episode.has_next_episode {
            let from = episode.id.clone();
            match self.next_episode.as_mut() {
                Some(handler) => {
                    info!(episode = %from, "Advancing to next episode");
                    handler(&from);
                    self.emit(SessionEvent::AutoAdvance { from });
                }
                None => debug!(episode = %from, "Episode ended with no next-episode handler"),
            }
        }
    }

    /// Seek to the saved offset once per engine lifetime.
    ///
    /// Returns the offset seeked to, if any.
    pub fn restore_position(&mut self) -> Option<f64> {
        if self.restored || self.engine.is_none() {
            return None;
        }
        self.restored = true;

        let episode = self.episode.as_ref()?;
        let offset = self.positions.get(&episode.id);
        if offset <= self.config.resume_threshold {
            debug!(offset, "Saved offset below resume threshold");
            return None;
        }

        info!(episode = %episode.id, offset, "Resuming playback");
        if self.seek(offset).is_err() {
            return None;
        }
        self.emit(SessionEvent::ResumeNotice { offset });
        Some(offset)
    }

    fn element(&self) -> Result<&Arc<dyn crate::engine::MediaElement>> {
        match &self.engine {
            Some(engine) if !engine.is_destroyed() => Ok(self.surface.element()),
            _ => Err(Error::NoSource),
        }
    }

    /// Start or resume playback
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Ready | PlayerState::Paused => {
                self.element()?.play();
                self.set_state(PlayerState::Playing)
            }
            PlayerState::Ended => {
                // Restart from beginning
                self.seek(0.0)?;
                self.element()?.play();
                self.set_state(PlayerState::Playing)
            }
            PlayerState::Playing | PlayerState::Buffering => Ok(()),
            state => Err(Error::InvalidStateTransition {
                from: state.to_string(),
                to: PlayerState::Playing.to_string(),
            }),
        }
    }

    /// Pause playback
    pub fn pause(&mut self) -> Result<()> {
        if matches!(self.state, PlayerState::Playing | PlayerState::Buffering) {
            self.element()?.pause();
            self.set_state(PlayerState::Paused)?;
        }
        Ok(())
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        if matches!(self.state, PlayerState::Playing | PlayerState::Buffering) {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Seek, clamped to `[0, duration]`
    pub fn seek(&mut self, time: f64) -> Result<()> {
        let element = Arc::clone(self.element()?);
        let duration = self.playback.duration;
        let target = if !time.is_finite() {
            return Ok(());
        } else if duration > 0.0 {
            time.clamp(0.0, duration)
        } else {
            time.max(0.0)
        };

        debug!(from = self.playback.current_time, to = target, "Seeking");
        element.seek(target);
        self.playback.current_time = target;
        self.refresh_cue_text();
        self.publish();
        Ok(())
    }

    /// Set volume, clamped to `[0, 1]`, and persist it
    pub fn set_volume(&mut self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.playback.volume = volume;
        self.surface.element().set_volume(volume);
        self.persist(PreferencesPatch {
            volume: Some(volume),
            ..Default::default()
        });
        self.publish();
    }

    pub fn toggle_mute(&mut self) {
        let muted = !self.playback.muted;
        self.playback.muted = muted;
        self.surface.element().set_muted(muted);
        self.persist(PreferencesPatch {
            muted: Some(muted),
            ..Default::default()
        });
        self.publish();
    }

    pub fn toggle_fullscreen(&mut self) {
        let fullscreen = !self.playback.fullscreen;
        self.playback.fullscreen = fullscreen;
        self.surface.element().set_fullscreen(fullscreen);
        self.publish();
    }

    fn persist(&self, patch: PreferencesPatch) {
        if let Err(e) = self.preferences.save(patch) {
            warn!(error = %e, "Failed to persist preferences");
        }
    }

    /// Pin a quality level, -1 for automatic
    pub fn set_level(&mut self, index: i32) -> Result<()> {
        let engine = self.engine.as_mut().ok_or(Error::NoSource)?;
        engine.set_level(index)?;
        self.playback.selected_level = engine.selected_level();
        self.publish();
        Ok(())
    }

    /// Apply a keyboard shortcut; returns false when the key was ignored
    pub fn handle_key(&mut self, input: KeyInput) -> Result<bool> {
        let Some(action) = key_action(input, self.config.seek_step, self.config.volume_step) else {
            return Ok(false);
        };
        match action {
            KeyAction::TogglePlay => self.toggle_play()?,
            KeyAction::ToggleMute => self.toggle_mute(),
            KeyAction::ToggleFullscreen => self.toggle_fullscreen(),
            KeyAction::SeekBy(delta) => self.seek(self.playback.current_time + delta)?,
            KeyAction::VolumeBy(delta) => self.set_volume(self.playback.volume + delta),
        }
        Ok(true)
    }

    /// True while the skip-intro affordance should be shown
    pub fn intro_active(&self) -> bool {
        self.episode
            .as_ref()
            .and_then(|e| e.plan.intro)
            .map(|w| w.contains(self.playback.current_time))
            .unwrap_or(false)
    }

    /// Jump to the end of the intro; false outside the intro window
    pub fn skip_intro(&mut self) -> Result<bool> {
        if !self.intro_active() {
            return Ok(false);
        }
        let end = self
            .episode
            .as_ref()
            .and_then(|e| e.plan.intro)
            .map(|w| w.end)
            .ok_or(Error::NoSource)?;
        self.seek(end)?;
        Ok(true)
    }

    /// True while the next-episode affordance should be shown
    pub fn next_episode_available(&self) -> bool {
        let Some(episode) = self.episode.as_ref() else {
            return false;
        };
        episode.has_next_episode
            && episode
                .plan
                .outro
                .map(|w| w.contains(self.playback.current_time))
                .unwrap_or(false)
    }

    /// Invoke the next-episode handler on demand
    pub fn advance(&mut self) -> bool {
        let Some(episode) = self.episode.as_ref().filter(|e| e.has_next_episode) else {
            return false;
        };
        let from = episode.id.clone();
        match self.next_episode.as_mut() {
            Some(handler) => {
                handler(&from);
                self.emit(SessionEvent::AutoAdvance { from });
                true
            }
            None => false,
        }
    }

    /// Select a subtitle track by id, or `None` to disable subtitles
    pub fn select_subtitle(&mut self, track_id: Option<&str>) -> Result<()> {
        self.subtitles.select(track_id)?;
        self.playback.selected_subtitle = track_id.map(str::to_string);
        self.playback.active_cue_text.clear();

        if let Some(label) = self.subtitles.selected().map(|t| t.display_label().to_string()) {
            self.persist(PreferencesPatch {
                subtitle_language: Some(label),
                ..Default::default()
            });
        }
        self.publish();
        Ok(())
    }

    /// Merge external search results into the selectable tracks
    pub fn add_external_subtitles(&mut self, tracks: Vec<SubtitleTrack>) {
        self.subtitles.add_external_tracks(tracks);
    }

    /// Apply finished subtitle loads without waiting
    pub fn poll_subtitles(&mut self) {
        let outcomes = self.subtitles.poll();
        for outcome in outcomes {
            self.on_subtitle_outcome(outcome);
        }
    }

    /// Wait for the selected subtitle track to finish loading
    pub async fn wait_subtitles(&mut self) {
        if let Some(outcome) = self.subtitles.wait_loaded().await {
            self.on_subtitle_outcome(outcome);
        }
    }

    fn on_subtitle_outcome(&mut self, outcome: SubtitleOutcome) {
        match outcome {
            SubtitleOutcome::Loaded {
                track_id,
                cue_count,
            } => self.emit(SessionEvent::SubtitlesLoaded {
                track_id,
                cue_count,
            }),
            SubtitleOutcome::Failed { track_id, reason } => {
                self.emit(SessionEvent::SubtitleUnavailable { track_id, reason })
            }
        }
        self.refresh_cue_text();
        self.publish();
    }

    fn refresh_cue_text(&mut self) {
        let text = self.subtitles.active_text(self.playback.current_time);
        if text != self.playback.active_cue_text {
            self.playback.active_cue_text = text.to_string();
        }
    }

    /// Persist a subtitle style preset; unknown ids fall back to the default
    pub fn set_subtitle_preset(&mut self, id: &str) -> &'static SubtitlePreset {
        let preset = SubtitlePreset::by_id(id);
        self.persist(PreferencesPatch {
            subtitle_preset_id: Some(preset.id.to_string()),
            ..Default::default()
        });
        preset
    }

    /// Inline style for the cue overlay
    pub fn subtitle_style(&self) -> String {
        SubtitlePreset::by_id(&self.preferences.load().subtitle_preset_id).to_inline_style()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }
}
