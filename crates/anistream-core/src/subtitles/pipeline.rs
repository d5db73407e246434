//! Subtitle pipeline
//!
//! Owns the merged track list, the selected track and its parsed cues.
//! Selecting a track aborts the fetch of the previous selection; every load
//! carries a generation number and only the latest generation is applied.

use super::cues::active_cue_at;
use super::parser::parse_cues;
use super::selection::{auto_select, merge_tracks};
use crate::error::{Error, Result};
use crate::proxy::ProxyGateway;
use crate::types::{SubtitleCue, SubtitleOrigin, SubtitleTrack};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

/// Fetches raw subtitle file content
#[async_trait]
pub trait SubtitleFetcher: Send + Sync {
    async fn fetch(&self, track: &SubtitleTrack) -> Result<String>;
}

/// Fetches subtitle files over HTTP, through the proxy gateway when the
/// provider requires a referer
pub struct HttpSubtitleFetcher {
    client: Client,
    proxy: Option<ProxyGateway>,
    referer: Option<String>,
}

impl HttpSubtitleFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            proxy: None,
            referer: None,
        })
    }

    /// Route native track requests through `proxy` with `referer`
    pub fn with_proxy(mut self, proxy: ProxyGateway, referer: Option<String>) -> Self {
        self.proxy = Some(proxy);
        self.referer = referer;
        self
    }

    fn request_url(&self, track: &SubtitleTrack) -> String {
        match &self.proxy {
            Some(proxy) if track.origin == SubtitleOrigin::Native => {
                proxy.route(&track.url, self.referer.as_deref())
            }
            _ => track.url.clone(),
        }
    }
}

#[async_trait]
impl SubtitleFetcher for HttpSubtitleFetcher {
    #[instrument(skip(self), fields(track = %track.id))]
    async fn fetch(&self, track: &SubtitleTrack) -> Result<String> {
        let url = self.request_url(track);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::subtitle_load(&track.url, e))?;

        if !response.status().is_success() {
            return Err(Error::subtitle_load(
                &track.url,
                format!("HTTP {}", response.status()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| Error::subtitle_load(&track.url, e))
    }
}

/// Fetch and parse one track
pub async fn load_track(fetcher: &dyn SubtitleFetcher, track: &SubtitleTrack) -> Result<Vec<SubtitleCue>> {
    let content = fetcher.fetch(track).await?;
    let cues = parse_cues(&content);
    if cues.is_empty() && !content.trim().is_empty() {
        warn!(track = %track.id, "Subtitle file contained no usable cues");
    }
    Ok(cues)
}

/// Result of a completed load, as reported to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum SubtitleOutcome {
    Loaded { track_id: String, cue_count: usize },
    /// Playback continues without subtitles for this track
    Failed { track_id: String, reason: String },
}

struct LoadResult {
    generation: u64,
    track_id: String,
    cues: std::result::Result<Vec<SubtitleCue>, String>,
}

/// Track list, selection and cues for the current episode
pub struct SubtitlePipeline {
    fetcher: Arc<dyn SubtitleFetcher>,
    native: Vec<SubtitleTrack>,
    external: Vec<SubtitleTrack>,
    tracks: Vec<SubtitleTrack>,
    selected: Option<String>,
    cues: Vec<SubtitleCue>,
    generation: u64,
    pending: Option<u64>,
    task: Option<JoinHandle<()>>,
    results_tx: mpsc::UnboundedSender<LoadResult>,
    results_rx: mpsc::UnboundedReceiver<LoadResult>,
}

impl SubtitlePipeline {
    pub fn new(fetcher: Arc<dyn SubtitleFetcher>) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            native: Vec::new(),
            external: Vec::new(),
            tracks: Vec::new(),
            selected: None,
            cues: Vec::new(),
            generation: 0,
            pending: None,
            task: None,
            results_tx,
            results_rx,
        }
    }

    /// Replace the native tracks (new episode); external tracks are dropped
    pub fn set_native_tracks(&mut self, tracks: Vec<SubtitleTrack>) {
        self.clear();
        self.native = tracks;
        self.external.clear();
        self.tracks = merge_tracks(&self.native, &self.external);
    }

    /// Add resolved external tracks alongside the native ones
    pub fn add_external_tracks(&mut self, tracks: Vec<SubtitleTrack>) {
        self.external.extend(tracks);
        self.tracks = merge_tracks(&self.native, &self.external);
        debug!(tracks = self.tracks.len(), "External subtitle tracks merged");
    }

    /// Selectable tracks, native first
    pub fn tracks(&self) -> &[SubtitleTrack] {
        &self.tracks
    }

    pub fn selected(&self) -> Option<&SubtitleTrack> {
        let id = self.selected.as_deref()?;
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    /// Current load generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a fetch for the current selection is in flight
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Text to overlay at playback time `time`
    pub fn active_text(&self, time: f64) -> &str {
        active_cue_at(&self.cues, time)
    }

    /// Select the automatic choice for the current track list
    pub fn auto_select(&mut self, preferred: Option<&str>) -> Result<Option<String>> {
        let Some(id) = auto_select(&self.tracks, preferred).map(|t| t.id.clone()) else {
            return Ok(None);
        };
        self.select(Some(&id))?;
        Ok(Some(id))
    }

    /// Select a track by id, or disable subtitles with `None`.
    ///
    /// Selecting a track outside a tokio runtime fails with a load error.
    pub fn select(&mut self, track_id: Option<&str>) -> Result<()> {
        let track = match track_id {
            Some(id) => Some(
                self.tracks
                    .iter()
                    .find(|t| t.id == id)
                    .cloned()
                    .ok_or_else(|| Error::subtitle_load(id, "unknown subtitle track"))?,
            ),
            None => None,
        };

        self.abort_in_flight();
        self.generation += 1;
        self.cues.clear();
        self.selected = track.as_ref().map(|t| t.id.clone());

        let Some(track) = track else {
            self.pending = None;
            info!("Subtitles disabled");
            return Ok(());
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::subtitle_load(&track.url, e))?;
        let generation = self.generation;
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.results_tx.clone();

        info!(track = %track.id, generation, "Loading subtitle track");
        self.pending = Some(generation);
        self.task = Some(runtime.spawn(async move {
            // Dropping the set on abort cancels the fetch with it
            let mut load = JoinSet::new();
            let loading = track.clone();
            load.spawn(async move { load_track(fetcher.as_ref(), &loading).await });

            let cues = match load.join_next().await {
                Some(Ok(result)) => result.map_err(|e| e.to_string()),
                Some(Err(e)) => Err(format!("subtitle load task failed: {}", e)),
                None => Err("subtitle load task vanished".to_string()),
            };
            // Receiver lives as long as the pipeline
            let _ = tx.send(LoadResult {
                generation,
                track_id: track.id,
                cues,
            });
        }));

        Ok(())
    }

    fn abort_in_flight(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!(generation = self.generation, "Aborting superseded subtitle fetch");
            }
            task.abort();
        }
    }

    fn apply(&mut self, result: LoadResult) -> Option<SubtitleOutcome> {
        if result.generation != self.generation {
            debug!(
                stale = result.generation,
                current = self.generation,
                "Discarding stale subtitle load"
            );
            return None;
        }
        self.pending = None;

        match result.cues {
            Ok(cues) => {
                info!(track = %result.track_id, cues = cues.len(), "Subtitle track loaded");
                let cue_count = cues.len();
                self.cues = cues;
                Some(SubtitleOutcome::Loaded {
                    track_id: result.track_id,
                    cue_count,
                })
            }
            Err(reason) => {
                warn!(track = %result.track_id, reason = %reason, "Subtitle track failed to load");
                self.cues.clear();
                Some(SubtitleOutcome::Failed {
                    track_id: result.track_id,
                    reason,
                })
            }
        }
    }

    /// Apply finished loads without waiting
    pub fn poll(&mut self) -> Vec<SubtitleOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(result) = self.results_rx.try_recv() {
            if let Some(outcome) = self.apply(result) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Wait for the current selection to finish loading.
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub async fn wait_loaded(&mut self) -> Option<SubtitleOutcome> {
        while self.pending.is_some() {
            let result = self.results_rx.recv().await?;
            if let Some(outcome) = self.apply(result) {
                return Some(outcome);
            }
        }
        None
    }

    /// Drop the selection and cancel any fetch
    pub fn clear(&mut self) {
        self.abort_in_flight();
        self.generation += 1;
        self.pending = None;
        self.selected = None;
        self.cues.clear();
    }
}

impl Drop for SubtitlePipeline {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// Serves canned content per track URL, optionally after a delay
    #[derive(Default)]
    pub struct StaticFetcher {
        pub files: HashMap<String, (Duration, std::result::Result<String, String>)>,
    }

    impl StaticFetcher {
        pub fn with(mut self, url: &str, delay: Duration, content: &str) -> Self {
            self.files
                .insert(url.to_string(), (delay, Ok(content.to_string())));
            self
        }

        pub fn failing(mut self, url: &str, reason: &str) -> Self {
            self.files
                .insert(url.to_string(), (Duration::ZERO, Err(reason.to_string())));
            self
        }
    }

    #[async_trait]
    impl SubtitleFetcher for StaticFetcher {
        async fn fetch(&self, track: &SubtitleTrack) -> Result<String> {
            match self.files.get(&track.url) {
                Some((delay, outcome)) => {
                    tokio::time::sleep(*delay).await;
                    outcome
                        .clone()
                        .map_err(|reason| Error::subtitle_load(&track.url, reason))
                }
                None => Err(Error::subtitle_load(&track.url, "HTTP 404 Not Found")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;

    const EN: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:03.000\nHello\n";
    const ES: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:03.000\nHola\n";

    fn tracks() -> Vec<SubtitleTrack> {
        vec![
            SubtitleTrack::native("English", "https://cdn.example.com/en.vtt"),
            SubtitleTrack::native("Spanish", "https://cdn.example.com/es.vtt"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_selection_wins() {
        let fetcher = StaticFetcher::default()
            .with("https://cdn.example.com/en.vtt", Duration::from_secs(5), EN)
            .with("https://cdn.example.com/es.vtt", Duration::from_millis(10), ES);
        let mut pipeline = SubtitlePipeline::new(Arc::new(fetcher));
        pipeline.set_native_tracks(tracks());

        pipeline.select(Some("native:English")).unwrap();
        pipeline.select(Some("native:Spanish")).unwrap();

        let outcome = pipeline.wait_loaded().await.unwrap();
        assert_eq!(
            outcome,
            SubtitleOutcome::Loaded {
                track_id: "native:Spanish".to_string(),
                cue_count: 1
            }
        );
        assert_eq!(pipeline.active_text(2.0), "Hola");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(pipeline.poll().is_empty());
        assert_eq!(pipeline.active_text(2.0), "Hola");
    }

    #[tokio::test]
    async fn test_stale_generation_discarded() {
        let fetcher = StaticFetcher::default()
            .with("https://cdn.example.com/es.vtt", Duration::ZERO, ES);
        let mut pipeline = SubtitlePipeline::new(Arc::new(fetcher));
        pipeline.set_native_tracks(tracks());
        pipeline.select(Some("native:Spanish")).unwrap();

        let stale = pipeline.generation() - 1;
        pipeline
            .results_tx
            .send(LoadResult {
                generation: stale,
                track_id: "native:English".to_string(),
                cues: Ok(vec![SubtitleCue::new(0.0, 10.0, "stale")]),
            })
            .unwrap();

        let outcome = pipeline.wait_loaded().await.unwrap();
        assert!(matches!(outcome, SubtitleOutcome::Loaded { ref track_id, .. } if track_id == "native:Spanish"));
        assert_eq!(pipeline.active_text(2.0), "Hola");
    }

    #[tokio::test]
    async fn test_failure_degrades_to_no_cues() {
        let fetcher = StaticFetcher::default().failing("https://cdn.example.com/en.vtt", "HTTP 404");
        let mut pipeline = SubtitlePipeline::new(Arc::new(fetcher));
        pipeline.set_native_tracks(tracks());
        pipeline.select(Some("native:English")).unwrap();

        let outcome = pipeline.wait_loaded().await.unwrap();
        assert!(matches!(outcome, SubtitleOutcome::Failed { .. }));
        assert!(pipeline.cues().is_empty());
        assert_eq!(pipeline.active_text(2.0), "");
        assert!(!pipeline.is_loading());
    }

    struct PanickingFetcher;

    #[async_trait]
    impl SubtitleFetcher for PanickingFetcher {
        async fn fetch(&self, track: &SubtitleTrack) -> Result<String> {
            panic!("fetcher blew up on {}", track.url);
        }
    }

    #[tokio::test]
    async fn test_panicking_load_reports_failure() {
        let mut pipeline = SubtitlePipeline::new(Arc::new(PanickingFetcher));
        pipeline.set_native_tracks(tracks());
        pipeline.select(Some("native:English")).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), pipeline.wait_loaded())
            .await
            .expect("load never settled");
        assert!(matches!(outcome, Some(SubtitleOutcome::Failed { ref track_id, .. }) if track_id == "native:English"));
        assert!(!pipeline.is_loading());
        assert!(pipeline.cues().is_empty());
    }

    #[tokio::test]
    async fn test_hostile_file_loads_remaining_cues() {
        let hostile = "WEBVTT\n\n9999999999999999999:00:00.000 --> 9999999999999999999:00:01.000\nBoom\n\n00:00:01.000 --> 00:00:03.000\nHello\n";
        let fetcher = StaticFetcher::default()
            .with("https://cdn.example.com/en.vtt", Duration::ZERO, hostile);
        let mut pipeline = SubtitlePipeline::new(Arc::new(fetcher));
        pipeline.set_native_tracks(tracks());
        pipeline.select(Some("native:English")).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), pipeline.wait_loaded())
            .await
            .expect("load never settled");
        assert_eq!(
            outcome,
            Some(SubtitleOutcome::Loaded {
                track_id: "native:English".to_string(),
                cue_count: 1
            })
        );
        assert_eq!(pipeline.active_text(2.0), "Hello");
    }

    #[tokio::test]
    async fn test_disable_and_unknown_track() {
        let mut pipeline = SubtitlePipeline::new(Arc::new(StaticFetcher::default()));
        pipeline.set_native_tracks(tracks());

        assert!(pipeline.select(Some("native:German")).is_err());
        pipeline.select(None).unwrap();
        assert!(pipeline.selected().is_none());
        assert!(pipeline.wait_loaded().await.is_none());
    }

    #[tokio::test]
    async fn test_auto_select_prefers_spanish() {
        let fetcher = StaticFetcher::default()
            .with("https://cdn.example.com/es.vtt", Duration::ZERO, ES);
        let mut pipeline = SubtitlePipeline::new(Arc::new(fetcher));
        pipeline.set_native_tracks(tracks());

        let chosen = pipeline.auto_select(None).unwrap();
        assert_eq!(chosen.as_deref(), Some("native:Spanish"));
        pipeline.wait_loaded().await;
        assert_eq!(pipeline.cues().len(), 1);
    }
}
