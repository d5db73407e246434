//! Integration tests for Anistream Core

use anistream_core::engine::{BufferConfig, Demuxer, DemuxerFactory, MediaElement, RenderSurface};
use anistream_core::session::{Key, KeyInput};
use anistream_core::subtitles::{active_cue_at, load_track, parse_cues, SubtitleFetcher};
use anistream_core::{
    DemuxerError, DemuxerErrorKind, DemuxerEvent, EngineEvent, Episode, EpisodeId, Error,
    ErrorCounters, FatalReason, MediaEvent, MemoryPreferences, PlaybackController, PlaybackPlan,
    PlayerConfig, PlayerState, PositionStore, QualityLevel, SessionEvent, SessionPositionStore,
    StreamDescriptor, StreamEngine, StreamSource, SubtitleTrack,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Host doubles
// =============================================================================

#[derive(Default)]
struct Recorder {
    seeks: Mutex<Vec<f64>>,
    level_sets: Mutex<Vec<i32>>,
    loads: AtomicU32,
    destroys: AtomicU32,
}

struct Element(Arc<Recorder>);

impl MediaElement for Element {
    fn set_source(&self, _url: &str) {}
    fn clear_source(&self) {}
    fn play(&self) {}
    fn pause(&self) {}
    fn seek(&self, time: f64) {
        self.0.seeks.lock().unwrap().push(time);
    }
    fn set_volume(&self, _volume: f64) {}
    fn set_muted(&self, _muted: bool) {}
    fn set_fullscreen(&self, _fullscreen: bool) {}
    fn buffered_ahead(&self) -> f64 {
        8.0
    }
}

struct Hls(Arc<Recorder>);

impl Demuxer for Hls {
    fn load_source(&mut self, _url: &str) {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
    }
    fn start_load(&mut self) {}
    fn recover_media_error(&mut self) {}
    fn swap_audio_codec(&mut self) {}
    fn set_level(&mut self, index: i32) {
        self.0.level_sets.lock().unwrap().push(index);
    }
    fn destroy(&mut self) {
        self.0.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

struct HlsFactory(Arc<Recorder>);

impl DemuxerFactory for HlsFactory {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(
        &self,
        _element: Arc<dyn MediaElement>,
        _config: &BufferConfig,
    ) -> anyhow::Result<Box<dyn Demuxer>> {
        Ok(Box::new(Hls(Arc::clone(&self.0))))
    }
}

struct NoSubtitles;

#[async_trait]
impl SubtitleFetcher for NoSubtitles {
    async fn fetch(&self, track: &SubtitleTrack) -> anistream_core::Result<String> {
        Err(Error::subtitle_load(&track.url, "HTTP 404"))
    }
}

struct InlineSubtitles(&'static str);

#[async_trait]
impl SubtitleFetcher for InlineSubtitles {
    async fn fetch(&self, _track: &SubtitleTrack) -> anistream_core::Result<String> {
        Ok(self.0.to_string())
    }
}

fn levels() -> Vec<QualityLevel> {
    vec![
        QualityLevel::new(0, 1280, 720, 2_800_000),
        QualityLevel::new(1, 1920, 1080, 5_000_000),
    ]
}

fn frag_parsing_error() -> DemuxerEvent {
    DemuxerEvent::Error(DemuxerError {
        kind: DemuxerErrorKind::Media,
        details: "fragParsingError".to_string(),
        fatal: false,
        fragment: None,
    })
}

fn controller(
    recorder: &Arc<Recorder>,
    positions: Arc<SessionPositionStore>,
) -> PlaybackController {
    let surface = RenderSurface::new("player", Arc::new(Element(Arc::clone(recorder))));
    PlaybackController::new(
        PlayerConfig::default(),
        surface,
        Arc::new(HlsFactory(Arc::clone(recorder))),
        positions,
        Arc::new(MemoryPreferences::default()),
        Arc::new(NoSubtitles),
    )
}

fn episode_from_descriptor(id: &str, json: &str) -> Episode {
    let plan = StreamDescriptor::from_json(json).unwrap().plan().unwrap();
    Episode::from_plan(EpisodeId::from(id), plan, true).unwrap()
}

const DESCRIPTOR: &str = r#"{
    "sources": [{"url": "https://cdn.example.com/master.m3u8", "isM3U8": true}],
    "subtitles": [{"url": "https://cdn.example.com/en.vtt", "lang": "English"}],
    "intro": {"start": 30, "end": 120}
}"#;

// =============================================================================
// Engine
// =============================================================================

#[test]
fn test_fragment_parsing_storm_is_fatal_exactly_once() {
    let recorder = Arc::new(Recorder::default());
    let surface = RenderSurface::new("player", Arc::new(Element(Arc::clone(&recorder))));
    let mut engine = StreamEngine::init(
        StreamSource::adaptive("https://cdn.example.com/master.m3u8"),
        &surface,
        &HlsFactory(Arc::clone(&recorder)),
        &PlayerConfig::default(),
    )
    .unwrap();
    engine.handle_event(DemuxerEvent::ManifestParsed { levels: levels() });

    let fatal: Vec<EngineEvent> = (0..20)
        .flat_map(|_| engine.handle_event(frag_parsing_error()))
        .filter(|e| matches!(e, EngineEvent::Fatal(_)))
        .collect();

    assert_eq!(fatal, vec![EngineEvent::Fatal(FatalReason::CodecError)]);
    assert_eq!(recorder.level_sets.lock().unwrap().len(), 4);
    assert_eq!(recorder.destroys.load(Ordering::SeqCst), 1);
    assert!(!surface.is_bound());
}

#[test]
fn test_counters_zeroed_on_fresh_init() {
    let recorder = Arc::new(Recorder::default());
    let surface = RenderSurface::new("player", Arc::new(Element(Arc::clone(&recorder))));
    let factory = HlsFactory(Arc::clone(&recorder));
    let source = StreamSource::adaptive("https://cdn.example.com/master.m3u8");

    let mut first = StreamEngine::init(source.clone(), &surface, &factory, &PlayerConfig::default()).unwrap();
    first.handle_event(DemuxerEvent::ManifestParsed { levels: levels() });
    first.handle_event(frag_parsing_error());
    first.handle_event(frag_parsing_error());
    assert_eq!(first.counters().frag_parsing_total, 2);
    first.destroy();

    let second = StreamEngine::init(source, &surface, &factory, &PlayerConfig::default()).unwrap();
    assert_eq!(second.counters(), ErrorCounters::default());
    assert_eq!(second.selected_level(), -1);
}

// =============================================================================
// Subtitles
// =============================================================================

#[test]
fn test_cue_boundaries_from_parsed_file() {
    let srt = "1\n00:00:01,000 --> 00:00:02,500\n<i>First</i>\n\n2\n00:00:02,500 --> 00:00:04,000\n{\\an8}Second\n";
    let cues = parse_cues(srt);
    assert_eq!(active_cue_at(&cues, 1.0), "First");
    assert_eq!(active_cue_at(&cues, 2.5), "First");
    assert_eq!(active_cue_at(&cues, 3.0), "Second");
    assert_eq!(active_cue_at(&cues, 4.0001), "");
}

#[test]
fn test_load_track_parses_fetched_file() {
    let fetcher = InlineSubtitles("WEBVTT\n\nNOTE header\n\n00:05.000 --> 00:07.000 align:start\n<v Frieren>Let's go.</v>\n");
    let track = SubtitleTrack::native("English", "https://cdn.example.com/en.vtt");

    let cues = tokio_test::assert_ok!(tokio_test::block_on(load_track(&fetcher, &track)));
    assert_eq!(cues.len(), 1);
    assert_eq!(active_cue_at(&cues, 6.0), "Let's go.");
    assert_eq!(active_cue_at(&cues, f64::NAN), "");
}

// =============================================================================
// Playback session
// =============================================================================

#[tokio::test]
async fn test_full_episode_lifecycle() {
    let recorder = Arc::new(Recorder::default());
    let positions = Arc::new(SessionPositionStore::new());
    positions.save(&EpisodeId::from("frieren-3"), 420.0);

    let mut player = controller(&recorder, positions.clone());
    let mut events = player.subscribe();
    let advanced = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&advanced);
    player.on_next_episode(move |from| *sink.lock().unwrap() = Some(from.clone()));

    player
        .load(episode_from_descriptor("frieren-3", DESCRIPTOR))
        .unwrap();
    assert_eq!(player.state(), PlayerState::Loading);

    player.handle_demuxer_event(DemuxerEvent::ManifestParsed { levels: levels() });
    player.handle_media_event(MediaEvent::LoadedMetadata { duration: 1440.0 });
    assert_eq!(player.state(), PlayerState::Ready);
    assert_eq!(*recorder.seeks.lock().unwrap(), vec![420.0]);
    assert_eq!(player.engine().unwrap().levels()[0].height, 1080);

    assert!(player.handle_key(KeyInput::new(Key::K)).unwrap());
    assert_eq!(player.state(), PlayerState::Playing);

    player.wait_subtitles().await;
    assert_eq!(player.state(), PlayerState::Playing);

    player.handle_media_event(MediaEvent::TimeUpdate(1440.0));
    assert_eq!(player.state(), PlayerState::Ended);
    assert_eq!(positions.get(&EpisodeId::from("frieren-3")), 0.0);
    assert_eq!(*advanced.lock().unwrap(), Some(EpisodeId::from("frieren-3")));

    let mut saw_resume = false;
    let mut saw_subtitle_notice = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::ResumeNotice { offset } => saw_resume = offset == 420.0,
            SessionEvent::SubtitleUnavailable { .. } => saw_subtitle_notice = true,
            _ => {}
        }
    }
    assert!(saw_resume);
    assert!(saw_subtitle_notice);
}

#[tokio::test]
async fn test_switching_episodes_rebinds_surface() {
    let recorder = Arc::new(Recorder::default());
    let mut player = controller(&recorder, Arc::new(SessionPositionStore::new()));

    player
        .load(episode_from_descriptor("frieren-3", DESCRIPTOR))
        .unwrap();
    player
        .load(episode_from_descriptor("frieren-4", DESCRIPTOR))
        .unwrap();

    assert_eq!(recorder.loads.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.destroys.load(Ordering::SeqCst), 1);
    assert_eq!(player.episode().unwrap().id, EpisodeId::from("frieren-4"));
}

#[test]
fn test_embed_descriptor_bypasses_engine() {
    let plan = StreamDescriptor::from_json(
        r#"{"type": "embed", "servers": [{"name": "main", "url": "https://embed.example.net/e/9"}]}"#,
    )
    .unwrap()
    .plan()
    .unwrap();
    assert!(matches!(plan, PlaybackPlan::Embed(_)));
    assert!(matches!(
        Episode::from_plan(EpisodeId::from("x"), plan, false),
        Err(Error::EmbedSource)
    ));
}
