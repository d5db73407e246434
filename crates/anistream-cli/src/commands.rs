//! CLI command implementations

use crate::host::{CallLog, HeadlessElement, HeadlessFactory};
use crate::output::{self, OutputFormat, TimelineRow};
use anistream_core::engine::probe::ManifestProbe;
use anistream_core::engine::RenderSurface;
use anistream_core::subtitles::{
    active_cue_at, external_track, parse_cues, HttpSubtitleFetcher, HttpSubtitleSearch,
    SearchRequest, SubtitleSearch,
};
use anistream_core::{
    DemuxerError, DemuxerErrorKind, DemuxerEvent, Episode, EpisodeId, JsonFilePreferences,
    MediaEvent, MemoryPreferences, PlaybackController, PlaybackPlan, PlayerConfig, PlayerState,
    PositionStore, PreferencesPatch, PreferencesStore, ProxyGateway, QualityLevel, SessionEvent,
    SessionPositionStore, StreamDescriptor, StreamSource, SubtitlePreset,
};
use anyhow::{bail, Context};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};

/// Load the player configuration, defaults when no file is given
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PlayerConfig> {
    match path {
        Some(path) => {
            let config = PlayerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => Ok(PlayerConfig::default()),
    }
}

fn timeout(config: &PlayerConfig) -> Duration {
    Duration::from_millis(config.request_timeout_ms)
}

fn read_descriptor(path: &Path) -> anyhow::Result<PlaybackPlan> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(StreamDescriptor::from_json(&json)?.plan()?)
}

/// Parse a subtitle file and list its cues
pub fn subs(path: &Path, at: Option<f64>, format: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cues = parse_cues(&content);

    if let Some(time) = at {
        let text = active_cue_at(&cues, time);
        match OutputFormat::from(format) {
            OutputFormat::Json => println!("{}", output::to_json(&json!({ "time": time, "text": text }))?),
            _ if text.is_empty() => println!("{}", output::warn("(no cue)")),
            _ => println!("{}", text),
        }
        return Ok(());
    }

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&cues)?),
        OutputFormat::Table => println!("{}", output::cue_table(&cues)),
        OutputFormat::Text => {
            println!("{} {}", output::heading("Subtitles:"), path.display());
            println!("  Cues: {}", cues.len());
            if let (Some(first), Some(last)) = (cues.first(), cues.last()) {
                println!(
                    "  Span: {} - {}",
                    output::clock(first.start),
                    output::clock(last.end)
                );
            }
            println!();
            for cue in &cues {
                println!(
                    "  [{} --> {}] {}",
                    output::clock(cue.start),
                    output::clock(cue.end),
                    cue.text.replace('\n', " / ")
                );
            }
        }
    }

    Ok(())
}

/// Query the external subtitle search service
pub async fn search(
    config: &PlayerConfig,
    title: &str,
    episode: u32,
    languages: Vec<String>,
    filter: Option<String>,
    resolve: bool,
    format: &str,
) -> anyhow::Result<()> {
    let Some(base) = config.subtitle_search_base.as_ref() else {
        bail!("subtitle_search_base is not configured (use --config)");
    };
    let client = HttpSubtitleSearch::new(base, timeout(config))?;

    let mut request = SearchRequest::new(title, episode).with_languages(languages);
    if let Some(language) = filter {
        request = request.with_filter_language(language);
    }
    let response = client.search(&request).await?;

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&response)?),
        _ => {
            println!(
                "{} {} episode {}",
                output::heading("Subtitle search:"),
                title,
                episode
            );
            println!(
                "  Languages: {}",
                response.available_languages.join(", ")
            );
            let mut stats: Vec<_> = response.source_stats.iter().collect();
            stats.sort();
            for (source, count) in stats {
                println!("  {}: {} results", source, count);
            }
            println!();
            if response.results.is_empty() {
                println!("{}", output::warn("No subtitles found"));
            } else {
                println!("{}", output::search_table(&response.results));
            }
        }
    }

    if resolve {
        let Some(best) = response.results.first() else {
            bail!("nothing to resolve");
        };
        let url = client.resolve(best).await?;
        let track = external_track(best, &url);
        println!("{} {}", output::ok(track.display_label()), url);
    }

    Ok(())
}

/// Fetch an HLS manifest and list its quality levels
pub async fn probe(
    config: &PlayerConfig,
    url: &str,
    referer: Option<String>,
    format: &str,
) -> anyhow::Result<()> {
    let proxy = config
        .proxy_base
        .as_ref()
        .map(ProxyGateway::new)
        .transpose()?;
    if referer.is_some() && proxy.is_none() {
        warn!("Referer given without proxy_base; requesting the manifest directly");
    }

    let mut source = StreamSource::adaptive(url);
    if let Some(referer) = referer {
        source = source.with_referer(referer);
    }

    let probe = ManifestProbe::new(proxy, timeout(config))?;
    let summary = probe.probe(&source).await?;

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&summary)?),
        _ => {
            println!("{} {}", output::heading("Manifest:"), url);
            println!(
                "  Type: {}",
                if summary.is_master { "master" } else { "media" }
            );
            println!("  Live: {}", summary.is_live);
            if let Some(duration) = summary.duration {
                println!("  Duration: {}", output::clock(duration));
            }
            if !summary.is_master {
                println!("  Segments: {}", summary.segment_count);
            }
            if !summary.levels.is_empty() {
                println!();
                println!("{}", output::level_table(&summary.levels));
            }
        }
    }

    Ok(())
}

/// Show the playback plan for a descriptor
pub fn plan(path: &Path, format: &str) -> anyhow::Result<()> {
    let plan = read_descriptor(path)?;

    let value = match &plan {
        PlaybackPlan::Embed(embed) => json!({
            "strategy": "embed",
            "servers": embed.servers,
        }),
        PlaybackPlan::Engine(direct) => json!({
            "strategy": "engine",
            "source": direct.source,
            "subtitles": direct.subtitles,
            "intro": direct.intro,
            "outro": direct.outro,
        }),
    };

    if OutputFormat::from(format) == OutputFormat::Json {
        println!("{}", output::to_json(&value)?);
        return Ok(());
    }

    match plan {
        PlaybackPlan::Embed(embed) => {
            println!("{} embed (opaque frame)", output::heading("Strategy:"));
            for server in &embed.servers {
                println!("  {}: {}", server.name, server.url);
            }
        }
        PlaybackPlan::Engine(direct) => {
            println!("{} stream engine", output::heading("Strategy:"));
            println!("  Source: {}", direct.source.url);
            println!(
                "  Kind: {}",
                if direct.source.is_adaptive_manifest { "adaptive (HLS)" } else { "progressive" }
            );
            if let Some(referer) = &direct.source.referer_override {
                println!("  Referer: {}", referer);
            }
            if let Some(intro) = direct.intro {
                println!("  Intro: {} - {}", output::clock(intro.start), output::clock(intro.end));
            }
            if let Some(outro) = direct.outro {
                println!("  Outro: {} - {}", output::clock(outro.start), output::clock(outro.end));
            }
            println!("  Subtitles: {}", direct.subtitles.len());
            for track in &direct.subtitles {
                println!("    {} ({})", track.display_label(), track.url);
            }
        }
    }

    Ok(())
}

fn print_prefs(store: &JsonFilePreferences, format: &str) -> anyhow::Result<()> {
    let prefs = store.load();
    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&prefs)?),
        _ => {
            println!("{} {}", output::heading("Preferences:"), store.path().display());
            println!("  Volume: {:.0}%", prefs.volume * 100.0);
            println!("  Muted: {}", prefs.muted);
            println!("  Subtitle preset: {}", prefs.subtitle_preset_id);
            println!(
                "  Subtitle language: {}",
                prefs.subtitle_language.as_deref().unwrap_or("(auto)")
            );
        }
    }
    Ok(())
}

pub fn prefs_show(format: &str) -> anyhow::Result<()> {
    let store = JsonFilePreferences::open_default()?;
    print_prefs(&store, format)
}

pub fn prefs_set(
    volume: Option<f64>,
    muted: Option<bool>,
    preset: Option<String>,
    subtitle: Option<String>,
    format: &str,
) -> anyhow::Result<()> {
    if let Some(volume) = volume {
        if !(0.0..=1.0).contains(&volume) {
            bail!("volume must be within 0.0 - 1.0");
        }
    }
    let preset = match preset {
        Some(id) if !SubtitlePreset::is_known(&id) => {
            bail!(
                "unknown preset '{}' (available: {})",
                id,
                SubtitlePreset::all().iter().map(|p| p.id).collect::<Vec<_>>().join(", ")
            );
        }
        other => other,
    };

    let store = JsonFilePreferences::open_default()?;
    store.save(PreferencesPatch {
        volume,
        muted,
        subtitle_preset_id: preset,
        subtitle_language: subtitle,
    })?;
    println!("{}", output::ok("Preferences saved"));
    print_prefs(&store, format)
}

pub fn prefs_path() -> anyhow::Result<()> {
    let store = JsonFilePreferences::open_default()?;
    println!("{}", store.path().display());
    Ok(())
}

/// List subtitle style presets
pub fn presets(format: &str) {
    let presets = SubtitlePreset::all();
    match OutputFormat::from(format) {
        OutputFormat::Json => match output::to_json(&presets) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", output::fail(&e.to_string())),
        },
        OutputFormat::Table => println!("{}", output::preset_table(presets)),
        OutputFormat::Text => {
            println!("{}", output::heading("Subtitle presets:"));
            for preset in presets {
                println!("  {:<14} {}", preset.id, preset.name);
                println!("  {:<14} {}", "", preset.to_inline_style());
            }
        }
    }
}

// ============================================================================
// Playback simulation
// ============================================================================

/// What the simulated viewer does
#[derive(Debug, Clone)]
pub struct Script {
    pub episode: String,
    pub duration: f64,
    pub resume: Option<f64>,
    pub frag_errors: u32,
    pub step: f64,
    pub probe: bool,
}

/// Ladder used when the manifest is not probed
fn default_ladder() -> Vec<QualityLevel> {
    vec![
        QualityLevel::new(0, 640, 360, 800_000),
        QualityLevel::new(1, 854, 480, 1_400_000),
        QualityLevel::new(2, 1280, 720, 2_800_000),
        QualityLevel::new(3, 1920, 1080, 5_000_000),
    ]
}

struct Timeline {
    rows: Vec<TimelineRow>,
    log: Arc<CallLog>,
    events: broadcast::Receiver<SessionEvent>,
}

impl Timeline {
    /// Collect host calls and session events since the last record
    fn record(&mut self, clock: f64) {
        let at = output::clock(clock);
        for call in self.log.drain() {
            self.rows.push(TimelineRow {
                clock: at.clone(),
                kind: "host",
                detail: call,
            });
        }
        loop {
            match self.events.try_recv() {
                Ok(event) => self.rows.push(TimelineRow {
                    clock: at.clone(),
                    kind: "event",
                    detail: describe(&event),
                }),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session events dropped");
                }
                Err(_) => break,
            }
        }
    }
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::StateChanged { from, to } => format!("state {} -> {}", from, to),
        SessionEvent::LevelsAvailable(levels) => format!(
            "levels {}",
            levels.iter().map(|l| l.quality_name()).collect::<Vec<_>>().join(", ")
        ),
        SessionEvent::ResumeNotice { offset } => format!("resumed from {}", output::clock(*offset)),
        SessionEvent::PositionSnapshot { episode, offset } => {
            format!("position {} saved at {}", episode, output::clock(*offset))
        }
        SessionEvent::SubtitlesLoaded { track_id, cue_count } => {
            format!("subtitles {} loaded ({} cues)", track_id, cue_count)
        }
        SessionEvent::SubtitleUnavailable { track_id, reason } => {
            format!("subtitles {} unavailable: {}", track_id, reason)
        }
        SessionEvent::Fatal(reason) => format!("fatal {}", reason),
        SessionEvent::Ended => "ended".to_string(),
        SessionEvent::AutoAdvance { from } => format!("advance from {}", from),
    }
}

fn frag_parsing_error() -> DemuxerEvent {
    DemuxerEvent::Error(DemuxerError {
        kind: DemuxerErrorKind::Media,
        details: "fragParsingError".to_string(),
        fatal: false,
        fragment: None,
    })
}

/// Play a descriptor start to finish against the headless host
pub async fn simulate(
    config: PlayerConfig,
    descriptor: &Path,
    script: Script,
    format: &str,
) -> anyhow::Result<()> {
    if script.step <= 0.0 || !script.duration.is_finite() || script.duration <= 0.0 {
        bail!("step and duration must be positive");
    }

    let plan = read_descriptor(descriptor)?;
    if plan.is_embed() {
        println!("{}", output::warn("Embed descriptor: rendered in a frame, nothing to simulate"));
        return Ok(());
    }

    let levels = if script.probe {
        let PlaybackPlan::Engine(direct) = &plan else {
            bail!("embed descriptor cannot be probed");
        };
        let proxy = config.proxy_base.as_ref().map(ProxyGateway::new).transpose()?;
        ManifestProbe::new(proxy, timeout(&config))?
            .probe(&direct.source)
            .await?
            .levels
    } else {
        default_ladder()
    };

    let id = EpisodeId::new(script.episode.clone());
    let log = Arc::new(CallLog::default());
    let surface = RenderSurface::new("cli", Arc::new(HeadlessElement::new(Arc::clone(&log))));

    let positions = Arc::new(SessionPositionStore::new());
    if let Some(offset) = script.resume {
        positions.save(&id, offset);
    }
    // Stored preferences seed the session; the simulation never writes them back
    let stored = JsonFilePreferences::open_default()
        .map(|store| store.load())
        .unwrap_or_default();
    let preferences = Arc::new(MemoryPreferences::new(stored));
    let fetcher = Arc::new(HttpSubtitleFetcher::new(timeout(&config))?);
    let subtitle_timeout = timeout(&config);

    let mut controller = PlaybackController::new(
        config,
        surface,
        Arc::new(HeadlessFactory::new(Arc::clone(&log))),
        positions.clone(),
        preferences,
        fetcher,
    );
    let mut timeline = Timeline {
        rows: Vec::new(),
        log,
        events: controller.subscribe(),
    };

    let adaptive = match &plan {
        PlaybackPlan::Engine(direct) => direct.source.is_adaptive_manifest,
        PlaybackPlan::Embed(_) => false,
    };
    controller.load(Episode::from_plan(id.clone(), plan, false)?)?;
    timeline.record(0.0);

    if adaptive {
        controller.handle_demuxer_event(DemuxerEvent::ManifestParsed { levels });
    }
    controller.handle_media_event(MediaEvent::LoadedMetadata {
        duration: script.duration,
    });
    timeline.record(0.0);

    if controller.subtitles().is_loading()
        && tokio::time::timeout(subtitle_timeout, controller.wait_subtitles())
            .await
            .is_err()
    {
        warn!("Subtitle fetch timed out");
    }

    controller.play()?;
    let mut clock = controller.playback().current_time;
    timeline.record(clock);

    let mut injected = script.frag_errors == 0;
    while clock < script.duration {
        if !injected && clock >= 60.0 {
            for _ in 0..script.frag_errors {
                controller.handle_demuxer_event(frag_parsing_error());
            }
            injected = true;
            timeline.record(clock);
        }
        if !matches!(controller.state(), PlayerState::Playing | PlayerState::Buffering) {
            break;
        }

        clock = (clock + script.step).min(script.duration);
        controller.handle_media_event(MediaEvent::TimeUpdate(clock));
        timeline.record(clock);
    }

    let state = controller.state();
    let saved = positions.entry(&id).map(|p| p.offset_seconds);
    drop(controller);
    timeline.record(clock);

    match OutputFormat::from(format) {
        OutputFormat::Json => println!(
            "{}",
            output::to_json(&json!({
                "episode": id,
                "finalState": state,
                "savedOffset": saved,
                "timeline": timeline.rows,
            }))?
        ),
        OutputFormat::Table => println!("{}", output::timeline_table(&timeline.rows)),
        OutputFormat::Text => {
            for row in &timeline.rows {
                println!("  {} {:<5} {}", row.clock, row.kind, row.detail);
            }
        }
    }

    if OutputFormat::from(format) != OutputFormat::Json {
        println!();
        let summary = format!("Final state: {}", state);
        match state {
            PlayerState::Ended => println!("{}", output::ok(&summary)),
            PlayerState::Error => println!("{}", output::fail(&summary)),
            _ => println!("{}", output::warn(&summary)),
        }
        match saved {
            Some(offset) => println!("  Saved position: {}", output::clock(offset)),
            None => println!("  Saved position: (none)"),
        }
    }

    Ok(())
}
