//! Output formatting for CLI

use anistream_core::subtitles::SubtitleSearchResult;
use anistream_core::{QualityLevel, SubtitleCue, SubtitlePreset};
use console::style;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON for `--format json`
pub fn to_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

pub fn heading(text: &str) -> String {
    style(text).bold().cyan().to_string()
}

pub fn ok(text: &str) -> String {
    style(text).green().to_string()
}

pub fn warn(text: &str) -> String {
    style(text).yellow().to_string()
}

pub fn fail(text: &str) -> String {
    style(text).red().bold().to_string()
}

/// `mm:ss.mmm`, or `h:mm:ss.mmm` past the hour
pub fn clock(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, secs, millis)
    }
}

#[derive(Tabled)]
struct CueRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Text")]
    text: String,
}

pub fn cue_table(cues: &[SubtitleCue]) -> String {
    let rows = cues.iter().enumerate().map(|(i, cue)| CueRow {
        index: i + 1,
        start: clock(cue.start),
        end: clock(cue.end),
        text: cue.text.replace('\n', " / "),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct LevelRow {
    #[tabled(rename = "Index")]
    index: i32,
    #[tabled(rename = "Quality")]
    quality: &'static str,
    #[tabled(rename = "Resolution")]
    resolution: String,
    #[tabled(rename = "Bitrate")]
    bitrate: String,
}

pub fn level_table(levels: &[QualityLevel]) -> String {
    let rows = levels.iter().map(|level| LevelRow {
        index: level.index,
        quality: level.quality_name(),
        resolution: format!("{}x{}", level.width, level.height),
        bitrate: format!("{} kbps", level.bitrate / 1000),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct SearchRow {
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Match")]
    score: String,
    #[tabled(rename = "Downloads")]
    downloads: u64,
    #[tabled(rename = "Rating")]
    rating: String,
    #[tabled(rename = "Flags")]
    flags: String,
    #[tabled(rename = "Release")]
    release: String,
}

pub fn search_table(results: &[SubtitleSearchResult]) -> String {
    let rows = results.iter().map(|r| {
        let mut flags = Vec::new();
        if r.is_trusted {
            flags.push("trusted");
        }
        if r.is_ai_translated {
            flags.push("ai");
        }
        SearchRow {
            language: r.language.clone(),
            source: r.source.clone(),
            score: format!("{:.0}%", r.match_score * 100.0),
            downloads: r.download_count,
            rating: format!("{:.1}", r.rating),
            flags: flags.join(","),
            release: r.release.clone().unwrap_or_default(),
        }
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct PresetRow {
    #[tabled(rename = "Id")]
    id: &'static str,
    #[tabled(rename = "Name")]
    name: &'static str,
    #[tabled(rename = "Color")]
    color: &'static str,
    #[tabled(rename = "Background")]
    background: &'static str,
    #[tabled(rename = "Weight")]
    weight: u16,
}

pub fn preset_table(presets: &[SubtitlePreset]) -> String {
    let rows = presets.iter().map(|p| PresetRow {
        id: p.id,
        name: p.name,
        color: p.font_color,
        background: p.background_color,
        weight: p.font_weight,
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

/// One simulated event, in order of occurrence
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct TimelineRow {
    #[tabled(rename = "Clock")]
    pub clock: String,
    #[tabled(rename = "Kind")]
    pub kind: &'static str,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

pub fn timeline_table(rows: &[TimelineRow]) -> String {
    Table::new(rows.to_vec()).with(Style::rounded()).to_string()
}
