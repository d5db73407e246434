//! Benchmark tests for anistream-core operations
//!
//! Run with: cargo bench -p anistream-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use anistream_core::engine::{adjacent_level, sort_levels};
use anistream_core::subtitles::{active_cue_at, parse_cues, strip_tags};
use anistream_core::types::*;

// ============================================================================
// Helpers
// ============================================================================

/// Generate a WebVTT document with N cues, two seconds each
fn generate_vtt(cue_count: usize) -> String {
    let mut vtt = String::from("WEBVTT\n\n");
    for i in 0..cue_count {
        let start = i as f64 * 2.0;
        let end = start + 1.8;
        vtt.push_str(&format!(
            "{}\n{} --> {}\n<i>Line {}</i> &amp; {{\\an8}}more\n\n",
            i + 1,
            timestamp(start),
            timestamp(end),
            i
        ));
    }
    vtt
}

fn timestamp(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let (h, rem) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, rem / 1000, rem % 1000)
}

fn generate_ladder(count: usize) -> Vec<QualityLevel> {
    let heights = [240u32, 360, 480, 720, 1080, 1440, 2160];
    (0..count)
        .map(|i| {
            let height = heights[i % heights.len()];
            QualityLevel::new(i as i32, height * 16 / 9, height, height as u64 * 4_000)
        })
        .collect()
}

/// Generate an HLS master playlist with N variants
#[cfg(feature = "hls")]
fn generate_hls_master(variant_count: usize) -> String {
    let mut m3u8 = String::from("#EXTM3U\n");
    let bandwidths = [400_000u64, 800_000, 1_400_000, 2_800_000, 5_000_000];
    let resolutions = ["426x240", "640x360", "854x480", "1280x720", "1920x1080"];
    for i in 0..variant_count {
        let idx = i % bandwidths.len();
        m3u8.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n",
            bandwidths[idx], resolutions[idx]
        ));
        m3u8.push_str(&format!("variant_{}/index.m3u8\n", i));
    }
    m3u8
}

// ============================================================================
// Subtitle Benchmarks
// ============================================================================

fn bench_parse_cues(c: &mut Criterion) {
    let mut group = c.benchmark_group("Subtitle Parsing");

    // Short clip, full episode, feature length
    for &count in &[50, 400, 1500] {
        let doc = generate_vtt(count);
        group.bench_with_input(BenchmarkId::new("parse_cues", count), &doc, |b, doc| {
            b.iter(|| black_box(parse_cues(black_box(doc))))
        });
    }

    group.finish();
}

fn bench_active_cue(c: &mut Criterion) {
    let mut group = c.benchmark_group("Active Cue Lookup");

    for &count in &[50, 400, 1500] {
        let cues = parse_cues(&generate_vtt(count));
        let last = count as f64 * 2.0;
        group.bench_with_input(BenchmarkId::new("active_cue_at", count), &cues, |b, cues| {
            b.iter(|| {
                // Tick a quarter second like a time update would
                let mut t = 0.0;
                while t < last {
                    black_box(active_cue_at(cues, t));
                    t += 0.25;
                }
            })
        });
    }

    group.finish();
}

fn bench_strip_tags(c: &mut Criterion) {
    let text = "<b><i>Hello</i></b> {\\an8}there &amp; &lt;everyone&gt;&nbsp;here";
    c.bench_function("strip_tags", |b| b.iter(|| black_box(strip_tags(black_box(text)))));
}

// ============================================================================
// Quality Level Benchmarks
// ============================================================================

fn bench_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("Quality Levels");

    for &count in &[3, 7, 20] {
        let ladder = generate_ladder(count);
        group.bench_with_input(BenchmarkId::new("sort_levels", count), &ladder, |b, ladder| {
            b.iter(|| {
                let mut levels = ladder.clone();
                sort_levels(&mut levels);
                black_box(levels)
            })
        });

        let mut sorted = ladder.clone();
        sort_levels(&mut sorted);
        group.bench_with_input(BenchmarkId::new("adjacent_level", count), &sorted, |b, sorted| {
            b.iter(|| {
                let mut current = -1;
                for _ in 0..15 {
                    current = adjacent_level(sorted, current).unwrap_or(current);
                }
                black_box(current)
            })
        });
    }

    group.finish();
}

#[cfg(feature = "hls")]
fn bench_parse_manifest(c: &mut Criterion) {
    use anistream_core::engine::probe::parse_manifest;

    let mut group = c.benchmark_group("Manifest Parsing");

    for &count in &[3, 5, 10] {
        let manifest = generate_hls_master(count);
        group.bench_with_input(
            BenchmarkId::new("parse_manifest", count),
            &manifest,
            |b, manifest| b.iter(|| black_box(parse_manifest(black_box(manifest)))),
        );
    }

    group.finish();
}

#[cfg(not(feature = "hls"))]
fn bench_parse_manifest(_c: &mut Criterion) {}

criterion_group!(
    benches,
    bench_parse_cues,
    bench_active_cue,
    bench_strip_tags,
    bench_levels,
    bench_parse_manifest,
);
criterion_main!(benches);
