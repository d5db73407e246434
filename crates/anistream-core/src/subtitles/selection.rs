//! Track list merging and automatic track selection

use super::search::SubtitleSearchResult;
use crate::types::{SubtitleOrigin, SubtitleTrack};
use std::collections::HashSet;

/// Build the selectable track for a resolved external search result.
///
/// Ids and labels are namespaced by provider so an external "English" never
/// collides with the native "English".
pub fn external_track(result: &SubtitleSearchResult, download_url: impl Into<String>) -> SubtitleTrack {
    SubtitleTrack {
        id: format!("external:{}:{}", result.source, result.id),
        lang: result.language.clone(),
        url: download_url.into(),
        label: Some(format!("{} [{}]", result.language, result.source)),
        origin: SubtitleOrigin::External,
        source: Some(result.source.clone()),
    }
}

/// Merge external tracks after the native ones.
///
/// Thumbnail tracks are dropped and identical entries collapse into one.
/// Distinct tracks sharing an id (two native "English" files) are all kept;
/// later ones get a `:2`, `:3`, ... suffix.
pub fn merge_tracks(native: &[SubtitleTrack], external: &[SubtitleTrack]) -> Vec<SubtitleTrack> {
    let mut merged: Vec<SubtitleTrack> = Vec::new();
    let mut ids = HashSet::new();

    for track in native.iter().chain(external.iter()) {
        if track.is_thumbnail() || merged.contains(track) {
            continue;
        }

        let mut track = track.clone();
        if !ids.insert(track.id.clone()) {
            let base = track.id.clone();
            let mut n = 2;
            while !ids.insert(format!("{}:{}", base, n)) {
                n += 1;
            }
            track.id = format!("{}:{}", base, n);
        }
        merged.push(track);
    }

    merged
}

fn haystack(track: &SubtitleTrack) -> String {
    format!(
        "{} {}",
        track.lang.to_lowercase(),
        track.label.as_deref().unwrap_or("").to_lowercase()
    )
}

fn is_language_code(track: &SubtitleTrack, code: &str) -> bool {
    let lang = track.lang.to_lowercase();
    lang == code || lang.starts_with(&format!("{}-", code))
}

fn is_latin_spanish(track: &SubtitleTrack) -> bool {
    let text = haystack(track);
    text.contains("latin") || text.contains("latam") || text.contains("latinoam")
        || track.lang.eq_ignore_ascii_case("es-419")
}

fn is_spanish(track: &SubtitleTrack) -> bool {
    let text = haystack(track);
    text.contains("spanish") || text.contains("español") || text.contains("espanol")
        || is_language_code(track, "es")
}

fn is_english(track: &SubtitleTrack) -> bool {
    haystack(track).contains("english") || is_language_code(track, "en")
}

/// Pick the track to enable when a subtitle list arrives.
///
/// A track matching the user's stored choice wins. Otherwise Latin-American
/// Spanish, then any Spanish, then English, then the first non-thumbnail
/// track.
pub fn auto_select<'a>(
    tracks: &'a [SubtitleTrack],
    preferred: Option<&str>,
) -> Option<&'a SubtitleTrack> {
    let candidates: Vec<&SubtitleTrack> = tracks.iter().filter(|t| !t.is_thumbnail()).collect();

    if let Some(preferred) = preferred.filter(|p| !p.trim().is_empty()) {
        let chosen = candidates
            .iter()
            .find(|t| t.display_label().eq_ignore_ascii_case(preferred))
            .or_else(|| candidates.iter().find(|t| t.lang.eq_ignore_ascii_case(preferred)));
        if let Some(track) = chosen {
            return Some(*track);
        }
    }

    let ranked: [fn(&SubtitleTrack) -> bool; 3] = [is_latin_spanish, is_spanish, is_english];
    ranked
        .iter()
        .find_map(|matches| candidates.iter().find(|t| matches(**t)))
        .or_else(|| candidates.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(lang: &str) -> SubtitleTrack {
        SubtitleTrack::native(lang, format!("https://cdn.example.com/{}.vtt", lang))
    }

    fn result(id: &str, language: &str, source: &str) -> SubtitleSearchResult {
        SubtitleSearchResult {
            id: id.to_string(),
            language: language.to_string(),
            source: source.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_priority_order() {
        let tracks = vec![
            track("English"),
            track("Spanish"),
            track("Spanish (Latin America)"),
        ];
        assert_eq!(auto_select(&tracks, None).unwrap().lang, "Spanish (Latin America)");

        let tracks = vec![track("Portuguese"), track("English"), track("Spanish")];
        assert_eq!(auto_select(&tracks, None).unwrap().lang, "Spanish");

        let tracks = vec![track("Portuguese"), track("English")];
        assert_eq!(auto_select(&tracks, None).unwrap().lang, "English");
    }

    #[test]
    fn test_latin_markers_on_label() {
        let tracks = vec![
            track("Spanish"),
            track("es").with_label("Español (Latinoamérica)"),
        ];
        assert_eq!(auto_select(&tracks, None).unwrap().lang, "es");

        let tracks = vec![track("English"), track("es-LA").with_label("LATAM")];
        assert_eq!(auto_select(&tracks, None).unwrap().lang, "es-LA");
    }

    #[test]
    fn test_fallback_skips_thumbnails() {
        let tracks = vec![track("thumbnails"), track("Portuguese")];
        assert_eq!(auto_select(&tracks, None).unwrap().lang, "Portuguese");
        assert!(auto_select(&[track("thumbnails")], None).is_none());
        assert!(auto_select(&[], None).is_none());
    }

    #[test]
    fn test_user_choice_wins() {
        let tracks = vec![track("Spanish (Latin America)"), track("English")];
        assert_eq!(auto_select(&tracks, Some("english")).unwrap().lang, "English");
        // Unknown preference falls back to the priority list
        assert_eq!(
            auto_select(&tracks, Some("German")).unwrap().lang,
            "Spanish (Latin America)"
        );
    }

    #[test]
    fn test_merge_namespaces_external_tracks() {
        let native = vec![track("English"), track("thumbnails")];
        let external = vec![
            external_track(&result("42", "English", "opensubtitles"), "https://subs.example.com/42.srt"),
            external_track(&result("42", "English", "opensubtitles"), "https://subs.example.com/42.srt"),
        ];

        let merged = merge_tracks(&native, &external);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "native:English");
        assert_eq!(merged[1].id, "external:opensubtitles:42");
        assert_eq!(merged[1].display_label(), "English [opensubtitles]");
        assert_eq!(merged[1].origin, SubtitleOrigin::External);
    }

    #[test]
    fn test_same_language_native_tracks_kept() {
        let native = vec![
            SubtitleTrack::native("English", "https://cdn.example.com/en-full.vtt"),
            SubtitleTrack::native("English", "https://cdn.example.com/en-signs.vtt")
                .with_label("English (Signs)"),
            SubtitleTrack::native("English", "https://cdn.example.com/en-full.vtt"),
        ];

        let merged = merge_tracks(&native, &[]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "native:English");
        assert_eq!(merged[0].url, "https://cdn.example.com/en-full.vtt");
        assert_eq!(merged[1].id, "native:English:2");
        assert_eq!(merged[1].display_label(), "English (Signs)");

        // Ids stay stable when the list is merged again with external tracks
        let external = vec![external_track(
            &result("7", "English", "opensubtitles"),
            "https://subs.example.com/7.srt",
        )];
        let remerged = merge_tracks(&native, &external);
        assert_eq!(remerged[1].id, "native:English:2");
        assert_eq!(remerged.len(), 3);
    }
}
