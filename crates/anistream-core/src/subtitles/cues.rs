//! Active cue lookup keyed by the playback clock

use crate::types::SubtitleCue;

/// Text of the first cue (in list order) with `start <= time <= end`.
///
/// Returns `""` when nothing is active. Unsorted or overlapping lists and
/// non-finite times are tolerated.
pub fn active_cue_at(cues: &[SubtitleCue], time: f64) -> &str {
    if !time.is_finite() {
        return "";
    }
    cues.iter()
        .find(|cue| cue.contains(time))
        .map(|cue| cue.text.as_str())
        .unwrap_or("")
}

/// Find cues active at a given time
pub fn cues_at_time(cues: &[SubtitleCue], time: f64) -> Vec<&SubtitleCue> {
    cues.iter().filter(|c| c.contains(time)).collect()
}
