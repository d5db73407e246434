//! Quality level ordering and switch targets

use crate::types::QualityLevel;

/// Sort levels by descending resolution, then descending bitrate
pub fn sort_levels(levels: &mut [QualityLevel]) {
    levels.sort_by(|a, b| {
        (b.height, b.width, b.bitrate).cmp(&(a.height, a.width, a.bitrate))
    });
}

/// Position of the level with demuxer index `index` in the sorted list.
///
/// Automatic (-1) or unknown indexes map to the top rendition.
fn position_of(levels: &[QualityLevel], index: i32) -> usize {
    levels.iter().position(|l| l.index == index).unwrap_or(0)
}

/// Neighbouring rendition used by the fragment-parsing mitigation.
///
/// Steps down one rung when possible, otherwise up one, so repeated calls
/// toggle between the two nearest levels at the bottom of the ladder.
pub fn adjacent_level(levels: &[QualityLevel], current: i32) -> Option<i32> {
    if levels.len() < 2 {
        return None;
    }
    let pos = position_of(levels, current);
    let next = if pos + 1 < levels.len() { pos + 1 } else { pos - 1 };
    Some(levels[next].index)
}

/// Any rendition other than the current one, used to route around codec errors
pub fn alternate_level(levels: &[QualityLevel], current: i32) -> Option<i32> {
    if levels.len() < 2 {
        return None;
    }
    let pos = position_of(levels, current);
    Some(levels[(pos + 1) % levels.len()].index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Vec<QualityLevel> {
        let mut levels = vec![
            QualityLevel::new(0, 640, 360, 800_000),
            QualityLevel::new(1, 1920, 1080, 5_000_000),
            QualityLevel::new(2, 1280, 720, 2_800_000),
        ];
        sort_levels(&mut levels);
        levels
    }

    #[test]
    fn test_sorted_descending() {
        let levels = ladder();
        let heights: Vec<u32> = levels.iter().map(|l| l.height).collect();
        assert_eq!(heights, vec![1080, 720, 360]);
    }

    #[test]
    fn test_adjacent_toggles_at_bottom() {
        let levels = ladder();
        // 1080p -> 720p
        assert_eq!(adjacent_level(&levels, 1), Some(2));
        // 720p -> 360p
        assert_eq!(adjacent_level(&levels, 2), Some(0));
        // 360p -> 720p
        assert_eq!(adjacent_level(&levels, 0), Some(2));
        // auto starts from the top
        assert_eq!(adjacent_level(&levels, -1), Some(2));
    }

    #[test]
    fn test_single_level_has_no_alternate() {
        let levels = vec![QualityLevel::new(0, 1280, 720, 2_000_000)];
        assert_eq!(adjacent_level(&levels, 0), None);
        assert_eq!(alternate_level(&levels, 0), None);
    }

    #[test]
    fn test_alternate_wraps() {
        let levels = ladder();
        assert_eq!(alternate_level(&levels, 0), Some(1));
        assert_eq!(alternate_level(&levels, 1), Some(2));
    }
}
