//! Subtitle parsing - WebVTT and SRT
//!
//! A single tolerant pass handles both formats: everything before the first
//! timing line (the `WEBVTT` header, metadata, SRT indexes) is skipped, text
//! lines accumulate until a blank line or the next timing line, and blocks
//! left without text are dropped.
//!
//! # Example
//!
//! ```rust
//! use anistream_core::subtitles::parse_cues;
//!
//! let vtt = "WEBVTT\n\n00:00:01.000 --> 00:00:04.000\n<i>Hello</i>, world!\n";
//! let cues = parse_cues(vtt);
//! assert_eq!(cues.len(), 1);
//! assert_eq!(cues[0].text, "Hello, world!");
//! ```

use crate::types::SubtitleCue;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{char, one_of, space0};
use nom::combinator::{map, map_opt, map_res, opt};
use nom::sequence::preceded;
use nom::{IResult, Parser};

/// Widest leading (hours or minutes) field accepted
const MAX_LEAD_DIGITS: usize = 9;

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn lead(input: &str) -> IResult<&str, u64> {
    map_res(take_while_m_n(1, MAX_LEAD_DIGITS, is_digit), |d: &str| d.parse::<u64>()).parse(input)
}

fn two_digits(input: &str) -> IResult<&str, u64> {
    map_res(take_while_m_n(1, 2, is_digit), |d: &str| d.parse::<u64>()).parse(input)
}

fn millis(input: &str) -> IResult<&str, &str> {
    take_while_m_n(1, 3, is_digit).parse(input)
}

fn fraction(digits: &str) -> f64 {
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0.0, |acc, d| acc * 10.0 + d as f64);
    value / 10f64.powi(digits.len() as i32)
}

fn whole_seconds(first: u64, second: u64, third: Option<u64>) -> Option<u64> {
    match third {
        Some(seconds) => first
            .checked_mul(3600)?
            .checked_add(second.checked_mul(60)?)?
            .checked_add(seconds),
        None => first.checked_mul(60)?.checked_add(second),
    }
}

/// `HH:MM:SS.mmm` or `MM:SS.mmm`, with `.` or `,` before the milliseconds
fn timestamp(input: &str) -> IResult<&str, f64> {
    map_opt(
        (
            lead,
            char(':'),
            two_digits,
            opt(preceded(char(':'), two_digits)),
            one_of(".,"),
            millis,
        ),
        |(first, _, second, third, _, frac)| {
            whole_seconds(first, second, third).map(|whole| whole as f64 + fraction(frac))
        },
    )
    .parse(input)
}

/// `<start> --> <end>`; cue settings after the end time are ignored
fn timing(input: &str) -> IResult<&str, (f64, f64)> {
    map(
        (space0, timestamp, space0, tag("-->"), space0, timestamp),
        |(_, start, _, _, _, end)| (start, end),
    )
    .parse(input)
}

/// Parse a single timestamp into seconds
pub fn parse_timestamp(input: &str) -> Option<f64> {
    match timestamp(input.trim()) {
        Ok((rest, seconds)) if rest.is_empty() => Some(seconds),
        _ => None,
    }
}

/// Parse a timing line into `(start, end)`
pub fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    timing(line).ok().map(|(_, times)| times)
}

/// Strip inline markup: `<i>`, `<v Speaker>`, `</b>` and ASS overrides like `{\an8}`
pub fn strip_tags(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                for c in chars.by_ref() {
                    if c == '>' {
                        break;
                    }
                }
            }
            '{' if chars.peek() == Some(&'\\') => {
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                }
            }
            _ => result.push(ch),
        }
    }

    result
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
}

struct PendingCue {
    start: f64,
    end: f64,
    lines: Vec<String>,
}

impl PendingCue {
    fn finish(self) -> Option<SubtitleCue> {
        let text = self
            .lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return None;
        }
        Some(SubtitleCue::new(self.start, self.end, text))
    }
}

/// Parse WebVTT or SRT content into cues, in file order.
///
/// Malformed input yields fewer (possibly zero) cues, never an error.
pub fn parse_cues(input: &str) -> Vec<SubtitleCue> {
    let mut cues = Vec::new();
    let mut pending: Option<PendingCue> = None;

    for raw in input.lines() {
        let line = raw.trim_end_matches('\r');

        if let Some((start, end)) = parse_timing_line(line) {
            if let Some(cue) = pending.take().and_then(PendingCue::finish) {
                cues.push(cue);
            }
            pending = Some(PendingCue {
                start,
                // Inverted cues collapse to a zero-length cue at `start`
                end: end.max(start),
                lines: Vec::new(),
            });
            continue;
        }

        if line.trim().is_empty() {
            if let Some(cue) = pending.take().and_then(PendingCue::finish) {
                cues.push(cue);
            }
            continue;
        }

        if let Some(cue) = pending.as_mut() {
            cue.lines.push(strip_tags(line));
        }
    }

    if let Some(cue) = pending.take().and_then(PendingCue::finish) {
        cues.push(cue);
    }

    cues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_webvtt() {
        let vtt = r#"WEBVTT
Kind: captions
Language: en

00:00:00.000 --> 00:00:04.000
Hello, world!

00:00:04.000 --> 00:00:08.000 align:center position:50%
This is a subtitle.
Second line.
"#;

        let cues = parse_cues(vtt);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hello, world!");
        assert_eq!(cues[0].start, 0.0);
        assert_eq!(cues[0].end, 4.0);
        assert_eq!(cues[1].text, "This is a subtitle.\nSecond line.");
    }

    #[test]
    fn test_parse_srt() {
        let srt = "1\r\n00:00:01,500 --> 00:00:04,000\r\nHello, world!\r\n\r\n2\r\n00:00:04,000 --> 00:00:08,250\r\nThis is a subtitle.\r\n";

        let cues = parse_cues(srt);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, 1.5);
        assert_eq!(cues[0].text, "Hello, world!");
        assert_eq!(cues[1].end, 8.25);
    }

    #[test]
    fn test_timestamp_parsing() {
        assert_eq!(parse_timestamp("00:00:05.500"), Some(5.5));
        assert_eq!(parse_timestamp("01:30:00.000"), Some(5400.0));
        assert_eq!(parse_timestamp("05:30.000"), Some(330.0));
        assert_eq!(parse_timestamp("00:01,250"), Some(1.25));
        assert_eq!(parse_timestamp("5.5"), None);
        assert_eq!(parse_timestamp("00:05"), None);
        assert_eq!(parse_timestamp("00:00:01.5"), Some(1.5));
    }

    #[test]
    fn test_oversized_fields_rejected() {
        assert_eq!(parse_timestamp("9999999999999999999:00:00.000"), None);
        assert_eq!(parse_timestamp("00:00:01.0000000000000000000000"), None);
        assert_eq!(parse_timestamp("00:123:00.000"), None);

        let millis = "9".repeat(400);
        assert_eq!(parse_timestamp(&format!("00:00:01.{}", millis)), None);
    }

    #[test]
    fn test_hostile_timing_lines_skipped() {
        let vtt = format!(
            "WEBVTT\n\n9999999999999999999:00:00.000 --> 9999999999999999999:00:01.000\nOverflow\n\n\
             00:00:01.{} --> 00:00:02.000\nLong fraction\n\n\
             00:00:03.000 --> 00:00:04.000\nKept\n",
            "9".repeat(400)
        );
        let cues = parse_cues(&vtt);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Kept");
        assert!(cues.iter().all(|c| c.start.is_finite() && c.end.is_finite()));
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<v Speaker>Hello, <b>world</b>!</v>"), "Hello, world!");
        assert_eq!(strip_tags("{\\an8}Top text"), "Top text");
        assert_eq!(strip_tags("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(strip_tags("{not a tag}"), "{not a tag}");
    }

    #[test]
    fn test_empty_cues_discarded() {
        let vtt = "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\n<i></i>\n\n00:00:03.000 --> 00:00:04.000\nKept\n";
        let cues = parse_cues(vtt);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Kept");
    }

    #[test]
    fn test_inverted_cue_clamped() {
        let cues = parse_cues("00:00:10.000 --> 00:00:05.000\nBackwards\n");
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].start, 10.0);
        assert_eq!(cues[0].end, 10.0);
    }

    #[test]
    fn test_garbage_yields_nothing() {
        assert!(parse_cues("").is_empty());
        assert!(parse_cues("<html><body>404 Not Found</body></html>").is_empty());
        assert!(parse_cues("WEBVTT\n\nNOTE only a note\n").is_empty());
    }

    #[test]
    fn test_text_followed_by_timing_without_blank() {
        let vtt = "00:00:01.000 --> 00:00:02.000\nFirst\n00:00:02.000 --> 00:00:03.000\nSecond\n";
        let cues = parse_cues(vtt);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].text, "Second");
    }
}
