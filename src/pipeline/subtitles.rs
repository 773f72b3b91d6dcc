//! Subtitle emission (S6, §4.6.4, §6 "Subtitle file format"). A cue is
//! `index\nhh:mm:ss,mmm --> hh:mm:ss,mmm\n<text>\n\n`; RTL target languages
//! get their text wrapped in directional controls.

use crate::errors::{AppError, PipelineError};

/// A timed text cue produced by transcription (S4) and consumed by
/// translation (S5) and emission (S6). `start`/`end` are seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Unicode directional-isolate controls (§4.6.4). RLI/PDI bracket RTL cue
/// text; LRI/PDI bracket embedded digit groups so numerals stay
/// left-to-right inside an RTL line.
const RLI: char = '\u{2067}'; // RIGHT-TO-LEFT ISOLATE
const LRI: char = '\u{2066}'; // LEFT-TO-RIGHT ISOLATE
const PDI: char = '\u{2069}'; // POP DIRECTIONAL ISOLATE

/// Target languages written right-to-left (§4.6.4, GLOSSARY "RTL").
pub fn is_rtl(lang: &str) -> bool {
    matches!(lang, "he" | "ar" | "fa" | "ur")
}

/// Wraps cue text in directional isolates for RTL rendering: the whole cue
/// in an RLI/PDI pair, with any embedded digit run additionally isolated as
/// strong-LTR so numbers don't get visually reversed, and mirrored
/// punctuation (parentheses) swapped since visual order flips under RTL.
pub fn wrap_rtl_cue(text: &str) -> String {
    let mirrored = mirror_punctuation(text);
    let mut out = String::with_capacity(mirrored.len() + 4);
    out.push(RLI);

    let mut chars = mirrored.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            let mut digits = String::new();
            digits.push(c);
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() {
                    digits.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            out.push(LRI);
            out.push_str(&digits);
            out.push(PDI);
        } else {
            out.push(c);
        }
    }

    out.push(PDI);
    out
}

fn mirror_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '(' => ')',
            ')' => '(',
            _ => c,
        })
        .collect()
}

fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as i64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let total_m = total_s / 60;
    let m = total_m % 60;
    let h = total_m / 60;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

fn parse_timestamp(s: &str) -> Result<f64, AppError> {
    let (hms, ms) = s.split_once(',').ok_or_else(emit_error)?;
    let mut parts = hms.split(':');
    let h: f64 = parts.next().ok_or_else(emit_error)?.parse().map_err(|_| emit_error())?;
    let m: f64 = parts.next().ok_or_else(emit_error)?.parse().map_err(|_| emit_error())?;
    let s: f64 = parts.next().ok_or_else(emit_error)?.parse().map_err(|_| emit_error())?;
    let ms: f64 = ms.parse().map_err(|_| emit_error())?;
    Ok(h * 3600.0 + m * 60.0 + s + ms / 1000.0)
}

fn emit_error() -> AppError {
    AppError::Pipeline(PipelineError::SubtitleEmitError {
        detail: "malformed subtitle timing line".to_string(),
    })
}

/// Renders a full cue list to SRT text. `rtl` wraps each cue's text in
/// directional isolates; the timing line is never wrapped (§6).
pub fn emit_srt(segments: &[Segment], rtl: bool) -> String {
    let mut out = String::new();
    for seg in segments {
        let text = if rtl { wrap_rtl_cue(&seg.text) } else { seg.text.clone() };
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            seg.index,
            format_timestamp(seg.start),
            format_timestamp(seg.end),
            text
        ));
    }
    out
}

/// Inverse of [`emit_srt`] for un-wrapped (non-RTL) cues; used by the
/// round-trip test in §8. RTL-wrapped text round-trips as the literal text
/// including its isolate markers, since unwrapping is a rendering concern
/// the consuming player handles, not this emitter.
pub fn parse_srt(input: &str) -> Result<Vec<Segment>, AppError> {
    let mut segments = Vec::new();
    for block in input.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let mut lines = block.lines();
        let index: usize = lines
            .next()
            .ok_or_else(emit_error)?
            .trim()
            .parse()
            .map_err(|_| emit_error())?;
        let timing = lines.next().ok_or_else(emit_error)?;
        let (start_str, end_str) = timing.split_once(" --> ").ok_or_else(emit_error)?;
        let start = parse_timestamp(start_str.trim())?;
        let end = parse_timestamp(end_str.trim())?;
        let text = lines.collect::<Vec<_>>().join("\n");

        segments.push(Segment { index, start, end, text });
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Segment> {
        vec![
            Segment { index: 1, start: 0.0, end: 1.5, text: "Hello".to_string() },
            Segment { index: 2, start: 1.5, end: 3.25, text: "World".to_string() },
        ]
    }

    #[test]
    fn round_trip_is_byte_equal_for_non_rtl() {
        let segments = sample();
        let srt = emit_srt(&segments, false);
        let parsed = parse_srt(&srt).unwrap();
        assert_eq!(parsed, segments);
        let re_emitted = emit_srt(&parsed, false);
        assert_eq!(srt, re_emitted);
    }

    #[test]
    fn rtl_cue_is_wrapped_in_isolates() {
        let wrapped = wrap_rtl_cue("hello");
        assert!(wrapped.starts_with(RLI));
        assert!(wrapped.ends_with(PDI));
    }

    #[test]
    fn rtl_digits_get_ltr_isolate() {
        let wrapped = wrap_rtl_cue("room 42");
        assert!(wrapped.contains(LRI));
        assert!(wrapped.contains("42"));
    }

    #[test]
    fn mirrors_parentheses() {
        assert_eq!(mirror_punctuation("(note)"), ")note(");
    }

    #[test]
    fn timestamp_format_matches_srt_convention() {
        assert_eq!(format_timestamp(3723.456), "01:02:03,456");
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
    }

    #[test]
    fn is_rtl_recognizes_closed_set() {
        assert!(is_rtl("he"));
        assert!(is_rtl("ar"));
        assert!(!is_rtl("en"));
        assert!(!is_rtl("es"));
    }
}
