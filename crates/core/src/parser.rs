//! Tolerant parsing of model output into [`ViralClip`]s.
//!
//! Model output is untrusted: it may open with a reasoning block, wrap the
//! array in markdown or prose, and encode numbers as strings. Every field goes
//! through an explicit coercion with an explicit default; an element missing a
//! usable start, end or score is dropped. Parsing never fails, it only yields
//! fewer clips.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    format::parse_timestamp,
    rubric::Rubric,
    types::{ClipSegment, ViralClip, ViralFactors},
};

pub const UNTITLED_CLIP: &str = "Untitled clip";

const REASONING_CLOSERS: &[&str] = &["</think>", "</thinking>", "</reasoning>"];
const EXCERPT_CHARS: usize = 200;

/// Drop everything up to and including the last reasoning-block closer.
pub fn strip_reasoning(raw: &str) -> &str {
    REASONING_CLOSERS
        .iter()
        .filter_map(|closer| raw.rfind(closer).map(|idx| idx + closer.len()))
        .max()
        .map_or(raw, |end| &raw[end..])
}

/// First `[` through last `]`.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

pub(crate) fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push('…');
    }
    out
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

fn string_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers and numeric strings (`"80"`, `" 80.5 "`, `"80%"`).
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Like [`coerce_number`], additionally accepting `MM:SS` / `H:MM:SS` strings.
pub fn coerce_seconds(value: &Value) -> Option<f64> {
    coerce_number(value).or_else(|| match value {
        Value::String(s) if s.contains(':') => parse_timestamp(s),
        _ => None,
    })
}

fn parse_factors(obj: &Map<String, Value>, rubric: &Rubric) -> ViralFactors {
    let Some(raw) = obj.get("factors").and_then(Value::as_object) else {
        return ViralFactors::new();
    };

    let mut factors = ViralFactors::new();
    for (key, value) in raw {
        match (rubric.factor(key), coerce_number(value)) {
            (Some(factor), Some(score)) => {
                factors.insert(factor.name.to_string(), score.clamp(0.0, 100.0));
            }
            (None, _) => debug!(factor = %key, rubric = %rubric.kind, "ignoring unknown factor"),
            (Some(_), None) => debug!(factor = %key, "ignoring non-numeric factor score"),
        }
    }
    factors
}

fn parse_hashtags(obj: &Map<String, Value>) -> Vec<String> {
    let raw: Vec<String> = match obj.get("hashtags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split(|c: char| c.is_whitespace() || c == ',')
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    raw.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty() && *tag != "#")
        .map(|tag| {
            if tag.starts_with('#') {
                tag.to_string()
            } else {
                format!("#{tag}")
            }
        })
        .collect()
}

fn parse_segments(obj: &Map<String, Value>, offset: f64) -> Vec<ClipSegment> {
    let Some(items) = obj.get("segments").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut segments: Vec<ClipSegment> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let seg = item.as_object()?;
            let start = field(seg, &["startTime", "start_time", "start"]).and_then(coerce_seconds)?;
            let end = field(seg, &["endTime", "end_time", "end"]).and_then(coerce_seconds)?;
            if end <= start {
                return None;
            }
            let order = field(seg, &["order"])
                .and_then(coerce_number)
                .filter(|o| *o >= 0.0)
                .map_or(index as u32, |o| o as u32);

            Some(ClipSegment {
                start_time: start + offset,
                end_time: end + offset,
                text: string_field(seg, &["text"]).unwrap_or_default(),
                order,
            })
        })
        .collect();

    segments.sort_by_key(|s| s.order);

    let has_duplicates = segments.windows(2).any(|w| w[0].order == w[1].order);
    if has_duplicates {
        for (i, seg) in segments.iter_mut().enumerate() {
            seg.order = i as u32;
        }
    }

    segments
}

fn parse_clip(item: &Value, offset: f64, rubric: &Rubric) -> Option<ViralClip> {
    let obj = item.as_object()?;
    let start = field(obj, &["startTime", "start_time", "start"]).and_then(coerce_seconds)?;
    let end = field(obj, &["endTime", "end_time", "end"]).and_then(coerce_seconds)?;
    let score = field(obj, &["viralScore", "viral_score", "score"]).and_then(coerce_number)?;

    let text = string_field(obj, &["text", "transcript"]).unwrap_or_default();

    let mut segments = parse_segments(obj, offset);
    if segments.is_empty() {
        segments.push(ClipSegment {
            start_time: start + offset,
            end_time: end + offset,
            text: text.clone(),
            order: 0,
        });
    }

    let is_reordered = segments
        .windows(2)
        .any(|w| w[1].start_time < w[0].start_time);
    let start_time = segments
        .iter()
        .map(|s| s.start_time)
        .fold(f64::INFINITY, f64::min);
    let end_time = segments
        .iter()
        .map(|s| s.end_time)
        .fold(f64::NEG_INFINITY, f64::max);

    Some(ViralClip {
        start_time,
        end_time,
        text,
        viral_score: score.clamp(0.0, 100.0),
        factors: parse_factors(obj, rubric),
        segments,
        suggested_title: string_field(obj, &["suggestedTitle", "suggested_title", "title"])
            .unwrap_or_else(|| UNTITLED_CLIP.to_string()),
        hashtags: parse_hashtags(obj),
        reasoning: string_field(obj, &["reasoning", "reason"]).unwrap_or_default(),
        hook_suggestion: string_field(obj, &["hookSuggestion", "hook_suggestion"]),
        is_reordered,
    })
}

/// Extract clips from raw model text, shifting every time by `time_offset` seconds.
pub fn parse_clips(raw: &str, time_offset: f64, rubric: &Rubric) -> Vec<ViralClip> {
    let body = strip_reasoning(raw);

    let Some(json) = extract_json_array(body) else {
        warn!(excerpt = %excerpt(body), "no JSON array in model output");
        return Vec::new();
    };

    let items = match serde_json::from_str::<Value>(json) {
        Ok(Value::Array(items)) => items,
        Ok(_) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, excerpt = %excerpt(json), "model output is not valid JSON");
            return Vec::new();
        }
    };

    let total = items.len();
    let clips: Vec<ViralClip> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let clip = parse_clip(item, time_offset, rubric);
            if clip.is_none() {
                debug!(index, "discarding clip without numeric startTime/endTime/viralScore");
            }
            clip
        })
        .collect();

    debug!(parsed = clips.len(), total, "parsed model output");
    clips
}
