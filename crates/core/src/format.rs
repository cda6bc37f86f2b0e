use crate::types::{Transcript, ViralClip};

/// Format seconds as `MM:SS`, or `H:MM:SS` once the hour mark is reached.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Parse `SS`, `MM:SS` or `H:MM:SS` (fractional seconds allowed) back into seconds.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let part = part.trim();
        if part.is_empty() {
            return None;
        }
        let is_last = i == parts.len() - 1;
        let n: f64 = if is_last {
            part.parse().ok()?
        } else {
            part.parse::<u32>().ok()? as f64
        };
        if !n.is_finite() || n < 0.0 {
            return None;
        }
        total = total * 60.0 + n;
    }

    Some(total)
}

/// Leading `[H:MM:SS]` / `[MM:SS]` timestamp of a formatted transcript line.
pub fn parse_line_timestamp(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix('[')?;
    let close = rest.find(']')?;
    let inner = &rest[..close];
    if !inner.contains(':') {
        return None;
    }
    parse_timestamp(inner)
}

/// Format transcript segments with timestamps, one `[MM:SS] text` line per segment.
///
/// Segments are emitted in `start` order regardless of input order.
pub fn format_transcript_with_timestamps(transcript: &Transcript) -> String {
    let mut segments: Vec<_> = transcript
        .segments
        .iter()
        .filter(|seg| !seg.text.trim().is_empty())
        .collect();
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    segments
        .iter()
        .map(|seg| {
            let text = seg.text.trim();
            match &seg.speaker {
                Some(speaker) => format!("[{}] {}: {}", format_timestamp(seg.start), speaker, text),
                None => format!("[{}] {}", format_timestamp(seg.start), text),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a ranked clip list as human-readable markdown
pub fn format_clips_readable(clips: &[ViralClip]) -> String {
    let mut output = String::new();

    for (i, clip) in clips.iter().enumerate() {
        let start = format_timestamp(clip.start_time);
        let end = format_timestamp(clip.end_time);
        output.push_str(&format!(
            "### {}. [{}–{}] {} ({:.0})\n\n",
            i + 1,
            start,
            end,
            clip.suggested_title,
            clip.viral_score
        ));

        if clip.segments.len() > 1 {
            for seg in &clip.segments {
                output.push_str(&format!(
                    "  {}. [{}–{}] {}\n",
                    seg.order,
                    format_timestamp(seg.start_time),
                    format_timestamp(seg.end_time),
                    seg.text
                ));
            }
            if clip.is_reordered {
                output.push_str("  (segments play out of chronological order)\n");
            }
            output.push('\n');
        }

        if let Some(hook) = &clip.hook_suggestion {
            output.push_str(&format!("**Hook:** {}\n\n", hook));
        }
        if !clip.reasoning.is_empty() {
            output.push_str(&format!("{}\n\n", clip.reasoning));
        }
        if !clip.hashtags.is_empty() {
            output.push_str(&format!("{}\n\n", clip.hashtags.join(" ")));
        }
    }

    output
}
