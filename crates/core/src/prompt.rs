//! Prompt templates for viral clip discovery.
//!
//! Duration limits appear in both the system and the user prompt.

use crate::{
    format::{format_timestamp, parse_line_timestamp},
    options::{AnalyzeOptions, OutputPolicy, TimeBase},
    rubric::Rubric,
    types::TranscriptChunk,
};

static SYSTEM_PROMPT_HEADER: &str = r#"You are a short-form video producer. You find the moments in long videos that will perform best as standalone vertical clips (TikTok, Reels, Shorts).

INPUT: Video transcript with timestamps in format [MM:SS] text (or [H:MM:SS] past the first hour)"#;

fn factor_lines(rubric: &Rubric) -> String {
    rubric
        .factors
        .iter()
        .map(|f| format!("  - {} ({:.0}%): {}", f.name, f.weight, f.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn factor_example(rubric: &Rubric) -> String {
    rubric
        .factors
        .iter()
        .map(|f| format!("\"{}\": 0", f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_system_prompt(rubric: &Rubric, options: &AnalyzeOptions) -> String {
    format!(
        r##"{header}

TASK:
1. Find self-contained moments that hook a viewer immediately and pay off before the clip ends
2. Score every moment 0-100 for viral potential using the {rubric} rubric:
{factors}
3. A clip may stitch up to 3 non-adjacent segments that belong together; "order" sets playback order

OUTPUT: Respond with a JSON array only, no prose, no markdown fences:
[
  {{
    "startTime": 12.0,
    "endTime": 48.5,
    "text": "Exact transcript text of the clip",
    "viralScore": 0,
    "factors": {{ {example} }},
    "segments": [
      {{ "startTime": 12.0, "endTime": 48.5, "text": "Segment text", "order": 0 }}
    ],
    "suggestedTitle": "Scroll-stopping title",
    "hashtags": ["#tag1", "#tag2"],
    "reasoning": "Why this moment works as a short",
    "hookSuggestion": "Optional on-screen hook text"
  }}
]

RULES:
- Every clip MUST last between {min:.0} and {max:.0} seconds (endTime - startTime)
- Times are seconds as numbers, taken from the transcript timestamps
- Start on a complete sentence and end after the payoff, never mid-thought
- Clips must not overlap each other
- If nothing qualifies, respond with []"##,
        header = SYSTEM_PROMPT_HEADER,
        rubric = rubric.kind,
        factors = factor_lines(rubric),
        example = factor_example(rubric),
        min = options.min_clip_duration,
        max = options.max_clip_duration,
    )
}

fn selection_rule(options: &AnalyzeOptions) -> String {
    match (options.output, options.min_viral_score) {
        (OutputPolicy::TargetCount(n), Some(score)) => format!(
            "Find up to {n} clips. Only include clips with a viralScore of at least {score:.0}."
        ),
        (OutputPolicy::TargetCount(n), None) => format!("Find up to {n} clips."),
        (_, Some(score)) => {
            format!("Return every clip with a viralScore of at least {score:.0}.")
        }
        (_, None) => "Return every candidate clip and score each one honestly; \
                      low scores are fine, the editor decides."
            .to_string(),
    }
}

pub fn build_user_prompt(transcript_text: &str, options: &AnalyzeOptions) -> String {
    let time_rule = match options.time_base {
        TimeBase::Absolute => "Use the transcript timestamps as-is for startTime and endTime.",
        TimeBase::ChunkRelative => {
            "Timestamps start at 00:00 for this excerpt; use them as-is for startTime and endTime."
        }
    };

    format!(
        "{framing}\n\n{selection}\nEach clip must be {min:.0}-{max:.0} seconds long.\n{time_rule}\n\nTRANSCRIPT:\n{transcript}",
        framing = options.content_type.framing(),
        selection = selection_rule(options),
        min = options.min_clip_duration,
        max = options.max_clip_duration,
        time_rule = time_rule,
        transcript = transcript_text,
    )
}

/// Shift every leading `[timestamp]` in `text` back by `offset` seconds.
pub fn rebase_timestamps(text: &str, offset: f64) -> String {
    text.lines()
        .map(|line| match (parse_line_timestamp(line), line.find(']')) {
            (Some(ts), Some(close)) => format!(
                "[{}]{}",
                format_timestamp((ts - offset).max(0.0)),
                &line[close + 1..]
            ),
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the prompt pair for each chunk of one analysis.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    rubric: Rubric,
    options: AnalyzeOptions,
    system: String,
}

impl PromptBuilder {
    pub fn new(rubric: Rubric, options: AnalyzeOptions) -> Self {
        let system = build_system_prompt(&rubric, &options);
        Self {
            rubric,
            options,
            system,
        }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    pub fn user_prompt(&self, chunk: &TranscriptChunk, index: usize, total: usize) -> String {
        let text = match self.options.time_base {
            TimeBase::Absolute => chunk.text.clone(),
            TimeBase::ChunkRelative => rebase_timestamps(&chunk.text, chunk.start_offset),
        };
        let prompt = build_user_prompt(&text, &self.options);

        if total > 1 {
            format!(
                "This is part {} of {} of the video ({}–{}).\n\n{}",
                index + 1,
                total,
                format_timestamp(chunk.start_offset),
                format_timestamp(chunk.end_offset),
                prompt
            )
        } else {
            prompt
        }
    }

    /// Seconds the parser adds to the model's times for this chunk.
    pub fn time_offset(&self, chunk: &TranscriptChunk) -> f64 {
        match self.options.time_base {
            TimeBase::Absolute => 0.0,
            TimeBase::ChunkRelative => chunk.start_offset,
        }
    }
}
