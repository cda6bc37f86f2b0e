use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{overlap::OverlapStrategy, rubric::RubricKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    General,
    Podcast,
    Interview,
    Tutorial,
    Vlog,
}

impl ContentType {
    pub fn name(&self) -> &'static str {
        match self {
            ContentType::General => "general",
            ContentType::Podcast => "podcast",
            ContentType::Interview => "interview",
            ContentType::Tutorial => "tutorial",
            ContentType::Vlog => "vlog",
        }
    }

    /// One-line framing interpolated into the user prompt.
    pub fn framing(&self) -> &'static str {
        match self {
            ContentType::General => {
                "This is general video content. Look for any moment that works on its own as a short."
            }
            ContentType::Podcast => {
                "This is a podcast. Favor strong opinions, surprising stories and quotable one-liners."
            }
            ContentType::Interview => {
                "This is an interview. Favor candid answers, revelations and tense exchanges between speakers."
            }
            ContentType::Tutorial => {
                "This is a tutorial. Favor self-contained tips, aha moments and before/after results."
            }
            ContentType::Vlog => {
                "This is a vlog. Favor emotional peaks, funny mishaps and visually described turning points."
            }
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(ContentType::General),
            "podcast" => Ok(ContentType::Podcast),
            "interview" => Ok(ContentType::Interview),
            "tutorial" => Ok(ContentType::Tutorial),
            "vlog" => Ok(ContentType::Vlog),
            other => Err(format!(
                "unknown content type '{other}' (expected general|podcast|interview|tutorial|vlog)"
            )),
        }
    }
}

/// How the ranked, deduplicated pool is cut down to the final list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputPolicy {
    /// Keep the `n` best clips.
    TargetCount(usize),
    /// Every clip scoring at least `high`, plus up to `max_medium` clips scoring at least `medium`.
    Tiered {
        high: f64,
        medium: f64,
        max_medium: usize,
    },
    /// Show everything that survived validation and dedup.
    All,
}

/// Which clock the model reports clip times on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeBase {
    /// Chunk text keeps transcript timestamps; model times are already absolute.
    #[default]
    Absolute,
    /// Chunk text is rebased to 00:00; the chunk's start offset is added back when parsing.
    ChunkRelative,
}

pub const DEFAULT_MAX_CLIP_DURATION: f64 = 90.0;
pub const DEFAULT_TARGET_COUNT: usize = 10;
pub const DEFAULT_MIN_VIRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeOptions {
    pub min_clip_duration: f64,
    pub max_clip_duration: f64,
    /// `None` disables score filtering ("show all, user decides").
    pub min_viral_score: Option<f64>,
    pub output: OutputPolicy,
    pub content_type: ContentType,
    pub overlap: OverlapStrategy,
    pub time_base: TimeBase,
}

impl AnalyzeOptions {
    /// Named defaults for a rubric.
    pub fn for_rubric(kind: RubricKind) -> Self {
        match kind {
            RubricKind::Generic => Self {
                min_clip_duration: 15.0,
                max_clip_duration: DEFAULT_MAX_CLIP_DURATION,
                min_viral_score: Some(DEFAULT_MIN_VIRAL_SCORE),
                output: OutputPolicy::TargetCount(DEFAULT_TARGET_COUNT),
                content_type: ContentType::General,
                overlap: OverlapStrategy::Greedy,
                time_base: TimeBase::Absolute,
            },
            RubricKind::Mentorship => Self {
                min_clip_duration: 30.0,
                max_clip_duration: DEFAULT_MAX_CLIP_DURATION,
                min_viral_score: None,
                output: OutputPolicy::Tiered {
                    high: 70.0,
                    medium: DEFAULT_MIN_VIRAL_SCORE,
                    max_medium: 5,
                },
                content_type: ContentType::General,
                overlap: OverlapStrategy::Greedy,
                time_base: TimeBase::Absolute,
            },
        }
    }

    pub fn target_count(&self) -> Option<usize> {
        match self.output {
            OutputPolicy::TargetCount(n) => Some(n),
            _ => None,
        }
    }
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self::for_rubric(RubricKind::Generic)
    }
}
