use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentId {
    Number(u64),
    Text(String),
}

/// One timestamped line of source text, as supplied by the transcript source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub id: Option<SegmentId>,
    #[serde(alias = "startTime")]
    pub start: f64,
    #[serde(alias = "endTime")]
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl TranscriptSegment {
    pub fn new(id: u64, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id: Some(SegmentId::Number(id)),
            start,
            end,
            text: text.into(),
            speaker: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Bare(Vec<TranscriptSegment>),
    Full(Transcript),
}

impl Transcript {
    pub fn from_segments(segments: Vec<TranscriptSegment>) -> Self {
        Self {
            segments,
            text: None,
            language: None,
        }
    }

    /// Accepts either a bare segment array or a `{segments, text?, language?}` object.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(match serde_json::from_str::<TranscriptFile>(json)? {
            TranscriptFile::Bare(segments) => Self::from_segments(segments),
            TranscriptFile::Full(transcript) => transcript,
        })
    }

    /// Largest segment end; segments may arrive out of order.
    pub fn duration(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.end.max(s.start))
            .fold(0.0, f64::max)
    }
}

/// A slice of the formatted transcript sent to the model in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptChunk {
    pub text: String,
    pub start_offset: f64,
    pub end_offset: f64,
}

/// Named 0-100 sub-scores, keyed by the active rubric's factor names.
pub type ViralFactors = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViralClip {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub viral_score: f64,
    pub factors: ViralFactors,
    pub segments: Vec<ClipSegment>,
    pub suggested_title: String,
    pub hashtags: Vec<String>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_suggestion: Option<String>,
    #[serde(default)]
    pub is_reordered: bool,
}

impl ViralClip {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Time ranges this clip occupies; the clip hull when no segments exist.
    pub fn ranges(&self) -> Vec<(f64, f64)> {
        if self.segments.is_empty() {
            vec![(self.start_time, self.end_time)]
        } else {
            self.segments
                .iter()
                .map(|s| (s.start_time, s.end_time))
                .collect()
        }
    }

    /// Half-open overlap test across every segment pair.
    pub fn overlaps(&self, other: &ViralClip) -> bool {
        let theirs = other.ranges();
        self.ranges()
            .iter()
            .any(|a| theirs.iter().any(|b| a.0 < b.1 && a.1 > b.0))
    }
}
