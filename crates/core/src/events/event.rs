use serde::{Deserialize, Serialize};

use crate::types::ViralClip;

/// Everything an analysis run reports to its consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AnalysisEvent {
    Progress {
        progress: u8,
        message: String,
        moments_found: usize,
    },
    /// A clip that passed validation in its chunk. It may still lose to an
    /// overlapping, higher-scored clip before completion.
    ClipFound {
        clip: ViralClip,
        moments_found: usize,
    },
    /// One chunk's model call failed; the batch continues.
    ChunkFailed {
        chunk: usize,
        total: usize,
        message: String,
    },
    Complete {
        clips: Vec<ViralClip>,
        processing_time: f64,
        model: String,
    },
    Error {
        code: String,
        message: String,
    },
    Cancelled {
        moments_found: usize,
    },
}

impl AnalysisEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AnalysisEvent::Progress { .. } => "progress",
            AnalysisEvent::ClipFound { .. } => "clipFound",
            AnalysisEvent::ChunkFailed { .. } => "chunkFailed",
            AnalysisEvent::Complete { .. } => "complete",
            AnalysisEvent::Error { .. } => "error",
            AnalysisEvent::Cancelled { .. } => "cancelled",
        }
    }

    /// No further events follow a terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisEvent::Complete { .. } | AnalysisEvent::Error { .. } | AnalysisEvent::Cancelled { .. }
        )
    }
}

/// Server-push framing: `data: <json>\n\n`.
pub fn to_sse_frame(event: &AnalysisEvent) -> serde_json::Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Synchronous response shape `{clips, processingTime, model}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub clips: Vec<ViralClip>,
    /// Seconds.
    pub processing_time: f64,
    pub model: String,
}
