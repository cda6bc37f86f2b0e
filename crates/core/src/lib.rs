pub mod analyzer;
pub mod cancel;
pub mod chunker;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod options;
pub mod overlap;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod ranking;
pub mod rubric;
pub mod types;

pub use analyzer::{
    AnalysisError, AnalysisHandle, AnalysisOutcome, AnalysisReport, Analyzer, GenerationSettings,
};
pub use cancel::{CancelToken, OperationSlot};
pub use chunker::{ChunkerConfig, chunk_transcript};
pub use client::{CallPolicy, ChatRequest, ModelClient, ModelError, OllamaClient, OpenAiClient, call_model};
pub use config::{AppConfig, ConfigLayer};
pub use error::{Result, ViralscanError};
pub use events::{AnalysisEvent, AnalyzeResponse, EventSink, to_sse_frame};
pub use format::{format_clips_readable, format_timestamp, format_transcript_with_timestamps};
pub use options::{AnalyzeOptions, ContentType, OutputPolicy, TimeBase};
pub use overlap::{OverlapStrategy, dedupe, dedupe_optimal};
pub use parser::parse_clips;
pub use prompt::PromptBuilder;
pub use provider::{ClientOptions, Provider, ProviderConfig};
pub use ranking::{is_valid, rank};
pub use rubric::{Rubric, RubricKind};
pub use types::{ClipSegment, Transcript, TranscriptChunk, TranscriptSegment, ViralClip, ViralFactors};
