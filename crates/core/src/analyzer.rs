//! Runs one analysis: chunk, prompt, call, parse, then rank and dedupe.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    cancel::CancelToken,
    chunker::ChunkerConfig,
    client::{
        CallPolicy, ChatRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ModelClient, ModelError,
        call_model,
    },
    events::{AnalysisEvent, AnalyzeResponse, EventSink},
    format::format_transcript_with_timestamps,
    options::AnalyzeOptions,
    overlap::resolve_overlaps,
    parser::parse_clips,
    prompt::PromptBuilder,
    ranking::{FilterStats, apply_output_policy, filter_clips, is_valid, passes_score_threshold, rank},
    rubric::Rubric,
    types::{Transcript, ViralClip},
};

/// Share of the progress bar spent on model calls; the rest is post-processing.
pub const CHUNK_PROGRESS_SPAN: u8 = 90;
const RANKING_PROGRESS: u8 = 90;
const DEDUPE_PROGRESS: u8 = 95;

/// Raw model text kept for `NoClipsFound` diagnostics, in chars.
pub const RAW_OUTPUT_LIMIT: usize = 8_000;
const TOKEN_REPORT_EVERY: usize = 25;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("configuration error: {0}")]
    Configuration(ModelError),

    #[error("AI backend unavailable ({failed_chunks} part(s) failed): {last_error}")]
    BackendUnavailable {
        failed_chunks: usize,
        last_error: ModelError,
    },

    #[error(
        "no viral clips found ({candidates} candidates, {rejected_invalid} outside duration limits, {rejected_score} below score threshold)"
    )]
    NoClipsFound {
        raw_output: String,
        candidates: usize,
        rejected_invalid: usize,
        rejected_score: usize,
    },

    #[error("transcript has no text")]
    EmptyTranscript,

    #[error("analysis task stopped before reporting a result")]
    Aborted,
}

impl AnalysisError {
    /// Stable machine-readable code, used in error events.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Configuration(_) => "configuration",
            AnalysisError::BackendUnavailable { .. } => "backendUnavailable",
            AnalysisError::NoClipsFound { .. } => "noClipsFound",
            AnalysisError::EmptyTranscript => "emptyTranscript",
            AnalysisError::Aborted => "aborted",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::Configuration(e) => e.user_message(),
            AnalysisError::BackendUnavailable { last_error, .. } => last_error.user_message(),
            AnalysisError::NoClipsFound {
                candidates,
                rejected_invalid,
                rejected_score,
                ..
            } if *candidates > 0 => format!(
                "No viral moments survived filtering: {rejected_invalid} of {candidates} had the wrong length and {rejected_score} scored too low."
            ),
            AnalysisError::NoClipsFound { .. } => {
                "The model did not suggest any usable moments for this transcript.".to_string()
            }
            AnalysisError::EmptyTranscript => "The transcript has no text to analyze.".to_string(),
            AnalysisError::Aborted => "The analysis stopped unexpectedly.".to_string(),
        }
    }
}

/// Sampling settings sent with every model call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub clips: Vec<ViralClip>,
    pub processing_time: Duration,
    pub model: String,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub stats: FilterStats,
    /// Valid clips dropped for overlapping a higher-ranked one.
    pub overlapping: usize,
}

impl AnalysisReport {
    pub fn to_response(&self) -> AnalyzeResponse {
        AnalyzeResponse {
            clips: self.clips.clone(),
            processing_time: self.processing_time.as_secs_f64(),
            model: self.model.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(AnalysisReport),
    Cancelled {
        chunks_done: usize,
        moments_found: usize,
    },
}

impl AnalysisOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisOutcome::Cancelled { .. })
    }
}

/// Chunk-by-chunk clip finder over one injected model client.
#[derive(Clone)]
pub struct Analyzer {
    client: Arc<dyn ModelClient>,
    prompts: PromptBuilder,
    options: AnalyzeOptions,
    chunker: ChunkerConfig,
    policy: CallPolicy,
    generation: GenerationSettings,
}

impl Analyzer {
    pub fn new(client: Arc<dyn ModelClient>, rubric: Rubric, options: AnalyzeOptions) -> Self {
        Self {
            client,
            prompts: PromptBuilder::new(rubric, options.clone()),
            options,
            chunker: ChunkerConfig::default(),
            policy: CallPolicy::default(),
            generation: GenerationSettings::default(),
        }
    }

    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_call_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    pub fn options(&self) -> &AnalyzeOptions {
        &self.options
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Run to completion on the current task.
    ///
    /// Cancellation is checked before and after every chunk and before the
    /// final result; it is reported as `Ok(AnalysisOutcome::Cancelled)`.
    pub async fn analyze(
        &self,
        transcript: &Transcript,
        cancel: &CancelToken,
        sink: &EventSink,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let started = Instant::now();

        let text = format_transcript_with_timestamps(transcript);
        if text.trim().is_empty() {
            return Err(fail(sink, AnalysisError::EmptyTranscript));
        }

        let chunks = self.chunker.chunk(&text);
        let total = chunks.len();
        info!(
            chunks = total,
            chars = text.chars().count(),
            backend = self.client.backend(),
            model = self.client.model(),
            rubric = %self.prompts.rubric().kind,
            "starting analysis"
        );
        sink.progress(0, format!("Analyzing transcript in {total} part(s)"), 0);

        let mut found: Vec<ViralClip> = Vec::new();
        let mut raw_output = String::new();
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut last_error = None;
        let mut moments_found = 0usize;
        let mut announced: Vec<ViralClip> = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(cancelled(sink, index, moments_found));
            }

            let base = chunk_progress(index, total);
            let moments = moments_found;
            sink.progress(base, format!("Analyzing part {} of {}", index + 1, total), moments);

            let user = self.prompts.user_prompt(chunk, index, total);
            let request = ChatRequest {
                system: self.prompts.system_prompt(),
                user: &user,
                temperature: self.generation.temperature,
                max_tokens: self.generation.max_tokens,
                stream: self.generation.stream,
            };

            let chunk_started = Instant::now();
            let mut tokens = 0usize;
            let mut on_token = |_: &str| {
                tokens += 1;
                if tokens % TOKEN_REPORT_EVERY == 0 {
                    let secs = chunk_started.elapsed().as_secs_f64().max(f64::EPSILON);
                    sink.progress(
                        base,
                        format!(
                            "Analyzing part {} of {}: {tokens} tokens ({:.1} tokens/s)",
                            index + 1,
                            total,
                            tokens as f64 / secs
                        ),
                        moments,
                    );
                }
            };

            let result = call_model(
                self.client.as_ref(),
                &request,
                &self.policy,
                cancel,
                &mut on_token,
            )
            .await;

            match result {
                Ok(raw) => {
                    succeeded += 1;
                    let clips = parse_clips(&raw, self.prompts.time_offset(chunk), self.prompts.rubric());
                    debug!(
                        chunk = index + 1,
                        clips = clips.len(),
                        tokens,
                        elapsed_ms = chunk_started.elapsed().as_millis() as u64,
                        "chunk analyzed"
                    );
                    // A moment repeated in a seam overlap is announced once.
                    for clip in &clips {
                        if is_valid(clip, &self.options)
                            && passes_score_threshold(clip, &self.options)
                            && !announced.iter().any(|seen| seen.overlaps(clip))
                        {
                            announced.push(clip.clone());
                            moments_found += 1;
                            sink.publish(AnalysisEvent::ClipFound {
                                clip: clip.clone(),
                                moments_found,
                            });
                        }
                    }
                    append_raw(&mut raw_output, &raw);
                    found.extend(clips);
                }
                Err(ModelError::Cancelled) => return Ok(cancelled(sink, index, moments_found)),
                Err(e @ ModelError::NotConfigured { .. }) => {
                    return Err(fail(sink, AnalysisError::Configuration(e)));
                }
                Err(e) => {
                    failed += 1;
                    warn!(
                        chunk = index + 1,
                        total,
                        chunk_len = chunk.text.len(),
                        error = %e,
                        "chunk failed, continuing with the next one"
                    );
                    sink.publish(AnalysisEvent::ChunkFailed {
                        chunk: index + 1,
                        total,
                        message: e.user_message(),
                    });
                    last_error = Some(e);
                }
            }

            if cancel.is_cancelled() {
                return Ok(cancelled(sink, index + 1, moments_found));
            }
        }

        if succeeded == 0 {
            if let Some(last_error) = last_error {
                return Err(fail(
                    sink,
                    AnalysisError::BackendUnavailable {
                        failed_chunks: failed,
                        last_error,
                    },
                ));
            }
        }

        sink.progress(RANKING_PROGRESS, "Ranking moments", moments_found);
        let (valid, stats) = filter_clips(found, &self.options);
        let ranked = rank(valid);

        sink.progress(DEDUPE_PROGRESS, "Removing overlapping moments", moments_found);
        let before = ranked.len();
        let deduped = resolve_overlaps(ranked, self.options.overlap);
        let overlapping = before - deduped.len();
        let clips = apply_output_policy(deduped, self.options.output);

        if cancel.is_cancelled() {
            return Ok(cancelled(sink, total, moments_found));
        }

        if clips.is_empty() {
            return Err(fail(
                sink,
                AnalysisError::NoClipsFound {
                    raw_output,
                    candidates: stats.candidates,
                    rejected_invalid: stats.rejected_invalid,
                    rejected_score: stats.rejected_score,
                },
            ));
        }

        let report = AnalysisReport {
            processing_time: started.elapsed(),
            model: self.client.model().to_string(),
            chunks: total,
            failed_chunks: failed,
            stats,
            overlapping,
            clips,
        };
        info!(
            clips = report.clips.len(),
            candidates = stats.candidates,
            rejected_invalid = stats.rejected_invalid,
            rejected_score = stats.rejected_score,
            overlapping,
            failed_chunks = failed,
            elapsed_ms = report.processing_time.as_millis() as u64,
            "analysis complete"
        );

        sink.progress(
            100,
            format!("Found {} viral moment(s)", report.clips.len()),
            report.clips.len(),
        );
        sink.publish(AnalysisEvent::Complete {
            clips: report.clips.clone(),
            processing_time: report.processing_time.as_secs_f64(),
            model: report.model.clone(),
        });

        Ok(AnalysisOutcome::Completed(report))
    }

    /// Spawn the analysis on the runtime and hand back its handle.
    pub fn start(&self, transcript: Transcript) -> AnalysisHandle {
        self.start_with(transcript, CancelToken::new())
    }

    /// Like [`Analyzer::start`] with a caller-owned token, e.g. from an `OperationSlot`.
    pub fn start_with(&self, transcript: Transcript, cancel: CancelToken) -> AnalysisHandle {
        let id = Uuid::new_v4();
        let (sink, events) = EventSink::channel(cancel.clone());
        let (done_tx, done_rx) = oneshot::channel();
        let analyzer = self.clone();
        let token = cancel.clone();

        tokio::spawn(
            async move {
                let result = analyzer.analyze(&transcript, &token, &sink).await;
                drop(sink);
                let _ = done_tx.send(result);
            }
            .instrument(info_span!("analysis", %id)),
        );

        AnalysisHandle {
            id,
            events,
            cancel,
            done_rx,
        }
    }
}

/// A running analysis.
///
/// Drain `events` until it closes, then await [`AnalysisHandle::outcome`].
pub struct AnalysisHandle {
    pub id: Uuid,
    pub events: mpsc::UnboundedReceiver<AnalysisEvent>,
    cancel: CancelToken,
    done_rx: oneshot::Receiver<Result<AnalysisOutcome, AnalysisError>>,
}

impl AnalysisHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn outcome(self) -> Result<AnalysisOutcome, AnalysisError> {
        self.done_rx.await.unwrap_or(Err(AnalysisError::Aborted))
    }
}

fn chunk_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return CHUNK_PROGRESS_SPAN;
    }
    (done.min(total) * CHUNK_PROGRESS_SPAN as usize / total) as u8
}

fn append_raw(buffer: &mut String, raw: &str) {
    let used = buffer.chars().count();
    if used >= RAW_OUTPUT_LIMIT {
        return;
    }
    if !buffer.is_empty() {
        buffer.push_str("\n\n");
    }
    buffer.extend(raw.chars().take(RAW_OUTPUT_LIMIT - used));
}

fn cancelled(sink: &EventSink, chunks_done: usize, moments_found: usize) -> AnalysisOutcome {
    info!(chunks_done, moments_found, "analysis cancelled");
    sink.publish(AnalysisEvent::Cancelled { moments_found });
    AnalysisOutcome::Cancelled {
        chunks_done,
        moments_found,
    }
}

fn fail(sink: &EventSink, error: AnalysisError) -> AnalysisError {
    warn!(code = error.code(), error = %error, "analysis failed");
    sink.publish(AnalysisEvent::Error {
        code: error.code().to_string(),
        message: error.user_message(),
    });
    error
}
