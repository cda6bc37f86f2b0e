use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use viralscan_core::{
    AnalysisError, AnalysisEvent, AnalysisOutcome, AnalyzeOptions, Analyzer, CancelToken,
    ChatRequest, ChunkerConfig, EventSink, ModelClient, ModelError, OperationSlot, Rubric,
    Transcript, TranscriptSegment, client::TokenSink, format_transcript_with_timestamps,
};

/// Replays scripted replies in order, then answers `[]`.
#[derive(Default)]
struct MockClient {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    cancel_on_call: Option<(usize, CancelToken)>,
}

impl MockClient {
    fn scripted(replies: Vec<Result<String, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockClient {
    fn backend(&self) -> &str {
        "Mock"
    }

    fn model(&self) -> &str {
        "mock-1"
    }

    async fn chat(
        &self,
        request: &ChatRequest<'_>,
        on_token: &mut TokenSink<'_>,
    ) -> Result<String, ModelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(request.user.to_string());
        if let Some((after, token)) = &self.cancel_on_call {
            if call == *after {
                token.cancel();
            }
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()));
        if let Ok(text) = &reply {
            on_token(text);
        }
        reply
    }
}

const ONE_CLIP: &str = r#"Here you go:
[{"startTime": 5, "endTime": 35, "viralScore": 92, "text": "the whole story",
  "suggestedTitle": "The turn", "hashtags": ["story"], "reasoning": "strong hook",
  "factors": {"hook": 90, "emotion": 80}}]"#;

fn three_segments() -> Transcript {
    Transcript::from_segments(vec![
        TranscriptSegment::new(0, 0.0, 12.0, "So this is how it started."),
        TranscriptSegment::new(1, 12.0, 27.0, "Nobody believed it would work."),
        TranscriptSegment::new(2, 27.0, 40.0, "And then everything changed."),
    ])
}

/// Long enough to split into several chunks at `small_chunks()`.
fn long_transcript() -> Transcript {
    let segments = (0..12)
        .map(|i| {
            let start = i as f64 * 10.0;
            TranscriptSegment::new(
                i,
                start,
                start + 10.0,
                format!("segment {i:02} keeps the story moving along nicely"),
            )
        })
        .collect();
    Transcript::from_segments(segments)
}

fn small_chunks() -> ChunkerConfig {
    ChunkerConfig {
        max_chars: 200,
        overlap_seconds: 0.0,
    }
}

fn analyzer(client: Arc<MockClient>) -> Analyzer {
    let options = AnalyzeOptions {
        min_clip_duration: 15.0,
        max_clip_duration: 90.0,
        ..Default::default()
    };
    Analyzer::new(client, Rubric::generic(), options)
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<AnalysisEvent>) -> Vec<AnalysisEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn single_chunk_end_to_end() {
    let client = Arc::new(MockClient::scripted(vec![Ok(ONE_CLIP.to_string())]));
    let analyzer = analyzer(client.clone());
    let cancel = CancelToken::new();
    let (sink, mut rx) = EventSink::channel(cancel.clone());

    let outcome = analyzer
        .analyze(&three_segments(), &cancel, &sink)
        .await
        .unwrap();

    let AnalysisOutcome::Completed(report) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(report.clips.len(), 1);
    assert_eq!(report.clips[0].start_time, 5.0);
    assert_eq!(report.clips[0].end_time, 35.0);
    assert_eq!(report.clips[0].viral_score, 92.0);
    assert_eq!(report.model, "mock-1");
    assert_eq!(report.chunks, 1);
    assert_eq!(client.calls(), 1);

    let prompt = &client.prompts.lock().unwrap()[0];
    assert!(prompt.contains("[00:12] Nobody believed it would work."));

    let events = drain(&mut rx);
    let mut last = 0;
    for event in &events {
        if let AnalysisEvent::Progress { progress, .. } = event {
            assert!(*progress >= last);
            last = *progress;
        }
    }
    assert_eq!(last, 100);
    assert!(events.iter().any(|e| matches!(e, AnalysisEvent::ClipFound { .. })));
    assert!(matches!(events.last(), Some(AnalysisEvent::Complete { clips, .. }) if clips.len() == 1));
}

#[tokio::test]
async fn cancelling_after_first_chunk_stops_the_batch() {
    let transcript = long_transcript();
    let chunks = small_chunks().chunk(&format_transcript_with_timestamps(&transcript));
    assert!(chunks.len() >= 3, "fixture should split into at least 3 chunks");

    let cancel = CancelToken::new();
    let client = Arc::new(MockClient {
        replies: Mutex::new(VecDeque::from([Ok(ONE_CLIP.to_string())])),
        cancel_on_call: Some((1, cancel.clone())),
        ..Default::default()
    });
    let analyzer = analyzer(client.clone()).with_chunker(small_chunks());
    let (sink, mut rx) = EventSink::channel(cancel.clone());

    let outcome = analyzer.analyze(&transcript, &cancel, &sink).await.unwrap();

    assert_eq!(client.calls(), 1);
    assert!(matches!(
        outcome,
        AnalysisOutcome::Cancelled { chunks_done: 1, .. }
    ));
    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(AnalysisEvent::Cancelled { .. })));
    assert!(!events.iter().any(|e| matches!(e, AnalysisEvent::Complete { .. })));
}

#[tokio::test]
async fn cancel_after_last_chunk_wins_over_empty_result() {
    let cancel = CancelToken::new();
    let client = Arc::new(MockClient {
        replies: Mutex::new(VecDeque::from([Ok("[]".to_string())])),
        cancel_on_call: Some((1, cancel.clone())),
        ..Default::default()
    });
    let analyzer = analyzer(client.clone());
    let (sink, mut rx) = EventSink::channel(cancel.clone());

    let outcome = analyzer
        .analyze(&three_segments(), &cancel, &sink)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        AnalysisOutcome::Cancelled {
            moments_found: 0,
            ..
        }
    ));
    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, AnalysisEvent::Error { .. })));
    assert!(matches!(events.last(), Some(AnalysisEvent::Cancelled { .. })));
}

#[tokio::test]
async fn moment_repeated_across_a_seam_is_announced_once() {
    let transcript = long_transcript();
    let client = Arc::new(MockClient::scripted(vec![
        Ok(ONE_CLIP.to_string()),
        Ok(ONE_CLIP.to_string()),
    ]));
    let analyzer = analyzer(client).with_chunker(small_chunks());
    let cancel = CancelToken::new();
    let (sink, mut rx) = EventSink::channel(cancel.clone());

    let outcome = analyzer.analyze(&transcript, &cancel, &sink).await.unwrap();

    let AnalysisOutcome::Completed(report) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(report.clips.len(), 1);
    assert_eq!(report.overlapping, 1);

    let events = drain(&mut rx);
    let announced: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::ClipFound { moments_found, .. } => Some(*moments_found),
            _ => None,
        })
        .collect();
    assert_eq!(announced, [1]);
    assert!(events.iter().all(|e| match e {
        AnalysisEvent::Progress { moments_found, .. } => *moments_found <= 1,
        _ => true,
    }));
}

#[tokio::test]
async fn failed_chunk_does_not_sink_the_batch() {
    let transcript = long_transcript();
    let chunk_count = small_chunks()
        .chunk(&format_transcript_with_timestamps(&transcript))
        .len();

    let client = Arc::new(MockClient::scripted(vec![
        Err(ModelError::unavailable("Mock", Some(503), "overloaded")),
        Ok(ONE_CLIP.to_string()),
    ]));
    let analyzer = analyzer(client.clone()).with_chunker(small_chunks());
    let cancel = CancelToken::new();
    let (sink, mut rx) = EventSink::channel(cancel.clone());

    let outcome = analyzer.analyze(&transcript, &cancel, &sink).await.unwrap();

    let AnalysisOutcome::Completed(report) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(client.calls(), chunk_count);
    assert_eq!(report.failed_chunks, 1);
    assert_eq!(report.clips.len(), 1);
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AnalysisEvent::ChunkFailed { chunk: 1, .. }))
    );
}

#[tokio::test]
async fn every_chunk_failing_is_backend_unavailable() {
    let client = Arc::new(MockClient::scripted(vec![Err(ModelError::EmptyResponse)]));
    let analyzer = analyzer(client);
    let cancel = CancelToken::new();

    let err = analyzer
        .analyze(&three_segments(), &cancel, &EventSink::detached(cancel.clone()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::BackendUnavailable {
            failed_chunks: 1,
            last_error: ModelError::EmptyResponse,
        }
    ));
}

#[tokio::test]
async fn rejected_clips_report_diagnostics() {
    let too_short = r#"[{"startTime": 0, "endTime": 5, "viralScore": 80},
                        {"startTime": 0, "endTime": 30, "viralScore": 20}]"#;
    let client = Arc::new(MockClient::scripted(vec![Ok(too_short.to_string())]));
    let analyzer = analyzer(client);
    let cancel = CancelToken::new();
    let (sink, mut rx) = EventSink::channel(cancel.clone());

    let err = analyzer
        .analyze(&three_segments(), &cancel, &sink)
        .await
        .unwrap_err();

    match err {
        AnalysisError::NoClipsFound {
            raw_output,
            candidates,
            rejected_invalid,
            rejected_score,
        } => {
            assert_eq!(candidates, 2);
            assert_eq!(rejected_invalid, 1);
            assert_eq!(rejected_score, 1);
            assert!(raw_output.contains("\"endTime\": 5"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        drain(&mut rx).last(),
        Some(AnalysisEvent::Error { code, .. }) if code == "noClipsFound"
    ));
}

#[tokio::test]
async fn configuration_error_short_circuits() {
    let transcript = long_transcript();
    let client = Arc::new(MockClient::scripted(vec![Err(ModelError::not_configured(
        "Mock",
        "MOCK_API_KEY is not set",
    ))]));
    let analyzer = analyzer(client.clone()).with_chunker(small_chunks());
    let cancel = CancelToken::new();

    let err = analyzer
        .analyze(&transcript, &cancel, &EventSink::detached(cancel.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Configuration(_)));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn empty_transcript_is_rejected_without_calls() {
    let client = Arc::new(MockClient::default());
    let analyzer = analyzer(client.clone());
    let cancel = CancelToken::new();
    let transcript = Transcript::from_segments(vec![TranscriptSegment::new(0, 0.0, 1.0, "   ")]);

    let err = analyzer
        .analyze(&transcript, &cancel, &EventSink::detached(cancel.clone()))
        .await
        .unwrap_err();

    assert_eq!(err, AnalysisError::EmptyTranscript);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn spawned_analysis_streams_events_then_reports() {
    let client = Arc::new(MockClient::scripted(vec![Ok(ONE_CLIP.to_string())]));
    let mut handle = analyzer(client).start(three_segments());

    let mut saw_complete = false;
    while let Some(event) = handle.events.recv().await {
        saw_complete |= matches!(event, AnalysisEvent::Complete { .. });
    }
    assert!(saw_complete);

    let outcome = handle.outcome().await.unwrap();
    assert!(matches!(outcome, AnalysisOutcome::Completed(ref r) if r.clips.len() == 1));
}

#[tokio::test]
async fn replacing_an_operation_cancels_the_previous_one() {
    let slot = OperationSlot::new();
    let analyzer = analyzer(Arc::new(MockClient::scripted(vec![Ok(ONE_CLIP.to_string())])));

    let first = slot.begin();
    let second = slot.begin();
    assert!(first.is_cancelled());

    let orphan = analyzer
        .analyze(&three_segments(), &first, &EventSink::detached(first.clone()))
        .await
        .unwrap();
    assert!(orphan.is_cancelled());

    let current = analyzer
        .analyze(&three_segments(), &second, &EventSink::detached(second.clone()))
        .await
        .unwrap();
    assert!(!current.is_cancelled());
}
