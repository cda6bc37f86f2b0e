//! Splits a formatted transcript into overlapping, size-bounded chunks.
//!
//! Each chunk closes when the next line would push it past `max_chars`. The
//! next chunk is seeded with the trailing lines whose timestamps fall within
//! `overlap_seconds` of the last timestamp seen, so a moment straddling a seam
//! is visible in full to at least one model call. The seed never takes more
//! than half of `max_chars`, so every chunk carries mostly new text.

use std::collections::VecDeque;

use crate::{format::parse_line_timestamp, types::TranscriptChunk};

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 12_000;
pub const DEFAULT_OVERLAP_SECONDS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub overlap_seconds: f64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
            overlap_seconds: DEFAULT_OVERLAP_SECONDS,
        }
    }
}

impl ChunkerConfig {
    pub fn chunk(&self, transcript: &str) -> Vec<TranscriptChunk> {
        chunk_transcript(transcript, self.max_chars, self.overlap_seconds)
    }
}

#[derive(Clone, Copy)]
struct Line<'a> {
    text: &'a str,
    timestamp: Option<f64>,
    chars: usize,
}

impl<'a> Line<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            timestamp: parse_line_timestamp(text),
            chars: text.chars().count(),
        }
    }
}

/// Characters of `lines` joined with single newlines.
fn joined_chars<'a, 'l: 'a>(lines: impl IntoIterator<Item = &'a Line<'l>>) -> usize {
    let mut total = 0usize;
    let mut count = 0usize;
    for line in lines {
        total += line.chars;
        count += 1;
    }
    total + count.saturating_sub(1)
}

fn close_chunk(buffer: &[Line<'_>], start_offset: f64, end_offset: f64) -> TranscriptChunk {
    let text = buffer
        .iter()
        .map(|l| l.text)
        .collect::<Vec<_>>()
        .join("\n");

    TranscriptChunk {
        text: text.trim().to_string(),
        start_offset,
        end_offset,
    }
}

fn seed_budget(max_chars: usize) -> usize {
    max_chars / 2
}

/// Overlap lines to carry into the next chunk, dropping the oldest until the
/// seed is within budget and the incoming line still fits.
fn fit_overlap<'a>(
    overlap: &VecDeque<Line<'a>>,
    incoming_chars: usize,
    max_chars: usize,
) -> Vec<Line<'a>> {
    let budget = seed_budget(max_chars).min(max_chars.saturating_sub(incoming_chars + 1));
    let mut seed: VecDeque<Line<'a>> = overlap.clone();
    while !seed.is_empty() && joined_chars(seed.iter()) > budget {
        seed.pop_front();
    }
    seed.into()
}

/// Drop lines that can no longer seed a chunk: timestamped lines older than
/// the window, untimestamped lines ahead of the oldest one kept, and anything
/// past the seed budget.
fn trim_window(
    window: &mut VecDeque<Line<'_>>,
    latest: Option<f64>,
    overlap_seconds: f64,
    max_chars: usize,
) {
    if let Some(latest) = latest {
        while window
            .front()
            .is_some_and(|l| l.timestamp.is_none_or(|ts| latest - ts > overlap_seconds))
        {
            window.pop_front();
        }
    }
    while !window.is_empty() && joined_chars(window.iter()) > seed_budget(max_chars) {
        window.pop_front();
    }
}

pub fn chunk_transcript(
    transcript: &str,
    max_chars: usize,
    overlap_seconds: f64,
) -> Vec<TranscriptChunk> {
    if transcript.trim().is_empty() {
        return Vec::new();
    }

    if transcript.chars().count() <= max_chars {
        let end_offset = transcript
            .lines()
            .rev()
            .find_map(parse_line_timestamp)
            .unwrap_or(0.0);
        return vec![TranscriptChunk {
            text: transcript.trim().to_string(),
            start_offset: 0.0,
            end_offset,
        }];
    }

    let overlap_seconds = overlap_seconds.max(0.0);
    let mut chunks = Vec::new();
    let mut buffer: Vec<Line<'_>> = Vec::new();
    let mut buffer_chars = 0usize;
    let mut overlap: VecDeque<Line<'_>> = VecDeque::new();
    let mut chunk_start = 0.0;
    let mut chunk_end = 0.0;

    for raw in transcript.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        let line = Line::new(raw);

        if !buffer.is_empty() && buffer_chars + 1 + line.chars > max_chars {
            chunks.push(close_chunk(&buffer, chunk_start, chunk_end));

            let previous_end = chunk_end;
            buffer = fit_overlap(&overlap, line.chars, max_chars);
            buffer_chars = joined_chars(buffer.iter());
            overlap = buffer.iter().copied().collect();

            chunk_start = buffer
                .iter()
                .find_map(|l| l.timestamp)
                .map_or(previous_end, |ts| ts.min(previous_end));
            chunk_end = buffer
                .iter()
                .filter_map(|l| l.timestamp)
                .fold(chunk_start, f64::max);
        }

        buffer_chars += line.chars + usize::from(!buffer.is_empty());
        buffer.push(line);
        overlap.push_back(line);

        if let Some(latest) = line.timestamp {
            chunk_end = f64::max(chunk_end, latest);
        }
        trim_window(&mut overlap, line.timestamp, overlap_seconds, max_chars);
    }

    if !buffer.is_empty() {
        chunks.push(close_chunk(&buffer, chunk_start, chunk_end));
    }

    chunks
}
