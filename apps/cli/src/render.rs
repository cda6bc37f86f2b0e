use std::{
    io::Write,
    time::{Duration, Instant},
};

use clap::ValueEnum;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use viralscan_core::{
    AnalysisError, AnalysisEvent, AnalysisReport, format_clips_readable, format_timestamp,
    to_sse_frame,
};

const RAW_OUTPUT_PREVIEW: usize = 1_500;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Progress bar and a readable clip list
    #[default]
    Pretty,
    /// One `{clips, processingTime, model}` JSON document on stdout
    Json,
    /// Every event as a `data: <json>` frame on stdout
    Sse,
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .progress_chars("█▉▊▋▌▍▎▏ ");
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Turns analysis events into terminal output for one format.
pub struct Renderer {
    format: OutputFormat,
    bar: Option<ProgressBar>,
    started: Instant,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            bar: None,
            started: Instant::now(),
        }
    }

    pub fn header(&mut self, title: &str, backend: &str, model: &str, parts: &str) {
        if self.format != OutputFormat::Pretty {
            return;
        }
        println!(
            "\n{}  {}\n",
            style("viralscan").cyan().bold(),
            style("Viral Clip Finder").dim()
        );
        println!("{} Transcript: {}", style("✓").green().bold(), style(title).dim());
        println!(
            "{} Model: {} {}",
            style("✓").green().bold(),
            style(model).yellow(),
            style(format!("({backend})")).dim()
        );
        println!("{} {}", style("✓").green().bold(), parts);
        println!("{}", style("─".repeat(60)).dim());
        self.bar = Some(create_progress_bar());
    }

    pub fn event(&mut self, event: &AnalysisEvent) {
        match self.format {
            OutputFormat::Json => {}
            OutputFormat::Sse => {
                if let Ok(frame) = to_sse_frame(event) {
                    let mut stdout = std::io::stdout().lock();
                    let _ = stdout.write_all(frame.as_bytes());
                    let _ = stdout.flush();
                }
            }
            OutputFormat::Pretty => self.pretty_event(event),
        }
    }

    fn pretty_event(&mut self, event: &AnalysisEvent) {
        let Some(bar) = &self.bar else {
            return;
        };
        match event {
            AnalysisEvent::Progress {
                progress,
                message,
                moments_found,
            } => {
                bar.set_position(u64::from(*progress));
                bar.set_message(format!(
                    "{message} {}",
                    style(format!("[{moments_found} found]")).dim()
                ));
            }
            AnalysisEvent::ClipFound { clip, .. } => {
                bar.println(format!(
                    "  {} {:>3.0}  [{}–{}] {}",
                    style("★").yellow(),
                    clip.viral_score,
                    format_timestamp(clip.start_time),
                    format_timestamp(clip.end_time),
                    clip.suggested_title
                ));
            }
            AnalysisEvent::ChunkFailed {
                chunk,
                total,
                message,
            } => {
                bar.println(format!(
                    "  {} part {chunk}/{total} skipped: {}",
                    style("!").yellow().bold(),
                    style(message).dim()
                ));
            }
            AnalysisEvent::Complete { clips, .. } => {
                bar.finish_and_clear();
                println!(
                    "{} Found {} clip(s) {}",
                    style("✓").green().bold(),
                    clips.len(),
                    style(format!("[{}]", format_duration(self.started.elapsed()))).dim()
                );
            }
            AnalysisEvent::Error { .. } | AnalysisEvent::Cancelled { .. } => bar.finish_and_clear(),
        }
    }

    /// Shown once when Ctrl-C is received.
    pub fn cancelling(&self) {
        match &self.bar {
            Some(bar) => bar.set_message(style("Cancelling...").yellow().to_string()),
            None => eprintln!("{}", style("Cancelling...").yellow()),
        }
    }

    pub fn report(&mut self, report: &AnalysisReport) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report.to_response())?);
            }
            OutputFormat::Sse => {}
            OutputFormat::Pretty => {
                let mut notes = vec![format!("{} candidates", report.stats.candidates)];
                if report.stats.rejected_invalid > 0 {
                    notes.push(format!("{} wrong length", report.stats.rejected_invalid));
                }
                if report.stats.rejected_score > 0 {
                    notes.push(format!("{} low score", report.stats.rejected_score));
                }
                if report.overlapping > 0 {
                    notes.push(format!("{} overlapping", report.overlapping));
                }
                if report.failed_chunks > 0 {
                    notes.push(format!("{} part(s) failed", report.failed_chunks));
                }
                println!(
                    "\n{} {}  {}\n",
                    style("Total time:").dim(),
                    style(format_duration(report.processing_time)).cyan().bold(),
                    style(notes.join(", ")).dim()
                );
                println!("{}", style("─".repeat(60)).dim());
                println!("{}", format_clips_readable(&report.clips));
            }
        }
        Ok(())
    }

    pub fn cancelled(&mut self, moments_found: usize) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        if self.format != OutputFormat::Sse {
            eprintln!(
                "{} {}",
                style("Cancelled.").yellow().bold(),
                style(format!("{moments_found} moment(s) found before stopping")).dim()
            );
        }
    }

    pub fn error(&mut self, error: &AnalysisError) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        match self.format {
            OutputFormat::Sse => {}
            OutputFormat::Json => {
                let body = serde_json::json!({
                    "error": error.code(),
                    "message": error.user_message(),
                });
                println!("{body}");
            }
            OutputFormat::Pretty => {
                eprintln!("{} {}", style("Error:").red().bold(), error.user_message());
                if let AnalysisError::NoClipsFound { raw_output, .. } = error {
                    if !raw_output.trim().is_empty() {
                        let preview: String = raw_output.chars().take(RAW_OUTPUT_PREVIEW).collect();
                        eprintln!("\n{}\n{}", style("Model output:").dim(), style(preview).dim());
                    }
                }
            }
        }
    }
}
