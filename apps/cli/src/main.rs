use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use tracing_subscriber::EnvFilter;
use viralscan_core::{
    AnalysisOutcome, Analyzer, AppConfig, ConfigLayer, ContentType, OverlapStrategy, Provider,
    RubricKind, Transcript, ViralscanError, format_timestamp,
};

use crate::render::{OutputFormat, Renderer};

mod render;

const EXIT_CANCELLED: i32 = 130;

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Grok,
    Openai,
    Gemini,
    Custom,
    Ollama,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Grok => Provider::Grok,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Gemini => Provider::Gemini,
            CliProvider::Custom => Provider::Custom,
            CliProvider::Ollama => Provider::Ollama,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliRubric {
    Generic,
    Mentorship,
}

impl From<CliRubric> for RubricKind {
    fn from(cli: CliRubric) -> Self {
        match cli {
            CliRubric::Generic => RubricKind::Generic,
            CliRubric::Mentorship => RubricKind::Mentorship,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliContentType {
    General,
    Podcast,
    Interview,
    Tutorial,
    Vlog,
}

impl From<CliContentType> for ContentType {
    fn from(cli: CliContentType) -> Self {
        match cli {
            CliContentType::General => ContentType::General,
            CliContentType::Podcast => ContentType::Podcast,
            CliContentType::Interview => ContentType::Interview,
            CliContentType::Tutorial => ContentType::Tutorial,
            CliContentType::Vlog => ContentType::Vlog,
        }
    }
}

#[derive(Parser)]
#[command(name = "viralscan", version)]
#[command(about = "Find short-form viral clip candidates in a timestamped transcript with an LLM")]
struct Cli {
    /// Transcript JSON: a segment array or {segments, text?, language?}
    transcript: PathBuf,

    /// AI provider (default: grok, or the config file's choice)
    #[arg(short, long)]
    provider: Option<CliProvider>,

    /// Model name, overrides the provider's default
    #[arg(short, long)]
    model: Option<String>,

    /// API root or full completions URL (required for the custom provider)
    #[arg(long)]
    base_url: Option<String>,

    /// Scoring rubric
    #[arg(short, long)]
    rubric: Option<CliRubric>,

    /// Kind of video, used to frame the prompt
    #[arg(short = 't', long)]
    content_type: Option<CliContentType>,

    /// Shortest acceptable clip, in seconds
    #[arg(long)]
    min_duration: Option<f64>,

    /// Longest acceptable clip, in seconds
    #[arg(long)]
    max_duration: Option<f64>,

    /// Return at most this many clips
    #[arg(short = 'n', long)]
    target_count: Option<usize>,

    /// Drop clips scoring below this (0-100)
    #[arg(long)]
    min_score: Option<f64>,

    /// Pick non-overlapping clips by maximum total score instead of greedily
    #[arg(long)]
    optimal: bool,

    /// Wait for whole responses instead of streaming tokens
    #[arg(long)]
    no_stream: bool,

    /// Retries per part on transient backend errors
    #[arg(long)]
    retries: Option<u32>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    /// Config file (default: <config dir>/viralscan/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write the JSON result to this file
    #[arg(short, long)]
    save: Option<PathBuf>,
}

impl Cli {
    fn config_layer(&self) -> ConfigLayer {
        ConfigLayer {
            provider: self.provider.map(Provider::from),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            stream: self.no_stream.then_some(false),
            request_timeout_secs: self.timeout,
            max_retries: self.retries,
            rubric: self.rubric.map(RubricKind::from),
            content_type: self.content_type.map(ContentType::from),
            overlap_strategy: self.optimal.then_some(OverlapStrategy::Optimal),
            min_clip_duration: self.min_duration,
            max_clip_duration: self.max_duration,
            target_count: self.target_count,
            min_viral_score: self.min_score,
            ..Default::default()
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("viralscan=info,viralscan_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn load_transcript(path: &Path) -> Result<Transcript, ViralscanError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ViralscanError::TranscriptNotFound {
            path: path.to_path_buf(),
        },
        _ => e.into(),
    })?;
    Transcript::from_json(&content).map_err(|e| ViralscanError::InvalidTranscript {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply(cli.config_layer());
    config.validate()?;

    // Validate credentials early
    let client = match config.connect() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e.user_message());
            std::process::exit(1);
        }
    };

    let transcript = load_transcript(&cli.transcript).await?;
    let title = cli
        .transcript
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.transcript.display().to_string());

    let analyzer = Analyzer::new(client, config.rubric(), config.analyze_options())
        .with_chunker(config.chunker())
        .with_call_policy(config.call_policy())
        .with_generation(config.generation());

    let mut renderer = Renderer::new(cli.format);
    renderer.header(
        &title,
        config.provider.name(),
        analyzer.model(),
        &format!(
            "{} segments, {} long, {} rubric",
            transcript.segments.len(),
            format_timestamp(transcript.duration()),
            config.rubric
        ),
    );

    let mut handle = analyzer.start(transcript);
    tracing::debug!(id = %handle.id, "analysis started");

    let cancel = handle.cancel_token();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(event) => renderer.event(&event),
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                renderer.cancelling();
                cancel.cancel();
            }
        }
    }

    match handle.outcome().await {
        Ok(AnalysisOutcome::Completed(report)) => {
            renderer.report(&report)?;
            if let Some(path) = &cli.save {
                let json = serde_json::to_string_pretty(&report.to_response())?;
                tokio::fs::write(path, json)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                if cli.format == OutputFormat::Pretty {
                    println!("{} {}", style("Saved:").dim(), style(path.display()).cyan());
                }
            }
            Ok(())
        }
        Ok(AnalysisOutcome::Cancelled { moments_found, .. }) => {
            renderer.cancelled(moments_found);
            std::process::exit(EXIT_CANCELLED);
        }
        Err(e) => {
            renderer.error(&e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_the_top_config_layer() {
        let cli = Cli::parse_from([
            "viralscan",
            "talk.json",
            "--provider",
            "ollama",
            "--rubric",
            "mentorship",
            "-n",
            "3",
            "--optimal",
            "--no-stream",
        ]);
        let mut config = AppConfig::default();
        config.apply(cli.config_layer());
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.rubric, RubricKind::Mentorship);
        assert_eq!(config.target_count, Some(3));
        assert_eq!(config.overlap_strategy, OverlapStrategy::Optimal);
        assert!(!config.stream);
    }

    #[test]
    fn unset_flags_leave_lower_layers_alone() {
        let cli = Cli::parse_from(["viralscan", "talk.json"]);
        let mut config = AppConfig {
            model: Some("from-file".into()),
            stream: true,
            ..Default::default()
        };
        config.apply(cli.config_layer());
        assert_eq!(config.model.as_deref(), Some("from-file"));
        assert!(config.stream);
        assert_eq!(cli.format, OutputFormat::Pretty);
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["viralscan", "talk.json", "--format", "sse"]);
        assert_eq!(cli.format, OutputFormat::Sse);
    }
}
