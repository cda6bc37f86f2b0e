use std::path::PathBuf;

use thiserror::Error;

use crate::{analyzer::AnalysisError, client::ModelError};

#[derive(Error, Debug)]
pub enum ViralscanError {
    #[error("Transcript not found: {path}")]
    TranscriptNotFound { path: PathBuf },

    #[error("Invalid transcript {path}: {reason}")]
    InvalidTranscript { path: PathBuf, reason: String },

    #[error("Invalid config {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidSetting { key: String, value: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ViralscanError>;
