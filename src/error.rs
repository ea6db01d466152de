// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandPoseError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to parse recording: {0}")]
    RecordingParse(#[from] serde_json::Error),

    #[error("expected 21 landmarks, got {0}")]
    LandmarkCount(usize),
}

pub type Result<T> = std::result::Result<T, HandPoseError>;
