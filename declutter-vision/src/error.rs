//! Error types for declutter-vision

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    #[error("Inpainting error: {0}")]
    Inpainting(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {field}: {reason}")]
    Config { field: &'static str, reason: String },

    #[error("Episode aborted after an earlier failure; call reset() to start a new episode")]
    EpisodeAborted,

    #[error("Episode already ended; call reset() to start a new episode")]
    EpisodeEnded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl VisionError {
    /// Build a configuration error naming the offending field
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        VisionError::Config {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this error came from one of the perception oracles
    pub fn is_oracle_failure(&self) -> bool {
        matches!(
            self,
            VisionError::Segmentation(_) | VisionError::Inpainting(_) | VisionError::Network(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
