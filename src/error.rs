//! Error types for auralis

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuralisError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    /// Every input stream that disagrees with the first stream's format.
    #[error("Input streams do not share one format: {}", .mismatches.join("; "))]
    FormatMismatch { mismatches: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Invalid engine state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Convolution error: {0}")]
    Convolution(String),

    #[error("Response generation error: {0}")]
    ResponseGeneration(String),

    #[error("Compute backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, AuralisError>;
