use thiserror::Error;

/// Errors produced by the codec layer.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("mp3: {0}")]
    Mp3(String),

    #[error("ogg: {0}")]
    Ogg(String),

    #[error("opus: {0}")]
    Opus(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
