use thiserror::Error;

/// All errors produced by skyline-core.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("microphone unavailable: {0}")]
    Permission(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("malformed audio payload: {0}")]
    Decode(String),

    #[error("a mentor session is already active")]
    AlreadyActive,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
