use thiserror::Error;

/// All errors surfaced by parley-core.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device available")]
    NoDefaultInputDevice,

    #[error("no default output device available")]
    NoDefaultOutputDevice,

    #[error("not connected to a session")]
    NotConnected,

    #[error("capture is already running")]
    AlreadyCapturing,

    #[error("capture is not running")]
    NotCapturing,

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;
