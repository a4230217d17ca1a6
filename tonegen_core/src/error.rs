use std::path::PathBuf;

use crate::sink::SinkState;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open audio output: {0}")]
    Open(String),

    #[error("audio sink has been released")]
    Released,

    #[error("audio sink is not ready for writing (state: {0})")]
    NotReady(SinkState),

    #[error("audio device thread disconnected")]
    Disconnected,

    #[error("audio device error: {0}")]
    Device(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("the streaming worker owns the phase; pause or stop first")]
    Busy,

    #[error("failed to spawn streaming worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("the streaming worker panicked")]
    WorkerPanicked,
}

pub type SinkResult<T> = Result<T, SinkError>;
