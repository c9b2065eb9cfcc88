use thiserror::Error;

use crate::union::UnionError;

/// Core error type for respstream.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Surfaced verbatim from the frame source.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Union(#[from] UnionError),

    /// The server put an `error` field on a stream frame.
    #[error("received error while streaming: {0}")]
    Server(String),

    #[error("http {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<u64>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    /// Stable short name used for the `error.kind` telemetry attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Union(_) => "union",
            Self::Server(_) => "server",
            Self::Http { .. } => "http",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, StreamError>;
