use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read word bank {path}: {source}")]
    WordBankRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("word bank is empty")]
    EmptyWordBank,

    #[error("round duration must be at least one second")]
    InvalidRoundDuration,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
