use std::{io, result};

pub type GridResult<T, E = GridError> = result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("no connection for port {0}")]
    NoConnection(String),
    #[error("{0}")]
    Common(String),
}
