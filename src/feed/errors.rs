//! Feed error types

use thiserror::Error;

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Network timeout")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Recoverable,
    Fatal,
}

impl FeedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::WebSocket(_) | Self::Timeout => ErrorKind::Recoverable,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.kind(), ErrorKind::Recoverable)
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }
}
