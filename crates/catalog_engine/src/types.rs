use std::fmt;

use crate::promise::Outcome;
use crate::request::Page;

/// Result of one download: a page, a failure, or a deadline cancellation.
pub type FetchOutcome = Outcome<Page, FetchError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    UnsupportedMethod(String),
    InvalidUrl,
    HttpStatus(u16),
    Transport,
    Decoding,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::UnsupportedMethod(method) => write!(f, "unsupported method {method}"),
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Transport => write!(f, "transport error"),
            FailureKind::Decoding => write!(f, "decoding error"),
        }
    }
}
