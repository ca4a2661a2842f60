use std::fmt;

/// All error types produced by the protogate library.
#[derive(Debug)]
pub enum Error {
    /// A message declaration was parsed twice under the same fully-qualified
    /// name. Descriptor sets that redefine a message are rejected outright.
    DuplicateMessage(String),

    /// A service cannot produce routes (e.g. it names no server).
    InvalidService(String),

    /// A middleware name contains characters outside `[A-Za-z0-9_-]`.
    InvalidMiddleware(String),

    /// A method is missing a required option or references an incomplete
    /// message.
    InvalidMethod(String),

    /// A registry data key does not have the `<prefix>/data/<server>/<file>`
    /// shape.
    MalformedKey(String),

    /// The KV store answered with a non-success HTTP status.
    Http { code: u16, content: String },

    /// The HTTP request itself failed (connection refused, timeout, ...).
    Transport(reqwest::Error),

    /// A JSON payload from the KV store could not be decoded.
    Json(serde_json::Error),

    /// A protobuf encoding/decoding error.
    Proto(String),

    /// An I/O error (gzip compression/decompression).
    Io(std::io::Error),

    /// The caller's cancellation token fired.
    Cancelled,
}

impl Error {
    /// Whether this error represents a "key not found" answer from the KV
    /// store. Not-found is part of normal control flow for the registry
    /// watcher and the registrator's checksum probe.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Http { code: 404, .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateMessage(name) => {
                write!(f, "message '{name}' has already been parsed")
            }
            Error::InvalidService(name) => write!(f, "invalid service '{name}'"),
            Error::InvalidMiddleware(name) => write!(f, "invalid middleware name '{name}'"),
            Error::InvalidMethod(name) => write!(f, "invalid method '{name}'"),
            Error::MalformedKey(key) => write!(f, "malformed registry key '{key}'"),
            Error::Http { code, content } => write!(f, "kv store error ({code}): {content}"),
            Error::Transport(err) => write!(f, "transport error: {err}"),
            Error::Json(err) => write!(f, "json error: {err}"),
            Error::Proto(msg) => write!(f, "proto error: {msg}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::Proto(err.to_string())
    }
}

impl From<prost::EncodeError> for Error {
    fn from(err: prost::EncodeError) -> Self {
        Error::Proto(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Convenience type alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;
