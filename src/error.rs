use axum::{http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed not ready: {0}")]
    NotReady(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

// ---------------------------------------------------------------------------
// Engine-side errors
// ---------------------------------------------------------------------------

/// A single failed call through one transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("{transport}: timed out after {timeout_ms}ms")]
    Timeout { transport: String, timeout_ms: u64 },

    #[error("{transport}: HTTP {status}")]
    Status { transport: String, status: u16 },

    #[error("{transport}: network error: {message}")]
    Network { transport: String, message: String },

    #[error("{transport}: body decode error: {message}")]
    Decode { transport: String, message: String },

    #[error("{transport}: bad url: {message}")]
    Url { transport: String, message: String },

    /// Every transport in the chain failed for this call.
    #[error("all transports failed for {url}: [{}]", join_attempts(attempts))]
    Exhausted {
        url: String,
        attempts: Vec<TransportError>,
    },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout { .. } => true,
            TransportError::Exhausted { attempts, .. } => {
                !attempts.is_empty() && attempts.iter().all(TransportError::is_timeout)
            }
            _ => false,
        }
    }
}

fn join_attempts(attempts: &[TransportError]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Upstream answered, but not with anything we recognise.
#[derive(Debug, Clone, Error)]
pub enum PayloadError {
    #[error("no known envelope matched (tried: {tried})")]
    UnknownEnvelope { tried: String },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("pagination did not terminate: {0}")]
    Pagination(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Transport,
    Payload,
    Timeout,
    PartialData,
}

impl std::fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceErrorKind::Transport => "transport",
            SourceErrorKind::Payload => "payload",
            SourceErrorKind::Timeout => "timeout",
            SourceErrorKind::PartialData => "partial_data",
        };
        write!(f, "{s}")
    }
}

/// Why a source adapter could not deliver (all of) its records.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<TransportError> for SourceError {
    fn from(e: TransportError) -> Self {
        let kind = if e.is_timeout() {
            SourceErrorKind::Timeout
        } else {
            SourceErrorKind::Transport
        };
        Self::new(kind, e.to_string())
    }
}

impl From<PayloadError> for SourceError {
    fn from(e: PayloadError) -> Self {
        Self::new(SourceErrorKind::Payload, e.to_string())
    }
}

/// Failures inside a single adapter fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl From<FetchError> for SourceError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Transport(t) => t.into(),
            FetchError::Payload(p) => p.into(),
        }
    }
}
